//! `log` backend.
//!
//! Records emitted before the kernel's debug-output channel is attached are
//! kept in a fixed buffer; attaching the sink replays them and switches to
//! direct output.

use core::fmt::{self, Write};
use std::sync::Arc;

use conquer_once::spin::OnceCell;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

use crate::platform::Kernel;

const BUFFER_SIZE: usize = 8192;

/// Buffer for log lines produced before the sink exists
struct LogBuffer {
    buffer: [u8; BUFFER_SIZE],
    position: usize,
}

impl LogBuffer {
    const fn new() -> Self {
        Self {
            buffer: [0; BUFFER_SIZE],
            position: 0,
        }
    }

    fn contents(&self) -> &str {
        core::str::from_utf8(&self.buffer[..self.position]).unwrap_or("<invalid UTF-8>")
    }

    fn clear(&mut self) {
        self.position = 0;
    }
}

impl Write for LogBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = BUFFER_SIZE - self.position;

        // Full: newer lines are dropped, the early boot ones are worth more.
        if bytes.len() > remaining {
            return Ok(());
        }

        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }
}

enum LoggerState {
    Buffering,
    SinkReady,
}

/// Lock order is `state` then `buffer`, in both `log` and `sink_ready`.
pub struct SupervisorLogger {
    buffer: Mutex<LogBuffer>,
    state: Mutex<LoggerState>,
    sink: OnceCell<Arc<dyn Kernel>>,
}

impl SupervisorLogger {
    const fn new() -> Self {
        SupervisorLogger {
            buffer: Mutex::new(LogBuffer::new()),
            state: Mutex::new(LoggerState::Buffering),
            sink: OnceCell::uninit(),
        }
    }

    fn attach(&self, kernel: Arc<dyn Kernel>) {
        if self.sink.try_init_once(move || kernel).is_ok() {
            self.sink_ready();
        }
    }

    fn sink_ready(&self) {
        let mut state = self.state.lock();
        let mut buffer = self.buffer.lock();

        if let Some(sink) = self.sink.get() {
            if buffer.position > 0 {
                for line in buffer.contents().lines() {
                    sink.output_debug_string(line);
                }
            }
        }
        buffer.clear();
        *state = LoggerState::SinkReady;
    }
}

impl Log for SupervisorLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let state = self.state.lock();
        match *state {
            LoggerState::Buffering => {
                // Still holding `state`: the sink cannot attach and replay
                // the buffer until this line is in it.
                let mut buffer = self.buffer.lock();
                let _ = writeln!(
                    &mut *buffer,
                    "[{:>5}] {}: {}",
                    record.level(),
                    record.target(),
                    record.args()
                );
            }
            LoggerState::SinkReady => {
                drop(state);
                if let Some(sink) = self.sink.get() {
                    let line =
                        format!("[{:>5}] {}: {}", record.level(), record.target(), record.args());
                    sink.output_debug_string(&line);
                }
            }
        }
    }

    fn flush(&self) {}
}

pub static PM_LOGGER: SupervisorLogger = SupervisorLogger::new();

/// Installs the logger. Only the first call in a process succeeds.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&PM_LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Routes output to the kernel's debug channel and replays the buffer.
/// Later calls keep the first sink.
pub fn attach_sink(kernel: Arc<dyn Kernel>) {
    PM_LOGGER.attach(kernel);
}
