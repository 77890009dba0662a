//! Single-slot task runner.
//!
//! Long-running supervisory operations (asynchronous launches, terminations,
//! reboot preparation, firmlaunch) are handed from the IPC-serving thread to
//! one dedicated worker thread. The handoff is a rendezvous: a producer blocks
//! until the worker has taken its task, never until the task has run, and the
//! worker runs tasks strictly one at a time in submission order.
//!
//! A panic inside a task is a broken supervisor invariant. The worker logs it
//! and aborts the process instead of unwinding only its own thread.
//!
//! # Architecture
//!
//! - `TaskRunner<C>`: producer side, owned by the context `C`
//! - Worker thread: holds an `Arc<C>` and hands each task a `&C`
//! - `flush()`: queues a sentinel and waits for it, so every task submitted
//!   before the call has finished when it returns

use core::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use spin::Mutex;

use crate::config::TASK_ARG_BUDGET;
use crate::error::PmError;

/// A queued operation. Receives the context the worker was started with.
pub type Task<C> = Box<dyn FnOnce(&C) + Send + 'static>;

enum Message<C> {
    Run(Task<C>),
    /// Flush sentinel: acknowledged once every earlier task has run.
    Flush(SyncSender<()>),
}

/// Compile-time check that a task's captured arguments fit the budget.
struct TaskArgs<F>(PhantomData<F>);

impl<F> TaskArgs<F> {
    const FITS: () = assert!(
        core::mem::size_of::<F>() <= TASK_ARG_BUDGET,
        "task arguments exceed the task runner budget"
    );
}

pub struct TaskRunner<C: 'static> {
    sender: Mutex<SyncSender<Message<C>>>,
    receiver: Mutex<Option<Receiver<Message<C>>>>,
    name: &'static str,
}

impl<C: Send + Sync + 'static> TaskRunner<C> {
    pub fn new(name: &'static str) -> Self {
        let (sender, receiver) = mpsc::sync_channel(0);
        TaskRunner {
            sender: Mutex::new(sender),
            receiver: Mutex::new(Some(receiver)),
            name,
        }
    }

    /// Starts the worker thread. Only the first call has any effect.
    pub fn spawn_worker(&self, context: Arc<C>) -> Result<(), PmError> {
        let receiver = match self.receiver.lock().take() {
            Some(receiver) => receiver,
            None => return Ok(()),
        };

        let name = self.name;
        thread::Builder::new()
            .name(name.into())
            .spawn(move || worker_thread(name, context, receiver))
            .map_err(|err| {
                log::error!("task_runner({}): failed to spawn worker: {}", self.name, err);
                PmError::ThreadSpawn
            })?;
        log::info!("TASK_RUNNER_SPAWN: {} started", self.name);
        Ok(())
    }

    /// Hands `task` to the worker. Blocks until the worker is free to take
    /// it, returns before `task` runs.
    pub fn run<F>(&self, task: F)
    where
        F: FnOnce(&C) + Send + 'static,
    {
        let () = TaskArgs::<F>::FITS;
        self.send(Message::Run(Box::new(task)));
    }

    /// Waits until every task queued before this call has run.
    ///
    /// Must not be called from inside a task: the sentinel would queue behind
    /// the caller.
    pub fn flush(&self) {
        let (ack, done) = mpsc::sync_channel(1);
        if self.send(Message::Flush(ack)) {
            let _ = done.recv();
        }
    }

    fn send(&self, message: Message<C>) -> bool {
        let sender = self.sender.lock().clone();
        match sender.send(message) {
            Ok(()) => true,
            Err(_) => {
                log::error!("task_runner({}): worker is gone, task dropped", self.name);
                false
            }
        }
    }
}

fn worker_thread<C>(name: &'static str, context: Arc<C>, receiver: Receiver<Message<C>>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker_loop(context, receiver)));
    if outcome.is_err() {
        log::error!("task_runner({}): task panicked, aborting", name);
        std::process::abort();
    }
}

fn worker_loop<C>(context: Arc<C>, receiver: Receiver<Message<C>>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(task) => task(context.as_ref()),
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
