//! Fixed pool of descriptor scratch buffers.
//!
//! Descriptors are large, and a launch with dependencies needs two at once.
//! Buffers are preallocated at boot and handed out through a lock-free queue;
//! a [`PooledDescriptor`] returns its buffer when dropped.

use core::ops::{Deref, DerefMut};

use crossbeam_queue::ArrayQueue;

use crate::config::{MAX_DEPENDENCIES, MAX_SERVICE_ACCESS};
use crate::platform::Descriptor;

pub struct DescriptorPool {
    free: ArrayQueue<Box<Descriptor>>,
}

impl DescriptorPool {
    pub fn new(size: usize) -> Self {
        let free = ArrayQueue::new(size);
        for _ in 0..size {
            let descriptor = Box::new(Descriptor {
                dependencies: Vec::with_capacity(MAX_DEPENDENCIES),
                service_access: Vec::with_capacity(MAX_SERVICE_ACCESS),
                ..Descriptor::default()
            });
            // Cannot fail: the queue was sized for exactly this many.
            let _ = free.push(descriptor);
        }
        DescriptorPool { free }
    }

    /// Buffers currently available.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Takes a cleared buffer from the pool.
    ///
    /// # Panics
    ///
    /// Panics when every buffer is in use.
    pub fn acquire(&self) -> PooledDescriptor<'_> {
        match self.free.pop() {
            Some(mut descriptor) => {
                descriptor.clear();
                PooledDescriptor {
                    pool: self,
                    descriptor: Some(descriptor),
                }
            }
            None => panic!(
                "descriptor pool exhausted ({} buffers in use)",
                self.free.capacity()
            ),
        }
    }
}

pub struct PooledDescriptor<'a> {
    pool: &'a DescriptorPool,
    descriptor: Option<Box<Descriptor>>,
}

impl Deref for PooledDescriptor<'_> {
    type Target = Descriptor;

    fn deref(&self) -> &Descriptor {
        match &self.descriptor {
            Some(descriptor) => descriptor,
            None => unreachable!("pooled descriptor used after release"),
        }
    }
}

impl DerefMut for PooledDescriptor<'_> {
    fn deref_mut(&mut self) -> &mut Descriptor {
        match &mut self.descriptor {
            Some(descriptor) => descriptor,
            None => unreachable!("pooled descriptor used after release"),
        }
    }
}

impl Drop for PooledDescriptor<'_> {
    fn drop(&mut self) {
        if let Some(descriptor) = self.descriptor.take() {
            let _ = self.pool.free.push(descriptor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_return_on_drop() {
        let pool = DescriptorPool::new(2);
        {
            let mut a = pool.acquire();
            a.title_id = 0x1234;
            a.dependencies.push(0x5678);
            let _b = pool.acquire();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 2);

        // Reacquired buffers come back cleared.
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(a.title_id, 0);
        assert_eq!(b.title_id, 0);
        assert!(a.dependencies.is_empty() && b.dependencies.is_empty());
    }

    #[test]
    #[should_panic(expected = "descriptor pool exhausted")]
    fn exhaustion_is_fatal() {
        let pool = DescriptorPool::new(1);
        let _a = pool.acquire();
        let _b = pool.acquire();
    }
}
