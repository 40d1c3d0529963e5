//! Bulk buffer pools
//!
//! `npools` size classes, class `i` holding buffers of
//! `first_size * size_multiple^i` bytes, each class keeping at most `nbufs`
//! idle buffers. Requests larger than the biggest class are allocated fresh
//! and never pooled.

use parking_lot::Mutex;

use crate::config::BulkPoolConfig;
use crate::error::Result;

struct SizeClass {
    size: usize,
    idle: Mutex<Vec<Vec<u8>>>,
}

pub struct BulkPoolSet {
    classes: Vec<SizeClass>,
    nbufs: usize,
}

impl BulkPoolSet {
    /// Build the pools and pre-allocate every buffer.
    pub fn new(config: &BulkPoolConfig) -> Result<Self> {
        config.validate()?;

        let mut classes = Vec::with_capacity(config.npools);
        let mut size = config.first_size;
        for _ in 0..config.npools {
            let idle = (0..config.nbufs).map(|_| Vec::with_capacity(size)).collect();
            classes.push(SizeClass {
                size,
                idle: Mutex::new(idle),
            });
            size = size.saturating_mul(config.size_multiple);
        }

        tracing::debug!(
            "Bulk pools ready: {} classes x {} buffers, first {} bytes",
            config.npools,
            config.nbufs,
            config.first_size
        );
        Ok(Self {
            classes,
            nbufs: config.nbufs,
        })
    }

    /// A zero-filled buffer of exactly `len` bytes
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        let mut buf = match self.classes.iter().find(|class| class.size >= len) {
            Some(class) => class
                .idle
                .lock()
                .pop()
                .unwrap_or_else(|| Vec::with_capacity(class.size)),
            None => Vec::new(),
        };
        buf.clear();
        buf.resize(len, 0);
        buf
    }

    /// Return a buffer; kept only if a class has room for it.
    ///
    /// Buffers larger than the biggest class are dropped.
    pub fn release(&self, buf: Vec<u8>) {
        let largest = self.classes.last().map_or(0, |class| class.size);
        if buf.capacity() > largest {
            return;
        }
        let Some(class) = self
            .classes
            .iter()
            .rev()
            .find(|class| class.size <= buf.capacity())
        else {
            return;
        };
        let mut idle = class.idle.lock();
        if idle.len() < self.nbufs {
            idle.push(buf);
        }
    }

    /// Idle buffers across all classes
    pub fn idle_buffers(&self) -> usize {
        self.classes.iter().map(|class| class.idle.lock().len()).sum()
    }

    pub fn class_sizes(&self) -> Vec<usize> {
        self.classes.iter().map(|class| class.size).collect()
    }
}
