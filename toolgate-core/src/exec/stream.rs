//! Capped capture of child output streams.
//!
//! Both streams of one child draw from a single shared byte budget, so the
//! combined capture never exceeds the request's `max_bytes`. The first
//! reader to exhaust the budget flags the overflow and wakes the runner,
//! which terminates the process group.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;

const CHUNK_SIZE: usize = 8 * 1024;

/// Shared capture state for one stream.
#[derive(Clone)]
pub(crate) struct CaptureSink {
    buf: Arc<parking_lot::Mutex<Vec<u8>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.buf.lock())
    }

    fn push(&self, bytes: &[u8]) {
        self.buf.lock().extend_from_slice(bytes);
    }
}

/// Take up to `want` bytes from the shared budget.
fn reserve(budget: &AtomicUsize, want: usize) -> usize {
    loop {
        let current = budget.load(Ordering::SeqCst);
        let granted = want.min(current);
        if budget
            .compare_exchange(current, current - granted, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return granted;
        }
    }
}

/// Read `reader` to EOF or budget exhaustion, appending captured bytes to
/// `sink`. On exhaustion, sets `overflowed` and wakes `on_overflow`.
pub(crate) async fn read_capped<R>(
    mut reader: R,
    sink: CaptureSink,
    budget: Arc<AtomicUsize>,
    overflowed: Arc<AtomicBool>,
    on_overflow: Arc<Notify>,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let granted = reserve(&budget, n);
                if granted > 0 {
                    sink.push(&chunk[..granted]);
                }
                if granted < n {
                    overflowed.store(true, Ordering::SeqCst);
                    on_overflow.notify_one();
                    break;
                }
            }
        }
    }
}
