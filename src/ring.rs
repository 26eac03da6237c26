//! Lock-free SPSC byte ring buffer between the capture thread and the
//! JACK process callback.
//!
//! One producer advances the write cursor, one consumer advances the
//! read cursor, and neither side ever touches the other's cursor. That
//! single-ownership rule is what makes the buffer safe without locks:
//! a cursor is published with a Release store only after the bytes it
//! covers have been copied, and the opposite side observes it with an
//! Acquire load.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared {
    storage: Box<[UnsafeCell<u8>]>,
    mask: usize,
    /// Monotonic byte counts; position in storage is `cursor & mask`.
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

// The storage is only ever written through the producer half and read
// through the consumer half, over disjoint index ranges guarded by the
// cursors.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn base(&self) -> *mut u8 {
        // UnsafeCell<u8> is repr(transparent) over u8
        self.storage.as_ptr() as *mut u8
    }
}

/// Create a matched producer/consumer pair over a buffer of `capacity`
/// bytes. `capacity` must be a power of two.
pub fn with_capacity(capacity: usize) -> (Producer, Consumer) {
    assert!(capacity.is_power_of_two(), "capacity must be power of 2");

    let storage = (0..capacity)
        .map(|_| UnsafeCell::new(0u8))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(Shared {
        storage,
        mask: capacity - 1,
        write_pos: AtomicUsize::new(0),
        read_pos: AtomicUsize::new(0),
    });

    (
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    )
}

/// Writing half. Lives on the capture thread.
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Bytes of free space. Never under-reports: the consumer can only
    /// make more room between this call and a subsequent `write`.
    pub fn free(&self) -> usize {
        let w = self.shared.write_pos.load(Ordering::Relaxed);
        let r = self.shared.read_pos.load(Ordering::Acquire);
        self.shared.capacity() - w.wrapping_sub(r)
    }

    /// Copy as much of `data` as fits and return the number of bytes
    /// written. Never blocks, never overwrites unread payload.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let w = self.shared.write_pos.load(Ordering::Relaxed);
        let r = self.shared.read_pos.load(Ordering::Acquire);
        let free = self.shared.capacity() - w.wrapping_sub(r);
        let n = data.len().min(free);
        if n == 0 {
            return 0;
        }

        let idx = w & self.shared.mask;
        let first = n.min(self.shared.capacity() - idx);
        unsafe {
            let base = self.shared.base();
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(idx), first);
            std::ptr::copy_nonoverlapping(data.as_ptr().add(first), base, n - first);
        }

        // Publish the payload before the cursor advance becomes visible
        self.shared
            .write_pos
            .store(w.wrapping_add(n), Ordering::Release);
        n
    }
}

/// Reading half. Lives inside the real-time render callback, so every
/// method here is wait-free and allocation-free.
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Bytes of unread payload.
    pub fn available(&self) -> usize {
        let w = self.shared.write_pos.load(Ordering::Acquire);
        let r = self.shared.read_pos.load(Ordering::Relaxed);
        w.wrapping_sub(r)
    }

    /// Copy at most `dest.len()` bytes out, in FIFO order, and return
    /// the number of bytes read. Never blocks, possibly zero.
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let w = self.shared.write_pos.load(Ordering::Acquire);
        let r = self.shared.read_pos.load(Ordering::Relaxed);
        let available = w.wrapping_sub(r);
        let n = dest.len().min(available);
        if n == 0 {
            return 0;
        }

        let idx = r & self.shared.mask;
        let first = n.min(self.shared.capacity() - idx);
        unsafe {
            let base = self.shared.base();
            std::ptr::copy_nonoverlapping(base.add(idx), dest.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(base, dest.as_mut_ptr().add(first), n - first);
        }

        // Reclaim the space only after the bytes have been copied out
        self.shared
            .read_pos
            .store(r.wrapping_add(n), Ordering::Release);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let (mut prod, mut cons) = with_capacity(64);

        assert_eq!(prod.write(&[1, 2, 3, 4, 5]), 5);
        let mut out = [0u8; 3];
        assert_eq!(cons.read(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);

        assert_eq!(prod.write(&[6, 7]), 2);
        let mut out = [0u8; 8];
        assert_eq!(cons.read(&mut out), 4);
        assert_eq!(&out[..4], &[4, 5, 6, 7]);
    }

    #[test]
    fn test_conservation() {
        let (mut prod, mut cons) = with_capacity(16);
        assert_eq!(prod.free() + cons.available(), 16);

        prod.write(&[0u8; 10]);
        assert_eq!(prod.free(), 6);
        assert_eq!(cons.available(), 10);
        assert_eq!(prod.free() + cons.available(), 16);

        let mut out = [0u8; 7];
        cons.read(&mut out);
        assert_eq!(prod.free() + cons.available(), 16);
        assert_eq!(cons.available(), 3);
    }

    #[test]
    fn test_truncated_write_when_full() {
        let (mut prod, cons) = with_capacity(1024);

        assert_eq!(prod.write(&vec![0xAAu8; 1024]), 1024);
        assert_eq!(prod.free(), 0);
        assert_eq!(cons.available(), 1024);

        // Buffer is full: a further write must land zero bytes
        assert_eq!(prod.write(&[0u8; 10]), 0);
        assert_eq!(cons.available(), 1024);
    }

    #[test]
    fn test_partial_write_reports_count() {
        let (mut prod, _cons) = with_capacity(8);
        assert_eq!(prod.write(&[1, 2, 3, 4, 5, 6]), 6);
        // Only 2 bytes of room left
        assert_eq!(prod.write(&[7, 8, 9, 10]), 2);
    }

    #[test]
    fn test_read_bounded_by_available() {
        let (mut prod, mut cons) = with_capacity(32);
        prod.write(&[9, 8, 7]);

        let mut out = [0u8; 16];
        assert_eq!(cons.read(&mut out), 3);
        assert_eq!(&out[..3], &[9, 8, 7]);
        // Nothing stale beyond the write cursor
        assert_eq!(cons.read(&mut out), 0);
    }

    #[test]
    fn test_wrap_around() {
        let (mut prod, mut cons) = with_capacity(8);
        let mut out = [0u8; 8];

        // Move the cursors near the end of the storage
        prod.write(&[0; 6]);
        cons.read(&mut out[..6]);

        // This write spans the wrap point
        assert_eq!(prod.write(&[1, 2, 3, 4, 5]), 5);
        assert_eq!(cons.read(&mut out), 5);
        assert_eq!(&out[..5], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_cross_thread_fifo() {
        let (mut prod, mut cons) = with_capacity(256);
        const TOTAL: usize = 100_000;

        let writer = std::thread::spawn(move || {
            let mut next = 0usize;
            while next < TOTAL {
                let chunk: Vec<u8> = (next..(next + 32).min(TOTAL))
                    .map(|v| (v % 251) as u8)
                    .collect();
                let written = prod.write(&chunk);
                next += written;
                if written == 0 {
                    std::thread::yield_now();
                }
            }
        });

        let mut seen = 0usize;
        let mut buf = [0u8; 64];
        while seen < TOTAL {
            let n = cons.read(&mut buf);
            for &b in &buf[..n] {
                assert_eq!(b, (seen % 251) as u8, "byte {} out of order", seen);
                seen += 1;
            }
            if n == 0 {
                std::thread::yield_now();
            }
        }

        writer.join().unwrap();
    }
}
