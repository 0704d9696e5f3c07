//! Physical frame allocator: a single flat bitmap over usable RAM (spec
//! §4.1). Grounded on the teacher's `BitmapAllocator` in
//! `mm/frame_allocator.rs`, with the teacher's NUMA-aware buddy-allocator
//! layer above it dropped entirely — this kernel has one node, no SMP, and
//! the spec calls for a bitmap allocator and nothing more.

use spin::Mutex;

use crate::config::{FRAME_BITMAP_WORDS, MAX_FRAMES, MAX_RAM_BYTES, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::sync::GlobalState;

use super::PhysAddr;

struct Bitmap {
    /// `1` means free, `0` means allocated.
    words: [u64; FRAME_BITMAP_WORDS],
    base: PhysAddr,
    total_frames: usize,
    free_frames: usize,
}

impl Bitmap {
    const fn empty() -> Self {
        Self {
            words: [0; FRAME_BITMAP_WORDS],
            base: PhysAddr::NULL,
            total_frames: 0,
            free_frames: 0,
        }
    }

    fn new(base: PhysAddr, total_frames: usize) -> Self {
        let mut words = [0u64; FRAME_BITMAP_WORDS];
        let full_words = total_frames / 64;
        for w in words.iter_mut().take(full_words) {
            *w = u64::MAX;
        }
        let remainder = total_frames % 64;
        if remainder != 0 {
            words[full_words] = (1u64 << remainder) - 1;
        }
        Self {
            words,
            base,
            total_frames,
            free_frames: total_frames,
        }
    }

    fn bit(&self, frame: usize) -> bool {
        self.words[frame / 64] & (1 << (frame % 64)) != 0
    }

    fn set_bit(&mut self, frame: usize, free: bool) {
        let word = &mut self.words[frame / 64];
        let mask = 1u64 << (frame % 64);
        if free {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// First-fit scan for `count` contiguous free frames.
    fn find_run(&self, count: usize) -> Option<usize> {
        let mut run_start = 0;
        let mut run_len = 0;
        for frame in 0..self.total_frames {
            if self.bit(frame) {
                if run_len == 0 {
                    run_start = frame;
                }
                run_len += 1;
                if run_len == count {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }
        None
    }

    fn alloc(&mut self, count: usize) -> KernelResult<PhysAddr> {
        if count == 0 {
            return Err(KernelError::InvalidArgument { name: "frame count" });
        }
        let start = self.find_run(count).ok_or(KernelError::OutOfMemory {
            requested: count,
            available: self.free_frames,
        })?;
        for frame in start..start + count {
            self.set_bit(frame, false);
        }
        self.free_frames -= count;
        Ok(self.base.offset((start * PAGE_SIZE) as u64))
    }

    fn free(&mut self, addr: PhysAddr, count: usize) -> KernelResult<()> {
        let start = addr.frame_index(self.base);
        if start + count > self.total_frames {
            return Err(KernelError::InvalidAddress { addr: addr.as_usize() });
        }
        for frame in start..start + count {
            // Idempotent: a frame already marked free is left alone rather
            // than rejected or double-counted.
            if !self.bit(frame) {
                self.set_bit(frame, true);
                self.free_frames += 1;
            }
        }
        Ok(())
    }

    /// Mark a single frame allocated regardless of current state, used to
    /// reserve frames the boot page tables already occupy before the
    /// allocator is handed control of them.
    fn mark_used(&mut self, addr: PhysAddr) {
        let frame = addr.frame_index(self.base);
        if frame >= self.total_frames {
            return;
        }
        if self.bit(frame) {
            self.set_bit(frame, false);
            self.free_frames -= 1;
        }
    }
}

static BITMAP: GlobalState<Mutex<Bitmap>> = GlobalState::new();

/// Initialize the frame allocator over `[ram_base, ram_base + ram_size)`,
/// clamped to [`crate::config::MAX_RAM_BYTES`].
pub fn init(ram_base: PhysAddr, ram_size: u64) {
    let clamped = ram_size.min(MAX_RAM_BYTES);
    let total_frames = (clamped as usize / PAGE_SIZE).min(MAX_FRAMES);
    let _ = BITMAP.init(Mutex::new(Bitmap::new(ram_base, total_frames)));
}

/// Allocate a single physical frame.
pub fn alloc_frame() -> KernelResult<PhysAddr> {
    alloc_contiguous(1)
}

/// Allocate `count` contiguous physical frames.
pub fn alloc_contiguous(count: usize) -> KernelResult<PhysAddr> {
    BITMAP
        .with_mut(|bm| bm.lock().alloc(count))
        .ok_or(KernelError::NotInitialized { subsystem: "frame_allocator" })?
}

/// Free a single physical frame previously returned by [`alloc_frame`].
pub fn free_frame(addr: PhysAddr) -> KernelResult<()> {
    free_pages(addr, 1)
}

/// Free `count` contiguous physical frames previously returned by
/// [`alloc_contiguous`].
pub fn free_pages(addr: PhysAddr, count: usize) -> KernelResult<()> {
    BITMAP
        .with_mut(|bm| bm.lock().free(addr, count))
        .ok_or(KernelError::NotInitialized { subsystem: "frame_allocator" })?
}

/// Reserve `addr` so it is never handed out, used to protect the boot page
/// tables and kernel image frames before the allocator takes over the range
/// that contains them.
pub fn reserve(addr: PhysAddr) {
    BITMAP.with_mut(|bm| bm.lock().mark_used(addr));
}

/// Number of frames currently free.
pub fn free_frames() -> usize {
    BITMAP.with(|bm| bm.lock().free_frames).unwrap_or(0)
}

/// Total number of frames under management.
pub fn total_frames() -> usize {
    BITMAP.with(|bm| bm.lock().total_frames).unwrap_or(0)
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn fresh(frames: usize) -> Mutex<Bitmap> {
        Mutex::new(Bitmap::new(PhysAddr::new(0x4000_0000), frames))
    }

    #[test]
    fn alloc_free_round_trip() {
        let bm = fresh(16);
        let mut bm = bm.lock();
        let addr = bm.alloc(1).unwrap();
        assert_eq!(bm.free_frames, 15);
        bm.free(addr, 1).unwrap();
        assert_eq!(bm.free_frames, 16);
    }

    #[test]
    fn contiguous_alloc_is_first_fit() {
        let bm = fresh(8);
        let mut bm = bm.lock();
        let a = bm.alloc(2).unwrap();
        let b = bm.alloc(2).unwrap();
        assert_eq!(b.as_u64(), a.as_u64() + 2 * PAGE_SIZE as u64);
    }

    #[test]
    fn exhaustion_then_recovery() {
        let bm = fresh(4);
        let mut bm = bm.lock();
        assert!(bm.alloc(4).is_ok());
        assert!(bm.alloc(1).is_err());
        bm.free(PhysAddr::new(0x4000_0000), 4).unwrap();
        assert!(bm.alloc(4).is_ok());
    }

    #[test]
    fn double_free_is_idempotent() {
        let bm = fresh(4);
        let mut bm = bm.lock();
        let addr = bm.alloc(1).unwrap();
        bm.free(addr, 1).unwrap();
        assert_eq!(bm.free_frames, 4);
        bm.free(addr, 1).unwrap();
        assert_eq!(bm.free_frames, 4);
    }

    #[test]
    fn mark_used_reserves_boot_frames() {
        let bm = fresh(4);
        let mut bm = bm.lock();
        bm.mark_used(PhysAddr::new(0x4000_0000));
        assert_eq!(bm.free_frames, 3);
        // Idempotent: marking an already-used frame again doesn't double
        // subtract.
        bm.mark_used(PhysAddr::new(0x4000_0000));
        assert_eq!(bm.free_frames, 3);
    }
}
