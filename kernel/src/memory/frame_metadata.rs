//! Frame metadata for Copy-on-Write reference counting
//!
//! Each physical frame reachable from a page table needs a reference count
//! (how many page table entries point at it).
//!
//! Design decisions:
//! - Uses BTreeMap for sparse storage (only mapped frames are tracked)
//! - Untracked frames have refcount=0: allocated but not yet mapped, or free
//! - One table per kernel instance, guarded by the kernel state lock

use alloc::collections::BTreeMap;
use x86_64::structures::paging::PhysFrame;

#[derive(Debug, Default)]
pub struct FrameMetadata {
    /// Number of page table entries referencing each frame, by start address
    refcounts: BTreeMap<u64, u32>,
}

impl FrameMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment reference count for a frame
    /// Called whenever a page table entry starts pointing at the frame
    pub fn incref(&mut self, frame: PhysFrame) -> u32 {
        let count = self.refcounts.entry(frame.start_address().as_u64()).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrement reference count for a frame
    /// Returns true if frame can be freed (refcount reached 0)
    pub fn decref(&mut self, frame: PhysFrame) -> bool {
        let addr = frame.start_address().as_u64();
        match self.refcounts.get_mut(&addr) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.refcounts.remove(&addr);
                true
            }
            None => {
                // Allocated but never mapped: nobody else can hold it.
                log::warn!("frame_decref: frame {:#x} not tracked, allowing free", addr);
                true
            }
        }
    }

    /// Get current reference count for a frame
    pub fn refcount(&self, frame: PhysFrame) -> u32 {
        self.refcounts
            .get(&frame.start_address().as_u64())
            .copied()
            .unwrap_or(0)
    }
}
