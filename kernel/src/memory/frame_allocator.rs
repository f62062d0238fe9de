//! Physical frame pool
//!
//! A fixed number of 4 KiB frames handed out zeroed, lowest free address
//! first. Backing storage for a frame is created on first allocation.

use super::frame_metadata::FrameMetadata;
use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use libcowfork::memlayout::PGSIZE;
use x86_64::structures::paging::PhysFrame;
use x86_64::PhysAddr;

/// Low memory floor - frames start at 1MiB so that no frame sits at 0x0
const LOW_MEMORY_FLOOR: u64 = 0x100000; // 1 MiB

type FrameData = Box<[u8; PGSIZE as usize]>;

pub struct FrameAllocator {
    /// Contents of each frame, indexed by frame number; `None` until first use
    data: Vec<Option<FrameData>>,
    free: BTreeSet<usize>,
    metadata: FrameMetadata,
    allocated_total: u64,
}

impl FrameAllocator {
    pub fn new(frame_count: usize) -> Self {
        let mut data = Vec::with_capacity(frame_count);
        data.resize_with(frame_count, || None);
        Self {
            data,
            free: (0..frame_count).collect(),
            metadata: FrameMetadata::new(),
            allocated_total: 0,
        }
    }

    fn index(&self, frame: PhysFrame) -> Option<usize> {
        let addr = frame.start_address().as_u64();
        if addr < LOW_MEMORY_FLOOR {
            return None;
        }
        let idx = ((addr - LOW_MEMORY_FLOOR) / PGSIZE) as usize;
        (idx < self.data.len()).then_some(idx)
    }

    fn frame(idx: usize) -> PhysFrame {
        PhysFrame::containing_address(PhysAddr::new(LOW_MEMORY_FLOOR + idx as u64 * PGSIZE))
    }

    /// Allocate a zeroed frame. Its reference count starts at 0; mapping it
    /// takes the first reference.
    pub fn allocate(&mut self) -> Option<PhysFrame> {
        let idx = self.free.pop_first()?;
        self.data[idx]
            .get_or_insert_with(|| Box::new([0u8; PGSIZE as usize]))
            .fill(0);
        self.allocated_total += 1;
        let frame = Self::frame(idx);
        log::trace!("frame_alloc: {:#x}", frame.start_address().as_u64());
        Some(frame)
    }

    /// Return a frame to the pool.
    pub fn deallocate(&mut self, frame: PhysFrame) {
        match self.index(frame) {
            Some(idx) => {
                if !self.free.insert(idx) {
                    log::error!("frame_free: double free of {:#x}", frame.start_address().as_u64());
                }
            }
            None => log::error!("frame_free: {:#x} outside pool", frame.start_address().as_u64()),
        }
    }

    /// Take one reference on `frame`.
    pub fn incref(&mut self, frame: PhysFrame) -> u32 {
        self.metadata.incref(frame)
    }

    /// Drop one reference on `frame`, freeing it when the last one goes.
    pub fn decref(&mut self, frame: PhysFrame) {
        if self.metadata.decref(frame) {
            self.deallocate(frame);
        }
    }

    pub fn refcount(&self, frame: PhysFrame) -> u32 {
        self.metadata.refcount(frame)
    }

    pub fn bytes(&self, frame: PhysFrame) -> Option<&[u8; PGSIZE as usize]> {
        let idx = self.index(frame)?;
        self.data[idx].as_deref()
    }

    pub fn bytes_mut(&mut self, frame: PhysFrame) -> Option<&mut [u8; PGSIZE as usize]> {
        let idx = self.index(frame)?;
        self.data[idx].as_deref_mut()
    }

    /// Frames handed out since creation, including ones freed since.
    pub fn allocated_total(&self) -> u64 {
        self.allocated_total
    }

    pub fn in_use(&self) -> usize {
        self.data.len() - self.free.len()
    }
}
