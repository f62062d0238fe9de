//! Per-environment two-level page table
//!
//! One directory of `NPDENTRIES` slots, each covering 4 MiB through a page
//! table of `NPTENTRIES` entries. Page tables are created on first insert
//! and kept until the address space is dropped.

use super::frame_allocator::FrameAllocator;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use libcowfork::memlayout::{pdx, pgnum, ptx, NPDENTRIES, NPTENTRIES, PGSIZE, PTSIZE};
use libcowfork::vpt::{Pte, PTE_USER_RW};
use x86_64::structures::paging::{PageTableFlags, PhysFrame};
use x86_64::{PhysAddr, VirtAddr};

type PageTablePage = Box<[Pte; NPTENTRIES]>;

#[derive(Default)]
pub struct AddressSpace {
    tables: BTreeMap<usize, PageTablePage>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory entry `index`. Page tables are not backed by frames here, so
    /// a present entry carries flags only.
    pub fn pde(&self, index: usize) -> Pte {
        if self.tables.contains_key(&index) {
            Pte::new(PhysAddr::zero(), PTE_USER_RW)
        } else {
            Pte::EMPTY
        }
    }

    /// Entry for page number `pn`. Pages past the 32-bit range are never mapped.
    pub fn pte(&self, pn: usize) -> Pte {
        if pn >= NPDENTRIES * NPTENTRIES {
            return Pte::EMPTY;
        }
        let va = pn as u64 * PGSIZE;
        self.tables
            .get(&pdx(va))
            .map(|table| table[ptx(va)])
            .unwrap_or(Pte::EMPTY)
    }

    /// Present entry mapping `va`, if any.
    pub fn lookup(&self, va: VirtAddr) -> Option<Pte> {
        let pte = self.pte(pgnum(va.as_u64()));
        pte.is_present().then_some(pte)
    }

    /// Map `frame` at `va` with `perm`, replacing any existing mapping.
    ///
    /// The new frame is referenced before the old one is released, so
    /// re-inserting the frame already mapped at `va` is safe.
    pub fn insert(&mut self, frames: &mut FrameAllocator, va: VirtAddr, frame: PhysFrame, perm: PageTableFlags) {
        frames.incref(frame);
        let addr = va.as_u64();
        let table = self
            .tables
            .entry(pdx(addr))
            .or_insert_with(|| Box::new([Pte::EMPTY; NPTENTRIES]));
        let old = core::mem::replace(&mut table[ptx(addr)], Pte::new(frame.start_address(), perm));
        if old.is_present() {
            frames.decref(PhysFrame::containing_address(old.addr()));
        }
    }

    /// Unmap `va`. Returns whether a mapping was removed.
    pub fn remove(&mut self, frames: &mut FrameAllocator, va: VirtAddr) -> bool {
        let addr = va.as_u64();
        let Some(table) = self.tables.get_mut(&pdx(addr)) else {
            return false;
        };
        let old = core::mem::replace(&mut table[ptx(addr)], Pte::EMPTY);
        if old.is_present() {
            frames.decref(PhysFrame::containing_address(old.addr()));
        }
        old.is_present()
    }

    /// Every present mapping as (address, entry), ascending.
    pub fn mappings(&self) -> Vec<(VirtAddr, Pte)> {
        self.tables
            .iter()
            .flat_map(|(&dir, table)| {
                table.iter().enumerate().filter(|(_, pte)| pte.is_present()).map(move |(i, pte)| {
                    (VirtAddr::new(dir as u64 * PTSIZE + i as u64 * PGSIZE), *pte)
                })
            })
            .collect()
    }

    /// Drop every mapping, releasing the frames.
    pub fn clear(&mut self, frames: &mut FrameAllocator) {
        for (_, pte) in self.mappings() {
            frames.decref(PhysFrame::containing_address(pte.addr()));
        }
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libcowfork::vpt::PTE_USER;

    #[test]
    fn insert_creates_table_and_entry() {
        let mut frames = FrameAllocator::new(4);
        let mut space = AddressSpace::new();
        let va = VirtAddr::new(0x0080_1000);
        let frame = frames.allocate().unwrap();

        assert!(!space.pde(pdx(va.as_u64())).is_present());
        space.insert(&mut frames, va, frame, PTE_USER);
        assert!(space.pde(pdx(va.as_u64())).is_present());
        let pte = space.lookup(va).unwrap();
        assert_eq!(pte.addr(), frame.start_address());
        assert_eq!(pte.flags(), PTE_USER);
        assert_eq!(frames.refcount(frame), 1);
    }

    #[test]
    fn addresses_past_4gib_do_not_alias_low_pages() {
        let mut frames = FrameAllocator::new(4);
        let mut space = AddressSpace::new();
        let va = VirtAddr::new(0x0080_0000);
        let frame = frames.allocate().unwrap();
        space.insert(&mut frames, va, frame, PTE_USER);

        assert!(space.lookup(va + (1u64 << 32)).is_none());
        assert!(!space.pte(pgnum(va.as_u64()) + NPDENTRIES * NPTENTRIES).is_present());
    }

    #[test]
    fn remapping_same_frame_keeps_it_alive() {
        let mut frames = FrameAllocator::new(4);
        let mut space = AddressSpace::new();
        let va = VirtAddr::new(0x0080_0000);
        let frame = frames.allocate().unwrap();
        space.insert(&mut frames, va, frame, PTE_USER_RW);
        space.insert(&mut frames, va, frame, PTE_USER);
        assert_eq!(frames.refcount(frame), 1);
        assert_eq!(frames.in_use(), 1);
    }

    #[test]
    fn replacing_and_removing_release_frames() {
        let mut frames = FrameAllocator::new(4);
        let mut space = AddressSpace::new();
        let va = VirtAddr::new(0x0080_0000);
        let first = frames.allocate().unwrap();
        let second = frames.allocate().unwrap();
        space.insert(&mut frames, va, first, PTE_USER_RW);
        space.insert(&mut frames, va, second, PTE_USER_RW);
        assert_eq!(frames.in_use(), 1);

        assert!(space.remove(&mut frames, va));
        assert!(!space.remove(&mut frames, va));
        assert_eq!(frames.in_use(), 0);
    }

    #[test]
    fn mappings_lists_addresses_in_order() {
        let mut frames = FrameAllocator::new(4);
        let mut space = AddressSpace::new();
        for va in [0x0c00_0000u64, 0x0080_2000, 0x0080_0000] {
            let frame = frames.allocate().unwrap();
            space.insert(&mut frames, VirtAddr::new(va), frame, PTE_USER);
        }
        let vas: Vec<u64> = space.mappings().iter().map(|(va, _)| va.as_u64()).collect();
        assert_eq!(vas, vec![0x0080_0000, 0x0080_2000, 0x0c00_0000]);
        space.clear(&mut frames);
        assert_eq!(frames.in_use(), 0);
    }
}
