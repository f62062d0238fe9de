//! Address-space inspector.
//!
//! The kernel keeps every environment's own page directory and page tables
//! mapped read-only into that environment (`vpd` and `vpt`), so the
//! protection state of any user page can be read without a system call. This
//! module turns those raw entries into a [`PageState`] so that callers never
//! mask bits themselves.

use crate::memlayout::{pdx, pgnum};
use crate::syscall::Syscalls;
use x86_64::structures::paging::{Page, PageTableFlags};
use x86_64::{PhysAddr, VirtAddr};

/// Copy-on-write marker (OS-available bit 11).
pub const PTE_COW: PageTableFlags = PageTableFlags::BIT_11;
/// "Do not protect" marker for pages deliberately shared writable (bit 10).
pub const PTE_SHARE: PageTableFlags = PageTableFlags::BIT_10;
/// All bits the kernel leaves to user software.
pub const PTE_AVAIL: PageTableFlags = PageTableFlags::BIT_9
    .union(PageTableFlags::BIT_10)
    .union(PageTableFlags::BIT_11);
/// Bits a user environment may pass to the page primitives.
pub const PTE_SYSCALL: PageTableFlags = PTE_AVAIL
    .union(PageTableFlags::PRESENT)
    .union(PageTableFlags::WRITABLE)
    .union(PageTableFlags::USER_ACCESSIBLE);

/// Minimum permission of any user mapping.
pub const PTE_USER: PageTableFlags = PageTableFlags::PRESENT.union(PageTableFlags::USER_ACCESSIBLE);
/// Permission of a private, writable user page.
pub const PTE_USER_RW: PageTableFlags = PTE_USER.union(PageTableFlags::WRITABLE);
/// Permission installed on both sides of a copy-on-write page.
pub const PTE_USER_COW: PageTableFlags = PTE_USER.union(PTE_COW);

const PTE_ADDR_MASK: u64 = 0x000f_ffff_ffff_f000;

/// A raw page directory or page table entry.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Pte(u64);

impl Pte {
    pub const EMPTY: Pte = Pte(0);

    pub fn new(frame: PhysAddr, flags: PageTableFlags) -> Self {
        Pte((frame.as_u64() & PTE_ADDR_MASK) | flags.bits())
    }

    pub const fn from_raw(raw: u64) -> Self {
        Pte(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn flags(self) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.0 & !PTE_ADDR_MASK)
    }

    #[inline]
    pub fn addr(self) -> PhysAddr {
        PhysAddr::new(self.0 & PTE_ADDR_MASK)
    }

    #[inline]
    pub fn is_present(self) -> bool {
        self.flags().contains(PageTableFlags::PRESENT)
    }
}

impl core::fmt::Debug for Pte {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pte")
            .field("addr", &format_args!("{:#x}", self.addr().as_u64()))
            .field("flags", &self.flags())
            .finish()
    }
}

/// Protection state of one virtual page, as seen by the COW protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// No page table, or the entry is not present.
    Unmapped,
    /// Present but not user-accessible.
    Supervisor,
    /// Carries `PTE_SHARE`; holds the bits that may be propagated.
    Shared(PageTableFlags),
    /// Marked copy-on-write and not directly writable.
    CopyOnWrite,
    /// Plain private writable page.
    Writable,
    /// Present, user-readable, nothing else.
    ReadOnly,
    /// Marked copy-on-write yet directly writable.
    Inconsistent,
}

impl PageState {
    /// Classify a set of entry flags, shared marker first.
    pub fn classify(flags: PageTableFlags) -> Self {
        if !flags.contains(PageTableFlags::PRESENT) {
            return PageState::Unmapped;
        }
        if !flags.contains(PageTableFlags::USER_ACCESSIBLE) {
            return PageState::Supervisor;
        }
        if flags.contains(PTE_SHARE) {
            return PageState::Shared(flags & PTE_SYSCALL);
        }
        match (flags.contains(PTE_COW), flags.contains(PageTableFlags::WRITABLE)) {
            (true, true) => PageState::Inconsistent,
            (true, false) => PageState::CopyOnWrite,
            (false, true) => PageState::Writable,
            (false, false) => PageState::ReadOnly,
        }
    }

    /// Whether fork carries this page into the child at all.
    pub fn is_user_mapped(self) -> bool {
        !matches!(self, PageState::Unmapped | PageState::Supervisor)
    }
}

/// Whether the page table covering `va` exists.
#[inline]
pub fn table_present<S: Syscalls + ?Sized>(sys: &S, va: VirtAddr) -> bool {
    sys.vpd(pdx(va.as_u64())).is_present()
}

/// The caller's entry for `page`, or `Pte::EMPTY` when no page table covers it.
pub fn pte<S: Syscalls + ?Sized>(sys: &S, page: Page) -> Pte {
    let va = page.start_address();
    if !table_present(sys, va) {
        return Pte::EMPTY;
    }
    sys.vpt(pgnum(va.as_u64()))
}

/// Protection state of `page` in the caller's address space.
pub fn page_state<S: Syscalls + ?Sized>(sys: &S, page: Page) -> PageState {
    PageState::classify(pte(sys, page).flags())
}
