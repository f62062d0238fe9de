//! User address-space layout shared by the library and the kernel.
//!
//! ```text
//!   UTOP, UXSTACKTOP -> +------------------------------+ 0xeec00000
//!                       |     user exception stack     | PGSIZE
//!                       +------------------------------+ 0xeebff000
//!                       |        empty (guard)         | PGSIZE
//!          USTACKTOP -> +------------------------------+ 0xeebfe000
//!                       |     normal user stack        |
//!                       +------------------------------+
//!                       :   program data, heap, bss    :
//!              UTEXT -> +------------------------------+ 0x00800000
//!             PFTEMP -> |  fault handler scratch page  | 0x007ff000
//!                       +------------------------------+
//!              UTEMP -> |        temporary maps        | 0x00400000
//!                       +------------------------------+ 0
//! ```

use static_assertions::const_assert;
use static_assertions::const_assert_eq;
use x86_64::VirtAddr;

/// Bytes per page.
pub const PGSIZE: u64 = 4096;
/// log2(PGSIZE)
pub const PGSHIFT: u64 = 12;
/// Page table entries per page table.
pub const NPTENTRIES: usize = 1024;
/// Page directory entries per page directory.
pub const NPDENTRIES: usize = 1024;
/// Bytes mapped by one page directory entry.
pub const PTSIZE: u64 = PGSIZE * NPTENTRIES as u64;
/// Offset of the directory index in a linear address.
pub const PDXSHIFT: u64 = 22;

/// Top of user-accessible memory.
pub const UTOP: u64 = 0xeec0_0000;
/// Top of the one-page user exception stack.
pub const UXSTACKTOP: u64 = UTOP;
/// Top of the normal user stack; one guard page below the exception stack.
pub const USTACKTOP: u64 = UTOP - 2 * PGSIZE;
/// Where user programs generally begin.
pub const UTEXT: u64 = 2 * PTSIZE;
/// Used for temporary page mappings.
pub const UTEMP: u64 = PTSIZE;
/// Scratch page the fault handler maps its fresh copy at.
pub const PFTEMP: u64 = UTEMP + PTSIZE - PGSIZE;

const_assert_eq!(1 << PGSHIFT, PGSIZE);
const_assert_eq!(1 << PDXSHIFT, PTSIZE);
const_assert!(PFTEMP < UTEXT);
const_assert!(USTACKTOP < UXSTACKTOP - PGSIZE);
const_assert_eq!(UTOP % PTSIZE, 0);

/// Page number of a linear address.
#[inline]
pub const fn pgnum(va: u64) -> usize {
    (va >> PGSHIFT) as usize
}

/// Page directory index of a linear address.
#[inline]
pub const fn pdx(va: u64) -> usize {
    ((va >> PDXSHIFT) as usize) & (NPDENTRIES - 1)
}

/// Page table index of a linear address.
#[inline]
pub const fn ptx(va: u64) -> usize {
    ((va >> PGSHIFT) as usize) & (NPTENTRIES - 1)
}

/// Base of the page holding the user exception stack.
#[inline]
pub fn uxstack_base() -> VirtAddr {
    VirtAddr::new(UXSTACKTOP - PGSIZE)
}

/// Whether `va` lies in the range fork duplicates.
#[inline]
pub fn in_fork_range(va: VirtAddr) -> bool {
    (UTEXT..USTACKTOP).contains(&va.as_u64())
}
