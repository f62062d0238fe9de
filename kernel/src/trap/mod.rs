//! User page fault handling
//!
//! Faults raised by user loads and stores are reflected to the faulting
//! environment's upcall on its exception stack, or kill the environment.

pub mod page_fault;

use x86_64::structures::idt::PageFaultErrorCode;
use x86_64::VirtAddr;

/// Why a user access did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The access trapped at `va`.
    Fault { va: VirtAddr, err: PageFaultErrorCode },
    /// The environment no longer exists.
    NoEnv,
}

/// Fault counters for one kernel instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    /// Faults handed to a user upcall
    pub delivered: u64,
    /// Faults that destroyed their environment
    pub fatal: u64,
}
