//! Kernel primitive interface.
//!
//! The exokernel exposes page and environment primitives only; everything
//! fork needs is built on top of these. An implementation of [`Syscalls`]
//! is bound to one calling environment, and [`EnvId::CURRENT`] in any
//! argument names that environment.

use crate::errno::Errno;
use crate::error::Error;
use crate::trap::Upcall;
use crate::types::{EnvId, EnvInfo, EnvStatus, ForkResult};
use crate::vpt::Pte;
use x86_64::structures::paging::PageTableFlags;
use x86_64::VirtAddr;

/// The primitives consumed from the kernel.
pub trait Syscalls {
    /// Id of the calling environment.
    fn getenvid(&self) -> EnvId;

    /// Read-only view of an environment table entry.
    fn env_info(&self, env: EnvId) -> Result<EnvInfo, Errno>;

    /// Create an empty, not-runnable child of the caller.
    ///
    /// Returns the child's id in the parent. The child itself observes
    /// [`ForkResult::Child`] when it first runs.
    fn exofork(&mut self) -> Result<ForkResult, Errno>;

    /// Allocate a zeroed frame and map it at `va` in `env`, replacing any
    /// existing mapping.
    fn page_alloc(&mut self, env: EnvId, va: VirtAddr, perm: PageTableFlags) -> Result<(), Errno>;

    /// Map the frame behind `src_va` in `src_env` at `dst_va` in `dst_env`.
    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: VirtAddr,
        dst_env: EnvId,
        dst_va: VirtAddr,
        perm: PageTableFlags,
    ) -> Result<(), Errno>;

    /// Remove the mapping at `va` in `env`. Unmapping an absent page succeeds.
    fn page_unmap(&mut self, env: EnvId, va: VirtAddr) -> Result<(), Errno>;

    /// Register the fault entry point of `env`.
    fn env_set_pgfault_upcall(&mut self, env: EnvId, upcall: Upcall) -> Result<(), Errno>;

    /// Set `env` runnable or not runnable.
    fn env_set_status(&mut self, env: EnvId, status: EnvStatus) -> Result<(), Errno>;

    /// Page directory entry `pdx` of the caller (the `uvpd` window).
    fn vpd(&self, pdx: usize) -> Pte;

    /// Page table entry for page number `pgnum` of the caller (the `uvpt`
    /// window). Only meaningful when the covering `vpd` entry is present.
    fn vpt(&self, pgnum: usize) -> Pte;
}

/// Loads and stores performed by the calling environment.
///
/// Any access may trap; the kernel then runs the environment's fault upcall
/// and retries, or destroys the environment.
pub trait UserMemory {
    fn read_bytes(&mut self, va: VirtAddr, buf: &mut [u8]) -> Result<(), Error>;

    fn write_bytes(&mut self, va: VirtAddr, data: &[u8]) -> Result<(), Error>;

    fn read_u64(&mut self, va: VirtAddr) -> Result<u64, Error> {
        let mut buf = [0u8; 8];
        self.read_bytes(va, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write_u64(&mut self, va: VirtAddr, value: u64) -> Result<(), Error> {
        self.write_bytes(va, &value.to_le_bytes())
    }
}

/// Everything code running inside an environment can do.
pub trait UserSpace: Syscalls + UserMemory {}

impl<T: Syscalls + UserMemory + ?Sized> UserSpace for T {}
