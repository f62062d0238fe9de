//! Page fault delivery
//!
//! The kernel side of a user fault: checking an access against the
//! environment's table, pushing the trap frame on the exception stack and
//! deciding when a fault is fatal. Running the upcall happens outside the
//! kernel lock, in [`crate::context`].

use super::AccessError;
use crate::KernelState;
use libcowfork::memlayout::{PGSIZE, UTOP, UXSTACKTOP};
use libcowfork::{EnvId, Upcall, UTrapframe};
use x86_64::structures::idt::PageFaultErrorCode;
use x86_64::structures::paging::{PageTableFlags, PhysFrame};
use x86_64::VirtAddr;

/// Why a fault could not be reflected to user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalFault {
    NoUpcall,
    /// Faulted while already running the handler
    Nested,
    /// The exception stack page is missing or read-only
    BadExceptionStack,
    /// The handler returned but the access still faults
    Unresolved,
    /// The handler reported an error
    HandlerFailed,
    /// The environment no longer exists
    Destroyed,
}

impl KernelState {
    /// Frame backing a user access to `va`, or the fault it raises.
    pub(crate) fn user_frame(&self, env: EnvId, va: VirtAddr, write: bool) -> Result<PhysFrame, AccessError> {
        let env = self.envs.get(env).map_err(|_| AccessError::NoEnv)?;
        let mut err = PageFaultErrorCode::USER_MODE;
        if write {
            err |= PageFaultErrorCode::CAUSED_BY_WRITE;
        }
        // UTOP and up is kernel-only
        if va.as_u64() >= UTOP {
            return Err(AccessError::Fault {
                va,
                err: err | PageFaultErrorCode::PROTECTION_VIOLATION,
            });
        }
        let Some(pte) = env.space.lookup(va) else {
            return Err(AccessError::Fault { va, err });
        };
        let flags = pte.flags();
        if !flags.contains(PageTableFlags::USER_ACCESSIBLE) || (write && !flags.contains(PageTableFlags::WRITABLE)) {
            return Err(AccessError::Fault {
                va,
                err: err | PageFaultErrorCode::PROTECTION_VIOLATION,
            });
        }
        Ok(PhysFrame::containing_address(pte.addr()))
    }

    /// Load `buf.len()` bytes at `va`; the range must not cross a page.
    pub(crate) fn copy_in(&self, env: EnvId, va: VirtAddr, buf: &mut [u8]) -> Result<(), AccessError> {
        let frame = self.user_frame(env, va, false)?;
        let offset = (va.as_u64() % PGSIZE) as usize;
        let bytes = self.frames.bytes(frame).ok_or(AccessError::NoEnv)?;
        buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
        Ok(())
    }

    /// Store `data` at `va`; the range must not cross a page.
    pub(crate) fn copy_out(&mut self, env: EnvId, va: VirtAddr, data: &[u8]) -> Result<(), AccessError> {
        let frame = self.user_frame(env, va, true)?;
        let offset = (va.as_u64() % PGSIZE) as usize;
        let bytes = self.frames.bytes_mut(frame).ok_or(AccessError::NoEnv)?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Switch `env` onto its exception stack for a fault at `va`.
    ///
    /// Pushes the trap frame at the top of the exception stack and returns
    /// the upcall together with the frame as the handler will read it. If
    /// the fault cannot be delivered the environment is destroyed.
    pub(crate) fn begin_fault(
        &mut self,
        id: EnvId,
        va: VirtAddr,
        err: PageFaultErrorCode,
    ) -> Result<(Upcall, UTrapframe), FatalFault> {
        let env = self.envs.get(id).map_err(|_| FatalFault::Destroyed)?;
        let (upcall, in_exception) = (env.pgfault_upcall, env.in_exception);
        let upcall = match upcall {
            Some(upcall) if !in_exception => upcall,
            Some(_) => return Err(self.fatal_fault(id, va, err, FatalFault::Nested)),
            None => return Err(self.fatal_fault(id, va, err, FatalFault::NoUpcall)),
        };

        let utf = UTrapframe { fault_va: va, err };
        let slot = VirtAddr::new(UXSTACKTOP - UTrapframe::SIZE as u64);
        if self.copy_out(id, slot, &utf.to_bytes()).is_err() {
            return Err(self.fatal_fault(id, va, err, FatalFault::BadExceptionStack));
        }
        let mut pushed = [0u8; UTrapframe::SIZE];
        if self.copy_in(id, slot, &mut pushed).is_err() {
            return Err(self.fatal_fault(id, va, err, FatalFault::BadExceptionStack));
        }

        if let Ok(env) = self.envs.get_mut(id) {
            env.in_exception = true;
        }
        self.stats.delivered += 1;
        log::trace!("page_fault: [{}] va={:#x} err={:?} -> upcall", id, va.as_u64(), err);
        Ok((upcall, UTrapframe::from_bytes(&pushed)))
    }

    /// Return `env` from its exception stack to the trapped context.
    pub(crate) fn end_fault(&mut self, id: EnvId) {
        if let Ok(env) = self.envs.get_mut(id) {
            env.in_exception = false;
        }
    }

    /// Record a fault `env` cannot survive and destroy it.
    pub(crate) fn fatal_fault(
        &mut self,
        id: EnvId,
        va: VirtAddr,
        err: PageFaultErrorCode,
        reason: FatalFault,
    ) -> FatalFault {
        log::error!(
            "page_fault: [{}] user fault va={:#x} err={:?}: {:?}, destroying",
            id,
            va.as_u64(),
            err,
            reason
        );
        if self.env_destroy(id) {
            self.stats.fatal += 1;
        }
        reason
    }
}
