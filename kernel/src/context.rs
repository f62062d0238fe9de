//! Execution context of one environment
//!
//! A [`UserContext`] is what code running inside an environment holds: it
//! issues primitives as that environment and performs its loads and stores,
//! taking page faults through the registered upcall.

use crate::trap::page_fault::FatalFault;
use crate::trap::AccessError;
use crate::{Kernel, KernelState};
use libcowfork::memlayout::PGSIZE;
use libcowfork::vpt::Pte;
use libcowfork::{EnvId, EnvInfo, EnvStatus, Errno, Error, ForkResult, Syscalls, Upcall, UserMemory};
use x86_64::structures::idt::PageFaultErrorCode;
use x86_64::structures::paging::PageTableFlags;
use x86_64::VirtAddr;

pub struct UserContext {
    kernel: Kernel,
    env: EnvId,
}

impl UserContext {
    pub(crate) fn new(kernel: Kernel, env: EnvId) -> Self {
        UserContext { kernel, env }
    }

    pub fn env(&self) -> EnvId {
        self.env
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Destroy `env`, which must be the caller or one of its children.
    pub fn env_destroy(&mut self, env: EnvId) -> Result<(), Errno> {
        self.kernel.lock().sys_env_destroy(self.env, env)
    }

    /// Reflect a fault to the upcall and run it.
    fn deliver_fault(&mut self, va: VirtAddr, err: PageFaultErrorCode) -> Result<(), Error> {
        let begun = self.kernel.lock().begin_fault(self.env, va, err);
        let (upcall, utf) = begun.map_err(|_| Error::Os(Errno::EFAULT))?;

        let result = upcall.deliver(self, &utf);

        let mut state = self.kernel.lock();
        match result {
            Ok(()) => {
                state.end_fault(self.env);
                Ok(())
            }
            Err(e) => {
                log::warn!("[{}] pgfault handler failed: {}", self.env, e);
                state.fatal_fault(self.env, va, err, FatalFault::HandlerFailed);
                Err(e)
            }
        }
    }

    /// Run a single-page access, taking at most one fault.
    fn with_fault_retry<F>(&mut self, mut op: F) -> Result<(), Error>
    where
        F: FnMut(&mut KernelState) -> Result<(), AccessError>,
    {
        let first = op(&mut *self.kernel.lock());
        let (va, err) = match first {
            Ok(()) => return Ok(()),
            Err(AccessError::NoEnv) => return Err(Errno::ESRCH.into()),
            Err(AccessError::Fault { va, err }) => (va, err),
        };

        self.deliver_fault(va, err)?;

        let retry = op(&mut *self.kernel.lock());
        match retry {
            Ok(()) => Ok(()),
            Err(AccessError::NoEnv) => Err(Errno::ESRCH.into()),
            Err(AccessError::Fault { va, err }) => {
                self.kernel.lock().fatal_fault(self.env, va, err, FatalFault::Unresolved);
                Err(Errno::EFAULT.into())
            }
        }
    }
}

/// Split `[va, va + len)` into page-bounded pieces of (address, start, length).
fn page_chunks(va: VirtAddr, len: usize) -> impl Iterator<Item = (VirtAddr, usize, usize)> {
    let mut done = 0usize;
    core::iter::from_fn(move || {
        if done >= len {
            return None;
        }
        let addr = va + done as u64;
        let room = (PGSIZE - addr.as_u64() % PGSIZE) as usize;
        let n = room.min(len - done);
        let chunk = (addr, done, n);
        done += n;
        Some(chunk)
    })
}

impl Syscalls for UserContext {
    fn getenvid(&self) -> EnvId {
        self.env
    }

    fn env_info(&self, env: EnvId) -> Result<EnvInfo, Errno> {
        self.kernel.lock().sys_env_info(self.env, env)
    }

    fn exofork(&mut self) -> Result<ForkResult, Errno> {
        self.kernel.lock().sys_exofork(self.env)
    }

    fn page_alloc(&mut self, env: EnvId, va: VirtAddr, perm: PageTableFlags) -> Result<(), Errno> {
        self.kernel.lock().sys_page_alloc(self.env, env, va, perm)
    }

    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: VirtAddr,
        dst_env: EnvId,
        dst_va: VirtAddr,
        perm: PageTableFlags,
    ) -> Result<(), Errno> {
        self.kernel
            .lock()
            .sys_page_map(self.env, src_env, src_va, dst_env, dst_va, perm)
    }

    fn page_unmap(&mut self, env: EnvId, va: VirtAddr) -> Result<(), Errno> {
        self.kernel.lock().sys_page_unmap(self.env, env, va)
    }

    fn env_set_pgfault_upcall(&mut self, env: EnvId, upcall: Upcall) -> Result<(), Errno> {
        self.kernel.lock().sys_env_set_pgfault_upcall(self.env, env, upcall)
    }

    fn env_set_status(&mut self, env: EnvId, status: EnvStatus) -> Result<(), Errno> {
        self.kernel.lock().sys_env_set_status(self.env, env, status)
    }

    fn vpd(&self, pdx: usize) -> Pte {
        self.kernel.lock().vpd(self.env, pdx)
    }

    fn vpt(&self, pgnum: usize) -> Pte {
        self.kernel.lock().vpt(self.env, pgnum)
    }
}

impl UserMemory for UserContext {
    fn read_bytes(&mut self, va: VirtAddr, buf: &mut [u8]) -> Result<(), Error> {
        let env = self.env;
        for (addr, start, n) in page_chunks(va, buf.len()) {
            let chunk = &mut buf[start..start + n];
            self.with_fault_retry(|state| state.copy_in(env, addr, chunk))?;
        }
        Ok(())
    }

    fn write_bytes(&mut self, va: VirtAddr, data: &[u8]) -> Result<(), Error> {
        let env = self.env;
        for (addr, start, n) in page_chunks(va, data.len()) {
            let chunk = &data[start..start + n];
            self.with_fault_retry(|state| state.copy_out(env, addr, chunk))?;
        }
        Ok(())
    }
}

impl core::fmt::Debug for UserContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserContext").field("env", &self.env).finish()
    }
}
