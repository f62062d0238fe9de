//! System call handler implementations
//!
//! Argument validation follows the exokernel rules: addresses must be page
//! aligned and below `UTOP`, permissions must include `P|U` and nothing
//! outside `PTE_SYSCALL`, and environments other than the caller must be
//! its direct children.

use super::SyscallNumber;
use crate::KernelState;
use libcowfork::memlayout::{PGSIZE, UTOP};
use libcowfork::vpt::{Pte, PTE_SYSCALL, PTE_USER};
use libcowfork::{EnvId, EnvInfo, EnvStatus, Errno, ForkResult, Upcall};
use x86_64::structures::paging::{PageTableFlags, PhysFrame};
use x86_64::VirtAddr;

fn check_va(va: VirtAddr) -> Result<(), Errno> {
    if va.as_u64() >= UTOP || va.as_u64() % PGSIZE != 0 {
        return Err(Errno::EINVAL);
    }
    Ok(())
}

fn check_perm(perm: PageTableFlags) -> Result<(), Errno> {
    if !perm.contains(PTE_USER) || !PTE_SYSCALL.contains(perm) {
        return Err(Errno::EINVAL);
    }
    Ok(())
}

impl KernelState {
    /// Resolve `id` as seen by `cur`.
    ///
    /// With `checkperm` the target must be `cur` itself or one of its
    /// immediate children.
    pub(crate) fn envid2env(&self, cur: EnvId, id: EnvId, checkperm: bool) -> Result<EnvId, Errno> {
        let caller = self.envs.get(cur)?;
        if id.is_current() {
            return Ok(caller.id);
        }
        let target = self.envs.get(id)?;
        if checkperm && target.id != caller.id && target.parent_id != Some(caller.id) {
            log::debug!("envid2env: [{}] may not touch {}", cur, id);
            return Err(Errno::ESRCH);
        }
        Ok(target.id)
    }

    pub(crate) fn sys_env_info(&self, cur: EnvId, env: EnvId) -> Result<EnvInfo, Errno> {
        let id = self.envid2env(cur, env, false)?;
        Ok(self.envs.get(id)?.info())
    }

    /// Allocate a zeroed frame and map it at `va` in `env`.
    pub(crate) fn sys_page_alloc(
        &mut self,
        cur: EnvId,
        env: EnvId,
        va: VirtAddr,
        perm: PageTableFlags,
    ) -> Result<(), Errno> {
        let target = self.envid2env(cur, env, true)?;
        check_va(va)?;
        check_perm(perm)?;

        let KernelState { frames, envs, .. } = self;
        let env = envs.get_mut(target)?;
        let frame = frames.allocate().ok_or_else(|| {
            log::warn!("{}: [{}] out of frames", SyscallNumber::PageAlloc.name(), cur);
            Errno::ENOMEM
        })?;
        env.space.insert(frames, va, frame, perm);
        log::debug!(
            "{}: [{}] {}:{:#x} -> {:#x} {:?}",
            SyscallNumber::PageAlloc.name(),
            cur,
            target,
            va.as_u64(),
            frame.start_address().as_u64(),
            perm
        );
        Ok(())
    }

    /// Map the frame behind `src_va` in `src_env` at `dst_va` in `dst_env`.
    pub(crate) fn sys_page_map(
        &mut self,
        cur: EnvId,
        src_env: EnvId,
        src_va: VirtAddr,
        dst_env: EnvId,
        dst_va: VirtAddr,
        perm: PageTableFlags,
    ) -> Result<(), Errno> {
        let src = self.envid2env(cur, src_env, true)?;
        let dst = self.envid2env(cur, dst_env, true)?;
        check_va(src_va)?;
        check_va(dst_va)?;
        check_perm(perm)?;

        let pte = self.envs.get(src)?.space.lookup(src_va).ok_or(Errno::EINVAL)?;
        if perm.contains(PageTableFlags::WRITABLE) && !pte.flags().contains(PageTableFlags::WRITABLE) {
            return Err(Errno::EINVAL);
        }
        let frame = PhysFrame::containing_address(pte.addr());

        let KernelState { frames, envs, .. } = self;
        envs.get_mut(dst)?.space.insert(frames, dst_va, frame, perm);
        log::debug!(
            "{}: [{}] {}:{:#x} -> {}:{:#x} {:?}",
            SyscallNumber::PageMap.name(),
            cur,
            src,
            src_va.as_u64(),
            dst,
            dst_va.as_u64(),
            perm
        );
        Ok(())
    }

    /// Unmap `va` in `env`; an absent page is not an error.
    pub(crate) fn sys_page_unmap(&mut self, cur: EnvId, env: EnvId, va: VirtAddr) -> Result<(), Errno> {
        let target = self.envid2env(cur, env, true)?;
        check_va(va)?;

        let KernelState { frames, envs, .. } = self;
        let removed = envs.get_mut(target)?.space.remove(frames, va);
        log::debug!(
            "{}: [{}] {}:{:#x}{}",
            SyscallNumber::PageUnmap.name(),
            cur,
            target,
            va.as_u64(),
            if removed { "" } else { " (absent)" }
        );
        Ok(())
    }

    /// Create a child of `cur` with an empty address space.
    ///
    /// A child that has not yet returned from its creating exofork holds
    /// `pending_exofork`; its own first exofork completes that return
    /// instead of creating another environment.
    pub(crate) fn sys_exofork(&mut self, cur: EnvId) -> Result<ForkResult, Errno> {
        let caller = self.envs.get_mut(cur)?;
        if caller.pending_exofork {
            caller.pending_exofork = false;
            log::debug!("{}: [{}] returns in child", SyscallNumber::Exofork.name(), cur);
            return Ok(ForkResult::Child);
        }

        let child = self.envs.alloc(Some(cur)).map_err(|e| {
            log::warn!("{}: [{}] environment table full", SyscallNumber::Exofork.name(), cur);
            e
        })?;
        self.envs.get_mut(child)?.pending_exofork = true;
        log::debug!("{}: [{}] created {}", SyscallNumber::Exofork.name(), cur, child);
        Ok(ForkResult::Parent(child))
    }

    pub(crate) fn sys_env_set_status(&mut self, cur: EnvId, env: EnvId, status: EnvStatus) -> Result<(), Errno> {
        if !matches!(status, EnvStatus::Runnable | EnvStatus::NotRunnable) {
            return Err(Errno::EINVAL);
        }
        let target = self.envid2env(cur, env, true)?;
        self.envs.get_mut(target)?.status = status;
        log::debug!("{}: [{}] {} -> {:?}", SyscallNumber::EnvSetStatus.name(), cur, target, status);
        Ok(())
    }

    pub(crate) fn sys_env_set_pgfault_upcall(&mut self, cur: EnvId, env: EnvId, upcall: Upcall) -> Result<(), Errno> {
        let target = self.envid2env(cur, env, true)?;
        self.envs.get_mut(target)?.pgfault_upcall = Some(upcall);
        log::debug!("{}: [{}] {} {:?}", SyscallNumber::EnvSetPgfaultUpcall.name(), cur, target, upcall);
        Ok(())
    }

    pub(crate) fn sys_env_destroy(&mut self, cur: EnvId, env: EnvId) -> Result<(), Errno> {
        let target = self.envid2env(cur, env, true)?;
        log::debug!("{}: [{}] {}", SyscallNumber::EnvDestroy.name(), cur, target);
        self.env_destroy(target);
        Ok(())
    }

    /// Tear down `id`, releasing its frames. Returns false if it was
    /// already gone.
    pub(crate) fn env_destroy(&mut self, id: EnvId) -> bool {
        let KernelState { frames, envs, .. } = self;
        match envs.get_mut(id) {
            Ok(env) => {
                env.release(frames);
                envs.free(id);
                log::info!("env {} destroyed", id);
                true
            }
            Err(_) => false,
        }
    }

    /// Directory entry `pdx` of `cur`, as seen through its `uvpd` window.
    pub(crate) fn vpd(&self, cur: EnvId, pdx: usize) -> Pte {
        self.envs.get(cur).map(|env| env.space.pde(pdx)).unwrap_or(Pte::EMPTY)
    }

    /// Entry for page number `pgnum` of `cur`, through its `uvpt` window.
    pub(crate) fn vpt(&self, cur: EnvId, pgnum: usize) -> Pte {
        self.envs.get(cur).map(|env| env.space.pte(pgnum)).unwrap_or(Pte::EMPTY)
    }
}
