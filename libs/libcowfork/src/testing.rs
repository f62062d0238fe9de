//! Recording fake of the kernel primitives for unit tests.
//!
//! Keeps a single flat page table for the caller and logs every primitive
//! call, so tests can check the exact sequence a routine issues.

use crate::errno::Errno;
use crate::error::Error;
use crate::memlayout::{pdx, pgnum, PGSIZE};
use crate::syscall::{Syscalls, UserMemory};
use crate::trap::Upcall;
use crate::types::{EnvId, EnvInfo, EnvStatus, ForkResult};
use crate::vpt::{Pte, PTE_USER_RW};
use std::collections::BTreeMap;
use std::vec::Vec;
use x86_64::structures::paging::PageTableFlags;
use x86_64::{PhysAddr, VirtAddr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exofork,
    Alloc(EnvId, VirtAddr, PageTableFlags),
    Map(EnvId, VirtAddr, EnvId, VirtAddr, PageTableFlags),
    Unmap(EnvId, VirtAddr),
    SetUpcall(EnvId),
    SetStatus(EnvId, EnvStatus),
    Read(VirtAddr, usize),
    Write(VirtAddr, usize),
}

impl Call {
    pub fn dst_va(&self) -> VirtAddr {
        match self {
            Call::Alloc(_, va, _) | Call::Unmap(_, va) => *va,
            Call::Map(_, _, _, va, _) => *va,
            Call::Read(va, _) | Call::Write(va, _) => *va,
            _ => VirtAddr::zero(),
        }
    }
}

pub struct FakeSys {
    /// Caller's page table, keyed by page number.
    table: BTreeMap<usize, Pte>,
    next_frame: u64,
    has_upcall: bool,
    pub calls: Vec<Call>,
    /// Report `ForkResult::Child` from `exofork`.
    pub as_child: bool,
    pub fail_exofork: Option<Errno>,
    /// Reject every `page_map` whose destination is this environment.
    pub fail_map_to: Option<EnvId>,
    pub fail_alloc: Option<Errno>,
}

impl FakeSys {
    pub const PARENT: EnvId = EnvId::from_raw(0x1000);
    pub const CHILD: EnvId = EnvId::from_raw(0x1001);

    pub fn new() -> Self {
        FakeSys {
            table: BTreeMap::new(),
            next_frame: 0x10_0000,
            has_upcall: false,
            calls: Vec::new(),
            as_child: false,
            fail_exofork: None,
            fail_map_to: None,
            fail_alloc: None,
        }
    }

    /// Map a fresh frame at `va` in the caller without recording a call.
    pub fn map(&mut self, va: u64, flags: PageTableFlags) {
        let frame = PhysAddr::new(self.next_frame);
        self.next_frame += PGSIZE;
        self.table.insert(pgnum(va), Pte::new(frame, flags));
    }

    pub fn flags(&self, va: u64) -> PageTableFlags {
        self.table.get(&pgnum(va)).copied().unwrap_or_default().flags()
    }

    fn is_me(&self, env: EnvId) -> bool {
        env.is_current() || env == self.getenvid()
    }
}

impl Syscalls for FakeSys {
    fn getenvid(&self) -> EnvId {
        if self.as_child {
            Self::CHILD
        } else {
            Self::PARENT
        }
    }

    fn env_info(&self, env: EnvId) -> Result<EnvInfo, Errno> {
        if !self.is_me(env) {
            return Err(Errno::ESRCH);
        }
        Ok(EnvInfo {
            id: self.getenvid(),
            parent_id: None,
            status: EnvStatus::Runnable,
            has_pgfault_upcall: self.has_upcall,
        })
    }

    fn exofork(&mut self) -> Result<ForkResult, Errno> {
        self.calls.push(Call::Exofork);
        if let Some(e) = self.fail_exofork {
            return Err(e);
        }
        if self.as_child {
            Ok(ForkResult::Child)
        } else {
            Ok(ForkResult::Parent(Self::CHILD))
        }
    }

    fn page_alloc(&mut self, env: EnvId, va: VirtAddr, perm: PageTableFlags) -> Result<(), Errno> {
        self.calls.push(Call::Alloc(env, va, perm));
        if let Some(e) = self.fail_alloc {
            return Err(e);
        }
        if self.is_me(env) {
            self.map(va.as_u64(), perm);
        }
        Ok(())
    }

    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: VirtAddr,
        dst_env: EnvId,
        dst_va: VirtAddr,
        perm: PageTableFlags,
    ) -> Result<(), Errno> {
        self.calls.push(Call::Map(src_env, src_va, dst_env, dst_va, perm));
        if self.fail_map_to == Some(dst_env) {
            return Err(Errno::ENOMEM);
        }
        let src = self.table.get(&pgnum(src_va.as_u64())).copied().ok_or(Errno::EINVAL)?;
        if self.is_me(dst_env) {
            self.table.insert(pgnum(dst_va.as_u64()), Pte::new(src.addr(), perm));
        }
        Ok(())
    }

    fn page_unmap(&mut self, env: EnvId, va: VirtAddr) -> Result<(), Errno> {
        self.calls.push(Call::Unmap(env, va));
        if self.is_me(env) {
            self.table.remove(&pgnum(va.as_u64()));
        }
        Ok(())
    }

    fn env_set_pgfault_upcall(&mut self, env: EnvId, _upcall: Upcall) -> Result<(), Errno> {
        self.calls.push(Call::SetUpcall(env));
        if self.is_me(env) {
            self.has_upcall = true;
        }
        Ok(())
    }

    fn env_set_status(&mut self, env: EnvId, status: EnvStatus) -> Result<(), Errno> {
        self.calls.push(Call::SetStatus(env, status));
        Ok(())
    }

    fn vpd(&self, index: usize) -> Pte {
        let any = self.table.keys().any(|&pn| pdx((pn as u64) * PGSIZE) == index);
        if any {
            Pte::new(PhysAddr::new(0), PTE_USER_RW)
        } else {
            Pte::EMPTY
        }
    }

    fn vpt(&self, pn: usize) -> Pte {
        self.table.get(&pn).copied().unwrap_or_default()
    }
}

impl UserMemory for FakeSys {
    fn read_bytes(&mut self, va: VirtAddr, buf: &mut [u8]) -> Result<(), Error> {
        self.calls.push(Call::Read(va, buf.len()));
        if !self.vpt(pgnum(va.as_u64())).is_present() {
            return Err(Errno::EFAULT.into());
        }
        buf.fill(0xa5);
        Ok(())
    }

    fn write_bytes(&mut self, va: VirtAddr, data: &[u8]) -> Result<(), Error> {
        self.calls.push(Call::Write(va, data.len()));
        let flags = self.vpt(pgnum(va.as_u64())).flags();
        if !flags.contains(PageTableFlags::WRITABLE) {
            return Err(Errno::EFAULT.into());
        }
        Ok(())
    }
}
