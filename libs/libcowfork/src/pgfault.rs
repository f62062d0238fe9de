//! Copy-on-write fault handler.
//!
//! Gives the faulting environment a private writable copy of one COW page.
//! Runs on the exception stack and must never write to a COW page itself.

use crate::error::{Error, Invariant};
use crate::memlayout::{uxstack_base, PFTEMP, PGSIZE};
use crate::syscall::{Syscalls, UserSpace};
use crate::trap::{PgfaultHandler, UTrapframe, Upcall};
use crate::types::EnvId;
use crate::vpt::{self, PageState, PTE_USER_RW};
use x86_64::structures::paging::Page;
use x86_64::VirtAddr;

/// Resolve a write fault on a copy-on-write page.
///
/// Anything other than a write to a present COW page is an invariant
/// violation and is returned as such; the kernel then destroys the
/// environment.
pub fn pgfault(sys: &mut dyn UserSpace, utf: &UTrapframe) -> Result<(), Error> {
    let va = utf.fault_va;
    let page: Page = Page::containing_address(va);

    if !utf.is_write() {
        log::error!("pgfault: read fault at {:#x} err={:?}", va.as_u64(), utf.err);
        return Err(Invariant::NotWriteFault { va }.into());
    }
    match vpt::page_state(&*sys, page) {
        PageState::CopyOnWrite => {}
        PageState::Unmapped | PageState::Supervisor => {
            log::error!("pgfault: write to unmapped page {:#x}", va.as_u64());
            return Err(Invariant::PageNotPresent { va }.into());
        }
        state => {
            log::error!("pgfault: write to non-COW page {:#x} ({:?})", va.as_u64(), state);
            return Err(Invariant::NotCopyOnWrite { va }.into());
        }
    }

    let base = page.start_address();
    let scratch = VirtAddr::new(PFTEMP);
    log::debug!("pgfault: copying {:#x} for env {}", base.as_u64(), sys.getenvid());

    sys.page_alloc(EnvId::CURRENT, scratch, PTE_USER_RW)?;

    let mut contents = [0u8; PGSIZE as usize];
    sys.read_bytes(base, &mut contents)?;
    sys.write_bytes(scratch, &contents)?;

    sys.page_map(EnvId::CURRENT, scratch, EnvId::CURRENT, base, PTE_USER_RW)?;
    sys.page_unmap(EnvId::CURRENT, scratch)?;
    Ok(())
}

/// Install `handler` as the calling environment's fault handler.
///
/// The first call also allocates the caller's exception stack. Every call,
/// including each one `fork` makes, registers the upcall again, so the
/// latest handler replaces any earlier one.
pub fn set_pgfault_handler<S: Syscalls + ?Sized>(
    sys: &mut S,
    handler: PgfaultHandler,
) -> Result<(), Error> {
    let me = sys.env_info(EnvId::CURRENT)?;
    if !me.has_pgfault_upcall {
        log::debug!("set_pgfault_handler: allocating exception stack for env {}", me.id);
        sys.page_alloc(EnvId::CURRENT, uxstack_base(), PTE_USER_RW)?;
    }
    sys.env_set_pgfault_upcall(EnvId::CURRENT, Upcall::new(handler))?;
    Ok(())
}
