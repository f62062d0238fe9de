//! Userspace fork with copy-on-write.
//!
//! The kernel only provides an empty child (`exofork`) and page primitives.
//! [`fork`] walks the caller's user range and, page by page, lets
//! [`duppage`] decide how the child sees it:
//!
//! - pages marked `PTE_SHARE` are mapped into the child with the same
//!   permissions and stay writable on both sides,
//! - writable and COW pages become COW in the child and then in the parent,
//! - read-only pages are mapped read-only.
//!
//! The child then gets a fresh exception stack and the COW fault upcall, and
//! is marked runnable. Any failure aborts the fork; the half-built child is
//! left not runnable.

use crate::error::{Error, Invariant};
use crate::memlayout::{in_fork_range, uxstack_base, PGSIZE, PTSIZE, USTACKTOP, UTEXT};
use crate::pgfault::{pgfault, set_pgfault_handler};
use crate::process::UserEnv;
use crate::syscall::{Syscalls, UserSpace};
use crate::trap::Upcall;
use crate::types::{EnvId, EnvStatus, ForkResult};
use crate::vpt::{self, PageState, PTE_USER, PTE_USER_COW, PTE_USER_RW};
use x86_64::structures::paging::Page;
use x86_64::VirtAddr;

/// Progress of a fork in the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkStage {
    /// The child exists but has no mappings.
    Created,
    /// Every qualifying page has been duplicated.
    AddressSpaceCloned,
    /// The child has its exception stack and fault upcall.
    FaultingReady,
    /// The kernel may schedule the child.
    Runnable,
}

/// How many pages of each kind a fork duplicated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DupCounts {
    pub shared: usize,
    pub cow: usize,
    pub read_only: usize,
}

impl DupCounts {
    fn record(&mut self, state: PageState) {
        match state {
            PageState::Shared(_) => self.shared += 1,
            PageState::ReadOnly => self.read_only += 1,
            _ => self.cow += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.shared + self.cow + self.read_only
    }
}

/// Map `page` of the caller into `child` at the same address.
///
/// Returns the classification the decision was based on.
pub fn duppage<S: Syscalls + ?Sized>(sys: &mut S, child: EnvId, page: Page) -> Result<PageState, Error> {
    let va = page.start_address();
    let state = vpt::page_state(&*sys, page);
    match state {
        PageState::Shared(perm) => {
            log::trace!("duppage: {:#x} shared {:?}", va.as_u64(), perm);
            sys.page_map(EnvId::CURRENT, va, child, va, perm)?;
        }
        PageState::Writable | PageState::CopyOnWrite | PageState::Inconsistent => {
            share_cow(sys, child, page)?;
        }
        PageState::ReadOnly => {
            log::trace!("duppage: {:#x} read-only", va.as_u64());
            sys.page_map(EnvId::CURRENT, va, child, va, PTE_USER)?;
        }
        PageState::Unmapped | PageState::Supervisor => {
            return Err(Invariant::PageNotPresent { va }.into());
        }
    }
    Ok(state)
}

/// Install `page` copy-on-write in `child`, then narrow the caller's own
/// mapping to the same permissions.
///
/// The child is mapped first: a fault in the caller between the two calls
/// still finds its page writable, not half-protected.
pub fn share_cow<S: Syscalls + ?Sized>(sys: &mut S, child: EnvId, page: Page) -> Result<(), Error> {
    let va = page.start_address();
    match vpt::page_state(&*sys, page) {
        PageState::Writable | PageState::CopyOnWrite => {}
        PageState::Inconsistent => {
            log::error!("duppage: {:#x} is writable and COW at once", va.as_u64());
            return Err(Invariant::WritableCopyOnWrite { va }.into());
        }
        _ => return Err(Invariant::NotDuplicable { va }.into()),
    }
    log::trace!("duppage: {:#x} copy-on-write", va.as_u64());
    sys.page_map(EnvId::CURRENT, va, child, va, PTE_USER_COW)?;
    sys.page_map(EnvId::CURRENT, va, EnvId::CURRENT, va, PTE_USER_COW)?;
    Ok(())
}

/// Duplicate every user page in `[UTEXT, USTACKTOP)` into `child`.
///
/// Directory slots without a page table are skipped whole.
pub fn clone_address_space<S: Syscalls + ?Sized>(sys: &mut S, child: EnvId) -> Result<DupCounts, Error> {
    let mut counts = DupCounts::default();
    let mut va = UTEXT;
    while va < USTACKTOP {
        let addr = VirtAddr::new(va);
        if !vpt::table_present(&*sys, addr) {
            va = (va & !(PTSIZE - 1)) + PTSIZE;
            continue;
        }
        debug_assert!(in_fork_range(addr));
        let page: Page = Page::containing_address(addr);
        if vpt::page_state(&*sys, page).is_user_mapped() {
            counts.record(duppage(sys, child, page)?);
        }
        va += PGSIZE;
    }
    Ok(counts)
}

/// Create a copy-on-write child of the calling environment.
///
/// Returns `ForkResult::Parent(child)` in the parent and `ForkResult::Child`
/// in the child.
pub fn fork<S: UserSpace>(env: &mut UserEnv<S>) -> Result<ForkResult, Error> {
    let child = match env.sys().exofork()? {
        ForkResult::Child => {
            env.refresh_thisenv();
            log::debug!("fork: running as child {}", env.thisenv());
            return Ok(ForkResult::Child);
        }
        ForkResult::Parent(child) => child,
    };
    let parent = env.thisenv();
    log::info!("fork[{}->{}] child created", parent, child);

    let sys = env.sys();
    let abort = |stage: ForkStage, e: Error| {
        log::error!("fork[{}->{}] aborted after {:?}: {}", parent, child, stage, e);
        e
    };

    set_pgfault_handler(sys, pgfault).map_err(|e| abort(ForkStage::Created, e))?;
    let counts = clone_address_space(sys, child).map_err(|e| abort(ForkStage::Created, e))?;
    log::info!(
        "fork[{}->{}] cloned {} pages: {} cow, {} shared, {} read-only",
        parent,
        child,
        counts.total(),
        counts.cow,
        counts.shared,
        counts.read_only
    );

    sys.page_alloc(child, uxstack_base(), PTE_USER_RW)
        .map_err(|e| abort(ForkStage::AddressSpaceCloned, e.into()))?;
    sys.env_set_pgfault_upcall(child, Upcall::new(pgfault))
        .map_err(|e| abort(ForkStage::AddressSpaceCloned, e.into()))?;
    sys.env_set_status(child, EnvStatus::Runnable)
        .map_err(|e| abort(ForkStage::FaultingReady, e.into()))?;

    log::debug!("fork[{}->{}] {:?}", parent, child, ForkStage::Runnable);
    Ok(ForkResult::Parent(child))
}

/// [`fork`] on the integer ABI: child id in the parent, 0 in the child,
/// negative errno on failure.
pub fn fork_raw<S: UserSpace>(env: &mut UserEnv<S>) -> i64 {
    match fork(env) {
        Ok(result) => result.into_raw(),
        Err(e) => e.to_raw(),
    }
}
