//! Per-process library state.

use crate::error::Error;
use crate::fork;
use crate::pgfault;
use crate::syscall::UserSpace;
use crate::trap::PgfaultHandler;
use crate::types::{EnvId, ForkResult};

/// The library's view of the environment it runs in.
///
/// Bundles the kernel handle with `thisenv`, the cached id of the running
/// environment. A forked child starts with a copy of its parent's state, so
/// `fork` refreshes `thisenv` on the child path.
#[derive(Debug)]
pub struct UserEnv<S> {
    sys: S,
    thisenv: EnvId,
}

impl<S: UserSpace> UserEnv<S> {
    pub fn new(sys: S) -> Self {
        let thisenv = sys.getenvid();
        UserEnv { sys, thisenv }
    }

    /// State as inherited from another environment; `thisenv` is whatever
    /// the parent had cached.
    pub fn with_thisenv(sys: S, thisenv: EnvId) -> Self {
        UserEnv { sys, thisenv }
    }

    /// Copy of this state bound to another kernel handle, i.e. what a forked
    /// child finds in its memory before `fork` returns there.
    pub fn inherit(&self, sys: S) -> Self {
        UserEnv::with_thisenv(sys, self.thisenv)
    }

    #[inline]
    pub fn thisenv(&self) -> EnvId {
        self.thisenv
    }

    pub(crate) fn refresh_thisenv(&mut self) {
        self.thisenv = self.sys.getenvid();
    }

    #[inline]
    pub fn sys(&mut self) -> &mut S {
        &mut self.sys
    }

    pub fn into_inner(self) -> S {
        self.sys
    }

    pub fn set_pgfault_handler(&mut self, handler: PgfaultHandler) -> Result<(), Error> {
        pgfault::set_pgfault_handler(&mut self.sys, handler)
    }

    /// See [`fork::fork`].
    pub fn fork(&mut self) -> Result<ForkResult, Error> {
        fork::fork(self)
    }

    /// See [`fork::fork_raw`].
    pub fn fork_raw(&mut self) -> i64 {
        fork::fork_raw(self)
    }
}
