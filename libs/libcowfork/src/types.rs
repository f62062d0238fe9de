//! Common types used across libcowfork

/// log2 of the maximum number of environments.
pub const LOG2NENV: u32 = 10;
/// Maximum number of simultaneously live environments.
pub const NENV: usize = 1 << LOG2NENV;
/// Shift of the generation counter inside an environment id.
pub const ENVGENSHIFT: u32 = 12;

/// Environment (process) id.
///
/// The low `LOG2NENV` bits index the kernel's environment table; the bits
/// from `ENVGENSHIFT` up carry a generation so stale ids are rejected. Id 0
/// always names the calling environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EnvId(u32);

impl EnvId {
    /// The calling environment, as accepted by every primitive.
    pub const CURRENT: EnvId = EnvId(0);

    pub const fn from_raw(raw: u32) -> Self {
        EnvId(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Slot in the environment table.
    #[inline]
    pub const fn index(self) -> usize {
        (self.0 as usize) & (NENV - 1)
    }

    #[inline]
    pub const fn is_current(self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for EnvId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Scheduling status of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Free,
    Dying,
    Runnable,
    NotRunnable,
}

/// Read-only snapshot of an environment table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvInfo {
    pub id: EnvId,
    /// `None` for the root environment.
    pub parent_id: Option<EnvId>,
    pub status: EnvStatus,
    pub has_pgfault_upcall: bool,
}

/// Outcome of `exofork` and `fork` as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkResult {
    /// The caller is the parent; the child has the given id.
    Parent(EnvId),
    /// The caller is the freshly created child.
    Child,
}

impl ForkResult {
    /// Raw ABI value: the child id in the parent, 0 in the child.
    pub const fn into_raw(self) -> i64 {
        match self {
            ForkResult::Parent(child) => child.raw() as i64,
            ForkResult::Child => 0,
        }
    }

    pub const fn is_child(self) -> bool {
        matches!(self, ForkResult::Child)
    }
}
