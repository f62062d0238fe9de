//! Unified error type for libcowfork operations.
//!
//! All public functions in libcowfork return `Result<T, Error>`. Every error
//! is fatal to the operation that raised it: nothing here is retried, since a
//! half-finished fork or page fixup cannot be repaired by trying again.

use crate::errno::Errno;
use x86_64::VirtAddr;

/// Unified error type for libcowfork operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A kernel primitive rejected the request.
    Os(Errno),
    /// The address space is not in a state the COW protocol allows.
    Invariant(Invariant),
}

/// A broken address-space invariant.
///
/// These signal a logic error elsewhere in the process, never an expected
/// runtime condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    /// A fault reached the handler for an access that was not a write.
    NotWriteFault { va: VirtAddr },
    /// A fault reached the handler for a page that is not mapped.
    PageNotPresent { va: VirtAddr },
    /// A write fault hit a mapped page that is not marked copy-on-write.
    NotCopyOnWrite { va: VirtAddr },
    /// Duplication was asked to protect a page that is neither writable nor
    /// copy-on-write.
    NotDuplicable { va: VirtAddr },
    /// A page is marked copy-on-write and directly writable at once.
    WritableCopyOnWrite { va: VirtAddr },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No physical frame or environment slot left.
    ResourceExhausted,
    /// Any other rejected primitive call.
    PrimitiveFailed,
    /// A broken address-space invariant.
    InvariantViolated,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Os(e) if e.is_exhaustion() => ErrorKind::ResourceExhausted,
            Error::Os(_) => ErrorKind::PrimitiveFailed,
            Error::Invariant(_) => ErrorKind::InvariantViolated,
        }
    }

    /// The errno reported on the raw ABI. Invariant violations surface as
    /// `EFAULT`.
    pub fn errno(&self) -> Errno {
        match self {
            Error::Os(e) => *e,
            Error::Invariant(_) => Errno::EFAULT,
        }
    }

    /// Negative errno, as returned by the raw ABI.
    #[inline]
    pub fn to_raw(&self) -> i64 {
        -self.errno().raw()
    }
}

impl From<Errno> for Error {
    fn from(e: Errno) -> Self {
        Error::Os(e)
    }
}

impl From<Invariant> for Error {
    fn from(i: Invariant) -> Self {
        Error::Invariant(i)
    }
}

impl core::fmt::Display for Invariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Invariant::NotWriteFault { va } => write!(f, "non-write fault at {:#x}", va.as_u64()),
            Invariant::PageNotPresent { va } => write!(f, "fault on unmapped page {:#x}", va.as_u64()),
            Invariant::NotCopyOnWrite { va } => {
                write!(f, "write fault on non-COW page {:#x}", va.as_u64())
            }
            Invariant::NotDuplicable { va } => {
                write!(f, "page {:#x} is neither writable nor COW", va.as_u64())
            }
            Invariant::WritableCopyOnWrite { va } => {
                write!(f, "page {:#x} is both writable and COW", va.as_u64())
            }
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Os(e) => write!(f, "{}", e),
            Error::Invariant(i) => write!(f, "invariant violated: {}", i),
        }
    }
}
