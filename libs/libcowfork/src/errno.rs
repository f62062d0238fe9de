//! POSIX errno values
//!
//! The kernel primitives report failures with these numbers (negated on the
//! raw ABI). Only the values the page and environment calls can produce are
//! listed.

/// Error numbers returned by the kernel primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum Errno {
    /// Operation not permitted
    EPERM = 1,
    /// No such process (stale, free, or foreign environment id)
    ESRCH = 3,
    /// Resource temporarily unavailable (environment table full)
    EAGAIN = 11,
    /// Out of memory (no free physical frame)
    ENOMEM = 12,
    /// Bad address (user access to an unmapped or protected page)
    EFAULT = 14,
    /// Invalid argument (bad address, alignment, or permission set)
    EINVAL = 22,
}

impl Errno {
    /// The positive errno number.
    #[inline]
    pub const fn raw(self) -> i64 {
        self as i64
    }

    /// Whether this errno reports exhaustion of a kernel resource rather than
    /// a rejected request.
    pub const fn is_exhaustion(self) -> bool {
        matches!(self, Errno::ENOMEM | Errno::EAGAIN)
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Errno::EPERM => "operation not permitted",
            Errno::ESRCH => "bad environment",
            Errno::EAGAIN => "out of environments",
            Errno::ENOMEM => "out of memory",
            Errno::EFAULT => "bad address",
            Errno::EINVAL => "invalid parameter",
        };
        write!(f, "{} ({:?})", msg, self)
    }
}
