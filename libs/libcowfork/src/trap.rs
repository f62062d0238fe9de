//! User-level fault delivery.
//!
//! On a user page fault the kernel switches the environment onto its
//! exception stack, pushes a [`UTrapframe`] there and enters the registered
//! [`Upcall`]. The upcall runs the handler and returns; the kernel then
//! restores the trapped context and retries the access.

use crate::error::Error;
use crate::syscall::UserSpace;
use x86_64::structures::idt::PageFaultErrorCode;
use x86_64::VirtAddr;

/// User-level page fault handler.
pub type PgfaultHandler = fn(&mut dyn UserSpace, &UTrapframe) -> Result<(), Error>;

/// Fault record pushed on the exception stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UTrapframe {
    pub fault_va: VirtAddr,
    pub err: PageFaultErrorCode,
}

impl UTrapframe {
    /// Bytes the record occupies on the exception stack.
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..8].copy_from_slice(&self.fault_va.as_u64().to_le_bytes());
        out[8..].copy_from_slice(&self.err.bits().to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut va = [0u8; 8];
        let mut err = [0u8; 8];
        va.copy_from_slice(&bytes[..8]);
        err.copy_from_slice(&bytes[8..]);
        UTrapframe {
            fault_va: VirtAddr::new_truncate(u64::from_le_bytes(va)),
            err: PageFaultErrorCode::from_bits_truncate(u64::from_le_bytes(err)),
        }
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.err.contains(PageFaultErrorCode::CAUSED_BY_WRITE)
    }
}

/// Fault entry point of one environment.
///
/// The kernel stores this in the environment record, so each environment
/// carries its own handler; nothing is process-global.
#[derive(Clone, Copy)]
pub struct Upcall {
    handler: PgfaultHandler,
}

impl Upcall {
    pub const fn new(handler: PgfaultHandler) -> Self {
        Upcall { handler }
    }

    /// Run the handler for one fault.
    pub fn deliver(&self, sys: &mut dyn UserSpace, utf: &UTrapframe) -> Result<(), Error> {
        log::trace!("upcall: fault va={:#x} err={:?}", utf.fault_va.as_u64(), utf.err);
        (self.handler)(sys, utf)
    }
}

impl core::fmt::Debug for Upcall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Upcall")
            .field("handler", &(self.handler as *const ()))
            .finish()
    }
}
