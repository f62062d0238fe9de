//! Environment record

use crate::memory::{AddressSpace, FrameAllocator};
use libcowfork::{EnvId, EnvInfo, EnvStatus, Upcall};

/// An environment: one address space plus the state the kernel keeps to
/// schedule it and deliver its faults.
pub struct Env {
    pub id: EnvId,

    /// Environment that created this one; `None` for the root environment
    pub parent_id: Option<EnvId>,

    pub status: EnvStatus,

    pub space: AddressSpace,

    /// User-level fault entry point, if one was registered
    pub pgfault_upcall: Option<Upcall>,

    /// Created by exofork and not yet resumed: the next exofork issued by
    /// this environment returns the child side instead of creating one
    pub pending_exofork: bool,

    /// Currently running on its exception stack
    pub in_exception: bool,
}

impl Env {
    pub fn new(id: EnvId, parent_id: Option<EnvId>) -> Self {
        Env {
            id,
            parent_id,
            status: EnvStatus::NotRunnable,
            space: AddressSpace::new(),
            pgfault_upcall: None,
            pending_exofork: false,
            in_exception: false,
        }
    }

    pub fn info(&self) -> EnvInfo {
        EnvInfo {
            id: self.id,
            parent_id: self.parent_id,
            status: self.status,
            has_pgfault_upcall: self.pgfault_upcall.is_some(),
        }
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.status == EnvStatus::Runnable
    }

    /// Release every frame the environment maps.
    pub fn release(&mut self, frames: &mut FrameAllocator) {
        self.space.clear(frames);
        self.pgfault_upcall = None;
        self.status = EnvStatus::Dying;
    }
}

impl core::fmt::Debug for Env {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Env")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("status", &self.status)
            .field("pgfault_upcall", &self.pgfault_upcall.is_some())
            .field("in_exception", &self.in_exception)
            .finish()
    }
}
