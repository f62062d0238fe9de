//! Hosted exokernel
//!
//! An in-process model of the exokernel that `libcowfork` runs on: a pool
//! of physical frames, an environment table with per-environment two-level
//! page tables, the page and environment primitives, and reflection of user
//! page faults to a per-environment upcall. Code "inside" an environment
//! runs against a [`UserContext`].

#![cfg_attr(not(any(test, feature = "log_echo")), no_std)]

extern crate alloc;

pub mod config;
pub mod context;
pub mod logger;
pub mod memory;
pub mod process;
pub mod syscall;
pub mod trap;

pub use config::KernelConfig;
pub use context::UserContext;

use alloc::sync::Arc;
use alloc::vec::Vec;
use libcowfork::vpt::Pte;
use libcowfork::{EnvId, EnvInfo, EnvStatus, Errno};
use memory::FrameAllocator;
use process::EnvTable;
use spin::{Mutex, MutexGuard};
use trap::FaultStats;
use x86_64::structures::paging::PhysFrame;
use x86_64::{PhysAddr, VirtAddr};

/// All kernel state, serialised behind one lock.
pub struct KernelState {
    pub(crate) config: KernelConfig,
    pub(crate) frames: FrameAllocator,
    pub(crate) envs: EnvTable,
    pub(crate) stats: FaultStats,
}

impl KernelState {
    pub(crate) fn new(config: KernelConfig) -> Self {
        KernelState {
            config,
            frames: FrameAllocator::new(config.phys_frames),
            envs: EnvTable::new(config.max_envs),
            stats: FaultStats::default(),
        }
    }
}

/// Snapshot of the kernel counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStats {
    /// Frames handed out since boot, including freed ones
    pub frames_allocated: u64,
    pub frames_in_use: usize,
    pub faults_delivered: u64,
    pub fatal_faults: u64,
    pub live_envs: usize,
}

impl KernelStats {
    pub fn log(&self) {
        log::info!(
            "[KERNEL STATS] frames allocated={} in_use={} faults delivered={} fatal={} envs={}",
            self.frames_allocated,
            self.frames_in_use,
            self.faults_delivered,
            self.fatal_faults,
            self.live_envs
        );
    }
}

/// Handle on a kernel instance. Clones share the same machine.
#[derive(Clone)]
pub struct Kernel {
    state: Arc<Mutex<KernelState>>,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        logger::init(config.log_level, config.log_echo);
        log::info!(
            "kernel: {} frames, {} environment slots",
            config.phys_frames,
            config.max_envs
        );
        Kernel {
            state: Arc::new(Mutex::new(KernelState::new(config))),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, KernelState> {
        self.state.lock()
    }

    pub fn config(&self) -> KernelConfig {
        self.lock().config
    }

    /// Create a root environment, runnable and with an empty address space.
    pub fn spawn(&self) -> Result<EnvId, Errno> {
        let mut state = self.lock();
        let id = state.envs.alloc(None)?;
        state.envs.get_mut(id)?.status = EnvStatus::Runnable;
        log::info!("kernel: spawned root env {}", id);
        Ok(id)
    }

    /// Run as `env`. Only runnable environments can be resumed.
    pub fn resume(&self, env: EnvId) -> Result<UserContext, Errno> {
        let state = self.lock();
        if !state.envs.get(env)?.is_runnable() {
            log::debug!("kernel: env {} is not runnable", env);
            return Err(Errno::EPERM);
        }
        drop(state);
        Ok(UserContext::new(self.clone(), env))
    }

    pub fn env_info(&self, env: EnvId) -> Result<EnvInfo, Errno> {
        Ok(self.lock().envs.get(env)?.info())
    }

    /// Every live environment, in table order.
    pub fn envs(&self) -> Vec<EnvInfo> {
        self.lock().envs.iter().map(|env| env.info()).collect()
    }

    /// Present entry mapping `va` in `env`.
    pub fn translate(&self, env: EnvId, va: VirtAddr) -> Option<Pte> {
        self.lock().envs.get(env).ok()?.space.lookup(va)
    }

    /// Number of page table entries referencing the frame at `addr`.
    pub fn refcount(&self, addr: PhysAddr) -> u32 {
        self.lock().frames.refcount(PhysFrame::containing_address(addr))
    }

    /// Destroy `env` from outside any environment.
    pub fn destroy(&self, env: EnvId) -> bool {
        self.lock().env_destroy(env)
    }

    pub fn stats(&self) -> KernelStats {
        let state = self.lock();
        KernelStats {
            frames_allocated: state.frames.allocated_total(),
            frames_in_use: state.frames.in_use(),
            faults_delivered: state.stats.delivered,
            fatal_faults: state.stats.fatal,
            live_envs: state.envs.live(),
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::new(KernelConfig::default())
    }
}

impl core::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kernel").field("stats", &self.stats()).finish()
    }
}
