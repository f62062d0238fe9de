//! Kernel configuration
//!
//! Sizes of the simulated machine and how its log is emitted. Defaults
//! match a small machine: 16 MiB of frames and a full environment table.

use libcowfork::NENV;
use log::LevelFilter;

/// Default physical memory: 4096 frames of 4 KiB (16 MB)
pub const DEFAULT_PHYS_FRAMES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of physical frames available to environments
    pub phys_frames: usize,
    /// Environment table size, at most `NENV`
    pub max_envs: usize,
    /// Maximum level recorded by the kernel logger
    pub log_level: LevelFilter,
    /// Also print records to stderr (needs the `log_echo` feature)
    pub log_echo: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            phys_frames: DEFAULT_PHYS_FRAMES,
            max_envs: NENV,
            log_level: LevelFilter::Info,
            log_echo: false,
        }
    }
}

impl KernelConfig {
    pub fn with_phys_frames(mut self, frames: usize) -> Self {
        self.phys_frames = frames;
        self
    }

    pub fn with_max_envs(mut self, envs: usize) -> Self {
        self.max_envs = envs.clamp(1, NENV);
        self
    }

    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_log_echo(mut self, echo: bool) -> Self {
        self.log_echo = echo;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_env_table() {
        let config = KernelConfig::default().with_max_envs(0).with_phys_frames(8);
        assert_eq!(config.max_envs, 1);
        assert_eq!(config.phys_frames, 8);
        assert_eq!(KernelConfig::default().with_max_envs(usize::MAX).max_envs, NENV);
    }
}
