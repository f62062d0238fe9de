//! Userspace copy-on-write fork
//!
//! The exokernel underneath offers only page primitives (allocate, map,
//! unmap), empty environment creation, upcall registration and status
//! changes. This library builds `fork` on top of them:
//!
//! - [`vpt`] reads the caller's own page tables and classifies pages,
//! - [`pgfault`] gives a faulting environment a private copy of a COW page,
//! - [`fork`] duplicates an address space page by page and starts the child.
//!
//! # Usage
//!
//! ```rust,ignore
//! use libcowfork::{ForkResult, UserEnv};
//!
//! let mut env = UserEnv::new(sys);
//! match env.fork()? {
//!     ForkResult::Parent(child) => log::info!("spawned {}", child),
//!     ForkResult::Child => log::info!("hello from {}", env.thisenv()),
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub use errno::Errno;
pub use error::{Error, ErrorKind, Invariant};
pub use process::UserEnv;
pub use syscall::{Syscalls, UserMemory, UserSpace};
pub use trap::{PgfaultHandler, UTrapframe, Upcall};
pub use types::*;

pub mod errno;
pub mod error;
pub mod fork;
pub mod memlayout;
pub mod pgfault;
pub mod process;
pub mod syscall;
pub mod trap;
pub mod types;
pub mod vpt;

#[cfg(test)]
mod testing;
