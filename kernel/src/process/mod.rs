//! Environment management
//!
//! An environment is the exokernel's unit of execution: an address space,
//! a status and a fault upcall. The table hands out generation-tagged ids.

pub mod env;
pub mod manager;

pub use env::Env;
pub use manager::EnvTable;
