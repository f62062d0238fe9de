//! System call layer of the exokernel
//!
//! Only page and environment primitives are offered. Every handler runs
//! on behalf of a calling environment `cur` and resolves id 0 to it.

pub mod handlers;

/// Primitive numbers; handlers log under their names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    GetEnvId = 2,
    EnvDestroy = 3,
    PageAlloc = 4,
    PageMap = 5,
    PageUnmap = 6,
    Exofork = 7,
    EnvSetStatus = 8,
    EnvSetPgfaultUpcall = 10,
}

impl SyscallNumber {
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetEnvId => "sys_getenvid",
            Self::EnvDestroy => "sys_env_destroy",
            Self::PageAlloc => "sys_page_alloc",
            Self::PageMap => "sys_page_map",
            Self::PageUnmap => "sys_page_unmap",
            Self::Exofork => "sys_exofork",
            Self::EnvSetStatus => "sys_env_set_status",
            Self::EnvSetPgfaultUpcall => "sys_env_set_pgfault_upcall",
        }
    }
}
