//! Shared setup for the hosted-kernel integration tests
//!
//! Boots a small kernel, gives tests a root environment to act as the
//! parent, and enters forked children the way they resume after `fork`.

#![allow(dead_code)]

use kernel::{Kernel, KernelConfig, UserContext};
use libcowfork::memlayout::{PGSIZE, UTEXT};
use libcowfork::vpt::{PTE_SHARE, PTE_USER, PTE_USER_RW};
use libcowfork::{EnvId, ForkResult, Syscalls, UserEnv, UserMemory};
use x86_64::VirtAddr;

/// First page of the data region used by the tests
pub const DATA: u64 = UTEXT;

pub fn data_page(n: u64) -> VirtAddr {
    VirtAddr::new(DATA + n * PGSIZE)
}

pub fn boot(frames: usize) -> Kernel {
    Kernel::new(KernelConfig::default().with_phys_frames(frames).with_max_envs(8))
}

/// A runnable root environment to fork from.
pub fn root(kernel: &Kernel) -> UserEnv<UserContext> {
    let id = kernel.spawn().expect("spawn root env");
    UserEnv::new(kernel.resume(id).expect("root env runnable"))
}

/// Resume `child` the way it comes back from `fork`: with the parent's
/// library state in memory and `fork` returning on the child side.
pub fn enter_child(kernel: &Kernel, parent: &UserEnv<UserContext>, child: EnvId) -> UserEnv<UserContext> {
    let ctx = kernel.resume(child).expect("child runnable after fork");
    let mut env = parent.inherit(ctx);
    assert_eq!(env.fork().expect("child side of fork"), ForkResult::Child);
    assert_eq!(env.thisenv(), child);
    env
}

/// Fork `parent` and enter the child.
pub fn fork_pair(kernel: &Kernel, parent: &mut UserEnv<UserContext>) -> UserEnv<UserContext> {
    let child = match parent.fork().expect("fork") {
        ForkResult::Parent(child) => child,
        ForkResult::Child => panic!("parent observed the child side"),
    };
    enter_child(kernel, parent, child)
}

/// Map a private writable page at `va` holding `value`.
pub fn map_private(env: &mut UserEnv<UserContext>, va: VirtAddr, value: u64) {
    env.sys()
        .page_alloc(EnvId::CURRENT, va, PTE_USER_RW)
        .expect("page_alloc");
    env.sys().write_u64(va, value).expect("initial write");
}

/// Map a fully-shared writable page at `va` holding `value`.
pub fn map_shared(env: &mut UserEnv<UserContext>, va: VirtAddr, value: u64) {
    env.sys()
        .page_alloc(EnvId::CURRENT, va, PTE_USER_RW | PTE_SHARE)
        .expect("page_alloc");
    env.sys().write_u64(va, value).expect("initial write");
}

/// Map a read-only page at `va` holding `value`.
pub fn map_read_only(env: &mut UserEnv<UserContext>, va: VirtAddr, value: u64) {
    map_private(env, va, value);
    let sys = env.sys();
    sys.page_map(EnvId::CURRENT, va, EnvId::CURRENT, va, PTE_USER)
        .expect("downgrade to read-only");
}

pub fn read(env: &mut UserEnv<UserContext>, va: VirtAddr) -> u64 {
    env.sys().read_u64(va).expect("read")
}

pub fn write(env: &mut UserEnv<UserContext>, va: VirtAddr, value: u64) {
    env.sys().write_u64(va, value).expect("write")
}
