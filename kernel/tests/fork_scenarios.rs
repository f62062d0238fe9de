mod shared_kernel;
use shared_kernel::*;

use kernel::{logger, Kernel, KernelConfig};
use libcowfork::vpt::{PTE_COW, PTE_SHARE};
use libcowfork::{EnvStatus, Errno, ForkResult, Syscalls};
use log::LevelFilter;
use x86_64::structures::paging::PageTableFlags;

/// Private data page: both sides see V, then each write gets its own copy
#[test]
fn test_private_page_diverges_after_fork() {
    let kernel = boot(64);
    let mut parent = root(&kernel);
    let a = data_page(0);
    map_private(&mut parent, a, 0x1111);

    let mut child = fork_pair(&kernel, &mut parent);
    let parent_id = parent.thisenv();
    let child_id = child.thisenv();

    let before = kernel.stats();
    assert_eq!(read(&mut parent, a), 0x1111);
    assert_eq!(read(&mut child, a), 0x1111);
    assert_eq!(kernel.stats().faults_delivered, before.faults_delivered);

    let original = kernel.translate(parent_id, a).unwrap().addr();
    assert_eq!(kernel.refcount(original), 2);

    write(&mut parent, a, 0x2222);
    let after_parent = kernel.stats();
    assert_eq!(after_parent.frames_allocated, before.frames_allocated + 1);
    assert_eq!(after_parent.faults_delivered, before.faults_delivered + 1);
    assert_eq!(read(&mut parent, a), 0x2222);
    assert_eq!(read(&mut child, a), 0x1111);
    let parent_copy = kernel.translate(parent_id, a).unwrap().addr();
    assert_ne!(parent_copy, original);
    assert_eq!(kernel.translate(child_id, a).unwrap().addr(), original);

    write(&mut child, a, 0x3333);
    let after_child = kernel.stats();
    assert_eq!(after_child.frames_allocated, before.frames_allocated + 2);
    assert_eq!(read(&mut child, a), 0x3333);
    assert_eq!(read(&mut parent, a), 0x2222);
    let child_copy = kernel.translate(child_id, a).unwrap().addr();
    assert_ne!(child_copy, original);
    assert_ne!(child_copy, parent_copy);

    // The original frame lost its last mapping
    assert_eq!(kernel.refcount(original), 0);
    assert_eq!(after_child.fatal_faults, 0);
}

/// Fully-shared counter: the child sees the parent's increment at once
#[test]
fn test_shared_counter_is_visible_without_copy() {
    let kernel = boot(64);
    let mut parent = root(&kernel);
    let c = data_page(3);
    map_shared(&mut parent, c, 0);

    let mut child = fork_pair(&kernel, &mut parent);
    let before = kernel.stats();

    let n = read(&mut parent, c);
    write(&mut parent, c, n + 1);
    assert_eq!(read(&mut child, c), 1);

    let after = kernel.stats();
    assert_eq!(after.frames_allocated, before.frames_allocated);
    assert_eq!(after.faults_delivered, before.faults_delivered);

    let flags = kernel.translate(child.thisenv(), c).unwrap().flags();
    assert!(flags.contains(PTE_SHARE | PageTableFlags::WRITABLE));
    assert!(!flags.contains(PTE_COW));
}

/// A forked child can fork again; all three see their own copies
#[test]
fn test_grandchild_fork() {
    let kernel = boot(64);
    let mut parent = root(&kernel);
    let a = data_page(0);
    map_private(&mut parent, a, 1);

    let mut child = fork_pair(&kernel, &mut parent);
    let mut grandchild = fork_pair(&kernel, &mut child);
    assert_eq!(
        kernel.env_info(grandchild.thisenv()).unwrap().parent_id,
        Some(child.thisenv())
    );

    write(&mut grandchild, a, 3);
    write(&mut child, a, 2);
    assert_eq!(read(&mut parent, a), 1);
    assert_eq!(read(&mut child, a), 2);
    assert_eq!(read(&mut grandchild, a), 3);
}

#[test]
fn test_fork_sets_child_runnable_with_upcall() {
    let kernel = boot(64);
    let mut parent = root(&kernel);
    map_private(&mut parent, data_page(0), 7);

    let ForkResult::Parent(child) = parent.fork().unwrap() else {
        panic!("parent observed the child side");
    };
    let info = kernel.env_info(child).unwrap();
    assert_eq!(info.status, EnvStatus::Runnable);
    assert_eq!(info.parent_id, Some(parent.thisenv()));
    assert!(info.has_pgfault_upcall);
    assert!(parent.sys().env_info(libcowfork::EnvId::CURRENT).unwrap().has_pgfault_upcall);
}

#[test]
fn test_fork_raw_reports_full_table() {
    let kernel = Kernel::new(KernelConfig::default().with_max_envs(1));
    let mut parent = root(&kernel);
    assert_eq!(parent.fork_raw(), -Errno::EAGAIN.raw());
    assert_eq!(kernel.envs().len(), 1);
}

#[test]
fn test_fork_is_logged() {
    let kernel = Kernel::new(
        KernelConfig::default()
            .with_phys_frames(64)
            .with_max_envs(8)
            .with_log_level(LevelFilter::Debug),
    );
    let mut parent = root(&kernel);
    map_private(&mut parent, data_page(0), 1);
    let mut child = fork_pair(&kernel, &mut parent);
    write(&mut child, data_page(0), 2);
    kernel.stats().log();

    let records = logger::records();
    let created = format!("fork[{}->{}] child created", parent.thisenv(), child.thisenv());
    assert!(
        records.iter().any(|line| line.contains(&created)),
        "missing {:?} in kernel log",
        created
    );
    assert!(records.iter().any(|line| line.contains("[KERNEL STATS]")));
    // Debug level lets the copy made by the fault handler through
    let copied = format!("pgfault: copying {:#x} for env {}", data_page(0).as_u64(), child.thisenv());
    assert!(records.iter().any(|line| line.contains(&copied)), "missing {:?}", copied);
}
