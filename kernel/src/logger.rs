//! Kernel logger
//!
//! Keeps the most recent records in a ring so tests and tools can inspect
//! what the kernel did. With the `log_echo` feature records can also be
//! printed to stderr as they arrive.

use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use conquer_once::spin::OnceCell;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Records kept before the oldest are dropped
const RING_CAPACITY: usize = 1024;

pub struct KernelLogger {
    ring: Mutex<VecDeque<String>>,
    #[cfg_attr(not(feature = "log_echo"), allow(dead_code))]
    echo: AtomicBool,
}

impl KernelLogger {
    const fn new() -> Self {
        KernelLogger {
            ring: Mutex::new(VecDeque::new()),
            echo: AtomicBool::new(false),
        }
    }

    fn push(&self, line: String) {
        let mut ring = self.ring.lock();
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(line);
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{:>5}] {}: {}", record.level(), record.target(), record.args());
        #[cfg(feature = "log_echo")]
        {
            if self.echo.load(Ordering::Relaxed) {
                std::eprintln!("{}", line);
            }
        }
        self.push(line);
    }

    fn flush(&self) {}
}

pub static KERNEL_LOGGER: KernelLogger = KernelLogger::new();

static INSTALLED: OnceCell<()> = OnceCell::uninit();

/// Install the kernel logger. Later calls only adjust the level and echo.
///
/// If another logger already owns the `log` facade the ring stays empty.
pub fn init(level: LevelFilter, echo: bool) {
    let _ = INSTALLED.try_init_once(|| {
        // Fails only when the embedding program installed its own logger
        let _ = log::set_logger(&KERNEL_LOGGER);
    });
    KERNEL_LOGGER.echo.store(echo, Ordering::Relaxed);
    // Several kernels may share the process; the facade level only rises
    if level > log::max_level() {
        log::set_max_level(level);
    }
    #[cfg(not(feature = "log_echo"))]
    {
        if echo {
            log::warn!("logger: echo requested but built without log_echo");
        }
    }
}

/// Snapshot of the buffered records, oldest first.
pub fn records() -> Vec<String> {
    KERNEL_LOGGER.ring.lock().iter().cloned().collect()
}
