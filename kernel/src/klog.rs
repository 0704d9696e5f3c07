//! Structured kernel log service.
//!
//! A fixed-size, heap-free circular buffer of severity-tagged entries,
//! grounded on the teacher's `log_service.rs`, wired up as a [`log::Log`]
//! implementation so the rest of the kernel can use ordinary
//! `log::info!`/`log::warn!`/`log::error!` call sites instead of ad hoc
//! print statements. The actual byte transport is the PL011 UART
//! (`arch::aarch64::uart`).

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use crate::sync::GlobalState;

const LOG_BUFFER_CAPACITY: usize = 256;
const LOG_MESSAGE_MAX_LEN: usize = 120;
const LOG_TARGET_MAX_LEN: usize = 16;

/// A single structured log entry, stored inline so the buffer needs no heap.
#[derive(Clone, Copy)]
pub struct LogEntry {
    pub ticks: u64,
    pub level: Level,
    target_buf: [u8; LOG_TARGET_MAX_LEN],
    target_len: u8,
    message_buf: [u8; LOG_MESSAGE_MAX_LEN],
    message_len: u8,
}

impl LogEntry {
    const fn empty() -> Self {
        Self {
            ticks: 0,
            level: Level::Trace,
            target_buf: [0; LOG_TARGET_MAX_LEN],
            target_len: 0,
            message_buf: [0; LOG_MESSAGE_MAX_LEN],
            message_len: 0,
        }
    }

    pub fn target(&self) -> &str {
        core::str::from_utf8(&self.target_buf[..self.target_len as usize]).unwrap_or("")
    }

    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.message_buf[..self.message_len as usize]).unwrap_or("")
    }
}

struct LogBuffer {
    entries: [LogEntry; LOG_BUFFER_CAPACITY],
    head: usize,
    count: usize,
}

impl LogBuffer {
    const fn new() -> Self {
        Self {
            entries: [LogEntry::empty(); LOG_BUFFER_CAPACITY],
            head: 0,
            count: 0,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        self.entries[self.head] = entry;
        self.head = (self.head + 1) % LOG_BUFFER_CAPACITY;
        self.count = (self.count + 1).min(LOG_BUFFER_CAPACITY);
    }

    fn tail(&self) -> usize {
        if self.count < LOG_BUFFER_CAPACITY { 0 } else { self.head }
    }

    fn get(&self, i: usize) -> Option<&LogEntry> {
        if i >= self.count {
            return None;
        }
        Some(&self.entries[(self.tail() + i) % LOG_BUFFER_CAPACITY])
    }
}

static LOG_BUFFER: GlobalState<Mutex<LogBuffer>> = GlobalState::new();

/// Initialize the log buffer and register the global logger. Must be called
/// once, early in boot, before the first `log::info!` call.
pub fn init() {
    let _ = LOG_BUFFER.init(Mutex::new(LogBuffer::new()));
    // SAFETY: called once from single-threaded boot code before any other
    // CPU activity (this kernel has no SMP, per Non-goals).
    unsafe {
        let _ = log::set_logger_racy(&KERNEL_LOGGER);
    }
    log::set_max_level(LevelFilter::Trace);
}

struct KernelLogger;

static KERNEL_LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let mut target_buf = [0u8; LOG_TARGET_MAX_LEN];
        let target = record.target();
        let target_len = target.len().min(LOG_TARGET_MAX_LEN);
        target_buf[..target_len].copy_from_slice(&target.as_bytes()[..target_len]);

        // `format_args!` cannot be rendered into a fixed buffer without an
        // allocator; route the arguments straight to the UART for the live
        // transcript, and store a best-effort copy (the formatted prefix
        // only, if it fits without formatting) in the ring buffer so a
        // post-mortem dump has *something* even when the full message would
        // have needed heap formatting.
        crate::arch::aarch64::uart::with_console(|uart| {
            use core::fmt::Write;
            let _ = writeln!(uart, "[{:>5} {}] {}", record.level(), target, record.args());
        });

        let message_str = record.args().as_str().unwrap_or("<formatted>");
        let mut message_buf = [0u8; LOG_MESSAGE_MAX_LEN];
        let message_len = message_str.len().min(LOG_MESSAGE_MAX_LEN);
        message_buf[..message_len].copy_from_slice(&message_str.as_bytes()[..message_len]);

        let entry = LogEntry {
            ticks: crate::arch::aarch64::timer::ticks(),
            level: record.level(),
            target_buf,
            target_len: target_len as u8,
            message_buf,
            message_len: message_len as u8,
        };
        LOG_BUFFER.with(|buf| buf.lock().push(entry));
    }

    fn flush(&self) {}
}

/// Visit every buffered entry, oldest first. Used by the fatal-panic banner
/// and by a debug syscall that dumps recent kernel activity.
pub fn drain<F: FnMut(&LogEntry)>(mut f: F) -> usize {
    LOG_BUFFER
        .with(|buf| {
            let buf = buf.lock();
            for i in 0..buf.count {
                if let Some(e) = buf.get(i) {
                    f(e);
                }
            }
            buf.count
        })
        .unwrap_or(0)
}
