/*
 * Kernel Log Buffer
 *
 * `log` backend that keeps the most recent messages in a fixed-size ring
 * of preformatted lines, readable dmesg-style with `drain()`.
 *
 * - No heap allocation while logging (heapless lines and ring)
 * - When the ring is full the oldest line is dropped
 * - Lines longer than LINE_CAPACITY are cut at the capacity
 */

use core::fmt::Write;

use heapless::{Deque, String};
use log::{LevelFilter, Metadata, Record};
use spin::{Mutex, Once};

/// Maximum length of one formatted line
pub const LINE_CAPACITY: usize = 192;
/// Number of lines kept
pub const LOG_LINES: usize = 256;

/// One formatted log line
pub type LogLine = String<LINE_CAPACITY>;

/// Writes into a line until it is full, dropping the rest
struct Truncating<'a>(&'a mut LogLine);

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

struct BufferLogger {
    lines: Mutex<Deque<LogLine, LOG_LINES>>,
}

impl log::Log for BufferLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut line = LogLine::new();
        let _ = write!(Truncating(&mut line), "[{}] {}", record.level(), record.args());

        let mut lines = self.lines.lock();
        if lines.is_full() {
            lines.pop_front();
        }
        let _ = lines.push_back(line);
    }

    fn flush(&self) {}
}

static LOGGER: BufferLogger = BufferLogger {
    lines: Mutex::new(Deque::new()),
};

static INSTALLED: Once<bool> = Once::new();

/// Install the buffer logger and set the maximum level
///
/// Returns false if another logger was installed first. Calling it again
/// only changes the level.
pub fn init(level: LevelFilter) -> bool {
    let installed = *INSTALLED.call_once(|| log::set_logger(&LOGGER).is_ok());
    log::set_max_level(level);
    installed
}

/// Take every buffered line, oldest first
pub fn drain() -> alloc::vec::Vec<LogLine> {
    let mut lines = LOGGER.lines.lock();
    let mut out = alloc::vec::Vec::with_capacity(lines.len());
    while let Some(line) = lines.pop_front() {
        out.push(line);
    }
    out
}
