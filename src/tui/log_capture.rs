//! Log capture for the chat screen.
//!
//! While the TUI owns the terminal, tracing output goes into a small ring
//! buffer instead of stderr. The status bar shows the newest line.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;

const CAPACITY: usize = 200;

/// Shared ring of captured log lines. Clones share the same ring.
#[derive(Clone, Default)]
pub struct LogTail {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl LogTail {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, line: String) {
        let line = line.trim_end().to_string();
        if line.is_empty() {
            return;
        }
        let mut guard = self.lock();
        if guard.len() >= CAPACITY {
            guard.pop_front();
        }
        guard.push_back(line);
    }

    /// Newest captured line, if any.
    pub fn latest(&self) -> Option<String> {
        self.lock().back().cloned()
    }
}

/// Per-event writer; complete lines go to the ring as they arrive.
pub struct TailWriter {
    tail: LogTail,
    pending: Vec<u8>,
}

impl Write for TailWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.tail.push(String::from_utf8_lossy(&line).into_owned());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.tail.push(String::from_utf8_lossy(&rest).into_owned());
        }
        Ok(())
    }
}

impl Drop for TailWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogTail {
    type Writer = TailWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TailWriter {
            tail: self.clone(),
            pending: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(tail: &LogTail) -> Vec<String> {
        tail.lock().iter().cloned().collect()
    }

    #[test]
    fn test_ring_drops_oldest() {
        let tail = LogTail::new();
        for i in 0..CAPACITY + 5 {
            tail.push(format!("line {}", i));
        }
        let lines = lines(&tail);
        assert_eq!(lines.len(), CAPACITY);
        assert_eq!(lines[0], "line 5");
        assert_eq!(tail.latest(), Some(format!("line {}", CAPACITY + 4)));
    }

    #[test]
    fn test_writer_splits_lines_and_flushes_rest_on_drop() {
        let tail = LogTail::new();
        {
            let mut writer = tail.make_writer();
            write!(writer, "one\ntwo\nthr").unwrap();
            assert_eq!(tail.latest().as_deref(), Some("two"));
        }
        assert_eq!(lines(&tail), vec!["one", "two", "thr"]);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let tail = LogTail::new();
        tail.push("  \n".to_string());
        assert!(tail.latest().is_none());
    }
}
