use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone)]
pub(crate) struct LogWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl LogWriter {
    pub(crate) fn new(path: Option<PathBuf>) -> io::Result<Self> {
        let file = match path {
            Some(path) => Some(Arc::new(Mutex::new(File::create(path)?))),
            None => None,
        };
        Ok(Self { file })
    }
}

pub(crate) struct LogWriterGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriterGuard {
            file: self.file.clone(),
        }
    }
}

impl Write for LogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = &self.file {
            file.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &self.file {
            file.lock().unwrap_or_else(PoisonError::into_inner).flush()?;
        }
        Ok(())
    }
}

/// Keeps the first steps of a run and a rolling tail, for failure reports.
pub(crate) struct EventLog {
    first_limit: usize,
    tail_limit: usize,
    first: Vec<String>,
    tail: VecDeque<String>,
    dropped: u64,
}

impl EventLog {
    pub(crate) fn new(first_limit: usize, tail_limit: usize) -> Self {
        Self {
            first_limit,
            tail_limit,
            first: Vec::with_capacity(first_limit),
            tail: VecDeque::with_capacity(tail_limit),
            dropped: 0,
        }
    }

    pub(crate) fn record(&mut self, message: String) {
        tracing::debug!("{}", message);
        if self.first.len() < self.first_limit {
            self.first.push(message);
            return;
        }
        if self.tail_limit == 0 {
            self.dropped += 1;
            return;
        }
        if self.tail.len() == self.tail_limit {
            self.tail.pop_front();
            self.dropped += 1;
        }
        self.tail.push_back(message);
    }

    pub(crate) fn dump_failure(&self, reason: &str) {
        tracing::error!("failure: {}", reason);
        for line in &self.first {
            tracing::error!("  {}", line);
        }
        if self.dropped > 0 {
            tracing::error!("  ... {} steps omitted ...", self.dropped);
        }
        for line in &self.tail {
            tracing::error!("  {}", line);
        }
    }
}
