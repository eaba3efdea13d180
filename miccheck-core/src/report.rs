//! Progress output
//!
//! The report goes to two channels: progress and passes on the normal
//! channel, failures on the error channel.

use std::io::Write;

/// Sink for report lines
pub trait Reporter {
    fn out(&mut self, line: &str);
    fn err(&mut self, line: &str);
}

/// Writes to stdout and stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter {
    /// Send normal lines to stderr too, keeping stdout for machine output
    stderr_only: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stderr_only() -> Self {
        Self { stderr_only: true }
    }
}

impl Reporter for ConsoleReporter {
    fn out(&mut self, line: &str) {
        if self.stderr_only {
            self.err(line);
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }

    fn err(&mut self, line: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", line);
    }
}

/// Keeps every line in memory
#[derive(Debug, Default, Clone)]
pub struct BufferReporter {
    pub out: Vec<String>,
    pub err: Vec<String>,
}

impl BufferReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for BufferReporter {
    fn out(&mut self, line: &str) {
        self.out.push(line.to_string());
    }

    fn err(&mut self, line: &str) {
        self.err.push(line.to_string());
    }
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn out(&mut self, line: &str) {
        (**self).out(line);
    }

    fn err(&mut self, line: &str) {
        (**self).err(line);
    }
}
