//! Writer duplicating the operator log to stderr and a file.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Writes everything to stderr and to a log file
pub struct TeeWriter {
    file: File,
}

impl TeeWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self { file: File::create(path)? })
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A broken terminal must not stop the file log
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}
