use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const READ_BUFFER_BYTES: usize = 256 * 1024;

/// Line reader over a plain or gzip-compressed statement file.
///
/// Compression is detected from the first two bytes, so a `.gz` file with the
/// wrong extension still decodes. Invalid UTF-8 is replaced instead of failing
/// the file.
pub struct LineSource {
    path: PathBuf,
    inner: Box<dyn BufRead + Send>,
    raw: Vec<u8>,
    line: String,
    lines_read: u64,
}

impl LineSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| source_error(path, &e))?;
        let mut buffered = BufReader::with_capacity(READ_BUFFER_BYTES, file);
        let compressed = buffered.fill_buf().map_err(|e| source_error(path, &e))?.starts_with(&GZIP_MAGIC);

        let inner: Box<dyn BufRead + Send> = if compressed {
            Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, MultiGzDecoder::new(buffered)))
        } else {
            Box::new(buffered)
        };
        Ok(Self::with_reader(path, inner))
    }

    /// Wraps an already opened reader; `path` is only used in error messages.
    pub fn from_reader<R: Read + Send + 'static>(path: &Path, reader: R) -> Self {
        Self::with_reader(path, Box::new(BufReader::new(reader)))
    }

    fn with_reader(path: &Path, inner: Box<dyn BufRead + Send>) -> Self {
        Self { path: path.to_path_buf(), inner, raw: Vec::new(), line: String::new(), lines_read: 0 }
    }

    /// Next line without its terminator, or `None` at end of input.
    ///
    /// A decompression or read failure ends the file with `Error::Source`.
    pub fn next_line(&mut self) -> Result<Option<&str>> {
        self.raw.clear();
        let read = self.inner.read_until(b'\n', &mut self.raw).map_err(|e| source_error(&self.path, &e))?;
        if read == 0 {
            return Ok(None);
        }
        self.lines_read += 1;

        while matches!(self.raw.last(), Some(b'\n' | b'\r')) {
            self.raw.pop();
        }
        self.line.clear();
        self.line.push_str(&String::from_utf8_lossy(&self.raw));
        Ok(Some(self.line.as_str()))
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn source_error(path: &Path, err: &std::io::Error) -> Error {
    Error::Source { path: path.to_path_buf(), reason: err.to_string() }
}
