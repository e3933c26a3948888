use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::RecorderError;

/// Append-only byte sink used for both the encoded stream and the raw PCM mirror.
///
/// Tracks the number of bytes written and a running SHA-256 of everything
/// that went through it, so the checksum is ready the moment the stream is
/// closed without re-reading the file.
pub struct StreamWriter<W: Write> {
    file_path: PathBuf,
    writer: W,
    hasher: Sha256,
    total_bytes_written: u64,
}

/// What remains of a [`StreamWriter`] after a successful close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedStream {
    pub file_path: PathBuf,
    pub bytes_written: u64,
    /// SHA-256 hex digest of every byte written.
    pub checksum: String,
}

/// Buffered writer over a freshly allocated output file.
pub type FileStreamWriter = StreamWriter<BufWriter<File>>;

impl FileStreamWriter {
    pub fn for_file(file_path: PathBuf, file: File) -> Self {
        Self::new(file_path, BufWriter::new(file))
    }
}

impl<W: Write> StreamWriter<W> {
    pub fn new(file_path: PathBuf, writer: W) -> Self {
        Self {
            file_path,
            writer,
            hasher: Sha256::new(),
            total_bytes_written: 0,
        }
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), RecorderError> {
        self.writer
            .write_all(data)
            .map_err(|e| RecorderError::Sink(format!("write to {} failed: {}", self.file_path.display(), e)))?;
        self.hasher.update(data);
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RecorderError> {
        self.writer
            .flush()
            .map_err(|e| RecorderError::Sink(format!("flush of {} failed: {}", self.file_path.display(), e)))
    }

    /// Flush and drop the underlying writer.
    pub fn close(mut self) -> Result<FinishedStream, RecorderError> {
        self.flush()?;
        Ok(FinishedStream {
            file_path: self.file_path,
            bytes_written: self.total_bytes_written,
            checksum: hex_encode(&self.hasher.finalize()),
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
