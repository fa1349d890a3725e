//! Payload compression
//!
//! Wraps the archive stream in gzip at the best compression level. The
//! gzip header carries no timestamp or host OS, so the compressed bytes
//! depend only on the archive bytes.

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::io::{self, Write};

/// gzip "unknown" operating system byte
const OS_UNKNOWN: u8 = 255;

/// Errors for compression operations
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("failed to finalize compressed stream: {0}")]
    Finish(#[source] io::Error),

    #[error("compressed stream is empty")]
    Empty,
}

/// gzip compressor configuration
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: Compression,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::best()
    }
}

impl Compressor {
    /// Maximum compression ratio
    pub fn best() -> Self {
        Self {
            level: Compression::best(),
        }
    }

    /// Start a compressed stream into `inner`
    ///
    /// Bytes written through the returned encoder are counted, so the
    /// uncompressed archive size is known without buffering it.
    pub fn encoder<W: Write>(&self, inner: W) -> CountingWriter<GzEncoder<W>> {
        let encoder = GzBuilder::new()
            .mtime(0)
            .operating_system(OS_UNKNOWN)
            .write(inner, self.level);
        CountingWriter::new(encoder)
    }

    /// Flush the stream and write the gzip trailer, returning the inner
    /// writer and the number of uncompressed bytes that went in
    pub fn finish<W: Write>(
        &self,
        encoder: CountingWriter<GzEncoder<W>>,
    ) -> Result<(W, u64), CompressError> {
        let (encoder, written) = encoder.into_parts();
        let inner = encoder.finish().map_err(CompressError::Finish)?;
        Ok((inner, written))
    }
}

/// Writer adapter that counts bytes passed through it
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_parts(self) -> (W, u64) {
        (self.inner, self.written)
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
