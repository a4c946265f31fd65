//! Buffered output through the async stdout stream.
//!
//! The fallback output path: every emit goes through a [`StreamSink`] over
//! an owned [`StdoutStream`], which batches bytes into its double buffer
//! and writes them from its background thread. Works against any
//! descriptor, on every platform.

use crate::error::EngineError;
use embedsrc_core::io::Fd;
use embedsrc_format::{emit_chunk, emit_first, emit_separated, StreamSink, BYTES_PER_CHUNK};
use embedsrc_stream::StdoutStream;
use std::io;

/// Array-body writer backed by the async stdout stream.
pub struct BufferedWriter {
    stream: StdoutStream,
}

impl BufferedWriter {
    /// Spin up the stream over `fd`.
    pub fn new(fd: Fd) -> BufferedWriter {
        BufferedWriter {
            stream: StdoutStream::initialize(fd),
        }
    }

    /// Emit the first byte of the body.
    pub fn first(&mut self, value: u8) -> Result<(), EngineError> {
        let mut sink = StreamSink::new(&mut self.stream);
        if !emit_first(&mut sink, value) {
            return Err(self.write_error());
        }
        Ok(())
    }

    /// Emit one full chunk.
    pub fn chunk(&mut self, values: &[u8; BYTES_PER_CHUNK]) -> Result<(), EngineError> {
        let mut sink = StreamSink::new(&mut self.stream);
        if !emit_chunk(&mut sink, values) {
            return Err(self.write_error());
        }
        Ok(())
    }

    /// Emit one separated byte.
    pub fn single(&mut self, value: u8) -> Result<(), EngineError> {
        let mut sink = StreamSink::new(&mut self.stream);
        if !emit_separated(&mut sink, value) {
            return Err(self.write_error());
        }
        Ok(())
    }

    /// Drain the stream and reclaim its thread.
    pub fn finish(self) -> Result<(), EngineError> {
        self.stream
            .dispose()
            .map_err(|e| EngineError::io("flush stdout stream", e))
    }

    fn write_error(&self) -> EngineError {
        let err = self
            .stream
            .last_error()
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "stream write failed"));
        EngineError::io("write to stdout stream", err)
    }
}

// =============================================================================
// Tests
// =============================================================================
