//! Engine dispatch.
//!
//! `execute` classifies the descriptor pair, consults the transport table
//! and runs the chosen engine, degrading along the fixed fallback chains
//! when a setup step fails:
//!
//! - mapped input setup fails → buffered (stream) input;
//! - splice output setup (pipe-size query or buffer mapping) fails →
//!   buffered (stream) output.
//!
//! The four engines are also exported individually; the equivalence suite
//! runs each one over the same inputs and expects identical bytes.
//!
//! Framing bytes (the declaration prefix and suffix around the array body)
//! are written with plain whole-buffer writes: the prefix strictly before
//! any engine output, the suffix strictly after the engine has finished.

use crate::buffered::BufferedWriter;
use crate::error::EngineError;
use embedsrc_core::io::{write_entire_buffer, Fd};
use embedsrc_format::BYTES_PER_CHUNK;
use embedsrc_stream::StdinStream;

#[cfg(unix)]
use crate::input::MappedInput;
#[cfg(unix)]
use crate::select::{choose, classify, FdKind, TransportMode};
#[cfg(target_os = "linux")]
use crate::splice::SpliceWriter;

// =============================================================================
// Array-body writers
// =============================================================================

/// What every output engine offers the chunk drivers.
trait BodyWriter: Sized {
    fn first(&mut self, value: u8) -> Result<(), EngineError>;
    fn chunk(&mut self, values: &[u8; BYTES_PER_CHUNK]) -> Result<(), EngineError>;
    fn single(&mut self, value: u8) -> Result<(), EngineError>;
    fn finish(self) -> Result<(), EngineError>;
}

impl BodyWriter for BufferedWriter {
    fn first(&mut self, value: u8) -> Result<(), EngineError> {
        BufferedWriter::first(self, value)
    }
    fn chunk(&mut self, values: &[u8; BYTES_PER_CHUNK]) -> Result<(), EngineError> {
        BufferedWriter::chunk(self, values)
    }
    fn single(&mut self, value: u8) -> Result<(), EngineError> {
        BufferedWriter::single(self, value)
    }
    fn finish(self) -> Result<(), EngineError> {
        BufferedWriter::finish(self)
    }
}

#[cfg(target_os = "linux")]
impl BodyWriter for SpliceWriter {
    fn first(&mut self, value: u8) -> Result<(), EngineError> {
        SpliceWriter::first(self, value)
    }
    fn chunk(&mut self, values: &[u8; BYTES_PER_CHUNK]) -> Result<(), EngineError> {
        SpliceWriter::chunk(self, values)
    }
    fn single(&mut self, value: u8) -> Result<(), EngineError> {
        SpliceWriter::single(self, value)
    }
    fn finish(self) -> Result<(), EngineError> {
        SpliceWriter::finish(self)
    }
}

// =============================================================================
// Chunk drivers
// =============================================================================

/// Feed a fully in-memory input through an output engine: chunk emits for
/// every whole group, single emits for the tail.
#[cfg(unix)]
fn drive_slice<W: BodyWriter>(mut out: W, data: &[u8]) -> Result<(), EngineError> {
    let Some((&first, rest)) = data.split_first() else {
        return out.finish();
    };
    out.first(first)?;

    let mut chunks = rest.chunks_exact(BYTES_PER_CHUNK);
    for chunk in chunks.by_ref() {
        let values: &[u8; BYTES_PER_CHUNK] =
            chunk.try_into().expect("chunks_exact yields whole chunks");
        out.chunk(values)?;
    }
    for &b in chunks.remainder() {
        out.single(b)?;
    }
    out.finish()
}

/// Feed the async input stream through an output engine. A short read is
/// the stream's EOF signal; the remainder goes out byte-wise.
fn drive_stream<W: BodyWriter>(
    mut out: W,
    input: &mut StdinStream,
    first: u8,
) -> Result<(), EngineError> {
    out.first(first)?;

    let mut chunk = [0u8; BYTES_PER_CHUNK];
    loop {
        let n = input
            .read(&mut chunk)
            .map_err(|e| EngineError::io("read from stdin stream", e))?;
        if n == BYTES_PER_CHUNK {
            out.chunk(&chunk)?;
        } else {
            for &b in &chunk[..n] {
                out.single(b)?;
            }
            break;
        }
    }
    out.finish()
}

// =============================================================================
// Shared pieces
// =============================================================================

fn emit_frame(fd: Fd, bytes: &[u8]) -> Result<(), EngineError> {
    write_entire_buffer(fd, bytes).map_err(|e| EngineError::io("write framing to stdout", e))
}

/// Initialise the async input stream and pull the first byte; zero bytes is
/// the absent-input condition.
fn open_stream_input(input_fd: Fd) -> Result<(StdinStream, u8), EngineError> {
    let mut input = StdinStream::initialize(input_fd)
        .map_err(|e| EngineError::io("initialise stdin stream", e))?;
    let mut first = [0u8; 1];
    let n = input
        .read(&mut first)
        .map_err(|e| EngineError::io("read from stdin stream", e))?;
    if n == 0 {
        input.dispose();
        return Err(EngineError::NoData);
    }
    Ok((input, first[0]))
}

#[cfg(unix)]
fn mapped_body<W: BodyWriter>(
    mapping: MappedInput,
    writer: W,
    output_fd: Fd,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), EngineError> {
    emit_frame(output_fd, prefix)?;
    drive_slice(writer, mapping.as_slice())?;
    mapping
        .unmap()
        .map_err(|e| EngineError::io("unmap input file", e))?;
    emit_frame(output_fd, suffix)
}

fn streamed_body<W: BodyWriter>(
    mut input: StdinStream,
    first: u8,
    writer: W,
    output_fd: Fd,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), EngineError> {
    emit_frame(output_fd, prefix)?;
    drive_stream(writer, &mut input, first)?;
    input.dispose();
    emit_frame(output_fd, suffix)
}

/// Length of a regular-file input, for the engines that insist on one.
#[cfg(unix)]
fn regular_input_len(input_fd: Fd) -> Result<usize, EngineError> {
    match classify(input_fd).map_err(|e| EngineError::io("stat stdin", e))? {
        FdKind::RegularFile { len } => {
            if len == 0 {
                return Err(EngineError::NoData);
            }
            usize::try_from(len).map_err(|_| {
                EngineError::io(
                    "map input file",
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "input file exceeds the address space",
                    ),
                )
            })
        }
        _ => Err(EngineError::io(
            "map input file",
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "input is not a regular file",
            ),
        )),
    }
}

#[cfg(unix)]
fn mapped_len(kind: FdKind) -> Option<usize> {
    match kind {
        FdKind::RegularFile { len } => usize::try_from(len).ok(),
        _ => None,
    }
}

// =============================================================================
// The four engines
// =============================================================================

/// Memory-mapped input, gift-splice output. No fallback.
#[cfg(target_os = "linux")]
pub fn mmap_splice_engine(
    input_fd: Fd,
    output_fd: Fd,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), EngineError> {
    let len = regular_input_len(input_fd)?;
    let mapping =
        MappedInput::map(input_fd, len).map_err(|e| EngineError::io("map input file", e))?;
    let writer =
        SpliceWriter::new(output_fd).map_err(|e| EngineError::io("set up splice output", e))?;
    mapped_body(mapping, writer, output_fd, prefix, suffix)
}

/// Memory-mapped input, async buffered output. No fallback.
#[cfg(unix)]
pub fn mmap_buffered_engine(
    input_fd: Fd,
    output_fd: Fd,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), EngineError> {
    let len = regular_input_len(input_fd)?;
    let mapping =
        MappedInput::map(input_fd, len).map_err(|e| EngineError::io("map input file", e))?;
    mapped_body(
        mapping,
        BufferedWriter::new(output_fd),
        output_fd,
        prefix,
        suffix,
    )
}

/// Async buffered input, gift-splice output. No fallback.
#[cfg(target_os = "linux")]
pub fn read_splice_engine(
    input_fd: Fd,
    output_fd: Fd,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), EngineError> {
    let (input, first) = open_stream_input(input_fd)?;
    let writer =
        SpliceWriter::new(output_fd).map_err(|e| EngineError::io("set up splice output", e))?;
    streamed_body(input, first, writer, output_fd, prefix, suffix)
}

/// Async buffered input, async buffered output. The universal engine.
pub fn read_buffered_engine(
    input_fd: Fd,
    output_fd: Fd,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), EngineError> {
    let (input, first) = open_stream_input(input_fd)?;
    streamed_body(
        input,
        first,
        BufferedWriter::new(output_fd),
        output_fd,
        prefix,
        suffix,
    )
}

// =============================================================================
// Dispatch with fallback
// =============================================================================

/// Inspect the descriptors, pick an engine, run it with fallback.
#[cfg(unix)]
pub fn execute(
    input_fd: Fd,
    output_fd: Fd,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), EngineError> {
    let in_kind = classify(input_fd).map_err(|e| EngineError::io("stat stdin", e))?;
    let out_kind = classify(output_fd).map_err(|e| EngineError::io("stat stdout", e))?;

    if let FdKind::RegularFile { len: 0 } = in_kind {
        return Err(EngineError::NoData);
    }

    match choose(in_kind, out_kind) {
        #[cfg(target_os = "linux")]
        TransportMode::MmapInSpliceOut => {
            let Some(len) = mapped_len(in_kind) else {
                return read_splice_with_fallback(input_fd, output_fd, prefix, suffix);
            };
            match MappedInput::map(input_fd, len) {
                Ok(mapping) => match SpliceWriter::new(output_fd) {
                    Ok(writer) => mapped_body(mapping, writer, output_fd, prefix, suffix),
                    Err(_) => mapped_body(
                        mapping,
                        BufferedWriter::new(output_fd),
                        output_fd,
                        prefix,
                        suffix,
                    ),
                },
                Err(_) => read_splice_with_fallback(input_fd, output_fd, prefix, suffix),
            }
        }
        TransportMode::MmapInBufferedOut => {
            let Some(len) = mapped_len(in_kind) else {
                return read_buffered_engine(input_fd, output_fd, prefix, suffix);
            };
            match MappedInput::map(input_fd, len) {
                Ok(mapping) => mapped_body(
                    mapping,
                    BufferedWriter::new(output_fd),
                    output_fd,
                    prefix,
                    suffix,
                ),
                Err(_) => read_buffered_engine(input_fd, output_fd, prefix, suffix),
            }
        }
        #[cfg(target_os = "linux")]
        TransportMode::ReadInSpliceOut => {
            read_splice_with_fallback(input_fd, output_fd, prefix, suffix)
        }
        #[cfg(not(target_os = "linux"))]
        TransportMode::MmapInSpliceOut | TransportMode::ReadInSpliceOut => {
            // `choose` never yields the splice modes off Linux.
            read_buffered_engine(input_fd, output_fd, prefix, suffix)
        }
        TransportMode::ReadInBufferedOut => {
            read_buffered_engine(input_fd, output_fd, prefix, suffix)
        }
    }
}

/// Buffered input with zero-copy output, degrading to buffered output on
/// any splice setup failure.
#[cfg(target_os = "linux")]
fn read_splice_with_fallback(
    input_fd: Fd,
    output_fd: Fd,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), EngineError> {
    let (input, first) = open_stream_input(input_fd)?;
    match SpliceWriter::new(output_fd) {
        Ok(writer) => streamed_body(input, first, writer, output_fd, prefix, suffix),
        Err(_) => streamed_body(
            input,
            first,
            BufferedWriter::new(output_fd),
            output_fd,
            prefix,
            suffix,
        ),
    }
}

/// On Windows only the buffered pair exists.
#[cfg(windows)]
pub fn execute(
    input_fd: Fd,
    output_fd: Fd,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<(), EngineError> {
    read_buffered_engine(input_fd, output_fd, prefix, suffix)
}
