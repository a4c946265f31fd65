//! Build-time-specialised text emission.
//!
//! The per-byte output path of the embedder is too hot to interpret a format
//! string at runtime. Instead, the format templates ("blueprints") are
//! compiled by `const fn`s into fixed operation tables, and the emitters are
//! monomorphised over those tables: by the time the program runs, each emit
//! is a straight-line sequence of literal copies and table-driven decimal
//! conversions.
//!
//! # Architecture
//!
//! ```text
//! blueprint ("%u", ", %u", …)          const-eval
//!        │  op_count / compile  ──────────────────►  Program<N>
//!        ▼
//! emit_first / emit_separated / emit_chunk
//!        │                                      runtime, monomorphised
//!        ▼
//! Sink (memory buffer or async stdout stream)
//! ```

pub mod blueprint;
pub mod decimal;
pub mod emit;
pub mod sink;

pub use blueprint::{compile, op_count, Op, Program};
pub use decimal::digits_of;
pub use emit::{
    emit_chunk, emit_first, emit_separated, execute_program, BYTES_PER_CHUNK, CHUNK, FIRST,
    MAX_CHUNK_LEN, MAX_FIRST_LEN, MAX_SEPARATED_LEN, SEPARATED,
};
pub use sink::{MemorySink, Sink, StreamSink, StreamWrite};
