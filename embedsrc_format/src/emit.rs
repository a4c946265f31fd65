//! The specialised emitters for the C/C++ array body.
//!
//! Three programs cover the whole output: the very first byte carries no
//! separator, every later byte carries a leading `", "`, and the steady
//! state emits [`BYTES_PER_CHUNK`] bytes per call from one fused program.
//! All three are compiled at build time; the const assertions below pin the
//! emitter arities to the placeholder counts so an arity mismatch cannot
//! survive compilation.

use crate::blueprint::{compile, op_count, Op, Program};
use crate::decimal::digits_of;
use crate::sink::Sink;

// =============================================================================
// Build constants
// =============================================================================

/// Input bytes consumed by one steady-state emit.
pub const BYTES_PER_CHUNK: usize = 8;

/// Blueprint for the first byte of the array body.
pub const FIRST_BLUEPRINT: &str = "%u";
/// Blueprint for any later single byte.
pub const SEPARATED_BLUEPRINT: &str = ", %u";
/// Blueprint for a full chunk: [`SEPARATED_BLUEPRINT`] repeated
/// [`BYTES_PER_CHUNK`] times.
pub const CHUNK_BLUEPRINT: &str = ", %u, %u, %u, %u, %u, %u, %u, %u";

/// Program for the first byte.
pub const FIRST: Program<{ op_count(FIRST_BLUEPRINT) }> = compile(FIRST_BLUEPRINT);
/// Program for a separated single byte.
pub const SEPARATED: Program<{ op_count(SEPARATED_BLUEPRINT) }> = compile(SEPARATED_BLUEPRINT);
/// Program for a full chunk.
pub const CHUNK: Program<{ op_count(CHUNK_BLUEPRINT) }> = compile(CHUNK_BLUEPRINT);

/// Worst-case bytes produced by [`emit_first`].
pub const MAX_FIRST_LEN: usize = FIRST.max_emitted_len();
/// Worst-case bytes produced by [`emit_separated`].
pub const MAX_SEPARATED_LEN: usize = SEPARATED.max_emitted_len();
/// Worst-case bytes produced by [`emit_chunk`].
pub const MAX_CHUNK_LEN: usize = CHUNK.max_emitted_len();

const fn is_repetition(whole: &str, unit: &str, times: usize) -> bool {
    let w = whole.as_bytes();
    let u = unit.as_bytes();
    if w.len() != u.len() * times {
        return false;
    }
    let mut i = 0;
    while i < w.len() {
        if w[i] != u[i % u.len()] {
            return false;
        }
        i += 1;
    }
    true
}

// Arity and shape pins. A change to any blueprint that breaks the
// one-argument-per-`%u` contract fails right here.
const _: () = {
    assert!(FIRST.value_count() == 1);
    assert!(SEPARATED.value_count() == 1);
    assert!(CHUNK.value_count() == BYTES_PER_CHUNK);
    assert!(is_repetition(
        CHUNK_BLUEPRINT,
        SEPARATED_BLUEPRINT,
        BYTES_PER_CHUNK
    ));
};

// =============================================================================
// Execution
// =============================================================================

/// Run `program` against `sink`, consuming one argument per `Value` op.
///
/// `args.len()` must equal the program's placeholder count; the fixed-arity
/// wrappers below guarantee that statically. With `terminate` set, a NUL is
/// stored after the final op without advancing the sink position.
///
/// Returns `false` as soon as the sink reports failure.
#[inline]
pub fn execute_program<const N: usize, S: Sink>(
    program: &Program<N>,
    sink: &mut S,
    args: &[u8],
    terminate: bool,
) -> bool {
    debug_assert_eq!(args.len(), program.value_count());

    let mut next_arg = 0;
    for op in program.ops() {
        match *op {
            Op::Text { start, len } => {
                if !sink.put(program.text(start, len)) {
                    return false;
                }
            }
            Op::Value => {
                let value = args[next_arg];
                next_arg += 1;
                if !sink.put(digits_of(value)) {
                    return false;
                }
            }
        }
    }
    if terminate {
        sink.put_terminator();
    }
    true
}

/// Emit the first byte of the array body (no separator).
#[inline]
pub fn emit_first<S: Sink>(sink: &mut S, value: u8) -> bool {
    execute_program(&FIRST, sink, &[value], false)
}

/// Emit one byte with its leading separator.
#[inline]
pub fn emit_separated<S: Sink>(sink: &mut S, value: u8) -> bool {
    execute_program(&SEPARATED, sink, &[value], false)
}

/// Emit a full chunk of [`BYTES_PER_CHUNK`] bytes, separators included.
#[inline]
pub fn emit_chunk<S: Sink>(sink: &mut S, values: &[u8; BYTES_PER_CHUNK]) -> bool {
    execute_program(&CHUNK, sink, values, false)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn emit_to_string(f: impl FnOnce(&mut MemorySink<'_>) -> bool) -> String {
        let mut buf = [0u8; 256];
        let mut sink = MemorySink::new(&mut buf);
        assert!(f(&mut sink));
        let written = sink.written();
        String::from_utf8(buf[..written].to_vec()).unwrap()
    }

    #[test]
    fn test_emit_first() {
        assert_eq!(emit_to_string(|s| emit_first(s, 0)), "0");
        assert_eq!(emit_to_string(|s| emit_first(s, 255)), "255");
    }

    #[test]
    fn test_emit_separated() {
        assert_eq!(emit_to_string(|s| emit_separated(s, 7)), ", 7");
        assert_eq!(emit_to_string(|s| emit_separated(s, 100)), ", 100");
    }

    #[test]
    fn test_emit_chunk() {
        let values = [1, 2, 3, 4, 5, 6, 7, 255];
        assert_eq!(
            emit_to_string(|s| emit_chunk(s, &values)),
            ", 1, 2, 3, 4, 5, 6, 7, 255"
        );
    }

    #[test]
    fn test_chunk_equals_repeated_singles() {
        let values = [0u8, 9, 10, 99, 100, 200, 254, 255];
        let chunked = emit_to_string(|s| emit_chunk(s, &values));
        let mut buf = [0u8; 256];
        let mut sink = MemorySink::new(&mut buf);
        for v in values {
            assert!(emit_separated(&mut sink, v));
        }
        let written = sink.written();
        assert_eq!(chunked.as_bytes(), &buf[..written]);
    }

    #[test]
    fn test_max_lengths_are_tight() {
        assert_eq!(MAX_FIRST_LEN, 3);
        assert_eq!(MAX_SEPARATED_LEN, 5);
        assert_eq!(MAX_CHUNK_LEN, 5 * BYTES_PER_CHUNK);

        let worst = [255u8; BYTES_PER_CHUNK];
        let mut buf = [0u8; MAX_CHUNK_LEN];
        let mut sink = MemorySink::new(&mut buf);
        assert!(emit_chunk(&mut sink, &worst));
        assert_eq!(sink.written(), MAX_CHUNK_LEN);
    }

    #[test]
    fn test_terminator_written_without_advancing() {
        let mut buf = [0xFFu8; 16];
        let mut sink = MemorySink::new(&mut buf);
        assert!(execute_program(&SEPARATED, &mut sink, &[42], true));
        assert_eq!(sink.written(), 4);
        assert_eq!(&buf[..5], b", 42\0");
    }

    #[test]
    fn test_program_shapes() {
        assert_eq!(FIRST.len(), 1);
        assert_eq!(SEPARATED.len(), 2);
        // Chunk: one leading separator text op, then alternating value/text.
        assert_eq!(CHUNK.len(), 2 * BYTES_PER_CHUNK);
    }
}
