//! Cross-engine equivalence suite.
//!
//! Every engine must produce byte-identical output for the same input; the
//! dispatcher must pick working engines for arbitrary descriptor pairs.

#![cfg(target_os = "linux")]

use embedsrc_core::io::{read_fd, write_entire_buffer, Fd};
use embedsrc_engine::run::{
    mmap_buffered_engine, mmap_splice_engine, read_buffered_engine, read_splice_engine,
};
use embedsrc_engine::{execute, EngineError};
use std::io::Write;
use std::os::unix::io::AsRawFd;

const PREFIX: &[u8] = b"const char data[] = { ";
const SUFFIX: &[u8] = b" };\n";

// =============================================================================
// Helpers
// =============================================================================

fn pipe_pair() -> (Fd, Fd) {
    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    (fds[0], fds[1])
}

fn close(fd: Fd) {
    unsafe { libc::close(fd) };
}

fn spawn_collector(rx: Fd) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut collected = Vec::new();
        let mut buf = [0u8; 16384];
        loop {
            match read_fd(rx, &mut buf) {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(e) => panic!("collector failed: {e}"),
            }
        }
        close(rx);
        collected
    })
}

fn input_file(data: &[u8]) -> (tempfile::NamedTempFile, std::fs::File) {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(data).unwrap();
    tmp.flush().unwrap();
    let file = std::fs::File::open(tmp.path()).unwrap();
    (tmp, file)
}

fn expected_output(data: &[u8]) -> Vec<u8> {
    let body: Vec<String> = data.iter().map(|b| b.to_string()).collect();
    let mut out = PREFIX.to_vec();
    out.extend_from_slice(body.join(", ").as_bytes());
    out.extend_from_slice(SUFFIX);
    out
}

/// Run an engine whose input is a regular file, collecting pipe output.
fn run_file_engine(
    data: &[u8],
    engine: fn(Fd, Fd, &[u8], &[u8]) -> Result<(), EngineError>,
) -> Result<Vec<u8>, EngineError> {
    let (_tmp, file) = input_file(data);
    let (rx, tx) = pipe_pair();
    let collector = spawn_collector(rx);

    let result = engine(file.as_raw_fd(), tx, PREFIX, SUFFIX);
    close(tx);
    let collected = collector.join().unwrap();
    result.map(|_| collected)
}

/// Run an engine whose input arrives through a pipe, collecting pipe output.
fn run_pipe_engine(
    data: &[u8],
    engine: fn(Fd, Fd, &[u8], &[u8]) -> Result<(), EngineError>,
) -> Result<Vec<u8>, EngineError> {
    let (in_rx, in_tx) = pipe_pair();
    let payload = data.to_vec();
    let feeder = std::thread::spawn(move || {
        write_entire_buffer(in_tx, &payload).unwrap();
        close(in_tx);
    });

    let (out_rx, out_tx) = pipe_pair();
    let collector = spawn_collector(out_rx);

    let result = engine(in_rx, out_tx, PREFIX, SUFFIX);
    close(out_tx);
    feeder.join().unwrap();
    close(in_rx);
    let collected = collector.join().unwrap();
    result.map(|_| collected)
}

// =============================================================================
// Equivalence
// =============================================================================

#[test]
fn test_all_engines_agree() {
    let cases: Vec<Vec<u8>> = vec![
        vec![0],
        vec![255],
        (0..7u8).collect(),
        (0..8u8).collect(),
        (0..9u8).collect(),
        (0..64u8).map(|i| i.wrapping_mul(41)).collect(),
        (0..1000usize).map(|i| (i % 256) as u8).collect(),
        vec![0x41; 100_000],
    ];

    for data in &cases {
        let expected = expected_output(data);
        let from_mmap_splice = run_file_engine(data, mmap_splice_engine).unwrap();
        let from_mmap_buffered = run_file_engine(data, mmap_buffered_engine).unwrap();
        let from_read_splice = run_pipe_engine(data, read_splice_engine).unwrap();
        let from_read_buffered = run_pipe_engine(data, read_buffered_engine).unwrap();

        assert_eq!(from_mmap_splice, expected, "mmap+splice, len {}", data.len());
        assert_eq!(
            from_mmap_buffered,
            expected,
            "mmap+buffered, len {}",
            data.len()
        );
        assert_eq!(from_read_splice, expected, "read+splice, len {}", data.len());
        assert_eq!(
            from_read_buffered,
            expected,
            "read+buffered, len {}",
            data.len()
        );
    }
}

// Inputs sized around the pipe capacity stress the overflow staging and the
// page-aligned final splice.
#[test]
fn test_splice_engines_near_pipe_capacity() {
    for len in [13_100, 13_107, 13_108, 13_200, 26_214, 26_250] {
        let data: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
        let expected = expected_output(&data);
        assert_eq!(
            run_file_engine(&data, mmap_splice_engine).unwrap(),
            expected,
            "len {len}"
        );
        assert_eq!(
            run_pipe_engine(&data, read_splice_engine).unwrap(),
            expected,
            "len {len}"
        );
    }
}

// =============================================================================
// Absent input
// =============================================================================

#[test]
fn test_empty_input_is_no_data() {
    assert!(matches!(
        run_file_engine(&[], mmap_splice_engine),
        Err(EngineError::NoData)
    ));
    assert!(matches!(
        run_file_engine(&[], mmap_buffered_engine),
        Err(EngineError::NoData)
    ));
    assert!(matches!(
        run_pipe_engine(&[], read_splice_engine),
        Err(EngineError::NoData)
    ));
    assert!(matches!(
        run_pipe_engine(&[], read_buffered_engine),
        Err(EngineError::NoData)
    ));
}

// =============================================================================
// Dispatcher
// =============================================================================

#[test]
fn test_execute_file_to_pipe() {
    let data: Vec<u8> = (0..5000usize).map(|i| (i % 251) as u8).collect();
    let (_tmp, file) = input_file(&data);
    let (rx, tx) = pipe_pair();
    let collector = spawn_collector(rx);

    execute(file.as_raw_fd(), tx, PREFIX, SUFFIX).unwrap();
    close(tx);

    assert_eq!(collector.join().unwrap(), expected_output(&data));
}

#[test]
fn test_execute_pipe_to_pipe() {
    let data: Vec<u8> = (0..3000usize).map(|i| (i % 17) as u8).collect();
    let (in_rx, in_tx) = pipe_pair();
    let payload = data.clone();
    let feeder = std::thread::spawn(move || {
        write_entire_buffer(in_tx, &payload).unwrap();
        close(in_tx);
    });

    let (out_rx, out_tx) = pipe_pair();
    let collector = spawn_collector(out_rx);

    execute(in_rx, out_tx, PREFIX, SUFFIX).unwrap();
    close(out_tx);
    feeder.join().unwrap();
    close(in_rx);

    assert_eq!(collector.join().unwrap(), expected_output(&data));
}

#[test]
fn test_execute_file_to_file() {
    let data: Vec<u8> = (0..777usize).map(|i| (i % 101) as u8).collect();
    let (_tmp, file) = input_file(&data);

    let out = tempfile::NamedTempFile::new().unwrap();
    let out_file = std::fs::OpenOptions::new()
        .write(true)
        .open(out.path())
        .unwrap();

    execute(file.as_raw_fd(), out_file.as_raw_fd(), PREFIX, SUFFIX).unwrap();

    let written = std::fs::read(out.path()).unwrap();
    assert_eq!(written, expected_output(&data));
}

#[test]
fn test_execute_empty_file_is_no_data() {
    let (_tmp, file) = input_file(&[]);
    let out = tempfile::NamedTempFile::new().unwrap();
    let out_file = std::fs::OpenOptions::new()
        .write(true)
        .open(out.path())
        .unwrap();

    let result = execute(file.as_raw_fd(), out_file.as_raw_fd(), PREFIX, SUFFIX);
    assert!(matches!(result, Err(EngineError::NoData)));
    // Nothing may have been written before the probe failed.
    assert_eq!(std::fs::read(out.path()).unwrap(), b"");
}

#[test]
fn test_execute_empty_pipe_is_no_data() {
    let (in_rx, in_tx) = pipe_pair();
    close(in_tx);
    let (out_rx, out_tx) = pipe_pair();
    let collector = spawn_collector(out_rx);

    let result = execute(in_rx, out_tx, PREFIX, SUFFIX);
    close(out_tx);
    close(in_rx);

    assert!(matches!(result, Err(EngineError::NoData)));
    assert_eq!(collector.join().unwrap(), b"");
}
