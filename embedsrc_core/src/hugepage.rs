//! Huge-page-size probe.
//!
//! Scans `/proc/meminfo` for the `Hugepagesize` line and returns the value
//! in bytes. The file is read in fixed-size chunks, so the matcher has to
//! survive the key (or its value) straddling a chunk boundary: all scan
//! state lives in [`MeminfoScan`] and is fed one chunk at a time.
//!
//! `meminfo` also carries `AnonHugePages`, `HugePages_Total` and friends;
//! a mismatch therefore abandons the current line entirely (skip to the next
//! newline) before the matcher restarts. `Hugepagesize` contains no repeated
//! prefix of itself, so restarting from zero after a partial match cannot
//! skip a real occurrence.

use std::fs::File;
use std::io::Read;

const KEY: &[u8] = b"Hugepagesize";

/// Chunk size for the production scan.
const READ_CHUNK: usize = 1024;

/// Huge page size in bytes, or `None` if the probe fails for any reason.
///
/// `meminfo` reports kilobytes; the returned value is already scaled.
pub fn huge_page_size() -> Option<usize> {
    let file = File::open("/proc/meminfo").ok()?;
    parse_stream(file, READ_CHUNK)
}

/// Scan an arbitrary source with an arbitrary chunk size. Split out from
/// [`huge_page_size`] so tests can force tiny chunks.
fn parse_stream<R: Read>(mut src: R, chunk_len: usize) -> Option<usize> {
    let mut buf = vec![0u8; chunk_len];
    let mut scan = MeminfoScan::new();

    loop {
        let n = src.read(&mut buf).ok()?;
        if n == 0 {
            return scan.finish();
        }
        if let Some(value) = scan.feed(&buf[..n]) {
            return Some(value);
        }
    }
}

// =============================================================================
// Scan state machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Matching the key; `matched` bytes of it are already seen.
    SeekKey,
    /// The current line cannot contain the key; discard up to `\n`.
    SkipLine,
    /// Full key matched; the next byte must be a `:`/space/tab separator.
    AfterKey,
    /// Inside the separator run between the key and its value.
    Separators,
    /// Accumulating decimal digits of the value.
    Digits,
}

struct MeminfoScan {
    state: ScanState,
    matched: usize,
    value: usize,
}

impl MeminfoScan {
    fn new() -> Self {
        Self {
            state: ScanState::SeekKey,
            matched: 0,
            value: 0,
        }
    }

    /// Consume one chunk. Returns the final value (in bytes) as soon as the
    /// digit run ends inside this chunk.
    fn feed(&mut self, chunk: &[u8]) -> Option<usize> {
        let mut i = 0;
        while i < chunk.len() {
            match self.state {
                ScanState::SkipLine => {
                    // The rest of this line is junk; jump straight to the
                    // newline instead of stepping bytewise.
                    match memchr::memchr(b'\n', &chunk[i..]) {
                        Some(off) => {
                            i += off + 1;
                            self.state = ScanState::SeekKey;
                            self.matched = 0;
                        }
                        None => return None,
                    }
                }

                ScanState::SeekKey => {
                    if chunk[i] == KEY[self.matched] {
                        self.matched += 1;
                        if self.matched == KEY.len() {
                            self.state = ScanState::AfterKey;
                        }
                    } else {
                        self.state = ScanState::SkipLine;
                        continue;
                    }
                    i += 1;
                }

                ScanState::AfterKey => {
                    if is_separator(chunk[i]) {
                        self.state = ScanState::Separators;
                        i += 1;
                    } else {
                        // A longer key such as a hypothetical
                        // `HugepagesizeMax`; not our line.
                        self.state = ScanState::SkipLine;
                    }
                }

                ScanState::Separators => {
                    let b = chunk[i];
                    if is_separator(b) {
                        i += 1;
                    } else if b.is_ascii_digit() {
                        self.state = ScanState::Digits;
                        self.value = usize::from(b - b'0');
                        i += 1;
                    } else {
                        self.state = ScanState::SkipLine;
                    }
                }

                ScanState::Digits => {
                    let b = chunk[i];
                    if b.is_ascii_digit() {
                        self.value = self
                            .value
                            .saturating_mul(10)
                            .saturating_add(usize::from(b - b'0'));
                        i += 1;
                    } else {
                        return Some(self.value.saturating_mul(1024));
                    }
                }
            }
        }
        None
    }

    /// EOF handling: a digit run terminated by end-of-file still counts.
    fn finish(&self) -> Option<usize> {
        if self.state == ScanState::Digits {
            Some(self.value.saturating_mul(1024))
        } else {
            None
        }
    }
}

#[inline]
fn is_separator(b: u8) -> bool {
    matches!(b, b':' | b' ' | b'\t')
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "MemTotal:       32658392 kB\n\
                          MemFree:         3932484 kB\n\
                          AnonHugePages:     10240 kB\n\
                          ShmemHugePages:        0 kB\n\
                          FileHugePages:         0 kB\n\
                          HugePages_Total:       0\n\
                          HugePages_Free:        0\n\
                          Hugepagesize:       2048 kB\n\
                          DirectMap4k:      304760 kB\n";

    fn parse(text: &str, chunk: usize) -> Option<usize> {
        parse_stream(text.as_bytes(), chunk)
    }

    #[test]
    fn test_parses_realistic_meminfo() {
        assert_eq!(parse(SAMPLE, 1024), Some(2048 * 1024));
    }

    // The lookalike keys before the real line must not confuse the matcher.
    #[test]
    fn test_lookalike_keys_are_skipped() {
        let text = "HugePages_Rsvd: 4\nHugepagesize: 1024 kB\n";
        assert_eq!(parse(text, 1024), Some(1024 * 1024));
    }

    #[test]
    fn test_key_split_across_every_chunk_boundary() {
        for chunk in 1..=SAMPLE.len() {
            assert_eq!(parse(SAMPLE, chunk), Some(2048 * 1024), "chunk = {chunk}");
        }
    }

    #[test]
    fn test_value_terminated_by_eof() {
        assert_eq!(parse("Hugepagesize: 512", 4), Some(512 * 1024));
    }

    #[test]
    fn test_missing_key() {
        assert_eq!(parse("MemTotal: 1 kB\nMemFree: 2 kB\n", 8), None);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse("", 16), None);
    }

    #[test]
    fn test_extended_key_is_rejected() {
        assert_eq!(parse("HugepagesizeMax: 77 kB\n", 6), None);
        let text = "HugepagesizeMax: 77 kB\nHugepagesize: 64 kB\n";
        assert_eq!(parse(text, 6), Some(64 * 1024));
    }

    #[test]
    fn test_key_without_separator_is_rejected() {
        assert_eq!(parse("Hugepagesize2048\n", 1024), None);
    }

    #[test]
    fn test_key_without_digits_is_rejected() {
        assert_eq!(parse("Hugepagesize:   kB\n", 1024), None);
    }

    #[test]
    fn test_zero_value() {
        assert_eq!(parse("Hugepagesize: 0 kB\n", 1024), Some(0));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_probe_on_live_system() {
        // Whatever the machine reports must be page-sized if present.
        if let Some(size) = huge_page_size() {
            assert_eq!(size % 1024, 0);
        }
    }
}
