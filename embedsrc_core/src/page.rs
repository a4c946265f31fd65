//! Page-size queries and alignment math.

/// Fallback when the OS refuses to report a page size.
const DEFAULT_PAGE_SIZE: usize = 4096;

/// Base (non-huge) page size of the running system.
#[cfg(unix)]
pub fn base_page_size() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        n as usize
    }
}

/// Base (non-huge) page size of the running system.
#[cfg(windows)]
pub fn base_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Round `n` up to a multiple of `align`. `align` must be a power of two.
#[inline]
pub const fn align_up(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

/// Round `n` down to a multiple of `align`. `align` must be a power of two.
#[inline]
pub const fn align_down(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    n & !(align - 1)
}

// =============================================================================
// Tests
// =============================================================================
