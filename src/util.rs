macro_rules! time_info {
    ($name:expr, $f:block) => {{
        let start = std::time::Instant::now();
        let result = $f;
        let end = std::time::Instant::now();
        log::info!("{} (took {:?})", $name, end.duration_since(start));
        result
    }};
}

macro_rules! time_debug {
    ($name:expr, $f:block) => {{
        let start = std::time::Instant::now();
        let result = $f;
        let end = std::time::Instant::now();
        log::debug!("{} (took {:?})", $name, end.duration_since(start));
        result
    }};
}

/// Mask selecting the lowest `width` bits of a `u64`.
pub fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::max_value()
    } else {
        (1_u64 << width) - 1
    }
}

/// Truncates `value` to `width` bits.
pub fn truncate(value: u64, width: u32) -> u64 {
    value & mask(width)
}

/// Number of bytes needed to hold `width` bits.
pub fn bytes_for(width: u32) -> u32 {
    (width + 7) / 8
}
