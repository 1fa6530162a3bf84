use thiserror::Error;

/// Layout preconditions are validated once, at construction — the cache
/// never fails at runtime afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("ways must be one of {{2, 4, 16}}, got {0}")]
    InvalidWays(usize),
    #[error("tag_bits must be one of {{8, 16}}, got {0}")]
    InvalidTagBits(u32),
    #[error("clock_bits must be one of {{1, 2, 4}}, got {0}")]
    InvalidClockBits(u32),
    #[error("size_of::<K>() ({0}) must be a power of two")]
    KeySizeNotPowerOfTwo(usize),
    #[error("size_of::<V>() ({0}) must be a power of two")]
    ValueSizeNotPowerOfTwo(usize),
    #[error("size_of::<K>() ({key}) must not exceed size_of::<V>() ({value})")]
    KeyLargerThanValue { key: usize, value: usize },
    #[error("size_of::<K>() ({key}) must be smaller than cache_line_size ({line})")]
    KeyNotSmallerThanCacheLine { key: usize, line: usize },
    #[error("cache_line_size ({line}) must be a power of two and a multiple of size_of::<K>() ({key})")]
    CacheLineSizeInvalid { line: usize, key: usize },
    #[error("cache_line_size ({line}) must divide size_of::<V>() ({value}) or vice versa")]
    CacheLineValueMismatch { line: usize, value: usize },
    #[error("value_count_max ({0}) must be a power of two, at least ways, and a multiple of ways")]
    InvalidValueCountMax(usize),
}
