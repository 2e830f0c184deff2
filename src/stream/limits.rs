//! Configurable limits for tar archive reading.

/// Default ceiling for a GNU long name payload: 32 KiB.
pub const DEFAULT_MAX_LONG_NAME_SIZE: u64 = 32 * 1024;

/// Configurable limits for tar archive reading.
///
/// These limits protect against malicious or malformed archives that could
/// make the reader buffer large amounts of metadata.
///
/// # Example
///
/// ```
/// use tarstream::stream::Limits;
///
/// // Use defaults
/// let limits = Limits::default();
///
/// // Customize limits
/// let strict_limits = Limits {
///     max_long_name_size: 1024,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum declared size of a GNU long name ('L') payload in bytes.
    ///
    /// The payload holds a single path plus a NUL terminator; anything larger
    /// than this is treated as corruption and fails with
    /// [`TarError::LongNameTooLarge`]. A payload of exactly this size is
    /// accepted.
    ///
    /// Default: 32 KiB (32,768 bytes).
    ///
    /// [`TarError::LongNameTooLarge`]: super::TarError::LongNameTooLarge
    pub max_long_name_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_long_name_size: DEFAULT_MAX_LONG_NAME_SIZE,
        }
    }
}

impl Limits {
    /// Create a new `Limits` with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create permissive limits suitable for trusted archives.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            max_long_name_size: u64::MAX,
        }
    }

    /// Create strict limits suitable for untrusted archives.
    ///
    /// 4096 bytes matches the Linux `PATH_MAX`.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_long_name_size: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_long_name_size, 32768);
        assert_eq!(limits, Limits::new());
    }

    #[test]
    fn test_permissive_limits() {
        assert_eq!(Limits::permissive().max_long_name_size, u64::MAX);
    }

    #[test]
    fn test_strict_limits() {
        assert!(Limits::strict().max_long_name_size < Limits::default().max_long_name_size);
    }
}
