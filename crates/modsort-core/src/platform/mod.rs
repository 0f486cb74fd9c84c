//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here rather than in the
//! pipeline or relocator.

pub mod paths;

pub use paths::{api_key_path, app_cache_dir, app_config_dir, default_cache_log_path};

/// Whether a rename failed because source and target are on different
/// filesystems.
pub fn is_cross_device(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(18) // EXDEV
    }
    #[cfg(windows)]
    {
        err.raw_os_error() == Some(17) // ERROR_NOT_SAME_DEVICE
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = err;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_errors_are_not_cross_device() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!is_cross_device(&err));
    }

    #[cfg(unix)]
    #[test]
    fn test_exdev_is_cross_device() {
        let err = std::io::Error::from_raw_os_error(18);
        assert!(is_cross_device(&err));
    }
}
