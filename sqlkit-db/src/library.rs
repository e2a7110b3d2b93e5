//! Process-wide facts about the linked `SQLite` library.

use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use super::ffi;

/// Version information of the linked library.
///
/// Read from the library once, on first use, and shared afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryInfo {
    /// Version string, e.g. `"3.46.0"`.
    pub version: String,
    /// Version as `X * 1_000_000 + Y * 1_000 + Z`.
    pub version_number: i32,
    /// Check-in date and hash of the library source.
    pub source_id: String,
}

static INFO: OnceLock<LibraryInfo> = OnceLock::new();

impl LibraryInfo {
    /// Returns the shared instance, querying the library on the first call.
    pub fn get() -> &'static Self {
        INFO.get_or_init(|| {
            let info = Self {
                version: ffi::lib_version(),
                version_number: ffi::lib_version_number(),
                source_id: ffi::lib_source_id(),
            };
            log::debug!("linked sqlite {}", info.version);
            info
        })
    }
}

impl fmt::Display for LibraryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SQLite {} ({}); {}",
            self.version, self.version_number, self.source_id
        )
    }
}

/// Bytes of memory currently held by the library's allocator.
#[must_use]
pub fn memory_used() -> i64 {
    ffi::memory_used()
}

/// Peak of [`memory_used`] since the last reset. Pass `reset = true` to
/// restart tracking from the current value.
#[must_use]
pub fn memory_highwater(reset: bool) -> i64 {
    ffi::memory_highwater(reset)
}
