use std::fmt;

use crate::error::{PackageError, Result};
use crate::loader::PackageLoaders;
use crate::stream::BoxedStream;

/// A named container of byte-addressable entries.
///
/// A package owns exactly one underlying resource (a directory, a file
/// handle or a parent range view) and releases it when dropped.
///
/// # Writes
///
/// Only folders and ZIP archives opened from disk accept `update` and
/// `delete`. Every other kind keeps the provided methods, which fail with
/// [`PackageError::ReadOnly`] naming the entry as `package|entry`; such kinds
/// report `true` from [`is_read_only`](Package::is_read_only).
///
/// # Contents
///
/// [`contents`](Package::contents) is sorted bytewise and separates nested
/// segments with `/` on every platform, so repeated listings of the same
/// content are byte-identical and can be hashed.
pub trait Package: Send + Sync {
    /// Identity of the package, also used as a cache key.
    fn name(&self) -> &str;

    /// Entries of the package, sorted.
    fn contents(&self) -> Vec<String>;

    /// Whether `filename` names an entry of this package.
    fn contains(&self, filename: &str) -> bool;

    /// Open an entry for reading.
    ///
    /// Returns `None` when the entry is absent or cannot be read; an
    /// unreadable entry is treated exactly like a missing one.
    fn get_stream(&self, filename: &str) -> Option<BoxedStream>;

    /// Open an entry of this package as a package in its own right.
    ///
    /// Returns `Ok(None)` when the entry is absent or no loader recognizes it,
    /// and `Err` when a loader accepted the entry but could not parse it.
    fn open_package(
        &self,
        filename: &str,
        loaders: &PackageLoaders,
    ) -> Result<Option<Box<dyn Package>>>;

    /// Whether this package is read-only.
    fn is_read_only(&self) -> bool {
        true
    }

    /// Create or overwrite an entry.
    fn update(&mut self, filename: &str, _contents: &[u8]) -> Result<()> {
        Err(PackageError::ReadOnly(format!("{}|{filename}", self.name())))
    }

    /// Remove an entry. Removing an absent entry is not an error.
    fn delete(&mut self, filename: &str) -> Result<()> {
        Err(PackageError::ReadOnly(format!("{}|{filename}", self.name())))
    }
}

impl fmt::Debug for dyn Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

/// Open `filename` inside `package` by handing its stream to the loaders.
///
/// The stream is dropped, and with it any handle it holds, when no loader
/// accepts it.
pub(crate) fn open_nested(
    package: &dyn Package,
    filename: &str,
    loaders: &PackageLoaders,
) -> Result<Option<Box<dyn Package>>> {
    let Some(stream) = package.get_stream(filename) else {
        return Ok(None);
    };
    loaders.try_parse(stream, filename)
}
