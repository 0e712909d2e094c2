//! Mountable package file system for the RedLilium engine.
//!
//! Treats physical directories and container images uniformly as named
//! [`Package`]s of byte streams, and routes lookups across them through the
//! [`FileSystem`] mount table.
//!
//! # Architecture
//!
//! Container formats are recognized by [`PackageLoader`]s, which sniff a
//! stream and either decline or parse it. [`PackageLoaders`] tries them in
//! registration order. Packages can be opened inside other packages, to any
//! depth, with `|`-separated specs:
//!
//! ```ignore
//! let mut fs = FileSystem::new(PackageLoaders::with_defaults());
//! fs.mount("content/cnc", Some("cnc"))?;
//! fs.mount("discs/gdi.iso|install/setup.zip", Some("setup"))?;
//!
//! let rules = fs.open("rules.ini")?;
//! let map = fs.open("setup|maps/scm01ea.bin")?;
//! ```
//!
//! # Packages
//!
//! - [`Folder`]: A physical directory (read-write)
//! - [`Iso9660Package`]: An ISO9660 disc image, with Joliet names when present (read-only)
//! - [`ZipPackage`]: A ZIP archive; read-write only when opened from a file path
//!
//! # Writing
//!
//! Folders, and ZIP archives opened straight from disk, accept `update` and
//! `delete`; the other packages answer with [`PackageError::ReadOnly`].
//! Mounted packages are written through [`FileSystem::package_mut`].
//!
//! # Threading
//!
//! Range views returned by container packages share the container's handle
//! behind a lock, and each view keeps its own cursor, so sibling views can be
//! read from different threads. The mount table itself is only changed
//! through `&mut`.

pub mod adapter;
mod error;
mod filesystem;
mod folder;
pub mod iso9660;
mod loader;
mod manifest;
mod package;
pub mod path;
pub mod stream;
mod zip_archive;

pub use adapter::{AdapterStream, BufferData, InflateStream};
pub use error::{PackageError, Result};
pub use filesystem::FileSystem;
pub use folder::Folder;
pub use iso9660::{Iso9660Loader, Iso9660Package};
pub use loader::{PackageLoader, PackageLoaders};
pub use manifest::{MountManifest, MountReport, PackageMount};
pub use package::Package;
pub use stream::{BoxedStream, PackageStream, SegmentStream};
pub use zip_archive::{ZipLoader, ZipPackage};
