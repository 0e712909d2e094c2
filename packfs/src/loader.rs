use std::io;

use crate::error::Result;
use crate::iso9660::Iso9660Loader;
use crate::package::Package;
use crate::stream::{BoxedStream, PackageStream};
use crate::zip_archive::ZipLoader;

/// A container format that can be recognized from a stream.
///
/// Loaders compose by declination: `probe` answers whether the stream looks
/// like this format, and `parse` is only called after a successful probe.
pub trait PackageLoader: Send + Sync {
    /// Short format name, for logs.
    fn name(&self) -> &'static str;

    /// Check the stream's signature.
    ///
    /// Must read only a small, fixed header region and must leave the stream
    /// position where it found it (see [`peek`](crate::stream::peek)).
    fn probe(&self, stream: &mut dyn PackageStream) -> io::Result<bool>;

    /// Parse an accepted stream into a package that takes ownership of it.
    ///
    /// On failure the stream is dropped before the error is returned.
    fn parse(&self, stream: BoxedStream, filename: &str) -> Result<Box<dyn Package>>;
}

/// Ordered list of package loaders.
///
/// Loaders are probed in registration order and the first one that accepts
/// a stream parses it, so ambiguous headers always resolve the same way.
pub struct PackageLoaders {
    loaders: Vec<Box<dyn PackageLoader>>,
}

impl PackageLoaders {
    /// Create a registry with no loaders.
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Create a registry with the built-in formats: ZIP, then ISO9660.
    pub fn with_defaults() -> Self {
        let mut loaders = Self::new();
        loaders.register(ZipLoader).register(Iso9660Loader);
        loaders
    }

    /// Append a loader at the lowest priority.
    pub fn register(&mut self, loader: impl PackageLoader + 'static) -> &mut Self {
        self.loaders.push(Box::new(loader));
        self
    }

    /// Names of the registered loaders, in probe order.
    pub fn names(&self) -> Vec<&'static str> {
        self.loaders.iter().map(|loader| loader.name()).collect()
    }

    /// Offer `stream` to each loader in turn.
    ///
    /// Returns `Ok(None)` when every loader declines; the stream is dropped
    /// in that case. A probe that fails with an IO error counts as a
    /// declination.
    pub fn try_parse(
        &self,
        mut stream: BoxedStream,
        filename: &str,
    ) -> Result<Option<Box<dyn Package>>> {
        for loader in &self.loaders {
            match loader.probe(stream.as_mut()) {
                Ok(true) => {
                    log::debug!("{filename}: recognized as {}", loader.name());
                    return loader.parse(stream, filename).map(Some);
                }
                Ok(false) => {}
                Err(err) => log::debug!("{filename}: {} probe failed: {err}", loader.name()),
            }
        }

        log::debug!("{filename}: no package loader recognized this file");
        Ok(None)
    }
}

impl Default for PackageLoaders {
    fn default() -> Self {
        Self::with_defaults()
    }
}
