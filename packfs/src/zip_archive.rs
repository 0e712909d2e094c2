//! ZIP archives.
//!
//! The `zip` crate reads the central directory into an index of raw entry
//! ranges; entry data is then served straight from the archive's shared
//! handle, through an [`InflateStream`](crate::adapter::InflateStream) when
//! the entry is deflated.
//!
//! ZIP is the one container kind that can be written, and only when it was
//! opened from a file path ([`ZipPackage::open_read_write`]): an update
//! rewrites the whole archive, which a borrowed stream cannot support. A
//! [`ZipPackage`] parsed from a stream by [`ZipLoader`] is read-only.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::adapter;
use crate::error::{PackageError, Result};
use crate::loader::{PackageLoader, PackageLoaders};
use crate::package::{Package, open_nested};
use crate::path;
use crate::stream::{self, BoxedStream, PackageStream, SegmentStream, SharedSource};

const LOCAL_FILE_HEADER: [u8; 4] = *b"PK\x03\x04";
const END_OF_CENTRAL_DIRECTORY: [u8; 4] = *b"PK\x05\x06";

fn is_zip_signature(signature: &[u8; 4]) -> bool {
    *signature == LOCAL_FILE_HEADER || *signature == END_OF_CENTRAL_DIRECTORY
}

/// Recognizes ZIP archives by their leading signature.
pub struct ZipLoader;

impl PackageLoader for ZipLoader {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn probe(&self, stream: &mut dyn PackageStream) -> io::Result<bool> {
        let mut signature = [0u8; 4];
        Ok(stream::peek(stream, 0, &mut signature)? && is_zip_signature(&signature))
    }

    fn parse(&self, stream: BoxedStream, filename: &str) -> Result<Box<dyn Package>> {
        Ok(Box::new(ZipPackage::from_stream(stream, filename)?))
    }
}

#[derive(Debug, Clone, Copy)]
struct ZipEntry {
    data_start: u64,
    compressed_size: u64,
    method: CompressionMethod,
}

/// Package over a ZIP archive.
pub struct ZipPackage {
    name: String,
    index: BTreeMap<String, ZipEntry>,
    source: SharedSource,
    /// Set when the archive was opened from disk and may be rewritten.
    path: Option<PathBuf>,
}

impl ZipPackage {
    /// Index an archive read from `stream`. The package is read-only.
    pub fn from_stream(mut stream: BoxedStream, filename: &str) -> Result<Self> {
        let len = stream::stream_length(stream.as_mut())?;
        let source = stream::share(stream);
        let index = read_index(SegmentStream::new(source.clone(), 0, len), filename)?;

        log::debug!("{filename}: ZIP archive with {} entries", index.len());

        Ok(Self {
            name: filename.to_owned(),
            index,
            source,
            path: None,
        })
    }

    /// Open the archive at `path` for reading and writing.
    ///
    /// Returns `Ok(None)` when `path` is not a file or does not start with a
    /// ZIP signature. The package is named after its full path.
    pub fn open_read_write(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(None);
        }

        let mut file = File::open(path)?;
        let mut signature = [0u8; 4];
        if !stream::peek(&mut file, 0, &mut signature)? || !is_zip_signature(&signature) {
            return Ok(None);
        }

        let mut package = Self::from_stream(Box::new(file), &path.to_string_lossy())?;
        package.path = Some(path.to_owned());
        Ok(Some(package))
    }

    /// Write an empty archive at `path` and open it for reading and writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let name = path.to_string_lossy().into_owned();
        let empty = ZipWriter::new(Cursor::new(Vec::new()))
            .finish()
            .map_err(|err| PackageError::zip(name.as_str(), err))?;
        fs::write(path, empty.into_inner())?;

        Self::open_read_write(path)?.ok_or(PackageError::NotFound(name))
    }

    /// Rebuild the archive on disk without `filename`, appending `contents`
    /// under that name when given, then re-index it.
    fn rewrite(&mut self, filename: &str, contents: Option<&[u8]>) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Err(PackageError::ReadOnly(self.name.clone()));
        };
        let zip_err = |err| PackageError::zip(self.name.as_str(), err);

        let mut archive = ZipArchive::new(File::open(&path)?).map_err(zip_err)?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i).map_err(zip_err)?;
            if file.name() == filename {
                continue;
            }
            writer.raw_copy_file(file).map_err(zip_err)?;
        }

        if let Some(contents) = contents {
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file(filename, options).map_err(zip_err)?;
            writer.write_all(contents)?;
        }

        let bytes = writer.finish().map_err(zip_err)?.into_inner();
        drop(archive);
        fs::write(&path, bytes)?;

        let reopened = Self::from_stream(Box::new(File::open(&path)?), &self.name)?;
        self.index = reopened.index;
        self.source = reopened.source;
        Ok(())
    }
}

impl Package for ZipPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn contents(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    fn contains(&self, filename: &str) -> bool {
        self.index.contains_key(filename)
    }

    fn get_stream(&self, filename: &str) -> Option<BoxedStream> {
        let entry = self.index.get(filename)?;
        let raw = SegmentStream::new(self.source.clone(), entry.data_start, entry.compressed_size);

        match entry.method {
            CompressionMethod::Stored => Some(Box::new(raw)),
            CompressionMethod::Deflated => Some(Box::new(adapter::inflate(raw))),
            other => {
                log::warn!(
                    "{}: {filename} uses unsupported compression method {other:?}",
                    self.name
                );
                None
            }
        }
    }

    fn open_package(
        &self,
        filename: &str,
        loaders: &PackageLoaders,
    ) -> Result<Option<Box<dyn Package>>> {
        let Some(entry) = self.index.get(filename) else {
            return Ok(None);
        };
        if entry.method == CompressionMethod::Stored {
            return open_nested(self, filename, loaders);
        }

        // Loaders need to seek, and inflated entries cannot: load the entry.
        let Some(mut stream) = self.get_stream(filename) else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        if let Err(err) = stream.read_to_end(&mut bytes) {
            log::warn!("{}: cannot read {filename}: {err}", self.name);
            return Ok(None);
        }

        loaders.try_parse(Box::new(Cursor::new(bytes)), filename)
    }

    fn is_read_only(&self) -> bool {
        self.path.is_none()
    }

    fn update(&mut self, filename: &str, contents: &[u8]) -> Result<()> {
        let filename = path::normalize(filename)?;
        self.rewrite(&filename, Some(contents))
    }

    fn delete(&mut self, filename: &str) -> Result<()> {
        let filename = path::normalize(filename)?;
        if self.path.is_none() {
            return Err(PackageError::ReadOnly(self.name.clone()));
        }
        if !self.index.contains_key(&filename) {
            return Ok(());
        }
        self.rewrite(&filename, None)
    }
}

fn read_index<R: Read + io::Seek>(reader: R, name: &str) -> Result<BTreeMap<String, ZipEntry>> {
    let mut archive = ZipArchive::new(reader).map_err(|err| PackageError::zip(name, err))?;
    let mut index = BTreeMap::new();

    for i in 0..archive.len() {
        let file = archive
            .by_index_raw(i)
            .map_err(|err| PackageError::zip(name, err))?;
        if file.is_dir() {
            continue;
        }

        index.insert(
            file.name().to_owned(),
            ZipEntry {
                data_start: file.data_start(),
                compressed_size: file.compressed_size(),
                method: file.compression(),
            },
        );
    }

    Ok(index)
}
