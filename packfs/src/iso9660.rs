//! ISO9660 disc images.
//!
//! The image is indexed once when the package is opened: the volume
//! descriptors are walked from the end of the system area, and every
//! directory tree they describe is enumerated depth-first into a
//! `path → extent` index. A Joliet supplementary descriptor describes the
//! same tree again with UCS-2 names; its pass runs later and replaces the
//! index built from the primary descriptor.
//!
//! Layout reference (offsets in bytes):
//!
//! ```text
//! volume descriptor (2048-byte slot)
//!   +0    type (0x01 primary, 0x02 supplementary, 0xFF terminator)
//!   +1    "CD001"
//!   +7    volume flags (supplementary)
//!   +40   volume identifier, 32 bytes
//!   +88   escape sequences, 32 bytes (supplementary)
//!   +156  root directory record, 34 bytes
//!
//! directory record
//!   +0    record length (0 = no more records)
//!   +2    extent location, u32 LE (sectors)
//!   +10   data length, u32 LE
//!   +25   flags (bit 1 = directory)
//!   +32   identifier length
//!   +33   identifier ("NAME.EXT;1")
//! ```

use std::collections::{BTreeMap, HashSet};
use std::io::{self, SeekFrom};

use crate::error::{PackageError, Result};
use crate::loader::{PackageLoader, PackageLoaders};
use crate::package::{Package, open_nested};
use crate::stream::{self, BoxedStream, PackageStream, SegmentStream, SharedSource};

const SECTOR_SIZE: u64 = 2048;
const SYSTEM_AREA_SIZE: u64 = 16 * SECTOR_SIZE;
const MIN_IMAGE_SIZE: u64 = SYSTEM_AREA_SIZE + SECTOR_SIZE;
const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

const DESCRIPTOR_PRIMARY: u8 = 0x01;
const DESCRIPTOR_SUPPLEMENTARY: u8 = 0x02;
const DESCRIPTOR_TERMINATOR: u8 = 0xFF;

const VOLUME_FLAGS_OFFSET: usize = 7;
const VOLUME_ID_OFFSET: usize = 40;
const ESCAPE_SEQUENCES_OFFSET: usize = 88;
const ROOT_RECORD_OFFSET: usize = 156;
const ROOT_RECORD_LEN: usize = 34;

const JOLIET_ESCAPES: [&str; 3] = ["%/@", "%/C", "%/E"];

const RECORD_FIXED_LEN: usize = 33;
const FLAG_DIRECTORY: u8 = 0x02;
const MAX_DIRECTORY_DEPTH: usize = 64;

/// Byte range of a file inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// Absolute offset from the start of the image.
    pub offset: u64,
    pub length: u32,
}

/// Recognizes ISO9660 images by the `CD001` identifier of their first
/// volume descriptor.
pub struct Iso9660Loader;

impl PackageLoader for Iso9660Loader {
    fn name(&self) -> &'static str {
        "iso9660"
    }

    fn probe(&self, stream: &mut dyn PackageStream) -> io::Result<bool> {
        if stream::stream_length(stream)? < MIN_IMAGE_SIZE {
            return Ok(false);
        }

        let mut identifier = [0u8; 5];
        Ok(stream::peek(stream, SYSTEM_AREA_SIZE + 1, &mut identifier)?
            && &identifier == STANDARD_IDENTIFIER)
    }

    fn parse(&self, stream: BoxedStream, filename: &str) -> Result<Box<dyn Package>> {
        Ok(Box::new(Iso9660Package::new(stream, filename)?))
    }
}

/// Read-only package over an ISO9660 image.
///
/// Entries are served as range views over the image, so opening a file
/// never copies it.
pub struct Iso9660Package {
    name: String,
    volume_name: String,
    index: BTreeMap<String, Extent>,
    source: SharedSource,
}

impl Iso9660Package {
    /// Index the image read from `stream`.
    ///
    /// The stream is dropped if the image is malformed.
    pub fn new(mut stream: BoxedStream, filename: &str) -> Result<Self> {
        let mut parser = Parser {
            name: filename,
            stream: stream.as_mut(),
            image_len: 0,
            visited: HashSet::new(),
        };
        let (volume_name, index) = parser.parse()?;

        log::debug!(
            "{filename}: ISO9660 volume \"{volume_name}\" with {} entries",
            index.len()
        );

        Ok(Self {
            name: filename.to_owned(),
            volume_name,
            index,
            source: stream::share(stream),
        })
    }

    /// Volume identifier from the primary volume descriptor.
    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    /// The frozen `path → extent` index.
    pub fn index(&self) -> &BTreeMap<String, Extent> {
        &self.index
    }

    pub fn entry(&self, filename: &str) -> Option<Extent> {
        self.index.get(filename).copied()
    }
}

impl Package for Iso9660Package {
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
        let extent = self.entry(filename)?;
        Some(Box::new(SegmentStream::new(
            self.source.clone(),
            extent.offset,
            u64::from(extent.length),
        )))
    }

    fn open_package(
        &self,
        filename: &str,
        loaders: &PackageLoaders,
    ) -> Result<Option<Box<dyn Package>>> {
        open_nested(self, filename, loaders)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameEncoding {
    Ascii,
    /// Joliet: UCS-2, big-endian.
    Ucs2,
}

#[derive(Debug)]
struct DirectoryRecord {
    name: String,
    offset: u64,
    length: u32,
    is_directory: bool,
}

struct Parser<'a> {
    name: &'a str,
    stream: &'a mut dyn PackageStream,
    image_len: u64,
    /// Directory extents already enumerated in the current tree.
    visited: HashSet<u64>,
}

impl Parser<'_> {
    fn parse(&mut self) -> Result<(String, BTreeMap<String, Extent>)> {
        self.image_len = stream::stream_length(self.stream)?;

        let mut volume_name = String::new();
        let mut index = BTreeMap::new();
        let mut position = SYSTEM_AREA_SIZE;

        while position < self.image_len {
            let descriptor = self.read_at(position, SECTOR_SIZE.min(self.image_len - position))?;
            if descriptor.get(1..6) != Some(STANDARD_IDENTIFIER.as_slice()) {
                return Err(self.malformed(format!("invalid volume descriptor at {position}")));
            }

            match descriptor[0] {
                DESCRIPTOR_TERMINATOR => break,
                DESCRIPTOR_PRIMARY => {
                    volume_name = trim_padding(&decode_ascii(
                        self.field(&descriptor, VOLUME_ID_OFFSET, 32)?,
                    ))
                    .to_owned();
                    index = self.read_tree(&descriptor, NameEncoding::Ascii)?;
                }
                DESCRIPTOR_SUPPLEMENTARY => {
                    let flags = self.field(&descriptor, VOLUME_FLAGS_OFFSET, 1)?[0];
                    let escape = decode_ascii(self.field(&descriptor, ESCAPE_SEQUENCES_OFFSET, 32)?);
                    if flags == 0 && JOLIET_ESCAPES.contains(&escape.trim_matches('\0')) {
                        index = self.read_tree(&descriptor, NameEncoding::Ucs2)?;
                    }
                }
                other => log::debug!("{}: skipping volume descriptor type {other:#04x}", self.name),
            }

            // Descriptors occupy fixed slots regardless of their content.
            position += SECTOR_SIZE;
        }

        Ok((volume_name, index))
    }

    /// Enumerate the directory tree rooted at a descriptor's root record.
    fn read_tree(
        &mut self,
        descriptor: &[u8],
        encoding: NameEncoding,
    ) -> Result<BTreeMap<String, Extent>> {
        let root_bytes = self.field(descriptor, ROOT_RECORD_OFFSET, ROOT_RECORD_LEN)?;
        let root = match parse_record(root_bytes, encoding) {
            Ok(Some((root, _))) => root,
            Ok(None) => return Err(self.malformed("missing root directory record")),
            Err(reason) => return Err(self.malformed(reason)),
        };

        let mut index = BTreeMap::new();
        self.visited.clear();
        self.enumerate(&root, None, encoding, 0, &mut index)?;
        Ok(index)
    }

    fn enumerate(
        &mut self,
        directory: &DirectoryRecord,
        prefix: Option<&str>,
        encoding: NameEncoding,
        depth: usize,
        index: &mut BTreeMap<String, Extent>,
    ) -> Result<()> {
        if depth > MAX_DIRECTORY_DEPTH {
            return Err(self.malformed("directory tree is too deep"));
        }
        if !self.visited.insert(directory.offset) {
            return Err(self.malformed(format!(
                "directory at {} is listed more than once",
                directory.offset
            )));
        }
        self.check_extent(directory.offset, directory.length)?;

        let records = self.read_at(directory.offset, u64::from(directory.length))?;
        let mut position = 0;

        // The first two records are "." and "..".
        for _ in 0..2 {
            match parse_record(&records[position..], encoding) {
                Ok(Some((_, len))) => position += len,
                Ok(None) => break,
                Err(reason) => return Err(self.malformed(reason)),
            }
        }

        while position < records.len() {
            let (child, len) = match parse_record(&records[position..], encoding) {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(reason) => return Err(self.malformed(reason)),
            };
            position += len;

            let path = match prefix {
                Some(prefix) => format!("{prefix}/{}", child.name),
                None => child.name.clone(),
            };

            if child.is_directory {
                self.enumerate(&child, Some(&path), encoding, depth + 1, index)?;
            } else {
                self.check_extent(child.offset, child.length)?;
                index.insert(
                    path,
                    Extent {
                        offset: child.offset,
                        length: child.length,
                    },
                );
            }
        }

        Ok(())
    }

    fn check_extent(&self, offset: u64, length: u32) -> Result<()> {
        if offset + u64::from(length) > self.image_len {
            return Err(self.malformed(format!(
                "extent {offset}+{length} lies beyond the end of the image"
            )));
        }
        Ok(())
    }

    fn field<'b>(&self, bytes: &'b [u8], offset: usize, len: usize) -> Result<&'b [u8]> {
        bytes
            .get(offset..offset + len)
            .ok_or_else(|| self.malformed("truncated volume descriptor"))
    }

    fn read_at(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn malformed(&self, reason: impl Into<String>) -> PackageError {
        PackageError::malformed(self.name, reason)
    }
}

/// Parse the directory record at the start of `bytes`.
///
/// Returns `Ok(None)` when no record starts here (end of the buffer or a
/// zero record length), otherwise the record and its length in bytes.
fn parse_record(
    bytes: &[u8],
    encoding: NameEncoding,
) -> std::result::Result<Option<(DirectoryRecord, usize)>, String> {
    let record_len = match bytes.first() {
        None | Some(0) => return Ok(None),
        Some(&len) => usize::from(len),
    };

    if record_len < RECORD_FIXED_LEN {
        return Err(format!("directory record of {record_len} bytes is too short"));
    }
    if record_len > bytes.len() {
        return Err("directory record overruns its directory".into());
    }

    let record = &bytes[..record_len];
    let identifier_len = usize::from(record[32]);
    let identifier = record
        .get(RECORD_FIXED_LEN..RECORD_FIXED_LEN + identifier_len)
        .ok_or("file identifier overruns its directory record")?;

    let identifier = match encoding {
        NameEncoding::Ascii => decode_ascii(identifier),
        NameEncoding::Ucs2 => decode_ucs2(identifier),
    };
    let name = strip_version(&identifier).to_owned();

    Ok(Some((
        DirectoryRecord {
            name,
            offset: u64::from(read_u32_le(&record[2..6])) * SECTOR_SIZE,
            length: read_u32_le(&record[10..14]),
            is_directory: record[25] & FLAG_DIRECTORY != 0,
        },
        record_len,
    )))
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&byte| if byte.is_ascii() { char::from(byte) } else { '?' })
        .collect()
}

fn decode_ucs2(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Drop the `;version` suffix of a file identifier.
fn strip_version(identifier: &str) -> &str {
    identifier.split(';').next().unwrap_or(identifier)
}

fn trim_padding(text: &str) -> &str {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}
