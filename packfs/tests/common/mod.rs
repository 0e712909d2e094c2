//! Shared fixtures for the package integration tests.
//!
//! [`IsoBuilder`] lays out small ISO9660 images in memory: a primary volume
//! descriptor with upper-case names, an optional Joliet tree with the names
//! as given, one sector per directory and file data after the directories.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io::{Cursor, Write};

use redlilium_packfs::BoxedStream;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const SECTOR: usize = 2048;
/// Offset of the primary volume descriptor.
pub const PRIMARY_DESCRIPTOR: usize = 16 * SECTOR;
/// Offset of the primary descriptor's root directory record.
pub const PRIMARY_ROOT_RECORD: usize = PRIMARY_DESCRIPTOR + 156;

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn boxed(bytes: Vec<u8>) -> BoxedStream {
    Box::new(Cursor::new(bytes))
}

/// Build a ZIP archive; `true` deflates the entry.
pub fn zip_archive(entries: &[(&str, &[u8], bool)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for &(name, contents, deflate) in entries {
        let method = if deflate {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        writer
            .start_file(name, SimpleFileOptions::default().compression_method(method))
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

struct FileSpec {
    path: String,
    contents: Vec<u8>,
    lba: Option<u32>,
}

pub struct IsoBuilder {
    volume: String,
    joliet: bool,
    files: Vec<FileSpec>,
}

#[derive(Clone, Copy, PartialEq)]
enum Tree {
    Primary,
    Joliet,
}

impl IsoBuilder {
    pub fn new(volume: &str) -> Self {
        Self {
            volume: volume.to_owned(),
            joliet: false,
            files: Vec::new(),
        }
    }

    /// Also write a Joliet supplementary descriptor.
    pub fn joliet(mut self) -> Self {
        self.joliet = true;
        self
    }

    pub fn file(mut self, path: &str, contents: &[u8]) -> Self {
        self.files.push(FileSpec {
            path: path.to_owned(),
            contents: contents.to_vec(),
            lba: None,
        });
        self
    }

    /// Place a file's data at a fixed sector.
    pub fn file_at(mut self, path: &str, lba: u32, contents: &[u8]) -> Self {
        self.files.push(FileSpec {
            path: path.to_owned(),
            contents: contents.to_vec(),
            lba: Some(lba),
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut directories = BTreeSet::from([String::new()]);
        for file in &self.files {
            let mut parent = file.path.as_str();
            while let Some((head, _)) = parent.rsplit_once('/') {
                directories.insert(head.to_owned());
                parent = head;
            }
        }
        let directories: Vec<String> = directories.into_iter().collect();

        let trees: &[Tree] = if self.joliet {
            &[Tree::Primary, Tree::Joliet]
        } else {
            &[Tree::Primary]
        };

        // Descriptors, then the terminator, then one sector per directory.
        let mut next_lba = 16 + trees.len() as u32 + 1;
        let mut directory_lbas = Vec::new();
        for _ in trees {
            let lbas: Vec<u32> = (0..directories.len() as u32).map(|i| next_lba + i).collect();
            next_lba += directories.len() as u32;
            directory_lbas.push(lbas);
        }

        let mut file_lbas = Vec::new();
        for file in &self.files {
            match file.lba {
                Some(lba) => file_lbas.push(lba),
                None => {
                    file_lbas.push(next_lba);
                    next_lba += file.contents.len().div_ceil(SECTOR).max(1) as u32;
                }
            }
        }

        let end = self
            .files
            .iter()
            .zip(&file_lbas)
            .map(|(file, &lba)| lba as usize * SECTOR + file.contents.len())
            .max()
            .unwrap_or(0)
            .max(next_lba as usize * SECTOR);
        let mut image = vec![0u8; end.div_ceil(SECTOR) * SECTOR];

        for (slot, (&tree, lbas)) in trees.iter().zip(&directory_lbas).enumerate() {
            let descriptor = PRIMARY_DESCRIPTOR + slot * SECTOR;
            self.write_descriptor(&mut image[descriptor..descriptor + SECTOR], tree, lbas[0]);

            for (dir_index, directory) in directories.iter().enumerate() {
                let sector = lbas[dir_index] as usize * SECTOR;
                let parent_lba = match directory.rsplit_once('/') {
                    Some((parent, _)) => lbas[position(&directories, parent)],
                    None if directory.is_empty() => lbas[dir_index],
                    None => lbas[0],
                };

                let mut records = Vec::new();
                records.extend(record(&[0], lbas[dir_index], SECTOR as u32, true));
                records.extend(record(&[1], parent_lba, SECTOR as u32, true));

                for (child_index, child) in directories.iter().enumerate() {
                    if !child.is_empty() && parent_of(child) == directory.as_str() {
                        let name = encode(tree, base_name(child), false);
                        records.extend(record(&name, lbas[child_index], SECTOR as u32, true));
                    }
                }
                for (file, &lba) in self.files.iter().zip(&file_lbas) {
                    if parent_of(&file.path) == directory.as_str() {
                        let name = encode(tree, base_name(&file.path), true);
                        records.extend(record(&name, lba, file.contents.len() as u32, false));
                    }
                }

                assert!(records.len() <= SECTOR, "directory {directory:?} overflows a sector");
                image[sector..sector + records.len()].copy_from_slice(&records);
            }
        }

        let terminator = PRIMARY_DESCRIPTOR + trees.len() * SECTOR;
        image[terminator] = 0xFF;
        image[terminator + 1..terminator + 6].copy_from_slice(b"CD001");
        image[terminator + 6] = 1;

        for (file, &lba) in self.files.iter().zip(&file_lbas) {
            let offset = lba as usize * SECTOR;
            image[offset..offset + file.contents.len()].copy_from_slice(&file.contents);
        }

        image
    }

    fn write_descriptor(&self, descriptor: &mut [u8], tree: Tree, root_lba: u32) {
        descriptor[0] = if tree == Tree::Primary { 0x01 } else { 0x02 };
        descriptor[1..6].copy_from_slice(b"CD001");
        descriptor[6] = 1;

        let volume: Vec<u8> = match tree {
            Tree::Primary => {
                let mut padded = self.volume.to_uppercase().into_bytes();
                padded.resize(32, b' ');
                padded
            }
            Tree::Joliet => {
                let mut padded: Vec<u8> = ucs2(&self.volume);
                while padded.len() < 32 {
                    padded.extend_from_slice(&[0x00, 0x20]);
                }
                padded
            }
        };
        descriptor[40..72].copy_from_slice(&volume[..32]);

        if tree == Tree::Joliet {
            descriptor[88..91].copy_from_slice(b"%/E");
        }

        let root = record(&[0], root_lba, SECTOR as u32, true);
        descriptor[156..156 + root.len()].copy_from_slice(&root);
    }
}

fn position(directories: &[String], path: &str) -> usize {
    directories
        .iter()
        .position(|directory| directory == path)
        .unwrap()
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn ucs2(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

fn encode(tree: Tree, name: &str, is_file: bool) -> Vec<u8> {
    let mut identifier = match tree {
        Tree::Primary => name.to_uppercase(),
        Tree::Joliet => name.to_owned(),
    };
    if is_file {
        identifier.push_str(";1");
    }
    match tree {
        Tree::Primary => identifier.into_bytes(),
        Tree::Joliet => ucs2(&identifier),
    }
}

/// A directory record with both-endian fields, padded to an even length.
pub fn record(identifier: &[u8], lba: u32, size: u32, is_directory: bool) -> Vec<u8> {
    let mut len = 33 + identifier.len();
    len += len % 2;

    let mut bytes = vec![0u8; len];
    bytes[0] = len as u8;
    bytes[2..6].copy_from_slice(&lba.to_le_bytes());
    bytes[6..10].copy_from_slice(&lba.to_be_bytes());
    bytes[10..14].copy_from_slice(&size.to_le_bytes());
    bytes[14..18].copy_from_slice(&size.to_be_bytes());
    bytes[25] = if is_directory { 0x02 } else { 0x00 };
    bytes[28] = 1;
    bytes[32] = identifier.len() as u8;
    bytes[33..33 + identifier.len()].copy_from_slice(identifier);
    bytes
}
