use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PackageError, Result};
use crate::loader::PackageLoaders;
use crate::package::{Package, open_nested};
use crate::path;
use crate::stream::BoxedStream;
use crate::zip_archive::ZipPackage;

/// Read-write package backed by a physical directory.
///
/// Entry names are joined onto the root directory. Names containing `..`
/// are rejected before they reach the file system, so a folder never
/// exposes anything outside its root.
///
/// # Example
///
/// ```ignore
/// let mut folder = Folder::new("./content/cnc")?;
/// folder.update("maps/desert/map.bin", &bytes)?;
/// let stream = folder.get_stream("maps/desert/map.bin");
/// ```
pub struct Folder {
    name: String,
    root: PathBuf,
}

impl Folder {
    /// Create a folder package rooted at `path`, creating the directory if
    /// it does not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        if !root.is_dir() {
            fs::create_dir_all(&root)?;
        }

        Ok(Self {
            name: root.to_string_lossy().into_owned(),
            root,
        })
    }

    /// The physical directory backing this package.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an entry name to a physical path.
    ///
    /// Accepts names that are already expressed under the folder's own root.
    fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let relative = path::strip_root(filename, &self.name);
        path::normalize(relative)
            .ok()
            .map(|normalized| self.root.join(normalized))
    }
}

impl Package for Folder {
    fn name(&self) -> &str {
        &self.name
    }

    fn contents(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("cannot list {}: {err}", self.name);
                return Vec::new();
            }
        };

        // Directory iteration order is platform dependent.
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn contains(&self, filename: &str) -> bool {
        self.resolve(filename).is_some_and(|path| path.is_file())
    }

    fn get_stream(&self, filename: &str) -> Option<BoxedStream> {
        let path = self.resolve(filename)?;
        if !path.is_file() {
            return None;
        }

        match fs::File::open(&path) {
            Ok(file) => Some(Box::new(file)),
            Err(err) => {
                log::warn!("cannot open {}: {err}", path.display());
                None
            }
        }
    }

    fn open_package(
        &self,
        filename: &str,
        loaders: &PackageLoaders,
    ) -> Result<Option<Box<dyn Package>>> {
        let Some(path) = self.resolve(filename) else {
            return Ok(None);
        };

        if path.is_dir() {
            return Ok(Some(Box::new(Folder::new(path)?)));
        }

        // ZIP archives can only be written through a file handle, so they
        // are opened straight from disk here instead of from a stream.
        if let Some(archive) = ZipPackage::open_read_write(&path)? {
            return Ok(Some(Box::new(archive)));
        }

        open_nested(self, filename, loaders)
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn update(&mut self, filename: &str, contents: &[u8]) -> Result<()> {
        let path = self
            .resolve(filename)
            .ok_or_else(|| PackageError::InvalidPath(filename.to_owned()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn delete(&mut self, filename: &str) -> Result<()> {
        let path = self
            .resolve(filename)
            .ok_or_else(|| PackageError::InvalidPath(filename.to_owned()))?;

        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_all(mut stream: BoxedStream) -> Vec<u8> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("support/maps");

        let folder = Folder::new(&root).unwrap();
        assert!(root.is_dir());
        assert!(folder.contents().is_empty());
    }

    #[test]
    fn contents_are_sorted_files_and_directories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), b"").unwrap();
        fs::write(dir.path().join("a.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("c")).unwrap();

        let folder = Folder::new(dir.path()).unwrap();
        assert_eq!(folder.contents(), vec!["a.txt", "b.txt", "c"]);
        assert_eq!(folder.contents(), folder.contents());
    }

    #[test]
    fn get_stream_reads_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("rules.yaml"), b"World:").unwrap();

        let folder = Folder::new(dir.path()).unwrap();
        let stream = folder.get_stream("rules.yaml").unwrap();
        assert_eq!(read_all(stream), b"World:");
    }

    #[test]
    fn missing_entries_are_absent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let folder = Folder::new(dir.path()).unwrap();
        assert!(folder.get_stream("nope.txt").is_none());
        assert!(folder.get_stream("sub").is_none());
        assert!(!folder.contains("nope.txt"));
        assert!(!folder.contains("sub"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_absent() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locked.bin");
        fs::write(&path, b"secret").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not apply to privileged users.
        if fs::File::open(&path).is_ok() {
            return;
        }

        let folder = Folder::new(dir.path()).unwrap();
        assert!(folder.contains("locked.bin"));
        assert!(folder.get_stream("locked.bin").is_none());
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("secret.txt"), b"x").unwrap();
        let folder = Folder::new(dir.path().join("inner")).unwrap();

        assert!(!folder.contains("../secret.txt"));
        assert!(folder.get_stream("../secret.txt").is_none());
    }

    #[test]
    fn update_creates_intermediate_directories() {
        let dir = TempDir::new().unwrap();
        let mut folder = Folder::new(dir.path()).unwrap();

        folder.update("new/deep/file.bin", &[1, 2, 3]).unwrap();
        assert!(dir.path().join("new/deep").is_dir());
        assert_eq!(read_all(folder.get_stream("new/deep/file.bin").unwrap()), [1, 2, 3]);
    }

    #[test]
    fn update_accepts_names_under_own_root() {
        let dir = TempDir::new().unwrap();
        let mut folder = Folder::new(dir.path()).unwrap();
        let absolute = format!("{}/maps/a.bin", folder.name());

        folder.update(&absolute, b"data").unwrap();
        assert_eq!(fs::read(dir.path().join("maps/a.bin")).unwrap(), b"data");

        folder.delete(&absolute).unwrap();
        assert!(!dir.path().join("maps/a.bin").exists());
    }

    #[test]
    fn delete_missing_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut folder = Folder::new(dir.path()).unwrap();
        folder.delete("does/not/exist.bin").unwrap();
    }

    #[test]
    fn delete_removes_directories_recursively() {
        let dir = TempDir::new().unwrap();
        let mut folder = Folder::new(dir.path()).unwrap();
        folder.update("maps/one/map.bin", b"1").unwrap();

        folder.delete("maps").unwrap();
        assert!(!dir.path().join("maps").exists());
    }

    #[test]
    fn open_package_on_directory_returns_folder() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("mods/cnc")).unwrap();
        fs::write(dir.path().join("mods/cnc/mod.yaml"), b"").unwrap();

        let folder = Folder::new(dir.path()).unwrap();
        let loaders = PackageLoaders::with_defaults();
        let package = folder.open_package("mods/cnc", &loaders).unwrap().unwrap();

        assert!(!package.is_read_only());
        assert_eq!(package.contents(), vec!["mod.yaml"]);
    }

    #[test]
    fn open_package_on_unknown_file_is_none() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readme.txt"), b"plain text").unwrap();

        let folder = Folder::new(dir.path()).unwrap();
        let loaders = PackageLoaders::with_defaults();
        assert!(folder.open_package("readme.txt", &loaders).unwrap().is_none());
        assert!(folder.open_package("missing.iso", &loaders).unwrap().is_none());
    }

    #[test]
    fn is_not_read_only() {
        let dir = TempDir::new().unwrap();
        assert!(!Folder::new(dir.path()).unwrap().is_read_only());
    }
}
