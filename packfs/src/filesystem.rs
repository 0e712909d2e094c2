use std::path::Path;

use crate::error::{PackageError, Result};
use crate::folder::Folder;
use crate::loader::PackageLoaders;
use crate::package::Package;
use crate::path;
use crate::stream::BoxedStream;

/// Mount table that routes file lookups to mounted packages.
///
/// Packages are kept in mount order and earlier mounts shadow later ones:
/// a plain filename resolves to the first package that contains it. A name
/// of the form `"alias|rest"` bypasses the walk and addresses the package
/// mounted under `alias` (or whose package name is `alias`) directly.
///
/// Mounting and unmounting take `&mut self`, so the table can only change
/// while nobody is reading from it.
///
/// # Example
///
/// ```ignore
/// let mut fs = FileSystem::new(PackageLoaders::with_defaults());
/// fs.mount("content/cnc", Some("cnc"))?;
/// fs.mount("cnc|scores.mix", None)?;
///
/// // Searches every mount in priority order:
/// let rules = fs.open("rules.ini")?;
/// // Only looks inside the package mounted as "cnc":
/// let map = fs.open("cnc|maps/desert.bin")?;
/// ```
pub struct FileSystem {
    loaders: PackageLoaders,
    mounts: Vec<Mount>,
}

struct Mount {
    package: Box<dyn Package>,
    explicit_name: Option<String>,
}

impl Mount {
    fn answers_to(&self, name: &str) -> bool {
        self.explicit_name.as_deref() == Some(name) || self.package.name() == name
    }
}

impl FileSystem {
    /// Create an empty mount table that opens packages with `loaders`.
    pub fn new(loaders: PackageLoaders) -> Self {
        Self {
            loaders,
            mounts: Vec::new(),
        }
    }

    pub fn loaders(&self) -> &PackageLoaders {
        &self.loaders
    }

    /// Open the package described by `spec` and mount it at the lowest
    /// priority.
    ///
    /// `spec` is a physical path, optionally followed by `|`-separated
    /// entries to open recursively: `"discs/cd1.iso|install/setup.z"`. The
    /// first segment may also name an already mounted package.
    pub fn mount(&mut self, spec: &str, explicit_name: Option<&str>) -> Result<()> {
        if let Some(name) = explicit_name {
            self.check_unique(name)?;
        }
        let package = self.open_spec(spec)?;
        self.mount_package(package, explicit_name)
    }

    /// Mount an already opened package at the lowest priority.
    pub fn mount_package(
        &mut self,
        package: Box<dyn Package>,
        explicit_name: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = explicit_name {
            self.check_unique(name)?;
        }

        match explicit_name {
            Some(name) => log::info!("mounted {} as {name}", package.name()),
            None => log::info!("mounted {}", package.name()),
        }

        self.mounts.push(Mount {
            package,
            explicit_name: explicit_name.map(str::to_owned),
        });
        Ok(())
    }

    /// Unmount the package with the given package name or explicit name.
    ///
    /// Dropping the package releases its underlying handle. Returns `false`
    /// when nothing was mounted under `name`.
    pub fn unmount(&mut self, name: &str) -> bool {
        let Some(position) = self.mounts.iter().position(|mount| mount.answers_to(name)) else {
            return false;
        };

        let mount = self.mounts.remove(position);
        log::info!("unmounted {}", mount.package.name());
        true
    }

    pub fn unmount_all(&mut self) {
        if !self.mounts.is_empty() {
            log::info!("unmounting {} packages", self.mounts.len());
        }
        self.mounts.clear();
    }

    /// Whether `filename` exists in any mounted package.
    pub fn exists(&self, filename: &str) -> bool {
        self.package_containing(filename).is_some()
    }

    /// Open `filename` for reading.
    ///
    /// Returns [`PackageError::NotFound`] when no mounted package can
    /// provide it.
    pub fn open(&self, filename: &str) -> Result<BoxedStream> {
        self.try_open(filename)
            .ok_or_else(|| PackageError::NotFound(filename.to_owned()))
    }

    /// Open `filename` for reading, or `None` when no mounted package can
    /// provide it.
    pub fn try_open(&self, filename: &str) -> Option<BoxedStream> {
        if let (alias, Some(rest)) = path::split_package(filename) {
            return self.find(alias)?.package.get_stream(rest);
        }

        self.mounts
            .iter()
            .find_map(|mount| mount.package.get_stream(filename))
    }

    /// The highest-priority package that contains `filename`.
    pub fn package_containing(&self, filename: &str) -> Option<&dyn Package> {
        if let (alias, Some(rest)) = path::split_package(filename) {
            return self
                .find(alias)
                .map(|mount| mount.package.as_ref())
                .filter(|package| package.contains(rest));
        }

        self.mounts
            .iter()
            .map(|mount| mount.package.as_ref())
            .find(|package| package.contains(filename))
    }

    /// Mounted package with the given package name or explicit name.
    pub fn package(&self, name: &str) -> Option<&dyn Package> {
        self.find(name).map(|mount| mount.package.as_ref())
    }

    /// Mutable access to a mounted package, for writes.
    pub fn package_mut(&mut self, name: &str) -> Option<&mut (dyn Package + 'static)> {
        self.mounts
            .iter_mut()
            .find(|mount| mount.answers_to(name))
            .map(|mount| mount.package.as_mut())
    }

    /// Mounted packages in priority order.
    pub fn mounted_packages(&self) -> impl Iterator<Item = &dyn Package> + '_ {
        self.mounts.iter().map(|mount| mount.package.as_ref())
    }

    fn find(&self, name: &str) -> Option<&Mount> {
        self.mounts.iter().find(|mount| mount.answers_to(name))
    }

    fn check_unique(&self, explicit_name: &str) -> Result<()> {
        if self
            .mounts
            .iter()
            .any(|mount| mount.explicit_name.as_deref() == Some(explicit_name))
        {
            return Err(PackageError::DuplicateMount(explicit_name.to_owned()));
        }
        Ok(())
    }

    fn open_spec(&self, spec: &str) -> Result<Box<dyn Package>> {
        let (head, mut rest) = path::split_package(spec);

        let mut package = match (self.find(head), rest) {
            (Some(mount), Some(tail)) => {
                let (name, next) = path::split_package(tail);
                rest = next;
                self.open_in(mount.package.as_ref(), name)?
            }
            _ => self.open_physical(head)?,
        };

        while let Some(tail) = rest {
            let (name, next) = path::split_package(tail);
            package = self.open_in(package.as_ref(), name)?;
            rest = next;
        }

        Ok(package)
    }

    fn open_in(&self, parent: &dyn Package, filename: &str) -> Result<Box<dyn Package>> {
        match parent.open_package(filename, &self.loaders)? {
            Some(package) => Ok(package),
            None if parent.contains(filename) => Err(PackageError::NoLoader(format!(
                "{}|{filename}",
                parent.name()
            ))),
            None => Err(PackageError::NotFound(format!(
                "{}|{filename}",
                parent.name()
            ))),
        }
    }

    /// Directories become folders. Files are opened through a folder over
    /// their parent directory so writable archives stay writable.
    fn open_physical(&self, physical: &str) -> Result<Box<dyn Package>> {
        let path = Path::new(physical);
        if path.is_dir() {
            return Ok(Box::new(Folder::new(path)?));
        }
        if !path.is_file() {
            return Err(PackageError::NotFound(physical.to_owned()));
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| PackageError::InvalidPath(physical.to_owned()))?;
        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let folder = Folder::new(parent)?;
        self.open_in(&folder, &file_name)
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new(PackageLoaders::with_defaults())
    }
}
