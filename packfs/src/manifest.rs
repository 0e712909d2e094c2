use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::filesystem::FileSystem;

/// Mount configuration loaded from TOML.
///
/// ```toml
/// required = ["cnc|conquer.mix"]
///
/// [[package]]
/// path = "content/cnc"
/// name = "cnc"
///
/// [[package]]
/// path = "cnc|scores.mix"
/// optional = true
/// ```
///
/// Paths are package specs as accepted by [`FileSystem::mount`]; relative
/// physical paths resolve against the working directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MountManifest {
    /// Files that must be present once every package is mounted.
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub package: Vec<PackageMount>,
}

/// A single `[[package]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageMount {
    pub path: String,
    /// Explicit mount name, usable as `name|file`.
    pub name: Option<String>,
    /// A failed optional mount marks content unavailable instead of failing.
    #[serde(default)]
    pub optional: bool,
}

/// Outcome of [`MountManifest::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountReport {
    pub content_available: bool,
    /// Optional packages that failed to mount and required files that are
    /// missing.
    pub unavailable: Vec<String>,
}

impl MountManifest {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let manifest = Self::from_toml_str(&content)?;
        log::info!(
            "Loaded mount manifest {} ({} packages)",
            path.display(),
            manifest.package.len()
        );
        Ok(manifest)
    }

    /// Mount every package in declaration order, then check required files.
    ///
    /// A failing non-optional package aborts with its error; packages mounted
    /// before it stay mounted.
    pub fn apply(&self, fs: &mut FileSystem) -> Result<MountReport> {
        let mut unavailable = Vec::new();

        for entry in &self.package {
            match fs.mount(&entry.path, entry.name.as_deref()) {
                Ok(()) => {}
                Err(err) if entry.optional => {
                    log::warn!("Optional package {} unavailable: {err}", entry.path);
                    unavailable.push(entry.path.clone());
                }
                Err(err) => {
                    log::error!("Failed to mount {}: {err}", entry.path);
                    return Err(err);
                }
            }
        }

        for file in &self.required {
            if !fs.exists(file) {
                log::warn!("Required file {file} is missing");
                unavailable.push(file.clone());
            }
        }

        Ok(MountReport {
            content_available: unavailable.is_empty(),
            unavailable,
        })
    }
}
