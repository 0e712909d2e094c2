use crate::error::{PackageError, Result};

/// Separator between a package and a name resolved inside it (`"a.iso|b.bin"`).
pub const PACKAGE_SEPARATOR: char = '|';

/// Canonical form of an entry name inside a package.
///
/// `/` and `\` both separate segments; empty and `.` segments vanish, so
/// `"\\maps//./a.bin"` becomes `"maps/a.bin"`. A `..` segment, or a name that
/// is left with no segments, is a [`PackageError::InvalidPath`].
pub fn normalize(path: &str) -> Result<String> {
    let mut normalized = String::with_capacity(path.len());

    for segment in path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
    {
        if segment == ".." {
            return Err(PackageError::InvalidPath(format!(
                "{path}: entries cannot refer to a parent directory"
            )));
        }
        if !normalized.is_empty() {
            normalized.push('/');
        }
        normalized.push_str(segment);
    }

    if normalized.is_empty() {
        return Err(PackageError::InvalidPath(format!("{path:?}: no entry name")));
    }
    Ok(normalized)
}

/// Split a package spec at its first separator.
///
/// Returns `(outer, rest)`; `rest` is `None` when the spec names a single
/// package.
pub fn split_package(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once(PACKAGE_SEPARATOR) {
        Some((outer, rest)) => (outer, Some(rest)),
        None => (spec, None),
    }
}

/// Strip `root` from `name` when `name` is already expressed under it.
///
/// Writable archives opened straight from disk carry their full physical
/// path as their name, so a name handed back to the owning folder may
/// already contain the folder's own prefix.
pub(crate) fn strip_root<'a>(name: &'a str, root: &str) -> &'a str {
    let root = root.trim_end_matches(['/', '\\']);
    if root.is_empty() {
        return name;
    }
    match name.strip_prefix(root) {
        Some(rest) if rest.is_empty() => rest,
        Some(rest) if rest.starts_with(['/', '\\']) => rest.trim_start_matches(['/', '\\']),
        _ => name,
    }
}
