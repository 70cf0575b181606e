//! Base image extraction.
//!
//! The base image is a single tar archive of a reference OS tree, optionally
//! gzip-compressed. Regular files, directories, links and sparse files are
//! unpacked by the `tar` crate; FIFOs and device nodes are recreated with
//! `mknod(2)` so that the tree round-trips.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

/// Summary of an extracted archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedLayer {
    /// Entries written to the target.
    pub entries: u64,
    /// Entries skipped because their path escaped the target.
    pub skipped: u64,
    /// Size of the archive in bytes.
    pub size_bytes: u64,
}

/// Extracts a tar archive to the target directory.
///
/// Supports both plain `.tar` and gzip-compressed `.tar.gz` / `.tgz` archives.
/// Ownership is restored only when running as root.
///
/// # Errors
///
/// Returns `BurrowError::Extraction` if the archive cannot be read or any
/// entry cannot be written. Entries already written are left in place.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<ExtractedLayer> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting base image"
    );

    let extraction_err = |e| BurrowError::Extraction {
        archive: archive_path.to_path_buf(),
        source: e,
    };

    let file = std::fs::File::open(archive_path).map_err(extraction_err)?;
    let size_bytes = file.metadata().map_err(extraction_err)?.len();

    let (entries, skipped) = if is_gzip_archive(archive_path) {
        unpack(flate2::read::GzDecoder::new(file), target)
    } else {
        unpack(file, target)
    }
    .map_err(extraction_err)?;

    tracing::info!(entries, skipped, size = size_bytes, "base image extracted");
    Ok(ExtractedLayer {
        entries,
        skipped,
        size_bytes,
    })
}

fn unpack<R: Read>(reader: R, target: &Path) -> std::io::Result<(u64, u64)> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_ownerships(running_as_root());
    archive.set_unpack_xattrs(true);
    archive.set_overwrite(true);

    let mut entries = 0;
    let mut skipped = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        let written = if kind.is_fifo() || kind.is_character_special() || kind.is_block_special()
        {
            make_special_node(&entry, target)?
        } else {
            entry.unpack_in(target)?
        };
        if written {
            entries += 1;
        } else {
            skipped += 1;
            tracing::warn!(path = %entry.path()?.display(), "skipped archive entry outside target");
        }
    }
    Ok((entries, skipped))
}

/// Recreates a FIFO or device node. Returns `false` if the entry's path
/// escapes `target`, either lexically or through a symlink unpacked earlier.
#[cfg(target_os = "linux")]
fn make_special_node<R: Read>(entry: &tar::Entry<'_, R>, target: &Path) -> std::io::Result<bool> {
    use nix::sys::stat::{Mode, SFlag, makedev, mknod};

    let entry_path = entry.path()?.into_owned();
    let Some(name) = entry_path.file_name() else {
        return Ok(false);
    };
    let parent = entry_path.parent().unwrap_or_else(|| Path::new(""));
    let Some(dir) = confined_dir(target, parent)? else {
        return Ok(false);
    };
    let dest = dir.join(name);

    let header = entry.header();
    let kind = header.entry_type();
    let node = if kind.is_fifo() {
        SFlag::S_IFIFO
    } else if kind.is_character_special() {
        SFlag::S_IFCHR
    } else {
        SFlag::S_IFBLK
    };
    let major = header.device_major()?.unwrap_or(0);
    let minor = header.device_minor()?.unwrap_or(0);
    let mode = Mode::from_bits_truncate(header.mode()? & 0o7777);

    // Removes a symlink itself, never its target.
    match std::fs::remove_file(&dest) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    mknod(
        &dest,
        node,
        mode,
        makedev(u64::from(major), u64::from(minor)),
    )?;
    Ok(true)
}

/// Stub for non-Linux platforms.
#[cfg(not(target_os = "linux"))]
fn make_special_node<R: Read>(entry: &tar::Entry<'_, R>, _target: &Path) -> std::io::Result<bool> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot create special file {}", entry.path()?.display()),
    ))
}

/// Creates `relative` below `root` one component at a time and returns the
/// resolved directory.
///
/// Symlinks met on the way are followed only when they resolve to a
/// directory inside `root`. Returns `Ok(None)` when the path leaves `root`.
pub(crate) fn confined_dir(root: &Path, relative: &Path) -> std::io::Result<Option<PathBuf>> {
    let root = std::fs::canonicalize(root)?;
    let mut dir = root.clone();
    for component in relative.components() {
        let part = match component {
            Component::Normal(part) => part,
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return Ok(None),
        };
        let next = dir.join(part);
        match std::fs::symlink_metadata(&next) {
            Ok(meta) if meta.file_type().is_symlink() => match std::fs::canonicalize(&next) {
                Ok(resolved) if resolved.starts_with(&root) && resolved.is_dir() => dir = resolved,
                _ => return Ok(None),
            },
            Ok(meta) if meta.is_dir() => dir = next,
            Ok(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotADirectory,
                    format!("{} is not a directory", next.display()),
                ));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match std::fs::create_dir(&next) {
                    Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => return Err(e),
                    _ => {}
                }
                dir = next;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(Some(dir))
}

#[cfg(target_os = "linux")]
fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(target_os = "linux"))]
const fn running_as_root() -> bool {
    false
}

/// Determines whether the archive is gzip-compressed based on extension.
fn is_gzip_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"))
}
