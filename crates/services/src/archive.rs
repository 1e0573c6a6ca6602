//! Zip and tarball extraction with all-or-nothing placement.
//!
//! Archives are unpacked into a hidden sibling of the destination
//! (`.<name>.tmp`) and renamed into place only after every entry was
//! written, so an interrupted or corrupt extraction never leaves a partial
//! install behind.

use flate2::read::GzDecoder;
use plugstrap_core::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Zip,
    TarGz,
    Tar,
}

impl Format {
    fn detect(archive: &Path) -> Result<Self> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".zip") {
            return Ok(Self::Zip);
        }
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Ok(Self::TarGz);
        }
        if name.ends_with(".tar") {
            return Ok(Self::Tar);
        }

        // No telling extension; sniff the header
        let mut header = [0u8; 262];
        let mut file =
            File::open(archive).map_err(|e| Error::io(e, Some(archive), "open archive"))?;
        let read = file
            .read(&mut header)
            .map_err(|e| Error::io(e, Some(archive), "read archive header"))?;
        let header = &header[..read];
        if header.starts_with(b"PK\x03\x04") {
            Ok(Self::Zip)
        } else if header.starts_with(&[0x1f, 0x8b]) {
            Ok(Self::TarGz)
        } else if header.len() >= 262 && &header[257..262] == b"ustar" {
            Ok(Self::Tar)
        } else {
            Err(Error::extraction(archive, "unsupported archive format"))
        }
    }
}

/// Extract `archive` into `dest`.
///
/// A single top-level directory in the archive is hoisted so its contents
/// land directly in `dest`.
pub(crate) fn extract(archive: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    let format = Format::detect(archive)?;
    if dest.exists() && !overwrite {
        return Err(Error::extraction(
            archive,
            format!("destination {} already exists", dest.display()),
        ));
    }

    let staging = staging_dir(dest);
    if staging.exists() {
        std::fs::remove_dir_all(&staging)
            .map_err(|e| Error::io(e, Some(&staging), "clear stale extraction"))?;
    }
    std::fs::create_dir_all(&staging)
        .map_err(|e| Error::io(e, Some(&staging), "create extraction directory"))?;

    let unpacked = match format {
        Format::Zip => unpack_zip(archive, &staging),
        Format::TarGz => File::open(archive)
            .map_err(|e| Error::extraction(archive, e.to_string()))
            .and_then(|f| unpack_tar(archive, GzDecoder::new(f), &staging)),
        Format::Tar => File::open(archive)
            .map_err(|e| Error::extraction(archive, e.to_string()))
            .and_then(|f| unpack_tar(archive, f, &staging)),
    };

    let placed = unpacked
        .and_then(|()| content_root(archive, &staging))
        .and_then(|root| place(&root, dest, overwrite));

    // The staging directory is either empty or holds a failed attempt
    if staging.exists() {
        let _ = std::fs::remove_dir_all(&staging);
    }
    placed?;

    debug!(archive = %archive.display(), dest = %dest.display(), ?format, "Extracted archive");
    Ok(())
}

fn staging_dir(dest: &Path) -> PathBuf {
    dest.with_file_name(format!(
        ".{}.tmp",
        dest.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("extract")
    ))
}

fn unpack_zip(archive: &Path, into: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::extraction(archive, e.to_string()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| Error::extraction(archive, e.to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| Error::extraction(archive, e.to_string()))?;

        // Entries escaping the extraction directory are dropped
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out = into.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out).map_err(|e| Error::extraction(archive, e.to_string()))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::extraction(archive, e.to_string()))?;
        }
        let mut target = File::create(&out).map_err(|e| Error::extraction(archive, e.to_string()))?;
        std::io::copy(&mut entry, &mut target)
            .map_err(|e| Error::extraction(archive, e.to_string()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode))
                .map_err(|e| Error::extraction(archive, e.to_string()))?;
        }
    }
    Ok(())
}

fn unpack_tar(archive: &Path, reader: impl Read, into: &Path) -> Result<()> {
    tar::Archive::new(reader)
        .unpack(into)
        .map_err(|e| Error::extraction(archive, e.to_string()))
}

/// The directory whose contents become `dest`.
fn content_root(archive: &Path, staging: &Path) -> Result<PathBuf> {
    let entries: Vec<_> = std::fs::read_dir(staging)
        .map_err(|e| Error::io(e, Some(staging), "read extraction directory"))?
        .collect::<std::io::Result<_>>()
        .map_err(|e| Error::io(e, Some(staging), "read extraction directory"))?;

    match entries.as_slice() {
        [] => Err(Error::extraction(archive, "archive is empty")),
        [only] if only.path().is_dir() => Ok(only.path()),
        _ => Ok(staging.to_path_buf()),
    }
}

fn place(root: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    if overwrite && dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| Error::io(e, Some(dest), "replace install"))?;
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io(e, Some(parent), "create install parent"))?;
    }
    std::fs::rename(root, dest).map_err(|e| Error::io(e, Some(dest), "move extraction into place"))
}
