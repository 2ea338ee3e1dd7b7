//! Release bundles: gzip-compressed tar of an installation tree
//!
//! A bundle must carry a root `VERSION` file whose content equals the release
//! version; the client refuses to apply one that does not.

use crate::paths::{read_installed_version, VERSION_FILE};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path};

/// Pack `src` into a tar.gz written to `writer`, returning the writer.
pub fn pack_dir_to<W: Write>(src: &Path, writer: W) -> io::Result<W> {
    if !src.join(VERSION_FILE).is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no {} marker", src.display(), VERSION_FILE),
        ));
    }

    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", src)?;
    builder.into_inner()?.finish()
}

/// Pack `src` into the file `out`.
pub fn pack_dir(src: &Path, out: &Path) -> io::Result<()> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = pack_dir_to(src, File::create(out)?)?;
    file.sync_all()
}

/// Pack `src` into memory (used by publish tooling and tests).
pub fn pack_dir_to_vec(src: &Path) -> io::Result<Vec<u8>> {
    pack_dir_to(src, Vec::new())
}

/// Unpack a bundle into `dest`. Entries escaping `dest` are skipped by `tar`.
pub fn unpack_into(archive: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    archive.set_preserve_permissions(true);
    archive.unpack(dest)
}

/// Unpack and confirm the `VERSION` marker. Returns the marker content.
pub fn unpack_verified(archive: &Path, dest: &Path, expected_version: &str) -> io::Result<String> {
    unpack_into(archive, dest)?;
    let marker = read_installed_version(dest).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bundle has no {} marker", VERSION_FILE),
        )
    })?;
    if !crate::version::same_version(&marker, expected_version) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "bundle {} marker says {}, release says {}",
                VERSION_FILE, marker, expected_version
            ),
        ));
    }
    Ok(marker)
}

/// Read the root `VERSION` marker straight out of bundle bytes, without unpacking.
pub fn read_marker(bundle: &[u8]) -> io::Result<Option<String>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bundle));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_marker = {
            let path = entry.path()?;
            let mut parts = path.components().filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            });
            parts.next() == Some(OsStr::new(VERSION_FILE)) && parts.next().is_none()
        };
        if is_marker {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            let marker = content.trim().to_string();
            return Ok(Some(marker).filter(|m| !m.is_empty()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_marker_from_bytes() {
        let temp = TempDir::new().unwrap();
        make_tree(temp.path(), "2.3.4\n");
        let bytes = pack_dir_to_vec(temp.path()).unwrap();
        assert_eq!(read_marker(&bytes).unwrap().as_deref(), Some("2.3.4"));
        assert!(read_marker(b"nope").is_err());
    }

    fn make_tree(root: &Path, version: &str) {
        fs::create_dir_all(root.join("static/css")).unwrap();
        fs::write(root.join(VERSION_FILE), version).unwrap();
        fs::write(root.join("app.py"), "print('hi')").unwrap();
        fs::write(root.join("static/css/site.css"), "body {}").unwrap();
    }

    #[test]
    fn test_pack_then_unpack_preserves_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        make_tree(&src, "1.1.0");

        let archive = temp.path().join("out/release.tar.gz");
        pack_dir(&src, &archive).unwrap();

        let dest = temp.path().join("dest");
        let marker = unpack_verified(&archive, &dest, "1.1.0").unwrap();
        assert_eq!(marker, "1.1.0");
        assert_eq!(
            fs::read_to_string(dest.join("static/css/site.css")).unwrap(),
            "body {}"
        );
    }

    #[test]
    fn test_marker_mismatch_rejected() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        make_tree(&src, "1.0.0");
        let archive = temp.path().join("release.tar.gz");
        pack_dir(&src, &archive).unwrap();

        let err = unpack_verified(&archive, &temp.path().join("dest"), "1.1.0").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_pack_requires_marker() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("app.py"), "x").unwrap();
        assert!(pack_dir_to_vec(temp.path()).is_err());
    }

    #[test]
    fn test_garbage_archive_fails() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("junk.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();
        assert!(unpack_into(&archive, &temp.path().join("dest")).is_err());
    }
}
