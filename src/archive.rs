//! Unpacking downloaded payloads.

use anyhow::{bail, Context as _, Result};
use flate2::read::GzDecoder;
use std::{fs, io, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    /// A single gzip-compressed file, not a tarball.
    Gz,
}

/// Detects the archive kind from the filename; `None` means the payload is
/// not an archive and should be used as-is.
pub fn detect(filename: &str) -> Option<ArchiveKind> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".zip") {
        return Some(ArchiveKind::Zip);
    }
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        return Some(ArchiveKind::TarGz);
    }
    if lower.ends_with(".gz") {
        return Some(ArchiveKind::Gz);
    }
    None
}

/// Unpacks `archive` into `dest_dir`.
pub fn unpack(archive: &Path, kind: ArchiveKind, dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;
    match kind {
        ArchiveKind::Zip => unpack_zip(archive, dest_dir),
        ArchiveKind::TarGz => unpack_tar_gz(archive, dest_dir),
        ArchiveKind::Gz => unpack_gz(archive, dest_dir),
    }
    .with_context(|| format!("failed to unpack {}", archive.display()))
}

fn unpack_zip(archive: &Path, dest_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(dest_dir)?;
    Ok(())
}

fn unpack_tar_gz(archive: &Path, dest_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.unpack(dest_dir)?;
    Ok(())
}

fn unpack_gz(archive: &Path, dest_dir: &Path) -> Result<()> {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty());
    let Some(stem) = stem else {
        bail!("cannot derive an output name for {}", archive.display());
    };
    let file = fs::File::open(archive)?;
    let mut decoder = GzDecoder::new(file);
    let mut out = fs::File::create(dest_dir.join(stem))?;
    io::copy(&mut decoder, &mut out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn kind_detection_by_extension() {
        assert_eq!(detect("node.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(detect("node.TGZ"), Some(ArchiveKind::TarGz));
        assert_eq!(detect("node.zip"), Some(ArchiveKind::Zip));
        assert_eq!(detect("tool.gz"), Some(ArchiveKind::Gz));
        assert_eq!(detect("tool.bin"), None);
    }

    #[test]
    fn tar_gz_round_trip() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("payload.tar.gz");

        let file = fs::File::create(&archive).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let body = b"hello";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "pkg/readme.txt", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let out = dir.path().join("out");
        unpack(&archive, ArchiveKind::TarGz, &out).unwrap();
        let text = fs::read_to_string(out.join("pkg/readme.txt")).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn plain_gz_inflates_to_the_stem() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.gz");
        let mut encoder =
            GzEncoder::new(fs::File::create(&archive).unwrap(), Compression::default());
        encoder.write_all(b"binary").unwrap();
        encoder.finish().unwrap();

        let out = dir.path().join("out");
        unpack(&archive, ArchiveKind::Gz, &out).unwrap();
        assert_eq!(fs::read(out.join("tool")).unwrap(), b"binary");
    }
}
