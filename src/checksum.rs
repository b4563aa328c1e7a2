//! Download integrity checks.

use anyhow::{Context as _, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::{fmt, fs::File, io::Read, path::Path};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha256,
    Sha512,
    Sha1,
    Md5,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
            Algorithm::Sha1 => "sha1",
            Algorithm::Md5 => "md5",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: Algorithm,
    pub value: String,
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.value)
    }
}

impl Checksum {
    pub fn new(algorithm: Algorithm, value: impl Into<String>) -> Checksum {
        Checksum {
            algorithm,
            value: value.into().to_ascii_lowercase(),
        }
    }

    /// Picks the strongest checksum a source provides. Preference order is
    /// sha256, sha512, sha1, md5; returns `None` when no field is set.
    pub fn from_fields(
        sha256: Option<&str>,
        sha512: Option<&str>,
        sha1: Option<&str>,
        md5: Option<&str>,
    ) -> Option<Checksum> {
        if let Some(v) = sha256 {
            return Some(Checksum::new(Algorithm::Sha256, v));
        }
        if let Some(v) = sha512 {
            return Some(Checksum::new(Algorithm::Sha512, v));
        }
        if let Some(v) = sha1 {
            return Some(Checksum::new(Algorithm::Sha1, v));
        }
        md5.map(|v| Checksum::new(Algorithm::Md5, v))
    }

    /// Streams `path` through the digest and compares, case-insensitively.
    pub fn verify(&self, path: &Path) -> Result<()> {
        let actual = match self.algorithm {
            Algorithm::Sha256 => digest_file::<Sha256>(path)?,
            Algorithm::Sha512 => digest_file::<Sha512>(path)?,
            Algorithm::Sha1 => digest_file::<Sha1>(path)?,
            Algorithm::Md5 => digest_file::<Md5>(path)?,
        };
        if actual != self.value {
            return Err(Error::ChecksumMismatch {
                file: path.to_path_buf(),
            }
            .into());
        }
        Ok(())
    }
}

fn digest_file<D: Digest>(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    Ok(out)
}
