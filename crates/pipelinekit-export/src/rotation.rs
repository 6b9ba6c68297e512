//! File rotation shared by the JSON and CSV file backends: close the current
//! file, cascade the numbered history, optionally gzip, start fresh.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// How a file backend rotates once its current file is full.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// How many rotated files to retain (`name.1.ext` .. `name.{max_files}.ext`).
    /// `0` means rotation just truncates: no history is kept.
    pub max_files: usize,
    /// Gzip rotated files as `name.N.ext.gz`.
    pub gzip: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_files: 5,
            gzip: false,
        }
    }
}

/// Builds the path for the `n`th rotated file (`n >= 1`), e.g.
/// `metrics.json` -> `metrics.1.json` -> (gzip) `metrics.1.json.gz`.
fn numbered_path(path: &Path, n: usize, gzip: bool) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("metrics");
    let ext = path.extension().and_then(|s| s.to_str());
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = match ext {
        Some(ext) => format!("{stem}.{n}.{ext}"),
        None => format!("{stem}.{n}"),
    };
    let mut out = dir.join(file_name);
    if gzip {
        let mut with_gz = out.into_os_string();
        with_gz.push(".gz");
        out = PathBuf::from(with_gz);
    }
    out
}

fn gzip_in_place(src: &Path, dst: &Path) -> io::Result<()> {
    use std::fs::File;
    use std::io::{BufReader, BufWriter};

    let mut reader = BufReader::new(File::open(src)?);
    let writer = BufWriter::new(File::create(dst)?);
    let mut encoder = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;
    std::fs::remove_file(src)?;
    Ok(())
}

/// Rotates `path`: the current file (already closed by the caller) becomes
/// `path.1[.gz]`, cascading any existing numbered files upward and dropping
/// whatever falls off the end of `policy.max_files`. A fresh, empty file is
/// left at `path` on return. No-op if `path` doesn't exist yet.
pub async fn rotate(path: &Path, policy: &RotationPolicy) -> io::Result<()> {
    if tokio::fs::metadata(path).await.is_err() {
        return Ok(());
    }
    if policy.max_files == 0 {
        tokio::fs::remove_file(path).await?;
        return Ok(());
    }

    let path = path.to_path_buf();
    let policy = *policy;
    tokio::task::spawn_blocking(move || rotate_blocking(&path, &policy))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

fn rotate_blocking(path: &Path, policy: &RotationPolicy) -> io::Result<()> {
    let oldest = numbered_path(path, policy.max_files, policy.gzip);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for n in (1..policy.max_files).rev() {
        let src = numbered_path(path, n, policy.gzip);
        if src.exists() {
            let dst = numbered_path(path, n + 1, policy.gzip);
            std::fs::rename(&src, &dst)?;
        }
    }
    let first = numbered_path(path, 1, false);
    std::fs::rename(path, &first)?;
    if policy.gzip {
        let gzipped = numbered_path(path, 1, true);
        gzip_in_place(&first, &gzipped)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn rotate_renames_current_file_to_numbered_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(&path, b"[]").unwrap();
        rotate(&path, &RotationPolicy { max_files: 3, gzip: false }).await.unwrap();
        assert!(dir.path().join("metrics.1.json").exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn rotate_cascades_existing_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(dir.path().join("metrics.1.json"), b"old-1").unwrap();
        fs::write(dir.path().join("metrics.2.json"), b"old-2").unwrap();
        fs::write(&path, b"current").unwrap();
        rotate(&path, &RotationPolicy { max_files: 3, gzip: false }).await.unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("metrics.1.json")).unwrap(), "current");
        assert_eq!(fs::read_to_string(dir.path().join("metrics.2.json")).unwrap(), "old-1");
        assert_eq!(fs::read_to_string(dir.path().join("metrics.3.json")).unwrap(), "old-2");
    }

    #[tokio::test]
    async fn rotate_drops_files_beyond_max_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(dir.path().join("metrics.1.json"), b"old-1").unwrap();
        fs::write(dir.path().join("metrics.2.json"), b"old-2").unwrap();
        fs::write(&path, b"current").unwrap();
        rotate(&path, &RotationPolicy { max_files: 2, gzip: false }).await.unwrap();
        assert!(!dir.path().join("metrics.3.json").exists());
        assert_eq!(fs::read_to_string(dir.path().join("metrics.2.json")).unwrap(), "old-1");
    }

    #[tokio::test]
    async fn rotate_can_gzip_the_rotated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        fs::write(&path, b"some,csv,data\n").unwrap();
        rotate(&path, &RotationPolicy { max_files: 2, gzip: true }).await.unwrap();
        let gz_path = dir.path().join("metrics.1.csv.gz");
        assert!(gz_path.exists());
        let bytes = fs::read(&gz_path).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
        let mut decoded = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut decoded).unwrap();
        assert_eq!(decoded, "some,csv,data\n");
    }

    #[tokio::test]
    async fn rotate_with_zero_max_files_just_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        fs::write(&path, b"[]").unwrap();
        rotate(&path, &RotationPolicy { max_files: 0, gzip: false }).await.unwrap();
        assert!(!path.exists());
    }
}
