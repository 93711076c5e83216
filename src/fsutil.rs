//! Temp-name generation and write-then-rename helpers.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const TMP_SUFFIX_LEN: usize = 8;
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sibling temp name of the form `<path>.tmp.<8 chars [a-z0-9]>`.
///
/// Collisions are not guarded against; callers write into build trees
/// that they own.
pub fn tmp_name(path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed) as u128;
    let entropy = nanos ^ (seq << 40) ^ ((std::process::id() as u128) << 20);

    let mut name = path.as_os_str().to_owned();
    name.push(".tmp.");
    name.push(base36_suffix(entropy));
    PathBuf::from(name)
}

fn base36_suffix(mut value: u128) -> String {
    const ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut out = String::with_capacity(TMP_SUFFIX_LEN);
    for _ in 0..TMP_SUFFIX_LEN {
        out.push(ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    out
}

/// Write `contents` to a sibling temp file and rename it over `path`.
///
/// The temp file is removed if any step fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    let tmp = tmp_name(path);
    if let Err(err) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(err).with_context(|| format!("failed writing to {}", tmp.display()));
    }
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err).with_context(|| format!("failed writing to {}", path.display()));
    }
    Ok(())
}

/// Removes the wrapped path on drop unless [`TempPath::keep`] was called.
#[derive(Debug)]
pub struct TempPath {
    path: PathBuf,
    armed: bool,
}

impl TempPath {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard once the file has been moved into place.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}
