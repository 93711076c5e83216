//! `df-verify`: check a distfile's SHA-256.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::config::DistfileConfig;
use super::fetch::FetchError;
use super::{hash_summary, BLOCK_SIZE};
use crate::console::{Console, Verbosity};

pub const TOOL: &str = "df-verify";

#[derive(Parser, Debug, Clone)]
#[command(name = "df-verify")]
#[command(about = "Verify distfile data integrity.")]
#[command(override_usage = "df-verify [OPTIONS] FILE")]
pub struct VerifyArgs {
    /// Do nothing and exit without error
    #[arg(long)]
    pub disable: bool,

    /// Load distfile configuration from FILE
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verify SHA256 HASH against data
    #[arg(long, value_name = "HASH")]
    pub sha256: Option<String>,

    /// Increase verbosity
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}

pub enum Prepared {
    Disabled,
    Usage,
    Run {
        file: PathBuf,
        sha256: Option<String>,
        verbosity: Verbosity,
    },
}

impl VerifyArgs {
    pub fn prepare(self) -> Result<Prepared> {
        let config = match &self.config {
            Some(path) => DistfileConfig::load(path)?,
            None => DistfileConfig::default(),
        };
        if self.disable || config.disable_verify {
            return Ok(Prepared::Disabled);
        }
        let Some(file) = self.file else {
            return Ok(Prepared::Usage);
        };
        Ok(Prepared::Run {
            file,
            sha256: self.sha256,
            verbosity: Verbosity::from_count(self.verbose.max(config.verbosity.unwrap_or(0))),
        })
    }
}

/// Scan `file` and compare its hash; a mismatch is an error.
pub fn verify(file: &Path, sha256: Option<&str>, console: &mut Console) -> Result<String> {
    let handle = File::open(file).with_context(|| format!("open failure: {}", file.display()))?;
    let mut reader = BufReader::with_capacity(BLOCK_SIZE, handle);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("read failure: {}", file.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    let actual = data_encoding::HEXLOWER.encode(&hasher.finalize());
    let (line, pass) = hash_summary("verified", total, Some(file), &actual, sha256);
    console.info(format!("{line}\n"));
    if !pass {
        return Err(FetchError::HashMismatch {
            expected: sha256.unwrap_or_default().to_string(),
            actual,
        }
        .into());
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_file_hash() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty.tar");
        fs::write(&path, b"").unwrap();
        let mut console = Console::captured(TOOL, Verbosity::Info);
        let hash = verify(&path, Some(EMPTY_SHA256), &mut console).unwrap();
        assert_eq!(hash, EMPTY_SHA256);
        assert_eq!(
            console.captured_text(),
            format!("verified 0 bytes; SHA256 ({}) = {EMPTY_SHA256} (pass)\n", path.display())
        );
    }

    #[test]
    fn mismatch_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("x");
        fs::write(&path, vec![7u8; BLOCK_SIZE + 3]).unwrap();
        let mut console = Console::captured(TOOL, Verbosity::Info);
        let err = verify(&path, Some("beef"), &mut console).unwrap_err();
        assert!(err.to_string().starts_with("expected SHA256 hash 'beef', got '"));
        assert!(console
            .captured_text()
            .starts_with(&format!("verified {} bytes;", BLOCK_SIZE + 3)));
    }

    #[test]
    fn config_can_disable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = tmp.path().join("distfile.cfg");
        DistfileConfig {
            disable_verify: true,
            ..DistfileConfig::default()
        }
        .save(&cfg)
        .unwrap();
        let args =
            VerifyArgs::try_parse_from(["df-verify", "--config", cfg.to_str().unwrap(), "f"]).unwrap();
        assert!(matches!(args.prepare().unwrap(), Prepared::Disabled));
    }
}
