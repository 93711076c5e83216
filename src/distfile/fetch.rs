//! `df-fetch`: download a distfile from the first URL that works.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::config::DistfileConfig;
use super::rules::{UrlRules, UrlSpec};
use super::{hash_summary, BLOCK_SIZE};
use crate::console::{Console, Verbosity};
use crate::fsutil::{tmp_name, TempPath};

pub const TOOL: &str = "df-fetch";
const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("expected {expected} bytes, got {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("expected SHA256 hash '{expected}', got '{actual}'")]
    HashMismatch { expected: String, actual: String },
    #[error("permission denied: '{0}'")]
    PermissionDenied(String),
    #[error("{0}")]
    Transport(String),
    #[error("no active URLs")]
    NoActiveUrls,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An opened download.
pub struct Source {
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read>,
}

pub trait Transport {
    fn open(&self, url: &str) -> Result<Source, FetchError>;
}

/// `http(s)://` through reqwest, `file://` from the local filesystem.
pub struct DefaultTransport {
    client: reqwest::blocking::Client,
}

impl DefaultTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .context("creating HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for DefaultTransport {
    fn open(&self, url: &str) -> Result<Source, FetchError> {
        if let Some(path) = url.strip_prefix("file://") {
            let file = File::open(path)
                .map_err(|e| FetchError::Transport(format!("{path}: {e}")))?;
            let len = file.metadata()?.len();
            return Ok(Source {
                content_length: Some(len),
                reader: Box::new(file),
            });
        }
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Source {
            content_length: response.content_length(),
            reader: Box::new(response),
        })
    }
}

/// Exclusive lock on `<output>.lock`, held for the duration of a fetch.
#[derive(Debug)]
pub struct OutputLock {
    _file: File,
    path: PathBuf,
}

impl OutputLock {
    pub fn acquire(output: &Path) -> Result<Self> {
        let mut name = output.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Never unlinked: every fetcher must lock the same inode.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to create lock file: {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "df-fetch")]
#[command(about = "Fetch and verify distfile data integrity.")]
#[command(override_usage = "df-fetch [OPTIONS] URL...")]
pub struct FetchArgs {
    /// Do nothing and exit without error
    #[arg(long)]
    pub disable: bool,

    /// Load distfile configuration from FILE
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verify SHA256 HASH against data
    #[arg(long, value_name = "HASH")]
    pub sha256: Option<String>,

    /// Accept URL regex pattern
    #[arg(long, value_name = "SPEC")]
    pub accept_url: Vec<String>,

    /// Deny URL regex pattern
    #[arg(long, value_name = "SPEC")]
    pub deny_url: Vec<String>,

    /// Write to FILE
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(value_name = "URL")]
    pub urls: Vec<String>,
}

/// What a fetch needs after command line and config file are merged.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub sha256: Option<String>,
    pub output: Option<PathBuf>,
    pub accept_url: Vec<String>,
    pub deny_url: Vec<String>,
    pub urls: Vec<String>,
}

/// Outcome of [`FetchArgs::prepare`].
pub enum Prepared {
    Disabled,
    Usage,
    Run(FetchRequest, Verbosity),
}

impl FetchArgs {
    /// Merge the config file (first) with command-line values.
    pub fn prepare(self) -> Result<Prepared> {
        let config = match &self.config {
            Some(path) => DistfileConfig::load(path)?,
            None => DistfileConfig::default(),
        };
        if self.disable || config.disable_fetch {
            return Ok(Prepared::Disabled);
        }
        if self.urls.is_empty() {
            return Ok(Prepared::Usage);
        }
        let verbosity = Verbosity::from_count(self.verbose.max(config.verbosity.unwrap_or(0)));
        let mut accept_url = config.accept_url;
        accept_url.extend(self.accept_url);
        let mut deny_url = config.deny_url;
        deny_url.extend(self.deny_url);
        Ok(Prepared::Run(
            FetchRequest {
                sha256: self.sha256.map(|h| h.to_ascii_lowercase()),
                output: self.output,
                accept_url,
                deny_url,
                urls: self.urls,
            },
            verbosity,
        ))
    }
}

/// Try each active URL in order until one download succeeds.
///
/// Failures of all but the last active URL are reported on `console` and
/// skipped; the last failure is returned.
pub fn fetch(request: &FetchRequest, transport: &dyn Transport, console: &mut Console) -> Result<()> {
    let rules = UrlRules::new(&request.accept_url, &request.deny_url)?;
    let mut active = VecDeque::new();
    for (index, arg) in request.urls.iter().enumerate() {
        let spec = UrlSpec::parse(arg);
        let verdict = rules.evaluate(&spec.url);
        console.verbose(format!("URL[{index}]: {}\n", spec.url));
        console.verbose(format!(
            "  active: {}\n",
            if verdict.active { "yes" } else { "no" }
        ));
        console.verbose(format!("  rule:   {}\n", verdict.rule));
        if verdict.active {
            active.push_back(spec.url);
        }
    }
    if active.is_empty() {
        return Err(FetchError::NoActiveUrls.into());
    }

    let _lock = match &request.output {
        Some(output) => {
            let lock = OutputLock::acquire(output)?;
            log::debug!("holding {}", lock.path().display());
            Some(lock)
        }
        None => None,
    };

    while let Some(url) = active.pop_front() {
        match download(&url, request, transport, console) {
            Ok(()) => return Ok(()),
            Err(err) if active.is_empty() => return Err(err.into()),
            Err(err) => {
                log::debug!("fetch of {url} failed: {err:?}");
                console.error(format!("download failure; {err}"));
            }
        }
    }
    Ok(())
}

fn download(
    url: &str,
    request: &FetchRequest,
    transport: &dyn Transport,
    console: &mut Console,
) -> Result<(), FetchError> {
    let mut sink = match &request.output {
        Some(output) => {
            console.info(format!("downloading {url} to {}\n", output.display()));
            let tmp = TempPath::new(tmp_name(output));
            let file = File::create(tmp.path())?;
            Some((tmp, file))
        }
        None => {
            console.info(format!("downloading {url}\n"));
            None
        }
    };

    let mut source = transport.open(url)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut total = 0u64;
    loop {
        let n = source
            .reader
            .read(&mut buf)
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        if n == 0 {
            break;
        }
        if let Some((_, file)) = sink.as_mut() {
            file.write_all(&buf[..n])?;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    if let Some(expected) = source.content_length.filter(|len| *len != total) {
        return Err(FetchError::SizeMismatch {
            expected,
            actual: total,
        });
    }

    let actual = data_encoding::HEXLOWER.encode(&hasher.finalize());
    let (line, pass) = hash_summary(
        "downloaded",
        total,
        request.output.as_deref(),
        &actual,
        request.sha256.as_deref(),
    );
    console.info(format!("{line}\n"));

    let (Some(output), Some((tmp, file))) = (&request.output, sink) else {
        return Ok(());
    };
    drop(file);
    if let (Some(expected), false) = (&request.sha256, pass) {
        return Err(FetchError::HashMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    if fs::metadata(output).is_ok_and(|m| m.permissions().readonly()) {
        return Err(FetchError::PermissionDenied(output.display().to_string()));
    }
    fs::rename(tmp.path(), output)?;
    tmp.keep();
    Ok(())
}
