//! Source repository information from `scripts/repo-info.sh` or a
//! packaged `version.txt`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::{Duration, PrimitiveDateTime};

use super::action::{capture_shell, perform, Action, ActionReport};
use super::project::{URL_REPO, URL_REPO_SSH};
use crate::console::Console;

const UNKNOWN_HASH: &str = "deadbeaf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    Release,
    Developer,
}

impl BuildType {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildType::Release => "release",
            BuildType::Developer => "developer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub url: String,
    pub tag: String,
    pub tag_hash: String,
    pub branch: String,
    pub remote: String,
    pub rev: u64,
    pub hash: String,
    pub shorthash: String,
    /// Commit date in UTC.
    pub date: Option<PrimitiveDateTime>,
    pub official: bool,
    pub build_type: BuildType,
}

impl Default for RepoInfo {
    fn default() -> Self {
        Self {
            url: "git://nowhere.com/project/unknown".to_string(),
            tag: String::new(),
            tag_hash: UNKNOWN_HASH.to_string(),
            branch: "unknown".to_string(),
            remote: "unknown".to_string(),
            rev: 0,
            hash: UNKNOWN_HASH.to_string(),
            shorthash: "deadbea".to_string(),
            date: None,
            official: false,
            build_type: BuildType::Developer,
        }
    }
}

impl RepoInfo {
    /// Apply `KEY=VALUE` lines; unknown keys and malformed lines are
    /// skipped.
    pub fn parse_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for line in lines {
            let line = line.trim_end_matches(['\r', '\n']);
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            match name {
                "URL" if !value.is_empty() => self.url = value.to_string(),
                "TAG" => self.tag = value.to_string(),
                "TAG_HASH" => self.tag_hash = value.to_string(),
                "BRANCH" => self.branch = value.to_string(),
                "REMOTE" => self.remote = value.to_string(),
                "REV" => {
                    self.rev = value
                        .trim()
                        .parse()
                        .with_context(|| format!("invalid REV value '{value}'"))?
                }
                "DATE" => self.date = Some(parse_repo_date(value)?),
                "HASH" => {
                    self.hash = value.to_string();
                    self.shorthash = value.chars().take(7).collect();
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Rewrite the official SSH remote and derive the build type.
    pub fn classify(&mut self, snapshot: bool) {
        if self.url == URL_REPO_SSH {
            self.url = URL_REPO.to_string();
        }
        if self.url == URL_REPO {
            self.official = true;
            self.build_type = if !snapshot && self.hash == self.tag_hash {
                BuildType::Release
            } else {
                BuildType::Developer
            };
        }
    }

    pub fn has_hash(&self) -> bool {
        !self.hash.is_empty() && self.hash != UNKNOWN_HASH
    }
}

/// `YYYY-MM-DD HH:MM:SS ±HHMM`, returned in UTC.
pub fn parse_repo_date(value: &str) -> Result<PrimitiveDateTime> {
    let (stamp, offset) = match value.get(..19) {
        Some(stamp) => (stamp, value.get(20..).unwrap_or("")),
        None => bail!("invalid repo date '{value}'"),
    };
    let local = PrimitiveDateTime::parse(
        stamp,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .with_context(|| format!("invalid repo date '{value}'"))?;

    let offset = offset.trim();
    let valid = offset.len() == 4 || (offset.len() == 5 && offset.starts_with(['+', '-']));
    if !valid || !offset[offset.len() - 4..].bytes().all(|b| b.is_ascii_digit()) {
        bail!("invalid UTC offset in repo date '{value}'");
    }
    let (hh, mm) = offset.split_at(offset.len() - 2);
    let hours: i64 = hh.parse().with_context(|| format!("invalid UTC offset '{offset}'"))?;
    let minutes: i64 = mm.parse().with_context(|| format!("invalid UTC offset '{offset}'"))?;
    let total = if hh.starts_with('-') {
        hours * 60 - minutes
    } else {
        hours * 60 + minutes
    };
    Ok(local - Duration::minutes(total))
}

/// Runs `repo-info.sh` against the source tree.
#[derive(Debug, Clone)]
pub struct RepoProbe {
    command: String,
    snapshot: bool,
    pub info: RepoInfo,
}

impl RepoProbe {
    pub fn new(src_dir: &Path, snapshot: bool) -> Result<Self> {
        let script = src_dir.join("scripts").join("repo-info.sh");
        if !script.is_file() {
            bail!("Missing required script {}", script.display());
        }
        Ok(Self {
            command: format!("{} {}", script.display(), src_dir.display()),
            snapshot,
            info: RepoInfo::default(),
        })
    }
}

impl Action for RepoProbe {
    fn category(&self) -> &str {
        "probe"
    }

    fn pretext(&self) -> String {
        "repo info".to_string()
    }

    fn command_line(&self) -> Option<String> {
        Some(self.command.clone())
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        let capture = capture_shell(&self.command, None)?;
        let mut report = ActionReport::default();
        report.session = capture.lines;
        if capture.code != 0 {
            report.msg_end = format!("code {}", capture.code);
            return Ok(report);
        }
        self.info
            .parse_lines(report.session.iter().map(String::as_str))?;
        self.info.classify(self.snapshot);
        report.fail = false;
        report.msg_end = self.info.url.clone();
        Ok(report)
    }
}

/// Probe the repository, falling back to `<src>/version.txt`.
pub fn probe_repo(src_dir: &Path, snapshot: bool, console: &mut Console) -> Result<RepoInfo> {
    let mut probe = RepoProbe::new(src_dir, snapshot)?;
    let report = perform(&mut probe, console)?;
    if !report.fail {
        return Ok(probe.info);
    }

    console.info("probe: version.txt...");
    let mut info = RepoInfo::default();
    let version_file: PathBuf = src_dir.join("version.txt");
    let loaded = match fs::read_to_string(&version_file) {
        Ok(text) if !text.is_empty() => info.parse_lines(text.lines()).is_ok(),
        _ => false,
    };
    if loaded {
        info.classify(snapshot);
    }
    if loaded && info.has_hash() {
        console.info("(pass)\n");
    } else {
        log::debug!("no usable repo info in '{}'", version_file.display());
        console.info("(fail)\n");
    }
    Ok(info)
}
