//! Project metadata and version computation.

use anyhow::{bail, Context, Result};
use regex::Regex;
use time::macros::format_description;
use time::OffsetDateTime;

use super::repo::{BuildType, RepoInfo};

pub const NAME: &str = "HandBrake";
pub const ACRO_LOWER: &str = "hb";
pub const ACRO_UPPER: &str = "HB";
pub const URL_WEBSITE: &str = "https://handbrake.fr";
pub const URL_REPO: &str = "https://github.com/HandBrake/HandBrake.git";
pub const URL_REPO_SSH: &str = "git@github.com:HandBrake/HandBrake.git";
pub const URL_COMMUNITY: &str = "https://forum.handbrake.fr";
pub const URL_IRC: &str = "irc://irc.freenode.net/handbrake";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub name_lower: String,
    pub name_upper: String,
    pub vmajor: u32,
    pub vminor: u32,
    pub vpoint: u32,
    pub suffix: String,
    pub special: String,
    pub spoint: u32,
    pub version: String,
    pub debversion: String,
    pub build: String,
    pub title: String,
    pub url_appcast: String,
    pub url_appnote: String,
}

impl Project {
    /// Compute versions from the repo state.
    ///
    /// `arch` is appended to the appcast URL on darwin hosts; `now` is
    /// the build time (honouring `SOURCE_DATE_EPOCH`).
    pub fn compute(
        repo: &RepoInfo,
        snapshot: bool,
        darwin_arch: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Self> {
        let Some(date) = repo.date else {
            bail!(
                "{NAME} is missing version information it needs to build properly.\n\
                 Clone the official git repository at {URL_REPO}\n\
                 or download an official source archive from {URL_WEBSITE}"
            );
        };

        let mut project = Self {
            name: NAME.to_string(),
            name_lower: NAME.to_lowercase(),
            name_upper: NAME.to_uppercase(),
            vmajor: 0,
            vminor: 0,
            vpoint: 0,
            suffix: String::new(),
            special: String::new(),
            spoint: 0,
            version: String::new(),
            debversion: String::new(),
            build: String::new(),
            title: String::new(),
            url_appcast: String::new(),
            url_appnote: String::new(),
        };

        if !repo.tag.is_empty() {
            let tag_re = Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)-?(.+)?$")?;
            let Some(caps) = tag_re.captures(&repo.tag) else {
                bail!("Invalid repo tag format {}", repo.tag);
            };
            let number = |i: usize| -> Result<u32> {
                caps[i]
                    .parse()
                    .with_context(|| format!("Invalid repo tag format {}", repo.tag))
            };
            project.vmajor = number(1)?;
            project.vminor = number(2)?;
            project.vpoint = number(3)?;
            if let Some(suffix) = caps.get(4) {
                project.suffix = suffix.as_str().to_string();
            }
        }

        let today = now.format(format_description!("[year][month][day]"))?;
        let unstable;
        if repo.build_type != BuildType::Release || snapshot {
            let stamp = date.format(format_description!(
                "[year][month][day][hour][minute][second]"
            ))?;
            let mut version = format!("{stamp}-{}", repo.shorthash);
            if !repo.branch.is_empty() {
                version.push('-');
                version.push_str(&repo.branch);
            }
            project.debversion = version.clone();
            project.version = version;
            project.build = format!("{today}01");
            unstable = true;
        } else {
            let base = format!("{}.{}.{}", project.vmajor, project.vminor, project.vpoint);
            let special_re = Regex::new(r"^([a-zA-Z]+)\.([0-9]+)$")?;
            match special_re.captures(&project.suffix) {
                Some(caps) => {
                    project.special = caps[1].to_string();
                    project.spoint = caps[2].parse()?;
                    project.version = format!("{base}-{}.{}", project.special, project.spoint);
                    project.debversion = format!("{base}~{}.{}", project.special, project.spoint);
                    unstable = true;
                }
                None => {
                    project.version = base.clone();
                    project.debversion = base;
                    unstable = false;
                }
            }
            project.build = format!("{today}00");
        }
        project.title = format!("{} {} ({})", project.name, project.version, project.build);

        let ctype = if unstable { "_unstable" } else { "" };
        let ntype = if unstable { "unstable" } else { "stable" };
        let arch = darwin_arch.map(|a| format!(".{a}")).unwrap_or_default();
        project.url_appcast = format!("https://handbrake.fr/appcast{ctype}{arch}.xml");
        project.url_appnote = format!("https://handbrake.fr/appcast/{ntype}.html");
        Ok(project)
    }

    /// `%04x%02x%02x%08x` of major, minor, point and repo revision.
    pub fn version_hex(&self, rev: u64) -> String {
        format!(
            "{:04x}{:02x}{:02x}{:08x}",
            self.vmajor, self.vminor, self.vpoint, rev
        )
    }
}

/// Build time: `SOURCE_DATE_EPOCH` when set, otherwise now (UTC).
pub fn build_time() -> Result<OffsetDateTime> {
    match std::env::var("SOURCE_DATE_EPOCH") {
        Ok(value) => {
            let secs: i64 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid SOURCE_DATE_EPOCH '{value}'"))?;
            OffsetDateTime::from_unix_timestamp(secs)
                .with_context(|| format!("invalid SOURCE_DATE_EPOCH '{value}'"))
        }
        Err(_) => Ok(OffsetDateTime::now_utc()),
    }
}
