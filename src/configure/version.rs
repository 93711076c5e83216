//! Tool version probing against a minimum.

use anyhow::Result;
use regex::RegexBuilder;
use std::fmt;
use std::path::Path;

use super::action::{capture_argv, Action, ActionReport, ProbeError};
use crate::console::Console;

const DEFAULT_EXPRESSIONS: [&str; 2] = [
    r"(?P<name>[^.]+)\s+(?P<svers>(?P<i0>\d+)(\.(?P<i1>\d+))?(\.(?P<i2>\d+))?)",
    r"(?P<svers>(?P<i0>\d+)(\.(?P<i1>\d+))?(\.(?P<i2>\d+))?)",
];

/// Three-part version; missing components are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(pub [u32; 3]);

impl Version {
    pub const fn new(major: u32, minor: u32, point: u32) -> Self {
        Self([major, minor, point])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

/// Parse the first output line of `<tool> --version`.
///
/// Expressions are tried in order (custom first), each anchored at the
/// start and case-insensitive. Returns the matched version text and the
/// numeric triple.
pub fn parse_version_line(line: &str, custom: Option<&str>) -> Result<Option<(String, Version)>> {
    for expression in custom.into_iter().chain(DEFAULT_EXPRESSIONS) {
        let re = RegexBuilder::new(&format!("^(?:{expression})"))
            .case_insensitive(true)
            .build()?;
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let svers = caps
            .name("svers")
            .map_or_else(String::new, |m| m.as_str().to_string());
        let mut ivers = [0u32; 3];
        for (i, slot) in ivers.iter_mut().enumerate() {
            if let Some(m) = caps.name(&format!("i{i}")) {
                *slot = m.as_str().parse()?;
            }
        }
        return Ok(Some((svers, Version(ivers))));
    }
    Ok(None)
}

#[derive(Debug, Clone)]
pub struct VersionProbe {
    pub name: String,
    pub command: Vec<String>,
    pub minversion: Version,
    pub rexpr: Option<String>,
    pub abort: bool,
    pub svers: String,
    pub ivers: Version,
}

impl VersionProbe {
    pub fn new(name: impl Into<String>, command: Vec<String>, minversion: Version) -> Self {
        Self {
            name: name.into(),
            command,
            minversion,
            rexpr: None,
            abort: false,
            svers: "0.0.0".to_string(),
            ivers: Version::default(),
        }
    }

    pub fn inadequate(&self) -> bool {
        self.ivers < self.minversion
    }
}

impl Action for VersionProbe {
    fn category(&self) -> &str {
        "version probe"
    }

    fn pretext(&self) -> String {
        let program = self
            .command
            .first()
            .map(|c| {
                Path::new(c)
                    .file_name()
                    .map_or_else(|| c.clone(), |n| n.to_string_lossy().to_string())
            })
            .unwrap_or_default();
        format!("{program} {}", self.minversion)
    }

    fn command_line(&self) -> Option<String> {
        Some(self.command.join(" "))
    }

    fn execute(&mut self, console: &mut Console) -> Result<ActionReport> {
        self.svers = "0.0.0".to_string();
        self.ivers = Version::default();

        let mut report = ActionReport::default();
        match capture_argv(&self.command) {
            Ok(capture) => {
                report.session = capture.lines;
                let first = report.session.first().filter(|_| capture.code == 0);
                match first.map(|line| parse_version_line(line, self.rexpr.as_deref())) {
                    Some(Ok(Some((svers, ivers)))) => {
                        self.svers = svers;
                        self.ivers = ivers;
                        report.msg_end = self.svers.clone();
                    }
                    Some(Err(err)) => report.msg_end = err.to_string(),
                    _ => report.msg_end = self.svers.clone(),
                }
            }
            Err(err) => report.msg_end = format!("{err:#}"),
        }

        report.fail = self.inadequate();
        if report.fail && self.abort {
            console.info(format!("({}) {}\n", report.msg_fail, self.svers));
            return Err(ProbeError::VersionTooOld {
                name: self.name.clone(),
                minimum: self.minversion.to_string(),
                command: self.command.first().cloned().unwrap_or_default(),
                found: self.svers.clone(),
            }
            .into());
        }
        Ok(report)
    }
}
