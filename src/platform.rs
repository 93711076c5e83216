//! GNU platform tuples (`machine-vendor-systemrelease-extra`).
//!
//! Tuples are compared against shell globs such as `*-*-darwin*` or
//! `i?86-*`, the same patterns the make system uses.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

const GNU_TUPLE_RE: &str = r"^([^-]+)-?([^-]*)-([^0-9-]+)([^-]*)-?([^-]*)";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("invalid build tuple: {0}")]
    InvalidTuple(String),
}

fn tuple_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(GNU_TUPLE_RE).expect("static tuple regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub spec: String,
    pub machine: String,
    pub vendor: String,
    pub system: String,
    pub release: String,
    pub extra: String,
    /// Formal system name (`Linux`, `Darwin`, `MinGW`, ...).
    pub systemf: String,
    pub title: String,
}

impl Tuple {
    pub fn parse(spec: &str) -> Result<Self, PlatformError> {
        let caps = tuple_regex()
            .captures(spec)
            .ok_or_else(|| PlatformError::InvalidTuple(spec.to_string()))?;
        let group = |i: usize| caps.get(i).map_or("", |m| m.as_str()).to_string();
        Ok(Self {
            spec: spec.to_string(),
            machine: group(1),
            vendor: group(2),
            system: group(3),
            release: group(4),
            extra: group(5),
            systemf: String::new(),
            title: String::new(),
        })
    }

    /// Parse the build machine's tuple and derive its formal system name.
    pub fn build(spec: &str) -> Result<Self, PlatformError> {
        let mut tuple = Self::parse(spec)?;
        tuple.systemf = if tuple.matches(&["*-*-cygwin*"]) {
            capitalize_first(&tuple.system)
        } else {
            running_system_name()
        };
        tuple.title = format!("{} {}", tuple.systemf, tuple.machine);
        Ok(tuple)
    }

    /// Derive the host tuple from the build tuple, an optional cross spec
    /// and an optional architecture override.
    pub fn host(build: &Tuple, cross: Option<&str>, arch: Option<&str>) -> Result<Self, PlatformError> {
        let spec = match cross {
            Some(cross) => Path::new(cross)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| cross.to_string())
                .trim_end_matches('-')
                .to_string(),
            None => build.spec.clone(),
        };

        let mut host = Self::parse(&spec)?;
        host.systemf = build.systemf.clone();
        if let Some(arch) = arch {
            host.machine = arch.to_string();
        }
        if cross.is_some() {
            if host.matches(&["*mingw*"]) {
                host.systemf = "MinGW".to_string();
            } else if !host.systemf.is_empty() {
                host.systemf = capitalize(&host.systemf);
            }
        }
        host.title = format!("{} {}", host.systemf, host.machine);
        host.spec = format!(
            "{}-{}-{}{}-{}",
            host.machine, host.vendor, host.system, host.release, host.extra
        )
        .trim_end_matches('-')
        .to_string();
        Ok(host)
    }

    /// True if any glob pattern matches the whole spec.
    pub fn matches(&self, patterns: &[&str]) -> bool {
        patterns
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, &self.spec))
    }

    pub fn is_darwin(&self) -> bool {
        self.matches(&["*-*-darwin*"])
    }

    pub fn is_linux(&self) -> bool {
        self.matches(&["*-*-linux*"])
    }

    pub fn is_mingw(&self) -> bool {
        self.matches(&["*-*-mingw*"])
    }

    pub fn is_freebsd(&self) -> bool {
        self.matches(&["*-*-freebsd*"])
    }
}

/// `value` if the tuple matches any pattern, otherwise `none`.
pub fn if_host<T>(tuple: &Tuple, value: T, patterns: &[&str], none: T) -> T {
    if tuple.matches(patterns) {
        value
    } else {
        none
    }
}

/// First value whose pattern matches, falling back to `default`.
pub fn for_host<T: Clone>(tuple: &Tuple, default: T, choices: &[(T, &str)]) -> T {
    choices
        .iter()
        .find(|(_, pattern)| tuple.matches(&[pattern]))
        .map(|(value, _)| value.clone())
        .unwrap_or(default)
}

/// Run `<src>/make/config.guess`, or synthesise a tuple when the source
/// tree does not ship one.
pub fn guess_build_spec(src_dir: &Path) -> Result<String> {
    let script = src_dir.join("make").join("config.guess");
    if !script.is_file() {
        log::debug!(
            "'{}' not found; deriving build tuple from compile target",
            script.display()
        );
        return Ok(fallback_spec());
    }

    let output = Command::new("sh")
        .arg(&script)
        .output()
        .with_context(|| format!("running '{}'", script.display()))?;
    if !output.status.success() {
        anyhow::bail!(
            "'{}' failed with {}: {}",
            script.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or("").trim().to_string())
}

fn fallback_spec() -> String {
    let arch = std::env::consts::ARCH;
    match std::env::consts::OS {
        "linux" => format!("{arch}-pc-linux-gnu"),
        "macos" => format!("{arch}-apple-darwin"),
        "windows" => format!("{arch}-w64-mingw32"),
        "freebsd" => format!("{arch}-unknown-freebsd"),
        other => format!("{arch}-unknown-{other}"),
    }
}

fn running_system_name() -> String {
    match std::env::consts::OS {
        "linux" => "Linux".to_string(),
        "macos" => "Darwin".to_string(),
        "windows" => "Windows".to_string(),
        "freebsd" => "FreeBSD".to_string(),
        "netbsd" => "NetBSD".to_string(),
        "openbsd" => "OpenBSD".to_string(),
        other => capitalize_first(other),
    }
}

/// Upper-case the first character, leave the rest alone.
fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Upper-case the first character and lower-case the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_tuples() {
        let t = Tuple::parse("x86_64-apple-darwin16.6.0").unwrap();
        assert_eq!(
            (t.machine.as_str(), t.vendor.as_str(), t.system.as_str(), t.release.as_str()),
            ("x86_64", "apple", "darwin", "16.6.0")
        );

        let t = Tuple::parse("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(t.system, "linux");
        assert_eq!(t.release, "");
        assert_eq!(t.extra, "gnu");

        let t = Tuple::parse("i686-pc-cygwin").unwrap();
        assert_eq!(t.system, "cygwin");
        assert_eq!(t.extra, "");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            Tuple::parse("nonsense").unwrap_err(),
            PlatformError::InvalidTuple("nonsense".to_string())
        );
    }

    #[test]
    fn glob_matching() {
        let t = Tuple::parse("i686-pc-linux-gnu").unwrap();
        assert!(t.matches(&["i?86-*"]));
        assert!(t.matches(&["*-*-darwin*", "*-*-linux*"]));
        assert!(!t.matches(&["x86_64-*"]));
    }

    #[test]
    fn cygwin_build_capitalizes_system() {
        let t = Tuple::build("i686-pc-cygwin").unwrap();
        assert_eq!(t.systemf, "Cygwin");
    }

    #[test]
    fn cross_host_uses_spec_basename() {
        let build = Tuple::build("x86_64-pc-linux-gnu").unwrap();
        let host = Tuple::host(&build, Some("/opt/mingw/bin/x86_64-w64-mingw32-"), None).unwrap();
        assert_eq!(host.spec, "x86_64-w64-mingw32");
        assert_eq!(host.system, "mingw");
        assert_eq!(host.systemf, "MinGW");
        assert_eq!(host.title, "MinGW x86_64");
    }

    #[test]
    fn arch_override_rewrites_spec() {
        let mut build = Tuple::build("x86_64-apple-darwin20.1.0").unwrap();
        build.systemf = "Darwin".to_string();
        let host = Tuple::host(&build, None, Some("arm64")).unwrap();
        assert_eq!(host.spec, "arm64-apple-darwin20.1.0");
        assert_eq!(host.title, "Darwin arm64");
    }

    #[test]
    fn conditional_values() {
        let t = Tuple::parse("x86_64-pc-linux-gnu").unwrap();
        assert!(if_host(&t, true, &["*-*-linux*"], false));
        assert!(!if_host(&t, true, &["*-*-mingw*"], false));
        assert_eq!(
            for_host(&t, "gcc", &[("clang", "*-*-freebsd*"), ("cc", "*-*-linux*")]),
            "cc"
        );
    }
}
