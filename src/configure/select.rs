//! Named sets of selectable modes (`--debug`, `--optimize`, `--arch`,
//! `--xcode-config`).

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use super::action::{Action, ActionReport};
use crate::console::Console;
use crate::platform::Tuple;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("invalid {descr}{what}: {mode} (choose from: {choices})")]
    Invalid {
        descr: String,
        what: String,
        mode: String,
        choices: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectMode {
    pub descr: String,
    pub what: String,
    modes: BTreeMap<String, String>,
    default: String,
    mode: String,
}

impl SelectMode {
    /// The first entry is the default unless changed with
    /// [`SelectMode::with_default`].
    pub fn new(descr: &str, modes: &[(&str, &str)]) -> Self {
        let default = modes.first().map(|(k, _)| k.to_string()).unwrap_or_default();
        Self {
            descr: descr.to_string(),
            what: " mode".to_string(),
            modes: modes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            mode: default.clone(),
            default,
        }
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.set_default(default);
        self
    }

    pub fn with_what(mut self, what: &str) -> Self {
        self.what = what.to_string();
        self
    }

    pub fn set_default(&mut self, default: &str) {
        self.default = default.to_string();
        self.mode = default.to_string();
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.modes.insert(key.to_string(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.modes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn default_mode(&self) -> &str {
        &self.default
    }

    /// Value attached to the current mode.
    pub fn value(&self) -> &str {
        self.modes.get(&self.mode).map_or("", String::as_str)
    }

    pub fn select(&mut self, mode: &str) -> Result<(), SelectError> {
        if !self.modes.contains_key(mode) {
            return Err(SelectError::Invalid {
                descr: self.descr.clone(),
                what: self.what.clone(),
                mode: mode.to_string(),
                choices: self.describe(true),
            });
        }
        self.mode = mode.to_string();
        Ok(())
    }

    /// `min none [std]` style listing; a single mode is printed alone.
    pub fn describe(&self, nodefault: bool) -> String {
        let keys: Vec<&str> = self.modes.keys().map(String::as_str).collect();
        if keys.len() == 1 {
            self.mode.clone()
        } else if nodefault {
            keys.join(" ")
        } else {
            format!("{} [{}]", keys.join(" "), self.mode)
        }
    }
}

pub fn debug_modes() -> SelectMode {
    SelectMode::new(
        "debug",
        &[("none", "none"), ("min", "min"), ("std", "std"), ("max", "max")],
    )
}

pub fn optimize_modes() -> SelectMode {
    SelectMode::new("optimize", &[("none", "none"), ("speed", "speed"), ("size", "size")])
        .with_default("speed")
}

/// Xcode configurations shipped in `<src>/macosx/xcconfig`.
///
/// Only darwin builds list files; there `native` must exist and is the
/// default.
pub fn xcconfig_modes(build: &Tuple, src_dir: &Path) -> Result<SelectMode> {
    let mut modes = SelectMode::new("xcconfig", &[("none", "")]).with_what("");
    if !build.is_darwin() {
        return Ok(modes);
    }

    let dir = src_dir.join("macosx").join("xcconfig");
    for entry in WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("xcconfig") {
            continue;
        }
        if let (Some(stem), Some(name)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.file_name().and_then(|s| s.to_str()),
        ) {
            modes.insert(stem, name);
        }
    }
    if !modes.contains("native") {
        bail!("native xcconfig not found in '{}'", dir.display());
    }
    modes.set_default("native");
    Ok(modes)
}

/// Computes the architectures selectable for the host.
#[derive(Debug, Clone)]
pub struct ArchAction {
    pub mode: SelectMode,
    host: Tuple,
}

impl ArchAction {
    pub fn new(host: &Tuple) -> Self {
        Self {
            mode: SelectMode::new(
                "architecture",
                &[(host.machine.as_str(), host.spec.as_str())],
            ),
            host: host.clone(),
        }
    }
}

impl Action for ArchAction {
    fn category(&self) -> &str {
        "compute"
    }

    fn pretext(&self) -> String {
        "available architectures".to_string()
    }

    fn abort(&self) -> bool {
        true
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        let mut report = ActionReport::passed("");
        let release = &self.host.release;
        if self.host.is_darwin() {
            self.mode
                .insert("x86_64", format!("x86_64-apple-darwin{release}"));
        } else if self.host.is_freebsd() {
            self.mode
                .insert("i386", format!("i386-portsbuild-freebsd{release}"));
            self.mode
                .insert("amd64", format!("amd64-portsbuild-freebsd{release}"));
        } else if !self.host.matches(&["*-*-cygwin*", "*-*-mingw*", "*-*-linux*", "*-*-solaris*"]) {
            report.msg_pass = "WARNING".to_string();
        }
        report.msg_end = self.mode.describe(false);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure::action::perform;
    use crate::console::Verbosity;
    use std::fs;

    #[test]
    fn defaults_and_description() {
        let debug = debug_modes();
        assert_eq!(debug.mode(), "none");
        assert_eq!(debug.describe(false), "max min none std [none]");

        let optimize = optimize_modes();
        assert_eq!(optimize.mode(), "speed");
        assert_eq!(optimize.describe(true), "none size speed");
    }

    #[test]
    fn select_rejects_unknown_modes() {
        let mut optimize = optimize_modes();
        optimize.select("size").unwrap();
        assert_eq!(optimize.value(), "size");

        let err = optimize.select("fast").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid optimize mode: fast (choose from: none size speed)"
        );
    }

    #[test]
    fn single_mode_describes_itself() {
        let host = Tuple::parse("x86_64-pc-linux-gnu").unwrap();
        let arch = ArchAction::new(&host);
        assert_eq!(arch.mode.describe(false), "x86_64");
        assert_eq!(arch.mode.value(), "x86_64-pc-linux-gnu");
    }

    #[test]
    fn freebsd_gains_port_architectures() {
        let host = Tuple::parse("amd64-portbld-freebsd13.2").unwrap();
        let mut console = Console::captured("configure", Verbosity::Info);
        let mut arch = ArchAction::new(&host);
        perform(&mut arch, &mut console).unwrap();
        assert!(arch.mode.contains("i386"));
        assert_eq!(
            console.captured_text(),
            "compute: available architectures...(pass) amd64 i386 [amd64]\n"
        );
    }

    #[test]
    fn unknown_system_warns() {
        let host = Tuple::parse("sparc-sun-plan9").unwrap();
        let mut console = Console::captured("configure", Verbosity::Info);
        let mut arch = ArchAction::new(&host);
        let report = perform(&mut arch, &mut console).unwrap();
        assert_eq!(report.msg_pass, "WARNING");
    }

    #[test]
    fn xcconfig_scan_requires_native_on_darwin() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("macosx/xcconfig");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("osx1013.xcconfig"), "").unwrap();
        fs::write(dir.join("README"), "").unwrap();

        let darwin = Tuple::parse("x86_64-apple-darwin20.1.0").unwrap();
        assert!(xcconfig_modes(&darwin, tmp.path()).is_err());

        fs::write(dir.join("native.xcconfig"), "").unwrap();
        let modes = xcconfig_modes(&darwin, tmp.path()).unwrap();
        assert_eq!(modes.mode(), "native");
        assert_eq!(modes.value(), "native.xcconfig");
        assert_eq!(modes.describe(true), "native none osx1013");

        let linux = Tuple::parse("x86_64-pc-linux-gnu").unwrap();
        assert_eq!(xcconfig_modes(&linux, tmp.path()).unwrap().len(), 1);
    }
}
