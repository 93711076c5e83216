//! Probe/action framework.
//!
//! Every step configure takes is an [`Action`]: it prints
//! `<category>: <pretext>...`, does its work, and finishes the line with
//! `(pass) <end>` or `(fail) <end>`. Captured command output (the session)
//! is dumped to the verbose log, or to the info log when an aborting
//! action fails.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::console::Console;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("unable to continue")]
    Abort { category: String, pretext: String },
    #[error("minimum required {name} version is {minimum} and {command} is {found}")]
    VersionTooOld {
        name: String,
        minimum: String,
        command: String,
        found: String,
    },
}

/// Result of running an action once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub fail: bool,
    pub session: Vec<String>,
    pub msg_pass: String,
    pub msg_fail: String,
    pub msg_end: String,
}

impl Default for ActionReport {
    fn default() -> Self {
        Self {
            fail: true,
            session: Vec::new(),
            msg_pass: "pass".to_string(),
            msg_fail: "fail".to_string(),
            msg_end: "end".to_string(),
        }
    }
}

impl ActionReport {
    pub fn passed(msg_end: impl Into<String>) -> Self {
        Self {
            fail: false,
            msg_end: msg_end.into(),
            ..Self::default()
        }
    }

    pub fn failed(msg_end: impl Into<String>) -> Self {
        Self {
            msg_end: msg_end.into(),
            ..Self::default()
        }
    }

    fn from_capture(capture: Capture) -> Self {
        let fail = capture.code != 0;
        Self {
            fail,
            msg_end: if fail {
                format!("code {}", capture.code)
            } else {
                "end".to_string()
            },
            session: capture.lines,
            ..Self::default()
        }
    }
}

pub trait Action {
    /// `probe`, `find`, `compute` or `version probe`.
    fn category(&self) -> &str;

    fn pretext(&self) -> String;

    /// Stop configure when this action fails.
    fn abort(&self) -> bool {
        false
    }

    /// Command line echoed ahead of the session dump.
    fn command_line(&self) -> Option<String> {
        None
    }

    fn execute(&mut self, console: &mut Console) -> Result<ActionReport>;
}

/// Run `action`, report it on `console`, and fail with
/// [`ProbeError::Abort`] when an aborting action fails.
pub fn perform(action: &mut dyn Action, console: &mut Console) -> Result<ActionReport> {
    console.info(format!("{}: {}...", action.category(), action.pretext()));
    let report = action.execute(console)?;

    if report.fail {
        console.info(format!("({}) {}\n", report.msg_fail, report.msg_end));
        if action.abort() {
            dump_session(action, &report, console, true);
            return Err(ProbeError::Abort {
                category: action.category().to_string(),
                pretext: action.pretext(),
            }
            .into());
        }
    } else {
        console.info(format!("({}) {}\n", report.msg_pass, report.msg_end));
    }
    dump_session(action, &report, console, false);
    Ok(report)
}

fn dump_session(action: &dyn Action, report: &ActionReport, console: &mut Console, info: bool) {
    let mut lines = Vec::new();
    if let Some(command) = action.command_line() {
        lines.push(format!("  + {command}\n"));
    }
    if report.session.is_empty() {
        lines.push("  : <NO-OUTPUT>\n".to_string());
    } else {
        lines.extend(report.session.iter().map(|line| format!("  : {line}\n")));
    }
    for line in lines {
        if info {
            console.info(line);
        } else {
            console.verbose(line);
        }
    }
}

/// Exit code and output lines of a finished command.
#[derive(Debug, Clone)]
pub struct Capture {
    pub code: i32,
    pub lines: Vec<String>,
}

/// Run `command` through the shell with stderr folded into stdout.
pub fn capture_shell(command: &str, cwd: Option<&Path>) -> Result<Capture> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(format!("{command} 2>&1"));
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    log::debug!("shell: {command}");
    let output = cmd
        .output()
        .with_context(|| format!("running shell command '{command}'"))?;
    Ok(Capture {
        code: output.status.code().unwrap_or(-1),
        lines: split_lines(&output.stdout),
    })
}

/// Run `argv` without shell word splitting; stderr is folded into stdout
/// so the lines keep the order the program wrote them in.
pub fn capture_argv(argv: &[String]) -> Result<Capture> {
    if argv.is_empty() {
        bail!("empty command line");
    }
    log::debug!("exec: {}", argv.join(" "));
    let output = Command::new("sh")
        .arg("-c")
        .arg("exec \"$@\" 2>&1")
        .arg("sh")
        .args(argv)
        .output()
        .with_context(|| format!("running '{}'", argv.join(" ")))?;
    Ok(Capture {
        code: output.status.code().unwrap_or(-1),
        lines: split_lines(&output.stdout),
    })
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Arbitrary shell command; passes when it exits 0.
#[derive(Debug, Clone)]
pub struct ShellProbe {
    pub pretext: String,
    pub command: String,
    pub abort: bool,
    /// Keep only the first session line.
    pub head: bool,
}

impl ShellProbe {
    pub fn new(pretext: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            pretext: pretext.into(),
            command: command.into(),
            abort: false,
            head: false,
        }
    }
}

impl Action for ShellProbe {
    fn category(&self) -> &str {
        "probe"
    }

    fn pretext(&self) -> String {
        self.pretext.clone()
    }

    fn abort(&self) -> bool {
        self.abort
    }

    fn command_line(&self) -> Option<String> {
        Some(self.command.clone())
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        let mut report = ActionReport::from_capture(capture_shell(&self.command, None)?);
        if self.head {
            report.session.truncate(1);
        }
        Ok(report)
    }
}

/// Compile-only test of a C source snippet.
#[derive(Debug, Clone)]
pub struct CcProbe {
    pub pretext: String,
    pub command: String,
    pub test_source: String,
}

impl Action for CcProbe {
    fn category(&self) -> &str {
        "probe"
    }

    fn pretext(&self) -> String {
        self.pretext.clone()
    }

    fn command_line(&self) -> Option<String> {
        Some(self.command.clone())
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        let scratch = conftest_dir(&self.test_source)?;
        let capture = capture_shell(
            &format!("{} -c -o conftest.o conftest.c", self.command),
            Some(scratch.path()),
        )?;
        Ok(ActionReport::from_capture(capture))
    }
}

/// Compile and link test of a C source snippet against `lib`.
#[derive(Debug, Clone)]
pub struct LdProbe {
    pub pretext: String,
    pub command: String,
    pub lib: String,
    pub test_source: String,
}

impl LdProbe {
    pub fn new(
        pretext: impl Into<String>,
        command: impl Into<String>,
        lib: impl Into<String>,
        test_source: impl Into<String>,
    ) -> Self {
        Self {
            pretext: pretext.into(),
            command: command.into(),
            lib: lib.into(),
            test_source: test_source.into(),
        }
    }
}

impl Action for LdProbe {
    fn category(&self) -> &str {
        "probe"
    }

    fn pretext(&self) -> String {
        self.pretext.clone()
    }

    fn command_line(&self) -> Option<String> {
        Some(self.command.clone())
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        link_test(&self.command, &self.lib, &self.test_source)
    }
}

fn link_test(command: &str, lib: &str, test_source: &str) -> Result<ActionReport> {
    let scratch = conftest_dir(test_source)?;
    let line = format!("{command} -o conftest conftest.c {lib}");
    let capture = capture_shell(line.trim_end(), Some(scratch.path()))?;
    Ok(ActionReport::from_capture(capture))
}

fn conftest_dir(test_source: &str) -> Result<tempfile::TempDir> {
    let scratch = tempfile::Builder::new()
        .prefix("hb-conftest")
        .tempdir()
        .context("creating compile test directory")?;
    fs::write(scratch.path().join("conftest.c"), test_source)
        .context("writing conftest.c")?;
    Ok(scratch)
}

/// Queries pkg-config; `pkgconfig` is `None` when the tool was not found.
#[derive(Debug, Clone)]
pub struct PkgConfigProbe {
    pub pretext: String,
    pub pkgconfig: Option<String>,
    pub args: String,
    pub lib: String,
}

impl Action for PkgConfigProbe {
    fn category(&self) -> &str {
        "probe"
    }

    fn pretext(&self) -> String {
        self.pretext.clone()
    }

    fn command_line(&self) -> Option<String> {
        self.pkgconfig
            .as_ref()
            .map(|pc| format!("{pc} {}", self.args))
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        pkg_config_test(self.pkgconfig.as_deref(), &self.args, &self.lib)
    }
}

fn pkg_config_test(pkgconfig: Option<&str>, args: &str, lib: &str) -> Result<ActionReport> {
    let Some(pkgconfig) = pkgconfig else {
        return Ok(ActionReport::failed("No pkg-config"));
    };
    let capture = capture_shell(&format!("{pkgconfig} {args} {lib}"), None)?;
    Ok(ActionReport::from_capture(capture))
}

/// Library presence check: pkg-config first, then a link test.
#[derive(Debug, Clone)]
pub struct ChkLib {
    pub pretext: String,
    pub command: String,
    pub lib: String,
    pub test_source: String,
    pub pkgconfig: Option<String>,
    pub abort: bool,
}

impl Action for ChkLib {
    fn category(&self) -> &str {
        "probe"
    }

    fn pretext(&self) -> String {
        self.pretext.clone()
    }

    fn abort(&self) -> bool {
        self.abort
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        let mut session = Vec::new();
        if self.pkgconfig.is_some() {
            let report = pkg_config_test(self.pkgconfig.as_deref(), "--libs", &self.lib)?;
            if !report.fail {
                return Ok(report);
            }
            session.extend(report.session);
        }

        let mut report = link_test(&self.command, &format!("-l{}", self.lib), &self.test_source)?;
        session.append(&mut report.session);
        report.session = session;
        Ok(report)
    }
}

/// Number of online CPU cores, clamped to `1..=64`.
#[derive(Debug, Clone)]
pub struct CoreProbe {
    pub count: usize,
    pub jobs: usize,
    launch_jobs: Option<usize>,
}

impl CoreProbe {
    /// `launch_jobs` is the `--launch-jobs` value when `--launch` was
    /// given; `0` means "one job per core".
    pub fn new(launch_jobs: Option<usize>) -> Self {
        Self {
            count: 1,
            jobs: 1,
            launch_jobs,
        }
    }
}

impl Action for CoreProbe {
    fn category(&self) -> &str {
        "probe"
    }

    fn pretext(&self) -> String {
        "number of CPU cores".to_string()
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        let detected = online_cpus().or_else(|| {
            std::env::var("NUMBER_OF_PROCESSORS")
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
        });
        self.count = detected.unwrap_or(1).clamp(1, 64);
        self.jobs = match self.launch_jobs {
            Some(0) | None => self.count,
            Some(n) => n,
        };
        let mut report = ActionReport::passed(self.count.to_string());
        report.fail = detected.is_none();
        Ok(report)
    }
}

#[cfg(unix)]
fn online_cpus() -> Option<usize> {
    // SAFETY: sysconf has no preconditions; it returns -1 on error.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    (n > 0).then_some(n as usize)
}

#[cfg(not(unix))]
fn online_cpus() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Verbosity;

    #[test]
    fn shell_probe_reports_exit_code() {
        let mut console = Console::captured("configure", Verbosity::Info);
        let mut probe = ShellProbe::new("failing thing", "echo nope; exit 3");
        let report = perform(&mut probe, &mut console).unwrap();
        assert!(report.fail);
        assert_eq!(report.msg_end, "code 3");
        assert_eq!(report.session, vec!["nope".to_string()]);
        assert_eq!(console.captured_text(), "probe: failing thing...(fail) code 3\n");
    }

    #[test]
    fn shell_probe_head_keeps_first_line() {
        let mut console = Console::captured("configure", Verbosity::Quiet);
        let mut probe = ShellProbe::new("two lines", "echo one; echo two");
        probe.head = true;
        let report = perform(&mut probe, &mut console).unwrap();
        assert!(!report.fail);
        assert_eq!(report.session, vec!["one".to_string()]);
    }

    #[test]
    fn aborting_probe_dumps_session_and_errors() {
        let mut console = Console::captured("configure", Verbosity::Info);
        let mut probe = ShellProbe::new("must work", "echo broken >&2; false");
        probe.abort = true;
        let err = perform(&mut probe, &mut console).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::Abort { .. })
        ));
        let text = console.captured_text();
        assert!(text.contains("  + echo broken >&2; false\n"));
        assert!(text.contains("  : broken\n"));
    }

    #[test]
    fn argv_capture_interleaves_streams() {
        let argv: Vec<String> = ["sh", "-c", "echo one; echo two >&2; echo three"]
            .iter()
            .map(|a| a.to_string())
            .collect();
        let capture = capture_argv(&argv).unwrap();
        assert_eq!(capture.code, 0);
        assert_eq!(capture.lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn argv_capture_keeps_arguments_intact() {
        let argv: Vec<String> = ["printf", "%s|", "a b", "$HOME"]
            .iter()
            .map(|a| a.to_string())
            .collect();
        let capture = capture_argv(&argv).unwrap();
        assert_eq!(capture.lines, vec!["a b|$HOME|"]);
        assert!(capture_argv(&[]).is_err());
    }

    #[test]
    fn verbose_dump_marks_empty_session() {
        let mut console = Console::captured("configure", Verbosity::Verbose);
        let mut probe = ShellProbe::new("silent", "true");
        perform(&mut probe, &mut console).unwrap();
        assert!(console.captured_text().ends_with("  : <NO-OUTPUT>\n"));
    }

    #[test]
    fn pkg_config_missing_fails_cleanly() {
        let mut console = Console::captured("configure", Verbosity::Quiet);
        let mut probe = PkgConfigProbe {
            pretext: "x264".to_string(),
            pkgconfig: None,
            args: "--exists".to_string(),
            lib: "x264".to_string(),
        };
        let report = perform(&mut probe, &mut console).unwrap();
        assert!(report.fail);
        assert_eq!(report.msg_end, "No pkg-config");
    }

    #[test]
    fn core_probe_clamps_and_honours_launch_jobs() {
        let mut console = Console::captured("configure", Verbosity::Quiet);
        let mut probe = CoreProbe::new(Some(3));
        perform(&mut probe, &mut console).unwrap();
        assert!((1..=64).contains(&probe.count));
        assert_eq!(probe.jobs, 3);

        let mut probe = CoreProbe::new(Some(0));
        perform(&mut probe, &mut console).unwrap();
        assert_eq!(probe.jobs, probe.count);
    }
}
