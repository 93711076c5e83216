//! `--launch`: run make right after configuring and capture its log.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use time::OffsetDateTime;

use super::ctime;
use crate::console::Console;

pub const BUILD_LOG: &str = "log/build.txt";

fn rule() -> String {
    "-".repeat(79)
}

#[derive(Debug, Clone)]
pub struct Launch<'a> {
    pub gmake: &'a str,
    pub jobs: usize,
    pub args: Option<&'a str>,
    pub targets: &'a [String],
    pub quiet: bool,
    pub build_dir: &'a Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub code: i32,
    pub elapsed: Duration,
}

impl LaunchOutcome {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn result(&self) -> String {
        if self.success() {
            "SUCCESS".to_string()
        } else {
            format!("FAILURE (code {})", self.code)
        }
    }
}

impl Launch<'_> {
    pub fn command(&self) -> String {
        let mut cmd = format!("{} -j{}", self.gmake, self.jobs);
        if let Some(args) = self.args.filter(|a| !a.is_empty()) {
            cmd.push(' ');
            cmd.push_str(args);
        }
        if !self.targets.is_empty() {
            cmd.push(' ');
            cmd.push_str(&self.targets.join(" "));
        }
        cmd
    }

    /// Run the build, teeing its output into `log/build.txt`.
    pub fn run(&self, console: &mut Console) -> Result<LaunchOutcome> {
        let log_path: PathBuf = self.build_dir.join(BUILD_LOG);
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
        console.info(format!("write: {BUILD_LOG}\n"));
        let mut log = File::create(&log_path)
            .with_context(|| format!("open failure: {}", log_path.display()))?;

        let cmd = self.command();
        let begin = Instant::now();
        record(&mut log, console, &format!("time begin: {}\n", ctime(OffsetDateTime::now_utc())?))?;
        record(&mut log, console, &format!("launch: {cmd}\n"))?;
        if self.quiet {
            let abs = crate::configure::paths::absolute(self.build_dir)?;
            console.out(format!("building to {} ...\n", abs.display()));
        } else {
            console.out(format!("{}\n", rule()));
        }

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(format!("{cmd} 2>&1"))
            .current_dir(self.build_dir)
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("launch failure: {cmd}"))?;
        let stdout = child.stdout.take().context("launch failure: no stdout")?;
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            writeln!(log, "{line}")
                .with_context(|| format!("writing '{}'", log_path.display()))?;
            if !self.quiet {
                console.out(format!("  : {line}\n"));
            }
        }
        let status = child.wait().context("waiting for build")?;
        let outcome = LaunchOutcome {
            code: status.code().unwrap_or(-1),
            elapsed: begin.elapsed(),
        };

        if !self.quiet {
            console.out(format!("{}\n", rule()));
        }
        record(&mut log, console, &format!("time end: {}\n", ctime(OffsetDateTime::now_utc())?))?;
        record(
            &mut log,
            console,
            &format!(
                "duration: {} ({:.2}s)\n",
                format_duration(outcome.elapsed),
                outcome.elapsed.as_secs_f64()
            ),
        )?;
        record(&mut log, console, &format!("result: {}\n", outcome.result()))?;
        Ok(outcome)
    }
}

fn record(log: &mut File, console: &mut Console, line: &str) -> Result<()> {
    log.write_all(line.as_bytes()).context("writing build log")?;
    console.info(line);
    Ok(())
}

/// `1 hour, 2 minutes, 3 seconds`; hours are omitted when zero, minutes
/// only when hours are also zero.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    let mut segs = Vec::new();
    if hours > 0 {
        segs.push(plural(hours, "hour"));
    }
    if hours > 0 || minutes > 0 {
        segs.push(plural(minutes, "minute"));
    }
    segs.push(plural(seconds, "second"));
    segs.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Verbosity;

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(900)), "0 seconds");
        assert_eq!(format_duration(Duration::from_secs(61)), "1 minute, 1 second");
        assert_eq!(
            format_duration(Duration::from_secs(3600 + 5)),
            "1 hour, 0 minutes, 5 seconds"
        );
        assert_eq!(
            format_duration(Duration::from_secs(2 * 3600 + 120 + 2)),
            "2 hours, 2 minutes, 2 seconds"
        );
    }

    #[test]
    fn command_line_assembly() {
        let targets = vec!["build".to_string(), "install".to_string()];
        let launch = Launch {
            gmake: "/usr/bin/make",
            jobs: 8,
            args: Some("V=1"),
            targets: &targets,
            quiet: true,
            build_dir: Path::new("."),
        };
        assert_eq!(launch.command(), "/usr/bin/make -j8 V=1 build install");
    }

    #[test]
    fn captures_build_output_and_result() {
        let tmp = tempfile::TempDir::new().unwrap();
        let targets = vec!["two".to_string()];
        // `echo` stands in for make; it prints its arguments.
        let launch = Launch {
            gmake: "echo",
            jobs: 2,
            args: None,
            targets: &targets,
            quiet: false,
            build_dir: tmp.path(),
        };
        let mut console = Console::captured("configure", Verbosity::Info);
        let outcome = launch.run(&mut console).unwrap();
        assert!(outcome.success());

        let log = fs::read_to_string(tmp.path().join(BUILD_LOG)).unwrap();
        assert!(log.contains("launch: echo -j2 two\n"));
        assert!(log.contains("-j2 two\n"));
        assert!(log.ends_with("result: SUCCESS\n"));
        assert!(console.captured_text().contains("  : -j2 two\n"));
    }

    #[test]
    fn failing_build_reports_code() {
        let tmp = tempfile::TempDir::new().unwrap();
        let launch = Launch {
            gmake: "exit 3;",
            jobs: 1,
            args: None,
            targets: &[],
            quiet: true,
            build_dir: tmp.path(),
        };
        let mut console = Console::captured("configure", Verbosity::Info);
        let outcome = launch.run(&mut console).unwrap();
        assert_eq!(outcome.code, 3);
        assert_eq!(outcome.result(), "FAILURE (code 3)");
        assert!(console.captured_text().starts_with("write: log/build.txt\n"));
    }
}
