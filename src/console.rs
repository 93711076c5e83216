//! User-facing output shared by the configure and distfile tools.
//!
//! The make system parses some of these lines, so their shape is fixed:
//! fatal errors are `ERROR: <msg>; <tool> stop.` and warnings are
//! `WARNING: <msg>; <tool> continuing.`. Diagnostics that nobody parses go
//! through the `log` facade instead.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Log file holding every line echoed at info level.
pub const INFO_LOG: &str = "log/config.info.txt";
/// Log file holding every line, including verbose-only output.
pub const VERBOSE_LOG: &str = "log/config.verbose.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet = 0,
    Info = 1,
    Verbose = 2,
}

impl Verbosity {
    /// Map a `--verbose` style counter onto a level.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Info,
            _ => Verbosity::Verbose,
        }
    }
}

#[derive(Debug)]
enum Sink {
    Stdout,
    Capture(Vec<String>),
}

#[derive(Debug)]
pub struct Console {
    tool: String,
    verbosity: Verbosity,
    info_log: Vec<String>,
    verbose_log: Vec<String>,
    recording: bool,
    sink: Sink,
}

impl Console {
    pub fn new(tool: impl Into<String>, verbosity: Verbosity) -> Self {
        Self {
            tool: tool.into(),
            verbosity,
            info_log: Vec::new(),
            verbose_log: Vec::new(),
            recording: false,
            sink: Sink::Stdout,
        }
    }

    /// A console that keeps echoed text in memory instead of printing it.
    pub fn captured(tool: impl Into<String>, verbosity: Verbosity) -> Self {
        Self {
            sink: Sink::Capture(Vec::new()),
            ..Self::new(tool, verbosity)
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity >= Verbosity::Verbose
    }

    /// Text echoed so far by a captured console.
    pub fn captured_text(&self) -> String {
        match &self.sink {
            Sink::Capture(lines) => lines.concat(),
            Sink::Stdout => String::new(),
        }
    }

    /// Record and (at info level or above) echo `text`.
    ///
    /// `text` carries its own line ending so that partial lines such as
    /// `probe: foo...` can be completed later.
    pub fn info(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        self.verbose_log.push(text.to_string());
        if self.verbosity >= Verbosity::Info {
            self.info_log.push(text.to_string());
            self.echo(text);
        }
    }

    /// Record `text` and echo it only when running verbose.
    pub fn verbose(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        self.verbose_log.push(text.to_string());
        if self.verbosity >= Verbosity::Verbose {
            self.echo(text);
        }
    }

    /// Print unconditionally, without recording.
    pub fn out(&mut self, text: impl AsRef<str>) {
        self.echo(text.as_ref());
    }

    /// Non-fatal error line on stderr.
    pub fn error(&mut self, msg: impl AsRef<str>) {
        let line = stop_line(&self.tool, msg.as_ref());
        self.verbose_log.push(format!("{line}\n"));
        match &mut self.sink {
            Sink::Stdout => eprintln!("{line}"),
            Sink::Capture(lines) => lines.push(format!("{line}\n")),
        }
    }

    pub fn warn(&mut self, msg: impl AsRef<str>) {
        let line = continue_line(&self.tool, msg.as_ref());
        self.verbose_log.push(format!("{line}\n"));
        match &mut self.sink {
            Sink::Stdout => eprintln!("{line}"),
            Sink::Capture(lines) => lines.push(format!("{line}\n")),
        }
    }

    pub fn start_recording(&mut self) {
        self.recording = true;
    }

    /// Write the info and verbose logs below `build_dir`.
    ///
    /// Runs at most once per recording session; afterwards the console is
    /// quiet so that late output does not leak past the final summary.
    pub fn record_log(&mut self, build_dir: &Path) -> Result<()> {
        if !self.recording {
            return Ok(());
        }
        self.recording = false;
        self.verbosity = Verbosity::Quiet;

        for (name, lines) in [(INFO_LOG, &self.info_log), (VERBOSE_LOG, &self.verbose_log)] {
            let path = build_dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory '{}'", parent.display()))?;
            }
            let mut file = fs::File::create(&path)
                .with_context(|| format!("creating log file '{}'", path.display()))?;
            for line in lines.iter() {
                file.write_all(line.as_bytes())
                    .with_context(|| format!("writing log file '{}'", path.display()))?;
            }
        }
        Ok(())
    }

    fn echo(&mut self, text: &str) {
        match &mut self.sink {
            Sink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            Sink::Capture(lines) => lines.push(text.to_string()),
        }
    }
}

fn ends_with_punctuation(msg: &str) -> bool {
    msg.ends_with(['!', '?', ':', ';', '.'])
}

/// Fatal error line: `ERROR: <msg>; <tool> stop.`
pub fn stop_line(tool: &str, msg: &str) -> String {
    if ends_with_punctuation(msg) {
        format!("ERROR: {msg} {tool} stop.")
    } else {
        format!("ERROR: {msg}; {tool} stop.")
    }
}

/// Warning line: `WARNING: <msg>; <tool> continuing.`
pub fn continue_line(tool: &str, msg: &str) -> String {
    if ends_with_punctuation(msg) {
        format!("WARNING: {msg} {tool} continuing.")
    } else {
        format!("WARNING: {msg}; {tool} continuing.")
    }
}

/// Initialise `env_logger` for a binary; `RUST_LOG` selects the filter.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .try_init();
}
