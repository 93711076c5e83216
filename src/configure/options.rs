//! Command line of the `configure` tool.

use clap::{ArgAction, Args, Parser};

use crate::platform::{if_host, Tuple};

#[derive(Parser, Debug, Clone)]
#[command(name = "configure")]
#[command(about = "Configure HandBrake build system")]
#[command(override_usage = "configure [OPTIONS...] [TARGETS...] [NAME=VALUE...]")]
pub struct ConfigureArgs {
    /// Overwrite existing build config
    #[arg(long, help_heading = "General Options")]
    pub force: bool,

    /// Increase verbosity
    #[arg(long, help_heading = "General Options")]
    pub verbose: bool,

    #[command(flatten)]
    pub distfile: DistfileArgs,

    #[command(flatten)]
    pub tools: ToolOverrides,

    /// Specify Xcode SDK sysroot (macOS only)
    #[arg(long, value_name = "DIR", help_heading = "Directory Locations")]
    pub sysroot: Option<String>,

    /// Specify top-level source dir
    #[arg(long, value_name = "DIR", default_value = ".", help_heading = "Directory Locations")]
    pub src: String,

    /// Specify build scratch/output dir
    #[arg(long, value_name = "DIR", default_value = ".", help_heading = "Directory Locations")]
    pub build: String,

    /// Specify install dir for products
    #[arg(
        long,
        value_name = "DIR",
        default_value = "/usr/local",
        help_heading = "Directory Locations"
    )]
    pub prefix: String,

    /// Force a snapshot build
    #[arg(long, help_heading = "Build Options")]
    pub snapshot: bool,

    /// Build extra contribs for flatpak packaging
    #[arg(long, help_heading = "Build Options")]
    pub flatpak: bool,

    /// Select debug mode: none min std max
    #[arg(long, value_name = "MODE", num_args = 0..=1, help_heading = "Compiler Options")]
    pub debug: Option<Option<String>>,

    /// Select optimize mode: none speed size
    #[arg(long, value_name = "MODE", num_args = 0..=1, help_heading = "Compiler Options")]
    pub optimize: Option<Option<String>>,

    /// Select architecture mode
    #[arg(long, value_name = "MODE", num_args = 0..=1, help_heading = "Compiler Options")]
    pub arch: Option<Option<String>>,

    /// Specify GCC cross-compilation spec
    #[arg(long, value_name = "SPEC", help_heading = "Compiler Options")]
    pub cross: Option<String>,

    /// Harden app to protect against buffer overflows
    #[arg(long = "harden", help_heading = "Security Options")]
    pub enable_harden: bool,

    /// Sandbox app to limit host system access (macOS only)
    #[arg(long = "sandbox", help_heading = "Security Options")]
    pub enable_sandbox: bool,

    #[command(flatten)]
    pub xcode: XcodeArgs,

    #[command(flatten)]
    pub features: FeatureArgs,

    #[command(flatten)]
    pub launch: LaunchArgs,

    /// Make targets and NAME=VALUE overrides
    #[arg(value_name = "TARGETS")]
    pub trailing: Vec<String>,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Distfile Options")]
pub struct DistfileArgs {
    /// Disable distfile downloads
    #[arg(long)]
    pub disable_df_fetch: bool,

    /// Disable distfile data verification
    #[arg(long)]
    pub disable_df_verify: bool,

    /// Allow N distfile downloads at once
    #[arg(long, value_name = "N")]
    pub df_jobs: Option<u32>,

    /// Increase distfile tools verbosity
    #[arg(long = "df-verbose", action = ArgAction::Count)]
    pub df_verbosity: u8,

    /// Accept URLs matching regex pattern
    #[arg(long, value_name = "SPEC")]
    pub df_accept_url: Vec<String>,

    /// Deny URLs matching regex pattern
    #[arg(long, value_name = "SPEC")]
    pub df_deny_url: Vec<String>,
}

/// `--<tool> PROG` overrides; each replaces the search list for one tool.
#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Tool Basenames and Locations")]
pub struct ToolOverrides {
    #[arg(long, value_name = "PROG")]
    pub ar: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub cp: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub m4: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub mkdir: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub patch: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub rm: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub ranlib: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub strip: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub tar: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub python: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub cc: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub make: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub autoconf: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub automake: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub libtool: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub lipo: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub pkgconfig: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub meson: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub asm: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub ninja: Option<String>,
    #[arg(long, value_name = "PROG")]
    pub xcodebuild: Option<String>,
}

impl ToolOverrides {
    /// `(option, program)` for every override given.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("ar", &self.ar),
            ("cp", &self.cp),
            ("m4", &self.m4),
            ("mkdir", &self.mkdir),
            ("patch", &self.patch),
            ("rm", &self.rm),
            ("ranlib", &self.ranlib),
            ("strip", &self.strip),
            ("tar", &self.tar),
            ("python", &self.python),
            ("cc", &self.cc),
            ("make", &self.make),
            ("autoconf", &self.autoconf),
            ("automake", &self.automake),
            ("libtool", &self.libtool),
            ("lipo", &self.lipo),
            ("pkgconfig", &self.pkgconfig),
            ("meson", &self.meson),
            ("asm", &self.asm),
            ("ninja", &self.ninja),
            ("xcodebuild", &self.xcodebuild),
        ]
        .into_iter()
        .filter_map(|(option, prog)| prog.as_deref().map(|p| (option, p)))
        .collect()
    }
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Xcode Options (macOS only)")]
pub struct XcodeArgs {
    /// Disable Xcode
    #[arg(long)]
    pub disable_xcode: bool,

    /// Specify install dir for Xcode products
    #[arg(long, value_name = "DIR", default_value = "/Applications")]
    pub xcode_prefix: String,

    /// Specify root of the directory hierarchy that contains product files
    /// and intermediate build files
    #[arg(long, value_name = "DIR", default_value = "xroot")]
    pub xcode_symroot: String,

    /// Select xcconfig
    #[arg(long, value_name = "MODE", num_args = 0..=1)]
    pub xcode_config: Option<Option<String>>,

    /// Specify deployment target for Xcode builds
    #[arg(long, value_name = "VER")]
    pub minver: Option<String>,

    #[arg(long, default_value = "bootstrap", hide = true)]
    pub xcode_driver: String,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Feature Options")]
pub struct FeatureArgs {
    /// Enable assembly code in non-contrib modules
    #[arg(long)]
    pub enable_asm: bool,
    /// Disable GTK GUI
    #[arg(long)]
    pub disable_gtk: bool,
    /// Disable GTK GUI update checks
    #[arg(long)]
    pub disable_gtk_update_checks: bool,
    /// Enable GTK GUI for Windows
    #[arg(long)]
    pub enable_gtk_mingw: bool,
    /// Build GUI with GTK4
    #[arg(long)]
    pub enable_gtk4: bool,
    /// Disable GStreamer (live preview)
    #[arg(long)]
    pub disable_gst: bool,

    /// Enable x265 video encoder
    #[arg(long, overrides_with = "disable_x265")]
    pub enable_x265: bool,
    /// Disable x265 video encoder
    #[arg(long, overrides_with = "enable_x265")]
    pub disable_x265: bool,

    /// Enable x265 NUMA support
    #[arg(long, overrides_with = "disable_numa")]
    pub enable_numa: bool,
    /// Disable x265 NUMA support
    #[arg(long, overrides_with = "enable_numa")]
    pub disable_numa: bool,

    /// Enable FDK AAC audio encoder
    #[arg(long, overrides_with = "disable_fdk_aac")]
    pub enable_fdk_aac: bool,
    /// Disable FDK AAC audio encoder
    #[arg(long, overrides_with = "enable_fdk_aac")]
    pub disable_fdk_aac: bool,

    /// Enable FFmpeg AAC audio encoder
    #[arg(long, overrides_with = "disable_ffmpeg_aac")]
    pub enable_ffmpeg_aac: bool,
    /// Disable FFmpeg AAC audio encoder
    #[arg(long, overrides_with = "enable_ffmpeg_aac")]
    pub disable_ffmpeg_aac: bool,

    /// Enable Nvidia NVENC video encoder
    #[arg(long, overrides_with = "disable_nvenc")]
    pub enable_nvenc: bool,
    /// Disable Nvidia NVENC video encoder
    #[arg(long, overrides_with = "enable_nvenc")]
    pub disable_nvenc: bool,

    /// Enable Intel QSV video encoder/decoder
    #[arg(long, overrides_with = "disable_qsv")]
    pub enable_qsv: bool,
    /// Disable Intel QSV video encoder/decoder
    #[arg(long, overrides_with = "enable_qsv")]
    pub disable_qsv: bool,

    /// Enable AMD VCE video encoder
    #[arg(long, overrides_with = "disable_vce")]
    pub enable_vce: bool,
    /// Disable AMD VCE video encoder
    #[arg(long, overrides_with = "enable_vce")]
    pub disable_vce: bool,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Launch Options")]
pub struct LaunchArgs {
    /// Launch build, capture log and wait for completion
    #[arg(long)]
    pub launch: bool,

    /// Allow N jobs at once; 0 to match CPU count
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub launch_jobs: usize,

    /// Specify additional ARGS for launch command
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub launch_args: Option<String>,

    /// Do not echo build output while waiting
    #[arg(long)]
    pub launch_quiet: bool,
}

/// Feature switches after host defaults and sanitising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub asm: bool,
    pub gtk: bool,
    pub gtk_update_checks: bool,
    pub gtk_mingw: bool,
    pub gtk4: bool,
    pub gst: bool,
    pub x265: bool,
    pub numa: bool,
    pub fdk_aac: bool,
    pub ffmpeg_aac: bool,
    pub nvenc: bool,
    pub qsv: bool,
    pub vce: bool,
    pub flatpak: bool,
    pub harden: bool,
    pub sandbox: bool,
}

fn pick(enable: bool, disable: bool, default: bool) -> bool {
    if enable {
        true
    } else if disable {
        false
    } else {
        default
    }
}

impl Features {
    pub fn resolve(args: &ConfigureArgs, host: &Tuple) -> Self {
        let f = &args.features;
        let hw_hosts = ["*-*-linux*", "*-*-mingw*"];

        let x265 = pick(f.enable_x265, f.disable_x265, true);
        let numa = pick(f.enable_numa, f.disable_numa, host.is_linux());
        let ffmpeg_aac = pick(f.enable_ffmpeg_aac, f.disable_ffmpeg_aac, !host.is_darwin());
        let nvenc = pick(f.enable_nvenc, f.disable_nvenc, host.matches(&hw_hosts));
        let qsv = pick(f.enable_qsv, f.disable_qsv, host.is_mingw());
        let vce = pick(f.enable_vce, f.disable_vce, host.is_mingw());

        Self {
            asm: f.enable_asm,
            gtk: !f.disable_gtk,
            gtk_update_checks: !f.disable_gtk_update_checks,
            gtk_mingw: if_host(host, f.enable_gtk_mingw, &["*-*-mingw*"], false),
            gtk4: f.enable_gtk4,
            gst: !f.disable_gst,
            x265,
            numa: if_host(host, numa, &["*-*-linux*"], false) && x265,
            fdk_aac: pick(f.enable_fdk_aac, f.disable_fdk_aac, false),
            ffmpeg_aac: if_host(host, ffmpeg_aac, &["*-*-darwin*"], true),
            nvenc: if_host(host, nvenc, &hw_hosts, false),
            qsv: if_host(host, qsv, &hw_hosts, false),
            vce: if_host(host, vce, &hw_hosts, false),
            flatpak: args.flatpak,
            harden: args.enable_harden,
            sandbox: if_host(host, args.enable_sandbox, &["*-*-darwin*"], false),
        }
    }
}

/// Split trailing arguments into make targets and `NAME=VALUE` exports.
pub fn split_trailing(args: &[String]) -> (Vec<String>, Vec<(String, String)>) {
    let mut targets = Vec::new();
    let mut exports = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                exports.push((name.to_string(), value.to_string()))
            }
            _ => targets.push(arg.clone()),
        }
    }
    (targets, exports)
}

/// Command line recorded as `CONF.args`: argv without `--force*` and
/// `--launch*`, with `$` doubled for make.
pub fn conf_args(argv: &[String]) -> String {
    argv.iter()
        .filter(|a| !(a.starts_with("--force") || a.starts_with("--launch")))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
        .replace('$', "$$")
}
