//! The `configure` driver: probe the host, then write `GNUmakefile`,
//! `project/handbrake.m4` and `distfile.cfg` into the build directory.

pub mod action;
pub mod checks;
pub mod document;
pub mod launch;
pub mod options;
pub mod paths;
pub mod project;
pub mod repo;
pub mod select;
pub mod tools;
pub mod version;

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::console::Console;
use crate::distfile::config::{DistfileConfig, CONFIG_FILE};
use crate::platform::{guess_build_spec, Tuple};
use action::{perform, Action, ActionReport, CoreProbe};
use checks::{run_checks, CheckResults};
use document::{ConfigDocument, DocKind};
use launch::Launch;
use options::{conf_args, split_trailing, ConfigureArgs, Features};
use project::{build_time, Project};
use repo::{probe_repo, RepoInfo};
use select::{debug_modes, optimize_modes, xcconfig_modes, ArchAction, SelectMode};
use tools::Tools;

pub const TOOL: &str = "configure";

/// `%c`-style timestamp, e.g. `Thu Oct 16 09:05:00 2026`.
pub fn ctime(when: OffsetDateTime) -> Result<String> {
    Ok(when.format(format_description!(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
    ))?)
}

/// Runs `make/config.guess` and parses the result.
struct BuildTupleProbe {
    src_dir: PathBuf,
    tuple: Option<Tuple>,
}

impl Action for BuildTupleProbe {
    fn category(&self) -> &str {
        "probe"
    }

    fn pretext(&self) -> String {
        "build tuple".to_string()
    }

    fn abort(&self) -> bool {
        true
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        let spec = guess_build_spec(&self.src_dir)?;
        Ok(match Tuple::build(&spec) {
            Ok(tuple) => {
                self.tuple = Some(tuple);
                ActionReport::passed(spec)
            }
            Err(err) => ActionReport::failed(err.to_string()),
        })
    }
}

/// Derives the host tuple from the build tuple, `--cross` and `--arch`.
struct HostTupleAction<'a> {
    build: &'a Tuple,
    cross: Option<&'a str>,
    arch: Option<&'a str>,
    tuple: Option<Tuple>,
}

impl Action for HostTupleAction<'_> {
    fn category(&self) -> &str {
        "compute"
    }

    fn pretext(&self) -> String {
        "host tuple".to_string()
    }

    fn abort(&self) -> bool {
        true
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        Ok(match Tuple::host(self.build, self.cross, self.arch) {
            Ok(tuple) => {
                let report = ActionReport::passed(tuple.spec.clone());
                self.tuple = Some(tuple);
                report
            }
            Err(err) => ActionReport::failed(err.to_string()),
        })
    }
}

fn host_tuple(
    build: &Tuple,
    cross: Option<&str>,
    arch: Option<&str>,
    console: &mut Console,
) -> Result<Tuple> {
    let mut action = HostTupleAction {
        build,
        cross,
        arch,
        tuple: None,
    };
    perform(&mut action, console)?;
    action.tuple.context("host tuple not computed")
}

/// Directory layout, both as given and as seen from the build directory.
#[derive(Debug, Clone)]
pub struct Dirs {
    pub src: PathBuf,
    pub build: PathBuf,
    pub prefix: PathBuf,
    pub xcode_prefix: PathBuf,
    pub sysroot: String,
    pub src_final: PathBuf,
    pub prefix_final: PathBuf,
    pub xcode_prefix_final: Option<PathBuf>,
}

impl Dirs {
    pub fn from_args(args: &ConfigureArgs) -> Result<Self> {
        let src = paths::normalize(Path::new(&args.src));
        let mut build = paths::normalize(Path::new(&args.build));
        if paths::absolute(&src)? == paths::absolute(&build)? {
            build = build.join("build");
        }
        Ok(Self {
            src,
            build,
            prefix: paths::normalize(Path::new(&args.prefix)),
            xcode_prefix: paths::normalize(Path::new(&args.xcode.xcode_prefix)),
            sysroot: args
                .sysroot
                .as_deref()
                .map(|s| paths::normalize(Path::new(s)).display().to_string())
                .unwrap_or_default(),
            src_final: PathBuf::new(),
            prefix_final: PathBuf::new(),
            xcode_prefix_final: None,
        })
    }

    /// Compute the final paths as make sees them from inside the build dir.
    pub fn finalize(&mut self, darwin_build: bool, console: &mut Console) -> Result<()> {
        self.src_final = paths::final_dir(&self.build, &self.src)?;
        self.prefix_final = paths::final_dir(&self.build, &self.prefix)?;
        console.info(format!("compute: makevar SRC/    = {}\n", self.src_final.display()));
        console.info("compute: makevar BUILD/  = .\n");
        console.info(format!(
            "compute: makevar PREFIX/ = {}\n",
            self.prefix_final.display()
        ));
        if darwin_build {
            let xcode = paths::final_dir(&self.build, &self.xcode_prefix)?;
            console.info(format!("compute: makevar XCODE.prefix/ = {}\n", xcode.display()));
            self.xcode_prefix_final = Some(xcode);
        }
        Ok(())
    }

    /// Create the build directory and start log recording.
    pub fn enter_build(&self, force: bool, console: &mut Console) -> Result<()> {
        if paths::absolute(&self.build)? == paths::absolute(&self.src)? {
            bail!("build (scratch) directory must not be the same as top-level source root!");
        }
        if self.build != Path::new(".") {
            if self.build.exists() {
                if !force {
                    bail!(
                        "build directory already exists: {} (use --force to overwrite)",
                        self.build.display()
                    );
                }
            } else {
                console.info(format!("mkdir: {}\n", self.build.display()));
                fs::create_dir_all(&self.build)
                    .with_context(|| format!("creating '{}'", self.build.display()))?;
            }
            console.info(format!("chdir: {}\n", self.build.display()));
        }
        console.start_recording();
        Ok(())
    }

    pub fn in_place(&self) -> bool {
        self.build == Path::new(".")
    }
}

/// Everything the document needs once probing is over.
struct Probed<'a> {
    args: &'a ConfigureArgs,
    argv: &'a [String],
    now: OffsetDateTime,
    build: &'a Tuple,
    host: &'a Tuple,
    arch: &'a SelectMode,
    debug: &'a SelectMode,
    optimize: &'a SelectMode,
    xcconfig: &'a SelectMode,
    core: &'a CoreProbe,
    repo: &'a RepoInfo,
    project: &'a Project,
    tools: &'a Tools,
    features: &'a Features,
    checks: &'a CheckResults,
    dirs: &'a Dirs,
    exports: &'a [(String, String)],
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

fn build_document(p: &Probed<'_>) -> Result<ConfigDocument> {
    let mut doc = ConfigDocument::new();
    doc.add_comment(&format!("generated by configure on {}", ctime(p.now)?));

    doc.add_blank();
    doc.add("CONF.args", conf_args(p.argv));

    let project = p.project;
    doc.add_blank();
    doc.add("HB.title", &project.title);
    doc.add("HB.name", &project.name);
    doc.add("HB.name.lower", &project.name_lower);
    doc.add("HB.name.upper", &project.name_upper);
    doc.add("HB.acro.lower", project::ACRO_LOWER);
    doc.add("HB.acro.upper", project::ACRO_UPPER);

    doc.add("HB.url.website", project::URL_WEBSITE);
    doc.add("HB.url.community", project::URL_COMMUNITY);
    doc.add("HB.url.irc", project::URL_IRC);
    doc.add("HB.url.appcast", &project.url_appcast);
    doc.add("HB.url.appnote", &project.url_appnote);

    doc.add("HB.version.major", project.vmajor);
    doc.add("HB.version.minor", project.vminor);
    doc.add("HB.version.point", project.vpoint);
    doc.add("HB.version.suffix", &project.suffix);
    doc.add("HB.version", &project.version);
    doc.add("HB.debversion", &project.debversion);
    doc.add("HB.version.hex", project.version_hex(p.repo.rev));

    doc.add("HB.build", &project.build);

    let repo = p.repo;
    doc.add("HB.repo.url", &repo.url);
    doc.add("HB.repo.tag", &repo.tag);
    doc.add("HB.repo.rev", repo.rev);
    doc.add("HB.repo.hash", &repo.hash);
    doc.add("HB.repo.shorthash", &repo.shorthash);
    doc.add("HB.repo.branch", &repo.branch);
    doc.add("HB.repo.remote", &repo.remote);
    doc.add("HB.repo.type", repo.build_type.as_str());
    doc.add("HB.repo.official", flag(repo.official));
    let date = match repo.date {
        Some(date) => date.format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))?,
        None => String::new(),
    };
    doc.add("HB.repo.date", date);

    let build = p.build;
    doc.add_blank();
    doc.add("BUILD.spec", &build.spec);
    doc.add("BUILD.machine", &build.machine);
    doc.add("BUILD.vendor", &build.vendor);
    doc.add("BUILD.system", &build.system);
    doc.add("BUILD.systemf", &build.systemf);
    doc.add("BUILD.release", &build.release);
    doc.add("BUILD.extra", &build.extra);
    doc.add(
        "BUILD.title",
        format!("{} {}", build.systemf, p.arch.default_mode()),
    );
    doc.add("BUILD.ncpu", p.core.count);
    doc.add("BUILD.jobs", p.core.jobs);
    doc.add("BUILD.date", ctime(p.now)?);

    let host = p.host;
    doc.add_blank();
    doc.add("HOST.spec", &host.spec);
    doc.add("HOST.machine", &host.machine);
    doc.add("HOST.vendor", &host.vendor);
    doc.add("HOST.system", &host.system);
    doc.add("HOST.systemf", &host.systemf);
    doc.add("HOST.release", &host.release);
    doc.add("HOST.extra", &host.extra);
    doc.add("HOST.title", &host.title);

    let cross = p.args.cross.as_deref();
    doc.add(
        "HOST.cross",
        flag(cross.is_some() || p.arch.mode() != p.arch.default_mode()),
    );
    doc.add(
        "HOST.cross.prefix",
        cross.map(|c| format!("{c}-")).unwrap_or_default(),
    );
    doc.add("HOST.arch", p.arch.mode());

    let dirs = p.dirs;
    doc.add_blank();
    doc.add("SRC", dirs.src_final.display());
    doc.add("SRC/", paths::with_slash(&dirs.src_final));
    doc.add("BUILD", ".");
    doc.add("BUILD/", paths::with_slash(Path::new(".")));
    doc.add("PREFIX", dirs.prefix_final.display());
    doc.add("PREFIX/", paths::with_slash(&dirs.prefix_final));

    let f = p.features;
    doc.add_blank();
    doc.add("SECURITY.sandbox", flag(f.sandbox));
    doc.add("SECURITY.harden", flag(f.harden));

    doc.add_blank();
    doc.add("FEATURE.asm", 0);
    doc.add("FEATURE.fdk_aac", flag(f.fdk_aac));
    doc.add("FEATURE.ffmpeg_aac", flag(f.ffmpeg_aac));
    doc.add("FEATURE.flatpak", flag(f.flatpak));
    doc.add("FEATURE.gtk4", flag(f.gtk4));
    doc.add("FEATURE.gtk", flag(f.gtk));
    doc.add("FEATURE.gtk.mingw", flag(f.gtk_mingw));
    doc.add("FEATURE.gtk.update.checks", flag(f.gtk_update_checks));
    doc.add("FEATURE.gst", flag(f.gst));
    doc.add("FEATURE.nvenc", flag(f.nvenc));
    doc.add("FEATURE.qsv", flag(f.qsv));
    doc.add("FEATURE.vce", flag(f.vce));
    doc.add("FEATURE.x265", flag(f.x265));
    doc.add("FEATURE.numa", flag(f.numa));

    if build.is_darwin() && cross.is_none() {
        let xcode_missing = p.tools.found("xcodebuild").is_none();
        let xcode = !(xcode_missing || p.args.xcode.disable_xcode);
        doc.add("FEATURE.xcode", flag(xcode));
        if xcode {
            let prefix = dirs
                .xcode_prefix_final
                .clone()
                .unwrap_or_else(|| dirs.xcode_prefix.clone());
            doc.add_blank();
            doc.add("XCODE.prefix", prefix.display());
            doc.add("XCODE.prefix/", paths::with_slash(&prefix));
            doc.add("XCODE.driver", &p.args.xcode.xcode_driver);
            let symroot = Path::new(&p.args.xcode.xcode_symroot);
            if symroot.is_absolute() {
                doc.add("XCODE.symroot", symroot.display());
            } else {
                doc.add(
                    "XCODE.symroot",
                    paths::absolute(&dirs.build.join(symroot))?.display(),
                );
            }
            doc.add("XCODE.xcconfig", p.xcconfig.value());
        }
    }

    p.checks.doc_add(&mut doc);

    doc.add_make("");
    doc.add_make("## define debug mode and optimize before other includes");
    doc.add_make("## since it is tested in some module.defs");
    doc.add("GCC.g", p.debug.mode());
    doc.add("GCC.O", p.optimize.mode());
    doc.add_blank();
    doc.add_make("## include definitions");
    doc.add_make("include $(SRC/)make/include/main.defs");

    doc.add_blank();
    p.tools.doc_add(&mut doc);

    doc.add_blank();
    doc.add("GCC.archs", p.arch.mode());
    if host.is_darwin() {
        doc.add("GCC.sysroot", &dirs.sysroot);
        doc.add("GCC.minver", p.args.xcode.minver.as_deref().unwrap_or(""));
    } else {
        doc.add("GCC.sysroot", "");
        doc.add("GCC.minver", "");
    }
    doc.add("GCC.W.extra", p.checks.gcc_w_extra.join(" "));

    let x86_32 = host.matches(&["i?86-*"]);
    let x86_64 = host.matches(&["x86_64-*", "amd64-*"]);
    if x86_32 {
        doc.append("LIBHB.GCC.D", "ARCH_X86_32");
    } else if x86_64 {
        doc.append("LIBHB.GCC.D", "ARCH_X86_64");
    }

    if f.asm && p.tools.found("asm").is_some() {
        let mut asm = "";
        if x86_32 {
            asm = "x86";
            doc.append("LIBHB.GCC.D", "HAVE_MMX");
        } else if x86_64 {
            asm = "x86";
            doc.append("LIBHB.GCC.D", "HAVE_MMX ARCH_X86_64");
        }
        doc.update("FEATURE.asm", asm)?;
    }

    if !p.exports.is_empty() {
        doc.add_blank();
        doc.add_comment("overrides via VARIABLE=VALUE on command-line");
        for (name, value) in p.exports {
            doc.add(name, value);
        }
    }

    doc.add_make("");
    doc.add_make("## include custom definitions");
    doc.add_make("-include $(SRC/)custom.defs");
    doc.add_make("-include $(BUILD/)GNUmakefile.custom.defs");

    doc.add_make("");
    doc.add_make("## include rules");
    doc.add_make("include $(SRC/)make/include/main.rules");
    doc.add_make("-include $(SRC/)custom.rules");
    doc.add_make("-include $(BUILD/)GNUmakefile.custom.rules");
    Ok(doc)
}

fn summary(build: &Tuple, host: &Tuple, cross: bool, f: &Features, console: &mut Console) {
    const REQUIRED: &str = "required on target platform";
    const UNSUPPORTED: &str = "not supported on target platform";
    let py = |b: bool| if b { "True" } else { "False" };
    let hw = host.system == "linux" || host.system == "mingw";
    let darwin = host.system == "darwin";
    let note = |show: bool, text: &str| {
        if show {
            format!(" ({text})")
        } else {
            String::new()
        }
    };

    let mut lines = vec![
        "-".repeat(79),
        format!("Build system:       {}", build.spec.trim_end_matches('-')),
        format!("Host system:        {}", host.spec.trim_end_matches('-')),
        format!(
            "Target platform:    {}{}",
            host.system,
            if cross { " (cross-compile)" } else { "" }
        ),
        format!("Harden:             {}", py(f.harden)),
        format!("Sandbox:            {}{}", py(f.sandbox), note(!darwin, UNSUPPORTED)),
        format!("Enable FDK-AAC:     {}", py(f.fdk_aac)),
    ];
    // Two spaces before the note here, as the make system has always shown it.
    lines.push(format!(
        "Enable FFmpeg AAC:  {}{}",
        py(f.ffmpeg_aac),
        if darwin { String::new() } else { format!("  ({REQUIRED})") }
    ));
    lines.push(format!("Enable NVENC:       {}{}", py(f.nvenc), note(!hw, UNSUPPORTED)));
    lines.push(format!("Enable QSV:         {}{}", py(f.qsv), note(!hw, UNSUPPORTED)));
    lines.push(format!("Enable VCE:         {}{}", py(f.vce), note(!hw, UNSUPPORTED)));
    for line in lines {
        console.out(format!("{line}\n"));
    }
}

fn distfile_config(args: &ConfigureArgs) -> DistfileConfig {
    let df = &args.distfile;
    DistfileConfig {
        disable_fetch: df.disable_df_fetch,
        disable_verify: df.disable_df_verify,
        jobs: df.df_jobs,
        verbosity: (df.df_verbosity > 0).then_some(df.df_verbosity),
        accept_url: df.df_accept_url.clone(),
        deny_url: df.df_deny_url.clone(),
    }
}

/// Run configure. `argv` is the command line without the program name.
///
/// On failure after the build directory was entered, the logs are still
/// written.
pub fn run(args: &ConfigureArgs, argv: &[String], console: &mut Console) -> Result<()> {
    let mut build_dir = None;
    let result = configure(args, argv, console, &mut build_dir);
    if result.is_err() {
        if let Some(dir) = &build_dir {
            if let Err(err) = console.record_log(dir) {
                console.warn(format!("failed to record logs: {err:#}"));
            }
        }
    }
    result
}

fn configure(
    args: &ConfigureArgs,
    argv: &[String],
    console: &mut Console,
    entered: &mut Option<PathBuf>,
) -> Result<()> {
    let now = build_time()?;
    let mut dirs = Dirs::from_args(args)?;
    let cross = args.cross.as_deref().filter(|c| !c.is_empty());

    let mut build_probe = BuildTupleProbe {
        src_dir: dirs.src.clone(),
        tuple: None,
    };
    perform(&mut build_probe, console)?;
    let build = build_probe.tuple.context("build tuple not computed")?;

    let launch_jobs = args.launch.launch.then_some(args.launch.launch_jobs);
    let mut core = CoreProbe::new(launch_jobs);
    perform(&mut core, console)?;

    let cc_env = std::env::var("CC").ok();
    let native_darwin = build.is_darwin() && cross.is_none();
    let mut tools = Tools::standard(&build, cc_env.as_deref(), native_darwin);
    if let Some(cross) = cross {
        tools.apply_cross(cross);
    }
    for (option, prog) in args.tools.pairs() {
        tools.apply_override(option, prog);
    }
    tools.probe_all(console)?;

    let mut debug = debug_modes();
    let mut optimize = optimize_modes();
    let mut xcconfig = xcconfig_modes(&build, &dirs.src)?;

    let host = host_tuple(&build, cross, None, console)?;
    let mut arch = ArchAction::new(&host);
    perform(&mut arch, console)?;
    let mut arch = arch.mode;

    for (mode, value) in [
        (&mut debug, &args.debug),
        (&mut optimize, &args.optimize),
        (&mut arch, &args.arch),
        (&mut xcconfig, &args.xcode.xcode_config),
    ] {
        if let Some(Some(value)) = value {
            mode.select(value)?;
        }
    }

    let (targets, exports) = split_trailing(&args.trailing);
    let host = host_tuple(&build, cross, Some(arch.mode()), console)?;

    let repo = probe_repo(&dirs.src, args.snapshot, console)?;
    let darwin_arch = host.is_darwin().then_some(arch.mode());
    let project = Project::compute(&repo, args.snapshot, darwin_arch, now)?;

    let features = Features::resolve(args, &host);

    tools.add_cmake(&host, args.flatpak);
    tools.probe_option("cmake", console)?;

    let checks = run_checks(
        &host,
        tools.pathname("cc"),
        tools.found("pkgconfig"),
        features.numa,
        console,
    )?;

    dirs.finalize(build.is_darwin(), console)?;
    let doc = build_document(&Probed {
        args,
        argv,
        now,
        build: &build,
        host: &host,
        arch: &arch,
        debug: &debug,
        optimize: &optimize,
        xcconfig: &xcconfig,
        core: &core,
        repo: &repo,
        project: &project,
        tools: &tools,
        features: &features,
        checks: &checks,
        dirs: &dirs,
        exports: &exports,
    })?;

    dirs.enter_build(args.force, console)?;
    *entered = Some(dirs.build.clone());

    doc.write(DocKind::Make, &dirs.build, &project.name_lower, console)?;
    doc.write(DocKind::M4, &dirs.build, &project.name_lower, console)?;
    console.info(format!("write: {CONFIG_FILE}\n"));
    distfile_config(args).save(&dirs.build.join(CONFIG_FILE))?;

    summary(&build, &host, cross.is_some(), &features, console);

    let gmake = tools.pathname("make").to_string();
    if args.launch.launch {
        console.out(format!("{}\n", "-".repeat(79)));
        Launch {
            gmake: &gmake,
            jobs: core.jobs,
            args: args.launch.launch_args.as_deref(),
            targets: &targets,
            quiet: args.launch.launch_quiet,
            build_dir: &dirs.build,
        }
        .run(console)?;
    }

    console.record_log(&dirs.build)?;

    console.out(format!("{}\n", "-".repeat(79)));
    let build_dir = dirs.build.display();
    if args.launch.launch {
        console.out("Build is finished!\n");
        if dirs.in_place() {
            console.out("You may now examine the output.\n");
        } else {
            console.out(format!("You may now cd into {build_dir} and examine the output.\n"));
        }
    } else {
        console.out("Build is configured!\n");
        if dirs.in_place() {
            console.out(format!("You may now run make ({gmake}).\n"));
        } else {
            console.out(format!(
                "You may now cd into {build_dir} and run make ({gmake}).\n"
            ));
        }
    }
    Ok(())
}
