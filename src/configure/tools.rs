//! Build tool discovery.

use anyhow::Result;
use std::path::Path;

use super::action::{perform, Action, ActionReport};
use super::document::ConfigDocument;
use super::version::{Version, VersionProbe};
use crate::console::Console;
use crate::platform::{for_host, Tuple};

/// Tools that take the `--cross` prefix.
const CROSS_TOOLS: &[&str] = &["ar", "cc", "ranlib", "strip"];

#[derive(Debug, Clone)]
pub struct ToolProbe {
    /// Make variable receiving the path, e.g. `AR.exe`.
    pub var: String,
    /// CLI option name, e.g. `ar` for `--ar PROG`.
    pub option: String,
    /// Candidate executables, tried in order.
    pub names: Vec<String>,
    pub abort: bool,
    pub versionopt: String,
    pub minversion: Option<Version>,
    pub rexpr: Option<String>,
    /// First hit; the first candidate name until found.
    pub pathname: String,
    pub fail: bool,
    pub version: Option<VersionProbe>,
}

impl ToolProbe {
    pub fn new(var: &str, option: &str, names: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        Self {
            var: var.to_string(),
            option: option.to_string(),
            pathname: names.first().cloned().unwrap_or_default(),
            names,
            abort: true,
            versionopt: "--version".to_string(),
            minversion: None,
            rexpr: None,
            fail: true,
            version: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.abort = false;
        self
    }

    pub fn min_version(mut self, version: Version) -> Self {
        self.minversion = Some(version);
        self
    }

    pub fn version_option(mut self, opt: &str) -> Self {
        self.versionopt = opt.to_string();
        self
    }

    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("")
    }

    /// Restrict the search to one user-supplied program.
    pub fn set_override(&mut self, prog: &str) {
        self.names = vec![prog.to_string()];
        self.pathname = prog.to_string();
        self.abort = true;
        self.minversion = None;
        self.rexpr = None;
    }

    pub fn doc_add(&self, doc: &mut ConfigDocument) {
        doc.add(&self.var, &self.pathname);
    }
}

impl Action for ToolProbe {
    fn category(&self) -> &str {
        "find"
    }

    fn pretext(&self) -> String {
        self.name().to_string()
    }

    fn abort(&self) -> bool {
        self.abort
    }

    fn execute(&mut self, _console: &mut Console) -> Result<ActionReport> {
        let mut report = ActionReport::default();
        report.session = self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("name[{i}] = {name}"))
            .collect();

        self.fail = true;
        for name in &self.names {
            if let Some(found) = find_executable(name) {
                self.pathname = found;
                self.fail = false;
                break;
            }
        }
        report.fail = self.fail;
        report.msg_end = if self.fail {
            "not found".to_string()
        } else {
            self.pathname.clone()
        };
        Ok(report)
    }
}

/// Locate `name` on `PATH`; names with a directory component are checked
/// as given.
pub fn find_executable(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let has_dir = Path::new(name)
        .parent()
        .is_some_and(|p| !p.as_os_str().is_empty());
    match which::which(name) {
        Ok(_) if has_dir => Some(name.to_string()),
        Ok(path) => Some(path.display().to_string()),
        Err(_) => None,
    }
}

/// Run a tool probe and, when found with a minimum version, its version
/// probe.
pub fn probe_tool(tool: &mut ToolProbe, console: &mut Console) -> Result<()> {
    perform(tool, console)?;
    if tool.fail {
        return Ok(());
    }
    if let Some(minversion) = tool.minversion {
        let mut version = VersionProbe::new(
            tool.name().to_string(),
            vec![tool.pathname.clone(), tool.versionopt.clone()],
            minversion,
        );
        version.rexpr = tool.rexpr.clone();
        version.abort = tool.abort;
        perform(&mut version, console)?;
        tool.version = Some(version);
    }
    Ok(())
}

/// The ordered tool table.
#[derive(Debug, Clone, Default)]
pub struct Tools {
    probes: Vec<ToolProbe>,
}

impl Tools {
    /// Standard tool table for a build machine.
    ///
    /// `cc_env` is the value of `$CC`; `native_darwin` makes xcodebuild
    /// mandatory.
    pub fn standard(build: &Tuple, cc_env: Option<&str>, native_darwin: bool) -> Self {
        let mut gcc_names: Vec<&str> = cc_env.filter(|cc| !cc.is_empty()).into_iter().collect();
        gcc_names.push("gcc");
        if build.is_freebsd() {
            gcc_names.push("clang");
        }
        if build.matches(&["*-*-cygwin*"]) {
            gcc_names.push("gcc-4");
        }
        let gmake: &[&str] = for_host(
            build,
            &["gmake", "make"],
            &[(&["make", "gmake"], "*-*-darwin*")],
        );

        let mut xcodebuild = ToolProbe::new("XCODEBUILD.exe", "xcodebuild", &["xcodebuild"])
            .version_option("-version")
            .min_version(Version::new(10, 3, 0));
        xcodebuild.abort = native_darwin;

        let probes = vec![
            ToolProbe::new("AR.exe", "ar", &["ar"]),
            ToolProbe::new("CP.exe", "cp", &["cp"]),
            ToolProbe::new("M4.exe", "m4", &["gm4", "m4"]),
            ToolProbe::new("MKDIR.exe", "mkdir", &["mkdir"]),
            ToolProbe::new("PATCH.exe", "patch", &["gpatch", "patch"]),
            ToolProbe::new("RM.exe", "rm", &["rm"]),
            ToolProbe::new("RANLIB.exe", "ranlib", &["ranlib"]),
            ToolProbe::new("STRIP.exe", "strip", &["strip"]),
            ToolProbe::new("TAR.exe", "tar", &["gtar", "tar"]),
            ToolProbe::new("PYTHON.exe", "python", &["python3", "python"]).optional(),
            ToolProbe::new("GCC.gcc", "cc", &gcc_names),
            ToolProbe::new("GMAKE.exe", "make", gmake),
            ToolProbe::new("AUTOCONF.exe", "autoconf", &["autoconf"])
                .min_version(Version::new(2, 69, 0)),
            ToolProbe::new("AUTOMAKE.exe", "automake", &["automake"])
                .min_version(Version::new(1, 15, 0)),
            ToolProbe::new("LIBTOOL.exe", "libtool", &["libtool"]),
            ToolProbe::new("LIPO.exe", "lipo", &["lipo"]).optional(),
            ToolProbe::new("PKGCONFIG.exe", "pkgconfig", &["pkg-config"])
                .min_version(Version::new(0, 29, 0)),
            ToolProbe::new("MESON.exe", "meson", &["meson"]).min_version(Version::new(0, 47, 0)),
            ToolProbe::new("NASM.exe", "asm", &["nasm"]).min_version(Version::new(2, 13, 0)),
            ToolProbe::new("NINJA.exe", "ninja", &["ninja-build", "ninja"]),
            xcodebuild,
        ];
        Self { probes }
    }

    /// Rename the cross-capable tools to `<cross>-<name>`.
    pub fn apply_cross(&mut self, cross: &str) {
        for tool in self
            .probes
            .iter_mut()
            .filter(|t| CROSS_TOOLS.contains(&t.option.as_str()))
        {
            let name = format!("{cross}-{}", tool.name());
            tool.names = vec![name.clone()];
            tool.pathname = name;
        }
    }

    /// Apply a `--<option> PROG` override; unknown options are ignored.
    pub fn apply_override(&mut self, option: &str, prog: &str) {
        if let Some(tool) = self.probes.iter_mut().find(|t| t.option == option) {
            tool.set_override(prog);
        }
    }

    /// Append the CMake probe; its minimum depends on host and packaging.
    pub fn add_cmake(&mut self, host: &Tuple, flatpak: bool) {
        let min = if flatpak || host.is_darwin() || host.is_mingw() {
            Version::new(3, 1, 0)
        } else {
            Version::new(2, 8, 12)
        };
        self.probes
            .push(ToolProbe::new("CMAKE.exe", "cmake", &["cmake"]).min_version(min));
    }

    pub fn probe_all(&mut self, console: &mut Console) -> Result<()> {
        for tool in &mut self.probes {
            probe_tool(tool, console)?;
        }
        Ok(())
    }

    pub fn probe_option(&mut self, option: &str, console: &mut Console) -> Result<()> {
        if let Some(tool) = self.probes.iter_mut().find(|t| t.option == option) {
            probe_tool(tool, console)?;
        }
        Ok(())
    }

    pub fn get(&self, option: &str) -> Option<&ToolProbe> {
        self.probes.iter().find(|t| t.option == option)
    }

    /// Path of a found tool, or `None` when missing.
    pub fn found(&self, option: &str) -> Option<&str> {
        self.get(option)
            .filter(|t| !t.fail)
            .map(|t| t.pathname.as_str())
    }

    /// Path of a tool, falling back to its first candidate name.
    pub fn pathname(&self, option: &str) -> &str {
        self.get(option).map_or("", |t| t.pathname.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolProbe> {
        self.probes.iter()
    }

    pub fn doc_add(&self, doc: &mut ConfigDocument) {
        for tool in &self.probes {
            tool.doc_add(doc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Verbosity;

    fn linux() -> Tuple {
        Tuple::parse("x86_64-pc-linux-gnu").unwrap()
    }

    #[test]
    fn finds_shell_on_path() {
        let mut console = Console::captured("configure", Verbosity::Quiet);
        let mut tool = ToolProbe::new("SH.exe", "sh", &["definitely-missing-tool-xyz", "sh"]);
        probe_tool(&mut tool, &mut console).unwrap();
        assert!(!tool.fail);
        assert!(tool.pathname.ends_with("sh"));
    }

    #[test]
    fn missing_optional_tool_keeps_first_name() {
        let mut console = Console::captured("configure", Verbosity::Info);
        let mut tool = ToolProbe::new("LIPO.exe", "lipo", &["definitely-missing-lipo-xyz"]).optional();
        probe_tool(&mut tool, &mut console).unwrap();
        assert!(tool.fail);
        assert_eq!(tool.pathname, "definitely-missing-lipo-xyz");
        assert_eq!(
            console.captured_text(),
            "find: definitely-missing-lipo-xyz...(fail) not found\n"
        );
    }

    #[test]
    fn missing_required_tool_aborts() {
        let mut console = Console::captured("configure", Verbosity::Quiet);
        let mut tool = ToolProbe::new("AR.exe", "ar", &["definitely-missing-ar-xyz"]);
        assert!(probe_tool(&mut tool, &mut console).is_err());
    }

    #[test]
    fn standard_table_order_and_cc_env() {
        let tools = Tools::standard(&linux(), Some("clang-15"), false);
        let gcc = tools.get("cc").unwrap();
        assert_eq!(gcc.var, "GCC.gcc");
        assert_eq!(gcc.names, vec!["clang-15", "gcc"]);
        assert_eq!(tools.get("make").unwrap().names, vec!["gmake", "make"]);
        assert!(!tools.get("python").unwrap().abort);
        assert!(!tools.get("xcodebuild").unwrap().abort);
        assert_eq!(tools.iter().next().unwrap().var, "AR.exe");
    }

    #[test]
    fn darwin_prefers_make_and_requires_xcode_natively() {
        let darwin = Tuple::parse("x86_64-apple-darwin20.1.0").unwrap();
        let tools = Tools::standard(&darwin, None, true);
        assert_eq!(tools.get("make").unwrap().names, vec!["make", "gmake"]);
        assert!(tools.get("xcodebuild").unwrap().abort);
    }

    #[test]
    fn cross_renames_only_binutils_and_compiler() {
        let mut tools = Tools::standard(&linux(), None, false);
        tools.apply_cross("x86_64-w64-mingw32");
        assert_eq!(tools.get("ar").unwrap().names, vec!["x86_64-w64-mingw32-ar"]);
        assert_eq!(tools.get("cc").unwrap().names, vec!["x86_64-w64-mingw32-gcc"]);
        assert_eq!(tools.get("tar").unwrap().names, vec!["gtar", "tar"]);
    }

    #[test]
    fn override_drops_version_check() {
        let mut tools = Tools::standard(&linux(), None, false);
        tools.apply_override("asm", "/opt/nasm/bin/nasm");
        let nasm = tools.get("asm").unwrap();
        assert_eq!(nasm.names, vec!["/opt/nasm/bin/nasm"]);
        assert!(nasm.minversion.is_none());
    }

    #[test]
    fn cmake_minimum_depends_on_host() {
        let mut tools = Tools::standard(&linux(), None, false);
        tools.add_cmake(&linux(), false);
        assert_eq!(tools.get("cmake").unwrap().minversion, Some(Version::new(2, 8, 12)));

        let mingw = Tuple::parse("x86_64-w64-mingw32").unwrap();
        let mut tools = Tools::default();
        tools.add_cmake(&mingw, false);
        assert_eq!(tools.get("cmake").unwrap().minversion, Some(Version::new(3, 1, 0)));
    }

    #[test]
    fn doc_lists_every_tool() {
        let tools = Tools::standard(&linux(), None, false);
        let mut doc = ConfigDocument::new();
        tools.doc_add(&mut doc);
        let make = doc.render_make();
        assert!(make.starts_with("AR.exe"));
        assert!(make.contains(&format!("{:<14}  = ninja-build\n", "NINJA.exe")));
    }
}
