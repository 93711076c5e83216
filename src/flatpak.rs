//! `create-flatpak-manifest`: fill a Flatpak manifest template with the
//! HandBrake source archive and contrib downloads.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fsutil::write_atomic;

pub const TOOL: &str = "create-flatpak-manifest";

/// Exit status for a manifest that names two archives.
pub const EXIT_MULTIPLE_ARCHIVES: i32 = 3;

const LLVM_EXTENSION: &str = "org.freedesktop.Sdk.Extension.llvm14";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlatpakError {
    #[error("only one archive source permitted")]
    MultipleArchives,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "create-flatpak-manifest")]
#[command(about = "Generate a Flatpak manifest for HandBrake.")]
pub struct FlatpakArgs {
    /// Main archive (a.k.a. HB sources)
    #[arg(short, long, value_name = "URL", action = ArgAction::Append)]
    pub archive: Vec<String>,

    /// Contrib download URL (can be repeated)
    #[arg(short, long, value_name = "URL", action = ArgAction::Append)]
    pub contrib: Vec<String>,

    /// sha256 of previous file on command line
    #[arg(short, long, value_name = "HASH", action = ArgAction::Append)]
    pub sha256: Vec<String>,

    /// Flatpak manifest template
    #[arg(short, long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Flatpak SDK runtime version
    #[arg(short, long, value_name = "VER")]
    pub runtime: Option<String>,

    /// Build with Intel QSV support
    #[arg(short, long)]
    pub qsv: bool,

    /// Build with Nvidia HW Encoder support
    #[arg(short = 'e', long)]
    pub nvenc: bool,

    /// Manifest is for a HandBrake flatpak plugin
    #[arg(short, long)]
    pub plugin: bool,

    /// Write the manifest to DST instead of stdout
    #[arg(value_name = "DST")]
    pub dst: Option<PathBuf>,

    #[arg(skip)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Archive,
    Contrib,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub url: String,
    pub kind: SourceKind,
    pub sha256: Option<String>,
}

/// Rebuild the command-line order of `-a`, `-c` and `-s`: a hash belongs
/// to the source named just before it. Repeating a URL replaces its entry
/// in place.
fn ordered_sources(matches: &ArgMatches) -> Vec<SourceEntry> {
    #[derive(Clone, Copy)]
    enum Item {
        Source(SourceKind),
        Hash,
    }

    let mut items: Vec<(usize, Item, String)> = Vec::new();
    for (id, item) in [
        ("archive", Item::Source(SourceKind::Archive)),
        ("contrib", Item::Source(SourceKind::Contrib)),
        ("sha256", Item::Hash),
    ] {
        let (Some(values), Some(indices)) =
            (matches.get_many::<String>(id), matches.indices_of(id))
        else {
            continue;
        };
        items.extend(indices.zip(values).map(|(i, v)| (i, item, v.clone())));
    }
    items.sort_by_key(|(i, _, _)| *i);

    let mut sources: Vec<SourceEntry> = Vec::new();
    let mut current: Option<usize> = None;
    for (_, item, value) in items {
        match item {
            Item::Source(_) if value.is_empty() => current = None,
            Item::Source(kind) => {
                let entry = SourceEntry {
                    url: value,
                    kind,
                    sha256: None,
                };
                current = Some(match sources.iter().position(|s| s.url == entry.url) {
                    Some(pos) => {
                        sources[pos] = entry;
                        pos
                    }
                    None => {
                        sources.push(entry);
                        sources.len() - 1
                    }
                });
            }
            Item::Hash => {
                if let Some(pos) = current {
                    sources[pos].sha256 = Some(value);
                }
            }
        }
    }
    sources
}

impl FlatpakArgs {
    /// Parse a command line, keeping the order of source options.
    pub fn try_parse_ordered<I, T>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(argv)?;
        let mut args = Self::from_arg_matches(&matches)?;
        args.sources = ordered_sources(&matches);
        Ok(args)
    }

    pub fn manifest(&self) -> Result<Value> {
        let template = match &self.template {
            Some(path) if path.exists() => Some(load_template(path)?),
            _ => None,
        };
        if self.plugin {
            return Ok(plugin_manifest(template, self.runtime.as_deref()));
        }
        build_manifest(
            template,
            &self.sources,
            self.runtime.as_deref(),
            self.qsv,
            self.nvenc,
        )
    }

    pub fn run(&self) -> Result<()> {
        let text = render(&self.manifest()?)?;
        match &self.dst {
            Some(dst) => write_atomic(dst, text.as_bytes()),
            None => {
                print!("{text}");
                Ok(())
            }
        }
    }
}

fn load_template(path: &Path) -> Result<Map<String, Value>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading manifest template '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing manifest template '{}'", path.display()))
}

fn is_local(url: &str) -> bool {
    Url::parse(url).is_err()
}

/// Last path segment of a URL or local path, percent-decoded.
fn url_filename(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    let segment = path.rsplit('/').next().unwrap_or_default();
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

pub fn plugin_manifest(template: Option<Map<String, Value>>, runtime: Option<&str>) -> Value {
    let mut manifest = template.unwrap_or_default();
    if let Some(runtime) = runtime {
        manifest.insert("runtime-version".to_string(), json!(runtime));
    }
    Value::Object(manifest)
}

fn source_value(entry: &SourceEntry) -> Option<Map<String, Value>> {
    let mut source = Map::new();
    if is_local(&entry.url) {
        source.insert("path".to_string(), json!(entry.url));
    } else {
        let sha256 = entry.sha256.as_deref().filter(|h| !h.is_empty())?;
        source.insert("url".to_string(), json!(entry.url));
        source.insert("sha256".to_string(), json!(sha256));
    }
    match entry.kind {
        SourceKind::Archive => {
            source.insert("type".to_string(), json!("archive"));
            source.insert("strip-components".to_string(), json!(1));
        }
        SourceKind::Contrib => {
            source.insert("type".to_string(), json!("file"));
            source.insert("dest".to_string(), json!("download"));
            source.insert("dest-filename".to_string(), json!(url_filename(&entry.url)));
        }
    }
    Some(source)
}

/// Build the application manifest. Without a template a minimal skeleton
/// with one module is used.
pub fn build_manifest(
    template: Option<Map<String, Value>>,
    sources: &[SourceEntry],
    runtime: Option<&str>,
    qsv: bool,
    nvenc: bool,
) -> Result<Value> {
    let mut manifest = template.unwrap_or_else(|| {
        let mut skeleton = Map::new();
        skeleton.insert("finish-args".to_string(), json!([]));
        skeleton.insert("modules".to_string(), json!([{"config-opts": []}]));
        skeleton
    });

    if let Some(runtime) = runtime {
        manifest.insert("runtime-version".to_string(), json!(runtime));
    }
    if nvenc {
        manifest.insert("sdk-extensions".to_string(), json!([LLVM_EXTENSION]));
    }

    let mut archive = None;
    let mut contribs = Vec::new();
    for entry in sources {
        let Some(source) = source_value(entry) else {
            log::debug!("skipping {} without sha256", entry.url);
            continue;
        };
        match entry.kind {
            SourceKind::Archive if archive.is_some() => {
                return Err(FlatpakError::MultipleArchives.into())
            }
            SourceKind::Archive => archive = Some(Value::Object(source)),
            SourceKind::Contrib => contribs.push(Value::Object(source)),
        }
    }

    let Some(module) = manifest
        .get_mut("modules")
        .and_then(Value::as_array_mut)
        .and_then(|modules| modules.last_mut())
        .and_then(Value::as_object_mut)
    else {
        bail!("manifest template has no modules");
    };

    let config = module
        .entry("config-opts")
        .or_insert_with(|| json!([]));
    let Some(config) = config.as_array_mut() else {
        bail!("config-opts of the last module is not a list");
    };
    if qsv {
        config.push(json!("--enable-qsv"));
    }
    if nvenc {
        config.push(json!("--enable-nvenc"));
        config.push(json!("--enable-nvdec"));
        module.insert(
            "build-options".to_string(),
            json!({
                "append-path": "/usr/lib/sdk/llvm14/bin",
                "prepend-ld-library-path": "/usr/lib/sdk/llvm14/lib"
            }),
        );
    }

    module.insert(
        "sources".to_string(),
        Value::Array(archive.into_iter().chain(contribs).collect()),
    );
    Ok(Value::Object(manifest))
}

/// Four-space indented JSON with a trailing newline.
pub fn render(manifest: &Value) -> Result<String> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    manifest.serialize(&mut ser)?;
    out.push(b'\n');
    Ok(String::from_utf8(out)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn parse(args: &[&str]) -> FlatpakArgs {
        FlatpakArgs::try_parse_ordered(std::iter::once(TOOL).chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn hashes_follow_their_source() {
        let args = parse(&[
            "-c",
            "https://x.org/libass-0.17.tar.gz",
            "-s",
            HASH,
            "-a",
            "HandBrake.tar.bz2",
            "-c",
            "https://x.org/nohash.tar.gz",
        ]);
        assert_eq!(
            args.sources,
            vec![
                SourceEntry {
                    url: "https://x.org/libass-0.17.tar.gz".into(),
                    kind: SourceKind::Contrib,
                    sha256: Some(HASH.into()),
                },
                SourceEntry {
                    url: "HandBrake.tar.bz2".into(),
                    kind: SourceKind::Archive,
                    sha256: None,
                },
                SourceEntry {
                    url: "https://x.org/nohash.tar.gz".into(),
                    kind: SourceKind::Contrib,
                    sha256: None,
                },
            ]
        );
    }

    #[test]
    fn archive_first_and_unhashed_remote_skipped() {
        let args = parse(&[
            "-c",
            "https://x.org/a/libass-0.17.tar.gz",
            "-s",
            HASH,
            "-a",
            "HandBrake.tar.bz2",
            "-c",
            "https://x.org/nohash.tar.gz",
            "-r",
            "23.08",
            "-q",
        ]);
        let manifest = args.manifest().unwrap();
        assert_eq!(manifest["runtime-version"], json!("23.08"));
        let module = &manifest["modules"][0];
        assert_eq!(module["config-opts"], json!(["--enable-qsv"]));
        assert_eq!(
            module["sources"],
            json!([
                {"path": "HandBrake.tar.bz2", "type": "archive", "strip-components": 1},
                {
                    "url": "https://x.org/a/libass-0.17.tar.gz",
                    "sha256": HASH,
                    "type": "file",
                    "dest": "download",
                    "dest-filename": "libass-0.17.tar.gz"
                }
            ])
        );
    }

    #[test]
    fn second_archive_is_rejected() {
        let args = parse(&["-a", "one.tar.bz2", "-a", "two.tar.bz2"]);
        let err = args.manifest().unwrap_err();
        assert_eq!(
            err.downcast_ref::<FlatpakError>(),
            Some(&FlatpakError::MultipleArchives)
        );
    }

    #[test]
    fn template_keeps_key_order_and_nvenc_extends_it() {
        let tmp = tempfile::TempDir::new().unwrap();
        let template = tmp.path().join("fr.handbrake.ghb.json");
        fs::write(
            &template,
            r#"{"app-id": "fr.handbrake.ghb", "runtime": "org.gnome.Platform",
                "finish-args": ["--share=ipc"],
                "modules": [{"name": "x264"}, {"name": "ghb", "config-opts": ["--flatpak"]}]}"#,
        )
        .unwrap();
        let args = parse(&["-t", template.to_str().unwrap(), "-e", "-a", "hb.tar.bz2"]);
        let manifest = args.manifest().unwrap();
        let keys: Vec<&str> = manifest.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["app-id", "runtime", "finish-args", "modules", "sdk-extensions"]
        );
        let module = &manifest["modules"][1];
        assert_eq!(
            module["config-opts"],
            json!(["--flatpak", "--enable-nvenc", "--enable-nvdec"])
        );
        assert_eq!(module["build-options"]["append-path"], json!("/usr/lib/sdk/llvm14/bin"));
        assert_eq!(manifest["modules"][0], json!({"name": "x264"}));
    }

    #[test]
    fn plugin_carries_template_and_runtime_only() {
        let args = parse(&["-p", "-r", "23.08", "-a", "hb.tar.bz2", "-q"]);
        assert_eq!(args.manifest().unwrap(), json!({"runtime-version": "23.08"}));
    }

    #[test]
    fn renders_with_four_space_indent() {
        let text = render(&json!({"a": [1]})).unwrap();
        assert_eq!(text, "{\n    \"a\": [\n        1\n    ]\n}\n");
    }
}
