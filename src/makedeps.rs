//! `makedeps`: turn the widget dependency list into the two lookup tables
//! the GTK front end loads at startup.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fsutil::write_atomic;

pub const TOOL: &str = "makedeps";
pub const FORWARD_FILE: &str = "widget.deps";
pub const REVERSE_FILE: &str = "widget_reverse.deps";

const BUILTIN: &str = include_str!("../data/widget-deps.toml");

#[derive(Parser, Debug, Clone)]
#[command(name = "makedeps")]
#[command(about = "Generate widget dependency tables.")]
pub struct MakedepsArgs {
    /// Read dependencies from FILE instead of the built-in list
    #[arg(short, long, value_name = "FILE")]
    pub list: Option<PathBuf>,

    /// Write widget.deps and widget_reverse.deps into DIR
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
    pub widget: String,
    pub dependent: String,
    pub enable: String,
    #[serde(default)]
    pub die: bool,
    #[serde(default)]
    pub hide: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DependencyList {
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<Dependency>,
}

impl DependencyList {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN).context("parsing built-in widget dependencies")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading dependency list '{}'", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("parsing dependency list '{}'", path.display()))
    }
}

/// `widget -> [dependent, ..]` and
/// `dependent -> [[widget, enable, die, hide], ..]`, both in list order.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyTables {
    pub forward: Map<String, Value>,
    pub reverse: Map<String, Value>,
}

impl DependencyTables {
    pub fn build(list: &DependencyList) -> Self {
        let mut forward = Map::new();
        let mut reverse = Map::new();
        for dep in &list.dependencies {
            let dependents = forward
                .entry(dep.widget.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = dependents {
                let name = Value::String(dep.dependent.clone());
                if !items.contains(&name) {
                    items.push(name);
                }
            }

            let sources = reverse
                .entry(dep.dependent.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = sources {
                items.push(json!([dep.widget, dep.enable, dep.die, dep.hide]));
            }
        }
        Self { forward, reverse }
    }

    /// Write both tables below `dir`; returns the written paths.
    pub fn write(&self, dir: &Path) -> Result<[PathBuf; 2]> {
        let forward = dir.join(FORWARD_FILE);
        let reverse = dir.join(REVERSE_FILE);
        for (path, table) in [(&forward, &self.forward), (&reverse, &self.reverse)] {
            let mut text = serde_json::to_string_pretty(table)?;
            text.push('\n');
            write_atomic(path, text.as_bytes())?;
        }
        Ok([forward, reverse])
    }
}

impl MakedepsArgs {
    pub fn run(&self) -> Result<[PathBuf; 2]> {
        let list = match &self.list {
            Some(path) => DependencyList::load(path)?,
            None => DependencyList::builtin()?,
        };
        log::debug!("{} widget dependencies", list.dependencies.len());
        DependencyTables::build(&list).write(&self.output)
    }
}
