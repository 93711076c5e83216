//! The configuration document rendered as GNU make and m4 variables.

use anyhow::Result;
use std::fmt::{Display, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use crate::console::Console;
use crate::fsutil::write_atomic;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("element not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Element {
    Var {
        name: String,
        value: String,
        append: bool,
    },
    Blank,
    Make(String),
    M4(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Make,
    M4,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    elements: Vec<Element>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, value: impl Display) {
        self.elements.push(Element::Var {
            name: name.to_string(),
            value: value.to_string(),
            append: false,
        });
    }

    /// `NAME += VALUE` in make output.
    pub fn append(&mut self, name: &str, value: impl Display) {
        self.elements.push(Element::Var {
            name: name.to_string(),
            value: value.to_string(),
            append: true,
        });
    }

    pub fn add_blank(&mut self) {
        self.elements.push(Element::Blank);
    }

    pub fn add_comment(&mut self, text: &str) {
        self.add_make(format!("## {text}"));
        self.add_m4(format!("dnl {text}"));
    }

    pub fn add_make(&mut self, line: impl Into<String>) {
        self.elements.push(Element::Make(line.into()));
    }

    pub fn add_m4(&mut self, line: impl Into<String>) {
        self.elements.push(Element::M4(line.into()));
    }

    /// Replace the value of the first element named `name`.
    pub fn update(&mut self, name: &str, value: impl Display) -> Result<(), DocumentError> {
        for element in &mut self.elements {
            if let Element::Var { name: n, value: v, .. } = element {
                if n == name {
                    *v = value.to_string();
                    return Ok(());
                }
            }
        }
        Err(DocumentError::NotFound(name.to_string()))
    }

    /// Value of the first element named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.elements.iter().find_map(|element| match element {
            Element::Var { name: n, value, .. } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    fn name_width(&self) -> usize {
        self.elements
            .iter()
            .filter_map(|element| match element {
                Element::Var { name, .. } => Some(name.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    pub fn render(&self, kind: DocKind) -> String {
        match kind {
            DocKind::Make => self.render_make(),
            DocKind::M4 => self.render_m4(),
        }
    }

    pub fn render_make(&self) -> String {
        let width = self.name_width();
        let mut out = String::new();
        for element in &self.elements {
            match element {
                Element::Blank => out.push('\n'),
                Element::Make(line) => {
                    let _ = writeln!(out, "{line}");
                }
                Element::M4(_) => {}
                Element::Var { name, value, append } => {
                    let op = if *append { "+=" } else { " =" };
                    if value.is_empty() {
                        let _ = writeln!(out, "{name:<width$} {op}");
                    } else {
                        let _ = writeln!(out, "{name:<width$} {op} {value}");
                    }
                }
            }
        }
        out
    }

    pub fn render_m4(&self) -> String {
        let width = self.name_width() + 7;
        let mut out = String::new();
        for element in &self.elements {
            match element {
                Element::Blank => out.push_str("dnl\n"),
                Element::M4(line) => {
                    let _ = writeln!(out, "{line}");
                }
                Element::Make(_) => {}
                Element::Var { name, value, .. } => {
                    let key = format!("<<__{}>>,", name.replace('.', "_"));
                    let _ = writeln!(out, "define({key:<width$}  <<{value}>>)dnl");
                }
            }
        }
        out
    }

    /// Write `GNUmakefile` or `project/<project>.m4` below `build_dir`.
    pub fn write(
        &self,
        kind: DocKind,
        build_dir: &Path,
        project_lower: &str,
        console: &mut Console,
    ) -> Result<PathBuf> {
        let relative = match kind {
            DocKind::Make => PathBuf::from("GNUmakefile"),
            DocKind::M4 => Path::new("project").join(format!("{project_lower}.m4")),
        };
        let path = build_dir.join(&relative);
        if let Some(parent) = relative.parent().filter(|p| !p.as_os_str().is_empty()) {
            let dir = build_dir.join(parent);
            if !dir.exists() {
                console.info(format!("mkdir: {}\n", parent.display()));
                fs::create_dir_all(&dir)?;
            }
        }
        console.info(format!("write: {}\n", relative.display()));
        write_atomic(&path, self.render(kind).as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Verbosity;

    fn sample() -> ConfigDocument {
        let mut doc = ConfigDocument::new();
        doc.add_comment("generated by configure");
        doc.add_blank();
        doc.add("HB.name", "HandBrake");
        doc.add("HB.version.suffix", "");
        doc.add_make("include $(SRC/)make/include/main.defs");
        doc.append("LIBHB.GCC.D", "ARCH_X86_64");
        doc
    }

    #[test]
    fn make_output_pads_names() {
        assert_eq!(
            sample().render_make(),
            "## generated by configure\n\
             \n\
             HB.name            = HandBrake\n\
             HB.version.suffix  =\n\
             include $(SRC/)make/include/main.defs\n\
             LIBHB.GCC.D       += ARCH_X86_64\n"
        );
    }

    #[test]
    fn m4_output_mangles_names() {
        let m4 = sample().render_m4();
        let lines: Vec<&str> = m4.lines().collect();
        assert_eq!(lines[0], "dnl generated by configure");
        assert_eq!(lines[1], "dnl");
        assert_eq!(lines[2], "define(<<__HB_name>>,            <<HandBrake>>)dnl");
        assert_eq!(lines[3], "define(<<__HB_version_suffix>>,  <<>>)dnl");
        assert_eq!(lines[4], "define(<<__LIBHB_GCC_D>>,        <<ARCH_X86_64>>)dnl");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn update_replaces_or_errors() {
        let mut doc = sample();
        doc.update("HB.name", "Other").unwrap();
        assert_eq!(doc.get("HB.name"), Some("Other"));
        assert_eq!(
            doc.update("NOPE", 1),
            Err(DocumentError::NotFound("NOPE".to_string()))
        );
    }

    #[test]
    fn write_places_both_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut console = Console::captured("configure", Verbosity::Info);
        let doc = sample();
        let make = doc.write(DocKind::Make, tmp.path(), "handbrake", &mut console).unwrap();
        let m4 = doc.write(DocKind::M4, tmp.path(), "handbrake", &mut console).unwrap();
        assert_eq!(make, tmp.path().join("GNUmakefile"));
        assert_eq!(m4, tmp.path().join("project/handbrake.m4"));
        assert_eq!(fs::read_to_string(&make).unwrap(), doc.render_make());
        assert_eq!(
            console.captured_text(),
            "write: GNUmakefile\nmkdir: project\nwrite: project/handbrake.m4\n"
        );
    }
}
