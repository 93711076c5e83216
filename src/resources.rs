//! `create-resources`: bundle icons, JSON documents and text files named by
//! an XML resource list into a single JSON object.
//!
//! ```xml
//! <resources>
//!   <section name="icons">
//!     <icon name="hb-icon" file="icons/hb-icon.png"/>
//!   </section>
//!   <json name="presets" file="presets.json"/>
//!   <text name="license" file="../COPYING"/>
//! </resources>
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fsutil::write_atomic;

pub const TOOL: &str = "create-resources";

#[derive(Parser, Debug, Clone)]
#[command(name = "create-resources")]
#[command(about = "Bundle GTK resources into one JSON document.")]
pub struct ResourcesArgs {
    /// XML resource list
    #[arg(value_name = "LIST")]
    pub list: PathBuf,

    /// Output bundle
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
}

impl ResourcesArgs {
    pub fn run(&self) -> Result<Bundle> {
        let bundle = Bundle::load(&self.list)?;
        for warning in &bundle.warnings {
            log::warn!("{warning}");
        }
        bundle.write(&self.output)?;
        Ok(bundle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Resources,
    /// `true` when the section opened its own dictionary.
    Section(bool),
    Icon,
    Json,
    Text,
}

impl Tag {
    fn from_name(name: &[u8]) -> Option<Self> {
        Some(match name {
            b"resources" => Tag::Resources,
            b"section" => Tag::Section(false),
            b"icon" => Tag::Icon,
            b"json" => Tag::Json,
            b"text" => Tag::Text,
            _ => return None,
        })
    }

    fn same_kind(self, other: Tag) -> bool {
        std::mem::discriminant(&self) == std::mem::discriminant(&other)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub value: Value,
    pub warnings: Vec<String>,
}

struct ListParser<'a> {
    base: &'a Path,
    /// Open dictionaries; the bottom one is the bundle itself.
    dicts: Vec<(String, Map<String, Value>)>,
    tags: Vec<Tag>,
    closed_top: bool,
    warnings: Vec<String>,
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    match element.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

impl<'a> ListParser<'a> {
    fn new(base: &'a Path) -> Self {
        Self {
            base,
            dicts: vec![(String::new(), Map::new())],
            tags: Vec::new(),
            closed_top: false,
            warnings: Vec::new(),
        }
    }

    fn insert(&mut self, key: String, value: Value) {
        if let Some((_, dict)) = self.dicts.last_mut() {
            dict.insert(key, value);
        }
    }

    fn load_leaf(&self, tag: Tag, file: &str) -> Result<Value> {
        let path = self.base.join(file);
        let value = match tag {
            Tag::Icon => {
                let bytes =
                    fs::read(&path).with_context(|| format!("reading icon '{}'", path.display()))?;
                Value::String(data_encoding::BASE64.encode(&bytes))
            }
            Tag::Json => {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("reading '{}'", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing JSON resource '{}'", path.display()))?
            }
            _ => Value::String(
                fs::read_to_string(&path)
                    .with_context(|| format!("reading '{}'", path.display()))?,
            ),
        };
        Ok(value)
    }

    fn start(&mut self, element: &BytesStart<'_>) -> Result<()> {
        if self.closed_top {
            return Ok(());
        }
        let raw = element.name();
        let name = String::from_utf8_lossy(raw.as_ref()).into_owned();
        let Some(mut tag) = Tag::from_name(raw.as_ref()) else {
            self.warnings.push(format!("Unrecognized start tag ({name})"));
            return Ok(());
        };

        match tag {
            Tag::Resources => {}
            Tag::Section(_) => match attribute(element, "name")? {
                Some(section) => {
                    self.dicts.push((section, Map::new()));
                    tag = Tag::Section(true);
                }
                None => self
                    .warnings
                    .push(format!("{name}:missing a required attribute")),
            },
            Tag::Icon | Tag::Json | Tag::Text => {
                match (attribute(element, "name")?, attribute(element, "file")?) {
                    (Some(key), Some(file)) => {
                        let value = self.load_leaf(tag, &file)?;
                        self.insert(key, value);
                    }
                    _ => self
                        .warnings
                        .push(format!("{name}:missing a required attribute")),
                }
            }
        }
        self.tags.push(tag);
        Ok(())
    }

    fn end(&mut self, raw: &[u8]) {
        if self.closed_top {
            return;
        }
        let name = String::from_utf8_lossy(raw);
        let Some(tag) = Tag::from_name(raw) else {
            self.warnings.push(format!("Unrecognized end tag ({name})"));
            return;
        };
        let Some(open) = self.tags.pop() else {
            return;
        };
        if !open.same_kind(tag) {
            self.warnings
                .push(format!("start tag != end tag: ({name})"));
        }
        if open == Tag::Section(true) && self.dicts.len() > 1 {
            if let Some((key, dict)) = self.dicts.pop() {
                self.insert(key, Value::Object(dict));
            }
        }
        if self.tags.is_empty() {
            self.closed_top = true;
        }
    }

    fn finish(mut self) -> Bundle {
        while self.dicts.len() > 1 {
            if let Some((key, dict)) = self.dicts.pop() {
                self.insert(key, Value::Object(dict));
            }
        }
        let root = self.dicts.pop().map(|(_, dict)| dict).unwrap_or_default();
        Bundle {
            value: Value::Object(root),
            warnings: self.warnings,
        }
    }
}

impl Bundle {
    /// Parse `xml`; resource files resolve against `base`.
    pub fn parse(xml: &str, base: &Path) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut parser = ListParser::new(base);
        loop {
            match reader.read_event().context("parsing resource list")? {
                Event::Start(e) => parser.start(&e)?,
                Event::Empty(e) => {
                    parser.start(&e)?;
                    parser.end(e.name().as_ref());
                }
                Event::End(e) => parser.end(e.name().as_ref()),
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(parser.finish())
    }

    pub fn load(list: &Path) -> Result<Self> {
        let xml = fs::read_to_string(list)
            .with_context(|| format!("reading resource list '{}'", list.display()))?;
        let base = list.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&xml, base)
    }

    pub fn write(&self, output: &Path) -> Result<()> {
        let mut text = serde_json::to_string(&self.value)?;
        text.push('\n');
        write_atomic(output, text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("icons")).unwrap();
        fs::write(tmp.path().join("icons/hb.png"), b"\x89PNG").unwrap();
        fs::write(tmp.path().join("presets.json"), r#"{"b": 1, "a": [true]}"#).unwrap();
        fs::write(tmp.path().join("about.txt"), "HandBrake\n").unwrap();
        tmp
    }

    #[test]
    fn bundles_sections_and_leaves() {
        let tmp = fixture();
        let xml = r#"<?xml version="1.0"?>
<resources>
  <section name="icons">
    <icon name="hb-icon" file="icons/hb.png"/>
  </section>
  <json name="presets" file="presets.json"></json>
  <text name="about" file="about.txt"/>
</resources>
"#;
        let bundle = Bundle::parse(xml, tmp.path()).unwrap();
        assert!(bundle.warnings.is_empty());
        assert_eq!(
            bundle.value,
            json!({
                "icons": {"hb-icon": "iVBORw=="},
                "presets": {"b": 1, "a": [true]},
                "about": "HandBrake\n"
            })
        );
    }

    #[test]
    fn unknown_tags_and_missing_attributes_warn() {
        let tmp = fixture();
        let xml = r#"<resources><plist name="x" file="y"/><icon name="lonely"/></resources>"#;
        let bundle = Bundle::parse(xml, tmp.path()).unwrap();
        assert_eq!(bundle.value, json!({}));
        assert_eq!(
            bundle.warnings,
            vec![
                "Unrecognized start tag (plist)".to_string(),
                "Unrecognized end tag (plist)".to_string(),
                "icon:missing a required attribute".to_string(),
            ]
        );
    }

    #[test]
    fn content_after_top_element_is_ignored() {
        let tmp = fixture();
        let xml = r#"<resources><text name="about" file="about.txt"/></resources>
<text name="late" file="about.txt"/>"#;
        let bundle = Bundle::parse(xml, tmp.path()).unwrap();
        assert_eq!(bundle.value, json!({"about": "HandBrake\n"}));
    }

    #[test]
    fn load_resolves_relative_to_list() {
        let tmp = fixture();
        let list = tmp.path().join("resources.xml");
        fs::write(&list, r#"<resources><text name="about" file="about.txt"/></resources>"#).unwrap();
        let out = tmp.path().join("out/resources.json");
        let args = ResourcesArgs {
            list,
            output: out.clone(),
        };
        args.run().unwrap();
        let written: Value = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(written, json!({"about": "HandBrake\n"}));
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = fixture();
        let xml = r#"<resources><icon name="gone" file="nope.png"/></resources>"#;
        let err = Bundle::parse(xml, tmp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("reading icon"));
    }
}
