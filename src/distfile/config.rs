//! `distfile.cfg`, written by configure and read by the distfile tools.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::fsutil::write_atomic;

pub const CONFIG_FILE: &str = "distfile.cfg";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DistfileConfig {
    pub disable_fetch: bool,
    pub disable_verify: bool,
    pub jobs: Option<u32>,
    /// `null` unless `--df-verbose` was given.
    pub verbosity: Option<u8>,
    pub accept_url: Vec<String>,
    pub deny_url: Vec<String>,
}

impl DistfileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("reading distfile config '{}'", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing distfile config '{}'", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = serde_json::to_string(self)?;
        text.push('\n');
        write_atomic(path, text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_use_dashes() {
        let cfg = DistfileConfig {
            disable_fetch: true,
            jobs: Some(4),
            accept_url: vec!["^https://".to_string()],
            ..DistfileConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(
            json,
            r#"{"disable-fetch":true,"disable-verify":false,"jobs":4,"verbosity":null,"accept-url":["^https://"],"deny-url":[]}"#
        );
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        let cfg = DistfileConfig {
            verbosity: Some(2),
            deny_url: vec!["example\\.org".to_string()],
            ..DistfileConfig::default()
        };
        cfg.save(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().ends_with("}\n"));
        assert_eq!(DistfileConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn missing_keys_default() {
        let cfg: DistfileConfig =
            serde_json::from_str(r#"{"jobs": null, "verbosity": null}"#).unwrap();
        assert_eq!(cfg, DistfileConfig::default());
    }
}
