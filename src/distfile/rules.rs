//! URL accept/deny rules and `[key=value]` URL prefixes.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
struct Rule {
    spec: String,
    re: Regex,
}

/// Regex rules with search semantics: a rule matches anywhere in the URL.
#[derive(Debug, Clone, Default)]
pub struct UrlRules {
    accept: Vec<Rule>,
    deny: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub active: bool,
    pub rule: String,
}

fn compile(specs: &[String]) -> Result<Vec<Rule>> {
    specs
        .iter()
        .map(|spec| {
            Ok(Rule {
                spec: spec.clone(),
                re: Regex::new(spec).with_context(|| format!("invalid URL rule '{spec}'"))?,
            })
        })
        .collect()
}

impl UrlRules {
    pub fn new(accept: &[String], deny: &[String]) -> Result<Self> {
        Ok(Self {
            accept: compile(accept)?,
            deny: compile(deny)?,
        })
    }

    pub fn evaluate(&self, url: &str) -> Verdict {
        let mut verdict = Verdict {
            active: true,
            rule: "none".to_string(),
        };
        if !self.accept.is_empty() {
            match self.accept.iter().enumerate().find(|(_, r)| r.re.is_match(url)) {
                Some((i, rule)) => verdict.rule = format!("via accept rule {i}: {}", rule.spec),
                None => {
                    verdict.active = false;
                    verdict.rule = "no matching accept rule".to_string();
                }
            }
        }
        if let Some((i, rule)) = self.deny.iter().enumerate().find(|(_, r)| r.re.is_match(url)) {
            verdict.active = false;
            verdict.rule = format!("via deny rule {i}: {}", rule.spec);
        }
        verdict
    }
}

/// A URL argument with its optional `[key=value]` prefixes stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlSpec {
    pub url: String,
    pub props: Vec<(String, String)>,
}

fn prop_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\w+)=([^\]]+)\]").expect("static property regex"))
}

impl UrlSpec {
    pub fn parse(arg: &str) -> Self {
        let mut rest = arg;
        let mut props = Vec::new();
        while let Some(caps) = prop_regex().captures(rest) {
            props.push((caps[1].to_string(), caps[2].to_string()));
            rest = &rest[caps[0].len()..];
        }
        Self {
            url: rest.to_string(),
            props,
        }
    }
}
