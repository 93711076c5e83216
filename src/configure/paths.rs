//! Lexical path arithmetic for the directory variables.
//!
//! Nothing here touches the filesystem apart from reading the current
//! directory; symlinks are not resolved.

use anyhow::{Context, Result};
use std::env;
use std::path::{Component, Path, PathBuf};

/// Collapse `.`, `..` and redundant separators. An empty result is `.`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = env::current_dir().context("reading current directory")?;
    Ok(normalize(&cwd.join(path)))
}

/// `path` expressed relative to `start`.
pub fn relpath(path: &Path, start: &Path) -> Result<PathBuf> {
    let path = absolute(path)?;
    let start = absolute(start)?;
    let path_parts: Vec<Component<'_>> = path.components().collect();
    let start_parts: Vec<Component<'_>> = start.components().collect();
    let common = path_parts
        .iter()
        .zip(&start_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..start_parts.len() {
        rel.push("..");
    }
    for part in &path_parts[common..] {
        rel.push(part.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    Ok(rel)
}

/// Where `dir` is found after changing into `chdir`.
///
/// Absolute directories stay absolute. A relative `dir` becomes relative
/// to `chdir`, unless `chdir` itself is absolute, in which case `dir` is
/// made absolute.
pub fn final_dir(chdir: &Path, dir: &Path) -> Result<PathBuf> {
    let dir = normalize(dir);
    if dir.is_absolute() {
        return Ok(dir);
    }
    if chdir.is_absolute() {
        return absolute(&dir);
    }
    Ok(normalize(&relpath(&dir, chdir)?))
}

/// `path` with a trailing separator, as make's `DIR/` variables expect.
pub fn with_slash(path: &Path) -> String {
    let text = path.display().to_string();
    if text.ends_with(std::path::MAIN_SEPARATOR) {
        text
    } else {
        format!("{text}{}", std::path::MAIN_SEPARATOR)
    }
}
