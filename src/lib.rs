//! Build tooling for the HandBrake source tree.
//!
//! - **configure** - Probe the host, select build modes and write
//!   `GNUmakefile` plus `project/handbrake.m4`
//! - **distfile** - Download (`df-fetch`) and verify (`df-verify`)
//!   third-party source archives against SHA-256 hashes
//! - **makedeps** - Widget dependency tables for the GTK front end
//! - **resources** - Bundle GTK resources into one JSON document
//! - **flatpak** - Flatpak manifest generation
//!
//! # Architecture
//!
//! ```text
//! bin/configure ──► configure ──► action / tools / version (probes)
//!                        │       select / repo / project (computed state)
//!                        │       document (GNUmakefile, m4)
//!                        └─────► distfile::config (distfile.cfg)
//!
//! bin/df-fetch  ──► distfile::fetch ──► distfile::rules
//! bin/df-verify ──► distfile::verify
//! ```

pub mod configure;
pub mod console;
pub mod distfile;
pub mod flatpak;
pub mod fsutil;
pub mod makedeps;
pub mod platform;
pub mod resources;
