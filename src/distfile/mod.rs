//! Distfile download and verification.

pub mod config;
pub mod fetch;
pub mod rules;
pub mod verify;

use std::path::Path;

/// Read size for downloads and scans.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// `<verb> N bytes; SHA256 (<file>) = <hex>` with an optional
/// `(pass)`/`(fail; expecting ..)` suffix. The flag is true when no hash
/// was expected or the hashes agree.
pub fn hash_summary(
    verb: &str,
    total: u64,
    file: Option<&Path>,
    actual: &str,
    expected: Option<&str>,
) -> (String, bool) {
    let mut line = format!("{verb} {total} bytes");
    match file {
        Some(file) => line.push_str(&format!("; SHA256 ({}) = {actual}", file.display())),
        None => line.push_str(&format!("; SHA256 = {actual}")),
    }
    let pass = match expected {
        Some(expected) => {
            let pass = expected.eq_ignore_ascii_case(actual);
            if pass {
                line.push_str(" (pass)");
            } else {
                line.push_str(&format!(" (fail; expecting {expected})"));
            }
            pass
        }
        None => true,
    };
    (line, pass)
}
