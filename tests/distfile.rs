use std::fs;
use std::path::Path;

use clap::Parser;
use hb_buildtools::console::{Console, Verbosity};
use hb_buildtools::distfile::config::DistfileConfig;
use hb_buildtools::distfile::fetch::{self, DefaultTransport, FetchArgs, FetchError, Prepared};
use hb_buildtools::distfile::verify;

const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn prepare(args: &[&str]) -> Prepared {
    FetchArgs::try_parse_from(std::iter::once("df-fetch").chain(args.iter().copied()))
        .unwrap()
        .prepare()
        .unwrap()
}

#[test]
fn fetch_falls_back_to_second_url_then_verifies() {
    let tmp = tempfile::TempDir::new().unwrap();
    let upstream = tmp.path().join("hello.tar.gz");
    fs::write(&upstream, b"hello").unwrap();
    let output = tmp.path().join("download/hello.tar.gz");
    let missing = file_url(&tmp.path().join("mirror/hello.tar.gz"));
    let good = file_url(&upstream);

    let Prepared::Run(request, verbosity) = prepare(&[
        "--sha256",
        &HELLO_SHA256.to_uppercase(),
        "--output",
        output.to_str().unwrap(),
        &missing,
        &good,
    ]) else {
        panic!("expected a runnable request");
    };
    let mut console = Console::captured(fetch::TOOL, verbosity);
    let transport = DefaultTransport::new().unwrap();
    fetch::fetch(&request, &transport, &mut console).unwrap();

    assert_eq!(fs::read(&output).unwrap(), b"hello");
    let text = console.captured_text();
    assert!(text.contains("download failure;"));
    assert!(text.contains(&format!("SHA256 ({}) = {HELLO_SHA256} (pass)", output.display())));

    let mut console = Console::captured(verify::TOOL, Verbosity::Info);
    let hash = verify::verify(&output, Some(HELLO_SHA256), &mut console).unwrap();
    assert_eq!(hash, HELLO_SHA256);
}

#[test]
fn hash_mismatch_leaves_no_output() {
    let tmp = tempfile::TempDir::new().unwrap();
    let upstream = tmp.path().join("hello.tar.gz");
    fs::write(&upstream, b"hello").unwrap();
    let output = tmp.path().join("out.tar.gz");
    let url = file_url(&upstream);

    let Prepared::Run(request, verbosity) = prepare(&[
        "--sha256",
        "00",
        "--output",
        output.to_str().unwrap(),
        &url,
    ]) else {
        panic!("expected a runnable request");
    };
    let mut console = Console::captured(fetch::TOOL, verbosity);
    let err = fetch::fetch(&request, &DefaultTransport::new().unwrap(), &mut console).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::HashMismatch { .. })
    ));
    assert!(!output.exists());
    let leftovers: Vec<_> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".tmp."))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn config_rules_deny_every_url() {
    let tmp = tempfile::TempDir::new().unwrap();
    let cfg = tmp.path().join("distfile.cfg");
    DistfileConfig {
        deny_url: vec!["^file://".to_string()],
        verbosity: Some(1),
        ..DistfileConfig::default()
    }
    .save(&cfg)
    .unwrap();

    let url = file_url(&tmp.path().join("x.tar.gz"));
    let Prepared::Run(request, verbosity) = prepare(&["--config", cfg.to_str().unwrap(), &url])
    else {
        panic!("expected a runnable request");
    };
    assert_eq!(verbosity, Verbosity::Verbose);
    let mut console = Console::captured(fetch::TOOL, verbosity);
    let err = fetch::fetch(&request, &DefaultTransport::new().unwrap(), &mut console).unwrap_err();
    assert_eq!(err.to_string(), "no active URLs");
    assert!(console
        .captured_text()
        .contains("  rule:   via deny rule 0: ^file://\n"));
}

#[test]
fn disabled_and_usage() {
    assert!(matches!(prepare(&["--disable", "file:///x"]), Prepared::Disabled));
    assert!(matches!(prepare(&[]), Prepared::Usage));
}
