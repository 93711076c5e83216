use std::fs;

use hb_buildtools::flatpak::{render, FlatpakArgs};
use hb_buildtools::makedeps::{MakedepsArgs, FORWARD_FILE, REVERSE_FILE};
use hb_buildtools::resources::ResourcesArgs;
use serde_json::{json, Value};

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn makedeps_from_custom_list() {
    let tmp = tempfile::TempDir::new().unwrap();
    let list = tmp.path().join("deps.toml");
    fs::write(
        &list,
        r#"
[[dependency]]
widget = "FileFormat"
dependent = "Mp4HttpOptimize"
enable = "av_mp4"

[[dependency]]
widget = "FileFormat"
dependent = "Mp4iPodCompatible"
enable = "av_mp4"
hide = true
"#,
    )
    .unwrap();
    let out = tmp.path().join("gen");
    MakedepsArgs {
        list: Some(list),
        output: out.clone(),
    }
    .run()
    .unwrap();

    assert_eq!(
        read_json(&out.join(FORWARD_FILE)),
        json!({"FileFormat": ["Mp4HttpOptimize", "Mp4iPodCompatible"]})
    );
    assert_eq!(
        read_json(&out.join(REVERSE_FILE))["Mp4iPodCompatible"],
        json!([["FileFormat", "av_mp4", false, true]])
    );
}

#[test]
fn resources_bundle_nested_sections() {
    let tmp = tempfile::TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("icons")).unwrap();
    fs::write(data.join("icons/queue.svg"), b"<svg/>").unwrap();
    fs::write(data.join("internal_defaults.json"), r#"{"Globals": {"use_dvdnav": false}}"#).unwrap();
    let list = data.join("resource_list.xml");
    fs::write(
        &list,
        r#"<resources>
    <section name="icons">
        <icon name="hb-queue" file="icons/queue.svg"/>
    </section>
    <json name="internal-defaults" file="internal_defaults.json"/>
</resources>"#,
    )
    .unwrap();
    let output = tmp.path().join("resources.json");
    let bundle = ResourcesArgs {
        list,
        output: output.clone(),
    }
    .run()
    .unwrap();

    assert!(bundle.warnings.is_empty());
    assert_eq!(
        read_json(&output),
        json!({
            "icons": {"hb-queue": "PHN2Zy8+"},
            "internal-defaults": {"Globals": {"use_dvdnav": false}}
        })
    );
}

#[test]
fn flatpak_manifest_written_to_destination() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dst = tmp.path().join("manifest.json");
    let args = FlatpakArgs::try_parse_ordered([
        "create-flatpak-manifest",
        "-a",
        "HandBrake-1.7.0-source.tar.bz2",
        "-r",
        "23.08",
        dst.to_str().unwrap(),
    ])
    .unwrap();
    args.run().unwrap();

    let text = fs::read_to_string(&dst).unwrap();
    let manifest: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(text, render(&manifest).unwrap());
    assert_eq!(
        manifest["modules"][0]["sources"][0]["path"],
        json!("HandBrake-1.7.0-source.tar.bz2")
    );
}

#[test]
fn flatpak_contrib_filename_is_unescaped() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dst = tmp.path().join("manifest.json");
    let hash = "ab".repeat(32);
    let args = FlatpakArgs::try_parse_ordered([
        "create-flatpak-manifest",
        "-c",
        "https://download.handbrake.fr/contrib/lib%20foo-1.0.tar.gz",
        "-s",
        hash.as_str(),
        dst.to_str().unwrap(),
    ])
    .unwrap();
    args.run().unwrap();

    let manifest = read_json(&dst);
    let source = &manifest["modules"][0]["sources"][0];
    assert_eq!(source["dest-filename"], json!("lib foo-1.0.tar.gz"));
    assert_eq!(
        source["url"],
        json!("https://download.handbrake.fr/contrib/lib%20foo-1.0.tar.gz")
    );
}
