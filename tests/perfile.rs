mod common;

use common::{hello_package, read_artifact_doc, read_repomd};
use createmd::repodata::perfile;

#[test]
fn perfile_pass_builds_shards_and_merges() {
    let dir = tempfile::tempdir().unwrap();
    hello_package().write_to_dir(dir.path());

    perfile::run(dir.path(), false, "test-origin").expect("createmd-perfile");

    // shards exist under repodata/perfile
    let shard_dir = dir.path().join("repodata/perfile");
    for suffix in ["primary.xml", "filelists.xml", "other.xml", "appstream.xml"] {
        assert!(
            shard_dir.join(format!("hello-1.0-1.x86_64.rpm.{suffix}")).exists(),
            "missing {suffix} shard"
        );
    }
    assert!(shard_dir
        .join("hello-1.0-1.x86_64.rpm.appstream-icons/64x64/hello.png")
        .exists());

    // the merged set looks like a regular repodata
    let repomd = read_repomd(dir.path());
    let types: Vec<&str> = repomd
        .children_named("data")
        .filter_map(|d| d.attr("type"))
        .collect();
    assert_eq!(
        types,
        ["primary", "filelists", "other", "appstream", "appstream-icons"]
    );

    let primary = read_artifact_doc(dir.path(), "primary");
    assert_eq!(primary.attr("packages"), Some("1"));
    assert_eq!(
        primary.child("package").unwrap().child("name").unwrap().text(),
        "hello"
    );

    let components = read_artifact_doc(dir.path(), "appstream");
    assert_eq!(components.attr("origin"), Some("test-origin"));
    assert_eq!(components.attr("version"), Some("0.14"));
    assert_eq!(components.children_named("component").count(), 1);

    let icons = common::read_artifact(dir.path(), "appstream-icons");
    let entries = createmd::archive::read_entries(&icons).unwrap();
    assert!(entries.iter().any(|e| e.name == "64x64/hello.png"));
}

#[test]
fn rerun_reuses_shards_and_cleanup_drops_stale_ones() {
    let dir = tempfile::tempdir().unwrap();
    let rpm_path = hello_package().write_to_dir(dir.path());

    perfile::run(dir.path(), false, "openmandriva").expect("first pass");
    let shard = dir
        .path()
        .join("repodata/perfile/hello-1.0-1.x86_64.rpm.primary.xml");
    let first_mtime = std::fs::metadata(&shard).unwrap().modified().unwrap();

    // unchanged package: shard is not regenerated
    perfile::run(dir.path(), false, "openmandriva").expect("second pass");
    assert_eq!(
        std::fs::metadata(&shard).unwrap().modified().unwrap(),
        first_mtime
    );

    // package removed: cleanup-only drops every shard of it
    std::fs::remove_file(&rpm_path).unwrap();
    perfile::run(dir.path(), true, "openmandriva").expect("cleanup");
    assert!(!shard.exists());
    assert!(!dir
        .path()
        .join("repodata/perfile/hello-1.0-1.x86_64.rpm.appstream-icons")
        .exists());
}

#[test]
fn modified_package_regenerates_its_shard() {
    let dir = tempfile::tempdir().unwrap();
    let rpm_path = hello_package().write_to_dir(dir.path());
    perfile::run(dir.path(), false, "openmandriva").expect("first pass");

    let mut replacement = hello_package();
    replacement.summary = "updated summary".to_string();
    std::fs::write(&rpm_path, replacement.build()).unwrap();
    common::bump_mtime(&rpm_path, 5);

    perfile::run(dir.path(), false, "openmandriva").expect("second pass");

    let shard = std::fs::read_to_string(
        dir.path()
            .join("repodata/perfile/hello-1.0-1.x86_64.rpm.primary.xml"),
    )
    .unwrap();
    assert!(shard.contains("updated summary"));

    let primary = read_artifact_doc(dir.path(), "primary");
    assert_eq!(
        primary.child("package").unwrap().child("summary").unwrap().text(),
        "updated summary"
    );
}
