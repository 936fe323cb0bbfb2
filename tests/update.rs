mod common;

use common::{artifact_checksums, bump_mtime, hello_package, read_artifact, read_artifact_doc};
use createmd::repodata;

#[test]
fn update_without_changes_keeps_checksums_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    hello_package().write_to_dir(dir.path());

    repodata::create(dir.path()).expect("createmd");
    let before = artifact_checksums(dir.path());

    repodata::update(dir.path()).expect("createmd --update");
    let after = artifact_checksums(dir.path());

    assert_eq!(before, after);
}

#[test]
fn touched_package_only_updates_file_time() {
    let dir = tempfile::tempdir().unwrap();
    let rpm_path = hello_package().write_to_dir(dir.path());
    repodata::create(dir.path()).expect("createmd");

    let old_primary = read_artifact_doc(dir.path(), "primary");
    let old_checksum = old_primary
        .child("package")
        .unwrap()
        .child("checksum")
        .unwrap()
        .text();

    bump_mtime(&rpm_path, 5);
    repodata::update(dir.path()).expect("createmd --update");

    let primary = read_artifact_doc(dir.path(), "primary");
    assert_eq!(primary.attr("packages"), Some("1"));
    let packages: Vec<_> = primary.children_named("package").collect();
    assert_eq!(packages.len(), 1);
    // same content, same pkgid, refreshed time/@file
    assert_eq!(packages[0].child("checksum").unwrap().text(), old_checksum);
    let new_file_ts: u64 = packages[0]
        .child("time")
        .unwrap()
        .attr("file")
        .unwrap()
        .parse()
        .unwrap();
    let disk_ts = std::fs::metadata(&rpm_path).unwrap().modified().unwrap();
    let disk_ts = disk_ts
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    assert_eq!(new_file_ts, disk_ts);
}

#[test]
fn modified_package_is_removed_and_readded() {
    let dir = tempfile::tempdir().unwrap();
    let rpm_path = hello_package().write_to_dir(dir.path());
    repodata::create(dir.path()).expect("createmd");

    let old_checksum = read_artifact_doc(dir.path(), "primary")
        .child("package")
        .unwrap()
        .child("checksum")
        .unwrap()
        .text();

    // same name, different content
    let mut replacement = hello_package();
    replacement.description = "hello description, now improved".to_string();
    std::fs::write(&rpm_path, replacement.build()).unwrap();
    bump_mtime(&rpm_path, 5);

    repodata::update(dir.path()).expect("createmd --update");

    let primary = read_artifact_doc(dir.path(), "primary");
    assert_eq!(primary.attr("packages"), Some("1"));
    let packages: Vec<_> = primary.children_named("package").collect();
    assert_eq!(packages.len(), 1);
    let new_checksum = packages[0].child("checksum").unwrap().text();
    assert_ne!(new_checksum, old_checksum);
    assert_eq!(new_checksum, createmd::digest::sha256_hex(&rpm_path).unwrap());
    assert_eq!(
        packages[0].child("description").unwrap().text(),
        "hello description, now improved"
    );

    // filelists/other were rewritten under the new pkgid too
    let filelists = read_artifact_doc(dir.path(), "filelists");
    assert_eq!(filelists.attr("packages"), Some("1"));
    assert_eq!(
        filelists.child("package").unwrap().attr("pkgid"),
        Some(new_checksum.as_str())
    );
}

#[test]
fn removed_package_disappears_from_all_documents() {
    let dir = tempfile::tempdir().unwrap();
    let rpm_path = hello_package().write_to_dir(dir.path());
    repodata::create(dir.path()).expect("createmd");

    // the icon made it into the tarball
    let icons = common::read_artifact(dir.path(), "appstream-icons");
    let entries = createmd::archive::read_entries(&icons).unwrap();
    assert!(entries.iter().any(|e| e.name == "64x64/hello.png"));

    std::fs::remove_file(&rpm_path).unwrap();
    repodata::update(dir.path()).expect("createmd --update");

    for doc in ["primary", "filelists", "other"] {
        let root = read_artifact_doc(dir.path(), doc);
        assert_eq!(root.attr("packages"), Some("0"), "{doc} count");
        assert_eq!(root.children_named("package").count(), 0, "{doc} entries");
    }
    let components = read_artifact_doc(dir.path(), "appstream");
    assert_eq!(components.children_named("component").count(), 0);

    // cached icons were dropped from the rebuilt tarball
    let icons = read_artifact(dir.path(), "appstream-icons");
    let entries = createmd::archive::read_entries(&icons).unwrap();
    assert!(entries.is_empty());
}

#[test]
fn new_package_is_appended() {
    let dir = tempfile::tempdir().unwrap();
    hello_package().write_to_dir(dir.path());
    repodata::create(dir.path()).expect("createmd");

    let extra = common::TestPackage::new("extra", "2.0", "1", "x86_64").with_file(
        common::TestFile::regular("/usr/bin/extra", 0o100755, b"extra"),
    );
    let extra_path = extra.write_to_dir(dir.path());
    bump_mtime(&extra_path, 5);

    repodata::update(dir.path()).expect("createmd --update");

    let primary = read_artifact_doc(dir.path(), "primary");
    assert_eq!(primary.attr("packages"), Some("2"));
    let names: Vec<String> = primary
        .children_named("package")
        .map(|p| p.child("name").unwrap().text())
        .collect();
    assert!(names.contains(&"hello".to_string()));
    assert!(names.contains(&"extra".to_string()));
}

#[test]
fn update_without_prior_repodata_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    hello_package().write_to_dir(dir.path());
    assert!(repodata::update(dir.path()).is_err());
    assert!(!dir.path().join("repodata").exists());
}
