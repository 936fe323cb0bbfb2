mod common;

use common::{hello_package, read_artifact_doc, read_repomd, TestFile, TestPackage};
use createmd::repodata;

#[test]
fn full_generate_produces_five_artifacts_in_order() {
    let dir = tempfile::tempdir().unwrap();
    hello_package().write_to_dir(dir.path());

    repodata::create(dir.path()).expect("createmd");

    let repomd = read_repomd(dir.path());
    assert_eq!(repomd.name, "repomd");
    assert!(repomd.child("revision").is_some());
    let types: Vec<&str> = repomd
        .children_named("data")
        .filter_map(|d| d.attr("type"))
        .collect();
    assert_eq!(
        types,
        ["primary", "filelists", "other", "appstream", "appstream-icons"]
    );
    for data in repomd.children_named("data") {
        assert!(data.child("checksum").is_some());
        assert!(data.child("open-checksum").is_some());
        assert!(data.child("timestamp").is_some());
        assert!(data.child("size").is_some());
        assert!(data.child("open-size").is_some());
        let href = data.child("location").and_then(|l| l.attr("href")).unwrap();
        assert!(href.starts_with("repodata/"));
        assert!(dir.path().join(href).exists());
    }

    // staging and uncompressed intermediates are gone
    let leftovers: Vec<String> = std::fs::read_dir(dir.path().join("repodata"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".xml") && n != "repomd.xml")
        .collect();
    assert!(leftovers.is_empty(), "staging leftovers: {leftovers:?}");
}

#[test]
fn primary_counts_and_checksums_are_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let rpm_path = hello_package().write_to_dir(dir.path());
    TestPackage::new("zlib", "2.0", "3", "x86_64")
        .with_file(TestFile::regular("/usr/bin/ztool", 0o100755, b"binary"))
        .write_to_dir(dir.path());

    repodata::create(dir.path()).expect("createmd");

    let primary = read_artifact_doc(dir.path(), "primary");
    assert_eq!(primary.name, "metadata");
    assert_eq!(primary.attr("packages"), Some("2"));
    let packages: Vec<_> = primary.children_named("package").collect();
    assert_eq!(packages.len(), 2);
    // name-sorted emission order
    let names: Vec<String> = packages
        .iter()
        .map(|p| p.child("name").unwrap().text())
        .collect();
    assert_eq!(names, ["hello", "zlib"]);

    let filelists = read_artifact_doc(dir.path(), "filelists");
    assert_eq!(filelists.name, "filelists");
    assert_eq!(filelists.attr("packages"), Some("2"));
    assert_eq!(filelists.children_named("package").count(), 2);
    let other = read_artifact_doc(dir.path(), "other");
    assert_eq!(other.name, "otherdata");
    assert_eq!(other.attr("packages"), Some("2"));
    assert_eq!(other.children_named("package").count(), 2);

    // pkgid is the file checksum and agrees across the documents
    let expected = createmd::digest::sha256_hex(&rpm_path).unwrap();
    let hello = packages
        .iter()
        .find(|p| p.child("name").unwrap().text() == "hello")
        .unwrap();
    assert_eq!(hello.child("checksum").unwrap().text(), expected);
    assert_eq!(hello.child("checksum").unwrap().attr("pkgid"), Some("YES"));
    let hello_filelists = filelists
        .children_named("package")
        .find(|p| p.attr("name") == Some("hello"))
        .unwrap();
    assert_eq!(hello_filelists.attr("pkgid"), Some(expected.as_str()));
    let hello_other = other
        .children_named("package")
        .find(|p| p.attr("name") == Some("hello"))
        .unwrap();
    assert_eq!(hello_other.attr("pkgid"), Some(expected.as_str()));
}

#[test]
fn primary_package_structure() {
    let dir = tempfile::tempdir().unwrap();
    hello_package().write_to_dir(dir.path());
    repodata::create(dir.path()).expect("createmd");

    let primary = read_artifact_doc(dir.path(), "primary");
    assert_eq!(primary.attr("xmlns"), Some("http://linux.duke.edu/metadata/common"));
    assert_eq!(
        primary.attr("xmlns:rpm"),
        Some("http://linux.duke.edu/metadata/rpm")
    );
    let package = primary.child("package").unwrap();
    assert_eq!(package.attr("type"), Some("rpm"));

    let children: Vec<&str> = package.elements().map(|e| e.name.as_str()).collect();
    assert_eq!(
        children,
        [
            "name",
            "arch",
            "version",
            "checksum",
            "summary",
            "description",
            "packager",
            "url",
            "time",
            "size",
            "location",
            "format"
        ]
    );

    let version = package.child("version").unwrap();
    assert_eq!(version.attr("epoch"), Some("0"));
    assert_eq!(version.attr("ver"), Some("1.0"));
    assert_eq!(version.attr("rel"), Some("1"));

    assert_eq!(
        package.child("location").unwrap().attr("href"),
        Some("hello-1.0-1.x86_64.rpm")
    );

    let format = package.child("format").unwrap();
    assert_eq!(format.child("rpm:license").unwrap().text(), "MIT");
    assert_eq!(format.child("rpm:sourcerpm").unwrap().text(), "hello-1.0-1.src.rpm");
    let header_range = format.child("rpm:header-range").unwrap();
    let start: u64 = header_range.attr("start").unwrap().parse().unwrap();
    let end: u64 = header_range.attr("end").unwrap().parse().unwrap();
    assert!(start > 96 && end > start);

    let provides = format.child("rpm:provides").unwrap();
    let entry = provides.child("rpm:entry").unwrap();
    assert_eq!(entry.attr("name"), Some("hello"));
    assert_eq!(entry.attr("flags"), Some("EQ"));
    assert_eq!(entry.attr("ver"), Some("1.0"));
    assert_eq!(entry.attr("rel"), Some("1"));
    // unversioned require suppresses flags and version attributes
    let requires = format.child("rpm:requires").unwrap();
    let libc = requires.child("rpm:entry").unwrap();
    assert_eq!(libc.attr("name"), Some("libc.so.6"));
    assert_eq!(libc.attr("flags"), None);
    assert_eq!(libc.attr("ver"), None);

    // primary carries only primary files
    let files: Vec<String> = format.children_named("file").map(|f| f.text()).collect();
    assert!(files.contains(&"/usr/bin/hello".to_string()));
    assert!(files.contains(&"/etc/hello.conf".to_string()));
    assert!(!files.contains(&"/usr/lib64/libhello.so.1".to_string()));

    // filelists carries everything
    let filelists = read_artifact_doc(dir.path(), "filelists");
    let files: Vec<String> = filelists
        .child("package")
        .unwrap()
        .children_named("file")
        .map(|f| f.text())
        .collect();
    assert!(files.contains(&"/usr/lib64/libhello.so.1".to_string()));
}

#[test]
fn xml_special_characters_are_escaped() {
    let dir = tempfile::tempdir().unwrap();
    let mut package = TestPackage::new("weird", "1.0", "1", "noarch");
    package.summary = "uses <angle> & \"quotes\"".to_string();
    package.description = "a < b && b > c".to_string();
    package.write_to_dir(dir.path());

    repodata::create(dir.path()).expect("createmd");

    let raw = common::read_artifact(dir.path(), "primary");
    let raw = String::from_utf8(raw).unwrap();
    assert!(raw.contains("uses &lt;angle&gt; &amp; \"quotes\""));
    assert!(!raw.contains("<angle>"));

    // and it still parses back to the original text
    let primary = read_artifact_doc(dir.path(), "primary");
    let package = primary.child("package").unwrap();
    assert_eq!(package.child("summary").unwrap().text(), "uses <angle> & \"quotes\"");
    assert_eq!(package.child("description").unwrap().text(), "a < b && b > c");
}

#[test]
fn empty_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = repodata::create(dir.path()).unwrap_err();
    assert!(matches!(err, createmd::MdError::NoPackages(_)));
    assert!(!dir.path().join("repodata").exists());
}

#[test]
fn unreadable_package_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    hello_package().write_to_dir(dir.path());
    std::fs::write(dir.path().join("broken-1-1.x86_64.rpm"), b"not an rpm").unwrap();

    repodata::create(dir.path()).expect("bad package must not abort the pass");

    let primary = read_artifact_doc(dir.path(), "primary");
    // the broken package is not counted and not listed
    assert_eq!(primary.attr("packages"), Some("1"));
    assert_eq!(primary.children_named("package").count(), 1);
}
