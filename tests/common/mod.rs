#![allow(dead_code)]

//! Shared fixtures: assemble real rpm byte streams (lead + signature
//! header + main header + gzip'd cpio payload) so the tests exercise
//! the same parsing paths production packages hit.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;

use createmd::digest;
use createmd::payload::PayloadWriter;
use createmd::xml::Element;
use createmd::{
    compression, DependencyFlags, Header, IndexData, IndexEntry, IndexSignatureTag, IndexTag, Lead,
};

pub struct TestFile {
    pub path: String,
    pub mode: u32,
    pub flags: u32,
    pub data: Vec<u8>,
}

impl TestFile {
    pub fn regular(path: &str, mode: u32, data: &[u8]) -> Self {
        TestFile {
            path: path.to_string(),
            mode,
            flags: 0,
            data: data.to_vec(),
        }
    }
}

pub struct TestPackage {
    pub name: String,
    pub epoch: Option<u32>,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub summary: String,
    pub description: String,
    pub license: String,
    pub group: String,
    pub packager: String,
    pub url: String,
    pub vendor: String,
    pub buildhost: String,
    pub source_rpm: String,
    pub build_time: u32,
    pub provides: Vec<(String, u32, String)>,
    pub requires: Vec<(String, u32, String)>,
    pub files: Vec<TestFile>,
}

impl TestPackage {
    pub fn new(name: &str, version: &str, release: &str, arch: &str) -> Self {
        TestPackage {
            name: name.to_string(),
            epoch: None,
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
            summary: format!("{name} summary"),
            description: format!("{name} description"),
            license: "MIT".to_string(),
            group: "Applications/System".to_string(),
            packager: "Test Packager <packager@example.org>".to_string(),
            url: "https://example.org".to_string(),
            vendor: "Example Vendor".to_string(),
            buildhost: "builder.example.org".to_string(),
            source_rpm: format!("{name}-{version}-{release}.src.rpm"),
            build_time: 1_700_000_000,
            provides: vec![(
                name.to_string(),
                DependencyFlags::EQUAL.bits(),
                format!("{version}-{release}"),
            )],
            requires: vec![("libc.so.6".to_string(), 0, String::new())],
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: TestFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.{}.rpm",
            self.name, self.version, self.release, self.arch
        )
    }

    pub fn write_to_dir(&self, dir: &Path) -> std::path::PathBuf {
        let path = dir.join(self.file_name());
        fs::write(&path, self.build()).expect("write rpm fixture");
        path
    }

    pub fn build(&self) -> Vec<u8> {
        // payload: gzip-compressed newc cpio, names with the leading
        // dot rpm uses
        let mut cpio = PayloadWriter::new(Vec::new());
        for file in &self.files {
            cpio.add_entry(&format!(".{}", file.path), file.mode, &file.data)
                .expect("cpio entry");
        }
        let cpio = cpio.finish().expect("cpio trailer");
        let mut gz = GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&cpio).expect("gzip payload");
        let payload = gz.finish().expect("gzip finish");

        let installed_size: u32 = self.files.iter().map(|f| f.data.len() as u32).sum();

        let mut entries = vec![
            string_entry(IndexTag::RPMTAG_NAME, &self.name),
            string_entry(IndexTag::RPMTAG_VERSION, &self.version),
            string_entry(IndexTag::RPMTAG_RELEASE, &self.release),
            string_entry(IndexTag::RPMTAG_ARCH, &self.arch),
            i18n_entry(IndexTag::RPMTAG_SUMMARY, &self.summary),
            i18n_entry(IndexTag::RPMTAG_DESCRIPTION, &self.description),
            string_entry(IndexTag::RPMTAG_LICENSE, &self.license),
            i18n_entry(IndexTag::RPMTAG_GROUP, &self.group),
            string_entry(IndexTag::RPMTAG_PACKAGER, &self.packager),
            string_entry(IndexTag::RPMTAG_URL, &self.url),
            string_entry(IndexTag::RPMTAG_VENDOR, &self.vendor),
            string_entry(IndexTag::RPMTAG_BUILDHOST, &self.buildhost),
            string_entry(IndexTag::RPMTAG_SOURCERPM, &self.source_rpm),
            IndexEntry::new(
                IndexTag::RPMTAG_BUILDTIME,
                0,
                IndexData::Int32(vec![self.build_time]),
            ),
            IndexEntry::new(IndexTag::RPMTAG_SIZE, 0, IndexData::Int32(vec![installed_size])),
            IndexEntry::new(
                IndexTag::RPMTAG_ARCHIVESIZE,
                0,
                IndexData::Int32(vec![cpio.len() as u32]),
            ),
            string_entry(IndexTag::RPMTAG_PAYLOADFORMAT, "cpio"),
            string_entry(IndexTag::RPMTAG_PAYLOADCOMPRESSOR, "gzip"),
        ];
        if let Some(epoch) = self.epoch {
            entries.push(IndexEntry::new(
                IndexTag::RPMTAG_EPOCH,
                0,
                IndexData::Int32(vec![epoch]),
            ));
        }

        if !self.files.is_empty() {
            let mut dirnames: Vec<String> = Vec::new();
            let mut dir_index: BTreeMap<String, u32> = BTreeMap::new();
            let mut basenames = Vec::new();
            let mut dirindexes = Vec::new();
            let mut fileflags = Vec::new();
            let mut filemodes = Vec::new();
            for file in &self.files {
                let (dir, base) = file.path.rsplit_once('/').expect("absolute path");
                let dir = format!("{dir}/");
                let index = *dir_index.entry(dir.clone()).or_insert_with(|| {
                    dirnames.push(dir.clone());
                    dirnames.len() as u32 - 1
                });
                basenames.push(base.to_string());
                dirindexes.push(index);
                fileflags.push(file.flags);
                filemodes.push(file.mode as u16);
            }
            entries.push(IndexEntry::new(
                IndexTag::RPMTAG_BASENAMES,
                0,
                IndexData::StringArray(basenames),
            ));
            entries.push(IndexEntry::new(
                IndexTag::RPMTAG_DIRNAMES,
                0,
                IndexData::StringArray(dirnames),
            ));
            entries.push(IndexEntry::new(
                IndexTag::RPMTAG_DIRINDEXES,
                0,
                IndexData::Int32(dirindexes),
            ));
            entries.push(IndexEntry::new(
                IndexTag::RPMTAG_FILEFLAGS,
                0,
                IndexData::Int32(fileflags),
            ));
            entries.push(IndexEntry::new(
                IndexTag::RPMTAG_FILEMODES,
                0,
                IndexData::Int16(filemodes),
            ));
        }

        push_dependencies(
            &mut entries,
            &self.provides,
            IndexTag::RPMTAG_PROVIDENAME,
            IndexTag::RPMTAG_PROVIDEFLAGS,
            IndexTag::RPMTAG_PROVIDEVERSION,
        );
        push_dependencies(
            &mut entries,
            &self.requires,
            IndexTag::RPMTAG_REQUIRENAME,
            IndexTag::RPMTAG_REQUIREFLAGS,
            IndexTag::RPMTAG_REQUIREVERSION,
        );

        let header = Header::from_entries(entries, IndexTag::RPMTAG_HEADERIMMUTABLE);
        let mut header_bytes = Vec::new();
        header.write(&mut header_bytes).expect("header bytes");

        let signature = Header::from_entries(
            vec![
                IndexEntry::new(
                    IndexSignatureTag::RPMSIGTAG_SIZE,
                    0,
                    IndexData::Int32(vec![(header_bytes.len() + payload.len()) as u32]),
                ),
                IndexEntry::new(
                    IndexSignatureTag::RPMSIGTAG_SHA256,
                    0,
                    IndexData::StringTag(digest::sha256_hex_bytes(&header_bytes)),
                ),
            ],
            IndexSignatureTag::HEADER_SIGNATURES,
        );

        let mut out = Vec::new();
        Lead::new(&format!("{}-{}-{}", self.name, self.version, self.release))
            .write(&mut out)
            .expect("lead");
        signature.write_signature(&mut out).expect("signature header");
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&payload);
        out
    }
}

fn string_entry(tag: IndexTag, value: &str) -> IndexEntry<IndexTag> {
    IndexEntry::new(tag, 0, IndexData::StringTag(value.to_string()))
}

fn i18n_entry(tag: IndexTag, value: &str) -> IndexEntry<IndexTag> {
    IndexEntry::new(tag, 0, IndexData::I18NString(vec![value.to_string()]))
}

fn push_dependencies(
    entries: &mut Vec<IndexEntry<IndexTag>>,
    deps: &[(String, u32, String)],
    name_tag: IndexTag,
    flag_tag: IndexTag,
    version_tag: IndexTag,
) {
    if deps.is_empty() {
        return;
    }
    entries.push(IndexEntry::new(
        name_tag,
        0,
        IndexData::StringArray(deps.iter().map(|d| d.0.clone()).collect()),
    ));
    entries.push(IndexEntry::new(
        flag_tag,
        0,
        IndexData::Int32(deps.iter().map(|d| d.1).collect()),
    ));
    entries.push(IndexEntry::new(
        version_tag,
        0,
        IndexData::StringArray(deps.iter().map(|d| d.2.clone()).collect()),
    ));
}

/// The canonical "hello" fixture: one binary, one config file, a shared
/// library, a desktop file and a 64x64 icon.
pub fn hello_package() -> TestPackage {
    TestPackage::new("hello", "1.0", "1", "x86_64")
        .with_file(TestFile::regular("/usr/bin/hello", 0o100755, b"#!/bin/sh\necho hello\n"))
        .with_file(TestFile::regular("/etc/hello.conf", 0o100644, b"greeting=hello\n"))
        .with_file(TestFile::regular(
            "/usr/lib64/libhello.so.1",
            0o100755,
            b"\x7fELF-not-really",
        ))
        .with_file(TestFile::regular(
            "/usr/share/applications/hello.desktop",
            0o100644,
            b"[Desktop Entry]\nName=Hello\nGenericName=Greeter\nIcon=hello\nCategories=Utility;\n",
        ))
        .with_file(TestFile::regular(
            "/usr/share/icons/hicolor/64x64/apps/hello.png",
            0o100644,
            b"\x89PNG-fake-icon-bytes",
        ))
}

/// Parse `repodata/repomd.xml` of `dir`.
pub fn read_repomd(dir: &Path) -> Element {
    let bytes = fs::read(dir.join("repodata/repomd.xml")).expect("repomd.xml");
    createmd::xml::parse(&bytes).expect("parse repomd.xml")
}

/// Decompressed bytes of the artifact of `data_type` (e.g. "primary").
pub fn read_artifact(dir: &Path, data_type: &str) -> Vec<u8> {
    let repomd = read_repomd(dir);
    let href = repomd
        .children_named("data")
        .find(|d| d.attr("type") == Some(data_type))
        .and_then(|d| d.child("location"))
        .and_then(|l| l.attr("href"))
        .unwrap_or_else(|| panic!("no {data_type} entry in repomd.xml"))
        .to_string();
    compression::decompress_file(&dir.join(href)).expect("decompress artifact")
}

/// Parsed document of the artifact of `data_type`.
pub fn read_artifact_doc(dir: &Path, data_type: &str) -> Element {
    createmd::xml::parse(&read_artifact(dir, data_type)).expect("parse artifact")
}

/// `<checksum>` text per data type, for byte-identity comparisons.
pub fn artifact_checksums(dir: &Path) -> BTreeMap<String, String> {
    let repomd = read_repomd(dir);
    repomd
        .children_named("data")
        .map(|d| {
            (
                d.attr("type").unwrap_or_default().to_string(),
                d.child("checksum").map(|c| c.text()).unwrap_or_default(),
            )
        })
        .collect()
}

/// Push a file's mtime a few seconds into the future so mtime-based
/// change detection sees it move even within one test second.
pub fn bump_mtime(path: &Path, seconds: u64) {
    let file = fs::OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open for utime");
    let new_time = std::time::SystemTime::now() + std::time::Duration::from_secs(seconds);
    file.set_modified(new_time).expect("set mtime");
}
