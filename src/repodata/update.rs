//! Incremental metadata update.
//!
//! Instead of re-inspecting the whole directory, the prior repodata
//! documents are loaded and patched: entries for removed or modified
//! packages are dropped, entries for new packages are appended, and a
//! package whose bytes are unchanged (same pkgid) only gets its file
//! timestamp refreshed.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::archive::{self, ArchiveWriter};
use crate::compression;
use crate::digest;
use crate::errors::MdError;
use crate::xml::{self, Element, XmlNode};

use super::{
    finalize, package_documents, rpms_by_mtime, staging_dir, swap_repodata, write_document,
};

struct PriorMetadata {
    primary: Element,
    filelists: Element,
    other: Element,
    components: Element,
    icons_path: Option<PathBuf>,
    last_ts: u64,
}

/// Update the metadata of `dir` against an existing `repodata/`.
pub fn update(dir: &Path) -> Result<(), MdError> {
    let mut prior = load_prior(dir)?;

    let mut touched: HashSet<String> = HashSet::new();
    let mut icons_to_remove: HashSet<String> = HashSet::new();
    let mut count_change: i64 = 0;

    reconcile_existing(
        dir,
        &mut prior,
        &mut touched,
        &mut icons_to_remove,
        &mut count_change,
    );

    let mut icons_to_add: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for (name, mtime) in rpms_by_mtime(dir)? {
        if mtime <= prior.last_ts {
            // older than the previous metadata, and the list is sorted
            // newest first - done
            break;
        }
        if touched.contains(&name) {
            continue;
        }
        let path = dir.join(&name);
        match package_documents(&path, &name) {
            Ok((primary_entry, filelists_entry, other_entry, appstream)) => {
                prior.primary.push_element(primary_entry);
                prior.filelists.push_element(filelists_entry);
                prior.other.push_element(other_entry);
                for component in appstream.components {
                    prior.components.push_element(component);
                }
                icons_to_add.extend(appstream.icons);
                count_change += 1;
            }
            Err(e) => error!("{}: {e}", path.display()),
        }
    }

    bump_package_count(&mut prior.primary, count_change);
    bump_package_count(&mut prior.filelists, count_change);
    bump_package_count(&mut prior.other, count_change);

    let staging = staging_dir(dir);
    fs::create_dir_all(&staging).map_err(|e| MdError::io(&staging, e))?;
    let result = stage_documents(&prior, &staging, &icons_to_remove, &icons_to_add);
    if result.is_err() {
        let _ = fs::remove_dir_all(&staging);
        return result;
    }
    swap_repodata(dir, &staging)
}

fn load_prior(dir: &Path) -> Result<PriorMetadata, MdError> {
    let repomd_path = dir.join("repodata/repomd.xml");
    let repomd_bytes = fs::read(&repomd_path).map_err(|e| MdError::io(&repomd_path, e))?;
    let repomd = xml::parse(&repomd_bytes)
        .map_err(|e| MdError::metadata(&repomd_path, format!("unparseable repomd.xml: {e}")))?;
    if repomd.name != "repomd" {
        return Err(MdError::metadata(
            &repomd_path,
            format!("document element is \"{}\", not \"repomd\"", repomd.name),
        ));
    }

    let mut documents: Vec<(String, Element)> = Vec::new();
    let mut icons_path = None;
    let mut last_ts: u64 = 0;
    for data in repomd.children_named("data") {
        let Some(data_type) = data.attr("type") else {
            continue;
        };
        if data_type == "primary" {
            last_ts = data
                .child("timestamp")
                .and_then(|t| t.text().parse().ok())
                .unwrap_or(0);
        }
        let href = data
            .child("location")
            .and_then(|l| l.attr("href"))
            .ok_or_else(|| {
                MdError::metadata(&repomd_path, format!("no valid location data for {data_type}"))
            })?;
        let artifact = dir.join(href);
        if data_type == "appstream-icons" {
            // no metadata in there we care about, remember the path only
            icons_path = Some(artifact);
            continue;
        }
        let bytes = compression::decompress_file(&artifact)?;
        let document = xml::parse(&bytes)
            .map_err(|e| MdError::metadata(&artifact, format!("XML parser failed: {e}")))?;
        documents.push((data_type.to_string(), document));
    }
    if last_ts == 0 {
        warn!(
            "prior repomd.xml in {} has no valid timestamp, assuming mtime",
            dir.display()
        );
        last_ts = fs::metadata(&repomd_path)
            .map(|m| m.mtime().max(0) as u64)
            .unwrap_or(0);
    }

    let mut take = |wanted_type: &str, root_name: &str| -> Result<Element, MdError> {
        let position = documents
            .iter()
            .position(|(t, _)| t == wanted_type)
            .ok_or_else(|| {
                MdError::metadata(&repomd_path, format!("no {wanted_type} data entry"))
            })?;
        let (_, document) = documents.remove(position);
        if document.name != root_name {
            return Err(MdError::metadata(
                &repomd_path,
                format!("prior {wanted_type} has root \"{}\", not \"{root_name}\"", document.name),
            ));
        }
        Ok(document)
    };

    Ok(PriorMetadata {
        primary: take("primary", "metadata")?,
        filelists: take("filelists", "filelists")?,
        other: take("other", "otherdata")?,
        components: take("appstream", "components")?,
        icons_path,
        last_ts,
    })
}

/// Walk the prior primary entries and compare them against the
/// directory: drop entries for packages that vanished or changed
/// content, refresh the timestamp of entries whose bytes are untouched.
fn reconcile_existing(
    dir: &Path,
    prior: &mut PriorMetadata,
    touched: &mut HashSet<String>,
    icons_to_remove: &mut HashSet<String>,
    count_change: &mut i64,
) {
    let mut kept = Vec::with_capacity(prior.primary.children.len());
    for node in std::mem::take(&mut prior.primary.children) {
        let XmlNode::Element(mut package) = node else {
            kept.push(node);
            continue;
        };
        if package.name != "package" {
            kept.push(XmlNode::Element(package));
            continue;
        }
        let href = package
            .child("location")
            .and_then(|l| l.attr("href"))
            .unwrap_or("")
            .to_string();
        if href.is_empty() {
            warn!("package without location tag in old primary.xml, ignoring the package");
            kept.push(XmlNode::Element(package));
            continue;
        }

        let package_path = dir.join(&href);
        let meta = fs::metadata(&package_path).ok();
        let old_ts: u64 = package
            .child("time")
            .and_then(|t| t.attr("file"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        if let Some(meta) = &meta {
            if meta.mtime().max(0) as u64 == old_ts {
                // everything as expected
                kept.push(XmlNode::Element(package));
                continue;
            }
        }

        // the package has been removed or changed
        let old_checksum = package
            .children_named("checksum")
            .find(|c| {
                c.attr("pkgid")
                    .map(|v| v.eq_ignore_ascii_case("yes"))
                    .unwrap_or(false)
            })
            .map(|c| c.text())
            .unwrap_or_default();

        if let Some(meta) = &meta {
            if let Ok(checksum) = digest::sha256_hex(&package_path) {
                if checksum == old_checksum {
                    // same bytes, only the timestamp moved
                    let mtime = meta.mtime().max(0) as u64;
                    if let Some(time) = package.child_mut("time") {
                        time.set_attr("file", mtime.to_string());
                    }
                    touched.insert(href);
                    kept.push(XmlNode::Element(package));
                    continue;
                }
            }
        }

        // modified or deleted - drop the metadata here and let the scan
        // for new files recreate it if the package still exists
        let name = package.child("name").map(|e| e.text()).unwrap_or_default();
        remove_package_entry(&mut prior.filelists, &old_checksum);
        remove_package_entry(&mut prior.other, &old_checksum);
        remove_components(&mut prior.components, &name, icons_to_remove);
        *count_change -= 1;
    }
    prior.primary.children = kept;
}

fn stage_documents(
    prior: &PriorMetadata,
    staging: &Path,
    icons_to_remove: &HashSet<String>,
    icons_to_add: &BTreeMap<String, Vec<u8>>,
) -> Result<(), MdError> {
    write_document(staging, "primary.xml", &prior.primary)?;
    write_document(staging, "filelists.xml", &prior.filelists)?;
    write_document(staging, "other.xml", &prior.other)?;
    write_document(staging, "appstream.xml", &prior.components)?;

    let staged_tar = staging.join("appstream-icons.tar");
    if icons_to_remove.is_empty() && icons_to_add.is_empty() {
        // finalize still needs the uncompressed stream for the
        // open-checksum, so restage the old tarball as-is
        match &prior.icons_path {
            Some(path) => {
                let data = compression::decompress_file(path)?;
                fs::write(&staged_tar, data).map_err(|e| MdError::io(&staged_tar, e))?;
            }
            None => ArchiveWriter::create(&staged_tar)?.finish()?,
        }
    } else {
        let mut out = ArchiveWriter::create(&staged_tar)?;
        if let Some(path) = &prior.icons_path {
            let data = compression::decompress_file(path)?;
            for entry in archive::read_entries(&data)? {
                if icons_to_remove.contains(&entry.name) || icons_to_add.contains_key(&entry.name) {
                    continue;
                }
                out.add_file(&entry.name, &entry.data)?;
            }
        }
        for (name, data) in icons_to_add {
            out.add_file(name, data)?;
        }
        out.finish()?;
    }

    finalize(staging)
}

/// Drop the first `<package pkgid="...">` entry matching `pkgid`.
fn remove_package_entry(root: &mut Element, pkgid: &str) -> bool {
    let position = root.children.iter().position(
        |node| matches!(node, XmlNode::Element(e) if e.name == "package" && e.attr("pkgid") == Some(pkgid)),
    );
    match position {
        Some(index) => {
            root.children.remove(index);
            true
        }
        None => false,
    }
}

/// Drop every component of `pkgname` (a package may ship several
/// desktop files) and note their cached icons for removal.
fn remove_components(
    root: &mut Element,
    pkgname: &str,
    icons_to_remove: &mut HashSet<String>,
) -> bool {
    let removed = root.remove_elements_where(|element| {
        element.name == "component"
            && element
                .child("pkgname")
                .map(|p| p.text())
                .unwrap_or_default()
                == pkgname
    });
    for component in &removed {
        for icon in component.children_named("icon") {
            if icon.attr("type") == Some("cached") {
                icons_to_remove.insert(icon.text());
            }
        }
    }
    !removed.is_empty()
}

fn bump_package_count(root: &mut Element, delta: i64) {
    let current: i64 = root
        .attr("packages")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    root.set_attr("packages", (current + delta).max(0).to_string());
}

#[cfg(test)]
mod test {
    use super::*;

    fn component(pkgname: &str, icon: Option<&str>) -> Element {
        let mut c = Element::new("component");
        c.set_attr("type", "desktop");
        c.push_element(Element::with_text("pkgname", pkgname));
        if let Some(icon) = icon {
            let mut i = Element::new("icon");
            i.set_attr("type", "cached");
            i.push_text(icon);
            c.push_element(i);
        }
        c
    }

    #[test]
    fn remove_components_collects_cached_icons() {
        let mut root = Element::new("components");
        root.push_element(component("hello", Some("64x64/hello.png")));
        root.push_element(component("hello", Some("128x128/hello.png")));
        root.push_element(component("other", Some("64x64/other.png")));

        let mut icons = HashSet::new();
        assert!(remove_components(&mut root, "hello", &mut icons));
        assert_eq!(root.children_named("component").count(), 1);
        assert!(icons.contains("64x64/hello.png"));
        assert!(icons.contains("128x128/hello.png"));
        assert!(!icons.contains("64x64/other.png"));
    }

    #[test]
    fn remove_package_entry_matches_pkgid() {
        let mut root = Element::new("filelists");
        let mut package = Element::new("package");
        package.set_attr("pkgid", "abc");
        root.push_element(package);

        assert!(!remove_package_entry(&mut root, "zzz"));
        assert!(remove_package_entry(&mut root, "abc"));
        assert_eq!(root.children_named("package").count(), 0);
    }

    #[test]
    fn bump_count_saturates_at_zero() {
        let mut root = Element::new("metadata");
        root.set_attr("packages", "2");
        bump_package_count(&mut root, -3);
        assert_eq!(root.attr("packages"), Some("0"));
        bump_package_count(&mut root, 4);
        assert_eq!(root.attr("packages"), Some("4"));
    }
}
