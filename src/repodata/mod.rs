//! Repository metadata generation.
//!
//! A pass stages its output in `.repodata.temp.<pid>` next to the final
//! `repodata/` directory and swaps it into place atomically at the end,
//! so a failed pass leaves the previous metadata untouched.

mod emit;
pub mod perfile;
mod update;

pub use update::update;

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::appstream;
use crate::archive::ArchiveWriter;
use crate::compression::{self, Format};
use crate::digest;
use crate::errors::MdError;
use crate::rpm::Rpm;
use crate::xml::Element;

pub(crate) const NS_COMMON: &str = "http://linux.duke.edu/metadata/common";
pub(crate) const NS_RPM: &str = "http://linux.duke.edu/metadata/rpm";
pub(crate) const NS_FILELISTS: &str = "http://linux.duke.edu/metadata/filelists";
pub(crate) const NS_OTHER: &str = "http://linux.duke.edu/metadata/other";
pub(crate) const NS_REPO: &str = "http://linux.duke.edu/metadata/repo";

pub(crate) const DEFAULT_ORIGIN: &str = "openmandriva";
pub(crate) const COMPONENTS_VERSION: &str = "0.14";

/// The five artifacts of a repodata set, in the order their `<data>`
/// entries appear in repomd.xml.
pub(crate) const ARTIFACTS: [(&str, &str, Format); 5] = [
    ("primary", ".xml", Format::Xz),
    ("filelists", ".xml", Format::Xz),
    ("other", ".xml", Format::Xz),
    ("appstream", ".xml", Format::Gzip),
    ("appstream-icons", ".tar", Format::Gzip),
];

/// Regenerate the metadata for a directory of rpm files from scratch.
pub fn create(dir: &Path) -> Result<(), MdError> {
    let rpms = rpms_by_name(dir)?;
    if rpms.is_empty() {
        return Err(MdError::NoPackages(dir.to_path_buf()));
    }

    let staging = staging_dir(dir);
    fs::create_dir_all(&staging).map_err(|e| MdError::io(&staging, e))?;
    let result = create_into(dir, &rpms, &staging);
    if result.is_err() {
        let _ = fs::remove_dir_all(&staging);
        return result;
    }
    swap_repodata(dir, &staging)
}

fn create_into(dir: &Path, rpms: &[String], staging: &Path) -> Result<(), MdError> {
    let mut primary = Element::new("metadata");
    primary.set_attr("xmlns", NS_COMMON);
    primary.set_attr("xmlns:rpm", NS_RPM);
    let mut filelists = Element::new("filelists");
    filelists.set_attr("xmlns", NS_FILELISTS);
    let mut other = Element::new("otherdata");
    other.set_attr("xmlns", NS_OTHER);
    let mut components = Element::new("components");
    components.set_attr("origin", DEFAULT_ORIGIN);
    components.set_attr("version", COMPONENTS_VERSION);

    let mut icons = ArchiveWriter::create(&staging.join("appstream-icons.tar"))?;

    let mut count: u64 = 0;
    for name in rpms {
        let path = dir.join(name);
        match package_documents(&path, name) {
            Ok((primary_entry, filelists_entry, other_entry, appstream)) => {
                primary.push_element(primary_entry);
                filelists.push_element(filelists_entry);
                other.push_element(other_entry);
                for component in appstream.components {
                    components.push_element(component);
                }
                for (key, data) in &appstream.icons {
                    icons.add_file(key, data)?;
                }
                count += 1;
            }
            Err(e) => error!("{}: {e}", path.display()),
        }
    }

    primary.set_attr("packages", count.to_string());
    filelists.set_attr("packages", count.to_string());
    other.set_attr("packages", count.to_string());

    write_document(staging, "primary.xml", &primary)?;
    write_document(staging, "filelists.xml", &filelists)?;
    write_document(staging, "other.xml", &other)?;
    write_document(staging, "appstream.xml", &components)?;
    icons.finish()?;

    finalize(staging)
}

type PackageDocuments = (Element, Element, Element, appstream::AppstreamData);

/// All document fragments for one package.
pub(crate) fn package_documents(path: &Path, href: &str) -> Result<PackageDocuments, MdError> {
    let rpm = Rpm::new(path)?;
    let primary = emit::primary_package(&rpm, href)?;
    let filelists = emit::filelists_package(&rpm)?;
    let other = emit::other_package(&rpm)?;
    let appstream = appstream::synthesize(&rpm, true)?;
    Ok((primary, filelists, other, appstream))
}

pub(crate) fn write_document(dir: &Path, name: &str, root: &Element) -> Result<(), MdError> {
    let path = dir.join(name);
    fs::write(&path, root.to_document()).map_err(|e| MdError::io(&path, e))
}

/// Compress the staged artifacts, rename them to their checksum-prefixed
/// final names, write repomd.xml and drop the uncompressed staging files
/// (plus compressed leftovers of any earlier pass over this directory).
pub(crate) fn finalize(staging: &Path) -> Result<(), MdError> {
    let stale = compressed_artifacts(staging)?;

    for (name, ext, format) in ARTIFACTS {
        let source = staging.join(format!("{name}{ext}"));
        if !compression::compress_file(&source, format, None)? {
            return Err(MdError::metadata(&source, "missing staged artifact"));
        }
    }

    struct Artifact {
        name: &'static str,
        open_sum: String,
        compressed_sum: String,
        location: String,
        timestamp: u64,
        size: u64,
        open_size: u64,
    }

    let mut artifacts = Vec::with_capacity(ARTIFACTS.len());
    for (name, ext, format) in ARTIFACTS {
        let open_path = staging.join(format!("{name}{ext}"));
        let compressed_path = staging.join(format!("{name}{ext}{}", format.extension()));
        let open_sum = digest::sha256_hex(&open_path)?;
        let compressed_sum = digest::sha256_hex(&compressed_path)?;
        let final_name = format!("{compressed_sum}-{name}{ext}{}", format.extension());
        let final_path = staging.join(&final_name);
        fs::rename(&compressed_path, &final_path).map_err(|e| MdError::io(&final_path, e))?;

        let open_meta = fs::metadata(&open_path).map_err(|e| MdError::io(&open_path, e))?;
        let final_meta = fs::metadata(&final_path).map_err(|e| MdError::io(&final_path, e))?;
        artifacts.push(Artifact {
            name,
            open_sum,
            compressed_sum,
            location: format!("repodata/{final_name}"),
            timestamp: final_meta.mtime().max(0) as u64,
            size: final_meta.len(),
            open_size: open_meta.len(),
        });
    }

    let mut repomd = Element::new("repomd");
    repomd.set_attr("xmlns", NS_REPO);
    repomd.set_attr("xmlns:rpm", NS_RPM);
    repomd.push_element(Element::with_text("revision", &now_epoch().to_string()));
    for artifact in &artifacts {
        let mut data = Element::new("data");
        data.set_attr("type", artifact.name);
        let mut checksum = Element::new("checksum");
        checksum.set_attr("type", "sha256");
        checksum.push_text(&artifact.compressed_sum);
        data.push_element(checksum);
        let mut open_checksum = Element::new("open-checksum");
        open_checksum.set_attr("type", "sha256");
        open_checksum.push_text(&artifact.open_sum);
        data.push_element(open_checksum);
        let mut location = Element::new("location");
        location.set_attr("href", &artifact.location);
        data.push_element(location);
        data.push_element(Element::with_text(
            "timestamp",
            &artifact.timestamp.to_string(),
        ));
        data.push_element(Element::with_text("size", &artifact.size.to_string()));
        data.push_element(Element::with_text(
            "open-size",
            &artifact.open_size.to_string(),
        ));
        repomd.push_element(data);
    }
    write_document(staging, "repomd.xml", &repomd)?;

    for (name, ext, _) in ARTIFACTS {
        let open_path = staging.join(format!("{name}{ext}"));
        if let Err(e) = fs::remove_file(&open_path) {
            warn!("cannot remove staged {}: {e}", open_path.display());
        }
    }
    // an unchanged artifact keeps its checksum name, so the "stale" file
    // may be the one just written
    let current: Vec<PathBuf> = artifacts
        .iter()
        .map(|a| staging.join(a.location.trim_start_matches("repodata/")))
        .collect();
    for path in stale {
        if current.contains(&path) {
            continue;
        }
        debug!("removing stale artifact {}", path.display());
        if let Err(e) = fs::remove_file(&path) {
            warn!("cannot remove stale {}: {e}", path.display());
        }
    }
    Ok(())
}

/// Previously compressed artifacts (`*.xz`, `*.gz`) in `dir`.
fn compressed_artifacts(dir: &Path) -> Result<Vec<PathBuf>, MdError> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| MdError::io(dir, e))? {
        let entry = entry.map_err(|e| MdError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".xz") || name.ends_with(".gz") {
            out.push(entry.path());
        }
    }
    Ok(out)
}

pub(crate) fn staging_dir(dir: &Path) -> PathBuf {
    dir.join(format!(".repodata.temp.{}", std::process::id()))
}

pub(crate) fn swap_repodata(dir: &Path, staging: &Path) -> Result<(), MdError> {
    let repodata = dir.join("repodata");
    if repodata.exists() {
        fs::remove_dir_all(&repodata).map_err(|e| MdError::io(&repodata, e))?;
    }
    fs::rename(staging, &repodata).map_err(|e| MdError::io(&repodata, e))
}

pub(crate) fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Readable `*.rpm` file names in `dir`, sorted by name.
pub(crate) fn rpms_by_name(dir: &Path) -> Result<Vec<String>, MdError> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| MdError::io(dir, e))? {
        let entry = entry.map_err(|e| MdError::io(dir, e))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            warn!("skipping non-UTF-8 file name in {}", dir.display());
            continue;
        };
        if name.ends_with(".rpm") {
            out.push(name);
        }
    }
    out.sort();
    Ok(out)
}

/// Readable `*.rpm` files in `dir` with their mtimes, newest first.
pub(crate) fn rpms_by_mtime(dir: &Path) -> Result<Vec<(String, u64)>, MdError> {
    let mut out = Vec::new();
    for name in rpms_by_name(dir)? {
        let meta = match fs::metadata(dir.join(&name)) {
            Ok(m) => m,
            Err(_) => continue,
        };
        out.push((name, meta.mtime().max(0) as u64));
    }
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(out)
}
