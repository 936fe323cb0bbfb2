//! Per-package metadata shards.
//!
//! Every package gets its own `repodata/perfile/<rpm>.{primary,filelists,
//! other,appstream}.xml` shard (plus an `.appstream-icons/` directory),
//! so only new or modified packages need re-inspection. A merge pass
//! concatenates the shards into the standard document set and finalizes
//! it in place.

use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::archive::ArchiveWriter;
use crate::errors::MdError;

use super::{
    finalize, package_documents, rpms_by_name, COMPONENTS_VERSION, NS_COMMON, NS_FILELISTS,
    NS_OTHER, NS_RPM,
};

/// One full per-file pass: drop stale shards, (re)extract shards for new
/// and modified packages, merge and finalize.
pub fn run(dir: &Path, cleanup_only: bool, origin: &str) -> Result<(), MdError> {
    let rpms = rpms_by_name(dir)?;
    cleanup(dir, &rpms)?;
    if cleanup_only {
        return Ok(());
    }

    for name in new_files(dir, &rpms) {
        if let Err(e) = extract_metadata(dir, &name) {
            error!("{}: {e}", dir.join(&name).display());
        }
    }
    for name in modified_files(dir, &rpms) {
        if let Err(e) = extract_metadata(dir, &name) {
            error!("{}: {e}", dir.join(&name).display());
        }
    }

    merge(dir, origin)?;
    finalize(&dir.join("repodata"))
}

fn perfile_dir(dir: &Path) -> PathBuf {
    dir.join("repodata/perfile")
}

/// Extract the metadata shards for a single package.
pub fn extract_metadata(dir: &Path, rpm_name: &str) -> Result<(), MdError> {
    let shard_dir = perfile_dir(dir);
    fs::create_dir_all(&shard_dir).map_err(|e| MdError::io(&shard_dir, e))?;

    let (primary, filelists, other, appstream) =
        package_documents(&dir.join(rpm_name), rpm_name)?;

    write_shard(&shard_dir, rpm_name, "primary.xml", &primary.to_fragment())?;
    write_shard(&shard_dir, rpm_name, "filelists.xml", &filelists.to_fragment())?;
    write_shard(&shard_dir, rpm_name, "other.xml", &other.to_fragment())?;

    let icons_dir = shard_dir.join(format!("{rpm_name}.appstream-icons"));
    if icons_dir.exists() {
        fs::remove_dir_all(&icons_dir).map_err(|e| MdError::io(&icons_dir, e))?;
    }
    if !appstream.is_empty() {
        let mut fragments = String::new();
        for component in &appstream.components {
            fragments.push_str(&component.to_fragment());
        }
        write_shard(&shard_dir, rpm_name, "appstream.xml", &fragments)?;

        for (key, data) in &appstream.icons {
            let icon_path = icons_dir.join(key);
            if let Some(parent) = icon_path.parent() {
                fs::create_dir_all(parent).map_err(|e| MdError::io(parent, e))?;
            }
            fs::write(&icon_path, data).map_err(|e| MdError::io(&icon_path, e))?;
        }
    } else {
        // the shard may still exist from a previous revision of the rpm
        let _ = fs::remove_file(shard_dir.join(format!("{rpm_name}.appstream.xml")));
    }
    Ok(())
}

fn write_shard(shard_dir: &Path, rpm_name: &str, kind: &str, content: &str) -> Result<(), MdError> {
    let path = shard_dir.join(format!("{rpm_name}.{kind}"));
    fs::write(&path, content).map_err(|e| MdError::io(&path, e))
}

/// Remove shards whose package no longer exists.
fn cleanup(dir: &Path, rpms: &[String]) -> Result<(), MdError> {
    let shard_dir = perfile_dir(dir);
    let entries = match fs::read_dir(&shard_dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()), // nothing sharded yet
    };
    let present: HashSet<&str> = rpms.iter().map(String::as_str).collect();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(position) = name.rfind(".rpm.") else {
            warn!("Non-metadata file in metadata directory: {name}");
            continue;
        };
        let rpm = &name[..position + 4];
        if !present.contains(rpm) {
            debug!("Stale metadata for: {rpm}");
            let result = if entry.path().is_dir() {
                fs::remove_dir_all(entry.path())
            } else {
                fs::remove_file(entry.path())
            };
            if let Err(e) = result {
                warn!("cannot remove stale shard {name}: {e}");
            }
        }
    }
    Ok(())
}

/// Packages without a primary shard yet.
fn new_files(dir: &Path, rpms: &[String]) -> Vec<String> {
    let shard_dir = perfile_dir(dir);
    rpms.iter()
        .filter(|rpm| !shard_dir.join(format!("{rpm}.primary.xml")).exists())
        .inspect(|rpm| debug!("New file: {rpm}"))
        .cloned()
        .collect()
}

/// Packages whose shard is older than the package file.
fn modified_files(dir: &Path, rpms: &[String]) -> Vec<String> {
    let shard_dir = perfile_dir(dir);
    let mut out = Vec::new();
    for rpm in rpms {
        let shard = shard_dir.join(format!("{rpm}.primary.xml"));
        let Ok(shard_meta) = fs::metadata(&shard) else {
            warn!("No metadata found for {rpm}");
            continue;
        };
        let Ok(rpm_meta) = fs::metadata(dir.join(rpm)) else {
            continue;
        };
        if shard_meta.mtime() < rpm_meta.mtime() {
            debug!("Modified file: {rpm}");
            out.push(rpm.clone());
        }
    }
    out
}

/// Concatenate the shards into the four standard documents plus the
/// icon tarball, written straight into `repodata/`.
fn merge(dir: &Path, origin: &str) -> Result<(), MdError> {
    let repodata = dir.join("repodata");
    let shard_dir = perfile_dir(dir);
    if !shard_dir.exists() {
        return Err(MdError::metadata(&shard_dir, "no per-file metadata"));
    }
    fs::create_dir_all(&repodata).map_err(|e| MdError::io(&repodata, e))?;

    merge_document(
        &repodata,
        &shard_dir,
        ".primary.xml",
        "primary.xml",
        &format!("<metadata xmlns=\"{NS_COMMON}\" xmlns:rpm=\"{NS_RPM}\""),
        "</metadata>",
        true,
    )?;
    merge_document(
        &repodata,
        &shard_dir,
        ".filelists.xml",
        "filelists.xml",
        &format!("<filelists xmlns=\"{NS_FILELISTS}\""),
        "</filelists>",
        true,
    )?;
    merge_document(
        &repodata,
        &shard_dir,
        ".other.xml",
        "other.xml",
        &format!("<otherdata xmlns=\"{NS_OTHER}\""),
        "</otherdata>",
        true,
    )?;
    merge_document(
        &repodata,
        &shard_dir,
        ".appstream.xml",
        "appstream.xml",
        &format!("<components origin=\"{origin}\" version=\"{COMPONENTS_VERSION}\""),
        "</components>",
        false,
    )?;

    let mut icons = ArchiveWriter::create(&repodata.join("appstream-icons.tar"))?;
    for icon_dir in shards(&shard_dir, ".appstream-icons")? {
        let root = shard_dir.join(&icon_dir);
        let mut files = Vec::new();
        collect_files(&root, "", &mut files)?;
        for relative in files {
            let path = root.join(&relative);
            match fs::read(&path) {
                Ok(data) => icons.add_file(&relative, &data)?,
                Err(e) => warn!("cannot read icon shard {}: {e}", path.display()),
            }
        }
    }
    icons.finish()
}

#[allow(clippy::too_many_arguments)]
fn merge_document(
    repodata: &Path,
    shard_dir: &Path,
    suffix: &str,
    out_name: &str,
    open_tag: &str,
    close_tag: &str,
    counted: bool,
) -> Result<(), MdError> {
    let shard_names = shards(shard_dir, suffix)?;
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(open_tag);
    if counted {
        out.push_str(&format!(" packages=\"{}\"", shard_names.len()));
    }
    out.push_str(">\n");
    for shard in &shard_names {
        let path = shard_dir.join(shard);
        match fs::read_to_string(&path) {
            Ok(content) => out.push_str(&content),
            Err(e) => warn!("cannot read shard {}: {e}", path.display()),
        }
    }
    out.push_str(close_tag);
    out.push('\n');

    let out_path = repodata.join(out_name);
    fs::write(&out_path, out).map_err(|e| MdError::io(&out_path, e))
}

/// Shard file names with the given suffix, sorted by name.
fn shards(shard_dir: &Path, suffix: &str) -> Result<Vec<String>, MdError> {
    let mut out = Vec::new();
    for entry in fs::read_dir(shard_dir).map_err(|e| MdError::io(shard_dir, e))? {
        let entry = entry.map_err(|e| MdError::io(shard_dir, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.ends_with(suffix) {
            out.push(name);
        }
    }
    out.sort();
    Ok(out)
}

fn collect_files(root: &Path, prefix: &str, out: &mut Vec<String>) -> Result<(), MdError> {
    let mut entries: Vec<_> = fs::read_dir(root)
        .map_err(|e| MdError::io(root, e))?
        .flatten()
        .collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        if entry.path().is_dir() {
            collect_files(&entry.path(), &relative, out)?;
        } else {
            out.push(relative);
        }
    }
    Ok(())
}
