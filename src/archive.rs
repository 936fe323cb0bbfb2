//! Tar archive handling for the AppStream icon bundle.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::warn;

use crate::errors::MdError;

/// Writes a tar archive of regular files.
pub struct ArchiveWriter {
    builder: tar::Builder<File>,
}

impl ArchiveWriter {
    pub fn create(path: &Path) -> Result<Self, MdError> {
        let file = File::create(path).map_err(|e| MdError::io(path, e))?;
        Ok(ArchiveWriter {
            builder: tar::Builder::new(file),
        })
    }

    pub fn add_file(&mut self, name: &str, contents: &[u8]) -> Result<(), MdError> {
        self.add_file_with_mode(name, contents, 0o644)
    }

    pub fn add_file_with_mode(
        &mut self,
        name: &str,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), MdError> {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(mode);
        header.set_mtime(0);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        self.builder.append_data(&mut header, name, contents)?;
        Ok(())
    }

    pub fn finish(self) -> Result<(), MdError> {
        self.builder.into_inner()?;
        Ok(())
    }
}

/// One file read back out of a tar stream.
pub struct ArchiveEntry {
    pub name: String,
    pub mode: u32,
    pub data: Vec<u8>,
}

/// All regular-file entries of an uncompressed tar stream.
///
/// A leading `.` on entry names is stripped (rpm payloads and some tar
/// producers prefix paths that way). Entries that fail to extract are
/// skipped with a warning rather than failing the whole read.
pub fn read_entries(data: &[u8]) -> Result<Vec<ArchiveEntry>, MdError> {
    let mut archive = tar::Archive::new(data);
    let mut out = Vec::new();
    for entry in archive.entries()? {
        let mut entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping unreadable tar entry: {e}");
                continue;
            }
        };
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = match entry.path() {
            Ok(p) => p.to_string_lossy().into_owned(),
            Err(e) => {
                warn!("skipping tar entry with invalid path: {e}");
                continue;
            }
        };
        let name = name.strip_prefix('.').unwrap_or(&name).to_string();
        let mode = entry.header().mode().unwrap_or(0o644);
        let mut data = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry.read_to_end(&mut data) {
            warn!("skipping tar entry {name}: {e}");
            continue;
        }
        out.push(ArchiveEntry { name, mode, data });
    }
    Ok(out)
}
