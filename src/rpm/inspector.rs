//! The RPM inspector: everything repodata generation asks of a package.
//!
//! One [`Rpm`] is constructed per package file. It parses the lead, the
//! signature header and the main header up front, keeps the main header
//! for tag queries, and remembers where the headers start and end in the
//! file (`<rpm:header-range>` wants the raw byte offsets).

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::compression::{self, Format};
use crate::constants::*;
use crate::digest;
use crate::errors::MdError;
use crate::rpm::context;
use crate::rpm::headers::{Header, Lead};
use crate::rpm::payload::PayloadReader;

/// The eight dependency categories of an rpm header. Each maps to one
/// name/flags/version tag triple.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DepType {
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
    Recommends,
    Suggests,
    Supplements,
    Enhances,
}

impl DepType {
    pub const ALL: [DepType; 8] = [
        DepType::Provides,
        DepType::Requires,
        DepType::Conflicts,
        DepType::Obsoletes,
        DepType::Recommends,
        DepType::Suggests,
        DepType::Supplements,
        DepType::Enhances,
    ];

    /// Element name used in primary.xml (`rpm:provides`, ...).
    pub fn xml_tag(&self) -> &'static str {
        match self {
            DepType::Provides => "provides",
            DepType::Requires => "requires",
            DepType::Conflicts => "conflicts",
            DepType::Obsoletes => "obsoletes",
            DepType::Recommends => "recommends",
            DepType::Suggests => "suggests",
            DepType::Supplements => "supplements",
            DepType::Enhances => "enhances",
        }
    }

    fn tags(&self) -> (IndexTag, IndexTag, IndexTag) {
        use IndexTag::*;
        match self {
            DepType::Provides => (RPMTAG_PROVIDENAME, RPMTAG_PROVIDEFLAGS, RPMTAG_PROVIDEVERSION),
            DepType::Requires => (RPMTAG_REQUIRENAME, RPMTAG_REQUIREFLAGS, RPMTAG_REQUIREVERSION),
            DepType::Conflicts => {
                (RPMTAG_CONFLICTNAME, RPMTAG_CONFLICTFLAGS, RPMTAG_CONFLICTVERSION)
            }
            DepType::Obsoletes => {
                (RPMTAG_OBSOLETENAME, RPMTAG_OBSOLETEFLAGS, RPMTAG_OBSOLETEVERSION)
            }
            DepType::Recommends => {
                (RPMTAG_RECOMMENDNAME, RPMTAG_RECOMMENDFLAGS, RPMTAG_RECOMMENDVERSION)
            }
            DepType::Suggests => (RPMTAG_SUGGESTNAME, RPMTAG_SUGGESTFLAGS, RPMTAG_SUGGESTVERSION),
            DepType::Supplements => {
                (RPMTAG_SUPPLEMENTNAME, RPMTAG_SUPPLEMENTFLAGS, RPMTAG_SUPPLEMENTVERSION)
            }
            DepType::Enhances => (RPMTAG_ENHANCENAME, RPMTAG_ENHANCEFLAGS, RPMTAG_ENHANCEVERSION),
        }
    }
}

/// One dependency entry: name, sense flags, raw version string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dependency {
    pub name: String,
    pub flags: u64,
    pub version: String,
}

impl Dependency {
    /// The `flags=` attribute value for primary.xml, decoded from the
    /// low nibble of the sense flags. Anything unversioned or exotic
    /// suppresses the attribute.
    pub fn flags_attr(&self) -> Option<&'static str> {
        match self.flags & 0xf {
            2 => Some("LT"),
            4 => Some("GT"),
            8 => Some("EQ"),
            10 => Some("LE"),
            12 => Some("GE"),
            _ => None,
        }
    }

    /// Split the version string into `(epoch, ver, rel)`:
    /// `[epoch:]ver[-rel]`, absent parts as `None`.
    pub fn evr(&self) -> (Option<&str>, &str, Option<&str>) {
        parse_evr(&self.version)
    }
}

pub(crate) fn parse_evr(version: &str) -> (Option<&str>, &str, Option<&str>) {
    let colon = version.find(':');
    let epoch = match colon {
        Some(c) if c > 0 => Some(&version[..c]),
        _ => None,
    };
    let start = colon.map_or(0, |c| c + 1);
    let (ver, rel) = match version.rfind('-') {
        Some(d) if d > 0 && d >= start => (&version[start..d], Some(&version[d + 1..])),
        _ => (&version[start..], None),
    };
    (epoch, ver, rel)
}

/// One file of the package: path, attribute flags and POSIX mode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileInfo {
    pub path: String,
    pub flags: FileFlags,
    pub mode: u32,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.mode & 0o170000 == 0o040000
    }

    pub fn is_ghost(&self) -> bool {
        self.flags.contains(FileFlags::GHOST)
    }

    /// Whether the file belongs in primary.xml. Executable regular
    /// files that are not shared libraries, plus everything under /etc.
    pub fn is_primary(&self) -> bool {
        let regular = self.mode & 0o170000 == 0o100000;
        (regular && self.mode & 0o111 != 0 && !self.path.contains(".so"))
            || self.path.starts_with("/etc/")
    }
}

/// Parsed view of one rpm file.
pub struct Rpm {
    path: PathBuf,
    header: Header<IndexTag>,
    file_size: u64,
    file_mtime: u64,
    headers_start: u64,
    headers_end: u64,
    sha256: OnceCell<String>,
}

impl Rpm {
    /// Open and parse a package. The file descriptor is closed again
    /// before this returns; only the parsed main header is retained.
    pub fn new(path: &Path) -> Result<Rpm, MdError> {
        let vs_flags = context::verify_flags();

        let file = File::open(path).map_err(|e| MdError::io(path, e))?;
        let meta = file.metadata().map_err(|e| MdError::io(path, e))?;
        let file_size = meta.len();
        let file_mtime = meta.mtime().max(0) as u64;

        let mut reader = BufReader::new(file);
        let mut lead_buf = [0u8; LEAD_SIZE as usize];
        reader.read_exact(&mut lead_buf)?;
        Lead::parse(&lead_buf)?;

        let signature = Header::<IndexSignatureTag>::parse_signature(&mut reader)?;
        // 96 byte lead + 16 byte signature index header + entries + data
        // + alignment, which is the 112 + sigsize + padding of the
        // on-disk layout.
        let headers_start = LEAD_SIZE as u64 + signature.padded_size() as u64;

        let header = Header::<IndexTag>::parse(&mut reader)?;
        let headers_end = headers_start + header.size() as u64;

        if !vs_flags.contains(context::VerifyFlags::NODIGESTS) {
            verify_header_digest(path, &signature, headers_start, headers_end)?;
        }

        Ok(Rpm {
            path: path.to_path_buf(),
            header,
            file_size,
            file_mtime,
            headers_start,
            headers_end,
            sha256: OnceCell::new(),
        })
    }

    fn header_str(&self, tag: IndexTag) -> &str {
        self.header.get_entry_data_as_str(tag).unwrap_or_default()
    }

    fn header_number(&self, tag: IndexTag) -> u64 {
        self.header.get_entry_data_as_number(tag).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_NAME)
    }

    /// Build architecture - except that rpm writes the build arch into
    /// source package headers, so `*.src.rpm` is forced to `src`.
    pub fn arch(&self) -> &str {
        let is_source = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.ends_with(".src.rpm"));
        if is_source {
            "src"
        } else {
            self.header_str(IndexTag::RPMTAG_ARCH)
        }
    }

    pub fn epoch(&self) -> u64 {
        self.header_number(IndexTag::RPMTAG_EPOCH)
    }

    pub fn version(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_VERSION)
    }

    pub fn release(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_RELEASE)
    }

    pub fn summary(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_SUMMARY)
    }

    pub fn description(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_DESCRIPTION)
    }

    pub fn packager(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_PACKAGER)
    }

    pub fn url(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_URL)
    }

    pub fn license(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_LICENSE)
    }

    pub fn vendor(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_VENDOR)
    }

    pub fn group(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_GROUP)
    }

    pub fn build_host(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_BUILDHOST)
    }

    pub fn source_rpm(&self) -> &str {
        self.header_str(IndexTag::RPMTAG_SOURCERPM)
    }

    /// Source package name: `sourcerpm` with `-VERSION-RELEASE.src.rpm`
    /// stripped (everything from the last two dashes on).
    pub fn source_package_name(&self) -> String {
        let mut name = self.source_rpm().to_string();
        if let Some(i) = name.rfind('-') {
            name.truncate(i);
        }
        if let Some(i) = name.rfind('-') {
            name.truncate(i);
        }
        name
    }

    pub fn build_time(&self) -> u64 {
        self.header_number(IndexTag::RPMTAG_BUILDTIME)
    }

    pub fn installed_size(&self) -> u64 {
        match self.header_number(IndexTag::RPMTAG_LONGSIZE) {
            0 => self.header_number(IndexTag::RPMTAG_SIZE),
            size => size,
        }
    }

    pub fn archive_size(&self) -> u64 {
        match self.header_number(IndexTag::RPMTAG_ARCHIVESIZE) {
            0 => self.header_number(IndexTag::RPMTAG_LONGARCHIVESIZE),
            size => size,
        }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn file_mtime(&self) -> u64 {
        self.file_mtime
    }

    pub fn headers_start(&self) -> u64 {
        self.headers_start
    }

    pub fn headers_end(&self) -> u64 {
        self.headers_end
    }

    /// SHA-256 of the whole file (the `pkgid`). Computed on first call,
    /// cached for the lifetime of the inspector.
    pub fn sha256(&self) -> Result<&str, MdError> {
        if let Some(cached) = self.sha256.get() {
            return Ok(cached);
        }
        let sum = digest::sha256_hex(&self.path)?;
        Ok(self.sha256.get_or_init(|| sum))
    }

    /// Dependencies of one category. The three parallel header arrays
    /// advance together; iteration ends when any of them runs out.
    pub fn dependencies(&self, kind: DepType) -> Vec<Dependency> {
        let (name_tag, flag_tag, version_tag) = kind.tags();
        let Ok(names) = self.header.get_entry_data_as_string_array(name_tag) else {
            return Vec::new();
        };
        let Ok(flags) = self.header.get_entry_data_as_u32_array(flag_tag) else {
            return Vec::new();
        };
        let Ok(versions) = self.header.get_entry_data_as_string_array(version_tag) else {
            return Vec::new();
        };
        names
            .iter()
            .zip(flags.iter())
            .zip(versions.iter())
            .map(|((name, flags), version)| Dependency {
                name: name.clone(),
                flags: *flags as u64,
                version: version.clone(),
            })
            .collect()
    }

    /// File list reconstructed from DIRNAMES/BASENAMES/DIRINDEXES,
    /// zipped against FILEFLAGS and FILEMODES. With `only_primary` the
    /// predicate of [`FileInfo::is_primary`] filters the result.
    pub fn file_list(&self, only_primary: bool) -> Vec<FileInfo> {
        let Ok(basenames) = self
            .header
            .get_entry_data_as_string_array(IndexTag::RPMTAG_BASENAMES)
        else {
            return Vec::new();
        };
        let Ok(dirnames) = self
            .header
            .get_entry_data_as_string_array(IndexTag::RPMTAG_DIRNAMES)
        else {
            return Vec::new();
        };
        let Ok(dirindexes) = self
            .header
            .get_entry_data_as_u32_array(IndexTag::RPMTAG_DIRINDEXES)
        else {
            return Vec::new();
        };
        let Ok(flags) = self
            .header
            .get_entry_data_as_u32_array(IndexTag::RPMTAG_FILEFLAGS)
        else {
            return Vec::new();
        };
        let Ok(modes) = self
            .header
            .get_entry_data_as_u16_array(IndexTag::RPMTAG_FILEMODES)
        else {
            return Vec::new();
        };

        basenames
            .iter()
            .zip(dirindexes.iter())
            .zip(flags.iter())
            .zip(modes.iter())
            .filter_map(|(((base, dirindex), flags), mode)| {
                let dir = dirnames.get(*dirindex as usize)?;
                let info = FileInfo {
                    path: format!("{dir}{base}"),
                    flags: FileFlags::from_bits_truncate(*flags),
                    mode: *mode as u32,
                };
                (!only_primary || info.is_primary()).then_some(info)
            })
            .collect()
    }

    /// Contents of files inside the rpm.
    ///
    /// Deliberately takes the whole wanted set at once: the payload is
    /// one compressed stream, so a single pass that grabs everything
    /// (and stops as soon as the set is complete) beats per-file random
    /// access by a long way on large packages.
    pub fn extract_files(&self, filenames: &[String]) -> Result<HashMap<String, Vec<u8>>, MdError> {
        let mut found = HashMap::new();
        if filenames.is_empty() {
            return Ok(found);
        }
        let wanted: HashSet<&str> = filenames.iter().map(String::as_str).collect();

        let format = self.header_str(IndexTag::RPMTAG_PAYLOADFORMAT);
        if !format.is_empty() && format != "cpio" {
            return Err(MdError::archive(
                &self.path,
                format!("unsupported payload format {format}"),
            ));
        }
        let compressor = match self.header_str(IndexTag::RPMTAG_PAYLOADCOMPRESSOR) {
            "" => Format::Gzip,
            name => Format::from_str(name)?,
        };

        let mut file = File::open(&self.path).map_err(|e| MdError::io(&self.path, e))?;
        file.seek(SeekFrom::Start(self.headers_end))
            .map_err(|e| MdError::io(&self.path, e))?;
        let decoder = compression::decoder(compressor, BufReader::new(file))?;
        let mut payload = PayloadReader::new(decoder);

        while let Some(entry) = payload
            .next_entry()
            .map_err(|e| MdError::archive(&self.path, e.to_string()))?
        {
            // rpm stores payload paths with a leading dot
            let name = entry.name.strip_prefix('.').unwrap_or(&entry.name);
            if wanted.contains(name) {
                let data = payload
                    .read_data(&entry)
                    .map_err(|e| MdError::archive(&self.path, e.to_string()))?;
                found.insert(name.to_string(), data);
                if found.len() == wanted.len() {
                    // no need to keep reading the archive
                    break;
                }
            } else {
                payload
                    .skip_data(&entry)
                    .map_err(|e| MdError::archive(&self.path, e.to_string()))?;
            }
        }
        Ok(found)
    }
}

fn verify_header_digest(
    path: &Path,
    signature: &Header<IndexSignatureTag>,
    headers_start: u64,
    headers_end: u64,
) -> Result<(), MdError> {
    let Ok(expected) = signature.get_entry_data_as_str(IndexSignatureTag::RPMSIGTAG_SHA256) else {
        return Ok(());
    };
    let mut file = File::open(path).map_err(|e| MdError::io(path, e))?;
    file.seek(SeekFrom::Start(headers_start))
        .map_err(|e| MdError::io(path, e))?;
    let mut region = vec![0u8; (headers_end - headers_start) as usize];
    file.read_exact(&mut region).map_err(|e| MdError::io(path, e))?;
    if !digest::sha256_hex_bytes(&region).eq_ignore_ascii_case(expected) {
        return Err(MdError::DigestMismatch);
    }
    Ok(())
}
