//! RPM specific constants
//!
//! Tag numbers were extracted from the rpm upstream project C headers.
//! Only the tags this tool queries are listed.

use std::fmt::Display;

use bitflags::bitflags;

pub const HEADER_SIGNATURES: u32 = 62;
pub const HEADER_IMMUTABLE: u32 = 63;
pub const HEADER_TAGBASE: u32 = 1000;
pub const RPMTAG_SIG_BASE: u32 = 256;

#[repr(u32)]
#[derive(
    num_derive::FromPrimitive,
    num_derive::ToPrimitive,
    Debug,
    PartialEq,
    Eq,
    Copy,
    Clone,
    enum_display_derive::Display,
)]
#[allow(non_camel_case_types)]
pub enum IndexTag {
    RPMTAG_HEADERIMMUTABLE = HEADER_IMMUTABLE,

    RPMTAG_LONGARCHIVESIZE = RPMTAG_SIG_BASE + 15,

    RPMTAG_NAME = 1000,
    RPMTAG_VERSION = 1001,
    RPMTAG_RELEASE = 1002,
    RPMTAG_EPOCH = 1003,
    RPMTAG_SUMMARY = 1004,
    RPMTAG_DESCRIPTION = 1005,
    RPMTAG_BUILDTIME = 1006,
    RPMTAG_BUILDHOST = 1007,
    RPMTAG_SIZE = 1009,
    RPMTAG_VENDOR = 1011,
    RPMTAG_LICENSE = 1014,
    RPMTAG_PACKAGER = 1015,
    RPMTAG_GROUP = 1016,
    RPMTAG_URL = 1020,
    RPMTAG_OS = 1021,
    RPMTAG_ARCH = 1022,
    RPMTAG_FILEMODES = 1030,
    RPMTAG_FILEFLAGS = 1037,
    RPMTAG_SOURCERPM = 1044,
    RPMTAG_ARCHIVESIZE = 1046,
    RPMTAG_PROVIDENAME = 1047,
    RPMTAG_REQUIREFLAGS = 1048,
    RPMTAG_REQUIRENAME = 1049,
    RPMTAG_REQUIREVERSION = 1050,
    RPMTAG_CONFLICTFLAGS = 1053,
    RPMTAG_CONFLICTNAME = 1054,
    RPMTAG_CONFLICTVERSION = 1055,
    RPMTAG_OBSOLETENAME = 1090,
    RPMTAG_PROVIDEFLAGS = 1112,
    RPMTAG_PROVIDEVERSION = 1113,
    RPMTAG_OBSOLETEFLAGS = 1114,
    RPMTAG_OBSOLETEVERSION = 1115,
    RPMTAG_DIRINDEXES = 1116,
    RPMTAG_BASENAMES = 1117,
    RPMTAG_DIRNAMES = 1118,
    RPMTAG_PAYLOADFORMAT = 1124,
    RPMTAG_PAYLOADCOMPRESSOR = 1125,

    RPMTAG_LONGSIZE = 5009,
    RPMTAG_RECOMMENDNAME = 5046,
    RPMTAG_RECOMMENDVERSION = 5047,
    RPMTAG_RECOMMENDFLAGS = 5048,
    RPMTAG_SUGGESTNAME = 5049,
    RPMTAG_SUGGESTVERSION = 5050,
    RPMTAG_SUGGESTFLAGS = 5051,
    RPMTAG_SUPPLEMENTNAME = 5052,
    RPMTAG_SUPPLEMENTVERSION = 5053,
    RPMTAG_SUPPLEMENTFLAGS = 5054,
    RPMTAG_ENHANCENAME = 5055,
    RPMTAG_ENHANCEVERSION = 5056,
    RPMTAG_ENHANCEFLAGS = 5057,
}

#[repr(u32)]
#[derive(
    num_derive::FromPrimitive,
    num_derive::ToPrimitive,
    Debug,
    PartialEq,
    Eq,
    Copy,
    Clone,
    enum_display_derive::Display,
)]
#[allow(non_camel_case_types)]
pub enum IndexSignatureTag {
    HEADER_SIGNATURES = HEADER_SIGNATURES,
    /// Combined size of the header and payload sections.
    RPMSIGTAG_SIZE = HEADER_TAGBASE,
    /// Uncompressed size of the payload archive, including the cpio headers.
    RPMSIGTAG_PAYLOADSIZE = HEADER_TAGBASE + 7,
    /// SHA1 of the entire main header section, hex-encoded.
    RPMSIGTAG_SHA1 = 269,
    /// MD5 of the combined header and archive sections, binary.
    RPMSIGTAG_MD5 = 1004,
    /// SHA256 of the entire main header section, hex-encoded.
    RPMSIGTAG_SHA256 = RPMTAG_SIG_BASE + 17,
}

/// Header tag.
///
/// Each header type has its own tag namespace identifying the entries
/// stored in that header.
pub trait Tag:
    num_traits::FromPrimitive + PartialEq + std::fmt::Display + std::fmt::Debug + Copy
{
    fn tag_type_name() -> &'static str;
    fn to_u32(&self) -> u32;
}

impl Tag for IndexTag {
    fn tag_type_name() -> &'static str {
        "IndexTag"
    }

    fn to_u32(&self) -> u32 {
        *self as u32
    }
}

impl Tag for IndexSignatureTag {
    fn tag_type_name() -> &'static str {
        "IndexSignatureTag"
    }

    fn to_u32(&self) -> u32 {
        *self as u32
    }
}

/// Size (in bytes) of the package "lead" section
pub const LEAD_SIZE: u32 = 96;
/// Size (in bytes) of the index header (the fixed portion of each header)
pub const INDEX_HEADER_SIZE: u32 = 16;
/// Size (in bytes) of each entry in the index
pub const INDEX_ENTRY_SIZE: u32 = 16;
/// rpm magic as part of the lead header
pub const RPM_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
/// header magic recognition (not the lead!)
pub const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

bitflags! {
    /// Dependency sense flags. The low nibble encodes the version comparison.
    #[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
    pub struct DependencyFlags: u32 {
        const ANY = 0;
        const LESS = 1 << 1;
        const GREATER = 1 << 2;
        const EQUAL = 1 << 3;

        const LE = Self::LESS.bits() | Self::EQUAL.bits();
        const GE = Self::GREATER.bits() | Self::EQUAL.bits();

        const PREREQ = 1 << 6;      // legacy prereq dependency
        const INTERP = 1 << 8;      // interpreter used by scriptlet
        const SCRIPT_PRE = 1 << 9;  // %pre dependency
        const SCRIPT_POST = 1 << 10;  // %post dependency
        const SCRIPT_PREUN = 1 << 11;  // %preun dependency
        const SCRIPT_POSTUN = 1 << 12;  // %postun dependency
        const FIND_REQUIRES = 1 << 14;  // find-requires generated dependency
        const FIND_PROVIDES = 1 << 15;  // find-provides generated dependency
        const MISSINGOK = 1 << 19;  // suggests/enhances hint
        const RPMLIB = 1 << 24;     // rpmlib(feature) dependency
        const CONFIG = 1 << 28;     // config() dependency
    }
}

bitflags! {
    /// File attribute flags from RPMTAG_FILEFLAGS.
    #[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
    pub struct FileFlags: u32 {
        const CONFIG = 1;  // %%config
        const DOC = 1 << 1;  // %%doc
        const DONOTUSE = 1 << 2;  // %%donotuse
        const MISSINGOK = 1 << 3;  // %%config(missingok)
        const NOREPLACE = 1 << 4;  // %%config(noreplace)
        const GHOST = 1 << 6;  // %%ghost
        const LICENSE = 1 << 7;  // %%license
        const README = 1 << 8;  // %%readme
        const PUBKEY = 1 << 11;  // %%pubkey
        const ARTIFACT = 1 << 12;  // %%artifact
    }
}
