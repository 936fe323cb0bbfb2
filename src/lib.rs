//! # createmd
//!
//! Generates and incrementally maintains the metadata of an RPM package
//! repository: `repomd.xml` plus the `primary`, `filelists`, `other`,
//! `appstream` and `appstream-icons` artifacts consumed by rpm-based
//! package managers.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), createmd::MdError> {
//! // full regenerate of /srv/repo/x86_64 (writes repodata/ next to the rpms)
//! createmd::repodata::create(std::path::Path::new("/srv/repo/x86_64"))?;
//! // later: patch the existing metadata instead of re-reading every package
//! createmd::repodata::update(std::path::Path::new("/srv/repo/x86_64"))?;
//! # Ok(())
//! # }
//! ```

#![allow(unknown_lints, clippy::uninlined_format_args)]

mod errors;
pub use crate::errors::*;

pub(crate) mod constants;
pub use crate::constants::*;

mod rpm;
pub use crate::rpm::*;

pub mod appstream;
pub mod archive;
pub mod compression;
pub mod desktop;
pub mod digest;
pub mod repodata;
pub mod xml;
