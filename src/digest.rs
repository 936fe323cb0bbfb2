//! SHA-256 helpers used for pkgids and artifact checksums.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::MdError;

/// Stream `path` through SHA-256 and return the lowercase hex digest.
pub fn sha256_hex(path: &Path) -> Result<String, MdError> {
    let file = File::open(path).map_err(|e| MdError::io(path, e))?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(|e| MdError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha256_hex_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            sha256_hex_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn file_and_bytes_agree() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"abc")?;
        file.flush()?;
        assert_eq!(sha256_hex(file.path())?, sha256_hex_bytes(b"abc"));
        Ok(())
    }
}
