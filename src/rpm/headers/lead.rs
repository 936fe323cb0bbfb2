use nom::bytes::complete;
use nom::number::complete::{be_u16, be_u8};

use crate::constants::*;
use crate::errors::MdError;

/// Lead of an rpm file.
///
/// Mostly obsolete - rpm itself only consults the magic - but the fixed
/// 96 byte block still has to be read (and written) to find the headers.
pub struct Lead {
    magic: [u8; 4],
    major: u8,
    minor: u8,
    package_type: u16,
    arch: u16,
    name: [u8; 66],
    os: u16,
    signature_type: u16,
    reserved: [u8; 16],
}

impl Lead {
    pub fn parse(input: &[u8]) -> Result<Self, MdError> {
        let (rest, magic) = complete::take(4usize)(input)?;
        for i in 0..magic.len() {
            if magic[i] != RPM_MAGIC[i] {
                return Err(MdError::InvalidMagic {
                    expected: RPM_MAGIC[i],
                    actual: magic[i],
                });
            }
        }
        let (rest, major) = be_u8(rest)?;
        if major != 3 {
            return Err(MdError::InvalidLead("major version must be 3"));
        }
        let (rest, minor) = be_u8(rest)?;
        let (rest, pkg_type) = be_u16(rest)?;
        if pkg_type > 1 {
            return Err(MdError::InvalidLead("package type must be 0 or 1"));
        }
        let (rest, arch) = be_u16(rest)?;
        let (rest, name) = complete::take(66usize)(rest)?;
        let (rest, os) = be_u16(rest)?;
        let (rest, sigtype) = be_u16(rest)?;
        if sigtype != 5 {
            return Err(MdError::InvalidLead("signature type must be 5 (header-style)"));
        }
        if rest.len() != 16 {
            return Err(MdError::InvalidLead("reserved area must be 16 bytes"));
        }

        let mut name_arr: [u8; 66] = [0; 66];
        name_arr.copy_from_slice(name);

        Ok(Lead {
            magic: RPM_MAGIC,
            major,
            minor,
            package_type: pkg_type,
            arch,
            name: name_arr,
            os,
            signature_type: sigtype,
            reserved: [0; 16],
        })
    }

    pub fn write<W: std::io::Write>(&self, out: &mut W) -> Result<(), MdError> {
        out.write_all(&self.magic)?;
        out.write_all(&self.major.to_be_bytes())?;
        out.write_all(&self.minor.to_be_bytes())?;
        out.write_all(&self.package_type.to_be_bytes())?;
        out.write_all(&self.arch.to_be_bytes())?;
        out.write_all(&self.name)?;
        out.write_all(&self.os.to_be_bytes())?;
        out.write_all(&self.signature_type.to_be_bytes())?;
        out.write_all(&self.reserved)?;
        Ok(())
    }

    pub fn new(name: &str) -> Self {
        let mut name_arr = [0; 66];
        // the last byte needs to stay the null terminator
        let name_size = std::cmp::min(name_arr.len() - 1, name.len());
        name_arr[..name_size].clone_from_slice(&name.as_bytes()[..name_size]);
        Lead {
            magic: RPM_MAGIC,
            major: 3,
            minor: 0,
            package_type: 0,
            arch: 0,
            name: name_arr,
            os: 1,
            signature_type: 5,
            reserved: [0; 16],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lead_roundtrip() -> Result<(), MdError> {
        let lead = Lead::new("hello-1.0-1");
        let mut bytes = Vec::new();
        lead.write(&mut bytes)?;
        assert_eq!(bytes.len(), LEAD_SIZE as usize);
        Lead::parse(&bytes)?;
        Ok(())
    }

    #[test]
    fn lead_rejects_bad_magic() {
        let bytes = [0u8; LEAD_SIZE as usize];
        assert!(Lead::parse(&bytes).is_err());
    }
}
