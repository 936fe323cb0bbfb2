//! Read/write `newc` (SVR4) cpio streams, the archive format of rpm payloads.
//!
//! Only the subset repodata generation needs: sequential entry
//! iteration with read-or-skip of the file data, and enough of a writer
//! to assemble payloads for tests and tooling.

use std::io::{self, Read, Write};

const HEADER_LEN: usize = 110; // 6 byte magic + 104 bytes of metadata

const MAGIC_NEWASCII: &[u8] = b"070701";
const MAGIC_NEWCRC: &[u8] = b"070702";

const TRAILER_NAME: &str = "TRAILER!!!";

/// Metadata of one payload entry.
#[derive(Debug, PartialEq)]
pub struct PayloadEntry {
    pub name: String,
    pub mode: u32,
    pub file_size: u32,
}

fn pad_len(len: usize) -> usize {
    // entries are aligned to 4 bytes
    (4 - len % 4) % 4
}

fn read_hex_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    std::str::from_utf8(&bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid utf-8 header field"))
        .and_then(|string| {
            u32::from_str_radix(string, 16).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "invalid hex u32 header field")
            })
        })
}

/// Sequential reader over a (decompressed) payload stream.
pub struct PayloadReader<R: Read> {
    inner: R,
    done: bool,
}

impl<R: Read> PayloadReader<R> {
    pub fn new(inner: R) -> Self {
        PayloadReader { inner, done: false }
    }

    /// Next entry header, or `None` once the trailer (or a clean end of
    /// stream) is reached. After a `Some` the caller must consume the
    /// entry data with [`read_data`](Self::read_data) or
    /// [`skip_data`](Self::skip_data) before asking for the next entry.
    pub fn next_entry(&mut self) -> io::Result<Option<PayloadEntry>> {
        if self.done {
            return Ok(None);
        }
        let mut magic = [0u8; 6];
        match self.inner.read_exact(&mut magic) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.done = true;
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        if magic != MAGIC_NEWASCII && magic != MAGIC_NEWCRC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid cpio magic number",
            ));
        }

        let _ino = read_hex_u32(&mut self.inner)?;
        let mode = read_hex_u32(&mut self.inner)?;
        let _uid = read_hex_u32(&mut self.inner)?;
        let _gid = read_hex_u32(&mut self.inner)?;
        let _nlink = read_hex_u32(&mut self.inner)?;
        let _mtime = read_hex_u32(&mut self.inner)?;
        let file_size = read_hex_u32(&mut self.inner)?;
        let _dev_major = read_hex_u32(&mut self.inner)?;
        let _dev_minor = read_hex_u32(&mut self.inner)?;
        let _rdev_major = read_hex_u32(&mut self.inner)?;
        let _rdev_minor = read_hex_u32(&mut self.inner)?;
        let name_len = read_hex_u32(&mut self.inner)? as usize;
        let _checksum = read_hex_u32(&mut self.inner)?;

        if name_len == 0 || name_len > 4096 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "entry name length out of range",
            ));
        }
        // NUL-terminated name of `name_len` bytes (including the NUL)
        let mut name_bytes = vec![0u8; name_len];
        self.inner.read_exact(&mut name_bytes)?;
        while name_bytes.last() == Some(&0) {
            name_bytes.pop();
        }
        let name = String::from_utf8_lossy(&name_bytes).into_owned();

        // header plus name are padded to a 4 byte boundary
        self.discard(pad_len(HEADER_LEN + name_len))?;

        if name == TRAILER_NAME {
            self.done = true;
            return Ok(None);
        }

        Ok(Some(PayloadEntry {
            name,
            mode,
            file_size,
        }))
    }

    pub fn read_data(&mut self, entry: &PayloadEntry) -> io::Result<Vec<u8>> {
        let mut data = vec![0u8; entry.file_size as usize];
        self.inner.read_exact(&mut data)?;
        self.discard(pad_len(entry.file_size as usize))?;
        Ok(data)
    }

    pub fn skip_data(&mut self, entry: &PayloadEntry) -> io::Result<()> {
        let total = entry.file_size as u64 + pad_len(entry.file_size as usize) as u64;
        io::copy(&mut self.inner.by_ref().take(total), &mut io::sink())?;
        Ok(())
    }

    fn discard(&mut self, count: usize) -> io::Result<()> {
        if count > 0 {
            let mut buf = [0u8; 4];
            self.inner.read_exact(&mut buf[..count])?;
        }
        Ok(())
    }
}

/// Writes a `newc` payload stream entry by entry.
pub struct PayloadWriter<W: Write> {
    inner: W,
    next_ino: u32,
}

impl<W: Write> PayloadWriter<W> {
    pub fn new(inner: W) -> Self {
        PayloadWriter { inner, next_ino: 1 }
    }

    pub fn add_entry(&mut self, name: &str, mode: u32, data: &[u8]) -> io::Result<()> {
        let ino = self.next_ino;
        self.next_ino += 1;
        self.write_header(name, ino, mode, data.len() as u32)?;
        self.inner.write_all(data)?;
        self.write_padding(pad_len(data.len()))?;
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.write_header(TRAILER_NAME, 0, 0, 0)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_header(&mut self, name: &str, ino: u32, mode: u32, file_size: u32) -> io::Result<()> {
        let name_len = name.len() + 1;
        self.inner.write_all(MAGIC_NEWASCII)?;
        for field in [
            ino,
            mode,
            0, // uid
            0, // gid
            1, // nlink
            0, // mtime
            file_size,
            0, // dev_major
            0, // dev_minor
            0, // rdev_major
            0, // rdev_minor
            name_len as u32,
            0, // checksum
        ] {
            write!(self.inner, "{:08x}", field)?;
        }
        self.inner.write_all(name.as_bytes())?;
        self.inner.write_all(&[0])?;
        self.write_padding(pad_len(HEADER_LEN + name_len))?;
        Ok(())
    }

    fn write_padding(&mut self, count: usize) -> io::Result<()> {
        if count > 0 {
            self.inner.write_all(&[0u8; 4][..count])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payload_roundtrip() -> io::Result<()> {
        let mut writer = PayloadWriter::new(Vec::new());
        writer.add_entry("./usr/bin/hello", 0o100755, b"#!/bin/sh\n")?;
        writer.add_entry("./etc/hello.conf", 0o100644, b"greeting=hi\n")?;
        let bytes = writer.finish()?;

        let mut reader = PayloadReader::new(&bytes[..]);
        let first = reader.next_entry()?.expect("first entry");
        assert_eq!(first.name, "./usr/bin/hello");
        assert_eq!(first.mode, 0o100755);
        assert_eq!(reader.read_data(&first)?, b"#!/bin/sh\n");

        let second = reader.next_entry()?.expect("second entry");
        assert_eq!(second.name, "./etc/hello.conf");
        reader.skip_data(&second)?;

        assert!(reader.next_entry()?.is_none());
        // asking again after the trailer stays at the end
        assert!(reader.next_entry()?.is_none());
        Ok(())
    }

    #[test]
    fn truncated_stream_is_clean_eof_before_magic() -> io::Result<()> {
        let mut reader = PayloadReader::new(&b""[..]);
        assert!(reader.next_entry()?.is_none());
        Ok(())
    }
}
