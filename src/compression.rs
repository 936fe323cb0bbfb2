//! Compression filters for metadata artifacts and rpm payloads.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::MdError;

/// Known compression filters. Ordinals and suffixes are stable; only a
/// subset has a linked codec - the rest fail with
/// [`MdError::UnsupportedCompressor`] when actually used.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Format {
    Gzip = 0,
    Bzip2,
    Compress,
    Lzma,
    Xz,
    Lzip,
    Lrzip,
    Lzop,
    Grzip,
    Lz4,
    Zstd,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Gzip => ".gz",
            Format::Bzip2 => ".bz2",
            Format::Compress => ".Z",
            Format::Lzma => ".lzma",
            Format::Xz => ".xz",
            Format::Lzip => ".lz",
            Format::Lrzip => ".lrz",
            Format::Lzop => ".lzop",
            Format::Grzip => ".grz",
            Format::Lz4 => ".lz4",
            Format::Zstd => ".zstd",
        }
    }
}

impl FromStr for Format {
    type Err = MdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "gzip" => Ok(Format::Gzip),
            "bzip2" => Ok(Format::Bzip2),
            "compress" => Ok(Format::Compress),
            "lzma" => Ok(Format::Lzma),
            "xz" => Ok(Format::Xz),
            "lzip" => Ok(Format::Lzip),
            "lrzip" => Ok(Format::Lrzip),
            "lzop" => Ok(Format::Lzop),
            "grzip" => Ok(Format::Grzip),
            "lz4" => Ok(Format::Lz4),
            "zstd" => Ok(Format::Zstd),
            _ => Err(MdError::UnsupportedCompressor(raw.to_string())),
        }
    }
}

enum Encoder<W: Write> {
    Gzip(flate2::write::GzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Xz(xz2::write::XzEncoder<W>),
    Zstd(zstd::stream::Encoder<'static, W>),
}

impl<W: Write> std::fmt::Debug for Encoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Encoder::Gzip(_) => "Gzip",
            Encoder::Bzip2(_) => "Bzip2",
            Encoder::Xz(_) => "Xz",
            Encoder::Zstd(_) => "Zstd",
        };
        f.debug_tuple(name).finish()
    }
}

impl<W: Write> Encoder<W> {
    fn new(format: Format, out: W) -> Result<Self, MdError> {
        match format {
            Format::Gzip => Ok(Encoder::Gzip(flate2::write::GzEncoder::new(
                out,
                flate2::Compression::default(),
            ))),
            Format::Bzip2 => Ok(Encoder::Bzip2(bzip2::write::BzEncoder::new(
                out,
                bzip2::Compression::default(),
            ))),
            Format::Xz => Ok(Encoder::Xz(xz2::write::XzEncoder::new(out, 6))),
            Format::Zstd => Ok(Encoder::Zstd(zstd::stream::Encoder::new(out, 0)?)),
            other => Err(MdError::UnsupportedCompressor(
                other.extension().trim_start_matches('.').to_string(),
            )),
        }
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Gzip(e) => e.finish(),
            Encoder::Bzip2(e) => e.finish(),
            Encoder::Xz(e) => e.finish(),
            Encoder::Zstd(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Bzip2(e) => e.write(buf),
            Encoder::Xz(e) => e.write(buf),
            Encoder::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.flush(),
            Encoder::Bzip2(e) => e.flush(),
            Encoder::Xz(e) => e.flush(),
            Encoder::Zstd(e) => e.flush(),
        }
    }
}

/// Compress `source` into `target` (default: `source` plus the filter
/// suffix). Only regular files are streamed; a missing or non-regular
/// source yields `Ok(false)` and `target` is not created.
pub fn compress_file(
    source: &Path,
    format: Format,
    target: Option<&Path>,
) -> Result<bool, MdError> {
    let meta = match fs::metadata(source) {
        Ok(m) => m,
        Err(_) => return Ok(false),
    };
    if !meta.is_file() {
        return Ok(false);
    }
    let file = match File::open(source) {
        Ok(f) => f,
        Err(_) => return Ok(false),
    };

    let target: PathBuf = match target {
        Some(t) => t.to_path_buf(),
        None => {
            let mut os = source.as_os_str().to_os_string();
            os.push(format.extension());
            PathBuf::from(os)
        }
    };

    let out = File::create(&target).map_err(|e| MdError::io(&target, e))?;
    let mut encoder = Encoder::new(format, out)?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    io::copy(&mut reader, &mut encoder).map_err(|e| MdError::io(&target, e))?;
    encoder.finish().map_err(|e| MdError::io(&target, e))?;
    Ok(true)
}

/// Streaming decoder for a payload of the given filter.
pub fn decoder<'a, R: Read + 'a>(format: Format, inner: R) -> Result<Box<dyn Read + 'a>, MdError> {
    match format {
        Format::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(inner))),
        Format::Bzip2 => Ok(Box::new(bzip2::read::BzDecoder::new(inner))),
        Format::Xz => Ok(Box::new(xz2::read::XzDecoder::new(inner))),
        Format::Lzma => {
            let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
                .map_err(|_| MdError::UnsupportedCompressor("lzma".to_string()))?;
            Ok(Box::new(xz2::read::XzDecoder::new_stream(inner, stream)))
        }
        Format::Zstd => Ok(Box::new(zstd::stream::read::Decoder::new(inner)?)),
        other => Err(MdError::UnsupportedCompressor(
            other.extension().trim_start_matches('.').to_string(),
        )),
    }
}

fn sniff(data: &[u8]) -> Option<Format> {
    if data.starts_with(&[0x1f, 0x8b]) {
        Some(Format::Gzip)
    } else if data.starts_with(b"BZh") {
        Some(Format::Bzip2)
    } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
        Some(Format::Xz)
    } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        Some(Format::Zstd)
    } else {
        None
    }
}

/// Decompress a single-stream blob fully into memory, detecting the
/// filter from its magic. Unrecognized data passes through unchanged.
pub fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>, MdError> {
    let Some(format) = sniff(data) else {
        return Ok(data.to_vec());
    };
    let mut out = Vec::new();
    decoder(format, data)?.read_to_end(&mut out)?;
    Ok(out)
}

/// Read and decompress `source` fully into memory.
pub fn decompress_file(source: &Path) -> Result<Vec<u8>, MdError> {
    let data = fs::read(source).map_err(|e| MdError::io(source, e))?;
    decompress_bytes(&data).map_err(|e| match e {
        MdError::Io(source_err) => MdError::io(source, source_err),
        other => other,
    })
}
