use nom::{
    bytes::complete,
    number::complete::{be_i32, be_u16, be_u32, be_u64, be_u8},
};
use std::{fmt, io, marker::PhantomData};

use crate::constants::*;
use crate::errors::MdError;

/// One parsed header section: the index header, its entries and the
/// data store the entries point into.
#[derive(Debug, PartialEq)]
pub struct Header<T: Tag> {
    pub(crate) index_header: IndexHeader,
    pub(crate) index_entries: Vec<IndexEntry<T>>,
    pub(crate) store: Vec<u8>,
}

impl<T> Header<T>
where
    T: Tag,
{
    pub fn parse(input: &mut impl io::BufRead) -> Result<Header<T>, MdError> {
        let mut buf: [u8; INDEX_HEADER_SIZE as usize] = [0; INDEX_HEADER_SIZE as usize];
        input.read_exact(&mut buf)?;
        let index_header = IndexHeader::parse(&buf)?;
        // read rest of the header (index and data portions)
        let size_rest =
            (index_header.data_section_size + index_header.num_entries * INDEX_ENTRY_SIZE) as usize;
        let mut buf = vec![0; size_rest];
        input.read_exact(&mut buf)?;
        Self::parse_entries(index_header, &buf[..])
    }

    /// Given a pre-parsed index header, parse the index entries and data store.
    fn parse_entries(index_header: IndexHeader, mut bytes: &[u8]) -> Result<Header<T>, MdError> {
        let mut entries: Vec<IndexEntry<T>> = Vec::new();
        for _ in 0..index_header.num_entries {
            let (rest, entry) = IndexEntry::parse(bytes)?;
            entries.push(entry);
            bytes = rest;
        }

        if bytes.len() != index_header.data_section_size as usize {
            return Err(MdError::Nom(format!(
                "header store has {} bytes, index header promised {}",
                bytes.len(),
                index_header.data_section_size
            )));
        }

        let store = Vec::from(bytes);
        for entry in &mut entries {
            if entry.offset as usize > bytes.len() {
                return Err(MdError::Nom(format!(
                    "entry offset {} out of bounds for tag {}",
                    entry.offset, entry.tag
                )));
            }
            let mut remaining = &bytes[entry.offset as usize..];
            match &mut entry.data {
                IndexData::Null => {}
                IndexData::Char(ref mut chars) => {
                    parse_entry_data_number(remaining, entry.num_items, chars, be_u8)?;
                }
                IndexData::Int8(ref mut ints) => {
                    parse_entry_data_number(remaining, entry.num_items, ints, be_u8)?;
                }
                IndexData::Int16(ref mut ints) => {
                    parse_entry_data_number(remaining, entry.num_items, ints, be_u16)?;
                }
                IndexData::Int32(ref mut ints) => {
                    parse_entry_data_number(remaining, entry.num_items, ints, be_u32)?;
                }
                IndexData::Int64(ref mut ints) => {
                    parse_entry_data_number(remaining, entry.num_items, ints, be_u64)?;
                }
                IndexData::StringTag(ref mut string) => {
                    let (_rest, raw_string) = complete::take_till(|item| item == 0)(remaining)?;
                    string.push_str(String::from_utf8_lossy(raw_string).as_ref());
                }
                IndexData::Bin(ref mut bin) => {
                    parse_entry_data_number(remaining, entry.num_items, bin, be_u8)?;
                }
                IndexData::StringArray(ref mut strings) => {
                    for _ in 0..entry.num_items {
                        let (rest, raw_string) = complete::take_till(|item| item == 0)(remaining)?;
                        // the null byte is still in there.. we need to cut it out.
                        remaining = &rest[1..];
                        strings.push(String::from_utf8_lossy(raw_string).to_string());
                    }
                }
                IndexData::I18NString(ref mut strings) => {
                    for _ in 0..entry.num_items {
                        let (rest, raw_string) = complete::take_till(|item| item == 0)(remaining)?;
                        remaining = rest;
                        strings.push(String::from_utf8_lossy(raw_string).to_string());
                    }
                }
            }
        }

        Ok(Header {
            index_header,
            index_entries: entries,
            store,
        })
    }

    pub fn write(&self, out: &mut impl std::io::Write) -> Result<(), MdError> {
        self.index_header.write(out)?;
        for entry in &self.index_entries {
            entry.write_index(out)?;
        }
        out.write_all(&self.store)?;
        Ok(())
    }

    /// Size (in bytes) of this header in on-disk representation, not including padding.
    pub fn size(&self) -> u32 {
        let index_size = self.index_header.num_entries * INDEX_ENTRY_SIZE;
        let data_size = self.index_header.data_section_size;

        INDEX_HEADER_SIZE + index_size + data_size
    }

    pub(crate) fn find_entry(&self, tag: T) -> Option<&IndexEntry<T>> {
        self.index_entries
            .iter()
            .find(|entry| entry.tag == tag.to_u32())
    }

    fn find_entry_or_err(&self, tag: T) -> Result<&IndexEntry<T>, MdError> {
        self.find_entry(tag)
            .ok_or_else(|| MdError::TagNotFound(tag.to_string()))
    }

    /// Single string value for `tag`. I18N string tables yield the first
    /// (canonical) translation, matching rpmlib's `headerGetString`.
    pub fn get_entry_data_as_str(&self, tag: T) -> Result<&str, MdError> {
        let entry = self.find_entry_or_err(tag)?;
        entry
            .data
            .as_str()
            .ok_or_else(|| MdError::UnexpectedTagDataType {
                expected_data_type: "string",
                actual_data_type: entry.data.to_string(),
                tag: entry.tag.to_string(),
            })
    }

    pub fn get_entry_data_as_string_array(&self, tag: T) -> Result<&[String], MdError> {
        let entry = self.find_entry_or_err(tag)?;
        entry
            .data
            .as_string_array()
            .ok_or_else(|| MdError::UnexpectedTagDataType {
                expected_data_type: "string array",
                actual_data_type: entry.data.to_string(),
                tag: entry.tag.to_string(),
            })
    }

    pub fn get_entry_data_as_u16_array(&self, tag: T) -> Result<&[u16], MdError> {
        let entry = self.find_entry_or_err(tag)?;
        entry
            .data
            .as_u16_array()
            .ok_or_else(|| MdError::UnexpectedTagDataType {
                expected_data_type: "uint16 array",
                actual_data_type: entry.data.to_string(),
                tag: entry.tag.to_string(),
            })
    }

    pub fn get_entry_data_as_u32_array(&self, tag: T) -> Result<&[u32], MdError> {
        let entry = self.find_entry_or_err(tag)?;
        entry
            .data
            .as_u32_array()
            .ok_or_else(|| MdError::UnexpectedTagDataType {
                expected_data_type: "uint32 array",
                actual_data_type: entry.data.to_string(),
                tag: entry.tag.to_string(),
            })
    }

    /// First numeric value of `tag` widened to u64, whichever integer
    /// width the header stored it with (rpmlib's `headerGetNumber`).
    pub fn get_entry_data_as_number(&self, tag: T) -> Option<u64> {
        self.find_entry(tag).and_then(|entry| entry.data.as_number())
    }

    pub(crate) fn create_region_tag(tag: T, records_count: i32, offset: i32) -> IndexEntry<T> {
        let mut header_immutable_index_data = vec![];
        let mut hie = IndexEntry::new(
            tag,
            (records_count + 1) * -(INDEX_ENTRY_SIZE as i32),
            IndexData::Bin(Vec::new()),
        );
        hie.num_items = 16;
        hie.write_index(&mut header_immutable_index_data)
            .expect("unable to write to memory buffer");
        IndexEntry::new(tag, offset, IndexData::Bin(header_immutable_index_data))
    }

    /// Assemble a header from entries, adding the region tag rpm expects.
    pub fn from_entries(mut actual_records: Vec<IndexEntry<T>>, region_tag: T) -> Self {
        // Entries must land in the store in sorted tag order
        actual_records.sort_by(|e1, e2| e1.tag.cmp(&e2.tag));

        let mut store = Vec::new();
        for record in &mut actual_records {
            record.offset = store.len() as i32;
            let alignment = record.data.append(&mut store);
            record.offset += alignment as i32;
        }

        let region_tag =
            Self::create_region_tag(region_tag, actual_records.len() as i32, store.len() as i32);
        region_tag.data.append(&mut store);

        let mut all_records = vec![region_tag];
        all_records.append(&mut actual_records);
        let store_size = store.len();

        let index_header = IndexHeader::new(all_records.len() as u32, store_size as u32);
        Header {
            index_entries: all_records,
            index_header,
            store,
        }
    }
}

impl Header<IndexSignatureTag> {
    /// The signature header is aligned to 8 bytes - the padding after the
    /// store is discarded on read and emitted on write.
    pub fn parse_signature(
        input: &mut impl io::BufRead,
    ) -> Result<Header<IndexSignatureTag>, MdError> {
        let result = Self::parse(input)?;
        let padding = (8 - (result.index_header.data_section_size % 8)) % 8;
        if padding > 0 {
            let mut discard = vec![0; padding as usize];
            input.read_exact(&mut discard)?;
        }
        Ok(result)
    }

    pub fn write_signature(&self, out: &mut impl std::io::Write) -> Result<(), MdError> {
        self.write(out)?;
        let padding_needed = (8 - (self.index_header.data_section_size % 8)) % 8;
        if padding_needed > 0 {
            let padding = vec![0; padding_needed as usize];
            out.write_all(&padding)?;
        }
        Ok(())
    }

    /// Byte count the signature block occupies on disk after the lead,
    /// including the trailing alignment padding.
    pub fn padded_size(&self) -> u32 {
        let store = self.size() - INDEX_HEADER_SIZE;
        let padding = (8 - (store % 8)) % 8;
        self.size() + padding
    }
}

fn parse_entry_data_number<'a, T, E, F>(
    mut input: &'a [u8],
    num_items: u32,
    items: &mut Vec<T>,
    parser: F,
) -> nom::IResult<&'a [u8], (), E>
where
    E: nom::error::ParseError<&'a [u8]>,
    F: Fn(&'a [u8]) -> nom::IResult<&'a [u8], T, E>,
{
    for _ in 0..num_items {
        let (rest, data) = parser(input)?;
        items.push(data);
        input = rest;
    }

    Ok((input, ()))
}

/// A header keeping track of all other header records.
#[derive(Debug, PartialEq)]
pub(crate) struct IndexHeader {
    /// rpm specific magic header
    pub(crate) magic: [u8; 3],
    /// rpm version number, always 1
    pub(crate) version: u8,
    /// number of header entries
    pub(crate) num_entries: u32,
    /// total amount of data stored
    pub(crate) data_section_size: u32,
}

impl IndexHeader {
    // 16 bytes
    pub(crate) fn parse(input: &[u8]) -> Result<Self, MdError> {
        // first three bytes are magic
        let (rest, magic) = complete::take(3usize)(input)?;
        for i in 0..3 {
            if HEADER_MAGIC[i] != magic[i] {
                return Err(MdError::InvalidMagic {
                    expected: HEADER_MAGIC[i],
                    actual: magic[i],
                });
            }
        }
        // then one byte for version
        let (rest, version) = be_u8(rest)?;
        if version != 1 {
            return Err(MdError::UnsupportedHeaderVersion(version));
        }
        // then 4 bytes reserved
        let (rest, _) = complete::take(4usize)(rest)?;
        // then number of entries (u32, 4 bytes)
        let (rest, num_entries) = be_u32(rest)?;
        // then size of the data store (u32, 4 bytes)
        let (_rest, data_len) = be_u32(rest)?;

        Ok(IndexHeader {
            magic: HEADER_MAGIC,
            version: 1,
            num_entries,
            data_section_size: data_len,
        })
    }

    pub(crate) fn write<W: std::io::Write>(&self, out: &mut W) -> Result<(), MdError> {
        out.write_all(&self.magic)?;
        out.write_all(&self.version.to_be_bytes())?;
        out.write_all(&[0; 4])?;
        out.write_all(&self.num_entries.to_be_bytes())?;
        out.write_all(&self.data_section_size.to_be_bytes())?;
        Ok(())
    }

    pub(crate) fn new(num_entries: u32, data_len: u32) -> Self {
        IndexHeader {
            magic: HEADER_MAGIC,
            version: 1,
            num_entries,
            data_section_size: data_len,
        }
    }
}

/// A single entry within the [`IndexHeader`](self::IndexHeader)
#[derive(PartialEq)]
pub struct IndexEntry<T: num_traits::FromPrimitive> {
    pub(crate) tag: u32,
    pub(crate) data: IndexData,
    pub(crate) offset: i32,
    pub(crate) num_items: u32,
    // Marks what type of IndexEntry it is
    entry_type: PhantomData<T>,
}

/// Custom Debug impl for the benefit of showing the tag name, if we are familiar with it
impl<T: Tag> std::fmt::Debug for IndexEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known_tag: Option<T> = num_traits::FromPrimitive::from_u32(self.tag);
        // A package can carry tags we know nothing about - print the raw id then.
        let tag_name = if let Some(val) = known_tag {
            format!("{:?}", val)
        } else {
            format!("UnknownTag[{:?}]", self.tag)
        };

        f.debug_struct(&format!("IndexEntry<{}>", T::tag_type_name()))
            .field("tag", &tag_name)
            .field("data", &self.data)
            .field("offset", &self.offset)
            .field("num_items", &self.num_items)
            .finish()
    }
}

impl<T: Tag> IndexEntry<T> {
    // 16 bytes
    pub(crate) fn parse(input: &[u8]) -> Result<(&[u8], Self), MdError> {
        // first 4 bytes are the tag.
        let (input, tag) = be_u32(input)?;
        // next 4 bytes is the tag type
        let (input, tag_type) = be_u32(input)?;

        // initialize the datatype. Parsing of the data happens later since the store comes after the index section.
        let data =
            IndexData::from_type_as_u32(tag_type).ok_or_else(|| MdError::InvalidTagDataType {
                raw_data_type: tag_type,
                store_type: T::tag_type_name(),
            })?;

        // next 4 bytes is the offset relative to the beginning of the store
        let (input, offset) = be_i32(input)?;

        // last 4 bytes are the number of data items pointed to by the index entry
        let (rest, num_items) = be_u32(input)?;

        Ok((
            rest,
            IndexEntry {
                tag,
                data,
                offset,
                num_items,
                entry_type: PhantomData,
            },
        ))
    }

    pub(crate) fn write_index(&self, out: &mut impl std::io::Write) -> Result<(), MdError> {
        out.write_all(&self.tag.to_be_bytes())?;
        out.write_all(&self.data.type_as_u32().to_be_bytes())?;
        out.write_all(&self.offset.to_be_bytes())?;
        out.write_all(&self.num_items.to_be_bytes())?;
        Ok(())
    }

    pub fn new(tag: T, offset: i32, data: IndexData) -> IndexEntry<T> {
        IndexEntry {
            tag: tag.to_u32(),
            offset,
            num_items: data.num_items(),
            data,
            entry_type: PhantomData,
        }
    }
}

/// Data as present in a [`IndexEntry`](self::IndexEntry).
#[derive(Debug, PartialEq, Eq)]
pub enum IndexData {
    Null,
    Char(Vec<u8>),
    Int8(Vec<u8>),
    Int16(Vec<u16>),
    Int32(Vec<u32>),
    Int64(Vec<u64>),
    StringTag(String),
    Bin(Vec<u8>),
    StringArray(Vec<String>),
    I18NString(Vec<String>),
}

impl fmt::Display for IndexData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rep = match self {
            IndexData::Null => "Null",
            IndexData::Bin(_) => "Bin",
            IndexData::Char(_) => "Char",
            IndexData::I18NString(_) => "I18NString",
            IndexData::StringTag(_) => "String",
            IndexData::StringArray(_) => "StringArray",
            IndexData::Int8(_) => "i8",
            IndexData::Int16(_) => "i16",
            IndexData::Int32(_) => "i32",
            IndexData::Int64(_) => "i64",
        };
        write!(f, "{}", rep)
    }
}

impl IndexData {
    pub(crate) fn append(&self, store: &mut Vec<u8>) -> u32 {
        match &self {
            IndexData::Null => 0,
            IndexData::Char(d) => {
                store.extend_from_slice(d);
                0
            }
            IndexData::Int8(d) => {
                store.extend_from_slice(d);
                0
            }
            IndexData::Int16(d) => {
                // align to 2 bytes
                let alignment = if store.len() % 2 != 0 {
                    store.push(0);
                    1
                } else {
                    0
                };
                for byte in d.iter().flat_map(|item| item.to_be_bytes()) {
                    store.push(byte);
                }
                alignment
            }
            IndexData::Int32(d) => {
                // align to 4 bytes
                let mut alignment = 0;
                while store.len() % 4 > 0 {
                    store.push(0);
                    alignment += 1;
                }
                for byte in d.iter().flat_map(|item| item.to_be_bytes()) {
                    store.push(byte);
                }
                alignment
            }
            IndexData::Int64(d) => {
                // align to 8 bytes
                let mut alignment = 0;
                while store.len() % 8 > 0 {
                    store.push(0);
                    alignment += 1;
                }
                for byte in d.iter().flat_map(|item| item.to_be_bytes()) {
                    store.push(byte);
                }
                alignment
            }
            IndexData::StringTag(d) => {
                store.extend_from_slice(d.as_bytes());
                store.push(0);
                0
            }
            IndexData::Bin(d) => {
                store.extend_from_slice(d);
                0
            }
            IndexData::StringArray(d) | IndexData::I18NString(d) => {
                for item in d {
                    store.extend_from_slice(item.as_bytes());
                    store.push(0);
                }
                0
            }
        }
    }

    pub(crate) fn num_items(&self) -> u32 {
        match self {
            IndexData::Null => 0,
            IndexData::Bin(items) => items.len() as u32,
            IndexData::Char(items) => items.len() as u32,
            IndexData::I18NString(items) => items.len() as u32,
            IndexData::StringTag(_) => 1,
            IndexData::StringArray(items) => items.len() as u32,
            IndexData::Int8(items) => items.len() as u32,
            IndexData::Int16(items) => items.len() as u32,
            IndexData::Int32(items) => items.len() as u32,
            IndexData::Int64(items) => items.len() as u32,
        }
    }

    pub(crate) fn from_type_as_u32(i: u32) -> Option<Self> {
        match i {
            0 => Some(IndexData::Null),
            1 => Some(IndexData::Char(Vec::new())),
            2 => Some(IndexData::Int8(Vec::new())),
            3 => Some(IndexData::Int16(Vec::new())),
            4 => Some(IndexData::Int32(Vec::new())),
            5 => Some(IndexData::Int64(Vec::new())),
            6 => Some(IndexData::StringTag(String::new())),
            7 => Some(IndexData::Bin(Vec::new())),
            8 => Some(IndexData::StringArray(Vec::new())),
            9 => Some(IndexData::I18NString(Vec::new())),
            _ => None,
        }
    }

    pub(crate) fn type_as_u32(&self) -> u32 {
        match self {
            IndexData::Null => 0,
            IndexData::Char(_) => 1,
            IndexData::Int8(_) => 2,
            IndexData::Int16(_) => 3,
            IndexData::Int32(_) => 4,
            IndexData::Int64(_) => 5,
            IndexData::StringTag(_) => 6,
            IndexData::Bin(_) => 7,
            IndexData::StringArray(_) => 8,
            IndexData::I18NString(_) => 9,
        }
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            IndexData::StringTag(s) => Some(s),
            IndexData::I18NString(s) => s.first().map(String::as_str),
            _ => None,
        }
    }

    pub(crate) fn as_u16_array(&self) -> Option<&[u16]> {
        match self {
            IndexData::Int16(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn as_u32_array(&self) -> Option<&[u32]> {
        match self {
            IndexData::Int32(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn as_number(&self) -> Option<u64> {
        match self {
            IndexData::Int8(s) => s.first().map(|v| *v as u64),
            IndexData::Int16(s) => s.first().map(|v| *v as u64),
            IndexData::Int32(s) => s.first().map(|v| *v as u64),
            IndexData::Int64(s) => s.first().copied(),
            _ => None,
        }
    }

    pub(crate) fn as_string_array(&self) -> Option<&[String]> {
        match self {
            IndexData::StringArray(d) | IndexData::I18NString(d) => Some(d),
            _ => None,
        }
    }
}
