//! Metapage: the root of everything a reader needs to open an index.

use crate::config::KeyRleVersion;
use crate::error::{Error, Result};
use crate::page::{build_page, Page, FLAG_META};
use crate::store::{BlockNumber, PageStore, INVALID_BLOCK, META_BLOCK};
use crate::types::{Collation, KeyType, MAX_INCLUDE_COLUMNS};
use bytes::{Buf, BufMut};

/// Magic number identifying a metapage ("SMOL").
pub const META_MAGIC: u32 = 0x534D_4F4C;

/// On-disk format version.
pub const META_VERSION: u32 = 1;

/// Stored type and width of an INCLUDE column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeMeta {
    /// Column type.
    pub ty: KeyType,
    /// Stored width in bytes.
    pub len: u16,
}

/// Decoded metapage.
///
/// Format:
/// ```text
/// [magic: u32][version: u32][page_size: u32]
/// [nkeyatts: u8][key_type1: u8][key_len1: u16][key_type2: u8][key_len2: u16]
/// [collation: u8][root: u32][height: u16]
/// [flags: u8 (bit 0 zone maps, bit 1 bloom)][bloom_nhash: u8][key_rle_version: u8]
/// [row_count: u64]
/// [inc_count: u8] ([inc_type: u8][inc_len: u16]) * inc_count
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MetaPage {
    /// Page size the index was built with.
    pub page_size: u32,
    /// Number of key columns (1 or 2).
    pub nkeyatts: u8,
    /// Type of the first key column.
    pub key_type1: KeyType,
    /// Stored width of the first key column.
    pub key_len1: u16,
    /// Type of the second key column, if any.
    pub key_type2: Option<KeyType>,
    /// Stored width of the second key column (0 when absent).
    pub key_len2: u16,
    /// Collation of the first key column.
    pub collation: Collation,
    /// Root block, `INVALID_BLOCK` for an empty index.
    pub root: BlockNumber,
    /// Levels from root to leaf inclusive; 0 for an empty index.
    pub height: u16,
    /// INCLUDE columns.
    pub includes: Vec<IncludeMeta>,
    /// Internal items carry zone maps.
    pub zone_maps: bool,
    /// Internal items carry bloom filters.
    pub bloom_enabled: bool,
    /// Hash functions used by the bloom filters.
    pub bloom_nhash: u8,
    /// Key-RLE tag written by the build.
    pub key_rle_version: KeyRleVersion,
    /// Total rows in the index.
    pub row_count: u64,
}

impl MetaPage {
    /// A metapage for an index with no root yet.
    pub fn empty(page_size: u32, key_type1: KeyType, key_len1: u16) -> Self {
        Self {
            page_size,
            nkeyatts: 1,
            key_type1,
            key_len1,
            key_type2: None,
            key_len2: 0,
            collation: Collation::Binary,
            root: INVALID_BLOCK,
            height: 0,
            includes: Vec::new(),
            zone_maps: false,
            bloom_enabled: false,
            bloom_nhash: 0,
            key_rle_version: KeyRleVersion::V2,
            row_count: 0,
        }
    }

    /// True when the index holds no rows.
    pub fn is_empty(&self) -> bool {
        self.root == INVALID_BLOCK || self.height == 0
    }

    /// Encode to a page payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(48 + self.includes.len() * 3);
        buf.put_u32_le(META_MAGIC);
        buf.put_u32_le(META_VERSION);
        buf.put_u32_le(self.page_size);
        buf.put_u8(self.nkeyatts);
        buf.put_u8(self.key_type1 as u8);
        buf.put_u16_le(self.key_len1);
        buf.put_u8(self.key_type2.map_or(0, |t| t as u8));
        buf.put_u16_le(self.key_len2);
        buf.put_u8(self.collation as u8);
        buf.put_u32_le(self.root);
        buf.put_u16_le(self.height);
        let mut flags = 0u8;
        if self.zone_maps {
            flags |= 0x01;
        }
        if self.bloom_enabled {
            flags |= 0x02;
        }
        buf.put_u8(flags);
        buf.put_u8(self.bloom_nhash);
        buf.put_u8(self.key_rle_version as u8);
        buf.put_u64_le(self.row_count);
        buf.put_u8(self.includes.len() as u8);
        for inc in &self.includes {
            buf.put_u8(inc.ty as u8);
            buf.put_u16_le(inc.len);
        }
        buf
    }

    /// Decode from a page payload.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        const FIXED: usize = 4 + 4 + 4 + 1 + 1 + 2 + 1 + 2 + 1 + 4 + 2 + 1 + 1 + 1 + 8 + 1;
        if data.len() < FIXED {
            return Err(Error::corruption(format!("metapage of {} bytes is truncated", data.len())));
        }

        let magic = data.get_u32_le();
        if magic != META_MAGIC {
            return Err(Error::corruption(format!(
                "Invalid metapage magic number: expected {:#x}, got {:#x}",
                META_MAGIC, magic
            )));
        }
        let version = data.get_u32_le();
        if version != META_VERSION {
            return Err(Error::corruption(format!("unsupported metapage version {}", version)));
        }

        let page_size = data.get_u32_le();
        let nkeyatts = data.get_u8();
        let key_type1 = decode_type(data.get_u8())?;
        let key_len1 = data.get_u16_le();
        let key_type2 = match data.get_u8() {
            0 => None,
            code => Some(decode_type(code)?),
        };
        let key_len2 = data.get_u16_le();
        let collation = Collation::from_u8(data.get_u8())
            .ok_or_else(|| Error::corruption("unknown collation id in metapage"))?;
        let root = data.get_u32_le();
        let height = data.get_u16_le();
        let flags = data.get_u8();
        let bloom_nhash = data.get_u8();
        let key_rle_version = KeyRleVersion::from_u8(data.get_u8())
            .ok_or_else(|| Error::corruption("unknown key RLE version in metapage"))?;
        let row_count = data.get_u64_le();
        let inc_count = data.get_u8() as usize;

        if !(1..=2).contains(&nkeyatts) || (nkeyatts == 2) != key_type2.is_some() {
            return Err(Error::corruption(format!("metapage has {} key columns", nkeyatts)));
        }
        if key_len1 == 0 || (nkeyatts == 2 && key_len2 == 0) {
            return Err(Error::corruption("metapage has a zero key width"));
        }
        if inc_count > MAX_INCLUDE_COLUMNS || data.remaining() < inc_count * 3 {
            return Err(Error::corruption(format!("metapage has {} INCLUDE columns", inc_count)));
        }

        let mut includes = Vec::with_capacity(inc_count);
        for _ in 0..inc_count {
            let ty = decode_type(data.get_u8())?;
            let len = data.get_u16_le();
            if len == 0 {
                return Err(Error::corruption("metapage has a zero INCLUDE width"));
            }
            includes.push(IncludeMeta { ty, len });
        }

        Ok(Self {
            page_size,
            nkeyatts,
            key_type1,
            key_len1,
            key_type2,
            key_len2,
            collation,
            root,
            height,
            includes,
            zone_maps: flags & 0x01 != 0,
            bloom_enabled: flags & 0x02 != 0,
            bloom_nhash,
            key_rle_version,
            row_count,
        })
    }
}

/// Write the metapage into block 0.
pub fn write_meta(store: &dyn PageStore, meta: &MetaPage) -> Result<()> {
    let page = build_page(store.page_size(), FLAG_META, INVALID_BLOCK, INVALID_BLOCK, &meta.encode())?;
    store.write_page(META_BLOCK, &page)
}

/// Read the metapage from block 0.
pub fn read_meta(store: &dyn PageStore) -> Result<MetaPage> {
    if store.num_pages() == 0 {
        return Err(Error::corruption("page store has no metapage"));
    }
    let page = Page::read(store, META_BLOCK)?;
    if !page.is_meta() {
        return Err(Error::corruption("block 0 is not a metapage"));
    }
    let meta = MetaPage::decode(&page.payload())?;
    if meta.page_size as usize != store.page_size() {
        return Err(Error::corruption(format!(
            "index built with {} byte pages, store uses {}",
            meta.page_size,
            store.page_size()
        )));
    }
    Ok(meta)
}

fn decode_type(code: u8) -> Result<KeyType> {
    KeyType::from_u8(code)
        .ok_or_else(|| Error::corruption(format!("unknown type code {} in metapage", code)))
}
