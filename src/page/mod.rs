//! Page frame shared by every page kind.
//!
//! Format:
//! ```text
//! [payload_len: u16]
//! [payload: payload_len bytes]
//! [zero fill]
//! [trailer: 16 bytes]
//!     [flags: u16][reserved: u16][rightlink: u32][leftlink: u32][crc32: u32]
//! ```
//!
//! The checksum covers every byte of the page except itself and is verified
//! whenever a page is parsed.

pub mod encode;
pub mod internal;
pub mod leaf;
pub mod meta;

pub use internal::{InternalItem, InternalPage};
pub use leaf::{FormatCounts, LeafFormat, LeafLayout, LeafView};
pub use meta::{read_meta, write_meta, MetaPage};

use crate::error::{Error, Result};
use crate::store::{BlockNumber, PageStore, INVALID_BLOCK};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the payload length prefix.
pub const PAGE_HEADER_SIZE: usize = 2;

/// Size of the page trailer.
pub const PAGE_TRAILER_SIZE: usize = 16;

/// Page holds leaf rows.
pub const FLAG_LEAF: u16 = 0x0001;

/// Page holds internal routing items.
pub const FLAG_INTERNAL: u16 = 0x0002;

/// Page is the metapage.
pub const FLAG_META: u16 = 0x0004;

/// Bytes available for the payload of a page.
pub fn payload_capacity(page_size: usize) -> usize {
    page_size.saturating_sub(PAGE_HEADER_SIZE + PAGE_TRAILER_SIZE)
}

/// Serialize a full page.
pub fn build_page(
    page_size: usize,
    flags: u16,
    rightlink: BlockNumber,
    leftlink: BlockNumber,
    payload: &[u8],
) -> Result<Vec<u8>> {
    if payload.len() > payload_capacity(page_size) {
        return Err(Error::capacity(format!(
            "payload of {} bytes does not fit a page of {} bytes",
            payload.len(),
            page_size
        )));
    }

    let mut buf = BytesMut::with_capacity(page_size);
    buf.put_u16_le(payload.len() as u16);
    buf.put_slice(payload);
    buf.resize(page_size - PAGE_TRAILER_SIZE, 0);
    buf.put_u16_le(flags);
    buf.put_u16_le(0);
    buf.put_u32_le(rightlink);
    buf.put_u32_le(leftlink);
    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);
    Ok(buf.to_vec())
}

/// A parsed, checksum-verified page.
///
/// Holding a `Page` keeps the underlying buffer pinned.
#[derive(Debug, Clone)]
pub struct Page {
    blk: BlockNumber,
    data: Bytes,
    payload_len: usize,
    flags: u16,
    rightlink: BlockNumber,
    leftlink: BlockNumber,
}

impl Page {
    /// Parse the raw bytes of block `blk`.
    pub fn parse(blk: BlockNumber, data: Bytes) -> Result<Self> {
        let size = data.len();
        if size < PAGE_HEADER_SIZE + PAGE_TRAILER_SIZE {
            return Err(Error::corruption(format!("block {}: page of {} bytes", blk, size)));
        }

        let mut crc_bytes = &data[size - 4..];
        let expected = crc_bytes.get_u32_le();
        let actual = crc32fast::hash(&data[..size - 4]);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let mut trailer = &data[size - PAGE_TRAILER_SIZE..size - 4];
        let flags = trailer.get_u16_le();
        let _reserved = trailer.get_u16_le();
        let rightlink = trailer.get_u32_le();
        let leftlink = trailer.get_u32_le();

        let payload_len = (&data[..2]).get_u16_le() as usize;
        if payload_len > payload_capacity(size) {
            return Err(Error::corruption(format!(
                "block {}: payload length {} exceeds capacity {}",
                blk,
                payload_len,
                payload_capacity(size)
            )));
        }

        Ok(Self { blk, data, payload_len, flags, rightlink, leftlink })
    }

    /// Read and parse a page from a store.
    pub fn read(store: &dyn PageStore, blk: BlockNumber) -> Result<Self> {
        if blk == INVALID_BLOCK {
            return Err(Error::corruption("read of the invalid block"));
        }
        Self::parse(blk, store.read_page(blk)?)
    }

    /// Block number the page was read from.
    pub fn block(&self) -> BlockNumber {
        self.blk
    }

    /// Payload bytes.
    pub fn payload(&self) -> Bytes {
        self.data.slice(PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + self.payload_len)
    }

    /// Raw flag bits.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// True for leaf pages.
    pub fn is_leaf(&self) -> bool {
        self.flags & FLAG_LEAF != 0
    }

    /// True for internal pages.
    pub fn is_internal(&self) -> bool {
        self.flags & FLAG_INTERNAL != 0
    }

    /// True for the metapage.
    pub fn is_meta(&self) -> bool {
        self.flags & FLAG_META != 0
    }

    /// Right sibling, or `INVALID_BLOCK`.
    pub fn rightlink(&self) -> BlockNumber {
        self.rightlink
    }

    /// Left sibling, or `INVALID_BLOCK`.
    pub fn leftlink(&self) -> BlockNumber {
        self.leftlink
    }
}

/// Writes one level of sibling pages, linking each page to its neighbours.
///
/// The last appended page is held back until its right sibling's block
/// number is known.
pub struct ChainWriter<'a> {
    store: &'a dyn PageStore,
    flags: u16,
    pending: Option<(BlockNumber, Vec<u8>)>,
    prev: BlockNumber,
}

impl<'a> ChainWriter<'a> {
    /// Start a new chain of pages carrying `flags`.
    pub fn new(store: &'a dyn PageStore, flags: u16) -> Self {
        Self { store, flags, pending: None, prev: INVALID_BLOCK }
    }

    /// Allocate a block for `payload` and return it.
    pub fn append(&mut self, payload: Vec<u8>) -> Result<BlockNumber> {
        if payload.len() > payload_capacity(self.store.page_size()) {
            return Err(Error::capacity(format!(
                "payload of {} bytes does not fit a page of {} bytes",
                payload.len(),
                self.store.page_size()
            )));
        }
        let blk = self.store.allocate()?;
        self.flush(blk)?;
        self.pending = Some((blk, payload));
        Ok(blk)
    }

    /// Write the held-back page.
    pub fn finish(mut self) -> Result<()> {
        self.flush(INVALID_BLOCK)
    }

    fn flush(&mut self, rightlink: BlockNumber) -> Result<()> {
        if let Some((blk, payload)) = self.pending.take() {
            let page =
                build_page(self.store.page_size(), self.flags, rightlink, self.prev, &payload)?;
            self.store.write_page(blk, &page)?;
            self.prev = blk;
        }
        Ok(())
    }
}
