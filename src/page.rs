//! On-disk page layout and node-record arithmetic.
//!
//! Every page starts with a 12-byte header: a 4-byte page number, a 4-byte
//! flags word naming the page kind, and a 4-byte union that means
//! `(lower, upper)` free-space offsets for branch/leaf pages or a single
//! `next` page-number link for overflow pages. Meta and header pages reuse
//! the same 12-byte prefix for the page number and flags but interpret the
//! union field as padding; their bodies start right after it.

use crate::error::{Error, Result};

/// Sentinel meaning "no page".
pub const P_INVALID: u32 = 0xFFFF_FFFF;

/// Size in bytes of the common page header.
pub const PAGEHDRSZ: usize = 12;

/// Size in bytes of a node record's fixed header (union + ksize + flags).
pub const NODEHDRSZ: usize = 7;

/// Maximum key length.
pub const MAXKEYSIZE: usize = 255;

/// Minimum fill divisor used to decide overflow placement and split math.
pub const BT_MINKEYS: u32 = 4;

/// Fill threshold, per-mille, below which a non-root page must rebalance.
pub const FILL_THRESHOLD: u32 = 250;

/// Page-kind flag bits (mutually exclusive except `HEAD`, which never
/// coexists with the others in this implementation).
pub mod flags {
    /// Branch (internal) page.
    pub const BRANCH: u32 = 0x01;
    /// Leaf page.
    pub const LEAF: u32 = 0x02;
    /// Overflow (large-value continuation) page.
    pub const OVERFLOW: u32 = 0x04;
    /// Meta page.
    pub const META: u32 = 0x08;
    /// Header page (page 0).
    pub const HEAD: u32 = 0x10;
}

/// Node record flag bits.
pub mod node_flags {
    /// The inline payload is a 4-byte page-number reference to an overflow chain.
    pub const F_BIGDATA: u8 = 0x01;
}

/// A decoded view over one node record living inside a page's data region.
#[derive(Clone, Copy, Debug)]
pub struct NodeView<'a> {
    /// Child page number (branch) or the node's data size (leaf).
    pub pgno_or_dsize: u32,
    pub flags: u8,
    pub key: &'a [u8],
    /// Inline payload: either leaf data, or (if `F_BIGDATA`) 4 bytes holding
    /// the overflow chain's head page number. Empty for branch nodes.
    pub data: &'a [u8],
}

impl<'a> NodeView<'a> {
    pub fn is_bigdata(&self) -> bool {
        self.flags & node_flags::F_BIGDATA != 0
    }

    /// Logical data size: for `F_BIGDATA` this is the size recorded in the
    /// header (the true value length), not the 4 inline bytes.
    pub fn dsize(&self) -> u32 {
        self.pgno_or_dsize
    }

    pub fn child_pgno(&self) -> u32 {
        self.pgno_or_dsize
    }

    pub fn overflow_head(&self) -> u32 {
        debug_assert!(self.is_bigdata());
        u32::from_le_bytes(self.data[0..4].try_into().unwrap())
    }
}

/// An owned, mutable page buffer of exactly `psize` bytes.
#[derive(Clone)]
pub struct Page {
    pub buf: Vec<u8>,
}

impl Page {
    /// Allocate a zeroed buffer of `psize` bytes tagged with `pgno`/`flags`,
    /// with an empty branch/leaf free-space region (`lower = PAGEHDRSZ`,
    /// `upper = psize`). Not meaningful for overflow pages; use
    /// [`Page::new_overflow`] instead.
    pub fn new_empty(psize: u32, pgno: u32, flags: u32) -> Self {
        let mut p = Page {
            buf: vec![0u8; psize as usize],
        };
        p.set_pgno(pgno);
        p.set_flags(flags);
        p.set_lower(PAGEHDRSZ as u16);
        p.set_upper(psize as u16);
        p
    }

    pub fn new_overflow(psize: u32, pgno: u32) -> Self {
        let mut p = Page {
            buf: vec![0u8; psize as usize],
        };
        p.set_pgno(pgno);
        p.set_flags(flags::OVERFLOW);
        p.set_overflow_next(P_INVALID);
        p
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Page { buf }
    }

    pub fn psize(&self) -> u32 {
        self.buf.len() as u32
    }

    pub fn pgno(&self) -> u32 {
        u32::from_le_bytes(self.buf[0..4].try_into().unwrap())
    }

    pub fn set_pgno(&mut self, pgno: u32) {
        self.buf[0..4].copy_from_slice(&pgno.to_le_bytes());
    }

    pub fn page_flags(&self) -> u32 {
        u32::from_le_bytes(self.buf[4..8].try_into().unwrap())
    }

    pub fn set_flags(&mut self, f: u32) {
        self.buf[4..8].copy_from_slice(&f.to_le_bytes());
    }

    pub fn is_leaf(&self) -> bool {
        self.page_flags() & flags::LEAF != 0
    }

    pub fn is_branch(&self) -> bool {
        self.page_flags() & flags::BRANCH != 0
    }

    pub fn is_overflow(&self) -> bool {
        self.page_flags() & flags::OVERFLOW != 0
    }

    pub fn is_meta(&self) -> bool {
        self.page_flags() & flags::META != 0
    }

    pub fn is_head(&self) -> bool {
        self.page_flags() & flags::HEAD != 0
    }

    // --- branch/leaf free-space bounds ---

    pub fn lower(&self) -> u16 {
        u16::from_le_bytes(self.buf[8..10].try_into().unwrap())
    }

    pub fn set_lower(&mut self, v: u16) {
        self.buf[8..10].copy_from_slice(&v.to_le_bytes());
    }

    pub fn upper(&self) -> u16 {
        u16::from_le_bytes(self.buf[10..12].try_into().unwrap())
    }

    pub fn set_upper(&mut self, v: u16) {
        self.buf[10..12].copy_from_slice(&v.to_le_bytes());
    }

    // --- overflow link ---

    pub fn overflow_next(&self) -> u32 {
        u32::from_le_bytes(self.buf[8..12].try_into().unwrap())
    }

    pub fn set_overflow_next(&mut self, pgno: u32) {
        self.buf[8..12].copy_from_slice(&pgno.to_le_bytes());
    }

    pub fn overflow_data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[PAGEHDRSZ..]
    }

    pub fn overflow_data(&self) -> &[u8] {
        &self.buf[PAGEHDRSZ..]
    }

    // --- branch/leaf node directory ---

    pub fn numkeys(&self) -> u16 {
        (self.lower() - PAGEHDRSZ as u16) / 2
    }

    pub fn sizeleft(&self) -> u16 {
        self.upper() - self.lower()
    }

    /// `PAGEFILL`, per-mille fullness of the usable region.
    pub fn pagefill(&self) -> u32 {
        let usable = self.psize() - PAGEHDRSZ as u32;
        if usable == 0 {
            return 1000;
        }
        1000 * (usable - self.sizeleft() as u32) / usable
    }

    pub fn below_threshold(&self) -> bool {
        self.pagefill() < FILL_THRESHOLD
    }

    fn slot_offset(&self, i: u16) -> u16 {
        let at = PAGEHDRSZ + i as usize * 2;
        u16::from_le_bytes(self.buf[at..at + 2].try_into().unwrap())
    }

    fn set_slot_offset(&mut self, i: u16, off: u16) {
        let at = PAGEHDRSZ + i as usize * 2;
        self.buf[at..at + 2].copy_from_slice(&off.to_le_bytes());
    }

    /// Patch a branch node's child page number in place, without touching
    /// its key or resizing anything. Used by the copy-on-write `touch`
    /// protocol to repoint a parent at a child's new page number.
    pub fn set_child_pgno(&mut self, indx: u16, pgno: u32) {
        let off = self.slot_offset(indx) as usize;
        self.buf[off..off + 4].copy_from_slice(&pgno.to_le_bytes());
    }

    /// Decode the node at slot `i`.
    pub fn node(&self, i: u16) -> NodeView<'_> {
        let off = self.slot_offset(i) as usize;
        let pgno_or_dsize = u32::from_le_bytes(self.buf[off..off + 4].try_into().unwrap());
        let ksize = u16::from_le_bytes(self.buf[off + 4..off + 6].try_into().unwrap()) as usize;
        let node_flags = self.buf[off + 6];
        let key_start = off + NODEHDRSZ;
        let key = &self.buf[key_start..key_start + ksize];
        let data = if self.is_leaf() {
            let data_start = key_start + ksize;
            let data_len = if node_flags & node_flags::F_BIGDATA != 0 {
                4
            } else {
                pgno_or_dsize as usize
            };
            &self.buf[data_start..data_start + data_len]
        } else {
            &self.buf[0..0]
        };
        NodeView {
            pgno_or_dsize,
            flags: node_flags,
            key,
            data,
        }
    }

    /// Size in bytes a node record would occupy, including its slot entry.
    pub fn node_size(key_len: usize, data_len: usize, is_leaf: bool, node_flags: u8) -> usize {
        let mut sz = NODEHDRSZ + key_len;
        if is_leaf {
            sz += if node_flags & node_flags::F_BIGDATA != 0 {
                4
            } else {
                data_len
            };
        }
        sz + 2 // slot entry
    }

    /// Insert a node at slot `indx`, shifting the slot directory. `data` is
    /// ignored for branch pages. Fails if there isn't room; callers must
    /// check `sizeleft()` against [`Page::node_size`] first (mirrors
    /// `screwdb`'s `btree_add_node`, which returns `BT_FAIL` rather than
    /// growing the page).
    pub fn add_node(
        &mut self,
        indx: u16,
        key: &[u8],
        data: &[u8],
        child_or_dsize: u32,
        node_flags: u8,
    ) -> Result<()> {
        let is_leaf = self.is_leaf();
        let record_len = NODEHDRSZ
            + key.len()
            + if is_leaf {
                if node_flags & node_flags::F_BIGDATA != 0 {
                    4
                } else {
                    data.len()
                }
            } else {
                0
            };
        if record_len + 2 > self.sizeleft() as usize {
            return Err(Error::Corrupt(
                "add_node: insufficient space on page (caller must split first)".into(),
            ));
        }

        let numkeys = self.numkeys();
        for i in (indx..numkeys).rev() {
            let v = self.slot_offset(i);
            self.set_slot_offset(i + 1, v);
        }

        let ofs = self.upper() as usize - record_len;
        self.set_slot_offset(indx, ofs as u16);
        self.set_upper(ofs as u16);
        self.set_lower(self.lower() + 2);

        self.buf[ofs..ofs + 4].copy_from_slice(&child_or_dsize.to_le_bytes());
        self.buf[ofs + 4..ofs + 6].copy_from_slice(&(key.len() as u16).to_le_bytes());
        self.buf[ofs + 6] = node_flags;
        let key_start = ofs + NODEHDRSZ;
        self.buf[key_start..key_start + key.len()].copy_from_slice(key);
        if is_leaf {
            let data_start = key_start + key.len();
            let inline_len = if node_flags & node_flags::F_BIGDATA != 0 {
                4
            } else {
                data.len()
            };
            self.buf[data_start..data_start + inline_len].copy_from_slice(&data[..inline_len]);
        }
        Ok(())
    }

    /// Remove the node at slot `indx`, compacting the data region
    /// (`screwdb`'s `btree_del_node`).
    pub fn del_node(&mut self, indx: u16) {
        let node = self.node(indx);
        let mut sz = NODEHDRSZ + node.key.len();
        if self.is_leaf() {
            sz += node.data.len();
        }
        let ptr = self.slot_offset(indx);
        let numkeys = self.numkeys();

        let mut j = 0u16;
        for i in 0..numkeys {
            if i != indx {
                let mut v = self.slot_offset(i);
                if v < ptr {
                    v += sz as u16;
                }
                self.set_slot_offset(j, v);
                j += 1;
            }
        }

        let upper = self.upper() as usize;
        let base = upper;
        let shift_len = ptr as usize - upper;
        // Shift everything below `ptr` (i.e. the data at higher addresses,
        // between `upper` and `ptr`) down by `sz` bytes.
        self.buf.copy_within(base..base + shift_len, base + sz);
        self.set_lower(self.lower() - 2);
        self.set_upper((upper + sz) as u16);
    }

    /// Resize the key stored at slot `indx`; used by `update_key` for
    /// separator rewrites after prefix changes. `indx` must already hold a
    /// node (the data payload, if any, is preserved).
    pub fn update_key(&mut self, indx: u16, new_key: &[u8]) -> Result<()> {
        let node = self.node(indx);
        let (child_or_dsize, node_flags) = (node.pgno_or_dsize, node.flags);
        let data_owned: Vec<u8> = node.data.to_vec();
        self.del_node(indx);
        self.add_node(indx, new_key, &data_owned, child_or_dsize, node_flags)
    }

    /// Patch a leaf node's overflow-chain head pointer in place, without
    /// touching its key or resizing anything. Used by the compactor to
    /// remap overflow chains onto their freshly written page numbers.
    pub fn set_overflow_head(&mut self, indx: u16, pgno: u32) {
        let node = self.node(indx);
        debug_assert!(node.is_bigdata());
        let off = self.slot_offset(indx) as usize;
        let ksize = u16::from_le_bytes(self.buf[off + 4..off + 6].try_into().unwrap()) as usize;
        let data_start = off + NODEHDRSZ + ksize;
        self.buf[data_start..data_start + 4].copy_from_slice(&pgno.to_le_bytes());
    }
}
