//! Header page (page 0) and meta-page chain: the durable atomic-commit
//! mechanism.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};
use crate::io::RandomAccessFile;
use crate::page::{flags as pflags, Page, PAGEHDRSZ};

/// Magic constant identifying a valid database file.
pub const MAGIC: u32 = 0xB3DB_B3DB;
/// On-disk format version this crate writes and expects.
pub const VERSION: u32 = 4;

/// Meta-page flag: the file has been replaced by a compactor.
pub const TOMBSTONE: u32 = 0x01;

const HEADER_BODY_LEN: usize = 4 + 4 + 4 + 4; // magic, version, flags, psize
const META_BODY_LEN: usize = 4 + 4 + 4 + 8 + 4 + 4 + 4 + 4 + 4 + 8 + 32;
const META_HASH_LEN: usize = META_BODY_LEN - 32;

/// Decoded header page (page 0) contents.
#[derive(Clone, Copy, Debug)]
pub struct HeaderPage {
    pub magic: u32,
    pub version: u32,
    pub flags: u32,
    pub psize: u32,
}

impl HeaderPage {
    pub fn new(psize: u32) -> Self {
        HeaderPage {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            psize,
        }
    }

    pub fn encode(&self, psize_for_page: u32) -> Page {
        let mut p = Page::new_empty(psize_for_page, 0, pflags::HEAD);
        let body = &mut p.buf[PAGEHDRSZ..PAGEHDRSZ + HEADER_BODY_LEN];
        body[0..4].copy_from_slice(&self.magic.to_le_bytes());
        body[4..8].copy_from_slice(&self.version.to_le_bytes());
        body[8..12].copy_from_slice(&self.flags.to_le_bytes());
        body[12..16].copy_from_slice(&self.psize.to_le_bytes());
        p
    }

    pub fn decode(page: &Page) -> Result<Self> {
        if !page.is_head() {
            return Err(Error::Corrupt("page 0 is not a header page".into()));
        }
        let body = &page.buf[PAGEHDRSZ..PAGEHDRSZ + HEADER_BODY_LEN];
        let magic = u32::from_le_bytes(body[0..4].try_into().unwrap());
        let version = u32::from_le_bytes(body[4..8].try_into().unwrap());
        let flags = u32::from_le_bytes(body[8..12].try_into().unwrap());
        let psize = u32::from_le_bytes(body[12..16].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::Corrupt(format!(
                "bad magic: expected {MAGIC:#x}, found {magic:#x}"
            )));
        }
        if version != VERSION {
            return Err(Error::Corrupt(format!(
                "unsupported format version {version}, expected {VERSION}"
            )));
        }
        Ok(HeaderPage {
            magic,
            version,
            flags,
            psize,
        })
    }
}

/// Decoded meta (footer) page contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetaPage {
    pub flags: u32,
    pub root: u32,
    pub prev_meta: u32,
    pub created_at: i64,
    pub branch_pages: u32,
    pub leaf_pages: u32,
    pub overflow_pages: u32,
    pub revisions: u32,
    pub depth: u32,
    pub entries: u64,
    pub hash: [u8; 32],
}

impl MetaPage {
    pub fn is_tombstone(&self) -> bool {
        self.flags & TOMBSTONE != 0
    }

    fn write_body(&self, body: &mut [u8]) {
        body[0..4].copy_from_slice(&self.flags.to_le_bytes());
        body[4..8].copy_from_slice(&self.root.to_le_bytes());
        body[8..12].copy_from_slice(&self.prev_meta.to_le_bytes());
        body[12..20].copy_from_slice(&self.created_at.to_le_bytes());
        body[20..24].copy_from_slice(&self.branch_pages.to_le_bytes());
        body[24..28].copy_from_slice(&self.leaf_pages.to_le_bytes());
        body[28..32].copy_from_slice(&self.overflow_pages.to_le_bytes());
        body[32..36].copy_from_slice(&self.revisions.to_le_bytes());
        body[36..40].copy_from_slice(&self.depth.to_le_bytes());
        body[40..48].copy_from_slice(&self.entries.to_le_bytes());
        body[48..80].copy_from_slice(&self.hash);
    }

    /// Compute the SHA-256 hash over the body excluding the trailing hash
    /// field itself.
    fn compute_hash(&self) -> [u8; 32] {
        let mut body = [0u8; META_BODY_LEN];
        self.write_body(&mut body);
        let mut hasher = Sha256::new();
        hasher.update(&body[..META_HASH_LEN]);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }

    /// Finalize `hash` from the other fields and encode as a full page.
    pub fn encode(&self, pgno: u32, psize: u32) -> Page {
        let mut me = *self;
        me.hash = me.compute_hash();
        let mut p = Page::new_empty(psize, pgno, pflags::META);
        let body = &mut p.buf[PAGEHDRSZ..PAGEHDRSZ + META_BODY_LEN];
        me.write_body(body);
        p
    }

    /// Validate and decode a meta page: checks the `META` flag, the
    /// hash, and that `root` is either `P_INVALID` or strictly less than
    /// the page's own number (every root predates its meta page).
    pub fn decode(page: &Page) -> Result<Self> {
        if !page.is_meta() {
            return Err(Error::Corrupt("not a meta page".into()));
        }
        let body = &page.buf[PAGEHDRSZ..PAGEHDRSZ + META_BODY_LEN];
        let flags = u32::from_le_bytes(body[0..4].try_into().unwrap());
        let root = u32::from_le_bytes(body[4..8].try_into().unwrap());
        let prev_meta = u32::from_le_bytes(body[8..12].try_into().unwrap());
        let created_at = i64::from_le_bytes(body[12..20].try_into().unwrap());
        let branch_pages = u32::from_le_bytes(body[20..24].try_into().unwrap());
        let leaf_pages = u32::from_le_bytes(body[24..28].try_into().unwrap());
        let overflow_pages = u32::from_le_bytes(body[28..32].try_into().unwrap());
        let revisions = u32::from_le_bytes(body[32..36].try_into().unwrap());
        let depth = u32::from_le_bytes(body[36..40].try_into().unwrap());
        let entries = u64::from_le_bytes(body[40..48].try_into().unwrap());
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&body[48..80]);

        let meta = MetaPage {
            flags,
            root,
            prev_meta,
            created_at,
            branch_pages,
            leaf_pages,
            overflow_pages,
            revisions,
            depth,
            entries,
            hash,
        };

        if meta.root != crate::page::P_INVALID && meta.root >= page.pgno() {
            return Err(Error::Corrupt(
                "meta page's root is not older than the meta page itself".into(),
            ));
        }

        let mut unhashed = meta;
        unhashed.hash = [0u8; 32];
        if unhashed.compute_hash() != hash {
            return Err(Error::Corrupt("meta page hash mismatch".into()));
        }

        Ok(meta)
    }
}

/// Result of scanning the file for the most recent valid meta page at open
/// time.
pub struct MetaScan {
    pub meta: MetaPage,
    pub meta_pgno: u32,
    pub next_pgno: u32,
    pub fix_padding: bool,
}

/// Scan backward from end-of-file looking for the newest valid meta page.
///
/// `size == psize` (only the header) means an empty tree. A non-multiple
/// file size records `fix_padding` so the next write commit truncates back
/// to a page boundary, recovering from a process that crashed mid-append
/// before its meta page landed.
pub fn read_meta(io: &mut dyn RandomAccessFile, psize: u32) -> Result<MetaScan> {
    let size = io.len()?;
    let psize64 = psize as u64;

    if size == psize64 {
        return Ok(MetaScan {
            meta: MetaPage {
                flags: 0,
                root: crate::page::P_INVALID,
                prev_meta: crate::page::P_INVALID,
                created_at: 0,
                branch_pages: 0,
                leaf_pages: 0,
                overflow_pages: 0,
                revisions: 0,
                depth: 0,
                entries: 0,
                hash: [0u8; 32],
            },
            meta_pgno: crate::page::P_INVALID,
            next_pgno: 1,
            fix_padding: false,
        });
    }

    let fix_padding = size % psize64 != 0;
    let last_full_pgno = (size / psize64).saturating_sub(1);

    let mut pgno = last_full_pgno;
    loop {
        let mut buf = vec![0u8; psize as usize];
        io.read_at(pgno * psize64, &mut buf)?;
        let page = Page::from_bytes(buf);
        if page.pgno() == pgno as u32 {
            if let Ok(meta) = MetaPage::decode(&page) {
                if meta.is_tombstone() {
                    warn!(pgno, "observed tombstoned meta page; file was replaced");
                    return Err(Error::Stale);
                }
                let next_pgno = if fix_padding {
                    (size / psize64 + 1) as u32
                } else {
                    (size / psize64) as u32
                };
                return Ok(MetaScan {
                    meta,
                    meta_pgno: pgno as u32,
                    next_pgno,
                    fix_padding,
                });
            }
        }
        if pgno == 0 {
            break;
        }
        pgno -= 1;
    }

    Err(Error::Corrupt(
        "no valid meta page found scanning backward from end of file".into(),
    ))
}
