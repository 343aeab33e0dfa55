//! Page fault-in, allocation, and the copy-on-write `touch` protocol.
//!
//! `Pager` is the seam between the byte-level [`crate::page`]/[`crate::cache`]
//! primitives and the tree mutators in [`crate::tree`]: every write to the
//! tree starts by calling [`Pager::touch`] on the page it's about to modify,
//! which guarantees the page is both dirty and exclusively owned by the
//! current transaction before a single byte changes.

use crate::cache::PageCache;
use crate::error::{Error, Result};
use crate::io::RandomAccessFile;
use crate::page::{Page, PAGEHDRSZ};
use crate::txn::Txn;

/// Bytes of payload a single overflow page can hold.
pub fn overflow_capacity(psize: u32) -> usize {
    psize as usize - PAGEHDRSZ - 4 // minus the `next` link
}

/// Owns the file handle, the page cache, and the page size for one open
/// database.
pub struct Pager {
    io: Box<dyn RandomAccessFile>,
    psize: u32,
    pub cache: PageCache,
}

impl Pager {
    pub fn new(io: Box<dyn RandomAccessFile>, psize: u32, max_cache: usize) -> Self {
        Pager {
            io,
            psize,
            cache: PageCache::new(max_cache),
        }
    }

    pub fn psize(&self) -> u32 {
        self.psize
    }

    pub fn io_mut(&mut self) -> &mut dyn RandomAccessFile {
        self.io.as_mut()
    }

    /// Fault `pgno` into the cache if it isn't already resident, verifying
    /// the page read back claims the page number it was read at (mirrors
    /// `btree_read_page`'s corruption check).
    pub fn fetch(&mut self, pgno: u32) -> Result<()> {
        if self.cache.contains(pgno) {
            self.cache.touch_access(pgno);
            return Ok(());
        }
        let mut buf = vec![0u8; self.psize as usize];
        self.io.read_at(pgno as u64 * self.psize as u64, &mut buf)?;
        let page = Page::from_bytes(buf);
        if page.pgno() != pgno {
            return Err(Error::Corrupt(format!(
                "page {pgno}: on-disk page number {} does not match its offset",
                page.pgno()
            )));
        }
        self.cache.insert(page);
        Ok(())
    }

    /// Fault in and return an immutable view of `pgno`.
    pub fn get(&mut self, pgno: u32) -> Result<&Page> {
        self.fetch(pgno)?;
        Ok(&self.cache.get(pgno).expect("just fetched").page)
    }

    /// Allocate a fresh page from `txn.next_pgno`, insert it into the cache
    /// already dirty, record it in the transaction's dirty set, and bump
    /// the matching page-kind counter the meta page will report.
    pub fn new_page(&mut self, txn: &mut Txn, flags: u32) -> u32 {
        let pgno = txn.next_pgno;
        txn.next_pgno += 1;
        let page = Page::new_empty(self.psize, pgno, flags);
        self.cache.insert(page);
        self.cache.mark_dirty(pgno);
        txn.mark_dirty(pgno);
        if flags & crate::page::flags::BRANCH != 0 {
            txn.branch_pages += 1;
        } else if flags & crate::page::flags::LEAF != 0 {
            txn.leaf_pages += 1;
        }
        pgno
    }

    /// Allocate a fresh overflow page the same way.
    pub fn new_overflow_page(&mut self, txn: &mut Txn) -> u32 {
        let pgno = txn.next_pgno;
        txn.next_pgno += 1;
        let page = Page::new_overflow(self.psize, pgno);
        self.cache.insert(page);
        self.cache.mark_dirty(pgno);
        txn.mark_dirty(pgno);
        txn.overflow_pages += 1;
        pgno
    }

    /// The copy-on-write primitive every tree mutator calls before changing
    /// a page's bytes. Grounded on `mpage_touch`:
    ///
    /// - If the page is already dirty this transaction, it's already safe
    ///   to mutate in place; return its page number unchanged.
    /// - If nothing else references it (`ref_count == 0`), reuse the cache
    ///   entry in place, just renumbering it.
    /// - Otherwise (a cursor holds it pinned) deep-copy its bytes into a new
    ///   cache entry, leaving the pinned original untouched at its old page
    ///   number.
    ///
    /// Either way the page is assigned a fresh number from `txn.next_pgno`
    /// (copy-on-write never overwrites a page another committed meta can
    /// still reach) and, if it has a parent, the parent's child pointer is
    /// patched to follow it. Callers must touch top-down (root to leaf) so
    /// the parent is already dirty by the time its child's pointer needs
    /// patching.
    pub fn touch(&mut self, txn: &mut Txn, pgno: u32) -> Result<u32> {
        let already_dirty = self
            .cache
            .get(pgno)
            .map(|mp| mp.dirty)
            .ok_or_else(|| Error::Corrupt(format!("touch: page {pgno} not cached")))?;
        if already_dirty {
            return Ok(pgno);
        }

        let pinned = self.cache.get(pgno).map(|mp| mp.ref_count > 0).unwrap_or(false);
        let new_pgno = txn.next_pgno;
        txn.next_pgno += 1;

        let (mut page, parent, parent_index, prefix) = if pinned {
            let mp = self
                .cache
                .get(pgno)
                .ok_or_else(|| Error::Corrupt(format!("touch: page {pgno} vanished")))?;
            (mp.page.clone(), mp.parent, mp.parent_index, mp.prefix.clone())
        } else {
            let mp = self
                .cache
                .remove(pgno)
                .ok_or_else(|| Error::Corrupt(format!("touch: page {pgno} vanished")))?;
            (mp.page, mp.parent, mp.parent_index, mp.prefix)
        };
        page.set_pgno(new_pgno);

        let new_mp = self.cache.insert(page);
        new_mp.parent = parent;
        new_mp.parent_index = parent_index;
        new_mp.prefix = prefix;
        self.cache.mark_dirty(new_pgno);
        txn.mark_dirty(new_pgno);

        if let Some(parent_pgno) = parent {
            let parent_mp = self
                .cache
                .get_mut(parent_pgno)
                .ok_or_else(|| Error::Corrupt(format!("touch: parent page {parent_pgno} not cached")))?;
            parent_mp.page.set_child_pgno(parent_index, new_pgno);
        }

        if txn.root == pgno {
            txn.root = new_pgno;
        }

        Ok(new_pgno)
    }

    /// Write a large value across a freshly allocated overflow chain,
    /// returning the head page number. Grounded on `btree_write_overflow_data`.
    pub fn write_overflow(&mut self, txn: &mut Txn, data: &[u8]) -> u32 {
        let cap = overflow_capacity(self.psize);
        let mut chunks: Vec<&[u8]> = data.chunks(cap).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }

        let pgnos: Vec<u32> = (0..chunks.len())
            .map(|_| self.new_overflow_page(txn))
            .collect();

        for (i, chunk) in chunks.iter().enumerate() {
            let next = if i + 1 < pgnos.len() {
                pgnos[i + 1]
            } else {
                crate::page::P_INVALID
            };
            let mp = self.cache.get_mut(pgnos[i]).expect("just allocated");
            mp.page.set_overflow_next(next);
            mp.page.overflow_data_mut()[..chunk.len()].copy_from_slice(chunk);
        }

        pgnos[0]
    }

    /// Read back a value previously written by [`Pager::write_overflow`],
    /// following the chain until `total_len` bytes are collected.
    pub fn read_overflow(&mut self, head: u32, total_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(total_len);
        let mut pgno = head;
        while out.len() < total_len {
            self.fetch(pgno)?;
            let page = &self.cache.get(pgno).expect("just fetched").page;
            if !page.is_overflow() {
                return Err(Error::Corrupt(format!(
                    "page {pgno}: expected overflow page while following chain"
                )));
            }
            let remaining = total_len - out.len();
            let take = remaining.min(overflow_capacity(self.psize));
            out.extend_from_slice(&page.overflow_data()[..take]);
            let next = page.overflow_next();
            if out.len() < total_len {
                if next == crate::page::P_INVALID {
                    return Err(Error::Corrupt(format!(
                        "overflow chain from page {head} ended before {total_len} bytes"
                    )));
                }
                pgno = next;
            }
        }
        Ok(out)
    }

    /// Drop every page dirtied by an aborted transaction from the cache.
    pub fn discard(&mut self, txn: &Txn) {
        self.cache.discard_dirty(&txn.dirty);
    }

    /// Persist every page dirtied this transaction to disk and clear their
    /// dirty bits; does not write the meta page itself (the caller does
    /// that last, after this succeeds, per the atomic-commit protocol).
    pub fn flush_dirty(&mut self, txn: &Txn) -> Result<()> {
        for &pgno in &txn.dirty {
            let offset = pgno as u64 * self.psize as u64;
            let buf = {
                let mp = self
                    .cache
                    .get(pgno)
                    .ok_or_else(|| Error::Corrupt(format!("flush: page {pgno} not cached")))?;
                mp.page.buf.clone()
            };
            self.io.write_at(offset, &buf)?;
            self.cache.clear_dirty(pgno);
        }
        self.io.flush()?;
        self.cache.prune();
        Ok(())
    }
}
