//! The write-transaction bookkeeping the pager and tree mutators share.
//!
//! Only one write transaction may be open at a time; that's enforced above
//! this module by the advisory file lock and the borrow checker, not by
//! anything in here. `Txn` just tracks what changed since the last commit: the next
//! free page number to allocate and the set of pages dirtied this
//! transaction, so abort can discard exactly those and nothing else.

use crate::meta::MetaPage;
use crate::page::P_INVALID;

/// State threaded through a single write transaction.
pub struct Txn {
    /// Page number of the current (possibly not-yet-committed) root.
    pub root: u32,
    /// Next page number to hand out from [`crate::pager::Pager::new_page`].
    pub next_pgno: u32,
    /// Pages allocated or copy-on-write touched this transaction, in the
    /// order they were dirtied. On commit these are exactly the pages that
    /// must be flushed; on abort exactly the pages the cache must drop.
    pub dirty: Vec<u32>,
    pub branch_pages: u32,
    pub leaf_pages: u32,
    pub overflow_pages: u32,
    pub revisions: u32,
    pub depth: u32,
    pub entries: u64,
    pub prev_meta: u32,
}

impl Txn {
    /// Begin a write transaction from the most recently committed meta.
    pub fn begin(meta: &MetaPage, meta_pgno: u32, next_pgno: u32) -> Self {
        Txn {
            root: meta.root,
            next_pgno,
            dirty: Vec::new(),
            branch_pages: meta.branch_pages,
            leaf_pages: meta.leaf_pages,
            overflow_pages: meta.overflow_pages,
            revisions: meta.revisions,
            depth: meta.depth,
            entries: meta.entries,
            prev_meta: meta_pgno,
        }
    }

    /// Begin the very first write transaction against an empty file.
    pub fn begin_empty(next_pgno: u32) -> Self {
        Txn {
            root: P_INVALID,
            next_pgno,
            dirty: Vec::new(),
            branch_pages: 0,
            leaf_pages: 0,
            overflow_pages: 0,
            revisions: 0,
            depth: 0,
            entries: 0,
            prev_meta: P_INVALID,
        }
    }

    pub fn mark_dirty(&mut self, pgno: u32) {
        if !self.dirty.contains(&pgno) {
            self.dirty.push(pgno);
        }
    }
}
