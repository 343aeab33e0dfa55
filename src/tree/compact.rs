//! Depth-first rewrite of a tree into a fresh file, dropping dead
//! (overwritten, orphaned-by-COW) pages along the way.
//!
//! Grounded on `btree_compact_tree`: recurse to the leaves first so every
//! child is already written (and its final page number known) before its
//! parent is serialized, then write each page back-to-front into the
//! target file with a freshly assigned, densely packed page number.
//! Because only page numbers change — not a single key byte moves — every
//! page's stored prefix-relative keys and its runtime-computed effective
//! prefix both stay exactly as they were; no prefix recomputation is
//! needed here at all.

use crate::error::Result;
use crate::page::{Page, P_INVALID};
use crate::pager::Pager;
use crate::txn::Txn;

/// Recursively copy the subtree rooted at `pgno` (in `src`) into `dst`,
/// returning the page number it was assigned there. `P_INVALID` copies as
/// itself (an absent subtree).
pub fn compact_tree(src: &mut Pager, pgno: u32, dst: &mut Pager, dst_txn: &mut Txn) -> Result<u32> {
    if pgno == P_INVALID {
        return Ok(P_INVALID);
    }

    src.fetch(pgno)?;
    let mut page = Page::from_bytes(src.cache.get(pgno).expect("just fetched").page.buf.clone());

    if page.is_branch() {
        for i in 0..page.numkeys() {
            let child = page.node(i).child_pgno();
            let new_child = compact_tree(src, child, dst, dst_txn)?;
            page.set_child_pgno(i, new_child);
        }
    } else if page.is_leaf() {
        for i in 0..page.numkeys() {
            let n = page.node(i);
            if n.is_bigdata() {
                let head = n.overflow_head();
                let new_head = compact_tree(src, head, dst, dst_txn)?;
                page.set_overflow_head(i, new_head);
            }
        }
    } else if page.is_overflow() {
        let next = page.overflow_next();
        if next != P_INVALID {
            let new_next = compact_tree(src, next, dst, dst_txn)?;
            page.set_overflow_next(new_next);
        }
    }

    let new_pgno = dst_txn.next_pgno;
    dst_txn.next_pgno += 1;
    page.set_pgno(new_pgno);
    dst.io_mut()
        .write_at(new_pgno as u64 * dst.psize() as u64, &page.buf)?;

    src.cache.prune();
    Ok(new_pgno)
}
