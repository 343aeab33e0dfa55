//! Root-to-leaf descent: binary search within a page and the full tree walk.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::pager::Pager;
use crate::page::P_INVALID;
use crate::prefix::bt_cmp_query;
use crate::tree::effective_prefix;
use crate::txn::Txn;

/// Binary search within one page's nodes for `key`.
///
/// Leaves search every node (index 0 included); branches skip index 0,
/// which carries no real separator (it bounds the subtree from
/// `-infinity`). Returns the index of the smallest node whose key is `>=`
/// `key`, and whether that node matched exactly. `None` means every node on
/// the page compares less than `key`.
pub fn search_node(
    page: &crate::page::Page,
    prefix: &[u8],
    key: &[u8],
) -> (Option<u16>, bool) {
    let numkeys = page.numkeys();
    if numkeys == 0 {
        return (None, false);
    }
    let mut low: i32 = if page.is_leaf() { 0 } else { 1 };
    let mut high: i32 = numkeys as i32 - 1;
    let mut i: i32 = low;
    let mut ord = Ordering::Less;

    while low <= high {
        i = (low + high) >> 1;
        let node = page.node(i as u16);
        ord = bt_cmp_query(key, prefix, node.key);
        match ord {
            Ordering::Equal => break,
            Ordering::Greater => low = i + 1,
            Ordering::Less => high = i - 1,
        }
    }

    if ord == Ordering::Greater {
        i += 1;
        if i as u16 >= numkeys {
            return (None, false);
        }
    }
    (Some(i as u16), ord == Ordering::Equal)
}

/// One level of a root-to-leaf descent: the page visited and the child
/// index chosen there (meaningless — left at 0 — for the leaf frame, which
/// callers fill in themselves once they've searched the leaf's nodes).
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    pub pgno: u32,
    pub ki: u16,
}

/// Descend from `root` toward `key` (or the leftmost leaf if `key` is
/// `None`), returning one [`Frame`] per level visited. If `txn` is
/// provided, every page on the path is copy-on-write touched before its
/// child is followed, and the page cache's `parent`/`parent_index`/`prefix`
/// bookkeeping is refreshed at each step — this is the one place that
/// bookkeeping gets set, so every other module assumes it's already
/// current for any page reached this way.
///
/// Grounded on `btree_search_page`/`btree_search_page_root`.
pub fn search_page(
    pager: &mut Pager,
    root: u32,
    key: Option<&[u8]>,
    mut txn: Option<&mut Txn>,
) -> Result<Vec<Frame>> {
    if root == P_INVALID {
        return Err(Error::NotFound("tree is empty"));
    }

    let mut frames = Vec::new();
    let mut pgno = root;

    pager.fetch(pgno)?;
    if let Some(t) = txn.as_deref_mut() {
        let already_dirty = pager.cache.get(pgno).map(|mp| mp.dirty).unwrap_or(false);
        if !already_dirty {
            pgno = pager.touch(t, pgno)?;
        }
    }
    {
        let mp = pager.cache.get_mut(pgno).expect("just fetched");
        mp.parent = None;
        mp.parent_index = 0;
    }
    let prefix = crate::tree::effective_prefix(&pager.cache, pgno);
    pager.cache.get_mut(pgno).expect("just fetched").prefix = prefix;

    loop {
        let is_branch = pager.cache.get(pgno).expect("resident").page.is_branch();
        if !is_branch {
            frames.push(Frame { pgno, ki: 0 });
            return Ok(frames);
        }

        let ki = {
            let mp = pager.cache.get(pgno).expect("resident");
            match key {
                None => 0,
                Some(k) => match search_node(&mp.page, &mp.prefix, k) {
                    (Some(i), exact) => {
                        if exact {
                            i
                        } else {
                            i.saturating_sub(1)
                        }
                    }
                    (None, _) => mp.page.numkeys() - 1,
                },
            }
        };
        frames.push(Frame { pgno, ki });

        let child_pgno = pager
            .cache
            .get(pgno)
            .expect("resident")
            .page
            .node(ki)
            .child_pgno();

        pager.fetch(child_pgno)?;
        let mut child_pgno = child_pgno;
        if let Some(t) = txn.as_deref_mut() {
            let already_dirty = pager
                .cache
                .get(child_pgno)
                .map(|mp| mp.dirty)
                .unwrap_or(false);
            if !already_dirty {
                child_pgno = pager.touch(t, child_pgno)?;
            }
        }
        {
            let mp = pager.cache.get_mut(child_pgno).expect("just fetched");
            mp.parent = Some(pgno);
            mp.parent_index = ki;
        }
        let prefix = effective_prefix(&pager.cache, child_pgno);
        pager.cache.get_mut(child_pgno).expect("just fetched").prefix = prefix;

        pgno = child_pgno;
    }
}
