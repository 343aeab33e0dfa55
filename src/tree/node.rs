//! Node-record sizing and the insert/delete wrappers that decide when a
//! leaf value spills onto an overflow chain.

use crate::error::Result;
use crate::page::{node_flags, Page, BT_MINKEYS, NODEHDRSZ};
use crate::pager::Pager;
use crate::txn::Txn;

/// Bytes a leaf node for `(key, data)` would occupy, accounting for the
/// inline-vs-overflow decision the same way [`insert_leaf`] will. Callers
/// use this to decide whether a page must split before inserting.
pub fn leaf_size(psize: u32, key: &[u8], data: &[u8]) -> usize {
    let mut sz = NODEHDRSZ + key.len() + data.len();
    if data.len() as u32 >= psize / BT_MINKEYS {
        sz -= data.len() - 4;
    }
    sz + 2
}

/// Bytes a branch node for `key` would occupy.
pub fn branch_size(key: &[u8]) -> usize {
    NODEHDRSZ + key.len() + 2
}

/// Insert a leaf node at `indx`. `key` must already have the page's
/// effective prefix stripped. Large values (`>= psize / BT_MINKEYS`) are
/// written to a freshly allocated overflow chain and the node stores only
/// the chain's head page number; everything else is inlined.
///
/// Grounded on `btree_add_node`'s `IS_LEAF` branch.
pub fn insert_leaf(
    pager: &mut Pager,
    txn: &mut Txn,
    pgno: u32,
    indx: u16,
    key: &[u8],
    data: &[u8],
) -> Result<()> {
    let psize = pager.psize();
    if data.len() as u32 >= psize / BT_MINKEYS {
        let head = pager.write_overflow(txn, data);
        let page = &mut pager.cache.get_mut(pgno).expect("caller ensured resident").page;
        page.add_node(
            indx,
            key,
            &head.to_le_bytes(),
            data.len() as u32,
            node_flags::F_BIGDATA,
        )
    } else {
        let page = &mut pager.cache.get_mut(pgno).expect("caller ensured resident").page;
        page.add_node(indx, key, data, data.len() as u32, 0)
    }
}

/// Insert a branch node pointing at `child_pgno`, keyed by `key` (prefix
/// already stripped).
pub fn insert_branch(page: &mut Page, indx: u16, key: &[u8], child_pgno: u32) -> Result<()> {
    page.add_node(indx, key, &[], child_pgno, 0)
}
