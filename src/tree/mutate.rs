//! Insert, delete, split, and rebalance.
//!
//! Rather than port the original's in-place, delta-shifted byte surgery for
//! split/merge/prefix-adjustment node by node, every mutating operation here
//! decodes the nodes it touches into owned, absolute-keyed values, computes
//! the new page layout in memory, and re-encodes from scratch relative to
//! whatever prefix the page should carry afterward. The set of keys landing
//! on each page, the split points, and the separators promoted to parents
//! are the same the original computes; only the bookkeeping used to get
//! there is simplified to something safe Rust can express without pointer
//! arithmetic. See `DESIGN.md` for the full rationale.

use crate::error::{Error, Result};
use crate::page::{flags, node_flags, Page, MAXKEYSIZE, PAGEHDRSZ};
use crate::pager::Pager;
use crate::prefix::{common_prefix, expand, reduce_separator};
use crate::tree::effective_prefix;
use crate::tree::search::{search_node, search_page, Frame};
use crate::txn::Txn;

#[derive(Clone)]
struct DecodedNode {
    abs_key: Vec<u8>,
    /// Leaf data size, or the branch child page number.
    payload: u32,
    /// Leaf: inline value bytes, or the 4-byte overflow head if `F_BIGDATA`.
    /// Branch: empty.
    inline: Vec<u8>,
    flags: u8,
}

fn decode_all(page: &Page, prefix: &[u8]) -> Vec<DecodedNode> {
    (0..page.numkeys())
        .map(|i| {
            let n = page.node(i);
            DecodedNode {
                abs_key: expand(prefix, n.key),
                payload: n.pgno_or_dsize,
                inline: n.data.to_vec(),
                flags: n.flags,
            }
        })
        .collect()
}

fn node_cost(is_leaf: bool, key_len: usize, inline_len: usize) -> usize {
    Page::node_size(key_len, inline_len, is_leaf, 0)
}

fn fits(psize: u32, is_leaf: bool, prefix_len: usize, nodes: &[DecodedNode]) -> bool {
    let budget = psize as usize - PAGEHDRSZ;
    let total: usize = nodes
        .iter()
        .map(|n| node_cost(is_leaf, n.abs_key.len() - prefix_len, n.inline.len()))
        .sum();
    total <= budget
}

fn encode_into(pager: &mut Pager, pgno: u32, is_leaf: bool, prefix: &[u8], nodes: &[DecodedNode]) -> Result<()> {
    let psize = pager.psize();
    let page_flags = if is_leaf { flags::LEAF } else { flags::BRANCH };
    let mut fresh = Page::new_empty(psize, pgno, page_flags);
    for (i, n) in nodes.iter().enumerate() {
        let rel_key: &[u8] = if is_leaf || i != 0 {
            &n.abs_key[prefix.len()..]
        } else {
            &[] // branch index 0 carries no real separator
        };
        fresh.add_node(i as u16, rel_key, &n.inline, n.payload, n.flags)?;
    }
    let mp = pager
        .cache
        .get_mut(pgno)
        .ok_or_else(|| Error::Corrupt(format!("encode_into: page {pgno} not cached")))?;
    mp.page = fresh;
    mp.prefix = prefix.to_vec();
    Ok(())
}

/// Recompute `pgno`'s effective prefix from its (now current) ancestors and
/// re-encode it if that differs from what it was last written with.
fn refresh_prefix(pager: &mut Pager, pgno: u32) -> Result<()> {
    let new_prefix = effective_prefix(&pager.cache, pgno);
    let (old_prefix, is_leaf) = {
        let mp = pager
            .cache
            .get(pgno)
            .ok_or_else(|| Error::Corrupt(format!("refresh_prefix: page {pgno} not cached")))?;
        (mp.prefix.clone(), mp.page.is_leaf())
    };
    if new_prefix != old_prefix {
        let nodes = {
            let mp = pager.cache.get(pgno).expect("checked above");
            decode_all(&mp.page, &old_prefix)
        };
        encode_into(pager, pgno, is_leaf, &new_prefix, &nodes)?;
    }
    Ok(())
}

fn set_parent(pager: &mut Pager, child_pgno: u32, parent_pgno: Option<u32>, parent_index: u16) {
    if let Some(mp) = pager.cache.get_mut(child_pgno) {
        mp.parent = parent_pgno;
        mp.parent_index = parent_index;
    }
}

/// A branch's slot 0 carries no real separator (it bounds the subtree from
/// `-infinity`), so `decode_all` can only give it a synthetic key equal to
/// the page's own prefix. When that slot is the node being relocated during
/// a rebalance, its true lowest key has to be recovered by descending to
/// the leftmost leaf under it — `src_pgno` is the branch the moved child
/// currently lives under, used to seed correct parent bookkeeping for the
/// descent.
fn leftmost_leaf_key(pager: &mut Pager, src_pgno: u32, moved_pgno: u32) -> Result<Vec<u8>> {
    pager.fetch(moved_pgno)?;
    set_parent(pager, moved_pgno, Some(src_pgno), 0);
    let mut pgno = moved_pgno;
    loop {
        let prefix = effective_prefix(&pager.cache, pgno);
        pager.cache.get_mut(pgno).expect("just fetched").prefix = prefix;

        let (is_leaf, numkeys) = {
            let mp = pager.cache.get(pgno).expect("resident");
            (mp.page.is_leaf(), mp.page.numkeys())
        };
        if is_leaf {
            if numkeys == 0 {
                return Err(Error::Corrupt(format!(
                    "leftmost_leaf_key: empty leaf {pgno} while recovering a branch slot-0 key"
                )));
            }
            let mp = pager.cache.get(pgno).expect("resident");
            return Ok(expand(&mp.prefix, mp.page.node(0).key));
        }

        let child_pgno = pager.cache.get(pgno).expect("resident").page.node(0).child_pgno();
        pager.fetch(child_pgno)?;
        set_parent(pager, child_pgno, Some(pgno), 0);
        pgno = child_pgno;
    }
}

fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() || key.len() > MAXKEYSIZE {
        return Err(Error::InvalidArgument(format!(
            "key must be 1..={MAXKEYSIZE} bytes, got {}",
            key.len()
        )));
    }
    Ok(())
}

/// Insert or overwrite `key` with `data`.
///
/// Grounded on `btree_txn_put`'s search-then-`btree_add_node`-with-split
/// loop.
pub fn put(pager: &mut Pager, txn: &mut Txn, key: &[u8], data: &[u8]) -> Result<()> {
    validate_key(key)?;

    if txn.root == crate::page::P_INVALID {
        let root = pager.new_page(txn, flags::LEAF);
        set_parent(pager, root, None, 0);
        pager.cache.get_mut(root).unwrap().prefix = Vec::new();
        txn.root = root;
        txn.depth += 1;
    }

    let frames = search_page(pager, txn.root, Some(key), Some(txn))?;
    let leaf = frames.last().copied().expect("search_page always returns >=1 frame");

    let (prefix, existing_idx, replaces) = {
        let mp = pager.cache.get(leaf.pgno).expect("resident");
        let (idx, exact) = search_node(&mp.page, &mp.prefix, key);
        let insert_at = match idx {
            Some(i) if exact => i,
            Some(i) => i,
            None => mp.page.numkeys(),
        };
        (mp.prefix.clone(), insert_at, exact)
    };

    let mut nodes = {
        let mp = pager.cache.get(leaf.pgno).expect("resident");
        decode_all(&mp.page, &prefix)
    };
    let new_node = DecodedNode {
        abs_key: key.to_vec(),
        payload: data.len() as u32,
        inline: data.to_vec(),
        flags: 0,
    };
    if replaces {
        nodes[existing_idx as usize] = new_node;
    } else {
        nodes.insert(existing_idx as usize, new_node);
    }
    spill_overflow_values(pager, txn, &mut nodes);

    let psize = pager.psize();
    if fits(psize, true, prefix.len(), &nodes) {
        encode_into(pager, leaf.pgno, true, &prefix, &nodes)?;
    } else {
        split_and_promote(pager, txn, &frames, frames.len() - 1, true, nodes)?;
    }

    if !replaces {
        txn.entries += 1;
    }
    Ok(())
}

/// Move any leaf value that now qualifies for overflow storage onto a
/// freshly allocated chain, matching the `data->size >= psize / BT_MINKEYS`
/// threshold `btree_add_node` applies at insert time.
fn spill_overflow_values(pager: &mut Pager, txn: &mut Txn, nodes: &mut [DecodedNode]) {
    let threshold = pager.psize() / crate::page::BT_MINKEYS;
    for n in nodes.iter_mut() {
        if n.flags & node_flags::F_BIGDATA == 0 && n.inline.len() as u32 >= threshold {
            let head = pager.write_overflow(txn, &n.inline);
            n.payload = n.inline.len() as u32;
            n.inline = head.to_le_bytes().to_vec();
            n.flags |= node_flags::F_BIGDATA;
        }
    }
}

/// Split the overfull page at `frames[level]` (whose in-memory node set is
/// `nodes`, already including whatever was just inserted) into two pages,
/// and promote a separator into the parent — recursing upward, and growing
/// a new root, if the parent overflows in turn.
fn split_and_promote(
    pager: &mut Pager,
    txn: &mut Txn,
    frames: &[Frame],
    level: usize,
    is_leaf: bool,
    nodes: Vec<DecodedNode>,
) -> Result<()> {
    let pgno = frames[level].pgno;
    let psize = pager.psize();

    // Branch pages must split at index >= 1: index 0 never carries a real
    // separator, so it can't become a promoted key.
    let mid = (nodes.len() / 2).max(if is_leaf { 1 } else { 1 });
    let (left, right) = nodes.split_at(mid);
    let (left, right) = (left.to_vec(), right.to_vec());

    let sep_source = right[0].abs_key.clone();
    let left_last = left.last().expect("split always leaves >=1 on the left").abs_key.clone();
    let separator = reduce_separator(&left_last, &sep_source);

    let right_pgno = pager.new_page(txn, if is_leaf { flags::LEAF } else { flags::BRANCH });

    let left_prefix = crate::prefix::common_prefix(
        &left.first().unwrap().abs_key,
        &left.last().unwrap().abs_key,
    );
    let right_prefix = crate::prefix::common_prefix(
        &right.first().unwrap().abs_key,
        &right.last().unwrap().abs_key,
    );
    encode_into(pager, pgno, is_leaf, &left_prefix, &left)?;
    encode_into(pager, right_pgno, is_leaf, &right_prefix, &right)?;

    if !is_leaf {
        for (i, n) in left.iter().enumerate() {
            set_parent(pager, n.payload, Some(pgno), i as u16);
        }
        for (i, n) in right.iter().enumerate() {
            set_parent(pager, n.payload, Some(right_pgno), i as u16);
        }
    }

    if level == 0 {
        // The root itself split: grow a new root above both halves.
        let new_root = pager.new_page(txn, flags::BRANCH);
        {
            let fresh = &mut pager.cache.get_mut(new_root).unwrap().page;
            fresh.add_node(0, &[], &[], pgno, 0)?;
            fresh.add_node(1, &separator, &[], right_pgno, 0)?;
        }
        pager.cache.get_mut(new_root).unwrap().prefix = Vec::new();
        set_parent(pager, pgno, Some(new_root), 0);
        set_parent(pager, right_pgno, Some(new_root), 1);
        txn.root = new_root;
        txn.depth += 1;
        refresh_prefix(pager, pgno)?;
        refresh_prefix(pager, right_pgno)?;
        return Ok(());
    }

    let parent_pgno = frames[level - 1].pgno;
    let parent_ki = frames[level - 1].ki;
    set_parent(pager, right_pgno, Some(parent_pgno), parent_ki + 1);

    let parent_prefix = pager.cache.get(parent_pgno).expect("resident").prefix.clone();
    let mut parent_nodes = {
        let mp = pager.cache.get(parent_pgno).expect("resident");
        decode_all(&mp.page, &parent_prefix)
    };
    parent_nodes.insert(
        parent_ki as usize + 1,
        DecodedNode {
            abs_key: separator,
            payload: right_pgno,
            inline: Vec::new(),
            flags: 0,
        },
    );

    if fits(psize, false, parent_prefix.len(), &parent_nodes) {
        encode_into(pager, parent_pgno, false, &parent_prefix, &parent_nodes)?;
        for (i, n) in parent_nodes.iter().enumerate() {
            set_parent(pager, n.payload, Some(parent_pgno), i as u16);
        }
        refresh_prefix(pager, pgno)?;
        refresh_prefix(pager, right_pgno)?;
    } else {
        split_and_promote(pager, txn, frames, level - 1, false, parent_nodes)?;
        // The parent may have been rebuilt (and a sibling allocated) by the
        // recursive call above; its child-pointer fixups there already
        // repointed `pgno`/`right_pgno` at whichever page now holds them.
        refresh_prefix(pager, pgno)?;
        refresh_prefix(pager, right_pgno)?;
    }

    Ok(())
}

/// Delete `key`, returning its value. Rebalances the affected leaf (and, if
/// it collapses, its ancestors) against an immediate sibling under the
/// same parent; a node left with no immediate sibling (only possible in a
/// very shallow or pathologically unbalanced tree) is left underfull
/// rather than searched for a sibling further away.
///
/// Grounded on `btree_txn_del`/`rebalance`/`btree_merge`.
pub fn delete(pager: &mut Pager, txn: &mut Txn, key: &[u8]) -> Result<Vec<u8>> {
    validate_key(key)?;
    let frames = search_page(pager, txn.root, Some(key), Some(txn))?;
    let leaf = frames.last().copied().expect("search_page always returns >=1 frame");

    let prefix = pager.cache.get(leaf.pgno).expect("resident").prefix.clone();
    let (idx, exact) = {
        let mp = pager.cache.get(leaf.pgno).expect("resident");
        search_node(&mp.page, &prefix, key)
    };
    let idx = match (idx, exact) {
        (Some(i), true) => i,
        _ => return Err(Error::NotFound("key")),
    };

    let mut nodes = decode_all(&pager.cache.get(leaf.pgno).unwrap().page, &prefix);
    let removed = nodes.remove(idx as usize);
    let value = read_value(pager, &removed)?;

    encode_into(pager, leaf.pgno, true, &prefix, &nodes)?;
    txn.entries = txn.entries.saturating_sub(1);

    rebalance(pager, txn, &frames, frames.len() - 1)?;

    Ok(value)
}

fn read_value(pager: &mut Pager, n: &DecodedNode) -> Result<Vec<u8>> {
    if n.flags & node_flags::F_BIGDATA != 0 {
        let head = u32::from_le_bytes(n.inline[0..4].try_into().unwrap());
        pager.read_overflow(head, n.payload as usize)
    } else {
        Ok(n.inline.clone())
    }
}

/// If the page at `frames[level]` fell below the fill threshold, merge it
/// with (or borrow from) an immediate sibling; recurse upward if the
/// parent itself shrinks enough to need the same treatment, and collapse
/// the root if it's left with a single child.
fn rebalance(pager: &mut Pager, txn: &mut Txn, frames: &[Frame], level: usize) -> Result<()> {
    let pgno = frames[level].pgno;

    if level == 0 {
        let mp = pager.cache.get(pgno).expect("resident");
        if mp.page.is_leaf() && mp.page.numkeys() == 0 {
            // Root leaf emptied out: clear the tree entirely.
            txn.root = crate::page::P_INVALID;
            txn.depth = txn.depth.saturating_sub(1);
            txn.leaf_pages = txn.leaf_pages.saturating_sub(1);
            pager.cache.remove(pgno);
        } else if mp.page.is_branch() && mp.page.numkeys() == 1 {
            let only_child = mp.page.node(0).child_pgno();
            txn.root = only_child;
            set_parent(pager, only_child, None, 0);
            refresh_prefix(pager, only_child)?;
            txn.depth = txn.depth.saturating_sub(1);
            txn.branch_pages = txn.branch_pages.saturating_sub(1);
        }
        return Ok(());
    }

    let below = pager.cache.get(pgno).expect("resident").page.below_threshold();
    if !below {
        return Ok(());
    }

    let parent_pgno = frames[level - 1].pgno;
    let ki = frames[level - 1].ki;
    let parent_numkeys = pager.cache.get(parent_pgno).expect("resident").page.numkeys();

    // Prefer the left neighbor whenever one exists; only fall back to the
    // right neighbor when this is the parent's leftmost child.
    let (sibling_pgno, sibling_is_right) = if ki > 0 {
        let sib = pager.cache.get(parent_pgno).unwrap().page.node(ki - 1).child_pgno();
        (Some(sib), false)
    } else if ki + 1 < parent_numkeys {
        let sib = pager.cache.get(parent_pgno).unwrap().page.node(ki + 1).child_pgno();
        (Some(sib), true)
    } else {
        (None, false)
    };

    let sibling_pgno = match sibling_pgno {
        Some(s) => s,
        None => return Ok(()), // no immediate sibling; leave underfull
    };

    pager.fetch(sibling_pgno)?;
    let sib_parent_index = if sibling_is_right { ki + 1 } else { ki - 1 };
    set_parent(pager, sibling_pgno, Some(parent_pgno), sib_parent_index);
    let sibling_pgno = pager.touch(txn, sibling_pgno)?;

    let is_leaf = pager.cache.get(pgno).expect("resident").page.is_leaf();
    let sib_prefix = effective_prefix(&pager.cache, sibling_pgno);
    {
        let mp = pager.cache.get(sibling_pgno).unwrap();
        if mp.prefix != sib_prefix {
            let nodes = decode_all(&mp.page, &mp.prefix.clone());
            encode_into(pager, sibling_pgno, is_leaf, &sib_prefix, &nodes)?;
        }
    }

    let (left_pgno, right_pgno) = if sibling_is_right {
        (pgno, sibling_pgno)
    } else {
        (sibling_pgno, pgno)
    };
    let left_prefix = pager.cache.get(left_pgno).unwrap().prefix.clone();
    let right_prefix = pager.cache.get(right_pgno).unwrap().prefix.clone();
    let mut left_nodes = decode_all(&pager.cache.get(left_pgno).unwrap().page, &left_prefix);
    let mut right_nodes = decode_all(&pager.cache.get(right_pgno).unwrap().page, &right_prefix);
    if !is_leaf {
        // right_nodes[0] is the branch's own implicit slot 0; wherever it
        // ends up landing (merged into `left_pgno`, or moved directly as
        // the new separator), it's about to become a real, compared key,
        // so its decoded placeholder has to be replaced with the actual
        // lowest key of the subtree it points at.
        if let Some(first) = right_nodes.first_mut() {
            let child = first.payload;
            first.abs_key = leftmost_leaf_key(pager, right_pgno, child)?;
        }
    }

    let mut merged = left_nodes.clone();
    merged.extend(right_nodes.iter().cloned());

    let psize = pager.psize();
    let merged_prefix = if merged.is_empty() {
        Vec::new()
    } else {
        common_prefix(&merged.first().unwrap().abs_key, &merged.last().unwrap().abs_key)
    };

    if fits(psize, is_leaf, merged_prefix.len(), &merged) {
        // Full merge: fold everything onto `left_pgno`, drop `right_pgno`,
        // remove its separator from the parent.
        encode_into(pager, left_pgno, is_leaf, &merged_prefix, &merged)?;
        if !is_leaf {
            for (i, n) in merged.iter().enumerate() {
                set_parent(pager, n.payload, Some(left_pgno), i as u16);
            }
        }
        pager.cache.remove(right_pgno);
        if is_leaf {
            txn.leaf_pages = txn.leaf_pages.saturating_sub(1);
        } else {
            txn.branch_pages = txn.branch_pages.saturating_sub(1);
        }

        let removed_index = if sibling_is_right { ki + 1 } else { ki };
        let parent_prefix = pager.cache.get(parent_pgno).unwrap().prefix.clone();
        let mut parent_nodes = decode_all(&pager.cache.get(parent_pgno).unwrap().page, &parent_prefix);
        parent_nodes.remove(removed_index as usize);
        encode_into(pager, parent_pgno, false, &parent_prefix, &parent_nodes)?;
        for (i, n) in parent_nodes.iter().enumerate() {
            set_parent(pager, n.payload, Some(parent_pgno), i as u16);
        }
        refresh_prefix(pager, left_pgno)?;

        rebalance(pager, txn, frames, level - 1)
    } else {
        // Can't merge into one page; rebalance by moving a single node
        // across from the fuller sibling instead.
        if sibling_is_right {
            let moved = right_nodes.first().cloned();
            if let Some(moved) = moved {
                let mut new_right = right_nodes.clone();
                new_right.remove(0);
                left_nodes.push(moved);
                finish_move(pager, txn, left_pgno, left_nodes, right_pgno, new_right, is_leaf, parent_pgno, ki)?;
            }
        } else {
            let moved = left_nodes.last().cloned();
            if let Some(moved) = moved {
                let mut new_left = left_nodes.clone();
                new_left.pop();
                let mut new_right = right_nodes.clone();
                new_right.insert(0, moved);
                finish_move(pager, txn, left_pgno, new_left, right_pgno, new_right, is_leaf, parent_pgno, ki - 1)?;
            }
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn finish_move(
    pager: &mut Pager,
    txn: &mut Txn,
    left_pgno: u32,
    left_nodes: Vec<DecodedNode>,
    right_pgno: u32,
    right_nodes: Vec<DecodedNode>,
    is_leaf: bool,
    parent_pgno: u32,
    left_parent_index: u16,
) -> Result<()> {
    let left_prefix = common_prefix(
        &left_nodes.first().unwrap().abs_key,
        &left_nodes.last().unwrap().abs_key,
    );
    let right_prefix = common_prefix(
        &right_nodes.first().unwrap().abs_key,
        &right_nodes.last().unwrap().abs_key,
    );
    encode_into(pager, left_pgno, is_leaf, &left_prefix, &left_nodes)?;
    encode_into(pager, right_pgno, is_leaf, &right_prefix, &right_nodes)?;
    if !is_leaf {
        for (i, n) in left_nodes.iter().enumerate() {
            set_parent(pager, n.payload, Some(left_pgno), i as u16);
        }
        for (i, n) in right_nodes.iter().enumerate() {
            set_parent(pager, n.payload, Some(right_pgno), i as u16);
        }
    }

    let new_sep = right_nodes.first().expect("non-empty after move").abs_key.clone();
    let parent_prefix = pager.cache.get(parent_pgno).unwrap().prefix.clone();
    let mut parent_nodes = decode_all(&pager.cache.get(parent_pgno).unwrap().page, &parent_prefix);
    parent_nodes[left_parent_index as usize + 1].abs_key = new_sep;
    encode_into(pager, parent_pgno, false, &parent_prefix, &parent_nodes)?;
    for (i, n) in parent_nodes.iter().enumerate() {
        set_parent(pager, n.payload, Some(parent_pgno), i as u16);
    }
    refresh_prefix(pager, left_pgno)?;
    refresh_prefix(pager, right_pgno)?;
    let _ = txn;
    Ok(())
}
