//! The B+tree core: search, mutation, rebalancing, and compaction.
//!
//! Everything here operates in terms of page numbers and the shared
//! [`crate::pager::Pager`] cache rather than owning pages directly — a page
//! is only ever mutated after [`crate::pager::Pager::touch`] has made it
//! safe to do so.

pub mod compact;
pub mod mutate;
pub mod node;
pub mod search;

use crate::cache::PageCache;
use crate::prefix::{common_prefix, expand};

/// Effective prefix for a resident page, derived from the bracket keys that
/// bound its subtree. The page and all of its ancestors (as far up as the bracket
/// keys require) must already be cache-resident with `parent`/`parent_index`
/// populated — true of any page reached via [`crate::tree::search::search_page`].
///
/// Grounded on `find_common_prefix`/`expand_prefix`/`common_prefix` in the
/// original C: walk up until a left sibling bounds the page from below and
/// another ancestor's right sibling bounds it from above, expand each bound
/// to its absolute key, and take their common prefix. A page at the very
/// start or end of the keyspace has no bound on that side and simply
/// inherits its parent's prefix.
pub fn effective_prefix(cache: &PageCache, pgno: u32) -> Vec<u8> {
    let mut lp = pgno;
    let lbound = loop {
        let cur = cache.get(lp).expect("ancestor resident");
        match cur.parent {
            None => break None,
            Some(parent_pgno) if cur.parent_index > 0 => {
                break Some((parent_pgno, cur.parent_index))
            }
            Some(parent_pgno) => lp = parent_pgno,
        }
    };

    let mut up = pgno;
    let ubound = loop {
        let cur = cache.get(up).expect("ancestor resident");
        match cur.parent {
            None => break None,
            Some(parent_pgno) => {
                let parent = cache.get(parent_pgno).expect("ancestor resident");
                if (cur.parent_index as u16) + 1 < parent.page.numkeys() {
                    break Some((parent_pgno, cur.parent_index + 1));
                }
                up = parent_pgno;
            }
        }
    };

    match (lbound, ubound) {
        (Some((lpgno, lidx)), Some((upgno, uidx))) => {
            let lprefix = expand_bracket(cache, lpgno, lidx);
            let uprefix = expand_bracket(cache, upgno, uidx);
            common_prefix(&lprefix, &uprefix)
        }
        _ => cache
            .get(pgno)
            .and_then(|mp| mp.parent)
            .and_then(|parent_pgno| cache.get(parent_pgno))
            .map(|p| p.prefix.clone())
            .unwrap_or_default(),
    }
}

fn expand_bracket(cache: &PageCache, pgno: u32, indx: u16) -> Vec<u8> {
    let mp = cache.get(pgno).expect("ancestor resident");
    let node = mp.page.node(indx);
    expand(&mp.prefix, node.key)
}
