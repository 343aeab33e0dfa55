//! Ordered iteration over the tree.
//!
//! A cursor is a root-to-leaf stack of `(page, child index)` frames, same
//! as the one built during a search. Pages referenced by a live frame are
//! pinned in the page cache (`ref_count > 0`) so [`crate::pager::Pager::touch`]
//! always deep-copies rather than mutating them out from under the cursor,
//! and so they can't be pruned mid-traversal. Grounded on `struct cursor`
//! and `cursor_push_page`/`cursor_pop_page`/`btree_sibling`/
//! `btree_cursor_next`/`btree_cursor_set`/`btree_cursor_first`.

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::page::{node_flags, P_INVALID};
use crate::pager::Pager;
use crate::prefix::expand;
use crate::tree::search::search_node;

#[derive(Clone, Copy, Debug)]
struct Frame {
    pgno: u32,
    ki: u16,
}

/// A cursor over a tree rooted at a fixed page number as of the moment it
/// was opened. Borrows the pager mutably: only one cursor (or the owning
/// transaction's own writes) may be active at a time, matching the
/// single-writer/single-reader-path model the pager enforces.
pub struct Cursor<'a> {
    pager: &'a mut Pager,
    root: u32,
    stack: SmallVec<[Frame; 8]>,
    initialized: bool,
    eof: bool,
}

impl<'a> Drop for Cursor<'a> {
    fn drop(&mut self) {
        while self.pop_page().is_some() {}
    }
}

impl<'a> Cursor<'a> {
    pub fn new(pager: &'a mut Pager, root: u32) -> Self {
        Cursor {
            pager,
            root,
            stack: SmallVec::new(),
            initialized: false,
            eof: false,
        }
    }

    fn push_page(&mut self, pgno: u32) -> Result<()> {
        self.pager.fetch(pgno)?;
        self.pager.cache.pin(pgno);
        self.stack.push(Frame { pgno, ki: 0 });
        Ok(())
    }

    fn pop_page(&mut self) -> Option<Frame> {
        let f = self.stack.pop()?;
        self.pager.cache.unpin(f.pgno);
        Some(f)
    }

    fn clear(&mut self) {
        while self.pop_page().is_some() {}
    }

    /// Descend from `root` toward `key` (or the leftmost leaf if `key` is
    /// `None`), pushing a frame per level. Read-only: no page is touched.
    fn descend(&mut self, key: Option<&[u8]>) -> Result<()> {
        if self.root == P_INVALID {
            return Err(Error::NotFound("tree is empty"));
        }
        let mut pgno = self.root;
        self.push_page(pgno)?;
        {
            let mp = self.pager.cache.get_mut(pgno).expect("just pushed");
            mp.parent = None;
            mp.parent_index = 0;
        }
        let prefix = crate::tree::effective_prefix(&self.pager.cache, pgno);
        self.pager.cache.get_mut(pgno).unwrap().prefix = prefix;

        loop {
            let is_branch = self.pager.cache.get(pgno).unwrap().page.is_branch();
            if !is_branch {
                return Ok(());
            }
            let ki = {
                let mp = self.pager.cache.get(pgno).unwrap();
                match key {
                    None => 0,
                    Some(k) => match search_node(&mp.page, &mp.prefix, k) {
                        (Some(i), true) => i,
                        (Some(i), false) => i.saturating_sub(1),
                        (None, _) => mp.page.numkeys() - 1,
                    },
                }
            };
            self.stack.last_mut().unwrap().ki = ki;

            let child_pgno = self.pager.cache.get(pgno).unwrap().page.node(ki).child_pgno();
            self.push_page(child_pgno)?;
            {
                let mp = self.pager.cache.get_mut(child_pgno).unwrap();
                mp.parent = Some(pgno);
                mp.parent_index = ki;
            }
            let prefix = crate::tree::effective_prefix(&self.pager.cache, child_pgno);
            self.pager.cache.get_mut(child_pgno).unwrap().prefix = prefix;
            pgno = child_pgno;
        }
    }

    /// Move to the immediate left (`move_right = false`) or right sibling
    /// of the page currently on top of the stack, walking up to a common
    /// ancestor first if needed. Grounded on `btree_sibling`.
    fn sibling(&mut self, move_right: bool) -> Result<()> {
        self.pop_page().ok_or(Error::NotFound("no more siblings"))?;
        if self.stack.is_empty() {
            return Err(Error::NotFound("root has no siblings"));
        }

        let parent_ki = self.stack.last().unwrap().ki;
        let parent_numkeys = {
            let parent_pgno = self.stack.last().unwrap().pgno;
            self.pager.cache.get(parent_pgno).unwrap().page.numkeys()
        };
        let at_boundary = if move_right {
            parent_ki + 1 >= parent_numkeys
        } else {
            parent_ki == 0
        };

        if at_boundary {
            self.sibling(move_right)?;
        } else {
            let new_ki = if move_right { parent_ki + 1 } else { parent_ki - 1 };
            self.stack.last_mut().unwrap().ki = new_ki;
        }

        let (parent_pgno, ki) = {
            let f = self.stack.last().unwrap();
            (f.pgno, f.ki)
        };
        let child_pgno = self.pager.cache.get(parent_pgno).unwrap().page.node(ki).child_pgno();
        self.push_page(child_pgno)?;
        {
            let mp = self.pager.cache.get_mut(child_pgno).unwrap();
            mp.parent = Some(parent_pgno);
            mp.parent_index = ki;
        }
        let prefix = crate::tree::effective_prefix(&self.pager.cache, child_pgno);
        self.pager.cache.get_mut(child_pgno).unwrap().prefix = prefix;
        Ok(())
    }

    fn current_key_value(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        let top = *self.stack.last().expect("positioned");
        let (abs_key, payload, inline, nflags) = {
            let mp = self.pager.cache.get(top.pgno).expect("resident");
            let n = mp.page.node(top.ki);
            (expand(&mp.prefix, n.key), n.pgno_or_dsize, n.data.to_vec(), n.flags)
        };
        let value = if nflags & node_flags::F_BIGDATA != 0 {
            let head = u32::from_le_bytes(inline[0..4].try_into().unwrap());
            self.pager.read_overflow(head, payload as usize)?
        } else {
            inline
        };
        Ok((abs_key, value))
    }

    /// Position on the first entry.
    pub fn first(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        self.clear();
        self.descend(None)?;
        self.initialized = true;
        self.eof = false;
        self.current_key_value()
    }

    /// Position on the smallest entry `>= key`.
    pub fn seek(&mut self, key: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        self.clear();
        self.descend(Some(key))?;
        let top = *self.stack.last().unwrap();
        let (idx, _exact) = {
            let mp = self.pager.cache.get(top.pgno).unwrap();
            search_node(&mp.page, &mp.prefix, key)
        };
        match idx {
            Some(i) => {
                self.stack.last_mut().unwrap().ki = i;
            }
            None => {
                self.sibling(true)?;
                self.stack.last_mut().unwrap().ki = 0;
            }
        }
        self.initialized = true;
        self.eof = false;
        self.current_key_value()
    }

    /// Position exactly on `key`, failing with [`Error::NotFound`] if it's
    /// absent.
    pub fn seek_exact(&mut self, key: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        self.clear();
        self.descend(Some(key))?;
        let top = *self.stack.last().unwrap();
        let (idx, exact) = {
            let mp = self.pager.cache.get(top.pgno).unwrap();
            search_node(&mp.page, &mp.prefix, key)
        };
        if !exact {
            return Err(Error::NotFound("key"));
        }
        self.stack.last_mut().unwrap().ki = idx.unwrap();
        self.initialized = true;
        self.eof = false;
        self.current_key_value()
    }

    /// Advance to the next entry in key order.
    pub fn next(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        if !self.initialized {
            return self.first();
        }
        if self.eof {
            return Err(Error::NotFound("cursor at eof"));
        }
        let top = *self.stack.last().expect("initialized");
        let numkeys = self.pager.cache.get(top.pgno).unwrap().page.numkeys();
        if top.ki + 1 >= numkeys {
            if self.sibling(true).is_err() {
                self.eof = true;
                return Err(Error::NotFound("cursor at eof"));
            }
            self.stack.last_mut().unwrap().ki = 0;
        } else {
            self.stack.last_mut().unwrap().ki += 1;
        }
        self.current_key_value()
    }
}
