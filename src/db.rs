//! The public, single-call façade over the tree: open/close and the
//! implicit-transaction convenience methods.
//!
//! Every mutating call here (`put`, `delete`, `compact`) wraps the whole
//! operation in its own write transaction: begin, attempt the mutation,
//! then either commit (flush dirty pages, write a fresh meta page, fsync
//! unless `no_sync`) or abort (drop the dirty pages the attempt touched)
//! and surface the error. Callers who want several writes under one
//! transaction should batch them through [`Db::begin_write`] instead of
//! calling `put`/`delete` back to back — each call with its own implicit
//! transaction pays for a meta-page fsync per call.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, instrument, trace};

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::io::{OsFile, RandomAccessFile};
use crate::meta::{self, HeaderPage, MetaPage};
use crate::options::OpenOptions;
use crate::page::P_INVALID;
use crate::pager::Pager;
use crate::tree::{compact::compact_tree, mutate, search::search_page, search::search_node};
use crate::txn::Txn;

/// An open, single-file, ordered key/value store.
pub struct Db {
    pager: Pager,
    meta: MetaPage,
    meta_pgno: u32,
    next_pgno: u32,
    header: HeaderPage,
    options: OpenOptions,
    path: PathBuf,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Db {
    /// Open (creating if absent) the database file at `path`.
    #[instrument(skip(options))]
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut io = OsFile::open(&path, options.read_only)?;

        if !options.read_only {
            if !io.try_lock_exclusive()? {
                return Err(Error::Busy);
            }
        }

        let empty = io.is_empty()?;
        let (header, psize) = if empty {
            if options.read_only {
                return Err(Error::NotFound("database file"));
            }
            let header = HeaderPage::new(options.page_size);
            let page = header.encode(options.page_size);
            io.write_at(0, &page.buf)?;
            io.flush()?;
            if !options.no_sync {
                io.sync()?;
            }
            (header, options.page_size)
        } else {
            let mut probe = vec![0u8; crate::options::MIN_PAGE_SIZE as usize];
            io.read_at(0, &mut probe)?;
            let probe_page = crate::page::Page::from_bytes(probe);
            let header = HeaderPage::decode(&probe_page)?;
            (header, header.psize)
        };

        let scan = meta::read_meta(&mut io, psize)?;

        if scan.fix_padding && !options.read_only {
            debug!(pgno = scan.meta_pgno, "truncating trailing partial page on open");
            io.truncate((scan.meta_pgno as u64 + 1) * psize as u64)?;
        }

        let pager = Pager::new(Box::new(io), psize, options.cache_size);

        Ok(Db {
            pager,
            meta: scan.meta,
            meta_pgno: scan.meta_pgno,
            next_pgno: scan.next_pgno,
            header,
            options,
            path,
        })
    }

    fn begin_txn(&self) -> Txn {
        if self.meta_pgno == P_INVALID {
            Txn::begin_empty(self.next_pgno)
        } else {
            Txn::begin(&self.meta, self.meta_pgno, self.next_pgno)
        }
    }

    /// Flush every page the transaction dirtied, write a new meta page
    /// describing the result, and fsync unless the database was opened
    /// with `no_sync`.
    fn commit(&mut self, mut txn: Txn) -> Result<()> {
        self.pager.flush_dirty(&txn)?;

        let meta_pgno = txn.next_pgno;
        txn.next_pgno += 1;
        let new_meta = MetaPage {
            flags: 0,
            root: txn.root,
            prev_meta: txn.prev_meta,
            created_at: now_unix(),
            branch_pages: txn.branch_pages,
            leaf_pages: txn.leaf_pages,
            overflow_pages: txn.overflow_pages,
            revisions: txn.revisions + 1,
            depth: txn.depth,
            entries: txn.entries,
            hash: [0u8; 32],
        };
        let page = new_meta.encode(meta_pgno, self.pager.psize());
        self.pager
            .io_mut()
            .write_at(meta_pgno as u64 * self.pager.psize() as u64, &page.buf)?;
        self.pager.io_mut().flush()?;
        if !self.options.no_sync {
            self.pager.io_mut().sync()?;
        }

        self.meta = new_meta;
        self.meta_pgno = meta_pgno;
        self.next_pgno = txn.next_pgno;
        self.pager.cache.prune();
        Ok(())
    }

    fn abort(&mut self, txn: Txn) {
        self.pager.discard(&txn);
    }

    /// Begin an explicit write transaction spanning several mutations.
    /// Every `put`/`delete` issued through the returned handle shares one
    /// dirty-page queue and is only made durable by [`WriteTxn::commit`].
    /// Dropping the handle without committing aborts it.
    pub fn begin_write(&mut self) -> Result<WriteTxn<'_>> {
        if self.options.read_only {
            return Err(Error::Perm);
        }
        let txn = self.begin_txn();
        Ok(WriteTxn { db: self, txn: Some(txn), errored: false })
    }

    /// The engine's canonical key comparison: an unequal
    /// length, strict-prefix-aware `memcmp`, the same ordering every
    /// search and split in the tree uses.
    pub fn cmp(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        crate::prefix::memncmp(a, b)
    }

    /// Look up `key`, returning its value if present.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() || key.len() > crate::page::MAXKEYSIZE {
            return Err(Error::InvalidArgument("key length out of range".into()));
        }
        let frames = search_page(&mut self.pager, self.meta.root, Some(key), None)?;
        let leaf = frames.last().copied().expect("search_page always returns a frame");
        let prefix = self.pager.cache.get(leaf.pgno).expect("resident").prefix.clone();
        let (idx, exact) = {
            let mp = self.pager.cache.get(leaf.pgno).expect("resident");
            search_node(&mp.page, &prefix, key)
        };
        let result = match (idx, exact) {
            (Some(i), true) => {
                let n = self.pager.cache.get(leaf.pgno).unwrap().page.node(i);
                if n.is_bigdata() {
                    let head = n.overflow_head();
                    let len = n.dsize() as usize;
                    self.pager.read_overflow(head, len)
                } else {
                    Ok(n.data.to_vec())
                }
            }
            _ => Err(Error::NotFound("key")),
        };
        self.pager.cache.prune();
        result
    }

    /// Insert or overwrite `key` with `data`, committing immediately.
    #[instrument(skip(self, data), fields(key_len = key.len(), data_len = data.len()))]
    pub fn put(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        let mut wtxn = self.begin_write()?;
        match wtxn.put(key, data) {
            Ok(()) => {
                trace!("committing put");
                wtxn.commit()
            }
            Err(e) => {
                wtxn.abort();
                Err(e)
            }
        }
    }

    /// Remove `key`, returning its prior value, committing immediately.
    pub fn delete(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let mut wtxn = self.begin_write()?;
        match wtxn.delete(key) {
            Ok(value) => {
                wtxn.commit()?;
                Ok(value)
            }
            Err(e) => {
                wtxn.abort();
                Err(e)
            }
        }
    }

    /// Open a cursor over the most recently committed snapshot.
    pub fn cursor(&mut self) -> Cursor<'_> {
        Cursor::new(&mut self.pager, self.meta.root)
    }

    /// Adjust the page cache's target resident-page count.
    pub fn set_cache_size(&mut self, count: usize) {
        self.pager.cache.max_cache = count.max(1);
    }

    /// Force all committed data to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.pager.io_mut().sync()
    }

    pub fn entries(&self) -> u64 {
        self.meta.entries
    }

    pub fn depth(&self) -> u32 {
        self.meta.depth
    }

    /// Rewrite the database into a fresh, densely packed file, dropping
    /// every page made dead by copy-on-write churn, then atomically
    /// replace the original file with it. This handle transparently keeps
    /// operating on the compacted file afterward; any other handle still
    /// open on the old file observes a tombstoned meta page and must
    /// reopen (see `Error::Stale`).
    #[instrument(skip(self))]
    pub fn compact(&mut self) -> Result<()> {
        if self.options.read_only {
            return Err(Error::Perm);
        }

        let tmp_path = self
            .path
            .with_file_name(format!(
                "{}.compact-{}",
                self.path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("db"),
                std::process::id()
            ));

        let dst_io = OsFile::create_new(&tmp_path, self.options.create_mode)?;
        let mut dst_pager = Pager::new(Box::new(dst_io), self.pager.psize(), self.options.cache_size);

        let header_page = self.header.encode(self.pager.psize());
        dst_pager.io_mut().write_at(0, &header_page.buf)?;

        let mut dst_txn = Txn::begin_empty(1);
        let new_root = compact_tree(&mut self.pager, self.meta.root, &mut dst_pager, &mut dst_txn)?;

        let compacted_meta = MetaPage {
            flags: 0,
            root: new_root,
            prev_meta: P_INVALID,
            created_at: now_unix(),
            branch_pages: self.meta.branch_pages,
            leaf_pages: self.meta.leaf_pages,
            overflow_pages: self.meta.overflow_pages,
            revisions: 0,
            depth: self.meta.depth,
            entries: self.meta.entries,
            hash: [0u8; 32],
        };
        let meta_pgno = dst_txn.next_pgno;
        let page = compacted_meta.encode(meta_pgno, self.pager.psize());
        dst_pager
            .io_mut()
            .write_at(meta_pgno as u64 * self.pager.psize() as u64, &page.buf)?;
        dst_pager.io_mut().flush()?;
        dst_pager.io_mut().sync()?;

        std::fs::rename(&tmp_path, &self.path)?;

        // Mark the old file stale for anyone still holding it open.
        let tombstone = MetaPage {
            flags: meta::TOMBSTONE,
            root: P_INVALID,
            prev_meta: self.meta_pgno,
            created_at: now_unix(),
            branch_pages: 0,
            leaf_pages: 0,
            overflow_pages: 0,
            revisions: self.meta.revisions,
            depth: 0,
            entries: 0,
            hash: [0u8; 32],
        };
        let stale_pgno = self.next_pgno;
        let stale_page = tombstone.encode(stale_pgno, self.pager.psize());
        self.pager
            .io_mut()
            .write_at(stale_pgno as u64 * self.pager.psize() as u64, &stale_page.buf)?;
        self.pager.io_mut().flush()?;

        self.pager = dst_pager;
        self.meta = compacted_meta;
        self.meta_pgno = meta_pgno;
        self.next_pgno = dst_txn.next_pgno;

        Ok(())
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if !self.options.read_only {
            let _ = self.pager.io_mut().unlock();
        }
    }
}

/// An explicit write transaction spanning zero or more `put`/`delete`
/// calls, obtained from [`Db::begin_write`]. Dropping it without calling
/// [`WriteTxn::commit`] aborts whatever it did, same as `txn_abort`.
pub struct WriteTxn<'a> {
    db: &'a mut Db,
    txn: Option<Txn>,
    errored: bool,
}

impl<'a> WriteTxn<'a> {
    /// Insert or overwrite `key` with `data` within this transaction.
    pub fn put(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        if key.is_empty() || key.len() > crate::page::MAXKEYSIZE {
            self.errored = true;
            return Err(Error::InvalidArgument("key length out of range".into()));
        }
        let txn = self.txn.as_mut().expect("txn already committed or aborted");
        let result = mutate::put(&mut self.db.pager, txn, key, data);
        if result.is_err() {
            self.errored = true;
        }
        result
    }

    /// Remove `key` within this transaction, returning its prior value.
    pub fn delete(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let txn = self.txn.as_mut().expect("txn already committed or aborted");
        let result = mutate::delete(&mut self.db.pager, txn, key);
        if result.is_err() {
            self.errored = true;
        }
        result
    }

    /// Flush every dirtied page and write a new meta page, making every
    /// mutation issued through this handle durable.
    ///
    /// Refused once any `put`/`delete` call on this handle has returned an
    /// error: the transaction is aborted instead, since a partial mutation
    /// may have left dirty pages in an inconsistent state.
    pub fn commit(mut self) -> Result<()> {
        let txn = self.txn.take().expect("txn already committed or aborted");
        if self.errored {
            self.db.abort(txn);
            return Err(Error::InvalidArgument(
                "cannot commit a transaction with a failed operation".into(),
            ));
        }
        self.db.commit(txn)
    }

    /// Discard every mutation issued through this handle.
    pub fn abort(mut self) {
        if let Some(txn) = self.txn.take() {
            self.db.abort(txn);
        }
    }
}

impl<'a> Drop for WriteTxn<'a> {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            self.db.abort(txn);
        }
    }
}
