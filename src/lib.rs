//! `pfxbt`: an embedded, single-file, ordered key/value store built on a
//! copy-on-write, prefix-compressed B+tree.
//!
//! A database is one file. Every committed state is reachable from a
//! hashed meta page at the tail of the file; writes never mutate a page
//! another committed meta can still see, so a crash mid-write leaves the
//! last successful commit intact. Keys share a common prefix with their
//! page's bracket keys are stored once per page rather than once per key.
//!
//! ```no_run
//! use pfxbt::{Db, OpenOptions};
//!
//! # fn main() -> pfxbt::Result<()> {
//! let mut db = Db::open("example.pfxbt", OpenOptions::new())?;
//! db.put(b"hello", b"world")?;
//! assert_eq!(db.get(b"hello")?, b"world");
//! # std::fs::remove_file("example.pfxbt").ok();
//! # Ok(())
//! # }
//! ```

mod cache;
mod cursor;
mod db;
mod error;
mod io;
mod logging;
mod meta;
mod options;
mod page;
mod pager;
mod prefix;
mod tree;
mod txn;

pub use cursor::Cursor;
pub use db::{Db, WriteTxn};
pub use error::{Error, Result};
pub use io::{OsFile, RandomAccessFile};
pub use logging::init_logging;
pub use options::OpenOptions;
