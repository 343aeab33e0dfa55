use std::fs::OpenOptions as FsOpenOptions;
use std::io::{Seek, SeekFrom, Write};

use pfxbt::{Db, Error, OpenOptions, Result};
use tempfile::NamedTempFile;

// Close and reopen must preserve counts and traversal; a file truncated
// mid-page must still recover a consistent snapshot.
#[test]
fn reopen_preserves_entries_and_traversal() -> Result<()> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();

    {
        let mut db = Db::open(&path, OpenOptions::new())?;
        for i in 0..500u32 {
            db.put(format!("r{i:04}").as_bytes(), format!("v{i}").as_bytes())?;
        }
    }

    {
        let mut db = Db::open(&path, OpenOptions::new())?;
        assert_eq!(db.entries(), 500);
        for i in 0..500u32 {
            assert_eq!(db.get(format!("r{i:04}").as_bytes())?, format!("v{i}").as_bytes());
        }
    }
    Ok(())
}

#[test]
fn torn_trailing_write_is_recovered_on_open() -> Result<()> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();

    let good_len = {
        let mut db = Db::open(&path, OpenOptions::new())?;
        for i in 0..50u32 {
            db.put(format!("t{i:03}").as_bytes(), b"v")?;
        }
        db.sync()?;
        std::fs::metadata(&path)?.len()
    };

    // Simulate a torn append: a few extra garbage bytes past the last
    // committed meta page, not a multiple of the page size.
    {
        let mut f = FsOpenOptions::new().write(true).open(&path)?;
        f.seek(SeekFrom::End(0))?;
        f.write_all(&[0xAAu8; 37])?;
    }
    assert!(std::fs::metadata(&path)?.len() > good_len);

    let mut db = Db::open(&path, OpenOptions::new())?;
    assert_eq!(db.entries(), 50);
    for i in 0..50u32 {
        assert_eq!(db.get(format!("t{i:03}").as_bytes())?, b"v");
    }

    // The recovery truncation should have rounded the file back down to
    // a page boundary.
    let recovered_len = std::fs::metadata(&path)?.len();
    assert_eq!(recovered_len, good_len);
    Ok(())
}

#[test]
fn opening_nonexistent_file_read_only_fails() -> Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("does-not-exist.pfxbt");
    assert!(matches!(
        Db::open(&path, OpenOptions::new().read_only(true)),
        Err(Error::NotFound(_)) | Err(Error::Io(_))
    ));
    Ok(())
}

#[test]
fn second_writer_on_same_file_is_busy() -> Result<()> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();
    let _first = Db::open(&path, OpenOptions::new())?;
    match Db::open(&path, OpenOptions::new()) {
        Err(Error::Busy) => {}
        other => panic!("expected Busy, got {other:?}"),
    }
    Ok(())
}
