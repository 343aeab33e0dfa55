use pfxbt::{Db, Error, OpenOptions, Result};
use tempfile::NamedTempFile;

// Two overlapping writer handles on the same file: the second fails to
// acquire the exclusive lock with BUSY.
#[test]
fn second_writer_gets_busy_while_first_is_open() -> Result<()> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();

    let first = Db::open(&path, OpenOptions::new())?;
    match Db::open(&path, OpenOptions::new()) {
        Err(Error::Busy) => {}
        other => panic!("expected Busy, got {other:?}"),
    }
    drop(first);

    // Lock released once the first handle drops.
    let _second = Db::open(&path, OpenOptions::new())?;
    Ok(())
}

#[test]
fn read_only_handles_do_not_conflict_with_each_other() -> Result<()> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();
    {
        let mut db = Db::open(&path, OpenOptions::new())?;
        db.put(b"a", b"1")?;
    }

    let a = Db::open(&path, OpenOptions::new().read_only(true))?;
    let b = Db::open(&path, OpenOptions::new().read_only(true))?;
    drop(a);
    drop(b);
    Ok(())
}

#[test]
fn read_only_handle_does_not_block_a_writer() -> Result<()> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();
    {
        let mut db = Db::open(&path, OpenOptions::new())?;
        db.put(b"a", b"1")?;
    }

    let _reader = Db::open(&path, OpenOptions::new().read_only(true))?;
    let mut writer = Db::open(&path, OpenOptions::new())?;
    writer.put(b"b", b"2")?;
    assert_eq!(writer.get(b"b")?, b"2");
    Ok(())
}

#[test]
fn lock_is_released_on_explicit_drop_between_sequential_writers() -> Result<()> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();

    for i in 0..5u32 {
        let mut db = Db::open(&path, OpenOptions::new())?;
        db.put(format!("k{i}").as_bytes(), b"v")?;
        // db dropped at end of loop iteration, releasing the lock
    }

    let db = Db::open(&path, OpenOptions::new().read_only(true))?;
    assert_eq!(db.entries(), 5);
    Ok(())
}
