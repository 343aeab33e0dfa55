use pfxbt::{Db, Error, OpenOptions, Result};
use tempfile::NamedTempFile;

fn open_fresh() -> Result<(Db, NamedTempFile)> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();
    let db = Db::open(&path, OpenOptions::new())?;
    Ok((db, tmp))
}

fn collect_all(db: &mut Db) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut cursor = db.cursor();
    let mut out = Vec::new();
    let mut next = cursor.first();
    loop {
        match next {
            Ok(pair) => {
                next = cursor.next();
                out.push(pair);
            }
            Err(_) => return Ok(out),
        }
    }
}

// Compacting a heavily-churned database shrinks the file and preserves
// every surviving key/value, readable through the same handle that
// performed the compaction.
#[test]
fn compact_shrinks_file_and_preserves_data() -> Result<()> {
    let (mut db, tmp) = open_fresh()?;
    let path = tmp.path().to_path_buf();

    for i in 0..2000u32 {
        db.put(format!("c{i:05}").as_bytes(), format!("v{i}").as_bytes())?;
    }
    for i in 0..1800u32 {
        db.delete(format!("c{i:05}").as_bytes())?;
    }
    db.sync()?;
    let size_before = std::fs::metadata(&path)?.len();

    db.compact()?;
    let size_after = std::fs::metadata(&path)?.len();
    assert!(
        size_after <= size_before,
        "compacted file ({size_after}) should not be larger than before ({size_before})"
    );

    for i in 1800..2000u32 {
        assert_eq!(db.get(format!("c{i:05}").as_bytes())?, format!("v{i}").as_bytes());
    }
    let all = collect_all(&mut db)?;
    assert_eq!(all.len(), 200);
    Ok(())
}

#[test]
fn compact_on_empty_tree_is_a_no_op() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    db.compact()?;
    assert_eq!(db.entries(), 0);
    db.put(b"a", b"1")?;
    assert_eq!(db.get(b"a")?, b"1");
    Ok(())
}

// The pre-compaction inode is tombstoned, not deleted: anything still
// pointing at it (a hard link taken before the rename, standing in for a
// second process's already-open path) observes STALE on its next open,
// while a fresh open through the real path transparently sees the
// compacted file.
#[test]
fn stale_inode_is_tombstoned_after_compaction() -> Result<()> {
    let (mut db, tmp) = open_fresh()?;
    let path = tmp.path().to_path_buf();
    let stale_path = path.with_extension("stale-link");
    std::fs::hard_link(&path, &stale_path)?;

    db.put(b"a", b"1")?;
    db.sync()?;

    db.compact()?;

    match Db::open(&stale_path, OpenOptions::new().read_only(true)) {
        Err(Error::Stale) => {}
        other => panic!("expected Stale opening the pre-compaction inode, got {other:?}"),
    }

    let mut fresh = Db::open(&path, OpenOptions::new().read_only(true))?;
    assert_eq!(fresh.get(b"a")?, b"1");

    std::fs::remove_file(&stale_path).ok();
    Ok(())
}
