use pfxbt::{Db, Error, OpenOptions, Result};
use tempfile::NamedTempFile;

fn open_fresh() -> Result<(Db, NamedTempFile)> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();
    // NamedTempFile already created the (empty) file; Db::open reuses it.
    let db = Db::open(&path, OpenOptions::new())?;
    Ok((db, tmp))
}

#[test]
fn put_then_get_round_trips() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    db.put(b"a", b"1")?;
    assert_eq!(db.get(b"a")?, b"1");
    assert_eq!(db.entries(), 1);
    assert_eq!(db.depth(), 1);
    Ok(())
}

#[test]
fn get_missing_key_is_not_found() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    db.put(b"a", b"1")?;
    match db.get(b"zzz") {
        Err(Error::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
    Ok(())
}

#[test]
fn put_overwrite_replaces_value() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    db.put(b"a", b"1")?;
    db.put(b"a", b"2")?;
    assert_eq!(db.get(b"a")?, b"2");
    Ok(())
}

// put on an existing key deletes and reinserts, then unconditionally
// increments entries. This is preserved literally rather than "fixed" --
// see DESIGN.md.
#[test]
fn put_update_inflates_entries() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    db.put(b"a", b"1")?;
    assert_eq!(db.entries(), 1);
    db.put(b"a", b"2")?;
    assert_eq!(db.entries(), 2);
    assert_eq!(db.get(b"a")?, b"2");
    Ok(())
}

#[test]
fn delete_returns_previous_value_and_removes_key() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    db.put(b"a", b"1")?;
    let prev = db.delete(b"a")?;
    assert_eq!(prev, b"1");
    assert!(matches!(db.get(b"a"), Err(Error::NotFound(_))));
    assert_eq!(db.entries(), 0);
    Ok(())
}

#[test]
fn delete_missing_key_is_not_found() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    assert!(matches!(db.delete(b"nope"), Err(Error::NotFound(_))));
    Ok(())
}

#[test]
fn key_length_validation_rejects_empty_and_oversized() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    assert!(matches!(db.put(b"", b"x"), Err(Error::InvalidArgument(_))));
    let huge_key = vec![b'k'; 256];
    assert!(matches!(db.put(&huge_key, b"x"), Err(Error::InvalidArgument(_))));
    Ok(())
}

#[test]
fn read_only_handle_rejects_mutation() -> Result<()> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();
    {
        let mut db = Db::open(&path, OpenOptions::new())?;
        db.put(b"a", b"1")?;
    }
    let mut ro = Db::open(&path, OpenOptions::new().read_only(true))?;
    assert_eq!(ro.get(b"a")?, b"1");
    assert!(matches!(ro.put(b"b", b"2"), Err(Error::Perm)));
    Ok(())
}

#[test]
fn cmp_matches_lexicographic_order_with_prefix_awareness() -> Result<()> {
    let (db, _tmp) = open_fresh()?;
    use std::cmp::Ordering;
    assert_eq!(db.cmp(b"ab", b"abc"), Ordering::Less);
    assert_eq!(db.cmp(b"abc", b"ab"), Ordering::Greater);
    assert_eq!(db.cmp(b"abc", b"abd"), Ordering::Less);
    Ok(())
}

#[test]
fn explicit_write_txn_batches_several_mutations() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    {
        let mut wtxn = db.begin_write()?;
        wtxn.put(b"a", b"1")?;
        wtxn.put(b"b", b"2")?;
        wtxn.delete(b"a")?;
        wtxn.commit()?;
    }
    assert!(matches!(db.get(b"a"), Err(Error::NotFound(_))));
    assert_eq!(db.get(b"b")?, b"2");
    Ok(())
}

#[test]
fn dropping_write_txn_without_commit_aborts() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    {
        let mut wtxn = db.begin_write()?;
        wtxn.put(b"a", b"1")?;
        // dropped without commit
    }
    assert!(matches!(db.get(b"a"), Err(Error::NotFound(_))));
    Ok(())
}

// A mid-transaction failure marks the handle errored, and commit
// is refused (the transaction is aborted instead), so an earlier successful
// put in the same batch never becomes durable alongside the failed one.
#[test]
fn commit_is_refused_after_a_failed_operation_in_the_same_txn() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    {
        let mut wtxn = db.begin_write()?;
        wtxn.put(b"a", b"1")?;
        assert!(matches!(wtxn.put(b"", b"x"), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            wtxn.commit(),
            Err(Error::InvalidArgument(_))
        ));
    }
    assert!(matches!(db.get(b"a"), Err(Error::NotFound(_))));
    Ok(())
}
