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

// Sequentially keyed inserts deep enough to force a multi-level tree;
// FIRST/NEXT traversal must still yield them in order.
#[test]
fn first_next_yields_strictly_increasing_keys() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    for i in 0..3000u32 {
        let key = format!("k{i:05}");
        db.put(key.as_bytes(), key.as_bytes())?;
    }

    let all = collect_all(&mut db)?;
    assert_eq!(all.len(), 3000);
    for w in all.windows(2) {
        assert!(w[0].0 < w[1].0, "traversal out of order: {:?} >= {:?}", w[0].0, w[1].0);
    }
    for (k, v) in &all {
        assert_eq!(k, v);
    }
    assert_eq!(db.get(b"k02500")?, b"k02500");
    assert!(db.depth() >= 2);
    Ok(())
}

#[test]
fn cursor_on_empty_tree_has_no_first() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    let mut cursor = db.cursor();
    assert!(matches!(cursor.first(), Err(Error::NotFound(_))));
    Ok(())
}

#[test]
fn seek_positions_on_smallest_key_greater_or_equal() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    for key in ["b", "d", "f", "h"] {
        db.put(key.as_bytes(), key.as_bytes())?;
    }
    let mut cursor = db.cursor();
    let (k, _) = cursor.seek(b"c")?;
    assert_eq!(k, b"d");

    let (k, _) = cursor.seek(b"d")?;
    assert_eq!(k, b"d");

    assert!(cursor.seek(b"z").is_err());
    Ok(())
}

#[test]
fn seek_exact_requires_exact_match() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    db.put(b"mid", b"v")?;
    let mut cursor = db.cursor();
    assert!(cursor.seek_exact(b"mid").is_ok());
    assert!(matches!(cursor.seek_exact(b"nope"), Err(Error::NotFound(_))));
    Ok(())
}

#[test]
fn cursor_visits_every_key_exactly_once_after_deletions() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    for i in 0..400u32 {
        db.put(format!("x{i:04}").as_bytes(), b"v")?;
    }
    for i in (0..400u32).step_by(4) {
        db.delete(format!("x{i:04}").as_bytes())?;
    }

    let all = collect_all(&mut db)?;
    let expected_count = 400 - (400 / 4);
    assert_eq!(all.len(), expected_count);

    let mut seen = std::collections::HashSet::new();
    for (k, _) in &all {
        assert!(seen.insert(k.clone()), "key {k:?} visited more than once");
    }
    Ok(())
}
