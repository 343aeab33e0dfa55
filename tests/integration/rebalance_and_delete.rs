use pfxbt::{Db, Error, OpenOptions, Result};
use tempfile::NamedTempFile;

fn open_fresh() -> Result<(Db, NamedTempFile)> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();
    let db = Db::open(&path, OpenOptions::new())?;
    Ok((db, tmp))
}

// Insert many keys, delete every other one, and confirm the survivors
// are exactly what cursor traversal reports.
#[test]
fn delete_every_other_key_leaves_exact_survivors() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    for i in 0..1000u32 {
        let key = format!("k{i:05}");
        db.put(key.as_bytes(), key.as_bytes())?;
    }
    for i in (0..1000u32).step_by(2) {
        let key = format!("k{i:05}");
        db.delete(key.as_bytes())?;
    }

    let mut cursor = db.cursor();
    let mut seen = Vec::new();
    let mut result = cursor.first();
    loop {
        match result {
            Ok((k, _v)) => {
                seen.push(k);
                result = cursor.next();
            }
            Err(_) => break,
        }
    }

    let expected: Vec<Vec<u8>> = (0..1000u32)
        .filter(|i| i % 2 == 1)
        .map(|i| format!("k{i:05}").into_bytes())
        .collect();
    assert_eq!(seen, expected);
    assert_eq!(db.entries(), 500);
    Ok(())
}

#[test]
fn deleting_down_to_empty_resets_tree() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    for i in 0..50u32 {
        let key = format!("k{i:03}");
        db.put(key.as_bytes(), b"v")?;
    }
    for i in 0..50u32 {
        let key = format!("k{i:03}");
        db.delete(key.as_bytes())?;
    }
    assert_eq!(db.entries(), 0);
    assert_eq!(db.depth(), 0);
    assert!(matches!(db.get(b"k000"), Err(Error::NotFound(_))));

    // the tree must still accept fresh inserts after collapsing to empty
    db.put(b"fresh", b"v")?;
    assert_eq!(db.get(b"fresh")?, b"v");
    Ok(())
}

#[test]
fn deleting_root_branch_with_one_child_collapses_depth() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    for i in 0..2000u32 {
        let key = format!("d{i:05}");
        db.put(key.as_bytes(), b"v")?;
    }
    let depth_full = db.depth();
    assert!(depth_full >= 2, "expected a multi-level tree, got depth {depth_full}");

    for i in 0..1990u32 {
        let key = format!("d{i:05}");
        db.delete(key.as_bytes())?;
    }
    assert_eq!(db.entries(), 10);
    for i in 1990..2000u32 {
        let key = format!("d{i:05}");
        assert_eq!(db.get(key.as_bytes())?, b"v");
    }
    Ok(())
}

#[test]
fn interleaved_put_and_delete_matches_reference_model() -> Result<()> {
    use std::collections::BTreeMap;

    let (mut db, _tmp) = open_fresh()?;
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    for i in 0..300u32 {
        let key = format!("key{i:04}").into_bytes();
        let value = format!("val{i}").into_bytes();
        db.put(&key, &value)?;
        model.insert(key, value);

        if i % 5 == 0 && i > 0 {
            let victim = format!("key{:04}", i - 3).into_bytes();
            let removed_model = model.remove(&victim);
            let removed_db = db.delete(&victim);
            match removed_model {
                Some(v) => assert_eq!(removed_db.unwrap(), v),
                None => assert!(matches!(removed_db, Err(Error::NotFound(_)))),
            }
        }
    }

    for (k, v) in &model {
        assert_eq!(&db.get(k)?, v);
    }
    assert_eq!(db.entries() as usize, model.len());
    Ok(())
}
