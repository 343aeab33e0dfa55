use pfxbt::{Db, OpenOptions, Result};
use tempfile::NamedTempFile;

fn open_fresh() -> Result<(Db, NamedTempFile)> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();
    let db = Db::open(&path, OpenOptions::new())?;
    Ok((db, tmp))
}

// Keys sharing a long common prefix should compress into a much smaller
// file than the same count of prefix-free keys, since
// every leaf stores the shared bytes once per page rather than once per key.
#[test]
fn shared_prefix_keys_compress_smaller_than_random_keys() -> Result<()> {
    let prefix = b"abcdefghij_";

    let (mut shared_db, shared_tmp) = open_fresh()?;
    for i in 0..2000u32 {
        let key = format!("{}{:04}", String::from_utf8_lossy(prefix), i);
        shared_db.put(key.as_bytes(), key.as_bytes())?;
    }
    shared_db.sync()?;
    drop(shared_db);
    let shared_size = std::fs::metadata(shared_tmp.path())?.len();

    let (mut spread_db, spread_tmp) = open_fresh()?;
    for i in 0..2000u32 {
        // Same length, no shared leading bytes: each key gets its own
        // unique-from-byte-0 20-byte string.
        let key = format!("{:020}", i * 7919 + 104729);
        spread_db.put(key.as_bytes(), key.as_bytes())?;
    }
    spread_db.sync()?;
    drop(spread_db);
    let spread_size = std::fs::metadata(spread_tmp.path())?.len();

    assert!(
        shared_size < spread_size,
        "shared-prefix file ({shared_size}) should be smaller than spread-key file ({spread_size})"
    );
    Ok(())
}

#[test]
fn lookups_work_across_many_shared_prefix_keys() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    for i in 0..500u32 {
        let key = format!("abcdefghij_{i:04}");
        db.put(key.as_bytes(), key.as_bytes())?;
    }
    for i in 0..500u32 {
        let key = format!("abcdefghij_{i:04}");
        assert_eq!(db.get(key.as_bytes())?, key.as_bytes());
    }
    Ok(())
}

#[test]
fn prefix_compression_survives_split_and_rebalance() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    // Enough keys under one shared prefix to force multiple splits.
    for i in 0..5000u32 {
        let key = format!("shared-prefix-bucket/{i:05}");
        db.put(key.as_bytes(), b"v")?;
    }
    for i in (0..5000u32).step_by(3) {
        let key = format!("shared-prefix-bucket/{i:05}");
        db.delete(key.as_bytes())?;
    }
    for i in 0..5000u32 {
        let key = format!("shared-prefix-bucket/{i:05}");
        let expect_present = i % 3 != 0;
        match db.get(key.as_bytes()) {
            Ok(v) => assert!(expect_present && v == b"v", "key {i} unexpectedly present"),
            Err(_) => assert!(!expect_present, "key {i} unexpectedly missing"),
        }
    }
    Ok(())
}
