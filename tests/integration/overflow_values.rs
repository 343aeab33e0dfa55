use pfxbt::{Db, OpenOptions, Result};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::NamedTempFile;

fn open_fresh() -> Result<(Db, NamedTempFile)> {
    let tmp = NamedTempFile::new().expect("tempfile");
    let path = tmp.path().to_path_buf();
    let db = Db::open(&path, OpenOptions::new())?;
    Ok((db, tmp))
}

// A value much larger than a page spills into an overflow chain and
// reads back byte-for-byte.
#[test]
fn large_value_round_trips_through_overflow_chain() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut big = vec![0u8; 16 * 1024];
    rng.fill_bytes(&mut big);

    db.put(b"big", &big)?;
    let got = db.get(b"big")?;
    assert_eq!(got, big);
    Ok(())
}

#[test]
fn multiple_overflow_values_coexist_with_small_values() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let mut expected = Vec::new();
    for i in 0..8u32 {
        let mut v = vec![0u8; 8 * 1024 + i as usize];
        rng.fill_bytes(&mut v);
        let key = format!("overflow-{i}");
        db.put(key.as_bytes(), &v)?;
        expected.push((key, v));
    }
    db.put(b"small", b"tiny")?;

    for (key, v) in &expected {
        assert_eq!(&db.get(key.as_bytes())?, v);
    }
    assert_eq!(db.get(b"small")?, b"tiny");
    Ok(())
}

#[test]
fn overflow_value_deleted_and_replaced() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    let first = vec![1u8; 20 * 1024];
    let second = vec![2u8; 4];

    db.put(b"k", &first)?;
    assert_eq!(db.get(b"k")?, first);

    db.put(b"k", &second)?;
    assert_eq!(db.get(b"k")?, second);

    db.delete(b"k")?;
    assert!(db.get(b"k").is_err());
    Ok(())
}

#[test]
fn empty_value_stores_and_retrieves() -> Result<()> {
    let (mut db, _tmp) = open_fresh()?;
    db.put(b"empty", b"")?;
    assert_eq!(db.get(b"empty")?, b"");
    Ok(())
}
