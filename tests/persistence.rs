use std::fs;

use bptdb::{Database, DbError, DbOptions, HeaderPage, Synchronous, PAGE_SIZE};

fn fast_options() -> DbOptions {
    DbOptions::default().synchronous(Synchronous::Off)
}

#[test]
fn new_database_has_empty_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.db");
    let db = Database::open(&path).unwrap();

    assert_eq!(
        db.header(),
        HeaderPage { free_page_offset: 0, root_page_offset: 0, page_count: 1 }
    );
    assert_eq!(fs::metadata(&path).unwrap().len(), PAGE_SIZE as u64);
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reopen.db");
    {
        let mut db = Database::open_with(&path, fast_options()).unwrap();
        for key in -200..200 {
            db.insert(key, &format!("v{key}")).unwrap();
        }
        for key in (-200..200).step_by(3) {
            db.delete(key).unwrap();
        }
        db.close().unwrap();
    }

    let mut db = Database::open(&path).unwrap();
    for key in -200..200i64 {
        let expected = ((key + 200) % 3 != 0).then(|| format!("v{key}"));
        assert_eq!(db.find(key).unwrap(), expected);
    }
    db.verify().unwrap();
}

#[test]
fn reopened_file_keeps_allocator_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("allocator.db");
    let before = {
        let mut db = Database::open_with(&path, fast_options()).unwrap();
        for key in 0..100 {
            db.insert(key, "x").unwrap();
        }
        for key in 0..100 {
            db.delete(key).unwrap();
        }
        db.header()
    };

    let mut db = Database::open(&path).unwrap();
    assert_eq!(db.header(), before);

    // pages released earlier are handed out again instead of growing the file
    db.insert(1, "again").unwrap();
    assert_eq!(db.root_offset(), before.free_page_offset);
    assert_eq!(db.header().page_count, before.page_count);
}

#[test]
fn failed_operations_leave_file_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idempotent.db");
    let mut db = Database::open(&path).unwrap();
    for key in 0..50 {
        db.insert(key, "x").unwrap();
    }
    let before = fs::read(&path).unwrap();

    assert!(matches!(db.insert(10, "y"), Err(DbError::DuplicateKey(10))));
    assert!(matches!(db.delete(99), Err(DbError::NotFound(99))));

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn garbage_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.db");
    fs::write(&path, vec![0xAB; PAGE_SIZE * 2]).unwrap();

    assert!(matches!(Database::open(&path), Err(DbError::Corrupt(_))));
}

#[test]
fn empty_existing_file_is_initialized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.db");
    fs::write(&path, b"").unwrap();

    let mut db = Database::open(&path).unwrap();
    db.insert(3, "three").unwrap();
    assert_eq!(db.find(3).unwrap().as_deref(), Some("three"));
}
