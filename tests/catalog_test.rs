use stylist::catalog::{append_item, list_items, CatalogItem, IMAGE_ITEM_TYPE};
use stylist::db::{self, schema};

#[test]
fn catalog_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("catalog.db");

    let first = CatalogItem::new_image("ann@example.com", "ann@example.com/a.png");
    let second = CatalogItem::new_image("ann@example.com", "ann@example.com/b.png");
    {
        let conn = db::open_database(&path).unwrap();
        append_item(&conn, &first).unwrap();
        append_item(&conn, &second).unwrap();
    }

    let conn = db::open_database(&path).unwrap();
    assert_eq!(
        schema::get_schema_version(&conn).unwrap(),
        schema::CURRENT_SCHEMA_VERSION
    );
    let items = list_items(&conn, "ann@example.com", IMAGE_ITEM_TYPE).unwrap();
    assert_eq!(items, vec![first, second]);
}

#[test]
fn owners_do_not_see_each_other() {
    let conn = db::open_memory_database().unwrap();
    append_item(&conn, &CatalogItem::new_image("ann@example.com", "ann@example.com/a.png")).unwrap();
    append_item(&conn, &CatalogItem::new_image("bob@example.com", "bob@example.com/a.png")).unwrap();

    let ann = list_items(&conn, "ann@example.com", IMAGE_ITEM_TYPE).unwrap();
    assert_eq!(ann.len(), 1);
    assert_eq!(ann[0].storage_key, "ann@example.com/a.png");
    assert!(list_items(&conn, "carol@example.com", IMAGE_ITEM_TYPE)
        .unwrap()
        .is_empty());
}

#[test]
fn wal_mode_is_enabled_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let conn = db::open_database(dir.path().join("catalog.db")).unwrap();
    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}
