//! Per-user item catalog.
//!
//! Append-only records pointing at uploaded objects. [`append_item`] writes a
//! record; [`list_items`] reads one owner's records whose type starts with a
//! prefix, oldest first.

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

/// Item type recorded for uploaded clothing photos.
pub const IMAGE_ITEM_TYPE: &str = "image";

/// Timestamp format for `uploaded_at`.
pub const UPLOADED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A catalog record, matching the `items` table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    /// Principal that uploaded the item (the token's email claim).
    pub owner: String,
    pub item_type: String,
    /// UUID v7 (time-sortable) primary key.
    pub item_id: String,
    /// Object store key of the item's bytes.
    pub storage_key: String,
    /// UTC, formatted with [`UPLOADED_AT_FORMAT`].
    pub uploaded_at: String,
}

impl CatalogItem {
    /// A new image record stamped with a fresh id and the current time.
    pub fn new_image(owner: &str, storage_key: &str) -> Self {
        Self {
            owner: owner.to_string(),
            item_type: IMAGE_ITEM_TYPE.to_string(),
            item_id: uuid::Uuid::now_v7().to_string(),
            storage_key: storage_key.to_string(),
            uploaded_at: chrono::Utc::now().format(UPLOADED_AT_FORMAT).to_string(),
        }
    }
}

pub fn append_item(conn: &Connection, item: &CatalogItem) -> Result<()> {
    conn.execute(
        "INSERT INTO items (item_id, owner, item_type, storage_key, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            item.item_id,
            item.owner,
            item.item_type,
            item.storage_key,
            item.uploaded_at
        ],
    )?;
    tracing::debug!(owner = %item.owner, item_id = %item.item_id, "catalog item appended");
    Ok(())
}

/// All of `owner`'s items whose type starts with `type_prefix`.
pub fn list_items(conn: &Connection, owner: &str, type_prefix: &str) -> Result<Vec<CatalogItem>> {
    let mut stmt = conn.prepare(
        "SELECT owner, item_type, item_id, storage_key, uploaded_at
         FROM items
         WHERE owner = ?1 AND substr(item_type, 1, length(?2)) = ?2
         ORDER BY uploaded_at, item_id",
    )?;
    let items = stmt
        .query_map(params![owner, type_prefix], |row| {
            Ok(CatalogItem {
                owner: row.get(0)?,
                item_type: row.get(1)?,
                item_id: row.get(2)?,
                storage_key: row.get(3)?,
                uploaded_at: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn item(owner: &str, item_type: &str, key: &str, at: &str) -> CatalogItem {
        CatalogItem {
            owner: owner.into(),
            item_type: item_type.into(),
            item_id: uuid::Uuid::now_v7().to_string(),
            storage_key: key.into(),
            uploaded_at: at.into(),
        }
    }

    #[test]
    fn new_image_is_stamped() {
        let item = CatalogItem::new_image("ada@example.com", "ada@example.com/shirt.png");
        assert_eq!(item.item_type, IMAGE_ITEM_TYPE);
        assert!(uuid::Uuid::parse_str(&item.item_id).is_ok());
        assert!(
            chrono::NaiveDateTime::parse_from_str(&item.uploaded_at, UPLOADED_AT_FORMAT).is_ok()
        );
    }

    #[test]
    fn list_filters_by_owner_and_prefix() {
        let conn = open_memory_database().unwrap();
        append_item(&conn, &item("ada", "image", "ada/a.png", "2024-01-01 10:00:00")).unwrap();
        append_item(&conn, &item("ada", "image/jpeg", "ada/b.jpg", "2024-01-01 09:00:00")).unwrap();
        append_item(&conn, &item("ada", "note", "ada/n.txt", "2024-01-01 08:00:00")).unwrap();
        append_item(&conn, &item("bob", "image", "bob/c.png", "2024-01-01 07:00:00")).unwrap();

        let items = list_items(&conn, "ada", "image").unwrap();
        let keys: Vec<&str> = items.iter().map(|i| i.storage_key.as_str()).collect();
        assert_eq!(keys, vec!["ada/b.jpg", "ada/a.png"]);

        assert!(list_items(&conn, "carol", "image").unwrap().is_empty());
        assert_eq!(list_items(&conn, "ada", "").unwrap().len(), 3);
    }

    #[test]
    fn duplicate_item_id_is_rejected() {
        let conn = open_memory_database().unwrap();
        let record = item("ada", "image", "ada/a.png", "2024-01-01 10:00:00");
        append_item(&conn, &record).unwrap();
        assert!(append_item(&conn, &record).is_err());
    }
}
