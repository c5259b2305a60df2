// SQLite record store. Connections are opened per call; WAL keeps readers
// and the single writer out of each other's way.
use crate::storage::{
    CategoryRecord, ImageKind, ImageRecordKind, ImageRecordRef, ItemChanges, ItemRecord, NewItem,
    RecordStore, SketchRecord,
};
use anyhow::{anyhow, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

pub struct SqliteStore {
    db_path: PathBuf,
    initialized: AtomicBool,
    init_guard: Mutex<()>,
}

impl SqliteStore {
    pub fn new(db_path: String) -> Self {
        let path = if db_path.trim().is_empty() {
            PathBuf::from("./data/pictora.db")
        } else {
            PathBuf::from(db_path)
        };
        Self {
            db_path: path,
            initialized: AtomicBool::new(false),
            init_guard: Mutex::new(()),
        }
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Ok(conn)
    }

    fn conn(&self) -> Result<Connection> {
        self.ensure_initialized()?;
        self.open()
    }

    fn now_ts() -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<CategoryRecord> {
    Ok(CategoryRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ItemRecord> {
    let kind: String = row.get(6)?;
    Ok(ItemRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        quantity: row.get(4)?,
        image_url: row.get(5)?,
        image_kind: ImageKind::parse(&kind).unwrap_or(ImageKind::Default),
        category_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn sketch_from_row(row: &Row<'_>) -> rusqlite::Result<SketchRecord> {
    Ok(SketchRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        prompt: row.get(2)?,
        image_url: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const ITEM_COLUMNS: &str = "id, owner_id, name, description, quantity, image_url, image_kind, \
                            category_id, created_at, updated_at";

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
    )
}

impl RecordStore for SqliteStore {
    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.init_guard.lock();
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at REAL NOT NULL,
                UNIQUE(owner_id, name)
            );
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                quantity INTEGER NOT NULL DEFAULT 1,
                image_url TEXT,
                image_kind TEXT NOT NULL DEFAULT 'default',
                category_id TEXT,
                created_at REAL NOT NULL,
                updated_at REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_items_owner ON items(owner_id, created_at);
            CREATE TABLE IF NOT EXISTS sketches (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                prompt TEXT NOT NULL,
                image_url TEXT NOT NULL,
                created_at REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sketches_owner ON sketches(owner_id, created_at);",
        )?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn list_categories(&self, owner_id: &str) -> Result<Vec<CategoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, created_at FROM categories
             WHERE owner_id = ? ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![owner_id], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn get_category(&self, owner_id: &str, id: &str) -> Result<Option<CategoryRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, owner_id, name, created_at FROM categories
                 WHERE id = ? AND owner_id = ?",
                params![id, owner_id],
                category_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn find_category_by_name(&self, owner_id: &str, name: &str) -> Result<Option<CategoryRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, owner_id, name, created_at FROM categories
                 WHERE owner_id = ? AND name = ?",
                params![owner_id, name],
                category_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn insert_category(&self, owner_id: &str, name: &str) -> Result<Option<CategoryRecord>> {
        let conn = self.conn()?;
        let record = CategoryRecord {
            id: Self::new_id(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            created_at: Self::now_ts(),
        };
        let inserted = conn.execute(
            "INSERT INTO categories (id, owner_id, name, created_at) VALUES (?, ?, ?, ?)",
            params![record.id, record.owner_id, record.name, record.created_at],
        );
        match inserted {
            Ok(_) => Ok(Some(record)),
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn delete_category(&self, owner_id: &str, id: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE items SET category_id = NULL WHERE category_id = ? AND owner_id = ?",
            params![id, owner_id],
        )?;
        let affected = tx.execute(
            "DELETE FROM categories WHERE id = ? AND owner_id = ?",
            params![id, owner_id],
        )?;
        tx.commit()?;
        Ok(affected > 0)
    }

    fn list_items(&self, owner_id: &str, category_id: Option<&str>) -> Result<Vec<ItemRecord>> {
        let conn = self.conn()?;
        let rows = match category_id {
            Some(category_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items
                     WHERE owner_id = ? AND category_id = ? ORDER BY created_at DESC"
                ))?;
                let result = stmt
                    .query_map(params![owner_id, category_id], item_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items
                     WHERE owner_id = ? ORDER BY created_at DESC"
                ))?;
                let result = stmt
                    .query_map(params![owner_id], item_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
        };
        Ok(rows)
    }

    fn get_item(&self, owner_id: &str, id: &str) -> Result<Option<ItemRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ? AND owner_id = ?"),
                params![id, owner_id],
                item_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn insert_item(&self, item: NewItem) -> Result<ItemRecord> {
        let conn = self.conn()?;
        let now = Self::now_ts();
        let record = ItemRecord {
            id: Self::new_id(),
            owner_id: item.owner_id,
            name: item.name,
            description: item.description,
            quantity: item.quantity,
            image_url: item.image_url,
            image_kind: item.image_kind,
            category_id: item.category_id,
            created_at: now,
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO items (id, owner_id, name, description, quantity, image_url,
                                image_kind, category_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.owner_id,
                record.name,
                record.description,
                record.quantity,
                record.image_url,
                record.image_kind.as_str(),
                record.category_id,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(record)
    }

    fn update_item(
        &self,
        owner_id: &str,
        id: &str,
        changes: ItemChanges,
    ) -> Result<Option<ItemRecord>> {
        if changes.is_empty() {
            return Err(anyhow!("no fields to update"));
        }
        let conn = self.conn()?;
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(name) = changes.name {
            sets.push("name = ?");
            values.push(SqlValue::Text(name));
        }
        if let Some(description) = changes.description {
            sets.push("description = ?");
            values.push(match description {
                Some(text) => SqlValue::Text(text),
                None => SqlValue::Null,
            });
        }
        if let Some(quantity) = changes.quantity {
            sets.push("quantity = ?");
            values.push(SqlValue::Integer(quantity));
        }
        if let Some(image_url) = changes.image_url {
            sets.push("image_url = ?");
            values.push(match image_url {
                Some(url) => SqlValue::Text(url),
                None => SqlValue::Null,
            });
        }
        if let Some(kind) = changes.image_kind {
            sets.push("image_kind = ?");
            values.push(SqlValue::Text(kind.as_str().to_string()));
        }
        sets.push("updated_at = ?");
        values.push(SqlValue::Real(Self::now_ts()));
        values.push(SqlValue::Text(id.to_string()));
        values.push(SqlValue::Text(owner_id.to_string()));

        let sql = format!(
            "UPDATE items SET {} WHERE id = ? AND owner_id = ?",
            sets.join(", ")
        );
        let affected = conn.execute(&sql, params_from_iter(values))?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_item(owner_id, id)
    }

    fn delete_item(&self, owner_id: &str, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM items WHERE id = ? AND owner_id = ?",
            params![id, owner_id],
        )?;
        Ok(affected > 0)
    }

    fn list_sketches(&self, owner_id: &str) -> Result<Vec<SketchRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, prompt, image_url, created_at FROM sketches
             WHERE owner_id = ? ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![owner_id], sketch_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn get_sketch(&self, id: &str) -> Result<Option<SketchRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, owner_id, prompt, image_url, created_at FROM sketches WHERE id = ?",
                params![id],
                sketch_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn insert_sketch(
        &self,
        owner_id: &str,
        prompt: &str,
        image_url: &str,
    ) -> Result<SketchRecord> {
        let conn = self.conn()?;
        let record = SketchRecord {
            id: Self::new_id(),
            owner_id: owner_id.to_string(),
            prompt: prompt.to_string(),
            image_url: image_url.to_string(),
            created_at: Self::now_ts(),
        };
        conn.execute(
            "INSERT INTO sketches (id, owner_id, prompt, image_url, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.id,
                record.owner_id,
                record.prompt,
                record.image_url,
                record.created_at,
            ],
        )?;
        Ok(record)
    }

    fn delete_sketch(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn.execute("DELETE FROM sketches WHERE id = ?", params![id])?;
        Ok(affected > 0)
    }

    fn list_image_records(&self) -> Result<Vec<ImageRecordRef>> {
        let conn = self.conn()?;
        let mut records = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, image_url FROM sketches ORDER BY created_at ASC",
        )?;
        let sketches = stmt.query_map([], |row| {
            Ok(ImageRecordRef {
                kind: ImageRecordKind::Sketch,
                id: row.get(0)?,
                owner_id: row.get(1)?,
                image_url: row.get(2)?,
            })
        })?;
        for record in sketches {
            records.push(record?);
        }
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, image_url FROM items
             WHERE image_url IS NOT NULL AND image_kind IN ('custom', 'uploaded')
             ORDER BY created_at ASC",
        )?;
        let items = stmt.query_map([], |row| {
            Ok(ImageRecordRef {
                kind: ImageRecordKind::Item,
                id: row.get(0)?,
                owner_id: row.get(1)?,
                image_url: row.get(2)?,
            })
        })?;
        for record in items {
            records.push(record?);
        }
        Ok(records)
    }

    fn update_image_url(&self, record: &ImageRecordRef, url: &str) -> Result<()> {
        let conn = self.conn()?;
        let affected = match record.kind {
            ImageRecordKind::Sketch => conn.execute(
                "UPDATE sketches SET image_url = ? WHERE id = ?",
                params![url, record.id],
            )?,
            ImageRecordKind::Item => conn.execute(
                "UPDATE items SET image_url = ?, updated_at = ? WHERE id = ?",
                params![url, Self::now_ts(), record.id],
            )?,
        };
        if affected == 0 {
            return Err(anyhow!("record {} no longer exists", record.id));
        }
        Ok(())
    }
}
