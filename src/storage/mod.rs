// Record store: relational persistence for categories, items, and generated
// sketches, behind one trait so the migration job and tests can swap the
// backing database.
mod sqlite;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use sqlite::SqliteStore;

/// Where an item's image comes from: an inline icon, an AI sketch persisted
/// to the bucket, or a photo the owner uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Default,
    Custom,
    Uploaded,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Default => "default",
            ImageKind::Custom => "custom",
            ImageKind::Uploaded => "uploaded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "default" => Some(ImageKind::Default),
            "custom" => Some(ImageKind::Custom),
            "uploaded" => Some(ImageKind::Uploaded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub created_at: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub image_url: Option<String>,
    pub image_kind: ImageKind,
    pub category_id: Option<String>,
    pub created_at: f64,
    pub updated_at: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SketchRecord {
    pub id: String,
    pub owner_id: String,
    pub prompt: String,
    pub image_url: String,
    pub created_at: f64,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub image_url: Option<String>,
    pub image_kind: ImageKind,
    pub category_id: Option<String>,
}

/// Partial update. Outer `Option` = "field present in the request", inner
/// `Option` = the new nullable value.
#[derive(Debug, Clone, Default)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub quantity: Option<i64>,
    pub image_url: Option<Option<String>>,
    pub image_kind: Option<ImageKind>,
}

impl ItemChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.quantity.is_none()
            && self.image_url.is_none()
            && self.image_kind.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRecordKind {
    Item,
    Sketch,
}

impl ImageRecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageRecordKind::Item => "item",
            ImageRecordKind::Sketch => "sketch",
        }
    }
}

/// One image-bearing record, as the migration job sees it.
#[derive(Debug, Clone)]
pub struct ImageRecordRef {
    pub kind: ImageRecordKind,
    pub id: String,
    pub owner_id: String,
    pub image_url: String,
}

pub trait RecordStore: Send + Sync {
    fn ensure_initialized(&self) -> Result<()>;

    fn list_categories(&self, owner_id: &str) -> Result<Vec<CategoryRecord>>;
    fn get_category(&self, owner_id: &str, id: &str) -> Result<Option<CategoryRecord>>;
    fn find_category_by_name(&self, owner_id: &str, name: &str) -> Result<Option<CategoryRecord>>;
    /// `None` when the owner already has a category with this name.
    fn insert_category(&self, owner_id: &str, name: &str) -> Result<Option<CategoryRecord>>;
    /// Items referencing the category keep existing without it.
    fn delete_category(&self, owner_id: &str, id: &str) -> Result<bool>;

    fn list_items(&self, owner_id: &str, category_id: Option<&str>) -> Result<Vec<ItemRecord>>;
    fn get_item(&self, owner_id: &str, id: &str) -> Result<Option<ItemRecord>>;
    fn insert_item(&self, item: NewItem) -> Result<ItemRecord>;
    fn update_item(
        &self,
        owner_id: &str,
        id: &str,
        changes: ItemChanges,
    ) -> Result<Option<ItemRecord>>;
    fn delete_item(&self, owner_id: &str, id: &str) -> Result<bool>;

    fn list_sketches(&self, owner_id: &str) -> Result<Vec<SketchRecord>>;
    fn get_sketch(&self, id: &str) -> Result<Option<SketchRecord>>;
    fn insert_sketch(&self, owner_id: &str, prompt: &str, image_url: &str)
        -> Result<SketchRecord>;
    fn delete_sketch(&self, id: &str) -> Result<bool>;

    /// Every record whose image may live outside the bucket, oldest first.
    fn list_image_records(&self) -> Result<Vec<ImageRecordRef>>;
    fn update_image_url(&self, record: &ImageRecordRef, url: &str) -> Result<()>;
}
