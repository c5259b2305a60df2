// Image provenance pipeline: classification, transfer into durable storage,
// sketch generation, icon lookup, and best-effort translation.
mod classify;
mod error;
mod generator;
mod icons;
mod store;
mod transfer;
mod translate;

pub use classify::{UrlClass, UrlClassifier};
pub use error::ImageError;
pub use generator::{GeneratedSketch, SketchGenerator};
pub use icons::{recommended_ids, IconCatalog, IconData, SketchIcon, RECOMMENDED_ICONS};
pub use store::{BucketClient, ObjectStore};
pub use transfer::{DeleteOutcome, ImageSource, TransferEngine, MAX_IMAGE_BYTES};
pub use translate::{Translated, Translator};
