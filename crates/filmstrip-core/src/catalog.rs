//! The catalog seam.
//!
//! The persistent catalog lives outside this crate. The pipeline only needs
//! a small per-file record of user decisions, which wins over values read
//! from the file whenever it exists.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::decode::Orientation;
use crate::identity::FileIdentity;
use crate::metadata::{ColorLabel, FlagStatus};

/// User decisions stored by the catalog for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub rating: Option<u8>,
    pub color_label: Option<ColorLabel>,
    pub favorite: Option<bool>,
    pub flag_status: Option<FlagStatus>,
    /// Manual rotation chosen by the user.
    pub orientation: Option<Orientation>,
}

impl CatalogRecord {
    /// Merge `update` into this record; `None` fields leave values untouched.
    pub fn apply(&mut self, update: &LabelUpdate) {
        if let Some(rating) = update.rating {
            self.rating = Some(rating.min(5));
        }
        if let Some(label) = update.color_label {
            self.color_label = label;
        }
        if let Some(favorite) = update.favorite {
            self.favorite = Some(favorite);
        }
        if let Some(flag) = update.flag_status {
            self.flag_status = Some(flag);
        }
    }
}

/// A change to rating or labels.
///
/// `color_label: Some(None)` clears the label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelUpdate {
    pub rating: Option<u8>,
    pub color_label: Option<Option<ColorLabel>>,
    pub favorite: Option<bool>,
    pub flag_status: Option<FlagStatus>,
}

impl LabelUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-file record store owned by the host application.
pub trait Catalog: Send + Sync {
    fn record(&self, identity: &FileIdentity) -> Option<CatalogRecord>;

    fn store(&self, identity: &FileIdentity, record: CatalogRecord);
}

/// A catalog kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: RwLock<HashMap<PathBuf, CatalogRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Catalog for InMemoryCatalog {
    fn record(&self, identity: &FileIdentity) -> Option<CatalogRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity.path())
            .copied()
    }

    fn store(&self, identity: &FileIdentity, record: CatalogRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.path().to_path_buf(), record);
    }
}
