//! Sled-based storage for press releases.

use crate::press_release::{DraftInput, Drafted, PrContent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("press release not found: {0}")]
    NotFound(u64),
}

/// Publishing status of a stored press release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Pending,
    Published,
    Archived,
}

/// Data needed to store a freshly generated draft
#[derive(Debug, Clone)]
pub struct NewPressRelease {
    pub company_name: String,
    pub contact_email: String,
    pub target_audience: String,
    pub content: PrContent,
    /// Generation attempt that produced the content
    pub attempts: u32,
}

impl NewPressRelease {
    pub fn from_draft(input: DraftInput, drafted: Drafted<PrContent>) -> Self {
        Self {
            company_name: input.company_name,
            contact_email: input.contact_email,
            target_audience: input.target_audience,
            content: drafted.value,
            attempts: drafted.attempts,
        }
    }
}

/// A stored press release with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPressRelease {
    pub id: u64,
    pub slug: String,
    pub status: Status,
    pub company_name: String,
    pub contact_email: String,
    pub target_audience: String,
    #[serde(flatten)]
    pub content: PrContent,
    pub ai_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of a listing, newest first
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub total: usize,
    pub items: Vec<StoredPressRelease>,
    pub skip: usize,
    pub limit: usize,
}

/// Sled-based storage for press releases.
///
/// Records are keyed by big-endian id, so key order is insertion order.
#[derive(Clone)]
pub struct Storage {
    db: sled::Db,
}

impl Storage {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Store a generated draft and return the record
    pub fn insert(&self, new: NewPressRelease) -> Result<StoredPressRelease, StorageError> {
        let id = self.db.generate_id()?;
        let now = Utc::now();
        let stored = StoredPressRelease {
            id,
            slug: slugify(&new.content.headline, id),
            status: Status::Draft,
            company_name: new.company_name,
            contact_email: new.contact_email,
            target_audience: new.target_audience,
            content: new.content,
            ai_attempts: new.attempts,
            created_at: now,
            updated_at: now,
        };
        self.write(&stored)?;
        Ok(stored)
    }

    /// Retrieve a press release by id
    pub fn get(&self, id: u64) -> Result<Option<StoredPressRelease>, StorageError> {
        match self.db.get(id.to_be_bytes())? {
            Some(data) => {
                let stored: StoredPressRelease = serde_json::from_slice(&data)?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    /// List press releases newest first
    pub fn list(&self, skip: usize, limit: usize) -> Result<Page, StorageError> {
        let mut items = Vec::new();
        for item in self.db.iter().rev().skip(skip).take(limit) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(Page {
            total: self.count(),
            items,
            skip,
            limit,
        })
    }

    /// Move a press release to a new status
    pub fn set_status(&self, id: u64, status: Status) -> Result<StoredPressRelease, StorageError> {
        let mut stored = self.get(id)?.ok_or(StorageError::NotFound(id))?;
        stored.status = status;
        stored.updated_at = Utc::now();
        self.write(&stored)?;
        Ok(stored)
    }

    /// Get the number of stored press releases
    pub fn count(&self) -> usize {
        self.db.len()
    }

    fn write(&self, stored: &StoredPressRelease) -> Result<(), StorageError> {
        let value = serde_json::to_vec(stored)?;
        self.db.insert(stored.id.to_be_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }
}

/// URL slug from a headline, suffixed with the id to keep it unique
fn slugify(headline: &str, id: u64) -> String {
    let words: Vec<String> = headline
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(12)
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        format!("press-release-{id}")
    } else {
        format!("{}-{id}", words.join("-"))
    }
}
