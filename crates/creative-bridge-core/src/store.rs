use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::creative::{ProcessedCreative, UploadRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Creative already stored: {0}")]
    Duplicate(String),
    #[error("Creative not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed persistence for processed creatives.
///
/// `list` returns newest first by `created_at`; creatives saved within the
/// same instant come back newest-saved first.
#[async_trait]
pub trait CreativeStore: Send + Sync {
    async fn save(&self, creative: &ProcessedCreative) -> Result<(), StoreError>;
    async fn find(&self, creative_id: &str) -> Result<Option<ProcessedCreative>, StoreError>;
    async fn list(&self, offset: usize, limit: usize)
        -> Result<Vec<ProcessedCreative>, StoreError>;
    /// Returns whether a creative was removed.
    async fn delete(&self, creative_id: &str) -> Result<bool, StoreError>;
    async fn record_upload(
        &self,
        creative_id: &str,
        upload: UploadRecord,
    ) -> Result<ProcessedCreative, StoreError>;
}

struct Entry {
    seq: u64,
    creative: ProcessedCreative,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    entries: HashMap<String, Entry>,
}

#[derive(Default)]
pub struct InMemoryCreativeStore {
    inner: Mutex<Inner>,
}

impl InMemoryCreativeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("creative store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CreativeStore for InMemoryCreativeStore {
    async fn save(&self, creative: &ProcessedCreative) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.entries.contains_key(&creative.creative_id) {
            return Err(StoreError::Duplicate(creative.creative_id.clone()));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            creative.creative_id.clone(),
            Entry {
                seq,
                creative: creative.clone(),
            },
        );
        Ok(())
    }

    async fn find(&self, creative_id: &str) -> Result<Option<ProcessedCreative>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.entries.get(creative_id).map(|e| e.creative.clone()))
    }

    async fn list(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ProcessedCreative>, StoreError> {
        let inner = self.lock()?;
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by(|a, b| {
            b.creative
                .created_at
                .cmp(&a.creative.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(entries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.creative.clone())
            .collect())
    }

    async fn delete(&self, creative_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        Ok(inner.entries.remove(creative_id).is_some())
    }

    async fn record_upload(
        &self,
        creative_id: &str,
        upload: UploadRecord,
    ) -> Result<ProcessedCreative, StoreError> {
        let mut inner = self.lock()?;
        let entry = inner
            .entries
            .get_mut(creative_id)
            .ok_or_else(|| StoreError::NotFound(creative_id.to_string()))?;
        entry.creative.updated_at = upload.uploaded_at;
        entry.creative.upload = Some(upload);
        Ok(entry.creative.clone())
    }
}
