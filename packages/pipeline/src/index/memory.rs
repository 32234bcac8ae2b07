//! In-memory search index for tests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::SearchIndex;

#[derive(Default)]
pub struct MemoryIndex {
    documents: Mutex<HashMap<String, Value>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn get_document(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.documents.lock().await.get(id).cloned())
    }

    async fn put_document(&self, id: &str, document: &Value) -> Result<()> {
        self.documents
            .lock()
            .await
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.documents.lock().await.len() as u64)
    }
}
