//! In-memory [`Persister`] used by tests and library callers that do not need
//! a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use importkit_shared::{ElementId, PersistError, Persister, Target};
use tokio::sync::Mutex;

/// Keeps every saved target, in save order, per element.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<BTreeMap<ElementId, Vec<Target>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All targets saved for `element`, oldest first.
    pub async fn targets(&self, element: &ElementId) -> Vec<Target> {
        self.saved
            .lock()
            .await
            .get(element)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of saves across all elements.
    pub async fn save_count(&self) -> usize {
        self.saved.lock().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl Persister for MemoryStore {
    async fn save(&self, element: &ElementId, target: &Target) -> Result<(), PersistError> {
        self.saved
            .lock()
            .await
            .entry(element.clone())
            .or_default()
            .push(target.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn keeps_saves_in_order() {
        let store = MemoryStore::new();
        let id = ElementId::from("p-1");
        let mut first = Target::new();
        first.set("n", json!(1), None);
        let mut second = Target::new();
        second.set("n", json!(2), None);

        store.save(&id, &first).await.unwrap();
        store.save(&id, &second).await.unwrap();

        assert_eq!(store.targets(&id).await, vec![first, second]);
        assert_eq!(store.save_count().await, 2);
        assert!(store.targets(&ElementId::from("other")).await.is_empty());
    }
}
