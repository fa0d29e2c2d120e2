use crate::model::{KnowledgeItem, Tool, Voice};
use crate::storage::Storage;
use crate::{Result, RuntimeError};
use dashmap::DashMap;
use std::sync::Arc;

/// Shared registry shape for the three read-mostly catalogs an agent
/// snapshot is resolved against: tools, knowledge items, voices.
macro_rules! catalog_repo {
    ($name:ident, $item:ty, $prefix:expr) => {
        pub struct $name {
            storage: Arc<Storage>,
            items: DashMap<String, $item>,
        }

        impl $name {
            pub fn load(storage: Arc<Storage>) -> Result<Self> {
                let existing: Vec<$item> = storage.scan_prefix($prefix)?;
                let items = DashMap::new();
                for i in existing {
                    items.insert(i.id.clone(), i);
                }
                Ok(Self { storage, items })
            }

            fn key(id: &str) -> String {
                format!("{}{}", $prefix, id)
            }

            pub fn upsert(&self, item: $item) -> Result<()> {
                self.storage.put(Self::key(&item.id), &item)?;
                self.items.insert(item.id.clone(), item);
                Ok(())
            }

            pub fn get(&self, id: &str) -> Result<$item> {
                self.items
                    .get(id)
                    .map(|i| i.clone())
                    .ok_or_else(|| RuntimeError::NotFound(format!("{} {}", $prefix, id)))
            }

            pub fn get_many(&self, ids: &[String]) -> Result<Vec<$item>> {
                ids.iter().map(|id| self.get(id)).collect()
            }
        }
    };
}

catalog_repo!(ToolRepo, Tool, "tool:");
catalog_repo!(KnowledgeRepo, KnowledgeItem, "knowledge:");
catalog_repo!(VoiceRepo, Voice, "voice:");
