use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum KnowledgeKind {
    File,
    Url,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub tenant_id: String,
    pub kind: KnowledgeKind,
    pub name: String,
    pub provider_document_id: String,
}
