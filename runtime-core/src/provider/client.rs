use super::types::{
    ConversationDetail, ConversationListResponse, KnowledgePassage, KnowledgeRetrievalRequest,
    KnowledgeRetrievalResponse, SignedUrlResponse,
};
use crate::{Result, RuntimeError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Outbound contract with the realtime-voice provider (§6 "Provider — ..."):
/// signed-URL preflight, post-call conversation listing/detail, and audio
/// download. Abstracted behind a trait so C3/C4/C6 tests run against
/// `mockall`-generated mocks without reaching the network.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn get_signed_url(&self, provider_agent_id: &str) -> Result<String>;

    async fn list_conversations(
        &self,
        provider_agent_id: &str,
        after_unix: i64,
        before_unix: i64,
    ) -> Result<Vec<super::types::ConversationSummary>>;

    async fn get_conversation_detail(&self, conversation_id: &str) -> Result<ConversationDetail>;

    async fn fetch_audio(&self, conversation_id: &str) -> Result<Vec<u8>>;

    /// Forwards a knowledge-base query to the provider, scoped to the given
    /// provider document ids (§4.5 #3 `retrieve_from_knowledge`).
    async fn retrieve_knowledge(
        &self,
        query: &str,
        document_ids: &[String],
    ) -> Result<Vec<KnowledgePassage>>;
}

#[derive(Debug, Clone)]
pub struct ProviderClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub signed_url_timeout: Duration,
    pub request_timeout: Duration,
}

pub struct HttpProviderClient {
    http: Client,
    cfg: ProviderClientConfig,
}

impl HttpProviderClient {
    pub fn new(cfg: ProviderClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(RuntimeError::Http)?;
        Ok(Self { http, cfg })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn get_signed_url(&self, provider_agent_id: &str) -> Result<String> {
        let resp = self
            .http
            .get(self.url("v1/convai/conversation/get-signed-url"))
            .query(&[("agent_id", provider_agent_id)])
            .header("xi-api-key", &self.cfg.api_key)
            .timeout(self.cfg.signed_url_timeout)
            .send()
            .await
            .map_err(|e| RuntimeError::ProviderUnreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RuntimeError::ProviderUnreachable(format!(
                "signed-url request failed with status {}",
                resp.status()
            )));
        }
        let body: SignedUrlResponse = resp.json().await.map_err(RuntimeError::Http)?;
        Ok(body.signed_url)
    }

    async fn list_conversations(
        &self,
        provider_agent_id: &str,
        after_unix: i64,
        before_unix: i64,
    ) -> Result<Vec<super::types::ConversationSummary>> {
        let resp = self
            .http
            .get(self.url("v1/convai/conversations"))
            .query(&[
                ("agent_id", provider_agent_id.to_string()),
                ("call_start_after_unix", after_unix.to_string()),
                ("call_start_before_unix", before_unix.to_string()),
            ])
            .header("xi-api-key", &self.cfg.api_key)
            .send()
            .await
            .map_err(|e| RuntimeError::ProviderUnreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RuntimeError::ProviderProtocol(format!(
                "list conversations failed with status {}",
                resp.status()
            )));
        }
        let body: ConversationListResponse = resp.json().await.map_err(RuntimeError::Http)?;
        Ok(body.conversations)
    }

    async fn get_conversation_detail(&self, conversation_id: &str) -> Result<ConversationDetail> {
        let resp = self
            .http
            .get(self.url(&format!("v1/convai/conversations/{conversation_id}")))
            .header("xi-api-key", &self.cfg.api_key)
            .send()
            .await
            .map_err(|e| RuntimeError::ProviderUnreachable(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RuntimeError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }
        if !resp.status().is_success() {
            return Err(RuntimeError::ProviderProtocol(format!(
                "conversation detail failed with status {}",
                resp.status()
            )));
        }
        debug!(conversation_id, "fetched conversation detail");
        resp.json().await.map_err(RuntimeError::Http)
    }

    async fn fetch_audio(&self, conversation_id: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(self.url(&format!("v1/convai/conversations/{conversation_id}/audio")))
            .header("xi-api-key", &self.cfg.api_key)
            .send()
            .await
            .map_err(|e| RuntimeError::ProviderUnreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RuntimeError::ProviderProtocol(format!(
                "audio fetch failed with status {}",
                resp.status()
            )));
        }
        let bytes = resp.bytes().await.map_err(RuntimeError::Http)?;
        Ok(bytes.to_vec())
    }

    async fn retrieve_knowledge(
        &self,
        query: &str,
        document_ids: &[String],
    ) -> Result<Vec<KnowledgePassage>> {
        let resp = self
            .http
            .post(self.url("v1/convai/knowledge-base/retrieve"))
            .header("xi-api-key", &self.cfg.api_key)
            .json(&KnowledgeRetrievalRequest {
                query: query.to_string(),
                document_ids: document_ids.to_vec(),
            })
            .send()
            .await
            .map_err(|e| RuntimeError::ProviderUnreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RuntimeError::ProviderProtocol(format!(
                "knowledge retrieval failed with status {}",
                resp.status()
            )));
        }
        let body: KnowledgeRetrievalResponse = resp.json().await.map_err(RuntimeError::Http)?;
        Ok(body.passages)
    }
}
