//! Pinecone 인덱스 - 호스팅 벡터 인덱스 (REST)
//!
//! ref: https://docs.pinecone.io/reference/api/data-plane

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{IndexMatch, IndexRecord, RecordMetadata, VectorIndex};
use crate::config::Settings;

/// upsert 요청당 최대 벡터 수
const UPSERT_BATCH_SIZE: usize = 100;

/// Pinecone 인덱스 클라이언트
#[derive(Debug)]
pub struct PineconeIndex {
    api_key: String,
    base_url: Url,
    client: reqwest::Client,
}

impl PineconeIndex {
    /// 인덱스 호스트로 생성 (스킴이 없으면 https)
    pub fn new(api_key: String, host: &str) -> Result<Self> {
        let host = host.trim().trim_end_matches('/');
        let with_scheme = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        let base_url = Url::parse(&format!("{}/", with_scheme))
            .with_context(|| format!("Invalid Pinecone host: {}", host))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url,
            client,
        })
    }

    /// 설정에서 생성
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let pinecone = settings.require_pinecone()?;
        Self::new(pinecone.api_key.clone(), &pinecone.host)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid Pinecone endpoint: {}", path))
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send Pinecone {} request", path))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            anyhow::bail!("Pinecone API error ({}): {}", status, text);
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse Pinecone {} response", path))
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<WireVector<'a>>,
}

#[derive(Debug, Serialize)]
struct WireVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a RecordMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<RecordMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    total_vector_count: usize,
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        let mut upserted = 0;

        for chunk in records.chunks(UPSERT_BATCH_SIZE) {
            let request = UpsertRequest {
                vectors: chunk
                    .iter()
                    .map(|r| WireVector {
                        id: &r.id,
                        values: &r.vector,
                        metadata: &r.metadata,
                    })
                    .collect(),
            };

            let response: UpsertResponse = self.post("vectors/upsert", &request).await?;
            tracing::debug!("Pinecone upserted {} vectors", response.upserted_count);
            upserted += response.upserted_count;
        }

        Ok(upserted)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        if top_k == 0 {
            return Ok(vec![]);
        }

        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };
        let response: QueryResponse = self.post("query", &request).await?;

        Ok(into_matches(response))
    }

    async fn count(&self) -> Result<usize> {
        let stats: StatsResponse = self
            .post("describe_index_stats", &serde_json::json!({}))
            .await?;
        Ok(stats.total_vector_count)
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}

/// 메타데이터가 없는 매치는 버림
fn into_matches(response: QueryResponse) -> Vec<IndexMatch> {
    let matches = response
        .matches
        .into_iter()
        .filter_map(|m| {
            let metadata = m.metadata?;
            Some(IndexMatch {
                id: m.id,
                score: m.score,
                metadata,
            })
        })
        .collect();

    super::rank(matches, usize::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_normalization() {
        let index = PineconeIndex::new("key".to_string(), "kb-abc.svc.pinecone.io/").unwrap();
        assert_eq!(
            index.endpoint("query").unwrap().as_str(),
            "https://kb-abc.svc.pinecone.io/query"
        );

        let local = PineconeIndex::new("key".to_string(), "http://localhost:5080").unwrap();
        assert_eq!(
            local.endpoint("vectors/upsert").unwrap().as_str(),
            "http://localhost:5080/vectors/upsert"
        );
    }

    #[test]
    fn test_request_bodies() {
        let metadata = RecordMetadata {
            question: "Q".to_string(),
            answer: "A".to_string(),
            category_id: None,
        };
        let upsert = serde_json::to_value(UpsertRequest {
            vectors: vec![WireVector {
                id: "a_001",
                values: &[0.5, 0.25],
                metadata: &metadata,
            }],
        })
        .unwrap();
        assert_eq!(upsert["vectors"][0]["id"], "a_001");
        assert_eq!(upsert["vectors"][0]["metadata"]["answer"], "A");

        let query = serde_json::to_value(QueryRequest {
            vector: &[1.0],
            top_k: 3,
            include_metadata: true,
        })
        .unwrap();
        assert_eq!(query["topK"], 3);
        assert_eq!(query["includeMetadata"], true);
    }

    #[test]
    fn test_query_response_parsing() {
        let body = r#"{
            "matches": [
                {"id": "b_001", "score": 0.4, "metadata": {"question": "Q2", "answer": "A2"}},
                {"id": "a_001", "score": 0.9, "metadata": {"question": "Q1", "answer": "A1", "category_id": "a"}},
                {"id": "c_001", "score": 0.95}
            ],
            "namespace": ""
        }"#;
        let response: QueryResponse = serde_json::from_str(body).unwrap();
        let matches = into_matches(response);

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a_001");
        assert_eq!(matches[0].metadata.category_id.as_deref(), Some("a"));
        assert_eq!(matches[1].metadata.answer, "A2");
    }

    #[test]
    fn test_stats_parsing() {
        let stats: StatsResponse =
            serde_json::from_str(r#"{"dimension": 1536, "totalVectorCount": 42}"#).unwrap();
        assert_eq!(stats.total_vector_count, 42);
    }
}
