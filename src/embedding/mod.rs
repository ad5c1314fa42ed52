//! 임베딩 모듈 - OpenAI API를 통한 텍스트 벡터화
//!
//! QA 쌍과 사용자 질문을 같은 공간의 벡터로 변환합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OpenAIEmbedding::from_settings(&Settings::from_env())?;
//! let embedding = embedder.embed("How do I plan my week?").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::Settings;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// 호출 간 최소 딜레이
const MIN_DELAY_MS: u64 = 100;

/// 모델별 임베딩 차원
pub fn dimension_for_model(model: &str) -> Option<usize> {
    match model {
        "text-embedding-ada-002" | "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// 요청 간 최소 간격 유지
#[derive(Debug)]
struct Pacer {
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl Pacer {
    fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: None,
        }
    }

    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

/// OpenAI 임베딩 구현체
#[derive(Debug)]
pub struct OpenAIEmbedding {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
    pacer: Arc<Mutex<Pacer>>,
}

impl OpenAIEmbedding {
    /// 기본 모델(text-embedding-ada-002)로 생성
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_model(api_key, crate::config::DEFAULT_EMBEDDING_MODEL)
    }

    /// 모델을 지정하여 생성
    pub fn with_model(api_key: String, model: &str) -> Result<Self> {
        let dimension = dimension_for_model(model).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown embedding model: {}. Use text-embedding-ada-002, text-embedding-3-small or text-embedding-3-large",
                model
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url: crate::config::DEFAULT_OPENAI_BASE_URL.to_string(),
            model: model.to_string(),
            client,
            dimension,
            pacer: Arc::new(Mutex::new(Pacer::new(Duration::from_millis(MIN_DELAY_MS)))),
        })
    }

    /// API 기본 URL 변경 (OpenAI 호환 서버용)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 설정에서 생성
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_openai_key()?.to_string();
        let embedder = Self::with_model(api_key, &settings.embedding_model)?
            .with_base_url(settings.openai_base_url.clone());

        tracing::info!(
            "Using OpenAI embedding {} (dimension: {})",
            embedder.model,
            embedder.dimension
        );
        Ok(embedder)
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    /// 임베딩 API 호출 (입력 순서대로 반환)
    async fn request(&self, input: EmbedInput<'_>) -> Result<Vec<Vec<f32>>> {
        self.pacer.lock().await.acquire().await;

        let request = EmbedRequest {
            model: &self.model,
            input,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OpenAIError>(&body) {
                anyhow::bail!("OpenAI API error ({}): {}", status, error.error.message);
            }
            anyhow::bail!("OpenAI API error ({}): {}", status, body);
        }

        let mut parsed: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// 임베딩 API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: EmbedInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbedInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

/// 임베딩 API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// OpenAI API 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAIError {
    pub(crate) error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAIErrorDetail {
    pub(crate) message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let mut embeddings = self.request(EmbedInput::Single(text.trim())).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding response contained no data"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        // 빈 문자열은 API가 거부하므로 단건 경로로 처리
        if texts.iter().any(|t| t.trim().is_empty()) {
            let mut results = Vec::with_capacity(texts.len());
            for text in texts {
                results.push(self.embed(text).await?);
            }
            return Ok(results);
        }

        tracing::debug!("Embedding batch of {}", texts.len());
        let embeddings = self.request(EmbedInput::Batch(texts)).await?;
        if embeddings.len() != texts.len() {
            anyhow::bail!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            );
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
