//! Index 모듈 - QA 쌍 벡터 인덱스
//!
//! - Memory: 메모리 내 코사인 유사도 검색 (임베딩 export 파일에서 로드)
//! - Lance: 로컬 LanceDB 테이블
//! - Pinecone: 호스팅 인덱스 (REST)
//! - Indexer: QA 쌍 → 인덱스 레코드

mod indexer;
mod lance;
mod memory;
mod pinecone;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Settings;

// Re-exports
pub use indexer::{
    export_embeddings, indexed_text, load_embeddings, save_embeddings, EmbeddingRecord,
    IndexReport, Indexer,
};
pub use lance::LanceVectorIndex;
pub use memory::MemoryVectorIndex;
pub use pinecone::PineconeIndex;

/// 로컬 LanceDB 디렉토리 이름 (데이터 디렉토리 기준)
pub const LANCE_DIR_NAME: &str = "knowledge.lance";

// ============================================================================
// Types
// ============================================================================

/// 레코드에 함께 저장하는 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

/// 인덱스 저장 단위
#[derive(Debug, Clone)]
pub struct IndexRecord {
    /// QA id
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    /// 유사도 (클수록 가까움)
    pub score: f32,
    pub metadata: RecordMetadata,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// VectorIndex 트레이트 (async)
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 레코드 삽입 (같은 id는 교체)
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize>;

    /// 유사도 내림차순 top_k 검색
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>>;

    /// 레코드 개수
    async fn count(&self) -> Result<usize>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Backend Selection
// ============================================================================

/// 인덱스 백엔드
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBackend {
    /// 로컬 LanceDB (기본)
    Lance,
    /// Pinecone 호스팅 인덱스
    Pinecone,
    /// 임베딩 export 파일을 메모리로 로드
    Memory { embeddings: std::path::PathBuf },
}

/// 백엔드에 맞는 인덱스 열기
pub async fn open_index(
    backend: &IndexBackend,
    settings: &Settings,
    dimension: usize,
) -> Result<Box<dyn VectorIndex>> {
    let index: Box<dyn VectorIndex> = match backend {
        IndexBackend::Lance => {
            let path = settings.data_dir.join(LANCE_DIR_NAME);
            Box::new(LanceVectorIndex::open(&path, dimension).await?)
        }
        IndexBackend::Pinecone => Box::new(PineconeIndex::from_settings(settings)?),
        IndexBackend::Memory { embeddings } => {
            Box::new(MemoryVectorIndex::from_embeddings_file(Path::new(embeddings))?)
        }
    };

    tracing::info!("Opened {} index", index.name());
    Ok(index)
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 점수 내림차순 정렬 후 top_k 자르기
pub(crate) fn rank(mut matches: Vec<IndexMatch>, top_k: usize) -> Vec<IndexMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(top_k);
    matches
}

// ============================================================================
// Tests
// ============================================================================
