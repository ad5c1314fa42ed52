//! 메모리 벡터 인덱스
//!
//! 전체 레코드를 메모리에 두고 코사인 유사도로 완전 탐색합니다.

use std::path::Path;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::indexer::{load_embeddings, EmbeddingRecord};
use super::{cosine_similarity, rank, IndexMatch, IndexRecord, RecordMetadata, VectorIndex};

/// 메모리 벡터 인덱스
#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    records: RwLock<Vec<IndexRecord>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 임베딩 export 레코드로 생성
    pub fn from_embeddings(embeddings: Vec<EmbeddingRecord>) -> Self {
        let records = embeddings
            .into_iter()
            .map(|e| IndexRecord {
                id: e.id,
                vector: e.embedding,
                metadata: RecordMetadata {
                    question: e.question,
                    answer: e.answer,
                    category_id: None,
                },
            })
            .collect();

        Self {
            records: RwLock::new(records),
        }
    }

    /// 임베딩 export 파일에서 로드
    pub fn from_embeddings_file(path: &Path) -> Result<Self> {
        let embeddings = load_embeddings(path)?;
        tracing::info!("Loaded {} embeddings from {:?}", embeddings.len(), path);
        Ok(Self::from_embeddings(embeddings))
    }

    fn lock_poisoned() -> anyhow::Error {
        anyhow::anyhow!("Memory index lock poisoned")
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        let mut stored = self.records.write().map_err(|_| Self::lock_poisoned())?;

        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }

        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        let stored = self.records.read().map_err(|_| Self::lock_poisoned())?;

        let matches = stored
            .iter()
            .map(|r| IndexMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.vector),
                metadata: r.metadata.clone(),
            })
            .collect();

        Ok(rank(matches, top_k))
    }

    async fn count(&self) -> Result<usize> {
        let stored = self.records.read().map_err(|_| Self::lock_poisoned())?;
        Ok(stored.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================
