//! 인덱서 - QA 쌍을 임베딩해 인덱스 레코드로 변환
//!
//! 인덱싱 텍스트는 `"Q: {question}\nA: {answer}"` 형식이고,
//! answer는 main_points, tips, examples, related_topics를 공백으로 이어붙인 문자열입니다.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{IndexRecord, RecordMetadata, VectorIndex};
use crate::embedding::EmbeddingProvider;
use crate::knowledge::QAPair;

/// 임베딩 배치 크기
const DEFAULT_BATCH_SIZE: usize = 16;

// ============================================================================
// Embeddings Export
// ============================================================================

/// 임베딩 export 파일의 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub embedding: Vec<f32>,
}

/// 임베딩 export 파일 저장 (pretty JSON 배열)
pub fn save_embeddings(path: &Path, records: &[EmbeddingRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
    }

    let json = serde_json::to_string_pretty(records).context("Failed to serialize embeddings")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write: {:?}", path))
}

/// 임베딩 export 파일 로드
pub fn load_embeddings(path: &Path) -> Result<Vec<EmbeddingRecord>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid embeddings file: {:?}", path))
}

// ============================================================================
// Indexer
// ============================================================================

/// 인덱싱 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
}

/// 임베딩 대상이 되는 QA 쌍
struct Prepared<'a> {
    qa: &'a QAPair,
    question: String,
    answer: String,
    text: String,
}

/// QA 쌍의 인덱싱 텍스트 (질문이나 답변이 비면 None)
pub fn indexed_text(qa: &QAPair) -> Option<String> {
    prepare(qa).map(|p| p.text)
}

fn prepare(qa: &QAPair) -> Option<Prepared<'_>> {
    let question = qa.question.trim().to_string();
    let answer = qa.answer.full_text();

    if question.is_empty() || answer.is_empty() {
        return None;
    }

    let text = format!("Q: {}\nA: {}", question, answer);
    Some(Prepared {
        qa,
        question,
        answer,
        text,
    })
}

/// 빈 QA 쌍을 걸러내고 남은 것과 건너뛴 개수를 반환
///
/// 같은 id가 여러 번 나오면 마지막 것만 남기고 나머지는 건너뛴 것으로 셉니다.
fn prepare_all(pairs: &[QAPair]) -> (Vec<Prepared<'_>>, usize) {
    let mut prepared: Vec<Prepared<'_>> = Vec::with_capacity(pairs.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut skipped = 0;

    for qa in pairs {
        let Some(p) = prepare(qa) else {
            tracing::warn!("Skipping {} due to missing text", qa.id);
            skipped += 1;
            continue;
        };

        match positions.get(qa.id.as_str()) {
            Some(&pos) => {
                tracing::warn!("Duplicate id {}, keeping the later QA pair", qa.id);
                prepared[pos] = p;
                skipped += 1;
            }
            None => {
                positions.insert(qa.id.as_str(), prepared.len());
                prepared.push(p);
            }
        }
    }

    (prepared, skipped)
}

/// 인덱서
pub struct Indexer<'a> {
    embedder: &'a dyn EmbeddingProvider,
    batch_size: usize,
}

impl<'a> Indexer<'a> {
    pub fn new(embedder: &'a dyn EmbeddingProvider) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// 배치 크기 변경 (최소 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// QA 쌍 임베딩 → 인덱스 레코드
    pub async fn build_records(&self, pairs: &[QAPair]) -> Result<(Vec<IndexRecord>, usize)> {
        let (prepared, skipped) = prepare_all(pairs);
        let mut records = Vec::with_capacity(prepared.len());

        for chunk in prepared.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|p| p.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .context("Failed to embed QA pairs")?;

            for (p, vector) in chunk.iter().zip(vectors) {
                records.push(IndexRecord {
                    id: p.qa.id.clone(),
                    vector,
                    metadata: RecordMetadata {
                        question: p.question.clone(),
                        answer: p.answer.clone(),
                        category_id: Some(p.qa.category_id.clone()),
                    },
                });
            }

            tracing::info!("Embedded {}/{} QA pairs", records.len(), prepared.len());
        }

        Ok((records, skipped))
    }

    /// QA 쌍을 인덱스에 upsert
    pub async fn index_pairs(&self, index: &dyn VectorIndex, pairs: &[QAPair]) -> Result<IndexReport> {
        let (records, skipped) = self.build_records(pairs).await?;

        let mut indexed = 0;
        for chunk in records.chunks(self.batch_size) {
            indexed += index.upsert(chunk).await?;
        }

        tracing::info!(
            "Indexed {} QA pairs into {} ({} skipped)",
            indexed,
            index.name(),
            skipped
        );
        Ok(IndexReport { indexed, skipped })
    }
}

/// QA 쌍 임베딩 export 레코드 생성
pub async fn export_embeddings(
    embedder: &dyn EmbeddingProvider,
    pairs: &[QAPair],
) -> Result<Vec<EmbeddingRecord>> {
    let (records, _) = Indexer::new(embedder).build_records(pairs).await?;

    Ok(records
        .into_iter()
        .map(|r| EmbeddingRecord {
            id: r.id,
            question: r.metadata.question,
            answer: r.metadata.answer,
            embedding: r.vector,
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
