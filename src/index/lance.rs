//! LanceDB 벡터 인덱스 - 로컬 ANN 검색
//!
//! QA 쌍 임베딩을 데이터 디렉토리의 `.lance` 테이블에 저장합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::{rank, IndexMatch, IndexRecord, RecordMetadata, VectorIndex};

/// 테이블 이름
const TABLE_NAME: &str = "qa_pairs";

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 벡터 인덱스 구현
pub struct LanceVectorIndex {
    db: Connection,
    dimension: i32,
}

impl LanceVectorIndex {
    /// LanceDB 인덱스 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db, dimension })
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("question", DataType::Utf8, false),
            Field::new("answer", DataType::Utf8, false),
            Field::new("category_id", DataType::Utf8, true),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(&self, records: &[IndexRecord]) -> Result<RecordBatch> {
        if records.is_empty() {
            anyhow::bail!("Cannot create batch from empty records");
        }

        if let Some(bad) = records
            .iter()
            .find(|r| r.vector.len() != self.dimension as usize)
        {
            anyhow::bail!(
                "Vector for {} has dimension {}, expected {}",
                bad.id,
                bad.vector.len(),
                self.dimension
            );
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let questions: Vec<&str> = records.iter().map(|r| r.metadata.question.as_str()).collect();
        let answers: Vec<&str> = records.iter().map(|r| r.metadata.answer.as_str()).collect();
        let categories: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.metadata.category_id.as_deref())
            .collect();

        let flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect();

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(Float32Array::from(flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(questions)),
                Arc::new(StringArray::from(answers)),
                Arc::new(StringArray::from(categories)),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table")
    }
}

/// `id IN (...)` 필터 (작은따옴표 이스케이프)
fn id_filter(records: &[IndexRecord]) -> String {
    let quoted: Vec<String> = records
        .iter()
        .map(|r| format!("'{}'", r.id.replace('\'', "''")))
        .collect();
    format!("id IN ({})", quoted.join(", "))
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.open_table().await?;

            table
                .delete(&id_filter(records))
                .await
                .context("Failed to delete existing vectors")?;

            table
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        tracing::debug!("Upserted {} vectors into LanceDB", records.len());
        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        if top_k == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        let results = table
            .vector_search(vector.to_vec())
            .context("Failed to create vector search")?
            .limit(top_k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        use futures::TryStreamExt;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut matches = Vec::new();
        for batch in batches {
            let column = |name: &str| {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                    .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
            };
            let ids = column("id")?;
            let questions = column("question")?;
            let answers = column("answer")?;
            let categories = column("category_id")?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let category_id = if categories.is_null(i) {
                    None
                } else {
                    Some(categories.value(i).to_string())
                };

                matches.push(IndexMatch {
                    id: ids.value(i).to_string(),
                    // L2 거리 -> 유사도
                    score: 1.0 / (1.0 + distances.value(i)),
                    metadata: RecordMetadata {
                        question: questions.value(i).to_string(),
                        answer: answers.value(i).to_string(),
                        category_id,
                    },
                });
            }
        }

        Ok(rank(matches, top_k))
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        table.count_rows(None).await.context("Failed to count rows")
    }

    fn name(&self) -> &str {
        "lance"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn record(id: &str, vector: [f32; DIM], answer: &str) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            vector: vector.to_vec(),
            metadata: RecordMetadata {
                question: format!("Question {}", id),
                answer: answer.to_string(),
                category_id: if id.starts_with("sleep") {
                    Some("sleep".to_string())
                } else {
                    None
                },
            },
        }
    }

    #[test]
    fn test_id_filter_escapes_quotes() {
        let filter = id_filter(&[
            record("a_001", [0.0; DIM], "x"),
            record("o'brien_001", [0.0; DIM], "y"),
        ]);
        assert_eq!(filter, "id IN ('a_001', 'o''brien_001')");
    }

    #[tokio::test]
    async fn test_lance_upsert_and_count() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("kb.lance"), DIM)
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 0);

        let inserted = index
            .upsert(&[
                record("sleep_001", [1.0, 0.0, 0.0, 0.0], "Keep a routine"),
                record("stress_001", [0.0, 1.0, 0.0, 0.0], "Take breaks"),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(index.count().await.unwrap(), 2);

        // 같은 id 재삽입은 교체
        index
            .upsert(&[record("sleep_001", [0.0, 0.0, 1.0, 0.0], "Updated")])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lance_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("query.lance"), DIM)
            .await
            .unwrap();

        index
            .upsert(&[
                record("sleep_001", [1.0, 0.0, 0.0, 0.0], "Keep a routine"),
                record("stress_001", [0.0, 1.0, 0.0, 0.0], "Take breaks"),
                record("exam_001", [0.0, 0.0, 1.0, 0.0], "Start early"),
            ])
            .await
            .unwrap();

        let results = index.query(&[1.0, 0.0, 0.0, 0.0], 2).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        assert_eq!(results[0].id, "sleep_001");
        assert_eq!(results[0].metadata.answer, "Keep a routine");
        assert_eq!(results[0].metadata.category_id.as_deref(), Some("sleep"));
    }

    #[tokio::test]
    async fn test_lance_rejects_wrong_dimension() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("dim.lance"), DIM)
            .await
            .unwrap();

        let mut bad = record("a_001", [0.0; DIM], "x");
        bad.vector.push(1.0);
        assert!(index.upsert(&[bad]).await.is_err());
    }
}
