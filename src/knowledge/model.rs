//! 지식베이스 데이터 모델
//!
//! Markdown 변환 결과를 담는 구조체들입니다.
//! JSON 직렬화 시 `metadata` → `categories` → `qa_pairs` 순서를 유지합니다.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use super::error::KnowledgeError;

/// 기본 출처 라벨
pub const DEFAULT_SOURCE: &str = "University Knowledge Base";
/// 기본 버전
pub const DEFAULT_VERSION: &str = "1.0";
/// 기본 언어 태그
pub const DEFAULT_LANGUAGE: &str = "en";

// ============================================================================
// Metadata
// ============================================================================

/// 지식베이스 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// 생성일 (YYYY-MM-DD)
    pub last_updated: String,
    pub version: String,
    pub language: String,
    pub source: String,
    /// 카테고리 수 (= categories.len())
    pub topics_count: usize,
    /// QA 쌍 수 (= qa_pairs.len())
    pub qa_pairs_count: usize,
}

impl Metadata {
    /// 오늘 날짜로 메타데이터 생성
    pub fn new(source: impl Into<String>) -> Self {
        Self::dated(source, Local::now().date_naive())
    }

    /// 지정 날짜로 메타데이터 생성
    pub fn dated(source: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            last_updated: date.format("%Y-%m-%d").to_string(),
            version: DEFAULT_VERSION.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            source: source.into(),
            topics_count: 0,
            qa_pairs_count: 0,
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE)
    }
}

// ============================================================================
// Category / QAPair / AnswerBlock
// ============================================================================

/// 카테고리 (`## ` 헤딩 하나)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// 제목에서 만든 slug
    pub id: String,
    /// 원본 헤딩 텍스트
    pub title: String,
    /// 예약 필드 (항상 비어있음)
    #[serde(default)]
    pub subcategories: Vec<String>,
}

impl Category {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subcategories: Vec::new(),
        }
    }
}

/// 구조화된 답변
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerBlock {
    #[serde(default)]
    pub main_points: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub related_topics: Vec<String>,
}

impl AnswerBlock {
    /// 평문 답변을 main_points 하나로 감싸기
    pub fn from_plain(text: &str) -> Self {
        let mut block = Self {
            main_points: vec![text.trim().to_string()],
            ..Default::default()
        };
        block.drop_blank_entries();
        block
    }

    /// 모든 필드가 비어있는지
    pub fn is_empty(&self) -> bool {
        self.main_points.is_empty()
            && self.examples.is_empty()
            && self.tips.is_empty()
            && self.related_topics.is_empty()
    }

    /// 모든 필드를 main_points, tips, examples, related_topics 순으로 이은 텍스트 (인덱싱용)
    pub fn full_text(&self) -> String {
        self.main_points
            .iter()
            .chain(&self.tips)
            .chain(&self.examples)
            .chain(&self.related_topics)
            .map(|entry| entry.trim())
            .filter(|entry| !entry.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 빈 문자열/공백 항목 제거
    pub(crate) fn drop_blank_entries(&mut self) {
        for field in [
            &mut self.main_points,
            &mut self.examples,
            &mut self.tips,
            &mut self.related_topics,
        ] {
            field.retain(|entry| !entry.trim().is_empty());
        }
    }
}

/// 예전 파일은 answer를 문자열로 저장했음
#[derive(Deserialize)]
#[serde(untagged)]
enum AnswerRepr {
    Block(AnswerBlock),
    Text(String),
}

fn deserialize_answer<'de, D>(deserializer: D) -> Result<AnswerBlock, D::Error>
where
    D: Deserializer<'de>,
{
    let block = match AnswerRepr::deserialize(deserializer)? {
        AnswerRepr::Block(mut block) => {
            block.drop_blank_entries();
            block
        }
        AnswerRepr::Text(text) => AnswerBlock::from_plain(&text),
    };
    Ok(block)
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// 질문/답변 쌍
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QAPair {
    /// `{category_id}_{NNN}`
    pub id: String,
    pub category_id: String,
    pub question: String,
    #[serde(deserialize_with = "deserialize_answer")]
    pub answer: AnswerBlock,
    /// 병합 시 붙는 출처 태그 ("existing" / "extracted")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_emergency: bool,
}

// ============================================================================
// KnowledgeBase
// ============================================================================

/// 지식베이스 루트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub metadata: Metadata,
    pub categories: Vec<Category>,
    pub qa_pairs: Vec<QAPair>,
}

impl KnowledgeBase {
    /// 빈 지식베이스 생성
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            categories: Vec::new(),
            qa_pairs: Vec::new(),
        }
    }

    /// id로 카테고리 조회
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// 카테고리 존재 여부
    pub fn has_category(&self, id: &str) -> bool {
        self.category(id).is_some()
    }

    /// 새 id일 때만 카테고리 추가. 추가됐으면 true
    pub fn add_category(&mut self, category: Category) -> bool {
        if self.has_category(&category.id) {
            return false;
        }
        self.categories.push(category);
        true
    }

    /// 메타데이터 카운트 재계산
    pub fn refresh_counts(&mut self) {
        self.metadata.topics_count = self.categories.len();
        self.metadata.qa_pairs_count = self.qa_pairs.len();
    }

    /// JSON 파일에서 로드
    ///
    /// `categories`, `qa_pairs` 섹션이 없으면 에러입니다.
    pub fn load(path: &Path) -> Result<Self, KnowledgeError> {
        let text = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }

    /// JSON 문자열 파싱 (`origin`은 에러 메시지용)
    pub fn from_json(text: &str, origin: &Path) -> Result<Self, KnowledgeError> {
        let invalid = |source| KnowledgeError::InvalidJson {
            path: origin.to_path_buf(),
            source,
        };

        let value: serde_json::Value = serde_json::from_str(text).map_err(invalid)?;
        for section in ["categories", "qa_pairs"] {
            if value.get(section).is_none() {
                return Err(KnowledgeError::MissingSection {
                    path: origin.to_path_buf(),
                    section,
                });
            }
        }

        serde_json::from_value(value).map_err(invalid)
    }

    /// 들여쓰기된 JSON 문자열
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// JSON 파일로 저장
    pub fn save(&self, path: &Path) -> Result<(), KnowledgeError> {
        let json = self.to_json_pretty().map_err(|source| KnowledgeError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| KnowledgeError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ============================================================================
// Id Helpers
// ============================================================================

/// 제목을 slug로 변환
///
/// 소문자화 → 영숫자 이외 연속 구간을 `_` 하나로 → 앞뒤 `_` 제거
pub fn slugify(title: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));

    let lowered = title.trim().to_lowercase();
    re.replace_all(&lowered, "_").trim_matches('_').to_string()
}

/// QA id 생성 (`{category_id}_{NNN}`)
pub fn qa_id(category_id: &str, counter: usize) -> String {
    format!("{}_{:03}", category_id, counter)
}

// ============================================================================
// Tests
// ============================================================================
