//! 구조화 텍스트(.txt) 변환기
//!
//! PDF/문서에서 추출한 `.txt` 파일도 `## ` / `### Q:` / `**A:**` 규칙을
//! 따르지만, 답변은 구조가 없는 평문입니다. 답변 줄들을 공백으로 이어
//! `main_points` 한 항목으로 저장합니다.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::{CollectorConfig, FileCollector, SourceFormat};

use super::model::{qa_id, slugify, AnswerBlock, Category, KnowledgeBase, Metadata, QAPair};
use super::parser::{ANSWER_PREFIX, CATEGORY_PREFIX, QUESTION_PREFIX};

/// 폴더 변환 결과의 출처 라벨
pub const STRUCTURED_SOURCE: &str = "Extracted Documents (Structured)";

/// 문서 하나의 파싱 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredDocument {
    /// 등장 순서대로 (중복 가능, 폴더 병합 시 제거)
    pub categories: Vec<Category>,
    pub qa_pairs: Vec<QAPair>,
}

// ============================================================================
// Single Document
// ============================================================================

#[derive(Default)]
struct StructuredState {
    doc: StructuredDocument,
    counter: usize,
    category_id: Option<String>,
    question: Option<String>,
    answer_lines: Vec<String>,
}

impl StructuredState {
    fn flush(&mut self) {
        let question = self.question.take();
        let lines = std::mem::take(&mut self.answer_lines);

        let (Some(category_id), Some(question)) = (self.category_id.clone(), question) else {
            return;
        };
        let answer_text = lines.join(" ").trim().to_string();
        if question.is_empty() || answer_text.is_empty() {
            tracing::debug!("Skipping incomplete QA: {:?}", question);
            return;
        }

        self.counter += 1;
        self.doc.qa_pairs.push(QAPair {
            id: qa_id(&category_id, self.counter),
            category_id,
            question,
            answer: AnswerBlock::from_plain(&answer_text),
            source: None,
            is_emergency: false,
        });
    }
}

/// 구조화 텍스트 한 문서 파싱
pub fn parse_structured_text(text: &str) -> StructuredDocument {
    let mut state = StructuredState::default();

    for line in text.lines() {
        let line = line.trim();

        if let Some(title) = line.strip_prefix(CATEGORY_PREFIX) {
            state.flush();
            let title = title.trim();
            let id = slugify(title);
            state.doc.categories.push(Category::new(id.clone(), title));
            state.category_id = Some(id).filter(|id| !id.is_empty());
        } else if let Some(question) = line.strip_prefix(QUESTION_PREFIX) {
            state.flush();
            state.question = Some(question.trim().to_string());
        } else if let Some(answer) = line.strip_prefix(ANSWER_PREFIX) {
            if state.question.is_some() && !answer.trim().is_empty() {
                state.answer_lines.push(answer.trim().to_string());
            }
        } else if state.question.is_some() && !line.is_empty() {
            state.answer_lines.push(line.to_string());
        }
    }

    state.flush();
    state.doc.categories.retain(|c| !c.id.is_empty());
    state.doc
}

// ============================================================================
// Folder Conversion
// ============================================================================

/// 폴더 안의 `.txt` 파일들을 하나의 지식베이스로 변환
///
/// 하위 폴더는 보지 않으며, 파일 이름 순서로 처리합니다.
/// 카테고리는 id 기준으로 처음 것만 남깁니다.
pub fn convert_structured_folder(dir: &Path) -> Result<KnowledgeBase> {
    let collector = FileCollector::new(CollectorConfig {
        formats: vec![SourceFormat::StructuredText],
        ..Default::default()
    });
    let files = collector.collect_directory(dir)?;

    let mut kb = KnowledgeBase::new(Metadata::new(STRUCTURED_SOURCE));
    let mut seen: HashSet<String> = HashSet::new();

    for file in &files {
        let text = std::fs::read_to_string(&file.path)
            .with_context(|| format!("Failed to read {:?}", file.path))?;
        let doc = parse_structured_text(&text);

        tracing::info!(
            "Parsed {:?}: {} categories, {} QA pairs",
            file.path,
            doc.categories.len(),
            doc.qa_pairs.len()
        );

        for category in doc.categories {
            if seen.insert(category.id.clone()) {
                kb.categories.push(category);
            }
        }
        kb.qa_pairs.extend(doc.qa_pairs);
    }

    kb.refresh_counts();
    Ok(kb)
}

// ============================================================================
// Tests
// ============================================================================
