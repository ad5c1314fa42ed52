//! 지식베이스 병합
//!
//! 기존 지식베이스에 추출 문서 지식베이스를 덧붙입니다.
//! 병합하면서 QA 쌍마다 출처 태그와 긴급 플래그를 붙입니다.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};

use super::model::{qa_id, KnowledgeBase, QAPair};

/// 긴급 상황을 나타내는 키워드 (소문자)
pub const EMERGENCY_KEYWORDS: [&str; 4] = ["i need help now", "emergency", "urgent", "crisis"];

/// 기존 지식베이스 출처 태그
pub const SOURCE_EXISTING: &str = "existing";
/// 추출 문서 출처 태그
pub const SOURCE_EXTRACTED: &str = "extracted";

/// 병합 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added_categories: usize,
    pub added_qa_pairs: usize,
    pub emergency_count: usize,
    /// id가 겹쳐 새 번호를 받은 추출 QA 수
    pub renumbered: usize,
}

/// 텍스트에 긴급 키워드가 있는지
pub fn is_emergency_text(text: &str) -> bool {
    let lowered = text.to_lowercase();
    EMERGENCY_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

/// 첫 번째 main_point 기준으로 긴급 플래그 설정
///
/// 플래그는 켜기만 하고 끄지 않습니다. 켜진 개수를 반환합니다.
pub fn flag_emergencies(pairs: &mut [QAPair]) -> usize {
    let mut flagged = 0;
    for qa in pairs.iter_mut() {
        let first = qa.answer.main_points.first().map(String::as_str).unwrap_or("");
        if is_emergency_text(first) {
            qa.is_emergency = true;
        }
        if qa.is_emergency {
            flagged += 1;
        }
    }
    flagged
}

/// 이미 쓰인 id와 겹치는 추출 QA에 새 번호 부여
///
/// 새 번호는 카테고리별 카운터를 이어서 양쪽 어디에도 없는 `{category_id}_{NNN}`을 씁니다.
/// 새 번호를 받은 개수를 반환합니다.
fn renumber_collisions(existing: &[QAPair], extracted: &mut [QAPair]) -> usize {
    let mut claimed: HashSet<String> = existing.iter().map(|qa| qa.id.clone()).collect();
    let mut reserved: HashSet<String> = claimed
        .iter()
        .cloned()
        .chain(extracted.iter().map(|qa| qa.id.clone()))
        .collect();
    let mut next: HashMap<String, usize> = HashMap::new();
    let mut renumbered = 0;

    for qa in extracted.iter_mut() {
        if claimed.insert(qa.id.clone()) {
            continue;
        }

        let counter = next.entry(qa.category_id.clone()).or_insert(1);
        let mut candidate = qa_id(&qa.category_id, *counter);
        while reserved.contains(&candidate) {
            *counter += 1;
            candidate = qa_id(&qa.category_id, *counter);
        }

        tracing::debug!("Renumbered duplicate id {} -> {}", qa.id, candidate);
        reserved.insert(candidate.clone());
        claimed.insert(candidate.clone());
        qa.id = candidate;
        renumbered += 1;
    }

    renumbered
}

/// 두 지식베이스 병합
///
/// - 기존 QA: 태그가 없을 때만 "existing"
/// - 추출 QA: 항상 "extracted", 기존 id와 겹치면 카테고리 번호를 이어서 재부여
/// - 카테고리: 새 id만 추가
/// - 메타데이터: 기존 것을 유지하고 카운트만 재계산
pub fn merge_knowledge_bases(
    mut existing: KnowledgeBase,
    mut extracted: KnowledgeBase,
) -> (KnowledgeBase, MergeReport) {
    let mut report = MergeReport::default();

    for qa in existing.qa_pairs.iter_mut() {
        qa.source.get_or_insert_with(|| SOURCE_EXISTING.to_string());
    }
    for qa in extracted.qa_pairs.iter_mut() {
        qa.source = Some(SOURCE_EXTRACTED.to_string());
    }

    report.emergency_count += flag_emergencies(&mut existing.qa_pairs);
    report.emergency_count += flag_emergencies(&mut extracted.qa_pairs);

    let mut known: HashSet<String> = existing.categories.iter().map(|c| c.id.clone()).collect();
    for category in extracted.categories {
        if known.insert(category.id.clone()) {
            existing.categories.push(category);
            report.added_categories += 1;
        }
    }

    report.renumbered = renumber_collisions(&existing.qa_pairs, &mut extracted.qa_pairs);

    report.added_qa_pairs = extracted.qa_pairs.len();
    existing.qa_pairs.extend(extracted.qa_pairs);
    existing.refresh_counts();

    tracing::info!(
        "Merged: +{} categories, +{} QA pairs, {} emergency, {} renumbered",
        report.added_categories,
        report.added_qa_pairs,
        report.emergency_count,
        report.renumbered
    );

    (existing, report)
}

/// 파일 단위 병합
pub fn merge_files(existing: &Path, extracted: &Path, output: &Path) -> Result<MergeReport> {
    let existing_kb = KnowledgeBase::load(existing).context("Failed to load existing knowledge base")?;
    let extracted_kb =
        KnowledgeBase::load(extracted).context("Failed to load extracted knowledge base")?;

    let (merged, report) = merge_knowledge_bases(existing_kb, extracted_kb);
    merged
        .save(output)
        .context("Failed to save merged knowledge base")?;

    Ok(report)
}

// ============================================================================
// Tests
// ============================================================================
