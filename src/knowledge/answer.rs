//! 답변 블록 분류기
//!
//! 질문 하나에 모인 답변 줄들을 `main_points` / `examples` / `tips` /
//! `related_topics` 네 필드로 나눕니다.
//!
//! - `📌 **Example**` 이후 줄 → examples
//! - `📌 **Related Topics**` 이후 줄 → related_topics
//! - `✅ ` 로 시작하는 줄 → tips (모드와 무관)
//! - 나머지 → 현재 모드의 필드, 모드가 없으면 main_points

use std::sync::OnceLock;

use regex::Regex;

use super::model::AnswerBlock;

/// 예시 섹션 마커 (소문자 비교)
const EXAMPLE_MARKER: &str = "📌 **example**";
/// 관련 주제 섹션 마커 (소문자 비교)
const RELATED_TOPICS_MARKER: &str = "📌 **related topics**";
/// 팁 마커
const TIP_MARKER: &str = "✅ ";

/// 현재 수집 중인 섹션
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Main,
    Examples,
    RelatedTopics,
}

fn bullet_re() -> &'static Regex {
    static BULLET: OnceLock<Regex> = OnceLock::new();
    BULLET.get_or_init(|| Regex::new(r"^[-*+]\s+(.*)$").expect("valid bullet pattern"))
}

/// 답변 줄 목록을 AnswerBlock으로 분류
pub fn classify_answer<S: AsRef<str>>(lines: &[S]) -> AnswerBlock {
    let mut block = AnswerBlock::default();
    let mut section = Section::Main;

    for line in lines {
        let trimmed = line.as_ref().trim();
        let lowered = trimmed.to_lowercase();

        if lowered.starts_with(EXAMPLE_MARKER) {
            section = Section::Examples;
            continue;
        }
        if lowered.starts_with(RELATED_TOPICS_MARKER) {
            section = Section::RelatedTopics;
            continue;
        }

        if let Some(tip) = trimmed.strip_prefix(TIP_MARKER) {
            block.tips.push(tip.trim().to_string());
            continue;
        }

        let text = match bullet_re().captures(trimmed).and_then(|c| c.get(1)) {
            Some(item) => item.as_str().trim(),
            None => trimmed,
        };

        let target = match section {
            Section::Main => &mut block.main_points,
            Section::Examples => &mut block.examples,
            Section::RelatedTopics => &mut block.related_topics,
        };
        target.push(text.to_string());
    }

    block.drop_blank_entries();
    block
}

// ============================================================================
// Tests
// ============================================================================
