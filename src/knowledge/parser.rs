//! Markdown 지식베이스 파서
//!
//! 학생지원 Markdown 문서를 KnowledgeBase로 변환합니다.
//!
//! ## 문서 규칙
//! - `## 제목` → 카테고리
//! - `### Q: 질문` → 질문
//! - `**A:** ...` 및 이후 줄 → 답변 (다음 경계까지)
//! - `## Quick Tips ...` / `## Additional Resources ...` 아래의 질문 없는 줄들
//!   → "What are some {제목}?" 질문 하나로 합성
//!
//! 잘못된 구조(답변 없는 질문, 카테고리 밖 내용 등)는 에러 없이 버립니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let kb = MarkdownParser::new().parse(&markdown);
//! kb.save(Path::new("knowledge_base.json"))?;
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::answer::classify_answer;
use super::model::{
    qa_id, slugify, Category, KnowledgeBase, Metadata, QAPair, DEFAULT_SOURCE,
};

/// 카테고리 헤딩 접두사
pub const CATEGORY_PREFIX: &str = "## ";
/// 질문 헤딩 접두사
pub const QUESTION_PREFIX: &str = "### Q:";
/// 답변 줄 접두사 (선택)
pub const ANSWER_PREFIX: &str = "**A:**";

/// 질문 없이 목록만 있는 섹션 제목 (소문자 접두사)
const QUICK_TIPS_TITLES: [&str; 2] = ["quick tips", "additional resources"];

// ============================================================================
// Line Classification
// ============================================================================

/// 한 줄의 분류 결과 (줄마다 정확히 하나)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    /// `## ` 뒤의 제목
    CategoryHeading(&'a str),
    /// `### Q:` 뒤의 질문
    QuestionHeading(&'a str),
    /// `**A:**` 줄 (접두사 뒤 내용, 원본 줄)
    AnswerMarker { remainder: &'a str, raw: &'a str },
    /// 그 외 모든 줄 (원본 그대로)
    Text(&'a str),
}

impl<'a> Line<'a> {
    fn classify(raw: &'a str) -> Self {
        let trimmed = raw.trim();

        if let Some(title) = trimmed.strip_prefix(CATEGORY_PREFIX) {
            Line::CategoryHeading(title.trim())
        } else if let Some(question) = trimmed.strip_prefix(QUESTION_PREFIX) {
            Line::QuestionHeading(question.trim())
        } else if let Some(remainder) = trimmed.strip_prefix(ANSWER_PREFIX) {
            Line::AnswerMarker {
                remainder: remainder.trim(),
                raw,
            }
        } else {
            Line::Text(raw)
        }
    }
}

/// Quick Tips 류 섹션 여부
fn is_quick_tips_title(title: &str) -> bool {
    let lowered = title.to_lowercase();
    QUICK_TIPS_TITLES.iter().any(|prefix| lowered.starts_with(prefix))
}

// ============================================================================
// Parse State
// ============================================================================

/// Quick Tips 섹션 누적 상태
#[derive(Debug)]
struct QuickTips {
    question: String,
    lines: Vec<String>,
}

/// 파싱 진행 상태
///
/// 파싱 한 번마다 새로 만들어지며 공유되지 않습니다.
#[derive(Debug)]
struct ParseState {
    kb: KnowledgeBase,
    /// 카테고리별 QA 카운터 (재등장한 카테고리는 이어서 셈)
    counters: HashMap<String, usize>,
    current_category: Option<String>,
    question: Option<String>,
    answer_lines: Vec<String>,
    quick_tips: Option<QuickTips>,
}

impl ParseState {
    fn new(metadata: Metadata) -> Self {
        Self {
            kb: KnowledgeBase::new(metadata),
            counters: HashMap::new(),
            current_category: None,
            question: None,
            answer_lines: Vec::new(),
            quick_tips: None,
        }
    }

    /// 한 줄 처리
    fn consume(&mut self, raw: &str) {
        match Line::classify(raw) {
            Line::CategoryHeading(title) => self.enter_category(title),
            Line::QuestionHeading(question) => self.enter_question(question),
            Line::AnswerMarker { remainder, raw } => {
                if self.question.is_some() {
                    if !remainder.is_empty() {
                        self.answer_lines.push(remainder.to_string());
                    }
                } else {
                    self.push_quick_tip(raw);
                }
            }
            Line::Text(raw) => {
                if self.question.is_some() {
                    self.answer_lines.push(raw.to_string());
                } else {
                    self.push_quick_tip(raw);
                }
            }
        }
    }

    fn enter_category(&mut self, title: &str) {
        self.flush_qa();
        self.flush_quick_tips();

        let id = slugify(title);
        if id.is_empty() {
            tracing::debug!("Heading without usable title ignored: {:?}", title);
            self.current_category = None;
            return;
        }

        if self.kb.add_category(Category::new(id.clone(), title)) {
            tracing::debug!("Category: {} ({})", title, id);
        }
        self.counters.entry(id.clone()).or_insert(0);

        if is_quick_tips_title(title) {
            self.quick_tips = Some(QuickTips {
                question: format!("What are some {}?", title),
                lines: Vec::new(),
            });
        }
        self.current_category = Some(id);
    }

    fn enter_question(&mut self, question: &str) {
        // 명시적 질문이 Quick Tips 누적보다 우선
        self.flush_quick_tips();
        self.flush_qa();

        self.question = Some(question.to_string());
        self.answer_lines.clear();
    }

    fn push_quick_tip(&mut self, raw: &str) {
        if let Some(ref mut quick_tips) = self.quick_tips {
            quick_tips.lines.push(raw.to_string());
        }
    }

    /// 진행 중인 QA 확정 (질문이 비거나 모인 답변 줄이 없으면 무시)
    fn flush_qa(&mut self) {
        let question = self.question.take();
        let lines = std::mem::take(&mut self.answer_lines);

        let Some(question) = question else {
            return;
        };
        if question.is_empty() || lines.is_empty() {
            tracing::debug!("Dropping question without answer: {:?}", question);
            return;
        }

        self.push_pair(question, &lines);
    }

    /// 진행 중인 Quick Tips 누적 확정
    fn flush_quick_tips(&mut self) {
        let Some(quick_tips) = self.quick_tips.take() else {
            return;
        };
        if quick_tips.lines.is_empty() {
            tracing::debug!("Dropping empty section: {:?}", quick_tips.question);
            return;
        }

        self.push_pair(quick_tips.question, &quick_tips.lines);
    }

    fn push_pair(&mut self, question: String, lines: &[String]) {
        let Some(category_id) = self.current_category.clone() else {
            tracing::debug!("Dropping question outside any category: {:?}", question);
            return;
        };

        let answer = classify_answer(lines);
        let counter = self.counters.entry(category_id.clone()).or_insert(0);
        *counter += 1;

        self.kb.qa_pairs.push(QAPair {
            id: qa_id(&category_id, *counter),
            category_id,
            question: question.trim().to_string(),
            answer,
            source: None,
            is_emergency: false,
        });
    }

    fn finish(mut self) -> KnowledgeBase {
        self.flush_qa();
        self.flush_quick_tips();
        self.kb.refresh_counts();
        self.kb
    }
}

// ============================================================================
// MarkdownParser
// ============================================================================

/// Markdown 지식베이스 파서
///
/// 상태를 갖지 않으므로 같은 입력에 대해 항상 같은 결과를 냅니다
/// (메타데이터 날짜 제외).
#[derive(Debug, Clone)]
pub struct MarkdownParser {
    source: String,
    date: Option<NaiveDate>,
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownParser {
    /// 기본 출처 라벨로 생성
    pub fn new() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            date: None,
        }
    }

    /// 출처 라벨 지정
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// `last_updated` 날짜 고정 (기본: 오늘)
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    fn metadata(&self) -> Metadata {
        match self.date {
            Some(date) => Metadata::dated(self.source.clone(), date),
            None => Metadata::new(self.source.clone()),
        }
    }

    /// 문서 전체 파싱
    pub fn parse(&self, text: &str) -> KnowledgeBase {
        self.parse_lines(text.lines())
    }

    /// 줄 시퀀스 파싱
    pub fn parse_lines<I, S>(&self, lines: I) -> KnowledgeBase
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = ParseState::new(self.metadata());
        for line in lines {
            state.consume(line.as_ref());
        }

        let kb = state.finish();
        tracing::debug!(
            "Parsed {} categories, {} QA pairs",
            kb.metadata.topics_count,
            kb.metadata.qa_pairs_count
        );
        kb
    }

    /// Markdown 파일 파싱
    pub fn parse_file(&self, path: &Path) -> Result<KnowledgeBase> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read markdown: {:?}", path))?;
        Ok(self.parse(&text))
    }
}

/// 기본 설정으로 Markdown 파싱
pub fn parse_markdown(text: &str) -> KnowledgeBase {
    MarkdownParser::new().parse(text)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_invariants(kb: &KnowledgeBase) {
        assert_eq!(kb.metadata.topics_count, kb.categories.len());
        assert_eq!(kb.metadata.qa_pairs_count, kb.qa_pairs.len());

        let category_ids: HashSet<_> = kb.categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(category_ids.len(), kb.categories.len());

        let qa_ids: HashSet<_> = kb.qa_pairs.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(qa_ids.len(), kb.qa_pairs.len());

        for qa in &kb.qa_pairs {
            assert!(category_ids.contains(qa.category_id.as_str()));
            let suffix = qa.id.strip_prefix(&format!("{}_", qa.category_id)).unwrap();
            assert_eq!(suffix.len(), 3);
            assert!(suffix.chars().all(|c| c.is_ascii_digit()));

            let answer = &qa.answer;
            for field in [&answer.main_points, &answer.examples, &answer.tips, &answer.related_topics] {
                assert!(field.iter().all(|entry| !entry.trim().is_empty()));
            }
        }
    }

    #[test]
    fn test_single_question() {
        let md = "## Time Management\n### Q: How do I plan my week?\n**A:** Use a planner.\n- Block study time\n";
        let kb = parse_markdown(md);

        assert_eq!(kb.categories, vec![Category::new("time_management", "Time Management")]);
        assert_eq!(kb.qa_pairs.len(), 1);

        let qa = &kb.qa_pairs[0];
        assert_eq!(qa.id, "time_management_001");
        assert_eq!(qa.category_id, "time_management");
        assert_eq!(qa.question, "How do I plan my week?");
        assert_eq!(qa.answer.main_points, vec!["Use a planner.", "Block study time"]);
        assert!(qa.answer.examples.is_empty());
        assert!(qa.answer.tips.is_empty());
        assert!(qa.answer.related_topics.is_empty());
        assert_invariants(&kb);
    }

    #[test]
    fn test_answer_sections() {
        let md = "## Study Skills\n### Q: How do I revise?\n📌 **Example**\n- Example A\n📌 **Related Topics**\n- Topic B\n✅ Stay consistent\n";
        let kb = parse_markdown(md);

        let answer = &kb.qa_pairs[0].answer;
        assert_eq!(answer.examples, vec!["Example A"]);
        assert_eq!(answer.related_topics, vec!["Topic B"]);
        assert_eq!(answer.tips, vec!["Stay consistent"]);
        assert!(answer.main_points.is_empty());
    }

    #[test]
    fn test_quick_tips_section() {
        let md = "## Quick Tips for Sleep\n✅ Sleep 8 hours\nGet sunlight\n";
        let kb = parse_markdown(md);

        assert_eq!(kb.qa_pairs.len(), 1);
        let qa = &kb.qa_pairs[0];
        assert_eq!(qa.id, "quick_tips_for_sleep_001");
        assert_eq!(qa.question, "What are some Quick Tips for Sleep?");
        assert_eq!(qa.answer.tips, vec!["Sleep 8 hours"]);
        assert_eq!(qa.answer.main_points, vec!["Get sunlight"]);
        assert_invariants(&kb);
    }

    #[test]
    fn test_additional_resources_finalized_by_next_category() {
        let md = "## Additional Resources\n- Counselling service\n- Library skills team\n## Money\n### Q: Where can I get funding?\n**A:** Student finance.\n";
        let kb = parse_markdown(md);

        assert_eq!(kb.qa_pairs.len(), 2);
        assert_eq!(kb.qa_pairs[0].id, "additional_resources_001");
        assert_eq!(kb.qa_pairs[0].question, "What are some Additional Resources?");
        assert_eq!(
            kb.qa_pairs[0].answer.main_points,
            vec!["Counselling service", "Library skills team"]
        );
        assert_eq!(kb.qa_pairs[1].id, "money_001");
        assert_invariants(&kb);
    }

    #[test]
    fn test_explicit_question_wins_over_quick_tips() {
        let md = "## Quick Tips\n✅ Take breaks\n### Q: How long should a break be?\n**A:** About ten minutes.\nStray line\n";
        let kb = parse_markdown(md);

        assert_eq!(kb.qa_pairs.len(), 2);
        assert_eq!(kb.qa_pairs[0].question, "What are some Quick Tips?");
        assert_eq!(kb.qa_pairs[0].answer.tips, vec!["Take breaks"]);
        assert_eq!(kb.qa_pairs[1].id, "quick_tips_002");
        assert_eq!(
            kb.qa_pairs[1].answer.main_points,
            vec!["About ten minutes.", "Stray line"]
        );
        assert_invariants(&kb);
    }

    #[test]
    fn test_duplicate_category_dedup() {
        let md = "## Time & Task Mgmt!\n### Q: One?\n**A:** First.\n## time task mgmt\n### Q: Two?\n**A:** Second.\n";
        let kb = parse_markdown(md);

        assert_eq!(kb.categories.len(), 1);
        assert_eq!(kb.categories[0].id, "time_task_mgmt");
        assert_eq!(kb.categories[0].title, "Time & Task Mgmt!");

        // 같은 카테고리로 다시 들어오면 카운터를 이어서 사용
        let ids: Vec<_> = kb.qa_pairs.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["time_task_mgmt_001", "time_task_mgmt_002"]);
        assert_invariants(&kb);
    }

    #[test]
    fn test_question_without_answer_dropped() {
        let kb = parse_markdown("## Stress\n### Q:  What now?");
        assert_eq!(kb.categories.len(), 1);
        assert!(kb.qa_pairs.is_empty());
        assert_invariants(&kb);

        // 빈 줄이라도 모인 줄이 있으면 QA를 만들고, 빈 항목만 걸러냄
        let kb = parse_markdown("## Stress\n### Q: What now?\n\n   \n### Q: Next?\n**A:** Breathe.\n");
        assert_eq!(kb.qa_pairs.len(), 2);
        assert_eq!(kb.qa_pairs[0].id, "stress_001");
        assert!(kb.qa_pairs[0].answer.is_empty());
        assert_eq!(kb.qa_pairs[1].id, "stress_002");
        assert_eq!(kb.qa_pairs[1].question, "Next?");
        assert_invariants(&kb);
    }

    #[test]
    fn test_marker_only_answer_kept() {
        let kb = parse_markdown("## Study\n### Q: Any examples?\n📌 **Example**\n");

        assert_eq!(kb.qa_pairs.len(), 1);
        let qa = &kb.qa_pairs[0];
        assert_eq!(qa.id, "study_001");
        assert_eq!(qa.question, "Any examples?");
        assert!(qa.answer.is_empty());
        assert_invariants(&kb);
    }

    #[test]
    fn test_quick_tips_without_lines_dropped() {
        let kb = parse_markdown("## Quick Tips\n## Money\n### Q: Budget?\n**A:** Track spending.\n");
        let ids: Vec<_> = kb.qa_pairs.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["money_001"]);
        assert_invariants(&kb);
    }

    #[test]
    fn test_empty_answer_marker_skipped() {
        let md = "## Exams\n### Q: When are exams?\n**A:**\nIn May.\n";
        let kb = parse_markdown(md);
        assert_eq!(kb.qa_pairs[0].answer.main_points, vec!["In May."]);
    }

    #[test]
    fn test_counter_restarts_per_category() {
        let md = "## A\n### Q: a1?\nx\n### Q: a2?\ny\n## B\n### Q: b1?\nz\n";
        let kb = parse_markdown(md);

        let ids: Vec<_> = kb.qa_pairs.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["a_001", "a_002", "b_001"]);
        assert_invariants(&kb);
    }

    #[test]
    fn test_stray_content_discarded() {
        let md = "# Knowledge Base\nIntro text\n### Q: Orphan question?\n**A:** Orphan answer.\n## Wellbeing\nSection intro\n### Q: Who can I talk to?\n**A:** Student services.\n";
        let kb = parse_markdown(md);

        assert_eq!(kb.categories.len(), 1);
        assert_eq!(kb.qa_pairs.len(), 1);
        assert_eq!(kb.qa_pairs[0].category_id, "wellbeing");
        assert_invariants(&kb);
    }

    #[test]
    fn test_unusable_heading_opens_no_category() {
        let kb = parse_markdown("## !!!\n### Q: Lost?\n**A:** Yes.\n");
        assert!(kb.categories.is_empty());
        assert!(kb.qa_pairs.is_empty());
    }

    #[test]
    fn test_indented_and_crlf_lines() {
        let md = "  ## Housing\r\n### Q: Where do I live?\r\n  **A:** Halls.\r\n";
        let kb = parse_markdown(md);

        assert_eq!(kb.categories[0].id, "housing");
        assert_eq!(kb.qa_pairs[0].answer.main_points, vec!["Halls."]);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let md = "## Quick Tips for Focus\n✅ Phone away\n## Focus\n### Q: How?\n**A:** Pomodoro.\n📌 **Example**\n- 25 minutes on, 5 off\n";
        let parser = MarkdownParser::new();
        let first = parser.parse(md);
        let second = parser.parse(md);

        assert_eq!(first.categories, second.categories);
        assert_eq!(first.qa_pairs, second.qa_pairs);
        assert_invariants(&first);
    }

    #[test]
    fn test_metadata_defaults() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let kb = MarkdownParser::new().with_date(date).parse("## A\n### Q: q?\na\n");

        assert_eq!(kb.metadata.last_updated, "2025-03-14");
        assert_eq!(kb.metadata.version, "1.0");
        assert_eq!(kb.metadata.language, "en");
        assert_eq!(kb.metadata.source, DEFAULT_SOURCE);
        assert_eq!(kb.metadata.topics_count, 1);
        assert_eq!(kb.metadata.qa_pairs_count, 1);
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kb.md");
        std::fs::write(&path, "## Sleep\n### Q: How much?\n**A:** Eight hours.\n").unwrap();

        let kb = MarkdownParser::new().parse_file(&path).unwrap();
        assert_eq!(kb.qa_pairs.len(), 1);

        assert!(MarkdownParser::new()
            .parse_file(&dir.path().join("missing.md"))
            .is_err());
    }

    #[test]
    fn test_line_classification() {
        assert_eq!(Line::classify("## Title "), Line::CategoryHeading("Title"));
        assert_eq!(Line::classify("### Q: Why?"), Line::QuestionHeading("Why?"));
        assert_eq!(Line::classify("### Notes"), Line::Text("### Notes"));
        assert_eq!(Line::classify("##NoSpace"), Line::Text("##NoSpace"));
        assert_eq!(
            Line::classify("**A:** yes"),
            Line::AnswerMarker { remainder: "yes", raw: "**A:** yes" }
        );
    }
}
