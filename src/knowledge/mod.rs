//! Knowledge 모듈 - 학생지원 지식베이스
//!
//! - Model: 지식베이스 / 카테고리 / QA / 답변 블록 타입
//! - Parser: Markdown → 지식베이스
//! - Answer: 답변 줄 분류기
//! - Structured: 추출 텍스트(.txt) → 지식베이스
//! - Merge: 지식베이스 병합 + 긴급 플래그

mod answer;
mod error;
mod merge;
mod model;
mod parser;
mod structured;

// Re-exports
pub use answer::classify_answer;
pub use error::KnowledgeError;
pub use merge::{
    flag_emergencies, is_emergency_text, merge_files, merge_knowledge_bases, MergeReport,
    EMERGENCY_KEYWORDS, SOURCE_EXISTING, SOURCE_EXTRACTED,
};
pub use model::{
    qa_id, slugify, AnswerBlock, Category, KnowledgeBase, Metadata, QAPair, DEFAULT_LANGUAGE,
    DEFAULT_SOURCE, DEFAULT_VERSION,
};
pub use parser::{
    parse_markdown, MarkdownParser, ANSWER_PREFIX, CATEGORY_PREFIX, QUESTION_PREFIX,
};
pub use structured::{
    convert_structured_folder, parse_structured_text, StructuredDocument, STRUCTURED_SOURCE,
};
