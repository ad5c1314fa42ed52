//! campus-kb - 대학 학생지원 지식베이스 & RAG 챗봇
//!
//! Markdown / 구조화 텍스트 지식베이스를 JSON으로 변환하고,
//! QA 쌍을 임베딩해 벡터 인덱스(LanceDB / Pinecone)에서 검색한 뒤
//! OpenAI 채팅 모델로 답변을 생성합니다.

pub mod assistant;
pub mod chat;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod index;
pub mod knowledge;

// Re-exports
pub use assistant::SupportAssistant;
pub use chat::{ChatProvider, OpenAIChat};
pub use config::{get_api_key, get_data_dir, has_api_key, Settings};
pub use embedding::{EmbeddingProvider, OpenAIEmbedding};
pub use index::{
    IndexMatch, IndexRecord, Indexer, LanceVectorIndex, MemoryVectorIndex, PineconeIndex,
    VectorIndex,
};
pub use knowledge::{
    merge_knowledge_bases, parse_markdown, AnswerBlock, Category, KnowledgeBase, KnowledgeError,
    MarkdownParser, Metadata, QAPair,
};
