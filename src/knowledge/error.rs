//! 지식베이스 파일 에러 타입

use std::path::PathBuf;

use thiserror::Error;

/// 지식베이스 JSON 파일 처리 에러
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Cannot read knowledge base '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot write knowledge base '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid knowledge base JSON in '{path}': {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Missing required section '{section}' in '{path}'")]
    MissingSection {
        path: PathBuf,
        section: &'static str,
    },
}
