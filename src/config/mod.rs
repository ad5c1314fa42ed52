//! 설정 모듈
//!
//! 환경변수에서 API 키와 모델 설정을 읽습니다.
//!
//! | 변수 | 기본값 |
//! |---|---|
//! | `OPENAI_API_KEY` | (필수: embed/index/query/chat) |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `CAMPUS_KB_EMBEDDING_MODEL` | `text-embedding-ada-002` |
//! | `CAMPUS_KB_CHAT_MODEL` | `gpt-3.5-turbo` |
//! | `PINECONE_API_KEY`, `PINECONE_INDEX_HOST` | (Pinecone 백엔드 사용 시) |
//! | `CAMPUS_KB_DATA_DIR` | `~/.local/share/.campus-kb` 등 |

use std::path::PathBuf;

use anyhow::Result;

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const EMBEDDING_MODEL_VAR: &str = "CAMPUS_KB_EMBEDDING_MODEL";
pub const CHAT_MODEL_VAR: &str = "CAMPUS_KB_CHAT_MODEL";
pub const PINECONE_API_KEY_VAR: &str = "PINECONE_API_KEY";
pub const PINECONE_HOST_VAR: &str = "PINECONE_INDEX_HOST";
pub const DATA_DIR_VAR: &str = "CAMPUS_KB_DATA_DIR";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: u32 = 250;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ============================================================================
// Settings
// ============================================================================

/// Pinecone 접속 정보
#[derive(Debug, Clone)]
pub struct PineconeSettings {
    pub api_key: String,
    /// 인덱스 호스트 (예: `ai-powered-chatbot-xxxx.svc.pinecone.io`)
    pub host: String,
}

/// 실행 설정
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub pinecone: Option<PineconeSettings>,
    pub data_dir: PathBuf,
}

impl Settings {
    /// 프로세스 환경변수에서 로드
    pub fn from_env() -> Self {
        Self::from_lookup(read_env)
    }

    /// 임의의 조회 함수로 로드 (빈 값은 없는 것으로 취급)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let pinecone = match (get(PINECONE_API_KEY_VAR), get(PINECONE_HOST_VAR)) {
            (Some(api_key), Some(host)) => Some(PineconeSettings { api_key, host }),
            _ => None,
        };

        Self {
            openai_api_key: get(OPENAI_API_KEY_VAR),
            openai_base_url: get(OPENAI_BASE_URL_VAR)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            embedding_model: get(EMBEDDING_MODEL_VAR)
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: get(CHAT_MODEL_VAR).unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            pinecone,
            data_dir: get(DATA_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
        }
    }

    /// OpenAI API 키가 설정되어 있는지 (공백뿐인 값은 미설정)
    pub fn has_openai_key(&self) -> bool {
        self.openai_api_key.is_some()
    }

    /// OpenAI API 키 (없으면 설정 방법을 담은 에러)
    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "OpenAI API key not found. Set {} environment variable.\n\
                 Get your API key at: https://platform.openai.com/api-keys",
                OPENAI_API_KEY_VAR
            )
        })
    }

    /// Pinecone 설정 (없으면 에러)
    pub fn require_pinecone(&self) -> Result<&PineconeSettings> {
        self.pinecone.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "Pinecone is not configured. Set {} and {}.",
                PINECONE_API_KEY_VAR,
                PINECONE_HOST_VAR
            )
        })
    }
}

// ============================================================================
// Environment Helpers
// ============================================================================

/// 환경변수 읽기 (값 검사는 `Settings::from_lookup`이 담당)
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// OpenAI API 키 로드
pub fn get_api_key() -> Result<String> {
    Settings::from_env().require_openai_key().map(str::to_string)
}

/// OpenAI API 키 존재 여부
pub fn has_api_key() -> bool {
    Settings::from_env().has_openai_key()
}

/// 기본 데이터 디렉토리 (로컬 벡터 인덱스 저장 위치)
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".campus-kb")
}

/// 데이터 디렉토리 경로
pub fn get_data_dir() -> PathBuf {
    Settings::from_env().data_dir
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from(&[]);
        assert!(settings.openai_api_key.is_none());
        assert_eq!(settings.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(settings.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(settings.chat_model, DEFAULT_CHAT_MODEL);
        assert!(settings.pinecone.is_none());
        assert!(settings.data_dir.ends_with(".campus-kb"));
        assert!(settings.require_openai_key().is_err());
    }

    #[test]
    fn test_has_openai_key() {
        assert!(settings_from(&[(OPENAI_API_KEY_VAR, "sk-test")]).has_openai_key());
        assert!(!settings_from(&[]).has_openai_key());
    }

    #[test]
    fn test_overrides() {
        let settings = settings_from(&[
            (OPENAI_API_KEY_VAR, "sk-test"),
            (OPENAI_BASE_URL_VAR, "http://localhost:8080/v1/"),
            (CHAT_MODEL_VAR, "gpt-4"),
            (PINECONE_API_KEY_VAR, "pc-key"),
            (PINECONE_HOST_VAR, "kb-index.svc.pinecone.io"),
            (DATA_DIR_VAR, "/tmp/campus"),
        ]);

        assert_eq!(settings.require_openai_key().unwrap(), "sk-test");
        assert_eq!(settings.openai_base_url, "http://localhost:8080/v1");
        assert_eq!(settings.chat_model, "gpt-4");
        assert_eq!(settings.require_pinecone().unwrap().api_key, "pc-key");
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/campus"));
    }

    #[test]
    fn test_blank_values_ignored() {
        let settings = settings_from(&[
            (OPENAI_API_KEY_VAR, " \t "),
            (PINECONE_API_KEY_VAR, "k"),
            (DATA_DIR_VAR, "   "),
        ]);
        assert!(settings.openai_api_key.is_none());
        assert!(!settings.has_openai_key());
        assert!(settings.require_openai_key().is_err());
        assert!(settings.data_dir.ends_with(".campus-kb"));
        // 호스트 없이 키만 있으면 미설정
        assert!(settings.pinecone.is_none());
    }
}
