//! Assistant 모듈 - 학생지원 챗봇 응답 파이프라인
//!
//! 1. 인사/종료 같은 일반 의도는 정해진 답변
//! 2. 질문 임베딩 → 인덱스 top-k 검색
//! 3. 검색된 답변으로 프롬프트 구성 → 스트리밍 생성
//! 4. 답변이 끊긴 것처럼 보이면 한 번 이어서 생성

use anyhow::{Context, Result};

use crate::chat::{collect_stream, ChatProvider};
use crate::embedding::EmbeddingProvider;
use crate::index::{IndexMatch, VectorIndex};

/// 기본 검색 개수
pub const DEFAULT_TOP_K: usize = 3;

/// 검색 결과가 없을 때 답변
pub const NO_RESULTS_REPLY: &str =
    "Unfortunately, I couldn't find relevant information. Please try rephrasing your question.";

/// 일반 의도와 답변 (앞에서부터 검사)
pub const GENERIC_INTENTS: [(&str, &str); 6] = [
    ("hello", "Hello! How can I assist you today?"),
    ("hi", "Hi! How can I help you?"),
    (
        "how are you",
        "I'm just a chatbot, but I'm here to help you! What can I do for you?",
    ),
    ("bye", "Goodbye! Have a great day!"),
    ("exit", "Goodbye! Have a great day!"),
    ("quit", "Goodbye! Have a great day!"),
];

pub const SYSTEM_PROMPT: &str = "You are a university support chatbot. \
Your responses should be well-structured, informative, and engaging. \
Expand on key points, avoid generic responses, and ensure clarity. \
If discussing study techniques, provide examples or step-by-step guidance. \
Use full sentences rather than short bullet points unless specifically requested.";

const CONTINUATION_SYSTEM_PROMPT: &str = "Continue the previous response in a concise manner.";

/// 답변이 끊긴 것으로 보는 마지막 단어
const DANGLING_ENDINGS: [&str; 5] = ["I'm", "but", "and", "because", "These"];

// ============================================================================
// Intent & Prompt Helpers
// ============================================================================

/// 일반 의도 감지 (소문자 기준 단어/구 단위 일치)
pub fn detect_generic_intent(query: &str) -> Option<&'static str> {
    let lowered = query.trim().to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();

    GENERIC_INTENTS
        .iter()
        .find(|(intent, _)| {
            let phrase: Vec<&str> = intent.split_whitespace().collect();
            words.windows(phrase.len()).any(|window| window == phrase.as_slice())
        })
        .map(|(_, reply)| *reply)
}

/// 사용자 프롬프트 구성
pub fn build_prompt(query: &str, context: &[String]) -> String {
    format!(
        "You are a university support chatbot. Answer user queries using the provided relevant information.\n\
         Only use the retrieved information and do not add extra knowledge unless necessary.\n\n\
         User Question: {}\n\n\
         Relevant Information from Knowledge Base:\n{}\n\n\
         Provide a detailed but concise response based on the above information.",
        query,
        context.join("\n")
    )
}

/// 답변이 문장 중간에서 끊긴 것처럼 보이는지
pub fn looks_truncated(reply: &str) -> bool {
    let reply = reply.trim_end();
    DANGLING_ENDINGS.iter().any(|ending| {
        reply
            .strip_suffix(ending)
            .map(|rest| rest.is_empty() || rest.ends_with(char::is_whitespace))
            .unwrap_or(false)
    })
}

// ============================================================================
// SupportAssistant
// ============================================================================

/// 학생지원 어시스턴트
pub struct SupportAssistant {
    embedder: Box<dyn EmbeddingProvider>,
    index: Box<dyn VectorIndex>,
    chat: Box<dyn ChatProvider>,
    top_k: usize,
    continue_truncated: bool,
}

impl SupportAssistant {
    pub fn new(
        embedder: Box<dyn EmbeddingProvider>,
        index: Box<dyn VectorIndex>,
        chat: Box<dyn ChatProvider>,
    ) -> Self {
        Self {
            embedder,
            index,
            chat,
            top_k: DEFAULT_TOP_K,
            continue_truncated: true,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// 끊긴 답변 이어쓰기 여부
    pub fn with_continuation(mut self, enabled: bool) -> Self {
        self.continue_truncated = enabled;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// 질문과 관련된 QA 검색
    pub async fn search(&self, query: &str) -> Result<Vec<IndexMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(vec![]);
        }

        let embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        self.index
            .query(&embedding, self.top_k)
            .await
            .context("Failed to query index")
    }

    /// 검색된 답변 본문 (빈 답변 제외)
    pub async fn retrieve(&self, query: &str) -> Result<Vec<String>> {
        let matches = self.search(query).await?;
        tracing::debug!("Retrieved {} matches for query", matches.len());

        Ok(matches
            .into_iter()
            .map(|m| m.metadata.answer)
            .filter(|answer| !answer.trim().is_empty())
            .collect())
    }

    /// 질문에 대한 답변 생성
    pub async fn respond(&self, query: &str) -> Result<String> {
        self.respond_streaming(query, |_| {}).await
    }

    /// 질문에 대한 답변 생성 (토큰 조각마다 콜백 호출)
    pub async fn respond_streaming<F>(&self, query: &str, mut on_token: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let query = query.trim();

        if let Some(reply) = detect_generic_intent(query) {
            on_token(reply);
            return Ok(reply.to_string());
        }

        let context = self.retrieve(query).await?;
        if context.is_empty() {
            on_token(NO_RESULTS_REPLY);
            return Ok(NO_RESULTS_REPLY.to_string());
        }

        let prompt = build_prompt(query, &context);
        let mut rx = self
            .chat
            .complete_stream(SYSTEM_PROMPT, &prompt)
            .await
            .context("Failed to generate response")?;

        let mut reply = String::new();
        while let Some(delta) = rx.recv().await {
            let delta = delta?;
            on_token(&delta);
            reply.push_str(&delta);
        }
        let mut reply = reply.trim().to_string();

        if self.continue_truncated && looks_truncated(&reply) {
            tracing::info!("Response may be cut off, generating continuation");
            let rx = self
                .chat
                .complete_stream(CONTINUATION_SYSTEM_PROMPT, "Continue from where you left off.")
                .await?;
            let follow_up = collect_stream(rx).await?;
            let follow_up = follow_up.trim();

            if !follow_up.is_empty() {
                on_token(" ");
                on_token(follow_up);
                reply.push(' ');
                reply.push_str(follow_up);
            }
        }

        Ok(reply)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexRecord, MemoryVectorIndex, RecordMetadata};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// 키워드 포함 여부로 만드는 가짜 임베딩
    struct KeywordEmbedding;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lowered = text.to_lowercase();
            Ok(vec![
                if lowered.contains("sleep") { 1.0 } else { 0.0 },
                if lowered.contains("exam") { 1.0 } else { 0.0 },
                0.01,
            ])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    /// 정해진 답변을 순서대로 돌려주고 프롬프트를 기록하는 가짜 채팅
    struct ScriptedChat {
        replies: Mutex<Vec<String>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedChat {
        fn new(replies: &[&str]) -> (Self, Arc<Mutex<Vec<String>>>) {
            let prompts = Arc::new(Mutex::new(vec![]));
            let chat = Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                prompts: prompts.clone(),
            };
            (chat, prompts)
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("no scripted reply"))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    async fn assistant(replies: &[&str]) -> (SupportAssistant, Arc<Mutex<Vec<String>>>) {
        let index = MemoryVectorIndex::new();
        index
            .upsert(&[
                IndexRecord {
                    id: "sleep_001".to_string(),
                    vector: vec![1.0, 0.0, 0.01],
                    metadata: RecordMetadata {
                        question: "How much sleep do I need?".to_string(),
                        answer: "Aim for seven to nine hours.".to_string(),
                        category_id: Some("sleep".to_string()),
                    },
                },
                IndexRecord {
                    id: "exam_001".to_string(),
                    vector: vec![0.0, 1.0, 0.01],
                    metadata: RecordMetadata {
                        question: "How do I prepare for exams?".to_string(),
                        answer: "Start revising early.".to_string(),
                        category_id: Some("exam".to_string()),
                    },
                },
            ])
            .await
            .unwrap();

        let (chat, prompts) = ScriptedChat::new(replies);
        let assistant =
            SupportAssistant::new(Box::new(KeywordEmbedding), Box::new(index), Box::new(chat))
                .with_top_k(1);
        (assistant, prompts)
    }

    #[test]
    fn test_generic_intent_whole_words() {
        assert_eq!(
            detect_generic_intent("Hello there"),
            Some("Hello! How can I assist you today?")
        );
        assert_eq!(detect_generic_intent("HI!"), Some("Hi! How can I help you?"));
        assert!(detect_generic_intent("How are you today?")
            .map(|r| r.starts_with("I'm just a chatbot"))
            .unwrap_or(false));
        assert!(detect_generic_intent("quit").is_some());

        // 단어 일부는 의도가 아님
        assert_eq!(detect_generic_intent("Which exam is this?"), None);
        assert_eq!(detect_generic_intent("My history essay"), None);
        assert_eq!(detect_generic_intent("How are they graded?"), None);
    }

    #[test]
    fn test_looks_truncated() {
        assert!(looks_truncated("You should rest, but"));
        assert!(looks_truncated("These"));
        assert!(looks_truncated("Sleep matters because "));
        assert!(!looks_truncated("Sleep matters."));
        assert!(!looks_truncated("Study with a friend"));
        assert!(!looks_truncated("Ask your husband"));
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(
            "How do I sleep better?",
            &["Keep a routine.".to_string(), "Avoid screens.".to_string()],
        );
        assert!(prompt.contains("User Question: How do I sleep better?"));
        assert!(prompt.contains("Keep a routine.\nAvoid screens."));
    }

    #[tokio::test]
    async fn test_respond_generic_skips_retrieval() {
        let (assistant, prompts) = assistant(&[]).await;
        let reply = assistant.respond("bye").await.unwrap();
        assert_eq!(reply, "Goodbye! Have a great day!");
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_respond_uses_retrieved_answer() {
        let (assistant, prompts) = assistant(&["Try to sleep seven hours."]).await;

        let mut streamed = String::new();
        let reply = assistant
            .respond_streaming("I can't sleep", |t| streamed.push_str(t))
            .await
            .unwrap();

        assert_eq!(reply, "Try to sleep seven hours.");
        assert_eq!(streamed, reply);

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Aim for seven to nine hours."));
        assert!(!prompts[0].contains("Start revising early."));
    }

    #[tokio::test]
    async fn test_respond_continues_truncated_reply() {
        let (assistant, prompts) = assistant(&["Revise early and", "use past papers."]).await;

        let reply = assistant.respond("exam tips").await.unwrap();
        assert_eq!(reply, "Revise early and use past papers.");
        assert_eq!(prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_respond_without_continuation() {
        let (assistant, _) = assistant(&["Revise early and"]).await;
        let assistant = assistant.with_continuation(false);
        assert_eq!(assistant.respond("exam tips").await.unwrap(), "Revise early and");
    }

    #[tokio::test]
    async fn test_respond_no_results() {
        let (assistant, prompts) = assistant(&[]).await;
        let assistant = assistant.with_top_k(0);

        let reply = assistant.respond("Where is the library?").await.unwrap();
        assert_eq!(reply, NO_RESULTS_REPLY);
        assert!(prompts.lock().unwrap().is_empty());
    }
}
