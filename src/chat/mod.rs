//! Chat 모듈 - OpenAI Chat Completions 클라이언트
//!
//! 일반 응답과 토큰 스트리밍(SSE)을 모두 지원합니다.
//! 스트리밍은 spawn된 태스크가 `mpsc` 채널로 토큰 조각을 보냅니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::embedding::OpenAIError;

/// 스트리밍 채널 버퍼
const STREAM_BUFFER: usize = 100;

// ============================================================================
// ChatProvider Trait
// ============================================================================

/// 채팅 완성 프로바이더 트레이트
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// 전체 응답을 한 번에 받기
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// 토큰 조각 스트림 (기본 구현: 전체 응답을 한 조각으로)
    async fn complete_stream(
        &self,
        system: &str,
        user: &str,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        let reply = self.complete(system, user).await?;
        let (tx, rx) = mpsc::channel(1);
        if tx.send(Ok(reply)).await.is_err() {
            tracing::debug!("Stream receiver dropped");
        }
        Ok(rx)
    }

    /// 모델 이름
    fn model(&self) -> &str;
}

/// 스트림의 모든 조각을 이어붙이기 (첫 에러에서 중단)
pub async fn collect_stream(mut rx: mpsc::Receiver<Result<String>>) -> Result<String> {
    let mut text = String::new();
    while let Some(delta) = rx.recv().await {
        text.push_str(&delta?);
    }
    Ok(text)
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// SSE Decoder
// ============================================================================

/// SSE 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// 토큰 조각
    Delta(String),
    /// `data: [DONE]`
    Done,
}

/// Chat Completions SSE 디코더
///
/// 바이트 조각이 줄 중간에서 끊겨도 다음 조각과 이어서 해석합니다.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 바이트 조각 추가 후 완성된 줄의 이벤트 반환
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = Self::decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// 스트림 종료 시 남은 줄 처리
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        Self::decode_line(&line)
    }

    fn decode_line(line: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(line);
        let payload = line.trim().strip_prefix("data:")?.trim();

        if payload == "[DONE]" {
            return Some(SseEvent::Done);
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta)
                .and_then(|d| d.content)
                .filter(|content| !content.is_empty())
                .map(SseEvent::Delta),
            Err(e) => {
                tracing::debug!("Ignoring malformed stream chunk: {}", e);
                None
            }
        }
    }
}

// ============================================================================
// OpenAI Chat
// ============================================================================

/// OpenAI 채팅 구현체
#[derive(Debug, Clone)]
pub struct OpenAIChat {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAIChat {
    /// 기본 설정(gpt-3.5-turbo, 250 토큰, 0.7)으로 생성
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url: crate::config::DEFAULT_OPENAI_BASE_URL.to_string(),
            model: crate::config::DEFAULT_CHAT_MODEL.to_string(),
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
            temperature: crate::config::DEFAULT_TEMPERATURE,
            client,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// 설정에서 생성
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_openai_key()?.to_string();
        Ok(Self::new(api_key)?
            .with_model(settings.chat_model.clone())
            .with_base_url(settings.openai_base_url.clone())
            .with_sampling(settings.max_tokens, settings.temperature))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request<'a>(&'a self, system: &'a str, user: &'a str, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream,
        }
    }

    /// 요청 전송 후 성공 응답만 반환
    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .context("Failed to send chat request")?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(error) = serde_json::from_str::<OpenAIError>(&body) {
            anyhow::bail!("OpenAI API error ({}): {}", status, error.error.message);
        }
        anyhow::bail!("OpenAI API error ({}): {}", status, body)
    }
}

#[async_trait]
impl ChatProvider for OpenAIChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let response = self.send(&self.request(system, user, false)).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response contained no choices"))?;

        Ok(content.trim().to_string())
    }

    async fn complete_stream(
        &self,
        system: &str,
        user: &str,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        let response = self.send(&self.request(system, user, true)).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            use futures::StreamExt;

            let mut decoder = SseDecoder::new();
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(anyhow::Error::new(e).context("Chat stream interrupted")))
                            .await;
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    match event {
                        SseEvent::Delta(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        SseEvent::Done => return,
                    }
                }
            }

            if let Some(SseEvent::Delta(text)) = decoder.finish() {
                let _ = tx.send(Ok(text)).await;
            }
        });

        Ok(rx)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_sse_decoder_yields_deltas_in_order() {
        let mut decoder = SseDecoder::new();
        let body = format!(
            "{}{}: keep-alive\n\ndata: {{\"choices\":[{{\"delta\":{{\"role\":\"assistant\"}}}}]}}\n\n{}data: [DONE]\n\n{}",
            delta("Plan"),
            "",
            delta(" ahead"),
            delta("ignored")
        );

        let events = decoder.push(body.as_bytes());
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Plan".to_string()),
                SseEvent::Delta(" ahead".to_string()),
                SseEvent::Done,
                SseEvent::Delta("ignored".to_string()),
            ]
        );
    }

    #[test]
    fn test_sse_decoder_split_chunks() {
        let mut decoder = SseDecoder::new();
        let body = delta("Hello");
        let (first, second) = body.as_bytes().split_at(10);

        assert!(decoder.push(first).is_empty());
        assert_eq!(decoder.push(second), vec![SseEvent::Delta("Hello".to_string())]);
    }

    #[test]
    fn test_sse_decoder_crlf_and_finish() {
        let mut decoder = SseDecoder::new();
        assert_eq!(
            decoder.push(b"data: [DONE]\r\n"),
            vec![SseEvent::Done]
        );

        let tail = delta("end");
        assert!(decoder.push(tail.trim_end().as_bytes()).is_empty());
        assert_eq!(decoder.finish(), Some(SseEvent::Delta("end".to_string())));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_request_body() {
        let chat = OpenAIChat::new("fake_key".to_string()).unwrap();
        let body = serde_json::to_value(chat.request("sys", "hi", false)).unwrap();
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 250);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("stream").is_none());

        let streaming = serde_json::to_value(chat.request("sys", "hi", true)).unwrap();
        assert_eq!(streaming["stream"], true);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":" Sure. "},"finish_reason":"stop"}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some(" Sure. "));
    }

    struct EchoChat;

    #[async_trait]
    impl ChatProvider for EchoChat {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            Ok(user.to_uppercase())
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_default_stream_and_collect() {
        let rx = EchoChat.complete_stream("sys", "hello").await.unwrap();
        assert_eq!(collect_stream(rx).await.unwrap(), "HELLO");
    }

    #[tokio::test]
    async fn test_collect_stream_stops_on_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok("a".to_string())).await.unwrap();
        tx.send(Err(anyhow::anyhow!("boom"))).await.unwrap();
        drop(tx);
        assert!(collect_stream(rx).await.is_err());
    }
}
