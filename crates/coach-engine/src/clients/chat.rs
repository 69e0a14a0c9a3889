//! Streaming coach clients.
//!
//! Two wire formats are supported: OpenAI-style chat completions streamed as
//! server-sent events, and a plain chunked text body (the coach backend's
//! `/stream_ask` endpoint). Both decode bytes incrementally so multi-byte
//! characters split across network chunks survive intact.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ChatTurn, CoachClient, FragmentStream};
use crate::coach::Role;
use crate::error::TransportError;

type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

fn http_client(timeout: Duration) -> Result<Client, TransportError> {
    Ok(Client::builder()
        .user_agent("ChessCoach/1.0")
        .connect_timeout(timeout)
        .build()?)
}

/// Map a non-success response into a `TransportError::Status`.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

fn byte_stream(resp: reqwest::Response) -> ByteStream {
    resp.bytes_stream()
        .map(|chunk| chunk.map(|b| b.to_vec()).map_err(TransportError::from))
        .boxed()
}

// ---- UTF-8 accumulation ----

/// Decodes a byte stream into text, holding back an incomplete trailing
/// UTF-8 sequence until the next chunk completes it.
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(rest) => {
                    text.push_str(rest);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Truncated sequence at the end: keep it for next time.
                        None => {
                            self.pending.drain(..valid);
                            return text;
                        }
                        // Invalid bytes: replace them and decode the rest.
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

// ---- Server-sent events ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Line-oriented SSE decoder. Only `data:` fields are surfaced.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
            } else if !data.is_empty() {
                events.push(SseEvent::Data(data.to_string()));
            }
        }

        events
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    delta: CompletionDelta,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionDelta {
    content: Option<String>,
}

/// Extract the text fragment carried by one completion chunk, if any.
fn chunk_content(data: &str) -> Result<Option<String>, TransportError> {
    let chunk: CompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

struct SseState {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
    had_content: bool,
}

/// Turn an SSE byte stream into content fragments. A body that ends
/// without `[DONE]` is reported as `StreamClosed`.
fn sse_fragments(body: ByteStream) -> FragmentStream {
    let state = SseState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
        had_content: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.pending.pop_front() {
                return Some((Ok(fragment), st));
            }
            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for event in st.decoder.push(&bytes) {
                        match event {
                            SseEvent::Data(data) => match chunk_content(&data) {
                                Ok(Some(text)) => {
                                    st.had_content = true;
                                    st.pending.push_back(text);
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    st.finished = true;
                                    st.pending.clear();
                                    return Some((Err(e), st));
                                }
                            },
                            SseEvent::Done => {
                                if !st.had_content {
                                    warn!("Coach stream completed but yielded no content");
                                }
                                st.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.clear();
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    st.pending.clear();
                    return Some((Err(TransportError::StreamClosed), st));
                }
            }
        }
    })
    .boxed()
}

/// Turn a plain chunked text body into fragments. End of body is the
/// completion signal.
fn text_fragments(body: ByteStream) -> FragmentStream {
    let state = (body, Utf8Accumulator::default(), false);

    stream::unfold(state, |(mut body, mut utf8, finished)| async move {
        if finished {
            return None;
        }
        loop {
            match body.next().await {
                Some(Ok(bytes)) => {
                    let text = utf8.push(&bytes);
                    if !text.is_empty() {
                        return Some((Ok(text), (body, utf8, false)));
                    }
                }
                Some(Err(e)) => return Some((Err(e), (body, utf8, true))),
                None => {
                    let rest = utf8.finish();
                    if rest.is_empty() {
                        return None;
                    }
                    return Some((Ok(rest), (body, utf8, true)));
                }
            }
        }
    })
    .boxed()
}

// ---- Chat completions (SSE) ----

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
}

/// OpenAI-compatible `POST /chat/completions` with `stream: true`.
pub struct ChatCompletionsClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str, timeout: Duration) -> Result<Self, TransportError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(TransportError::MissingApiKey)?;
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CoachClient for ChatCompletionsClient {
    async fn stream_reply(&self, turns: Vec<ChatTurn>) -> Result<FragmentStream, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);
        info!(model = %self.model, turns = turns.len(), "Opening coach stream");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages: &turns,
                stream: true,
            })
            .send()
            .await?;
        let resp = check_status(resp).await?;
        debug!("Coach stream established");

        Ok(sse_fragments(byte_stream(resp)))
    }
}

// ---- Plain text stream ----

#[derive(Serialize)]
struct StreamAskRequest<'a> {
    messages: &'a [ChatTurn],
}

/// Coach backend `POST /stream_ask`: the body is the reply text itself.
/// The backend supplies its own system preamble, so system turns are not
/// forwarded.
pub struct TextStreamClient {
    client: Client,
    base_url: String,
}

impl TextStreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CoachClient for TextStreamClient {
    async fn stream_reply(&self, turns: Vec<ChatTurn>) -> Result<FragmentStream, TransportError> {
        let url = format!("{}/stream_ask", self.base_url);
        let turns: Vec<ChatTurn> = turns.into_iter().filter(|t| t.role != Role::System).collect();
        info!(turns = turns.len(), "Opening coach stream");

        let resp = self
            .client
            .post(&url)
            .json(&StreamAskRequest { messages: &turns })
            .send()
            .await?;
        let resp = check_status(resp).await?;

        Ok(text_fragments(byte_stream(resp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&[u8]]) -> ByteStream {
        let owned: Vec<Result<Vec<u8>, TransportError>> = parts.iter().map(|p| Ok(p.to_vec())).collect();
        stream::iter(owned).boxed()
    }

    #[test]
    fn test_utf8_accumulator_holds_split_sequence() {
        let mut acc = Utf8Accumulator::default();
        let bytes = "Bf5♞".as_bytes();
        let split = bytes.len() - 1;
        assert_eq!(acc.push(&bytes[..split]), "Bf5");
        assert_eq!(acc.push(&bytes[split..]), "♞");
        assert_eq!(acc.finish(), "");
    }

    #[test]
    fn test_utf8_accumulator_invalid_byte_before_split_sequence() {
        let mut acc = Utf8Accumulator::default();
        let knight = "♞".as_bytes();
        let mut first = b"Nf3 ".to_vec();
        first.push(0xFF);
        first.extend_from_slice(&knight[..2]);

        assert_eq!(acc.push(&first), "Nf3 \u{FFFD}");
        assert_eq!(acc.push(&knight[2..]), "♞");
        assert_eq!(acc.finish(), "");
    }

    #[test]
    fn test_sse_decoder_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let events = decoder.push(b":1}\n\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn test_chunk_content() {
        let data = r#"{"choices":[{"delta":{"content":"Nf3"}}]}"#;
        assert_eq!(chunk_content(data).unwrap().as_deref(), Some("Nf3"));
        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(chunk_content(role_only).unwrap(), None);
        assert!(chunk_content("not json").is_err());
    }

    #[tokio::test]
    async fn test_sse_fragments_in_order() {
        let body = chunks(&[
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"I can \"}}]}\n\n"[..],
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"see a \"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"con"[..],
            &b"tent\":\"fork.\"}}]}\n\ndata: [DONE]\n\n"[..],
        ]);
        let fragments: Vec<_> = sse_fragments(body).collect().await;
        let texts: Vec<String> = fragments.into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(texts, vec!["I can ", "see a ", "fork."]);
    }

    #[tokio::test]
    async fn test_sse_without_done_is_stream_closed() {
        let body = chunks(&[&b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n"[..]]);
        let items: Vec<_> = sse_fragments(body).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("Hi".to_string()));
        assert_eq!(items[1], Err(TransportError::StreamClosed));
    }

    #[tokio::test]
    async fn test_text_fragments_split_utf8() {
        let bytes = "e4 ♘ ♔".as_bytes();
        let body = chunks(&[&bytes[..5], &bytes[5..]]);
        let text: String = text_fragments(body)
            .map(|f| f.unwrap())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(text, "e4 ♘ ♔");
    }

    #[test]
    fn test_missing_api_key() {
        let err = ChatCompletionsClient::new("https://example.test/v1", None, "gpt-4", Duration::from_secs(5))
            .err();
        assert_eq!(err, Some(TransportError::MissingApiKey));
    }
}
