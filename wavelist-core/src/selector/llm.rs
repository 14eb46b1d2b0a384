//! The LLM collaborator boundary (spec §4.5): a trait so the selector
//! depends on a capability contract rather than a concrete HTTP client,
//! plus a deterministic token counter and a scripted test double.
//!
//! The HTTP implementation is grounded on the pack's `AiCurator::call_claude`
//! (POST a JSON body, check status, extract text, strip markdown code
//! fences, parse JSON), generalised to an OpenAI-style chat-completions
//! endpoint and a tool-use loop (spec §6: `OPENAI_KEY`, `OPENAI_MODEL`).

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wavelist_common::UnitRate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Present on a `Tool` message, identifying which call this answers.
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// One requested tool invocation as surfaced by the model, paired with
/// its raw (unparsed) arguments so the selector can retry a malformed
/// call without losing the model's intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One turn of the conversation: either the model asked for tool calls,
/// or it produced a terminal text answer.
#[derive(Debug, Clone)]
pub enum LlmTurn {
    ToolCalls(Vec<RequestedToolCall>),
    FinalAnswer(String),
}

#[derive(Debug, Clone, Copy)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub turn: LlmTurn,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn next_turn(&self, messages: &[ChatMessage], tools: &Value) -> Result<LlmResponse>;

    /// Per-token price for input and output tokens, for whatever model
    /// this client is configured against (spec §4.5 "converted to USD
    /// using the model's current per-token rates"). Kept as `UnitRate`,
    /// not `Usd` — real per-token prices are fractions of a cent and
    /// would round to zero at `Usd`'s 4-digit precision.
    fn rates(&self) -> (UnitRate, UnitRate);
}

/// Counts tokens deterministically so the same conversation always
/// costs the same amount across runs. A real per-model BPE tokenizer is
/// out of scope here; this approximates GPT-style tokenization at
/// roughly 4 characters per token, which is deterministic and stable
/// across process runs (unlike sampling-based estimators).
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u64;
}

pub struct ApproximateTokenCounter;

impl TokenCounter for ApproximateTokenCounter {
    fn count(&self, text: &str) -> u64 {
        ((text.chars().count() as f64) / 4.0).ceil() as u64
    }
}

/// An OpenAI-compatible chat-completions client (spec §6: `OPENAI_KEY`,
/// `OPENAI_MODEL`, default a fast economical model).
pub struct HttpLlmClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
    base_url: String,
    input_rate: UnitRate,
    output_rate: UnitRate,
}

impl HttpLlmClient {
    pub fn new(api_key: String, model: String, input_rate: UnitRate, output_rate: UnitRate) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            input_rate,
            output_rate,
        }
    }

    fn messages_to_json(messages: &[ChatMessage]) -> Value {
        serde_json::Value::Array(
            messages
                .iter()
                .map(|m| {
                    let role = match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        Role::Tool => "tool",
                    };
                    let mut obj = serde_json::json!({
                        "role": role,
                        "content": m.content,
                    });
                    if let Some(id) = &m.tool_call_id {
                        obj["tool_call_id"] = Value::String(id.clone());
                    }
                    obj
                })
                .collect(),
        )
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn next_turn(&self, messages: &[ChatMessage], tools: &Value) -> Result<LlmResponse> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": Self::messages_to_json(messages),
                "tools": tools,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("API returned {status}: {body}")));
        }

        let body: Value = response.json().await?;
        let choice = body["choices"][0]["message"].clone();
        let usage = TokenUsage {
            input_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        };

        if let Some(tool_calls) = choice.get("tool_calls").and_then(|v| v.as_array()) {
            let calls = tool_calls
                .iter()
                .map(|c| {
                    let name = c["function"]["name"].as_str().unwrap_or_default().to_string();
                    let raw_args = c["function"]["arguments"].as_str().unwrap_or("{}");
                    let arguments: Value =
                        serde_json::from_str(raw_args).unwrap_or(Value::Object(Default::default()));
                    RequestedToolCall {
                        id: c["id"].as_str().unwrap_or_default().to_string(),
                        name,
                        arguments,
                    }
                })
                .collect();
            return Ok(LlmResponse {
                turn: LlmTurn::ToolCalls(calls),
                usage,
            });
        }

        let content = choice["content"]
            .as_str()
            .ok_or_else(|| Error::Llm("response carried neither tool_calls nor content".into()))?;

        Ok(LlmResponse {
            turn: LlmTurn::FinalAnswer(content.to_string()),
            usage,
        })
    }

    fn rates(&self) -> (UnitRate, UnitRate) {
        (self.input_rate, self.output_rate)
    }
}

/// A deterministic, scripted test double: returns the next entry from a
/// fixed list of turns regardless of what it's asked, so selector tests
/// never need network access.
pub struct ScriptedLlmClient {
    turns: std::sync::Mutex<std::collections::VecDeque<LlmTurn>>,
    input_rate: UnitRate,
    output_rate: UnitRate,
}

impl ScriptedLlmClient {
    pub fn new(turns: Vec<LlmTurn>) -> Self {
        Self {
            turns: std::sync::Mutex::new(turns.into()),
            input_rate: UnitRate::from_str_strict("0.0000010").unwrap_or(UnitRate::ZERO),
            output_rate: UnitRate::from_str_strict("0.0000030").unwrap_or(UnitRate::ZERO),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn next_turn(&self, _messages: &[ChatMessage], _tools: &Value) -> Result<LlmResponse> {
        let mut turns = self.turns.lock().unwrap();
        let turn = turns
            .pop_front()
            .ok_or_else(|| Error::Llm("scripted client exhausted its turns".into()))?;
        Ok(LlmResponse {
            turn,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
        })
    }

    fn rates(&self) -> (UnitRate, UnitRate) {
        (self.input_rate, self.output_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximate_counter_is_deterministic() {
        let counter = ApproximateTokenCounter;
        let a = counter.count("hello world");
        let b = counter.count("hello world");
        assert_eq!(a, b);
        assert!(a > 0);
    }

    #[tokio::test]
    async fn scripted_client_replays_turns_in_order() {
        let client = ScriptedLlmClient::new(vec![
            LlmTurn::FinalAnswer("[]".to_string()),
        ]);
        let response = client.next_turn(&[], &Value::Null).await.unwrap();
        assert!(matches!(response.turn, LlmTurn::FinalAnswer(_)));
    }
}
