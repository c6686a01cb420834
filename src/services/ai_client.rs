use crate::error::{Error, Result};
use crate::models::exam::Question;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::warn;

/// Response-format hint for a model call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free-form JSON object.
    JsonObject,
    /// Schema-constrained question list with single-letter keys; the raw
    /// reply is expanded into the full Question shape before return.
    CompactQuestions,
}

#[derive(Clone, Debug)]
pub struct ModelReply {
    pub content: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Boundary to the LLM transport. Cancellation is drop-based: dropping the
/// returned future aborts the in-flight call.
pub trait ModelClient: Send + Sync + 'static {
    fn chat_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        format: ResponseFormat,
        max_tokens: Option<u32>,
    ) -> impl Future<Output = Result<ModelReply>> + Send;
}

/// Chat-completions client. No retries; a non-success status is a
/// transport error for the caller to handle.
#[derive(Clone)]
pub struct AiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    max_prompt_chars: usize,
}

impl AiClient {
    pub fn new(
        client: Client,
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        max_prompt_chars: usize,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
            max_prompt_chars,
        }
    }

    fn response_format(format: ResponseFormat) -> JsonValue {
        match format {
            ResponseFormat::JsonObject => json!({ "type": "json_object" }),
            ResponseFormat::CompactQuestions => compact_question_schema(),
        }
    }
}

impl ModelClient for AiClient {
    async fn chat_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        format: ResponseFormat,
        max_tokens: Option<u32>,
    ) -> Result<ModelReply> {
        let mut user_prompt = user_prompt.to_string();
        if user_prompt.chars().count() > self.max_prompt_chars {
            warn!(
                "User prompt exceeds {} chars; truncating.",
                self.max_prompt_chars
            );
            user_prompt = user_prompt.chars().take(self.max_prompt_chars).collect();
        }

        let payload = json!({
            "model": self.model,
            "response_format": Self::response_format(format),
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "max_tokens": max_tokens.unwrap_or(self.max_tokens),
            "temperature": 0.2
        });

        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(Error::Model(format!("LLM API error {}: {}", status, body)));
        }

        let body: JsonValue = res.json().await?;
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or("{}")
            .to_string();

        let content = match format {
            ResponseFormat::CompactQuestions => normalize_compact_questions(&content),
            ResponseFormat::JsonObject => content,
        };

        let usage = body.get("usage");
        let tokens_in = usage
            .and_then(|u| u.get("prompt_tokens"))
            .and_then(|t| t.as_u64())
            .unwrap_or(0);
        let tokens_out = usage
            .and_then(|u| u.get("completion_tokens"))
            .and_then(|t| t.as_u64())
            .unwrap_or(0);

        Ok(ModelReply {
            content,
            tokens_in,
            tokens_out,
        })
    }
}

/// json_schema response format asking for questions with compact keys:
/// s (stem), o (options), c (correct), d (difficulty), r (refs).
pub fn compact_question_schema() -> JsonValue {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "questions_compact",
            "strict": true,
            "schema": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "s": { "type": "string", "description": "Enunciado da questão" },
                        "o": {
                            "type": "object",
                            "properties": {
                                "a": { "type": "string" },
                                "b": { "type": "string" },
                                "c": { "type": "string" },
                                "d": { "type": "string" }
                            },
                            "required": ["a", "b", "c", "d"]
                        },
                        "c": { "type": "string", "enum": ["A", "B", "C", "D"] },
                        "d": { "type": "string", "enum": ["easy", "medium", "hard"] },
                        "r": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
                    },
                    "required": ["s", "o", "c", "r"]
                }
            }
        }
    })
}

/// Expands a compact-key reply into full Question JSON. Items missing
/// stem/options/correct, or with an option set other than the four letters,
/// are dropped. If nothing usable is found the original content is returned
/// unchanged.
pub fn normalize_compact_questions(compact_json: &str) -> String {
    if compact_json.trim().is_empty() {
        return compact_json.to_string();
    }

    let root: JsonValue = match serde_json::from_str(compact_json) {
        Ok(v) => v,
        Err(_) => return compact_json.to_string(),
    };
    let Some(items) = root.as_array() else {
        return compact_json.to_string();
    };

    let mut questions: Vec<Question> = Vec::new();
    for item in items {
        let Some(stem) = item.get("s").and_then(|s| s.as_str()) else {
            continue;
        };
        let Some(opts) = item.get("o").and_then(|o| o.as_object()) else {
            continue;
        };
        let Some(correct) = item.get("c").and_then(|c| c.as_str()) else {
            continue;
        };

        let mut options = BTreeMap::new();
        for key in ["a", "b", "c", "d"] {
            if let Some(value) = opts.get(key).and_then(|v| v.as_str()) {
                options.insert(key.to_uppercase(), value.to_string());
            }
        }
        if options.len() != 4 {
            continue;
        }

        let refs: Vec<String> = item
            .get("r")
            .and_then(|r| r.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|x| x.as_str())
                    .filter(|x| !x.trim().is_empty())
                    .map(|x| x.to_string())
                    .collect()
            })
            .unwrap_or_default();

        questions.push(Question {
            id: String::new(),
            stem: stem.to_string(),
            options,
            correct_option: correct.to_string(),
            difficulty: item
                .get("d")
                .and_then(|d| d.as_str())
                .unwrap_or("medium")
                .to_string(),
            objective_refs: if refs.is_empty() {
                vec!["General".to_string()]
            } else {
                refs
            },
        });
    }

    if questions.is_empty() {
        return compact_json.to_string();
    }
    serde_json::to_string(&questions).unwrap_or_else(|_| compact_json.to_string())
}
