//! Ollama HTTP implementation of [`EnrichmentProvider`].
//!
//! Structured answers use `/api/chat` with a JSON schema in `format`;
//! embeddings use `/api/embed`.

use crate::config::LlmConfig;
use crate::provider::{
    EnrichmentProvider, NoteMetadata, ProviderError, ProviderResult, SuggestedNodes,
    MAX_SUGGESTED_PATHS,
};
use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

const METADATA_PROMPT: &str = "\
Assign metadata to the text provided by the user.
First work out what the text is about and what the user intends with it.
Then return:
- tags: categories, topics or themes;
- entities: names of people, organizations, places, dates, addresses and other named things.
If the text already contains #tags or @entities, include them and add more where useful.";

const SUGGEST_PROMPT: &str = "\
Suggest where the text provided by the user belongs in their category tree, so it can be found again easily.
Write each suggestion as a nested path such as \"Work > Meetings > Daily Standup\".
Examples:
- a meeting: \"Work > Meetings > Daily Standup\"
- a shopping list: \"Household > Shopping > Groceries\"
- a project: \"Work > Projects > <project name>\"
- a personal note: \"Personal > <topic> > <subtopic>\"
Suggest between 1 and 3 paths: one when there is a single clear match, more when several fit.
Reuse existing structure wherever possible.
Never invent new top-level categories; they are chosen by the user.";

/// Blocking Ollama client.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model_basic: String,
    model_reason: String,
    model_embed: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| ProviderError::Unavailable(format!("cannot build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_basic: config.model_basic.clone(),
            model_reason: config.model_reason.clone(),
            model_embed: config.model_embed.clone(),
        })
    }

    fn chat<T: DeserializeOwned>(
        &self,
        task: &'static str,
        model: &str,
        system: &str,
        prompt: &str,
        schema: Value,
    ) -> ProviderResult<T> {
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
            format: schema,
        };

        let started_at = Instant::now();
        let response: ChatResponse = self.post(task, "/api/chat", &request)?;
        debug!(
            "event=provider_call module=provider task={task} status=ok duration_ms={} response_len={}",
            started_at.elapsed().as_millis(),
            response.message.content.len()
        );
        serde_json::from_str(&response.message.content)
            .map_err(|err| ProviderError::Invalid(format!("{task} answer is not valid JSON: {err}")))
    }

    fn embed_batch(&self, input: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest {
            model: &self.model_embed,
            input,
        };
        let started_at = Instant::now();
        let response: EmbedResponse = self.post("embed", "/api/embed", &request)?;
        debug!(
            "event=provider_call module=provider task=embed status=ok duration_ms={} count={}",
            started_at.elapsed().as_millis(),
            response.embeddings.len()
        );
        if response.embeddings.len() != input.len() {
            return Err(ProviderError::Invalid(format!(
                "expected {} embeddings, got {}",
                input.len(),
                response.embeddings.len()
            )));
        }
        if response.embeddings.iter().any(Vec::is_empty) {
            return Err(ProviderError::Invalid("empty embedding vector".to_string()));
        }
        Ok(response.embeddings)
    }

    fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        task: &'static str,
        path: &str,
        body: &B,
    ) -> ProviderResult<T> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .map_err(|err| {
                warn!("event=provider_call module=provider task={task} status=error error_code=unreachable");
                ProviderError::Unavailable(err.to_string())
            })?;
        decode(task, response)
    }
}

/// Statuses that mean "try again later" rather than a bad request.
fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn decode<T: DeserializeOwned>(task: &'static str, response: Response) -> ProviderResult<T> {
    let status = response.status();
    if is_transient(status) {
        warn!("event=provider_call module=provider task={task} status=error error_code=transient_status http_status={}", status.as_u16());
        return Err(ProviderError::Unavailable(format!("ollama returned {status}")));
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ProviderError::Invalid(format!("ollama returned {status}: {body}")));
    }
    response.json().map_err(|err| {
        if err.is_timeout() {
            ProviderError::Unavailable(format!("timed out reading {task} response: {err}"))
        } else {
            ProviderError::Invalid(format!("cannot decode {task} response: {err}"))
        }
    })
}

impl EnrichmentProvider for OllamaProvider {
    fn assign_metadata(&self, text: &str) -> ProviderResult<NoteMetadata> {
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": { "type": "array", "items": { "type": "string" } },
                "entities": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["tags", "entities"]
        });
        self.chat(
            "assign_metadata",
            &self.model_reason,
            METADATA_PROMPT,
            text,
            schema,
        )
    }

    fn suggest_nodes(&self, text: &str, existing_roots: &[String]) -> ProviderResult<SuggestedNodes> {
        let mut system = SUGGEST_PROMPT.to_string();
        if !existing_roots.is_empty() {
            system.push_str("\nExisting top-level categories:\n");
            for root in existing_roots {
                system.push_str("- ");
                system.push_str(root);
                system.push('\n');
            }
        }
        let schema = json!({
            "type": "object",
            "properties": {
                "nested_paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "maxItems": MAX_SUGGESTED_PATHS
                }
            },
            "required": ["nested_paths"]
        });
        self.chat("suggest_nodes", &self.model_basic, &system, text, schema)
    }

    fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| ProviderError::Invalid("no embedding returned".to_string()))
    }

    fn embed_many(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        self.embed_batch(texts)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::{is_transient, OllamaProvider};
    use crate::config::LlmConfig;
    use crate::provider::{EnrichmentProvider, ProviderError};
    use reqwest::StatusCode;

    #[test]
    fn rate_limits_and_timeouts_are_retryable() {
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::REQUEST_TIMEOUT));
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(!is_transient(StatusCode::BAD_REQUEST));
        assert!(!is_transient(StatusCode::NOT_FOUND));
    }

    #[test]
    fn unreachable_server_is_unavailable() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            timeout_secs: Some(2),
            ..LlmConfig::default()
        };
        let provider = OllamaProvider::new(&config).unwrap();
        assert!(matches!(
            provider.embed("hello"),
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[test]
    fn empty_batch_makes_no_request() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..LlmConfig::default()
        };
        let provider = OllamaProvider::new(&config).unwrap();
        assert_eq!(provider.embed_many(&[]).unwrap(), Vec::<Vec<f32>>::new());
    }
}
