//! OpenAI-compatible blocking chat provider.
//!
//! Intentionally synchronous (`reqwest::blocking`): the summariser pool runs
//! on plain threads and must not require a tokio runtime.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SummariseError;
use crate::summariser::{SummaryOptions, Summariser};

#[derive(Clone)]
pub struct OpenAiCompatibleSummariser {
    base_url: Url,
    model: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl OpenAiCompatibleSummariser {
    pub fn new(
        base_url: Url,
        model: impl Into<String>,
        timeout: Duration,
        api_key: Option<&str>,
    ) -> Result<Self, SummariseError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| SummariseError::Fatal(format!("invalid api key header: {e}")))?,
            );
        }
        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SummariseError::Fatal(e.to_string()))?;

        Ok(Self {
            base_url,
            model: model.into(),
            timeout,
            client,
        })
    }

    fn endpoint(&self) -> Result<Url, SummariseError> {
        // Accept both http://host:port and http://host:port/v1.
        let base = self.base_url.as_str().trim_end_matches('/');
        let url = if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        };
        Url::parse(&url).map_err(|e| SummariseError::Fatal(e.to_string()))
    }
}

impl Summariser for OpenAiCompatibleSummariser {
    fn generate(&self, prompt: &str, options: &SummaryOptions) -> Result<String, SummariseError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(self.endpoint()?)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("provider returned {status}");
            // Rate limits and server-side trouble are worth retrying;
            // auth/schema rejections are not.
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(SummariseError::Transient(message))
            } else {
                Err(SummariseError::Fatal(message))
            };
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| SummariseError::Fatal(format!("malformed provider response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| SummariseError::Fatal("missing choices[0].message.content".into()))
    }
}

fn classify_transport_error(err: reqwest::Error) -> SummariseError {
    if err.is_timeout() || err.is_connect() {
        SummariseError::Transient(err.to_string())
    } else {
        SummariseError::Fatal(err.to_string())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}
