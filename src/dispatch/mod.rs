pub mod http;

use bytes::Bytes;
use futures_util::Stream;
use futures_util::stream::BoxStream;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{self, Config};
use crate::error::GaleError;
use crate::message::{Message, PromptNames};
use crate::prompt::flatten::{flatten_conversation, is_text_completion_model};
use crate::prompt::{MergeVariant, post_process};

/// Caller-supplied prompt: a structured conversation, or a bare string used
/// verbatim as a text-completion prompt.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    Conversation(Vec<Message>),
    Raw(String),
}

/// Inbound generation request as the routing layer hands it over.
#[derive(Clone, Debug, Deserialize)]
pub struct GenerateRequest {
    /// Provider variant name; decides the merge variant.
    #[serde(default)]
    pub chat_completion_source: Option<String>,
    pub model: String,
    pub messages: PromptInput,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub max_completion_tokens: Option<u64>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<u64>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub logit_bias: Option<Value>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub n: Option<u64>,
    /// Top-logprob count; zero means logprobs are not requested.
    #[serde(default)]
    pub logprobs: Option<u32>,
    #[serde(default)]
    pub tools: Option<Vec<Value>>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub char_name: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub group_names: Option<Vec<String>>,
    /// Caller-supplied endpoint override; its credential is `proxy_password`.
    #[serde(default)]
    pub reverse_proxy: Option<String>,
    #[serde(default)]
    pub proxy_password: Option<String>,
}

impl GenerateRequest {
    pub fn prompt_names(&self) -> PromptNames {
        PromptNames {
            char_name: self.char_name.clone().unwrap_or_default(),
            user_name: self.user_name.clone().unwrap_or_default(),
            group_names: self.group_names.clone().unwrap_or_default(),
        }
    }
}

/// Canonical upstream payload. Exactly one of `messages`/`prompt` is present.
#[derive(Clone, Debug, Serialize)]
pub struct UpstreamRequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u64>,
    pub stream: bool,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub n: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
}

/// Build the canonical payload: pick chat-array vs. flat-prompt style, run
/// the merge variant for the provider, and copy sampling parameters with
/// their documented defaults.
pub fn build_body(request: &GenerateRequest) -> UpstreamRequestBody {
    let names = request.prompt_names();
    let is_flat = is_text_completion_model(&request.model)
        || matches!(request.messages, PromptInput::Raw(_));

    let (messages, prompt) = match (&request.messages, is_flat) {
        (PromptInput::Raw(text), _) => (None, Some(text.clone())),
        (PromptInput::Conversation(messages), true) => {
            (None, Some(flatten_conversation(messages)))
        }
        (PromptInput::Conversation(messages), false) => {
            let source = request.chat_completion_source.as_deref().unwrap_or_default();
            let variant = MergeVariant::for_source(source);
            (Some(post_process(messages.clone(), variant, &names)), None)
        }
    };

    // Tool definitions only make sense for the chat-array style.
    let tools = match (&messages, &request.tools) {
        (Some(_), Some(tools)) if !tools.is_empty() => Some(tools.clone()),
        _ => None,
    };
    let tool_choice = if tools.is_some() {
        request.tool_choice.clone()
    } else {
        None
    };

    let (top_logprobs, logprobs) = match request.logprobs {
        Some(count) if count > 0 => (Some(count), Some(true)),
        _ => (None, None),
    };

    UpstreamRequestBody {
        messages,
        prompt,
        model: request.model.clone(),
        temperature: request.temperature.unwrap_or(config::DEFAULT_TEMPERATURE),
        max_tokens: request.max_tokens.unwrap_or(config::DEFAULT_MAX_TOKENS),
        max_completion_tokens: request.max_completion_tokens,
        stream: request.stream,
        presence_penalty: request
            .presence_penalty
            .unwrap_or(config::DEFAULT_PRESENCE_PENALTY),
        frequency_penalty: request
            .frequency_penalty
            .unwrap_or(config::DEFAULT_FREQUENCY_PENALTY),
        top_p: request.top_p.unwrap_or(config::DEFAULT_TOP_P),
        top_k: request.top_k,
        stop: request.stop.clone().filter(|stop| !stop.is_empty()),
        logit_bias: request.logit_bias.clone(),
        seed: request.seed,
        n: request.n.unwrap_or(config::DEFAULT_N),
        tools,
        tool_choice,
        top_logprobs,
        logprobs,
    }
}

/// Resolved upstream endpoint: the configured provider, or a caller-supplied
/// reverse proxy carrying its own credential.
#[derive(Clone)]
pub struct UpstreamTarget {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for UpstreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamTarget")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl UpstreamTarget {
    /// A missing configured credential is fatal unless the request routes
    /// through a reverse proxy.
    pub fn resolve(
        config: &Config,
        reverse_proxy: Option<&str>,
        proxy_password: Option<&str>,
    ) -> Result<Self, GaleError> {
        if let Some(proxy) = reverse_proxy {
            return Ok(UpstreamTarget {
                base_url: proxy.trim_end_matches('/').to_string(),
                api_key: proxy_password
                    .map(str::to_string)
                    .filter(|password| !password.is_empty()),
            });
        }

        match &config.api_key {
            Some(key) => Ok(UpstreamTarget {
                base_url: config.api_url.trim_end_matches('/').to_string(),
                api_key: Some(key.clone()),
            }),
            None => Err(GaleError::MissingCredential),
        }
    }

    pub fn for_request(config: &Config, request: &GenerateRequest) -> Result<Self, GaleError> {
        Self::resolve(
            config,
            request.reverse_proxy.as_deref(),
            request.proxy_password.as_deref(),
        )
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Terminal outcome of a dispatch. Cancellation is an outcome, not an error:
/// callers need to tell a client walking away apart from upstream failure.
pub enum DispatchOutcome {
    /// Buffered 200 response, parsed as JSON.
    Completed(Value),
    /// Live relay of the upstream response body.
    Streaming(ChunkStream),
    /// The cancellation signal was set before or during the request.
    Cancelled,
}

impl std::fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed(value) => f.debug_tuple("Completed").field(value).finish(),
            Self::Streaming(stream) => f
                .debug_struct("Streaming")
                .field("status", &stream.status)
                .finish_non_exhaustive(),
            Self::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// Lazy, finite, non-restartable sequence of upstream body chunks, with the
/// upstream status and headers alongside so the embedding layer can pass
/// them through. Ends cleanly (no error) if the request is cancelled
/// mid-stream; partial delivery is expected.
pub struct ChunkStream {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub(crate) chunks: BoxStream<'static, Result<Bytes, GaleError>>,
}

impl Stream for ChunkStream {
    type Item = Result<Bytes, GaleError>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().chunks.as_mut().poll_next(cx)
    }
}
