//! Chat-completion gateway core.
//!
//! Accepts an application-level conversation (ordered role-tagged messages,
//! possibly multimodal), normalizes it into the canonical form the upstream
//! provider expects, and relays the completion back to the caller, buffered
//! or streamed, honoring client cancellation and provider rate limiting.
//! The HTTP server, authentication, and storage layers live in the embedding
//! service.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod prompt;
pub mod registry;

pub use config::Config;
pub use dispatch::http::{HttpDispatch, RetryPolicy};
pub use dispatch::{
    ChunkStream, DispatchOutcome, GenerateRequest, PromptInput, UpstreamRequestBody,
    UpstreamTarget, build_body,
};
pub use error::{CANCELLED_STATUS, GaleError};
pub use message::{ContentPart, Message, MessageContent, PromptNames, Role};
pub use prompt::{MergeVariant, post_process};
pub use registry::RequestRegistry;
