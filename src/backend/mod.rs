//! External collaborators
//!
//! Trait seams for reasoning, observation, execution and notification, with
//! HTTP implementations and deterministic mocks.

mod connectors;
mod executors;
pub mod mock;
mod notify;
mod openai;
mod registry;
mod traits;

pub use connectors::HttpConnector;
pub use executors::{HttpActionExecutor, LoggingExecutor};
pub use mock::{MockReasoning, RecordingExecutor, RecordingSink, ScriptedConnector, ANY_TOPIC};
pub use notify::{LogSink, WebhookSink};
pub use openai::OpenAiReasoning;
pub use registry::{Collaborators, ReasoningProvider};
pub use traits::*;
