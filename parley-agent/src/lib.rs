// ABOUTME: Agent side of parley - message records, the backend trait and the handles that drive backends.
// ABOUTME: Ships LLM persona, direct CLI and mock backends plus the model collaborator client.

pub mod backends;
pub mod config;
pub mod event;
pub mod handle;
pub mod model;
pub mod record;
pub mod registry;
pub mod testing;
pub mod traits;

pub use config::BackendConfig;
pub use event::{AgentEvent, ErrorCode, Usage};
pub use handle::{AgentHandle, BusyGuard, EventReceiver};
pub use model::{complete_json_or, ModelClient, ModelRequest, ModelSettings, OpenAiClient};
pub use record::{format_batch, MessageRecord};
pub use registry::{BackendContext, BackendFactory, BackendRegistry};
pub use traits::AgentBackend;
