// # ddns-core
//
// Core library for the DDNS update agent.
//
// ## Architecture Overview
//
// The agent keeps a set of provider DNS records pointed at the host's public
// IP. One worker runs a periodic cycle:
// - **ConfigLoader**: reads the declarative configuration and detects changes
// - **AgentRuntime**: determines the public IP and updates each target
// - **URL Guard**: validates every outbound URL before a request is made
// - **Response Interpreter**: classifies provider responses into success/error
// - **StateStore**: durable update history and IP cache
//
// Network access, token decryption and storage sit behind traits
// (`HttpClient`, `TokenDecryptor`, `StateStore`) so the runtime can be driven
// entirely by test doubles.
//
// ## Design Principles
//
// 1. **Failure Isolation**: a fault in one target never aborts the others
// 2. **No Secret Leakage**: decrypted tokens never reach a log or a record
// 3. **Library-First**: the daemon is a thin shell around `AgentRuntime`
// 4. **Idempotency**: per-target cache entries avoid redundant provider calls

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod response;
pub mod settings;
pub mod state;
pub mod traits;
pub mod url_guard;

// Re-export core types for convenience
pub use config::{AgentConfig, ConfigLoader, TargetConfig};
pub use crypto::AesGcmTokenCipher;
pub use engine::{AgentRuntime, CycleReport, IpSource, RuntimeSignals, TargetOutcome};
pub use error::{Error, Result};
pub use settings::AgentSettings;
pub use state::{MemoryStateStore, SqliteStateStore};
pub use traits::{HttpClient, StateStore, TokenDecryptor};
