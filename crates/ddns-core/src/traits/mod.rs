//! Core traits for the DDNS agent
//!
//! This module defines the seams the runtime talks through.
//!
//! - [`StateStore`]: Append-only update history and key/value cache
//! - [`HttpClient`]: Bounded-timeout GET requests (IP lookup, provider updates)
//! - [`TokenDecryptor`]: Decryption of per-target provider tokens

pub mod http_client;
pub mod secret;
pub mod state_store;

pub use http_client::{HttpClient, HttpResponse};
pub use secret::{SecretToken, TokenDecryptor};
pub use state_store::{CacheEntry, StateStore, UpdateRecord, UpdateStatus};
