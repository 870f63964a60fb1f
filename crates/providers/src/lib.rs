//! Completion service implementations.
//!
//! The engine only knows the `CompletionService` trait; these are the
//! concrete backends: an OpenAI-compatible HTTP client for deployment and
//! scripted doubles for tests and offline demos.

pub mod http;
pub mod mock;

pub use http::HttpCompletionService;
pub use mock::{FailingCompletion, HangingCompletion, ScriptedCompletion};
