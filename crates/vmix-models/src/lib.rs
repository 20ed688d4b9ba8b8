//! Shared data models for the VMix backend.
//!
//! This crate provides Serde-serializable types for:
//! - Media requests and their validation rules
//! - Task identifiers and lifecycle phases
//! - API response payloads

pub mod request;
pub mod response;
pub mod task;

// Re-export common types
pub use request::{
    block_order_key, combination_count, ordered_block_names, MediaRequest, RequestError,
    RequestResult, SpeechText,
};
pub use response::{AcceptedResponse, ProcessingSummary};
pub use task::{ChainState, TaskId, TaskPhase};
