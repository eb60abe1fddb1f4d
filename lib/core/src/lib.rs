//! Core domain types and utilities for the chatflow platform.
//!
//! This crate provides the foundational typed identifiers and the shared
//! error handling alias used throughout the chatflow messaging-automation
//! engine.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AccountId, ChainId, ContactId, FlowId, ParseIdError};
