//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Adapts Telegram messages to the dialogue and sends replies
//! - `dialogue_manager`: Runs the report conversation against the store and gateways
//! - `ui_builder`: Creates keyboards and formats messages

pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;

// Re-export main handler function for use in main.rs
pub use message_handler::message_handler;

pub use dialogue_manager::{DialogueManager, FinalizedReport, Inbound, Outcome, TurnError};
pub use ui_builder::{Keyboard, Reply};
