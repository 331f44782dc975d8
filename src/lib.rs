//! chatdesk is a terminal chat client with persistent conversations, weekly
//! usage quotas and streamed completions from OpenAI-compatible providers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the state store, conversation sessions, storage backends,
//!   provider registration and the streaming completion client.
//! - [`ui`] paces streamed text onto the terminal and runs the line-based
//!   chat loop.
//! - [`commands`] implements slash-command parsing and execution used by the
//!   chat loop.
//! - [`api`] defines the chat completion payloads sent to providers.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], which
//! builds a [`core::context::ChatContext`] and dispatches into
//! [`ui::chat_loop`] for interactive sessions.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;
