//! Terminal output for interactive chat sessions.
//!
//! - [`chat_loop`]: reads lines, dispatches them to [`crate::commands`] and
//!   streams replies through the renderer.
//! - [`renderer`]: debounced, frame-paced reveal of streamed text.
//!
//! Domain logic stays in [`crate::core`]; this layer only presents it.

pub mod chat_loop;
pub mod renderer;
