mod registry;

pub use registry::{all_commands, CommandInvocation};

use crate::core::completion::ReasoningEffort;
use crate::core::context::ChatContext;
use crate::core::error::UsageTier;
use crate::core::store::StoreAction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Text to show the user; nothing is sent.
    Reply(String),
    ProcessAsMessage(String),
    Retry,
    Quit,
}

pub fn process_input(ctx: &mut ChatContext, input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let mut parts = rest.splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    match registry::find_command(command_name) {
        Some(command) => {
            (command.handler)(ctx, CommandInvocation { args })
        }
        None => CommandResult::Reply(format!(
            "Unknown command /{command_name}. Type /help for a list."
        )),
    }
}

fn failure(err: impl std::fmt::Display) -> CommandResult {
    CommandResult::Reply(format!("❌ {err}"))
}

/// Resolves a full id or an unambiguous prefix of one.
fn resolve_conversation_id(ctx: &ChatContext, wanted: &str) -> Result<String, String> {
    let conversations = &ctx.store().state().chat.conversations;
    if let Some(exact) = conversations.iter().find(|c| c.id == wanted) {
        return Ok(exact.id.clone());
    }
    let matches: Vec<&str> = conversations
        .iter()
        .filter(|c| c.id.starts_with(wanted))
        .map(|c| c.id.as_str())
        .collect();
    match matches.as_slice() {
        [only] => Ok(only.to_string()),
        [] => Err(format!("No conversation matches '{wanted}'")),
        _ => Err(format!("'{wanted}' matches {} conversations", matches.len())),
    }
}

pub(super) fn handle_help(_ctx: &mut ChatContext, _invocation: CommandInvocation<'_>) -> CommandResult {
    let mut help = String::from("Commands:");
    for command in all_commands() {
        help.push_str(&format!("\n  {:<48} {}", command.usage, command.help));
    }
    CommandResult::Reply(help)
}

pub(super) fn handle_new(ctx: &mut ChatContext, _invocation: CommandInvocation<'_>) -> CommandResult {
    match ctx.new_conversation() {
        Ok(id) => CommandResult::Reply(format!("✅ Started conversation {id}")),
        Err(err) => failure(err),
    }
}

pub(super) fn handle_list(ctx: &mut ChatContext, _invocation: CommandInvocation<'_>) -> CommandResult {
    let chat = &ctx.store().state().chat;
    if chat.conversations.is_empty() {
        return CommandResult::Reply("No conversations yet.".to_string());
    }
    let lines: Vec<String> = chat
        .conversations
        .iter()
        .map(|c| {
            let marker = if chat.active_conversation_id.as_deref() == Some(c.id.as_str()) {
                '*'
            } else {
                ' '
            };
            format!(
                "{marker} {}  {}  ({} messages, {})",
                c.id,
                c.title,
                c.message_count,
                c.updated_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect();
    CommandResult::Reply(lines.join("\n"))
}

pub(super) fn handle_switch(ctx: &mut ChatContext, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        return CommandResult::Reply("Usage: /switch <id>".to_string());
    }
    let id = match resolve_conversation_id(ctx, invocation.args) {
        Ok(id) => id,
        Err(message) => return failure(message),
    };
    match ctx.switch_conversation(&id) {
        Ok(()) => CommandResult::Reply(format!("Switched to {id}")),
        Err(err) => failure(err),
    }
}

pub(super) fn handle_delete(ctx: &mut ChatContext, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        return CommandResult::Reply("Usage: /delete <id>".to_string());
    }
    let id = match resolve_conversation_id(ctx, invocation.args) {
        Ok(id) => id,
        Err(message) => return failure(message),
    };
    match ctx.delete_conversation(&id) {
        Ok(true) => CommandResult::Reply(format!("🗑️  Deleted {id}")),
        Ok(false) => failure(format!("No conversation {id}")),
        Err(err) => failure(err),
    }
}

pub(super) fn handle_retry(ctx: &mut ChatContext, _invocation: CommandInvocation<'_>) -> CommandResult {
    if ctx.session().last_failed_input().is_none() {
        return CommandResult::Reply("Nothing to retry.".to_string());
    }
    CommandResult::Retry
}

pub(super) fn handle_model(ctx: &mut ChatContext, invocation: CommandInvocation<'_>) -> CommandResult {
    let parts: Vec<&str> = invocation.args.split_whitespace().collect();
    match parts.as_slice() {
        [] => match ctx.client().active_model_info() {
            Some(info) => {
                let provider = ctx
                    .client()
                    .active_selection()
                    .map(|s| s.provider.as_str())
                    .unwrap_or_default();
                CommandResult::Reply(format!(
                    "Active model: {provider} {} ({}, {:?})",
                    info.id, info.name, info.category
                ))
            }
            None => CommandResult::Reply("No model selected.".to_string()),
        },
        [provider, model, rest @ ..] => {
            let effort = match rest {
                [] => None,
                [effort] => match effort.parse::<ReasoningEffort>() {
                    Ok(effort) => Some(effort),
                    Err(err) => return failure(err),
                },
                _ => return CommandResult::Reply("Usage: /model <provider> <model> [effort]".to_string()),
            };
            match ctx.select_model(provider, model, effort) {
                Ok(selection) => CommandResult::Reply(format!(
                    "✅ Using {} {}",
                    selection.provider, selection.model
                )),
                Err(err) => failure(err),
            }
        }
        _ => CommandResult::Reply("Usage: /model <provider> <model> [effort]".to_string()),
    }
}

pub(super) fn handle_memory(ctx: &mut ChatContext, invocation: CommandInvocation<'_>) -> CommandResult {
    let enabled = match invocation.args.to_ascii_lowercase().as_str() {
        "on" => true,
        "off" => false,
        "" => {
            let state = if ctx.store().state().settings.memory_enabled {
                "on"
            } else {
                "off"
            };
            return CommandResult::Reply(format!("Memory is {state}."));
        }
        _ => return CommandResult::Reply("Usage: /memory on|off".to_string()),
    };
    match ctx.store_mut().dispatch(StoreAction::SetMemoryEnabled(enabled)) {
        Ok(()) => CommandResult::Reply(format!(
            "Memory {}.",
            if enabled { "enabled" } else { "disabled" }
        )),
        Err(err) => failure(err),
    }
}

pub(super) fn handle_usage(ctx: &mut ChatContext, _invocation: CommandInvocation<'_>) -> CommandResult {
    let usage = ctx.session().usage();
    CommandResult::Reply(format!(
        "{}: {}/{} used\n{}: {}/{} used\nResets {}",
        UsageTier::Standard,
        usage.standard_count,
        usage.standard_limit,
        UsageTier::Premium,
        usage.premium_count,
        usage.premium_limit,
        usage.reset_at.format("%Y-%m-%d %H:%M UTC")
    ))
}

pub(super) fn handle_quit(_ctx: &mut ChatContext, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Quit
}
