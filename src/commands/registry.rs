use super::CommandResult;
use crate::core::context::ChatContext;

pub type CommandHandler = fn(&mut ChatContext, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "new",
        usage: "/new",
        help: "Start a new conversation.",
        handler: super::handle_new,
    },
    Command {
        name: "list",
        usage: "/list",
        help: "List conversations, most recent first.",
        handler: super::handle_list,
    },
    Command {
        name: "switch",
        usage: "/switch <id>",
        help: "Make another conversation active (an unambiguous id prefix works).",
        handler: super::handle_switch,
    },
    Command {
        name: "delete",
        usage: "/delete <id>",
        help: "Delete a conversation and its attachments.",
        handler: super::handle_delete,
    },
    Command {
        name: "retry",
        usage: "/retry",
        help: "Resend the last message that failed.",
        handler: super::handle_retry,
    },
    Command {
        name: "model",
        usage: "/model [<provider> <model> [low|medium|high]]",
        help: "Show or change the active model.",
        handler: super::handle_model,
    },
    Command {
        name: "memory",
        usage: "/memory on|off",
        help: "Send earlier messages as context, or only the current one.",
        handler: super::handle_memory,
    },
    Command {
        name: "usage",
        usage: "/usage",
        help: "Show this week's quota usage.",
        handler: super::handle_usage,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave chatdesk.",
        handler: super::handle_quit,
    },
];
