//! Line-based interactive chat: slash commands plus streamed replies.

use std::cell::RefCell;
use std::error::Error;
use std::io::{self, Write};
use std::time::Instant;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::commands::{process_input, CommandResult};
use crate::core::completion::openai::format_api_error;
use crate::core::context::ChatContext;
use crate::core::error::ChatError;
use crate::core::session::conversation::MessageInput;
use crate::ui::renderer::{RenderCadence, StreamingRenderer, TerminalView};

const PROMPT: &str = "› ";

pub async fn run_chat(mut ctx: ChatContext, cadence: RenderCadence) -> Result<(), Box<dyn Error>> {
    print_banner(&ctx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{PROMPT}");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        ctx.refresh_usage(Utc::now());

        match process_input(&mut ctx, &line) {
            CommandResult::Reply(text) => println!("{text}"),
            CommandResult::Quit => break,
            CommandResult::ProcessAsMessage(text) => {
                stream_reply(&mut ctx, Some(MessageInput::text(text)), cadence).await
            }
            CommandResult::Retry => stream_reply(&mut ctx, None, cadence).await,
        }
    }
    Ok(())
}

fn print_banner(ctx: &ChatContext) {
    match ctx.client().active_selection() {
        Some(selection) => println!(
            "chatdesk · {} {} · /help for commands, Ctrl+C stops a reply or exits",
            selection.provider, selection.model
        ),
        None => println!("chatdesk · no model selected, use /model <provider> <model>"),
    }
}

/// Sends `input` (or retries the last failure when `None`) and streams the
/// reply to stdout. Ctrl+C cancels the request.
async fn stream_reply(ctx: &mut ChatContext, input: Option<MessageInput>, cadence: RenderCadence) {
    let stream_id = ctx.start_stream();
    let renderer = RefCell::new(StreamingRenderer::new(TerminalView::new(io::stdout()), cadence));
    renderer.borrow_mut().begin(stream_id);

    let cancel = CancellationToken::new();
    let result = {
        let mut on_chunk = |text: &str| {
            let mut renderer = renderer.borrow_mut();
            renderer.push(stream_id, text, Instant::now());
            renderer.tick(Instant::now());
        };
        let send = async {
            match input {
                Some(input) => ctx.send(input, Some(cancel.clone()), &mut on_chunk).await,
                None => ctx.retry(Some(cancel.clone()), &mut on_chunk).await,
            }
        };
        tokio::pin!(send);
        let mut frames = tokio::time::interval(cadence.frame);

        loop {
            tokio::select! {
                result = &mut send => break result,
                _ = frames.tick() => renderer.borrow_mut().tick(Instant::now()),
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
            }
        }
    };

    let mut renderer = renderer.into_inner();
    match result {
        Ok(response) => {
            renderer.complete(stream_id, &response.text);
        }
        Err(err) => {
            let had_output = !renderer.visible_text().is_empty();
            renderer.cancel();
            if had_output {
                println!();
            }
            report_send_error(&err);
        }
    }
}

fn report_send_error(err: &ChatError) {
    eprintln!("{}", describe_send_error(err));
}

fn describe_send_error(err: &ChatError) -> String {
    match err {
        ChatError::Cancelled => "⏹️  Reply cancelled. Type /retry to send it again.".to_string(),
        ChatError::LimitReached { .. } => format!("⚠️  {err}"),
        ChatError::NoActiveModel => format!("❌ {err}. Pick one with /model <provider> <model>."),
        ChatError::Provider { status, body } => format!(
            "❌ {}\nType /retry to send it again.",
            format_api_error(*status, body)
        ),
        _ => format!("❌ {err}. Type /retry to send it again."),
    }
}
