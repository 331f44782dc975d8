//! One-shot "say" command: sends a prompt into a fresh conversation and
//! streams the reply to stdout.

use std::cell::RefCell;
use std::error::Error;
use std::io;
use std::time::Instant;

use crate::core::completion::openai::format_api_error;
use crate::core::context::ChatContext;
use crate::core::error::ChatError;
use crate::ui::renderer::{RenderCadence, StreamingRenderer, TerminalView};

pub async fn run_say(
    mut ctx: ChatContext,
    prompt: String,
    cadence: RenderCadence,
) -> Result<(), Box<dyn Error>> {
    ctx.new_conversation()?;

    let stream_id = ctx.start_stream();
    let renderer = RefCell::new(StreamingRenderer::new(TerminalView::new(io::stdout()), cadence));
    renderer.borrow_mut().begin(stream_id);

    let result = {
        let mut on_chunk = |text: &str| {
            let mut renderer = renderer.borrow_mut();
            renderer.push(stream_id, text, Instant::now());
            renderer.tick(Instant::now());
        };
        let send = ctx.send(prompt.into(), None, &mut on_chunk);
        tokio::pin!(send);
        let mut frames = tokio::time::interval(cadence.frame);
        loop {
            tokio::select! {
                result = &mut send => break result,
                _ = frames.tick() => renderer.borrow_mut().tick(Instant::now()),
            }
        }
    };

    let mut renderer = renderer.into_inner();
    match result {
        Ok(response) => {
            renderer.complete(stream_id, &response.text);
            Ok(())
        }
        Err(err) => {
            if !renderer.visible_text().is_empty() {
                println!();
            }
            renderer.cancel();
            match err {
                ChatError::Provider { status, body } => Err(format_api_error(status, &body).into()),
                err => Err(err.into()),
            }
        }
    }
}
