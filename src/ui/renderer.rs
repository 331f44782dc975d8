//! Debounced, animated display of cumulative streaming text.
//!
//! Providers report the whole reply so far on every update. The renderer
//! coalesces updates that arrive close together, reveals new text a few
//! graphemes per frame, and snaps to the exact final text on completion.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(30);
pub const DEFAULT_FRAME: Duration = Duration::from_millis(16);
pub const DEFAULT_GRAPHEMES_PER_FRAME: usize = 3;

/// Where rendered text ends up.
pub trait RenderTarget {
    /// Shows `visible` as the complete text of the current stream.
    fn render(&mut self, visible: &str) -> io::Result<()>;

    /// Final text for the stream. Nothing else is rendered until the next
    /// [`StreamingRenderer::begin`].
    fn finish(&mut self, full_text: &str) -> io::Result<()>;

    /// Clears any per-stream state when a new stream starts.
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCadence {
    pub debounce: Duration,
    pub frame: Duration,
    pub graphemes_per_frame: usize,
}

impl Default for RenderCadence {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            frame: DEFAULT_FRAME,
            graphemes_per_frame: DEFAULT_GRAPHEMES_PER_FRAME,
        }
    }
}

#[derive(Debug)]
struct Animation {
    goal: String,
    started_at: Instant,
    start_graphemes: usize,
}

pub struct StreamingRenderer<T: RenderTarget> {
    target: T,
    cadence: RenderCadence,
    stream_id: Option<u64>,
    completed: bool,
    visible: String,
    pending: Option<(String, Instant)>,
    animation: Option<Animation>,
}

impl<T: RenderTarget> StreamingRenderer<T> {
    pub fn new(target: T, cadence: RenderCadence) -> Self {
        Self {
            target,
            cadence,
            stream_id: None,
            completed: false,
            visible: String::new(),
            pending: None,
            animation: None,
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn into_target(self) -> T {
        self.target
    }

    pub fn visible_text(&self) -> &str {
        &self.visible
    }

    pub fn current_stream(&self) -> Option<u64> {
        self.stream_id
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.animation.is_none()
    }

    /// Starts rendering `stream_id`, dropping whatever the previous stream
    /// still had queued.
    pub fn begin(&mut self, stream_id: u64) {
        self.cancel();
        self.stream_id = Some(stream_id);
        self.target.reset();
    }

    /// Stops the current stream. Later chunks for it are discarded.
    pub fn cancel(&mut self) {
        self.stream_id = None;
        self.completed = false;
        self.visible.clear();
        self.pending = None;
        self.animation = None;
    }

    fn accepts(&self, stream_id: u64) -> bool {
        self.stream_id == Some(stream_id) && !self.completed
    }

    /// Queues the cumulative text of `stream_id`. Returns false when the
    /// chunk is stale or arrives after completion.
    pub fn push(&mut self, stream_id: u64, cumulative: &str, now: Instant) -> bool {
        if !self.accepts(stream_id) {
            debug!(stream_id, "discarding late or stale chunk");
            return false;
        }

        let first_update = self.visible.is_empty() && self.pending.is_none() && self.animation.is_none();
        if first_update {
            self.show(cumulative.to_string());
        } else {
            self.pending = Some((cumulative.to_string(), now));
        }
        true
    }

    /// Advances debounce and animation to `now`.
    pub fn tick(&mut self, now: Instant) {
        if self.completed {
            return;
        }

        if let Some((_, queued_at)) = &self.pending {
            if now.saturating_duration_since(*queued_at) >= self.cadence.debounce {
                if let Some((goal, _)) = self.pending.take() {
                    self.start_animation(goal, now);
                }
            }
        }

        let Some(animation) = &self.animation else {
            return;
        };
        let frames = frames_elapsed(now.saturating_duration_since(animation.started_at), self.cadence.frame);
        let reveal = animation
            .start_graphemes
            .saturating_add(frames.saturating_mul(self.cadence.graphemes_per_frame));
        let end = grapheme_prefix_len(&animation.goal, reveal);
        let done = end == animation.goal.len();
        let next = animation.goal[..end].to_string();
        if done {
            self.animation = None;
        }
        if next != self.visible {
            self.show(next);
        }
    }

    fn start_animation(&mut self, goal: String, now: Instant) {
        if !goal.starts_with(self.visible.as_str()) {
            // Not an extension of what is on screen; redraw without animating.
            self.animation = None;
            self.show(goal);
            return;
        }
        let shown = self.visible.len();
        let start_graphemes = goal
            .grapheme_indices(true)
            .take_while(|(index, grapheme)| index + grapheme.len() <= shown)
            .count();
        self.animation = Some(Animation {
            goal,
            started_at: now,
            start_graphemes,
        });
    }

    /// Renders the exact final text at once. Duplicate or stale completes
    /// are ignored.
    pub fn complete(&mut self, stream_id: u64, full_text: &str) -> bool {
        if !self.accepts(stream_id) {
            debug!(stream_id, "ignoring duplicate or stale completion");
            return false;
        }
        self.pending = None;
        self.animation = None;
        self.completed = true;
        self.visible = full_text.to_string();
        if let Err(err) = self.target.finish(full_text) {
            warn!("failed to render final text: {err}");
        }
        true
    }

    fn show(&mut self, text: String) {
        self.visible = text;
        if let Err(err) = self.target.render(&self.visible) {
            warn!("failed to render streaming text: {err}");
        }
    }
}

/// Frame index at `elapsed`, counting the frame that starts immediately.
fn frames_elapsed(elapsed: Duration, frame: Duration) -> usize {
    if frame.is_zero() {
        return usize::MAX;
    }
    (elapsed.as_nanos() / frame.as_nanos()) as usize + 1
}

fn grapheme_prefix_len(text: &str, graphemes: usize) -> usize {
    text.grapheme_indices(true)
        .nth(graphemes)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}

/// Terminal target that appends only the newly revealed suffix.
pub struct TerminalView<W: Write> {
    out: W,
    written: String,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            written: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderTarget for TerminalView<W> {
    fn render(&mut self, visible: &str) -> io::Result<()> {
        match visible.strip_prefix(self.written.as_str()) {
            Some(suffix) => self.out.write_all(suffix.as_bytes())?,
            None => {
                // The text changed behind the cursor; start a fresh line.
                writeln!(self.out)?;
                self.out.write_all(visible.as_bytes())?;
            }
        }
        self.written = visible.to_string();
        self.out.flush()
    }

    fn finish(&mut self, full_text: &str) -> io::Result<()> {
        self.render(full_text)?;
        writeln!(self.out)?;
        self.written.clear();
        self.out.flush()
    }

    fn reset(&mut self) {
        self.written.clear();
    }
}
