//! Progress events emitted while a turn runs.
//!
//! Single consumer: the loop pushes into an unbounded channel and the caller
//! drains it (UI, log tail, test assertions). A dropped receiver silently
//! disables emission rather than failing the turn.

use tokio::sync::mpsc;

/// What the loop is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// A new iteration started (1-based).
    IterationStarted { number: usize, max: usize },
    /// The model produced assistant text.
    AssistantText { text: String },
    /// A tool call is about to run.
    ToolStarted { call_id: String, name: String },
    /// A tool call finished.
    ToolFinished {
        call_id: String,
        name: String,
        succeeded: bool,
        elapsed_ms: u64,
    },
}

/// Fire-and-forget event sink.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<LoopEvent>>,
}

impl ProgressSender {
    pub fn new(tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sender that drops every event. Used when no one is listening.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: LoopEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the caller stopped caring, not an error.
            let _ = tx.send(event);
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = ProgressSender::new(tx);
        sender.emit(LoopEvent::AssistantText { text: "hi".into() });
        assert_eq!(
            rx.try_recv().unwrap(),
            LoopEvent::AssistantText { text: "hi".into() }
        );
    }

    #[test]
    fn test_emit_after_receiver_drop_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sender = ProgressSender::new(tx);
        sender.emit(LoopEvent::AssistantText { text: "hi".into() });
    }

    #[test]
    fn test_disabled_sender_drops_events() {
        ProgressSender::disabled().emit(LoopEvent::IterationStarted { number: 1, max: 5 });
    }
}
