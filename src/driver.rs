//! Turn driver - the single consumer of a turn queue
//!
//! Parses input lines into queue items, gates turns on a [`TurnGate`], and
//! turns each dequeued batch into one outgoing [`Turn`]. Timing is the
//! caller's business: `poll` when a turn might start, `finish_turn` when the
//! streaming turn ends.

use serde::Serialize;
use turnline_core::{
    ClearReason, Content, ContentPart, DequeuedBatch, ItemKind, ItemPayload, NewQueueItem,
    QueueItem,
};
use turnline_queue::{merge_queued_turn_input, QueueRuntime, QueuedTurnInput, TurnGate};

/// One parsed line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputLine {
    Enqueue(NewQueueItem),
    /// Store text and reference it from later messages by placeholder
    Paste(String),
    Clear,
    Empty,
}

/// `/approve`, `/overlay`, `/notify`, `/paste` and `/clear` are commands;
/// anything else is a user message.
pub fn parse_line(line: &str) -> InputLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return InputLine::Empty;
    }
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "/approve" => InputLine::Enqueue(NewQueueItem::approval_result(rest)),
        "/overlay" => InputLine::Enqueue(NewQueueItem::overlay_action(rest)),
        "/notify" => InputLine::Enqueue(NewQueueItem::task_notification(format!(
            "<task-notification>{}</task-notification>",
            rest
        ))),
        "/paste" => InputLine::Paste(rest.to_string()),
        "/clear" => InputLine::Clear,
        _ => InputLine::Enqueue(NewQueueItem::message(line)),
    }
}

/// Pasted blocks, referenced from messages as `[Pasted text #n]`.
#[derive(Debug, Default, Clone)]
pub struct PasteStore {
    entries: Vec<String>,
}

impl PasteStore {
    pub fn placeholder(n: usize) -> String {
        format!("[Pasted text #{}]", n)
    }

    /// Store `text`, returning its placeholder.
    pub fn register(&mut self, text: impl Into<String>) -> String {
        self.entries.push(text.into());
        Self::placeholder(self.entries.len())
    }

    /// Replace every known placeholder in the text parts of `content`.
    pub fn resolve(&self, content: &Content) -> Content {
        match content {
            Content::Text(text) => Content::Text(self.expand(text)),
            Content::Parts(parts) => Content::Parts(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => ContentPart::text(self.expand(text)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
        }
    }

    fn expand(&self, text: &str) -> String {
        self.entries
            .iter()
            .enumerate()
            .fold(text.to_string(), |acc, (i, entry)| {
                acc.replace(&Self::placeholder(i + 1), entry)
            })
    }
}

/// What one started turn sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnPayload {
    /// Coalesced chat content
    Merged { content: Content },
    /// A single approval result or overlay action
    Barrier { kind: ItemKind, text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub batch_id: String,
    pub item_count: usize,
    pub queue_len_after: usize,
    pub payload: TurnPayload,
}

#[derive(Debug)]
pub struct TurnDriver {
    runtime: QueueRuntime,
    gate: TurnGate,
    pastes: PasteStore,
}

impl TurnDriver {
    pub fn new(runtime: QueueRuntime) -> Self {
        Self {
            runtime,
            gate: TurnGate::default(),
            pastes: PasteStore::default(),
        }
    }

    pub fn runtime(&self) -> &QueueRuntime {
        &self.runtime
    }

    pub fn gate(&self) -> &TurnGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut TurnGate {
        &mut self.gate
    }

    /// Feed one input line. Returns the queued item, if the line produced one.
    pub fn submit(&mut self, line: &str) -> Option<QueueItem> {
        match parse_line(line) {
            InputLine::Enqueue(item) => self.runtime.enqueue(item),
            InputLine::Paste(text) => {
                let placeholder = self.pastes.register(text);
                tracing::info!("Stored paste as {}", placeholder);
                None
            }
            InputLine::Clear => {
                self.runtime.clear(ClearReason::Cancelled);
                None
            }
            InputLine::Empty => None,
        }
    }

    /// Start a turn if the gate is open and something is queued.
    pub fn poll(&mut self) -> Option<Turn> {
        let batch = self.runtime.try_dequeue(self.gate.blocked_reason())?;
        let turn = self.build_turn(&batch);
        if turn.is_some() {
            self.gate.streaming = true;
        }
        turn
    }

    pub fn finish_turn(&mut self) {
        self.gate.streaming = false;
    }

    /// Run every remaining batch as a turn, then clear the queue.
    pub fn shutdown(&mut self) -> Vec<Turn> {
        self.gate = TurnGate::default();
        let mut turns = Vec::new();
        while let Some(turn) = self.poll() {
            turns.push(turn);
            self.finish_turn();
        }
        self.runtime.clear(ClearReason::Shutdown);
        turns
    }

    fn build_turn(&self, batch: &DequeuedBatch) -> Option<Turn> {
        let payload = match batch.items.as_slice() {
            [only] if !only.is_coalescable() => match &only.payload {
                ItemPayload::ApprovalResult { text } | ItemPayload::OverlayAction { text } => {
                    TurnPayload::Barrier {
                        kind: only.kind(),
                        text: text.clone(),
                    }
                }
                ItemPayload::Message { .. } | ItemPayload::TaskNotification { .. } => {
                    return None
                }
            },
            _ => {
                let inputs = QueuedTurnInput::from_batch(batch);
                let content =
                    merge_queued_turn_input(&inputs, |raw| self.pastes.resolve(raw))?;
                TurnPayload::Merged { content }
            }
        };
        Some(Turn {
            batch_id: batch.batch_id.to_string(),
            item_count: batch.merged_count,
            queue_len_after: batch.queue_len_after,
            payload,
        })
    }
}
