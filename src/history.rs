//! Message history tracking for debugging and diagnostics.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::CommandType;

/// Direction of a recorded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Send,
    Receive,
}

/// A recorded frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub msg_type: MessageType,
    pub command_type: CommandType,
    pub message: Value,
    /// Seconds since history creation
    pub timestamp: f64,
}

/// Bounded log of the frames exchanged with one lamp.
///
/// The most recent frame per direction and command type is kept
/// indefinitely; the chronological log keeps the last `max_entries`.
#[derive(Debug, Clone)]
pub struct MessageHistory {
    latest: HashMap<(MessageType, CommandType), Value>,
    last_error: Option<String>,
    start_time: Instant,
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
    sent: usize,
    received: usize,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            latest: HashMap::new(),
            last_error: None,
            start_time: Instant::now(),
            entries: VecDeque::new(),
            max_entries,
            sent: 0,
            received: 0,
        }
    }

    pub fn record(&mut self, msg_type: MessageType, command_type: CommandType, message: &Value) {
        match msg_type {
            MessageType::Send => self.sent += 1,
            MessageType::Receive => self.received += 1,
        }
        self.latest.insert((msg_type, command_type), message.clone());

        self.entries.push_back(HistoryEntry {
            msg_type,
            command_type,
            message: message.clone(),
            timestamp: self.start_time.elapsed().as_secs_f64(),
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The most recent frame of this kind, if any.
    pub fn latest(&self, msg_type: MessageType, command_type: CommandType) -> Option<&Value> {
        self.latest.get(&(msg_type, command_type))
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.latest.clear();
        self.entries.clear();
        self.last_error = None;
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            send_count: self.sent,
            receive_count: self.received,
            total_entries: self.entries.len(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Summary of message history for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub send_count: usize,
    pub receive_count: usize,
    pub total_entries: usize,
    pub last_error: Option<String>,
}
