use serde::Serialize;

/// Who produced a turn in the conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message unit in a conversation. Immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only, ordered record of user/assistant turns for one session.
///
/// The log never shrinks and existing entries are never rewritten; the host
/// UI reads snapshots of it, never mutates it.
#[derive(Debug, Default, Clone)]
pub struct TranscriptLog {
    turns: Vec<Turn>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Mutable scratch state for the utterance currently being captured.
///
/// Recognition backends emit a stream of interim hypotheses followed by a
/// final segment per stretch of speech. Interim text replaces the previous
/// interim hypothesis; a final segment is folded into the finalized prefix
/// and the interim tail starts over, the way live dictation accumulates.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    finalized: String,
    interim: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a recognition hypothesis for the current utterance.
    pub fn apply(&mut self, text: &str, is_final: bool) {
        if is_final {
            if !self.finalized.is_empty() && !text.is_empty() {
                self.finalized.push(' ');
            }
            self.finalized.push_str(text.trim());
            self.interim.clear();
        } else {
            self.interim = text.to_string();
        }
    }

    /// True once at least one final segment has been produced.
    pub fn finalized(&self) -> bool {
        !self.finalized.is_empty()
    }

    /// Current best transcription: finalized prefix plus interim tail.
    pub fn text(&self) -> String {
        if self.finalized.is_empty() {
            self.interim.trim().to_string()
        } else if self.interim.trim().is_empty() {
            self.finalized.clone()
        } else {
            format!("{} {}", self.finalized, self.interim.trim())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }

    /// Clear the buffer and return the accumulated text, trimmed.
    pub fn take(&mut self) -> String {
        let text = self.text();
        self.clear();
        text
    }

    pub fn clear(&mut self) {
        self.finalized.clear();
        self.interim.clear();
    }
}
