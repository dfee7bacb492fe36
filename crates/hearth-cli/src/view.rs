use hearth_schema::{ChatResponse, HistoryEntry, Session, Turn};

/// A message accepted by [`ChatView::begin_submit`] and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub message: String,
    pub session_id: Option<String>,
    /// Turns that preceded the optimistic user turn.
    pub history: Vec<HistoryEntry>,
}

/// State of one conversation as the terminal client shows it.
#[derive(Debug, Default)]
pub struct ChatView {
    turns: Vec<Turn>,
    input: String,
    session_id: Option<String>,
    loading: bool,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Take the input buffer and show it right away as a user turn.
    /// Blank input, or a submit while a reply is pending, does nothing.
    pub fn begin_submit(&mut self) -> Option<Submission> {
        let message = self.input.trim().to_string();
        if message.is_empty() || self.loading {
            return None;
        }

        let history = self.turns.iter().map(HistoryEntry::from).collect();
        self.turns.push(Turn::user(message.clone()));
        self.input.clear();
        self.loading = true;

        Some(Submission {
            message,
            session_id: self.session_id.clone(),
            history,
        })
    }

    pub fn complete_submit(&mut self, response: &ChatResponse) {
        if self.session_id.is_none() {
            self.session_id = Some(response.session_id.clone());
        }
        self.turns.push(Turn::therapist(response.segments.clone()));
        self.loading = false;
    }

    /// Drop the optimistic user turn and put its text back in the input.
    pub fn fail_submit(&mut self, submission: Submission) {
        if self
            .turns
            .last()
            .is_some_and(|turn| turn.content == submission.message)
        {
            self.turns.pop();
        }
        self.input = submission.message;
        self.loading = false;
    }

    pub fn select_session(&mut self, session: Session) {
        self.session_id = Some(session.session_id);
        self.turns = session.messages;
        self.input.clear();
        self.loading = false;
    }

    pub fn new_session(&mut self) {
        self.session_id = None;
        self.turns.clear();
        self.input.clear();
        self.loading = false;
    }
}
