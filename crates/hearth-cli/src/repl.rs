use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use console::Term;
use hearth_memory::TranscriptStore;
use hearth_schema::{now_millis, ChatRequest, Session};

use crate::client::{ChatClient, LocalStore, SessionSource};
use crate::render;
use crate::view::ChatView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Message(String),
    New,
    Retry,
    Sessions,
    Open(String),
    Delete(String),
    Export(Option<String>),
    Help,
    Quit,
    Usage(&'static str),
    Unknown(String),
}

/// `None` for a blank line.
pub fn parse_line(line: &str) -> Option<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(ReplCommand::Message(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::to_string);
    let command = match (name, arg) {
        ("new", _) => ReplCommand::New,
        ("retry", _) => ReplCommand::Retry,
        ("sessions", _) => ReplCommand::Sessions,
        ("open", Some(id)) => ReplCommand::Open(id),
        ("open", None) => ReplCommand::Usage("/open <id>"),
        ("delete", Some(id)) => ReplCommand::Delete(id),
        ("delete", None) => ReplCommand::Usage("/delete <id>"),
        ("export", arg) => ReplCommand::Export(arg),
        ("help", _) => ReplCommand::Help,
        ("quit" | "exit", _) => ReplCommand::Quit,
        (other, _) => ReplCommand::Unknown(other.to_string()),
    };
    Some(command)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Interactive terminal chat.
///
/// When `local` is set the client keeps transcripts itself and sends the
/// prior turns with every message.
pub struct Repl {
    client: Arc<dyn ChatClient>,
    sessions: SessionSource,
    local: Option<Arc<LocalStore>>,
    view: ChatView,
    term: Term,
}

impl Repl {
    pub fn new(
        client: Arc<dyn ChatClient>,
        sessions: SessionSource,
        local: Option<Arc<LocalStore>>,
    ) -> Self {
        Self {
            client,
            sessions,
            local,
            view: ChatView::new(),
            term: Term::stdout(),
        }
    }

    pub fn view(&self) -> &ChatView {
        &self.view
    }

    pub async fn open(&mut self, session_id: &str) -> Result<()> {
        self.handle(ReplCommand::Open(session_id.to_string())).await?;
        Ok(())
    }

    pub async fn run(&mut self) -> Result<()> {
        let persistence = if self.local.is_some() { "client" } else { "server" };
        self.term.write_line(&render::banner(persistence))?;

        let stdin = std::io::stdin();
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let mut input = String::new();
            if stdin.read_line(&mut input)? == 0 {
                break;
            }
            let Some(command) = parse_line(&input) else {
                continue;
            };
            if self.handle(command).await? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub async fn handle(&mut self, command: ReplCommand) -> Result<Flow> {
        match command {
            ReplCommand::Message(text) => self.submit(text).await?,
            ReplCommand::New => {
                self.view.new_session();
                self.term.write_line("Started a new session.")?;
            }
            ReplCommand::Retry => {
                let pending = self.view.input().to_string();
                if pending.is_empty() {
                    self.term.write_line(&render::error_line("nothing to retry"))?;
                } else {
                    self.submit(pending).await?;
                }
            }
            ReplCommand::Sessions => match self.sessions.list().await {
                Ok(summaries) => self
                    .term
                    .write_line(&render::render_sessions(&summaries, self.view.session_id()))?,
                Err(error) => self.term.write_line(&render::error_line(format!("{error:#}")))?,
            },
            ReplCommand::Open(id) => match self.sessions.get(&id).await {
                Ok(Some(session)) => {
                    self.view.select_session(session);
                    for turn in self.view.turns() {
                        self.term.write_line(&render::render_turn(turn))?;
                    }
                }
                Ok(None) => self
                    .term
                    .write_line(&render::error_line(format!("no session {id}")))?,
                Err(error) => self.term.write_line(&render::error_line(format!("{error:#}")))?,
            },
            ReplCommand::Delete(id) => match self.sessions.delete(&id).await {
                Ok(true) => {
                    if self.view.session_id() == Some(id.as_str()) {
                        self.view.new_session();
                    }
                    self.term.write_line(&format!("Deleted {id}."))?;
                }
                Ok(false) => self
                    .term
                    .write_line(&render::error_line(format!("no session {id}")))?,
                Err(error) => self.term.write_line(&render::error_line(format!("{error:#}")))?,
            },
            ReplCommand::Export(id) => match self.sessions.export(id.as_deref()).await {
                Ok(Some(json)) => self.term.write_line(&json)?,
                Ok(None) => self.term.write_line(&render::error_line("no such session"))?,
                Err(error) => self.term.write_line(&render::error_line(format!("{error:#}")))?,
            },
            ReplCommand::Help => self.term.write_line(render::HELP)?,
            ReplCommand::Quit => return Ok(Flow::Quit),
            ReplCommand::Usage(usage) => {
                self.term.write_line(&render::error_line(format!("usage: {usage}")))?
            }
            ReplCommand::Unknown(name) => self.term.write_line(&render::error_line(format!(
                "unknown command /{name}, try /help"
            )))?,
        }
        Ok(Flow::Continue)
    }

    async fn submit(&mut self, text: String) -> Result<()> {
        self.view.set_input(text);
        let Some(submission) = self.view.begin_submit() else {
            return Ok(());
        };

        let mut request = ChatRequest::new(submission.message.clone());
        request.session_id = submission.session_id.clone();
        if self.local.is_some() {
            request = request.with_history(submission.history.clone());
        }

        match self.client.send(&request).await {
            Ok(response) => {
                self.view.complete_submit(&response);
                if let Err(error) = self.persist_local().await {
                    tracing::warn!(error = %format!("{error:#}"), "failed to save session locally");
                }
                if let Some(turn) = self.view.turns().last() {
                    self.term.write_line(&render::render_turn(turn))?;
                }
            }
            Err(error) => {
                tracing::debug!(error = %format!("{error:#}"), "chat request failed");
                self.view.fail_submit(submission);
                self.term.write_line(&render::error_line(format!(
                    "{error:#} (message not sent, /retry to resend)"
                )))?;
            }
        }
        Ok(())
    }

    /// Mirror the visible transcript into the local store.
    async fn persist_local(&self) -> Result<()> {
        let (Some(store), Some(session_id)) = (&self.local, self.view.session_id()) else {
            return Ok(());
        };
        let started_at = match store.load(session_id).await? {
            Some(existing) => existing.started_at,
            None => now_millis(),
        };
        let session = Session {
            session_id: session_id.to_string(),
            started_at,
            messages: self.view.turns().to_vec(),
        };
        store.save(&session).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hearth_memory::FileKvStore;
    use hearth_schema::{ChatResponse, Segment, SessionSummary, Strategy};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers with one segment and records each request.
    #[derive(Default)]
    struct FakeClient {
        requests: Mutex<Vec<ChatRequest>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ChatClient for FakeClient {
        async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("server error (500 Internal Server Error): Failed to process chat message");
            }
            let text = format!("You said {}.", request.message.clone().unwrap_or_default());
            Ok(ChatResponse {
                session_id: request.session_id.clone().unwrap_or_else(|| "fresh".into()),
                content: text.clone(),
                segments: vec![Segment::new(text, [Strategy::Reflection])],
            })
        }

        async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
            Ok(Vec::new())
        }

        async fn get_session(&self, _session_id: &str) -> Result<Option<Session>> {
            Ok(None)
        }

        async fn delete_session(&self, _session_id: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn local_repl(tmp: &TempDir, client: Arc<FakeClient>) -> (Repl, Arc<LocalStore>) {
        let store = Arc::new(LocalStore::new(FileKvStore::new(tmp.path().join("sessions.json"))));
        let repl = Repl::new(client, SessionSource::Local(store.clone()), Some(store.clone()));
        (repl, store)
    }

    #[test]
    fn parse_line_recognises_commands() {
        assert_eq!(parse_line("   "), None);
        assert_eq!(
            parse_line(" hello there "),
            Some(ReplCommand::Message("hello there".into()))
        );
        assert_eq!(parse_line("/open abc"), Some(ReplCommand::Open("abc".into())));
        assert_eq!(parse_line("/open"), Some(ReplCommand::Usage("/open <id>")));
        assert_eq!(parse_line("/export"), Some(ReplCommand::Export(None)));
        assert_eq!(
            parse_line("/export abc"),
            Some(ReplCommand::Export(Some("abc".into())))
        );
        assert_eq!(parse_line("/retry"), Some(ReplCommand::Retry));
        assert_eq!(parse_line("/exit"), Some(ReplCommand::Quit));
        assert_eq!(parse_line("/dance"), Some(ReplCommand::Unknown("dance".into())));
    }

    #[tokio::test]
    async fn client_mode_sends_history_and_saves_locally() {
        let tmp = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::default());
        let (mut repl, store) = local_repl(&tmp, client.clone());

        repl.handle(ReplCommand::Message("first".into())).await.unwrap();
        repl.handle(ReplCommand::Message("second".into())).await.unwrap();

        let requests = client.requests.lock().unwrap().clone();
        assert!(requests[0].conversation_history.as_ref().unwrap().is_empty());
        assert_eq!(requests[1].session_id.as_deref(), Some("fresh"));
        let history = requests[1].conversation_history.as_ref().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].role, "therapist");

        let saved = store.load("fresh").await.unwrap().unwrap();
        assert_eq!(saved.messages.len(), 4);
        assert_eq!(saved.messages[3].content, "You said second.");
    }

    #[tokio::test]
    async fn failed_send_rolls_back_and_saves_nothing() {
        let tmp = TempDir::new().unwrap();
        let client = Arc::new(FakeClient {
            fail: AtomicBool::new(true),
            ..FakeClient::default()
        });
        let (mut repl, store) = local_repl(&tmp, client);

        let flow = repl.handle(ReplCommand::Message("hello".into())).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert!(repl.view().turns().is_empty());
        assert_eq!(repl.view().input(), "hello");
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_resends_the_restored_message() {
        let tmp = TempDir::new().unwrap();
        let client = Arc::new(FakeClient {
            fail: AtomicBool::new(true),
            ..FakeClient::default()
        });
        let (mut repl, store) = local_repl(&tmp, client.clone());

        repl.handle(ReplCommand::Message("hello".into())).await.unwrap();
        client.fail.store(false, Ordering::SeqCst);
        repl.handle(ReplCommand::Retry).await.unwrap();

        let requests = client.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].message.as_deref(), Some("hello"));
        assert_eq!(repl.view().input(), "");
        assert_eq!(repl.view().turns().len(), 2);
        assert_eq!(store.load("fresh").await.unwrap().unwrap().messages.len(), 2);

        repl.handle(ReplCommand::Retry).await.unwrap();
        assert_eq!(client.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn server_mode_omits_history() {
        let tmp = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::default());
        let store = Arc::new(LocalStore::new(FileKvStore::new(tmp.path().join("unused.json"))));
        let mut repl = Repl::new(client.clone(), SessionSource::Local(store), None);

        repl.handle(ReplCommand::Message("hi".into())).await.unwrap();
        let requests = client.requests.lock().unwrap();
        assert!(requests[0].conversation_history.is_none());
        assert!(!tmp.path().join("unused.json").exists());
    }

    #[tokio::test]
    async fn open_and_delete_switch_sessions() {
        let tmp = TempDir::new().unwrap();
        let (mut repl, store) = local_repl(&tmp, Arc::new(FakeClient::default()));
        let mut saved = Session::new("kept");
        saved.append_exchange(
            hearth_schema::Turn::user("earlier"),
            hearth_schema::Turn::therapist(vec![Segment::new("noted", Vec::new())]),
        );
        store.save(&saved).await.unwrap();

        repl.open("kept").await.unwrap();
        assert_eq!(repl.view().session_id(), Some("kept"));
        assert_eq!(repl.view().turns().len(), 2);

        repl.handle(ReplCommand::Delete("kept".into())).await.unwrap();
        assert!(repl.view().session_id().is_none());
        assert!(store.load("kept").await.unwrap().is_none());

        assert_eq!(repl.handle(ReplCommand::Quit).await.unwrap(), Flow::Quit);
    }
}
