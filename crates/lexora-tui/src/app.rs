use lexora_core::{ChatRole, SendOutcome, Session, SessionEvent};
use ratatui::widgets::ListState;
use tracing::debug;

/// File types the backend indexes. Shown as a hint only.
pub const UPLOAD_HINT: &str = ".pdf .docx .txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    /// Typing a file path in the upload prompt
    UploadPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Chat,
    Documents,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text input with a character-based cursor.
#[derive(Debug, Default, Clone)]
pub struct InputLine {
    pub text: String,
    pub cursor: usize,
}

impl InputLine {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.char_count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.char_count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub session: Session,
    pub api_url: String,

    // Chat state
    pub query: InputLine,
    pub chat_scroll: u16,
    pub chat_height: u16, // Inner height of chat area for scroll calculations
    pub chat_width: u16,  // Inner width of chat area for wrap calculations

    // Documents sidebar
    pub documents_state: ListState,
    pub upload_path: InputLine,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(session: Session, api_url: impl Into<String>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Chat,
            session,
            api_url: api_url.into(),

            query: InputLine::default(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            documents_state: ListState::default(),
            upload_path: InputLine::default(),

            animation_frame: 0,
        }
    }

    /// Apply a background task report and keep the view consistent with it.
    pub fn handle_session_event(&mut self, event: SessionEvent) {
        let touches_chat = matches!(event, SessionEvent::Stream(_));
        self.session.apply(event);

        if touches_chat {
            self.scroll_chat_to_bottom();
        } else {
            self.clamp_document_selection();
        }
    }

    /// Send the typed question. Input is kept when the send is rejected.
    pub fn submit_query(&mut self) -> SendOutcome {
        let outcome = self.session.send(&self.query.text);
        match outcome {
            SendOutcome::Started { .. } => {
                self.query.clear();
                self.animation_frame = 0;
                self.scroll_chat_to_bottom();
            }
            SendOutcome::Busy => debug!("send ignored, answer still streaming"),
            SendOutcome::EmptyInput => {}
        }
        outcome
    }

    pub fn open_upload_prompt(&mut self) {
        if self.session.is_uploading() {
            return;
        }
        self.upload_path.clear();
        self.input_mode = InputMode::UploadPath;
    }

    /// Start uploading the path typed in the prompt and close it.
    pub fn submit_upload(&mut self) -> bool {
        let path = self.upload_path.text.trim().to_string();
        self.input_mode = InputMode::Normal;
        if path.is_empty() {
            return false;
        }
        self.session.upload(expand_home(&path))
    }

    /// Delete the highlighted document by its backend name.
    pub fn delete_selected_document(&mut self) -> bool {
        match self.selected_document_name() {
            Some(name) => self.session.delete(&name),
            None => false,
        }
    }

    pub fn selected_document_name(&self) -> Option<String> {
        self.documents_state
            .selected()
            .and_then(|i| self.session.documents().get(i))
            .map(|d| d.name.clone())
    }

    pub fn documents_nav_down(&mut self) {
        let len = self.session.documents().len();
        if len > 0 {
            let i = self.documents_state.selected().map_or(0, |i| (i + 1).min(len - 1));
            self.documents_state.select(Some(i));
        }
    }

    pub fn documents_nav_up(&mut self) {
        if !self.session.documents().is_empty() {
            let i = self.documents_state.selected().unwrap_or(0);
            self.documents_state.select(Some(i.saturating_sub(1)));
        }
    }

    /// Keep the selection inside a list that may have shrunk or grown.
    fn clamp_document_selection(&mut self) {
        let len = self.session.documents().len();
        let selected = match (len, self.documents_state.selected()) {
            (0, _) => None,
            (_, Some(i)) => Some(i.min(len - 1)),
            (_, None) if self.focus == FocusPane::Documents => Some(0),
            (_, None) => None,
        };
        self.documents_state.select(selected);
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Chat => FocusPane::Documents,
            FocusPane::Documents => FocusPane::Chat,
        };
        if self.focus == FocusPane::Documents && self.documents_state.selected().is_none() {
            self.clamp_document_selection();
        }
    }

    pub fn scroll_down(&mut self) {
        let max = self.chat_line_count().saturating_sub(self.visible_chat_height());
        self.chat_scroll = (self.chat_scroll + 1).min(max);
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    /// Scroll chat to bottom so the newest text is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let total_lines = self.chat_line_count();
        let visible_height = self.visible_chat_height();

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    fn visible_chat_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Rendered line count of the transcript at the current wrap width.
    pub fn chat_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width } else { 50 };
        let count = crate::ui::chat_paragraph(self).line_count(wrap_width);
        u16::try_from(count).unwrap_or(u16::MAX)
    }

    /// True while `id` is the open answer and nothing has arrived yet.
    pub fn is_thinking(&self, id: lexora_core::MessageId) -> bool {
        self.session.open_answer() == Some(id)
            && self
                .session
                .transcript()
                .get(id)
                .is_some_and(|m| m.role() == ChatRole::Assistant && m.content.is_empty())
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_awaiting_answer() || self.session.is_uploading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> std::path::PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => std::path::PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexora_core::testing::FakeGateway;
    use lexora_core::SessionOptions;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn app_with(gateway: Arc<FakeGateway>) -> (App, UnboundedReceiver<SessionEvent>) {
        let (session, rx) = Session::new(gateway, SessionOptions::default());
        (App::new(session, "http://localhost:8000"), rx)
    }

    async fn pump(app: &mut App, rx: &mut UnboundedReceiver<SessionEvent>) {
        let event = rx.recv().await.unwrap();
        app.handle_session_event(event);
    }

    #[test]
    fn test_input_line_utf8_editing() {
        let mut input = InputLine::default();
        for c in "héllo".chars() {
            input.insert(c);
        }
        input.left();
        input.left();
        input.left();
        input.backspace();
        assert_eq!(input.text, "hllo");
        assert_eq!(input.cursor, 1);

        input.insert('é');
        input.end();
        input.delete();
        assert_eq!(input.text, "héllo");
        input.home();
        input.delete();
        assert_eq!(input.text, "éllo");
        input.right();
        input.right();
        assert_eq!(input.cursor, 2);
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/a.pdf"), std::path::PathBuf::from("/tmp/a.pdf"));
        assert_eq!(expand_home("a.pdf"), std::path::PathBuf::from("a.pdf"));
    }

    #[tokio::test]
    async fn test_submit_query_clears_input_only_when_started() {
        let gateway = Arc::new(FakeGateway::new().with_answer(&["Refunds are accepted within 30 days."]));
        let (mut app, mut rx) = app_with(gateway);

        app.query.text = "   ".into();
        assert_eq!(app.submit_query(), SendOutcome::EmptyInput);
        assert_eq!(app.query.text, "   ");

        app.query.text = "What is the policy on refunds?".into();
        assert!(matches!(app.submit_query(), SendOutcome::Started { .. }));
        assert!(app.query.text.is_empty());

        let last = app.session.transcript().last().unwrap().id();
        assert!(app.is_thinking(last));

        app.query.text = "follow up".into();
        assert_eq!(app.submit_query(), SendOutcome::Busy);
        assert_eq!(app.query.text, "follow up");

        while app.session.is_awaiting_answer() {
            pump(&mut app, &mut rx).await;
        }
        assert!(!app.is_thinking(last));
        assert_eq!(
            app.session.transcript().last().unwrap().content,
            "Refunds are accepted within 30 days."
        );
    }

    #[tokio::test]
    async fn test_delete_selected_uses_backend_name() {
        let gateway = Arc::new(FakeGateway::with_documents(&["a.pdf", "b.pdf", "c.pdf"]));
        let (mut app, mut rx) = app_with(gateway.clone());
        app.session.refresh_documents();
        pump(&mut app, &mut rx).await;

        app.toggle_focus();
        app.documents_nav_down();
        app.documents_nav_down();
        assert_eq!(app.selected_document_name().as_deref(), Some("c.pdf"));

        assert!(app.delete_selected_document());
        pump(&mut app, &mut rx).await;

        assert_eq!(gateway.documents(), vec!["a.pdf", "b.pdf"]);
        // Selection clamps into the shorter list
        assert_eq!(app.selected_document_name().as_deref(), Some("b.pdf"));
    }

    #[tokio::test]
    async fn test_upload_prompt_round_trip() {
        let gateway = Arc::new(FakeGateway::new());
        let (mut app, mut rx) = app_with(gateway.clone());

        app.open_upload_prompt();
        assert_eq!(app.input_mode, InputMode::UploadPath);
        app.upload_path.text = "  /data/contract.docx ".into();
        assert!(app.submit_upload());
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.session.is_uploading());

        pump(&mut app, &mut rx).await;
        assert!(!app.session.is_uploading());
        assert!(app.session.documents().contains("contract.docx"));
    }

    #[tokio::test]
    async fn test_empty_upload_path_does_nothing() {
        let (mut app, _rx) = app_with(Arc::new(FakeGateway::new()));
        app.open_upload_prompt();
        assert!(!app.submit_upload());
        assert!(!app.session.is_uploading());
    }

    #[tokio::test]
    async fn test_line_count_follows_word_wrap() {
        let gateway = Arc::new(FakeGateway::new().with_answer(&["ok"]));
        let options = SessionOptions {
            greeting: false,
            ..Default::default()
        };
        let (session, mut rx) = Session::new(gateway, options);
        let mut app = App::new(session, "http://localhost:8000");
        app.chat_width = 10;
        app.chat_height = 4;

        // 34 characters, but no two words fit on one 10-column row
        app.query.text = "aaaaaa bbbbbb cccccc dddddd eeeeee".into();
        app.submit_query();
        while app.session.is_awaiting_answer() {
            pump(&mut app, &mut rx).await;
        }

        // "You:", five wrapped rows, blank, "Lexora:", "ok", blank
        assert_eq!(app.chat_line_count(), 10);
        assert_eq!(app.chat_scroll, 6);
    }

    #[tokio::test]
    async fn test_scroll_follows_long_answers() {
        let long = "word ".repeat(400);
        let gateway = Arc::new(FakeGateway::new().with_answer(&[long.as_str()]));
        let (mut app, mut rx) = app_with(gateway);
        app.chat_height = 10;
        app.chat_width = 40;

        app.query.text = "tell me everything".into();
        app.submit_query();
        while app.session.is_awaiting_answer() {
            pump(&mut app, &mut rx).await;
        }

        let expected = app.chat_line_count() - 10;
        assert_eq!(app.chat_scroll, expected);
        app.scroll_down();
        assert_eq!(app.chat_scroll, expected);
        app.scroll_chat_to_top();
        assert_eq!(app.chat_scroll, 0);
    }
}
