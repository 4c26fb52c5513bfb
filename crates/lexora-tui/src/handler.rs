use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, FocusPane, InputLine, InputMode};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => app.scroll_chat_to_bottom(),
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Session(event) => app.handle_session_event(event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_query_editing(app, key),
        InputMode::UploadPath => handle_upload_editing(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Tab | KeyCode::BackTab => app.toggle_focus(),
        KeyCode::Char('u') => app.open_upload_prompt(),
        KeyCode::Char('r') => app.session.refresh_documents(),
        KeyCode::Esc => app.session.dismiss_error(),
        _ => match app.focus {
            FocusPane::Chat => handle_chat_normal(app, key),
            FocusPane::Documents => handle_documents_normal(app, key),
        },
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') | KeyCode::Home => app.scroll_chat_to_top(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_chat_to_bottom(),
        _ => {}
    }
}

fn handle_documents_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.documents_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.documents_nav_up(),
        KeyCode::Char('d') | KeyCode::Delete => {
            app.delete_selected_document();
        }
        KeyCode::Char('i') => {
            app.focus = FocusPane::Chat;
            app.input_mode = InputMode::Editing;
        }
        _ => {}
    }
}

fn handle_query_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.toggle_focus();
        }
        KeyCode::Enter => {
            app.submit_query();
        }
        _ => edit_line(&mut app.query, key),
    }
}

fn handle_upload_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.upload_path.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.submit_upload();
        }
        _ => edit_line(&mut app.upload_path, key),
    }
}

fn edit_line(input: &mut InputLine, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) => input.insert(c),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexora_core::testing::FakeGateway;
    use lexora_core::{Session, SessionOptions};
    use std::sync::Arc;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c))).unwrap();
        }
    }

    fn new_app(gateway: FakeGateway) -> App {
        let (session, _rx) = Session::new(Arc::new(gateway), SessionOptions::default());
        App::new(session, "http://localhost:8000")
    }

    #[tokio::test]
    async fn test_typing_and_enter_sends_question() {
        let mut app = new_app(FakeGateway::new().with_answer(&["ok"]));
        type_text(&mut app, "qui est là?");
        assert_eq!(app.query.text, "qui est là?");

        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        assert!(app.query.text.is_empty());
        assert!(app.session.is_awaiting_answer());
        // 'q' while editing is text, not quit
        assert!(!app.should_quit);
    }

    #[tokio::test]
    async fn test_ctrl_c_quits_from_editing() {
        let mut app = new_app(FakeGateway::new());
        let ctrl_c = AppEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        handle_event(&mut app, ctrl_c).unwrap();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_upload_prompt_keys() {
        let mut app = new_app(FakeGateway::new());
        handle_event(&mut app, key(KeyCode::Esc)).unwrap();
        assert_eq!(app.input_mode, InputMode::Normal);

        handle_event(&mut app, key(KeyCode::Char('u'))).unwrap();
        assert_eq!(app.input_mode, InputMode::UploadPath);
        type_text(&mut app, "report.pdf");
        handle_event(&mut app, key(KeyCode::Esc)).unwrap();

        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.upload_path.text.is_empty());
        assert!(!app.session.is_uploading());
    }

    #[tokio::test]
    async fn test_tab_switches_focus_out_of_editing() {
        let mut app = new_app(FakeGateway::new());
        handle_event(&mut app, key(KeyCode::Tab)).unwrap();
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.focus, FocusPane::Documents);

        handle_event(&mut app, key(KeyCode::Char('i'))).unwrap();
        assert_eq!(app.focus, FocusPane::Chat);
        assert_eq!(app.input_mode, InputMode::Editing);
    }
}
