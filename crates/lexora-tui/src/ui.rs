use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use lexora_core::ChatRole;
use crate::app::{App, FocusPane, InputLine, InputMode, UPLOAD_HINT};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("**") {
        let after_open = &rest[open + 2..];
        match after_open.find("**") {
            Some(close) if close > 0 => {
                if open > 0 {
                    spans.push(Span::raw(rest[..open].to_string()));
                }
                spans.push(Span::styled(
                    after_open[..close].to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                rest = &after_open[close + 2..];
            }
            // No closing **, treat as literal (possibly still streaming in)
            _ => break,
        }
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let [sidebar_area, chat_area] = Layout::horizontal([
        Constraint::Length(32),
        Constraint::Min(0),
    ])
    .areas(body_area);

    render_header(app, frame, header_area);
    render_documents(app, frame, sidebar_area);
    render_chat(app, frame, chat_area);
    render_footer(app, frame, footer_area);

    if app.input_mode == InputMode::UploadPath {
        render_upload_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Lexora ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.api_url.clone(), Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing | InputMode::UploadPath => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " ASK ",
        InputMode::UploadPath => " UPLOAD ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match (app.input_mode, app.focus) {
        (InputMode::Editing, _) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" documents ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ],
        (InputMode::UploadPath, _) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" upload ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ],
        (InputMode::Normal, FocusPane::Chat) => vec![
            Span::styled(" i ", key_style),
            Span::styled(" ask ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" focus ", label_style),
            Span::styled(" u ", key_style),
            Span::styled(" upload ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (InputMode::Normal, FocusPane::Documents) => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" d ", key_style),
            Span::styled(" delete ", label_style),
            Span::styled(" u ", key_style),
            Span::styled(" upload ", label_style),
            Span::styled(" r ", key_style),
            Span::styled(" refresh ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" focus ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
    };

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];
    spans.extend(hints);

    if let Some(err) = app.session.last_error() {
        spans.push(Span::styled(" ", label_style));
        spans.push(Span::styled(
            format!(" {} (Esc to dismiss) ", err),
            Style::default().bg(Color::Red).fg(Color::White),
        ));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_documents(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Documents;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let [list_area, status_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Your Documents ");

    let documents = app.session.documents();
    if documents.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No documents uploaded yet.",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(empty, list_area);
    } else {
        let items: Vec<ListItem> = documents
            .documents()
            .iter()
            .map(|doc| {
                if app.session.is_deleting(&doc.name) {
                    ListItem::new(format!(" {} (deleting) ", doc.name))
                        .style(Style::default().fg(Color::DarkGray))
                } else {
                    ListItem::new(format!(" {} ", doc.name))
                }
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(
                Style::default()
                    .bg(if focused { Color::Blue } else { Color::DarkGray })
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");

        frame.render_stateful_widget(list, list_area, &mut app.documents_state);
    }

    let status = if app.session.is_uploading() {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        Span::styled(format!(" Uploading{}", dots), Style::default().fg(Color::Yellow))
    } else {
        Span::styled(" u: Upload document", Style::default().fg(Color::DarkGray))
    };
    frame.render_widget(Paragraph::new(status), status_area);
}

/// The transcript as a wrapped paragraph, without its frame.
///
/// Scrolling measures this same paragraph, so what is counted is what is drawn.
pub fn chat_paragraph(app: &App) -> Paragraph<'static> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    for msg in app.session.transcript().messages() {
        match msg.role() {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "Lexora:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                if app.is_thinking(msg.id()) {
                    // Animated ellipsis: cycles through ".", "..", "..."
                    let dots = ".".repeat((app.animation_frame as usize) + 1);
                    lines.push(Line::from(Span::styled(
                        format!("Thinking{}", dots),
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                    )));
                }
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
        }
        lines.push(Line::default());
    }

    Paragraph::new(Text::from(lines)).wrap(Wrap { trim: true })
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [messages_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = messages_area.height.saturating_sub(2);
    app.chat_width = messages_area.width.saturating_sub(2);

    let chat_focused = app.focus == FocusPane::Chat;
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if chat_focused { Color::Cyan } else { Color::DarkGray }))
        .title(" Chat Session ");

    let chat = chat_paragraph(app)
        .block(chat_block)
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, messages_area);

    let editing = app.input_mode == InputMode::Editing;
    let input_title = if app.session.is_awaiting_answer() {
        " Ask (waiting for answer) "
    } else {
        " Ask a question about your documents "
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(input_title);

    render_input_line(frame, &app.query, input_block, input_area, editing);
}

fn render_upload_prompt(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 3;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" Upload file ({}) ", UPLOAD_HINT));

    render_input_line(frame, &app.upload_path, block, popup_area, true);
}

/// Render a bordered single-line input, scrolled so the cursor stays visible.
fn render_input_line(frame: &mut Frame, input: &InputLine, block: Block<'_>, area: Rect, show_cursor: bool) {
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = input.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    // Get the visible slice of the input
    let visible_text: String = input.text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    // Use cyan text to match the "You:" style - visible in both light and dark terminals
    let paragraph = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(paragraph, area);

    if show_cursor {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_texts(line: &Line) -> Vec<String> {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_markdown_bold_spans() {
        let line = parse_markdown_line("Refunds are **accepted** within 30 days.");
        assert_eq!(span_texts(&line), vec!["Refunds are ", "accepted", " within 30 days."]);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_markdown_unclosed_bold_is_literal() {
        let line = parse_markdown_line("partial **answ");
        assert_eq!(span_texts(&line), vec!["partial **answ"]);
    }

    #[test]
    fn test_markdown_empty_line() {
        assert!(parse_markdown_line("").spans.is_empty());
    }
}
