use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use crate::app::{App, CrawlField, InputMode, Screen, TextInput};
use crate::state::{ChatRole, RequestStatus};

/// Parse inline **bold** markdown into styled spans
fn parse_inline(text: &str) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }
    spans
}

/// Render one line of an answer: headings, bullets and inline bold
fn parse_markdown_line(line: &str) -> Line<'static> {
    let trimmed = line.trim_start();

    if let Some(heading) = trimmed.strip_prefix('#') {
        let heading = heading.trim_start_matches('#').trim();
        return Line::from(Span::styled(
            heading.to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    }

    let indent = &line[..line.len() - trimmed.len()];
    if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        let mut spans = vec![Span::raw(format!("{}• ", indent))];
        spans.extend(parse_inline(item));
        return Line::from(spans);
    }

    let spans = parse_inline(line);
    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Render a whole answer, keeping fenced code blocks verbatim
fn render_answer(content: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_code = false;

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            if !in_code {
                let lang = trimmed.trim_start_matches(['`', '~']).trim();
                if !lang.is_empty() {
                    lines.push(Line::from(Span::styled(
                        lang.to_string(),
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                    )));
                }
            }
            in_code = !in_code;
            continue;
        }

        if in_code {
            lines.push(Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(Color::Green),
            )));
        } else {
            lines.push(parse_markdown_line(line));
        }
    }
    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, notice, footer
    let [header_area, body_area, notice_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Crawl => render_crawl_screen(app, frame, body_area),
    }

    render_notice(app, frame, notice_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let status_style = match app.status {
        RequestStatus::Created => Style::default().fg(Color::Gray),
        RequestStatus::Pending => Style::default().fg(Color::Yellow),
        RequestStatus::Successful => Style::default().fg(Color::Green),
        RequestStatus::Failed => Style::default().fg(Color::Red),
    };

    let title = Line::from(vec![
        Span::styled(" QA Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("[{}]", app.status.label()), status_style),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_notice(app: &App, frame: &mut Frame, area: Rect) {
    let Some(notice) = &app.notice else { return };
    let color = if notice.is_error { Color::Red } else { Color::Green };
    let line = Paragraph::new(format!(" {}", notice.text)).style(Style::default().fg(color));
    frame.render_widget(line, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Chat => " CHAT ",
        Screen::Crawl => " CRAWL ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = match (app.screen, app.input_mode) {
        (Screen::Chat, InputMode::Editing) => &[
            (" Enter ", " send "),
            (" Esc ", " normal "),
            (" ^X ", " stop "),
            (" ^N ", " new chat "),
            (" PgUp/PgDn ", " scroll "),
        ],
        (Screen::Chat, InputMode::Normal) => &[
            (" i ", " type "),
            (" j/k ", " select "),
            (" l ", " like "),
            (" d ", " dislike "),
            (" x ", " stop "),
            (" n ", " new chat "),
            (" c ", " crawl "),
            (" q ", " quit "),
        ],
        (Screen::Crawl, _) => &[
            (" Tab ", " field "),
            (" Enter ", " crawl & save "),
            (" Esc ", " chat "),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_area = Some(chat_area);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(format!(" {} ", app.endpoints.search_url));

    let mut lines: Vec<Line> = Vec::new();
    let last = app.messages.len().saturating_sub(1);

    for (i, msg) in app.messages.iter().enumerate() {
        // The empty placeholder is covered by the "Thinking" indicator
        if i == last && app.is_generating() && msg.content.is_empty() {
            continue;
        }

        let selected = app.selected_message == Some(i);
        let (label, color) = match msg.role {
            ChatRole::User => ("You:", Color::Cyan),
            ChatRole::System | ChatRole::Assistant => ("AI:", Color::Yellow),
        };
        let mut label_style = Style::default().fg(color).add_modifier(Modifier::BOLD);
        if selected {
            label_style = label_style.add_modifier(Modifier::REVERSED);
        }

        let mut label_line = vec![Span::styled(label, label_style)];
        if selected {
            label_line.push(Span::styled(
                "  [l] like  [d] dislike",
                Style::default().fg(Color::DarkGray),
            ));
        }
        lines.push(Line::from(label_line));

        match msg.role {
            ChatRole::User => lines.push(Line::from(msg.content.clone())),
            ChatRole::System | ChatRole::Assistant => {
                lines.extend(render_answer(&msg.content));
            }
        }
        lines.push(Line::default());
    }

    if app.is_generating() {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(vec![
            Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ),
            Span::styled("  (^X to stop)", Style::default().fg(Color::DarkGray)),
        ]));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    let editing = app.input_mode == InputMode::Editing;
    render_text_input(frame, input_area, &app.input, " Ask something ", editing);
}

fn render_crawl_screen(app: &App, frame: &mut Frame, area: Rect) {
    let [title_area, url_area, topic_area, button_area, result_area, _] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(2),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(area);

    let title = Paragraph::new(Line::from(Span::styled(
        " Crawl a website into the knowledge base",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    frame.render_widget(title, title_area);

    let form = &app.crawl;
    render_text_input(frame, url_area, &form.url, " Article URL ", form.field == CrawlField::Url);
    render_text_input(frame, topic_area, &form.topic, " Topic ", form.field == CrawlField::Topic);

    let button = if form.loading {
        Span::styled(" Processing... ", Style::default().bg(Color::Gray).fg(Color::Black))
    } else {
        Span::styled(" Crawl & Save (Enter) ", Style::default().bg(Color::Green).fg(Color::White).bold())
    };
    frame.render_widget(Paragraph::new(Line::from(vec![Span::raw(" "), button])), button_area);

    if let Some(result) = &form.result {
        let color = if result.success { Color::Green } else { Color::Red };
        let message = Paragraph::new(format!(" {}", result.message))
            .style(Style::default().fg(color))
            .wrap(Wrap { trim: true });
        frame.render_widget(message, result_area);
    }
}

/// Bordered single-line input with horizontal scrolling to keep the cursor visible
fn render_text_input(frame: &mut Frame, area: Rect, input: &TextInput, title: &str, focused: bool) {
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width > 0 && input.cursor >= inner_width {
        input.cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = input
        .value
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let paragraph = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(paragraph, area);

    if focused {
        let cursor_x = (input.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_bold_spans() {
        let line = parse_markdown_line("Use **SPF 50** daily");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "SPF 50");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(plain(&line), "Use SPF 50 daily");
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        let line = parse_markdown_line("2 ** 3");
        assert_eq!(plain(&line), "2 ** 3");
    }

    #[test]
    fn test_heading_and_bullets() {
        assert_eq!(plain(&parse_markdown_line("## Benefits")), "Benefits");
        assert_eq!(plain(&parse_markdown_line("  - less **redness**")), "  • less redness");
        assert_eq!(plain(&parse_markdown_line("* calm skin")), "• calm skin");
    }

    #[test]
    fn test_empty_line() {
        assert!(parse_markdown_line("").spans.is_empty());
    }

    #[test]
    fn test_fenced_code_is_verbatim() {
        let lines = render_answer("```python\n# install deps\nx = a ** b ** c\n* ptr = 0;\n```\n**done**");
        let text: Vec<String> = lines.iter().map(plain).collect();
        assert_eq!(text, vec!["python", "# install deps", "x = a ** b ** c", "* ptr = 0;", "done"]);

        assert_eq!(lines[1].spans[0].style.fg, Some(Color::Green));
        assert!(lines[4].spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let lines = render_answer("Run:\n```\n## not a heading");
        let text: Vec<String> = lines.iter().map(plain).collect();
        assert_eq!(text, vec!["Run:", "## not a heading"]);
        assert_eq!(lines[1].spans[0].style.fg, Some(Color::Green));
    }
}
