use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, InputMode, Screen, TextInput};
use crate::state::Feedback;
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Task(task) => app.handle_task_event(task),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return;
            }
            KeyCode::Char('n') if app.screen == Screen::Chat => {
                app.new_chat();
                return;
            }
            KeyCode::Char('x') if app.screen == Screen::Chat => {
                app.stop();
                return;
            }
            _ => {}
        }
    }

    match app.screen {
        Screen::Chat => match app.input_mode {
            InputMode::Normal => handle_chat_normal(app, key),
            InputMode::Editing => handle_chat_editing(app, key),
        },
        Screen::Crawl => handle_crawl(app, key),
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,

        // Pick which answer to rate
        KeyCode::Char('j') | KeyCode::Down => app.select_next_message(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev_message(),
        KeyCode::Char('l') => {
            app.send_feedback(Feedback::Like);
        }
        KeyCode::Char('d') => {
            app.send_feedback(Feedback::Dislike);
        }

        KeyCode::Char('x') => app.stop(),
        KeyCode::Char('n') => app.new_chat(),

        // Half-page scroll
        KeyCode::PageDown => app.scroll_down((app.chat_height / 2).max(1)),
        KeyCode::PageUp => app.scroll_up((app.chat_height / 2).max(1)),
        KeyCode::Char('G') | KeyCode::End => {
            app.follow_output = true;
            app.scroll_chat_to_bottom();
        }

        KeyCode::Char('c') => {
            app.screen = Screen::Crawl;
            app.input_mode = InputMode::Editing;
        }

        KeyCode::Esc => app.selected_message = None,

        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => {
            app.submit_question();
        }
        KeyCode::PageDown => app.scroll_down((app.chat_height / 2).max(1)),
        KeyCode::PageUp => app.scroll_up((app.chat_height / 2).max(1)),
        _ => edit_text(&mut app.input, key),
    }
}

fn handle_crawl(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.screen = Screen::Chat;
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => app.crawl.next_field(),
        KeyCode::Enter => {
            app.submit_crawl();
        }
        _ => edit_text(app.crawl.active_field(), key),
    }
}

fn edit_text(input: &mut TextInput, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.screen != Screen::Chat {
        return;
    }

    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::{ChatMessage, RequestStatus};
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn offline_app() -> App {
        // Nothing listens here; these tests never let a request complete
        let endpoints = Config {
            search_url: Some("http://127.0.0.1:9/api/search".to_string()),
            feedback_url: Some("http://127.0.0.1:9/api/feedback".to_string()),
            crawl_url: Some("http://127.0.0.1:9/crawl".to_string()),
            connect_timeout_secs: Some(1),
        }
        .endpoints();
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(endpoints, tx).unwrap()
    }

    #[tokio::test]
    async fn test_enter_on_empty_input_does_nothing() {
        let mut app = offline_app();
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();

        assert_eq!(app.status, RequestStatus::Created);
        assert_eq!(app.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_typing_and_enter_submits() {
        let mut app = offline_app();
        for c in "hi".chars() {
            handle_event(&mut app, key(KeyCode::Char(c))).unwrap();
        }
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();

        assert_eq!(app.status, RequestStatus::Pending);
        assert_eq!(app.messages[1].content, "hi");
        assert!(app.input.value.is_empty());
    }

    #[tokio::test]
    async fn test_ctrl_n_starts_new_chat() {
        let mut app = offline_app();
        for c in "question".chars() {
            handle_event(&mut app, key(KeyCode::Char(c))).unwrap();
        }
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        handle_event(&mut app, ctrl('n')).unwrap();

        assert_eq!(app.messages, vec![ChatMessage::greeting()]);
        assert_eq!(app.status, RequestStatus::Created);
    }

    #[tokio::test]
    async fn test_crawl_screen_fields() {
        let mut app = offline_app();
        handle_event(&mut app, key(KeyCode::Esc)).unwrap();
        handle_event(&mut app, key(KeyCode::Char('c'))).unwrap();
        assert_eq!(app.screen, Screen::Crawl);

        for c in "a.io".chars() {
            handle_event(&mut app, key(KeyCode::Char(c))).unwrap();
        }
        handle_event(&mut app, key(KeyCode::Tab)).unwrap();
        handle_event(&mut app, key(KeyCode::Char('t'))).unwrap();

        assert_eq!(app.crawl.url.value, "a.io");
        assert_eq!(app.crawl.topic.value, "t");

        handle_event(&mut app, key(KeyCode::Esc)).unwrap();
        assert_eq!(app.screen, Screen::Chat);
    }

    #[tokio::test]
    async fn test_ctrl_c_quits_from_crawl_screen() {
        let mut app = offline_app();
        app.screen = Screen::Crawl;
        handle_event(&mut app, ctrl('c')).unwrap();
        assert!(app.should_quit);
    }
}
