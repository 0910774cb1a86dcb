use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};
use crate::client::QaClient;
use crate::config::Endpoints;
use crate::crawl::{CrawlClient, CrawlOutcome};
use crate::state::{ChatMessage, ChatRole, Feedback, RequestStatus};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Crawl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrawlField {
    #[default]
    Url,
    Topic,
}

/// Results reported back by background requests
#[derive(Debug)]
pub enum TaskEvent {
    Chunk {
        generation: u64,
        text: String,
    },
    AnswerFinished {
        generation: u64,
        result: Result<String, String>,
    },
    FeedbackSent {
        feedback: Feedback,
        result: Result<(), String>,
    },
    CrawlFinished(Result<CrawlOutcome, String>),
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text field with a cursor counted in characters
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    pub value: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.value.chars().count() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value)
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

#[derive(Debug, Default)]
pub struct CrawlForm {
    pub url: TextInput,
    pub topic: TextInput,
    pub field: CrawlField,
    pub loading: bool,
    pub result: Option<CrawlOutcome>,
}

impl CrawlForm {
    pub fn active_field(&mut self) -> &mut TextInput {
        match self.field {
            CrawlField::Url => &mut self.url,
            CrawlField::Topic => &mut self.topic,
        }
    }

    pub fn next_field(&mut self) {
        self.field = match self.field {
            CrawlField::Url => CrawlField::Topic,
            CrawlField::Topic => CrawlField::Url,
        };
    }
}

/// One-line status message shown above the footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub is_error: bool,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Conversation
    pub input: TextInput,
    pub messages: Vec<ChatMessage>,
    pub status: RequestStatus,
    pub stop_generating: bool,
    /// Bumped on every question and on New Chat; events from older requests are dropped
    pub generation: u64,
    pub selected_message: Option<usize>,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_output: bool,
    pub chat_area: Option<Rect>,
    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub notice: Option<Notice>,

    // Crawl screen
    pub crawl: CrawlForm,

    pub endpoints: Endpoints,
    qa: QaClient,
    crawler: CrawlClient,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(endpoints: Endpoints, events: UnboundedSender<AppEvent>) -> anyhow::Result<Self> {
        let http = endpoints.http_client()?;
        let qa = QaClient::new(http.clone(), &endpoints.search_url, &endpoints.feedback_url);
        let crawler = CrawlClient::new(http, &endpoints.crawl_url);

        Ok(Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Editing,

            input: TextInput::default(),
            messages: vec![ChatMessage::greeting()],
            status: RequestStatus::Created,
            stop_generating: false,
            generation: 0,
            selected_message: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_output: true,
            chat_area: None,
            animation_frame: 0,
            notice: None,

            crawl: CrawlForm::default(),

            endpoints,
            qa,
            crawler,
            events,
        })
    }

    /// True while an answer is streaming and the user has not stopped it
    pub fn is_generating(&self) -> bool {
        self.status == RequestStatus::Pending && !self.stop_generating
    }

    /// Send the typed question. Returns false when nothing was sent.
    pub fn submit_question(&mut self) -> bool {
        if self.input.is_blank() || self.is_generating() {
            return false;
        }

        let question = self.input.take();
        self.stop_generating = false;
        self.status = RequestStatus::Pending;
        self.generation += 1;
        self.selected_message = None;
        self.notice = None;

        self.messages.push(ChatMessage::new(ChatRole::User, question));
        let history = self.messages.clone();
        self.messages.push(ChatMessage::new(ChatRole::Assistant, ""));

        self.follow_output = true;
        self.scroll_chat_to_bottom();

        let generation = self.generation;
        let qa = self.qa.clone();
        let tx = self.events.clone();
        info!(generation, messages = history.len(), "question submitted");

        tokio::spawn(async move {
            let chunk_tx = tx.clone();
            let result = qa
                .ask(&history, |text| {
                    let _ = chunk_tx.send(AppEvent::Task(TaskEvent::Chunk {
                        generation,
                        text: text.to_string(),
                    }));
                })
                .await
                .map(|reply| reply.text())
                .map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::Task(TaskEvent::AnswerFinished { generation, result }));
        });

        true
    }

    /// Stop showing the answer. The request itself keeps draining in the background.
    pub fn stop(&mut self) {
        if self.status != RequestStatus::Pending {
            return;
        }
        self.stop_generating = true;
        self.status = RequestStatus::Failed;
        info!(generation = self.generation, "generation stopped");
    }

    pub fn new_chat(&mut self) {
        self.messages = vec![ChatMessage::greeting()];
        self.generation += 1;
        self.stop_generating = false;
        self.status = RequestStatus::Created;
        self.selected_message = None;
        self.chat_scroll = 0;
        self.follow_output = true;
        self.notice = None;
        info!("new chat");
    }

    pub fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Chunk { generation, text } => {
                if generation != self.generation || self.stop_generating {
                    return;
                }
                if let Some(last) = self.messages.last_mut() {
                    last.content.push_str(&text);
                }
                if self.follow_output {
                    self.scroll_chat_to_bottom();
                }
            }
            TaskEvent::AnswerFinished { generation, result } => {
                if generation != self.generation {
                    debug!(generation, "discarding answer from a previous chat");
                    return;
                }
                match result {
                    Ok(text) => {
                        info!(generation, chars = text.chars().count(), "answer received");
                        if !self.stop_generating {
                            if let Some(last) = self.messages.last_mut() {
                                last.content = text;
                            }
                            self.status = RequestStatus::Successful;
                        }
                    }
                    Err(err) => {
                        error!(generation, %err, "question failed");
                        self.status = RequestStatus::Failed;
                        self.notice = Some(Notice {
                            text: format!("Request failed: {}", err),
                            is_error: true,
                        });
                    }
                }
                if self.follow_output {
                    self.scroll_chat_to_bottom();
                }
            }
            TaskEvent::FeedbackSent { feedback, result } => {
                self.notice = Some(match result {
                    Ok(()) => Notice {
                        text: format!("Feedback ({}) sent", feedback.as_str()),
                        is_error: false,
                    },
                    Err(err) => {
                        warn!(feedback = feedback.as_str(), %err, "feedback failed");
                        Notice {
                            text: format!("Failed to send feedback: {}", err),
                            is_error: true,
                        }
                    }
                });
            }
            TaskEvent::CrawlFinished(result) => {
                self.crawl.loading = false;
                self.crawl.result = Some(match result {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(%err, "crawl request failed");
                        CrawlOutcome {
                            success: false,
                            message: err,
                        }
                    }
                });
            }
        }
    }

    /// Message that like/dislike applies to: the selection, else the latest answer
    pub fn feedback_target(&self) -> Option<usize> {
        self.selected_message
            .filter(|&i| self.messages.get(i).is_some_and(ChatMessage::is_rateable))
            .or_else(|| self.messages.iter().rposition(ChatMessage::is_rateable))
    }

    /// Rate a message. Issues exactly one feedback request per call.
    pub fn send_feedback(&mut self, feedback: Feedback) -> bool {
        let Some(index) = self.feedback_target() else {
            return false;
        };
        let message = self.messages[index].content.clone();
        let qa = self.qa.clone();
        let tx = self.events.clone();
        debug!(index, feedback = feedback.as_str(), "sending feedback");

        tokio::spawn(async move {
            let result = qa
                .send_feedback(&message, feedback)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::Task(TaskEvent::FeedbackSent { feedback, result }));
        });

        true
    }

    pub fn select_next_message(&mut self) {
        let start = self.selected_message.map(|i| i + 1).unwrap_or(0);
        if let Some(i) = (start..self.messages.len()).find(|&i| self.messages[i].is_rateable()) {
            self.selected_message = Some(i);
        }
    }

    pub fn select_prev_message(&mut self) {
        let end = self.selected_message.unwrap_or(self.messages.len());
        if let Some(i) = (0..end).rev().find(|&i| self.messages[i].is_rateable()) {
            self.selected_message = Some(i);
        }
    }

    /// Start a crawl job from the form. Returns false when nothing was sent.
    pub fn submit_crawl(&mut self) -> bool {
        if self.crawl.loading {
            return false;
        }

        let url = self.crawl.url.value.trim().to_string();
        if url.is_empty() {
            self.crawl.result = Some(CrawlOutcome {
                success: false,
                message: "Enter a URL to crawl".to_string(),
            });
            return false;
        }
        let topic = self.crawl.topic.value.trim().to_string();

        self.crawl.loading = true;
        self.crawl.result = None;

        let crawler = self.crawler.clone();
        let tx = self.events.clone();
        info!(%url, %topic, "crawl requested");

        tokio::spawn(async move {
            let result = crawler.crawl(&url, &topic).await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::Task(TaskEvent::CrawlFinished(result)));
        });

        true
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_generating() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_output = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_chat_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
        self.follow_output = self.chat_scroll >= max;
    }

    /// Scroll chat to bottom so the newest text is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }

    fn max_chat_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_line_count().saturating_sub(visible_height)
    }

    /// Approximate rendered height of the conversation after wrapping
    fn chat_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;
        for msg in &self.messages {
            total_lines += 1; // Role line ("You:" or "AI:")
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines += char_count / wrap_width + 1;
            }
            total_lines += 1; // Blank line after message
        }

        if self.is_generating() {
            total_lines += 2; // "AI:" + "Thinking..."
        }

        total_lines.min(u16::MAX as usize) as u16
    }
}
