use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, UTF_8};
use futures_util::{pin_mut, Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::state::{ChatMessage, Feedback};

/// Role the answer service uses for its own replies
pub const MODEL_ROLE: &str = "model";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// A message in the shape the answer service expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub role: String,
    pub parts: Vec<Part>,
}

impl RemoteMessage {
    pub fn model(text: String) -> Self {
        Self {
            role: MODEL_ROLE.to_string(),
            parts: vec![Part { text }],
        }
    }

    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

impl From<&ChatMessage> for RemoteMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            parts: vec![Part {
                text: message.content.clone(),
            }],
        }
    }
}

#[derive(Serialize)]
struct FeedbackRequest<'a> {
    message: &'a str,
    feedback: Feedback,
}

/// Client for the question-answering service and its feedback endpoint
#[derive(Clone)]
pub struct QaClient {
    client: Client,
    search_url: String,
    feedback_url: String,
}

impl QaClient {
    pub fn new(client: Client, search_url: &str, feedback_url: &str) -> Self {
        Self {
            client,
            search_url: search_url.to_string(),
            feedback_url: feedback_url.to_string(),
        }
    }

    /// Send the conversation and stream the answer back through `on_chunk`.
    ///
    /// Every decoded piece of the body is passed to `on_chunk` as soon as it
    /// arrives; the returned message holds the whole answer.
    pub async fn ask<F>(&self, messages: &[ChatMessage], on_chunk: F) -> Result<RemoteMessage>
    where
        F: FnMut(&str),
    {
        let payload: Vec<RemoteMessage> = messages.iter().map(RemoteMessage::from).collect();
        debug!(url = %self.search_url, messages = payload.len(), "sending conversation");

        let response = self
            .client
            .post(&self.search_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() || status == StatusCode::NO_CONTENT {
            return Err(ClientError::BadResponse {
                url: self.search_url.clone(),
                status,
            });
        }

        let text = read_stream(response.bytes_stream(), on_chunk).await?;
        debug!(chars = text.chars().count(), "answer complete");
        Ok(RemoteMessage::model(text))
    }

    pub async fn send_feedback(&self, message: &str, feedback: Feedback) -> Result<()> {
        let request = FeedbackRequest { message, feedback };

        let response = self
            .client
            .post(&self.feedback_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                url: self.feedback_url.clone(),
                status,
                body,
            });
        }

        info!(feedback = feedback.as_str(), "feedback sent");
        Ok(())
    }
}

/// Drain a byte stream, decoding it as UTF-8 and reporting each decoded piece.
///
/// Characters split across chunks are held back until complete and invalid
/// bytes become U+FFFD. Returns the concatenation of everything passed to
/// `on_chunk`.
pub async fn read_stream<S, E, F>(stream: S, mut on_chunk: F) -> std::result::Result<String, E>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    F: FnMut(&str),
{
    pin_mut!(stream);

    let mut decoder = UTF_8.new_decoder_with_bom_removal();
    let mut answer = String::new();

    while let Some(chunk) = stream.next().await {
        let text = decode_chunk(&mut decoder, &chunk?, false);
        if text.is_empty() {
            continue;
        }
        answer.push_str(&text);
        on_chunk(&text);
    }

    // Flush a sequence left incomplete by the end of the body
    let tail = decode_chunk(&mut decoder, &[], true);
    if !tail.is_empty() {
        answer.push_str(&tail);
        on_chunk(&tail);
    }

    Ok(answer)
}

fn decode_chunk(decoder: &mut Decoder, bytes: &[u8], last: bool) -> String {
    let mut out = String::new();
    let mut src = bytes;

    loop {
        out.reserve(decoder.max_utf8_buffer_length(src.len()).unwrap_or(src.len() + 4));
        let (result, read, _) = decoder.decode_to_string(src, &mut out, last);
        src = &src[read..];
        if let CoderResult::InputEmpty = result {
            break;
        }
    }

    out
}
