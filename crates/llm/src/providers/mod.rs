//! Generation provider implementations.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use futures::{Stream, StreamExt};
use planes_core::{AppError, AppResult};
use std::collections::VecDeque;

/// Turn a non-success HTTP response into the matching `AppError`.
///
/// 429 maps to `AppError::RateLimited`, everything else to `AppError::Llm`.
pub(crate) async fn error_for_status(
    provider: &str,
    response: reqwest::Response,
) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    let body = response.text().await.unwrap_or_default();
    let mut message = format!("{} API error {}: {}", provider, status, body.trim());
    if let Some(seconds) = retry_after {
        message.push_str(&format!(" (retry in {}s)", seconds));
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(provider, "Provider rate limit reached");
        Err(AppError::RateLimited(message))
    } else {
        Err(AppError::Llm(message))
    }
}

/// Accumulates raw body bytes and yields complete lines.
///
/// Lines are decoded only once their terminating newline has arrived, so a
/// multi-byte character split across network chunks stays intact.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return the non-blank lines they complete, trimmed.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<AppResult<String>> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(decoded) = decode_line(&line) {
                lines.push(decoded);
            }
        }
        lines
    }

    /// Take an unterminated final line once the body has ended.
    pub(crate) fn finish(&mut self) -> Option<AppResult<String>> {
        let rest = std::mem::take(&mut self.pending);
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Option<AppResult<String>> {
    match std::str::from_utf8(line) {
        Ok(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| Ok(text.to_string()))
        }
        Err(e) => Some(Err(AppError::Llm(format!(
            "Stream line is not valid UTF-8: {}",
            e
        )))),
    }
}

/// Split a streamed response body into lines.
pub(crate) fn line_stream<S, B, E>(body: S) -> impl Stream<Item = AppResult<String>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (Box::pin(body), LineBuffer::default(), VecDeque::new(), false);

    futures::stream::unfold(state, |(mut body, mut buffer, mut ready, mut ended)| async move {
        loop {
            if let Some(line) = ready.pop_front() {
                return Some((line, (body, buffer, ready, ended)));
            }
            if ended {
                return None;
            }

            match body.next().await {
                Some(Ok(bytes)) => ready.extend(buffer.push(bytes.as_ref())),
                Some(Err(e)) => ready.push_back(Err(AppError::Llm(format!("Stream error: {}", e)))),
                None => {
                    ended = true;
                    ready.extend(buffer.finish());
                }
            }
        }
    })
}
