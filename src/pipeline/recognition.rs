//! Boundary to the external text-recognition service.
//!
//! Recognition is slow (tens of seconds on a cold model) and may fail. Both
//! cases come back as `RecognitionOutcome::Fallback`, which the pipeline turns
//! into an empty text so the parser produces a blank, editable draft.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

/// Errors a recognizer implementation may report.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("Recognizer unavailable: {0}")]
    Unavailable(String),
    #[error("Recognition failed: {0}")]
    Processing(String),
    #[error("Unsupported image format")]
    UnsupportedFormat,
}

/// Bounding box for a recognized span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One piece of recognized text, in detection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSpan {
    pub text: String,
    /// 0.0-1.0
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

impl RecognizedSpan {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            bounding_box: None,
        }
    }
}

/// Text recognition abstraction (allows mocking for tests).
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<RecognizedSpan>, RecognitionError>;
}

/// What recognition produced, or why the pipeline fell back.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    Succeeded(String),
    Fallback { reason: String },
}

impl RecognitionOutcome {
    /// Text to hand to the parser. Empty on fallback.
    pub fn text(&self) -> &str {
        match self {
            Self::Succeeded(text) => text,
            Self::Fallback { .. } => "",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Join spans with single spaces, keeping the order they were detected in.
pub fn join_spans(spans: &[RecognizedSpan]) -> String {
    spans
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn mean_confidence(spans: &[RecognizedSpan]) -> f32 {
    if spans.is_empty() {
        return 0.0;
    }
    spans.iter().map(|s| s.confidence).sum::<f32>() / spans.len() as f32
}

/// Run a recognizer on a blocking worker, giving up after `timeout`.
pub async fn recognize_text(
    recognizer: Arc<dyn TextRecognizer>,
    image_bytes: Vec<u8>,
    timeout: Duration,
) -> RecognitionOutcome {
    let span = tracing::info_span!("text_recognition", image_size = image_bytes.len());
    run_recognition(recognizer, image_bytes, timeout)
        .instrument(span)
        .await
}

async fn run_recognition(
    recognizer: Arc<dyn TextRecognizer>,
    image_bytes: Vec<u8>,
    timeout: Duration,
) -> RecognitionOutcome {
    let start = std::time::Instant::now();

    let task = tokio::task::spawn_blocking(move || recognizer.recognize(&image_bytes));

    let spans = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(spans))) => spans,
        Ok(Ok(Err(e))) => {
            tracing::warn!(error = %e, "Text recognition failed, falling back to blank draft");
            return RecognitionOutcome::Fallback {
                reason: e.to_string(),
            };
        }
        Ok(Err(join_err)) => {
            tracing::warn!(error = %join_err, "Text recognition worker crashed");
            return RecognitionOutcome::Fallback {
                reason: format!("Recognition worker failed: {join_err}"),
            };
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Text recognition timed out, falling back to blank draft"
            );
            return RecognitionOutcome::Fallback {
                reason: format!("Recognition timed out after {}s", timeout.as_secs()),
            };
        }
    };

    let text = join_spans(&spans);
    tracing::info!(
        elapsed_ms = %start.elapsed().as_millis(),
        spans = spans.len(),
        confidence = mean_confidence(&spans),
        text_len = text.len(),
        "Text recognition complete"
    );
    RecognitionOutcome::Succeeded(text)
}

/// Mock recognizer for unit testing without a recognition service.
pub struct MockTextRecognizer {
    result: Result<Vec<RecognizedSpan>, String>,
    delay: Option<Duration>,
}

impl MockTextRecognizer {
    /// Returns one span per whitespace-separated word of `text`.
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            result: Ok(text
                .split_whitespace()
                .map(|w| RecognizedSpan::new(w, confidence))
                .collect()),
            delay: None,
        }
    }

    pub fn with_spans(spans: Vec<RecognizedSpan>) -> Self {
        Self {
            result: Ok(spans),
            delay: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            delay: None,
        }
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl TextRecognizer for MockTextRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<Vec<RecognizedSpan>, RecognitionError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.result
            .clone()
            .map_err(RecognitionError::Processing)
    }
}
