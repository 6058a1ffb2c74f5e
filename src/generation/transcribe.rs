use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::gemini::{GeminiClient, InlineData, Part};
use super::GenerationError;

const IMAGE_PROMPT: &str = "Extract all mathematics text from this image.";
const AUDIO_PROMPT: &str = "Transcribe this spoken mathematics question verbatim.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Text,
    Image,
    Audio,
}

impl Modality {
    fn default_mime(&self) -> &'static str {
        match self {
            Modality::Text => "text/plain",
            Modality::Image => "image/png",
            Modality::Audio => "audio/wav",
        }
    }
}

/// Turns image or audio payloads into question text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, modality: Modality, base64: &str) -> Result<String, GenerationError>;
}

/// Splits an optional `data:<mime>;base64,` prefix off a payload.
pub fn split_data_url(payload: &str) -> (Option<&str>, &str) {
    let payload = payload.trim();
    if let Some(rest) = payload.strip_prefix("data:") {
        if let Some((header, data)) = rest.split_once(',') {
            let mime = header.split(';').next().filter(|m| !m.is_empty());
            return (mime, data);
        }
    }
    (None, payload)
}

fn looks_like_base64(data: &str) -> bool {
    !data.is_empty()
        && data
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'-' | b'_' | b'\n' | b'\r'))
}

#[async_trait]
impl Transcriber for GeminiClient {
    async fn transcribe(&self, modality: Modality, base64: &str) -> Result<String, GenerationError> {
        let prompt = match modality {
            Modality::Image => IMAGE_PROMPT,
            Modality::Audio => AUDIO_PROMPT,
            Modality::Text => {
                return Err(GenerationError::InvalidInput(
                    "text needs no transcription".into(),
                ))
            }
        };

        let (mime, data) = split_data_url(base64);
        if !looks_like_base64(data) {
            return Err(GenerationError::InvalidInput("payload is not base64".into()));
        }

        let parts = vec![
            Part::Text {
                text: prompt.to_string(),
            },
            Part::Inline {
                inline_data: InlineData {
                    mime_type: mime.unwrap_or_else(|| modality.default_mime()).to_string(),
                    data: data.to_string(),
                },
            },
        ];
        let text = self.generate_text(parts, false).await?;
        Ok(text.trim().to_string())
    }
}
