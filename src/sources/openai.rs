use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::LanguageClassifier;
use crate::error::ClassificationError;

const SYSTEM_PROMPT: &str = "Your job is to identify whether the song is a Spanish language song or not, given the title and artist. Respond ONLY with 'Yes' or 'No'.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: Option<String>,
}

/// Clasificador basado en chat completions (API compatible con OpenAI)
pub struct OpenAiClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClassifier {
    pub fn new(client: reqwest::Client, api_key: String, model: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Prompt one-shot: un ejemplo fijo ancla el formato de la respuesta.
    fn messages(title: &str, artist: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: "Title: 'Despacito', Artist: 'Luis Fonsi'".to_string(),
            },
            ChatMessage {
                role: "assistant",
                content: "Yes".to_string(),
            },
            ChatMessage {
                role: "user",
                content: format!("Title: {title}, Artist: {artist}"),
            },
        ]
    }
}

#[async_trait]
impl LanguageClassifier for OpenAiClassifier {
    async fn classify(&self, title: &str, artist: &str) -> Result<String, ClassificationError> {
        debug!("🤖 Clasificando: {} / {}", title, artist);

        let request = ChatRequest {
            model: &self.model,
            messages: Self::messages(title, artist),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = super::retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(ClassificationError::Status {
                status,
                body,
                retry_after,
            });
        }

        let bytes = response.bytes().await?;
        let completion: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ClassificationError::UnexpectedShape(e.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassificationError::UnexpectedShape("respuesta sin contenido".into()))
    }
}
