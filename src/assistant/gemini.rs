//! `RemoteAssistant` backed by the Gemini `generateContent` REST API.
//!
//! * Grounded search uses the `google_search` tool.
//! * Speech uses a TTS model with `responseModalities: ["AUDIO"]`; the answer
//!   carries base64 raw PCM in `inlineData`.
//!
//! Connection details (`base_url`, models, voice, timeout) come from
//! [`AssistantConfig`]; the key comes from the config or `GEMINI_API_KEY`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::assistant::prompt::search_prompt;
use crate::assistant::remote::{RemoteAssistant, RemoteCallError};
use crate::assistant::response::{
    error_message, extract_audio, extract_sources, extract_text, split_query_marker,
};
use crate::assistant::types::{SearchResponse, SpeechAudio};
use crate::config::AssistantConfig;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize, Default)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize, Default)]
struct GoogleSearch {}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

fn user_turn(text: &str) -> Vec<Content<'_>> {
    vec![Content {
        role: "user",
        parts: vec![Part { text }],
    }]
}

// ---------------------------------------------------------------------------
// GeminiAssistant
// ---------------------------------------------------------------------------

/// Calls Gemini for search, rewrites and speech.
pub struct GeminiAssistant {
    client: reqwest::Client,
    config: AssistantConfig,
    api_key: String,
}

impl GeminiAssistant {
    /// Build a client from application config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.
    ///
    /// # Errors
    ///
    /// [`RemoteCallError::MissingApiKey`] when neither the config nor the
    /// environment provides a key.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, RemoteCallError> {
        let api_key = config
            .resolve_api_key()
            .ok_or(RemoteCallError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:generateContent",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest<'_>,
    ) -> Result<Value, RemoteCallError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteCallError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteCallError::Parse(e.to_string()))
    }
}

#[async_trait]
impl RemoteAssistant for GeminiAssistant {
    async fn generate_text(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, RemoteCallError> {
        let request = GenerateContentRequest {
            contents: user_turn(prompt),
            tools: Vec::new(),
            generation_config: Some(GenerationConfig {
                temperature: Some(temperature),
                ..GenerationConfig::default()
            }),
        };

        let json = self.generate(&self.config.text_model, &request).await?;
        extract_text(&json).ok_or(RemoteCallError::EmptyResponse)
    }

    async fn search_and_summarize(&self, query: &str) -> Result<SearchResponse, RemoteCallError> {
        let prompt = search_prompt(query);
        let request = GenerateContentRequest {
            contents: user_turn(&prompt),
            tools: vec![Tool::default()],
            generation_config: None,
        };

        let json = self.generate(&self.config.text_model, &request).await?;
        let text = extract_text(&json).ok_or(RemoteCallError::EmptyResponse)?;
        let (summary, actual_query) = split_query_marker(&text, query);
        let sources = extract_sources(&json);

        log::debug!(
            "assistant: search {query:?} → {} chars, {} sources",
            summary.len(),
            sources.len()
        );

        Ok(SearchResponse {
            summary,
            sources,
            actual_query,
        })
    }

    async fn generate_speech(&self, text: &str) -> Result<SpeechAudio, RemoteCallError> {
        let request = GenerateContentRequest {
            contents: user_turn(text),
            tools: Vec::new(),
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO"],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: &self.config.voice,
                        },
                    },
                }),
                ..GenerationConfig::default()
            }),
        };

        let json = self.generate(&self.config.speech_model, &request).await?;
        extract_audio(&json).ok_or(RemoteCallError::MissingAudioData)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_config(api_key: Option<&str>) -> AssistantConfig {
        AssistantConfig {
            api_key: api_key.map(str::to_string),
            ..AssistantConfig::default()
        }
    }

    #[test]
    fn from_config_with_key_builds() {
        let assistant = GeminiAssistant::from_config(&make_config(Some("k-123"))).unwrap();
        assert_eq!(assistant.api_key, "k-123");
    }

    #[test]
    fn endpoint_joins_model() {
        let mut config = make_config(Some("k"));
        config.base_url = "https://example.test/v1beta/".into();
        let assistant = GeminiAssistant::from_config(&config).unwrap();
        assert_eq!(
            assistant.endpoint("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn search_request_enables_google_search() {
        let request = GenerateContentRequest {
            contents: user_turn("q"),
            tools: vec![Tool::default()],
            generation_config: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{ "role": "user", "parts": [{ "text": "q" }] }],
                "tools": [{ "google_search": {} }]
            })
        );
    }

    #[test]
    fn speech_request_asks_for_audio_with_voice() {
        let request = GenerateContentRequest {
            contents: user_turn("hello"),
            tools: Vec::new(),
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO"],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: "Kore" },
                    },
                }),
                ..GenerationConfig::default()
            }),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body["generationConfig"],
            json!({
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Kore" } }
                }
            })
        );
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn assistant_is_object_safe() {
        let assistant = GeminiAssistant::from_config(&make_config(Some("k"))).unwrap();
        let _: Box<dyn RemoteAssistant> = Box::new(assistant);
    }
}
