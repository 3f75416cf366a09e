//! ElevenLabs text-to-speech client.
//!
//! `POST {base_url}/v1/text-to-speech/{voice_id}` with the segment text and
//! voice settings; the response body is MPEG audio.  All connection details
//! come from [`SynthesisConfig`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SynthesisConfig;

use super::{SpeechSynthesizer, SynthesisError, SynthesisRequest};

/// One entry of the account's voice library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceInfo>,
}

/// REST client for the ElevenLabs API.
pub struct ElevenLabsClient {
    client: reqwest::Client,
    base_url: String,
}

impl ElevenLabsClient {
    /// Build a client from config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`; a default client is used if the builder fails.
    pub fn from_config(config: &SynthesisConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn speech_url(&self, voice_id: &str) -> String {
        format!("{}/v1/text-to-speech/{voice_id}", self.base_url)
    }

    fn voices_url(&self) -> String {
        format!("{}/v1/voices", self.base_url)
    }

    /// List the voices available to `credential`.
    pub async fn list_voices(&self, credential: &str) -> Result<Vec<VoiceInfo>, SynthesisError> {
        let response = self
            .client
            .get(self.voices_url())
            .header("xi-api-key", credential)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: VoicesResponse = response.json().await?;
        Ok(parsed.voices)
    }
}

/// JSON body of a synthesis call.
fn request_body(request: &SynthesisRequest) -> serde_json::Value {
    serde_json::json!({
        "text":     request.text,
        "model_id": request.model_id,
        "voice_settings": {
            "stability":        request.stability,
            "similarity_boost": request.similarity_boost
        }
    })
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
        let response = self
            .client
            .post(self.speech_url(&request.voice_id))
            .header("xi-api-key", &request.credential)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("synth: API error {}: {body}", status.as_u16());
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(audio.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SynthesisRequest {
        SynthesisRequest {
            text: "Hello there.".into(),
            voice_id: "voice-1".into(),
            credential: "key".into(),
            model_id: "eleven_monolingual_v1".into(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }

    #[test]
    fn urls_are_built_from_config() {
        let config = SynthesisConfig {
            base_url: "http://localhost:8080/".into(),
            ..SynthesisConfig::default()
        };
        let client = ElevenLabsClient::from_config(&config);
        assert_eq!(
            client.speech_url("abc"),
            "http://localhost:8080/v1/text-to-speech/abc"
        );
        assert_eq!(client.voices_url(), "http://localhost:8080/v1/voices");
    }

    #[test]
    fn body_has_text_model_and_voice_settings() {
        let body = request_body(&request());
        assert_eq!(body["text"], "Hello there.");
        assert_eq!(body["model_id"], "eleven_monolingual_v1");
        assert_eq!(body["voice_settings"]["stability"], 0.5);
        assert_eq!(body["voice_settings"]["similarity_boost"], 0.75);
        assert!(body.get("credential").is_none());
    }

    #[test]
    fn voices_response_parses() {
        let json = r#"{"voices":[{"voice_id":"a1","name":"Rachel","category":"premade"},
                                 {"voice_id":"b2","name":"Custom"}]}"#;
        let parsed: VoicesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.voices.len(), 2);
        assert_eq!(parsed.voices[0].name, "Rachel");
        assert_eq!(parsed.voices[1].category, None);
    }

    /// Verify that `ElevenLabsClient` is usable as `dyn SpeechSynthesizer`.
    #[test]
    fn client_is_object_safe() {
        let client: Box<dyn SpeechSynthesizer> =
            Box::new(ElevenLabsClient::from_config(&SynthesisConfig::default()));
        drop(client);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_request_error() {
        let config = SynthesisConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..SynthesisConfig::default()
        };
        let client = ElevenLabsClient::from_config(&config);
        let err = client.synthesize(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::Request(_) | SynthesisError::Timeout
        ));
    }
}
