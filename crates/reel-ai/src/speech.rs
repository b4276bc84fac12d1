//! Voice synthesis through an HTTP speech service.
//!
//! The service answers a synthesis request with two resource locations: the
//! audio bytes and a word-timestamp JSON document. Both are fetched here.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reel_models::WordTiming;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::config::SpeechConfig;
use crate::error::{AiError, AiResult};
use crate::timestamps::normalize_timestamps;

/// Longest text the speech service accepts.
pub const MAX_SPEECH_CHARS: usize = 5000;

const AUDIO_KEYS: [&str; 3] = ["audio_url", "audioUrl", "audio"];
const TIMESTAMP_KEYS: [&str; 4] = ["timestamps_url", "timestampsUrl", "timestamps", "subtitles_url"];

/// Text-to-speech with word timings.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Write the audio to `audio_out` and return the word timings.
    async fn synthesize(&self, text: &str, voice: &str, audio_out: &Path) -> AiResult<Vec<WordTiming>>;
}

/// Cut `text` to at most `max_chars`, on a word boundary when possible.
pub fn truncate_for_speech(text: &str, max_chars: usize) -> &str {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text;
    };
    let head = &text[..cut];
    match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => head[..space].trim_end(),
        _ => head,
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    bitrate: &'a str,
    speed: &'a str,
    pitch: &'a str,
    word_timestamps: bool,
}

fn locate(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Speech service client.
pub struct VoiceSynthesizer {
    client: Client,
    base: Url,
    config: SpeechConfig,
}

impl VoiceSynthesizer {
    pub fn new(config: SpeechConfig) -> AiResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        // Trailing slash so relative locations resolve under the base path
        let base = Url::parse(&format!("{}/", config.base_url.trim_end_matches('/')))?;
        Ok(Self { client, base, config })
    }

    pub fn from_env() -> AiResult<Self> {
        Self::new(SpeechConfig::from_env()?)
    }

    fn resolve(&self, location: &str) -> AiResult<Url> {
        Ok(self.base.join(location)?)
    }

    async fn request_synthesis(&self, text: &str, voice: &str) -> AiResult<(Url, Url)> {
        let body = SynthesizeRequest {
            text,
            voice,
            bitrate: &self.config.bitrate,
            speed: &self.config.speed,
            pitch: &self.config.pitch,
            word_timestamps: true,
        };

        let mut request = self.client.post(self.resolve("v1/synthesize")?).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::upstream(status, &text));
        }

        let body: Value = response.json().await?;
        let audio = locate(&body, &AUDIO_KEYS)
            .ok_or_else(|| AiError::speech_failed("response has no audio location"))?;
        let timestamps = locate(&body, &TIMESTAMP_KEYS)
            .ok_or_else(|| AiError::speech_failed("response has no timestamps location"))?;

        Ok((self.resolve(&audio)?, self.resolve(&timestamps)?))
    }

    async fn download_audio(&self, url: Url, out: &Path) -> AiResult<u64> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AiError::speech_failed(format!(
                "audio download returned {}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(out).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(AiError::speech_failed("audio download was empty"));
        }
        Ok(written)
    }

    async fn fetch_timestamps(&self, url: Url) -> AiResult<Vec<WordTiming>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AiError::speech_failed(format!(
                "timestamps download returned {}",
                response.status()
            )));
        }
        let payload: Value = response.json().await?;
        normalize_timestamps(&payload)
    }
}

#[async_trait]
impl SpeechSynthesizer for VoiceSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str, audio_out: &Path) -> AiResult<Vec<WordTiming>> {
        let text = truncate_for_speech(text.trim(), MAX_SPEECH_CHARS);
        let (audio_url, timestamps_url) = self.request_synthesis(text, voice).await?;
        debug!(%audio_url, %timestamps_url, "Synthesis ready");

        let bytes = self.download_audio(audio_url, audio_out).await?;
        let timings = self.fetch_timestamps(timestamps_url).await?;

        info!(voice, bytes, words = timings.len(), "Synthesized voiceover");
        Ok(timings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_truncate_on_word_boundary() {
        assert_eq!(truncate_for_speech("short text", 100), "short text");
        assert_eq!(truncate_for_speech("alpha beta gamma", 13), "alpha beta");
        assert_eq!(truncate_for_speech("abcdefgh", 4), "abcd");

        let long = "word ".repeat(2000);
        let cut = truncate_for_speech(&long, MAX_SPEECH_CHARS);
        assert!(cut.chars().count() <= MAX_SPEECH_CHARS);
        assert!(cut.ends_with("word"));
    }

    async fn mount_files(server: &MockServer, timestamps: Value) {
        Mock::given(method("GET"))
            .and(path("/files/voice.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3, 4]))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/voice.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(timestamps))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_synthesize_downloads_audio_and_timings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/synthesize"))
            .and(body_partial_json(json!({
                "voice": "en-US-GuyNeural",
                "bitrate": "48k",
                "word_timestamps": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audioUrl": "/files/voice.mp3",
                "timestampsUrl": format!("{}/files/voice.json", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_files(
            &server,
            json!({"words": [{"word": "Hi", "start_ms": 0, "end_ms": 300}]}),
        )
        .await;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("voice_raw.mp3");
        let synth = VoiceSynthesizer::new(SpeechConfig::new(server.uri())).unwrap();

        let timings = synth.synthesize("Hi", "en-US-GuyNeural", &out).await.unwrap();
        assert_eq!(timings, vec![WordTiming::new("Hi", 0.0, 0.3)]);
        assert_eq!(tokio::fs::read(&out).await.unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_missing_timestamps_location_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"audio_url": "/a.mp3"})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let synth = VoiceSynthesizer::new(SpeechConfig::new(server.uri())).unwrap();
        let err = synth
            .synthesize("Hi", "en-US-GuyNeural", &dir.path().join("a.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::SpeechFailed(_)));
    }

    #[tokio::test]
    async fn test_unfetchable_audio_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audio": "/missing.mp3",
                "timestamps": "/files/voice.json"
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let synth = VoiceSynthesizer::new(SpeechConfig::new(server.uri())).unwrap();
        let result = synth
            .synthesize("Hi", "en-US-GuyNeural", &dir.path().join("a.mp3"))
            .await;
        assert!(matches!(result, Err(AiError::SpeechFailed(_))));
    }
}
