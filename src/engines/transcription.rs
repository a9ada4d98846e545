use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{TranscriptionEngine, TranscriptionResult};
use crate::lifecycle::{registered_temp_dir, release_temp_dir, ResourceManager};
use crate::{CastnotesError, Result};

/// Local whisper.cpp engine driven through its CLI
pub struct WhisperEngine {
    manager: ResourceManager,
    model: String,
}

impl WhisperEngine {
    pub fn new(manager: ResourceManager, model: String) -> Self {
        Self { manager, model }
    }

    fn model_path(&self) -> PathBuf {
        let model_dir =
            std::env::var("WHISPER_MODEL_DIR").unwrap_or_else(|_| "models".to_string());
        PathBuf::from(model_dir).join(format!("ggml-{}.bin", self.model))
    }

    async fn run_whisper(&self, audio_path: &Path, output_base: &Path) -> Result<String> {
        let model_path = self.model_path();

        let output = self
            .manager
            .run_command(
                "whisper-cli",
                &[
                    "-m",
                    &model_path.to_string_lossy(),
                    "-f",
                    &audio_path.to_string_lossy(),
                    "-of",
                    &output_base.to_string_lossy(),
                    "-otxt",
                    "-np",
                ],
            )
            .await?;

        if !output.success {
            return Err(CastnotesError::Transcription(format!(
                "whisper-cli failed: {}",
                output.stderr.trim()
            )));
        }

        let transcript_path = output_base.with_extension("txt");
        Ok(fs_err::read_to_string(&transcript_path)?.trim().to_string())
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult> {
        // Scratch space for whisper's text output, tracked so an interrupt
        // removes it
        let (work_dir, registration) = registered_temp_dir(&self.manager)?;
        let output_base = work_dir.join("transcript");

        let transcribed = self.run_whisper(audio_path, &output_base).await;
        release_temp_dir(&work_dir, &registration).await;
        let transcript = transcribed?;

        Ok(TranscriptionResult {
            transcript,
            model_id: self.model.clone(),
            cost_per_minute_cents: 0.0,
        })
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}

/// Deepgram hosted transcription engine
pub struct DeepgramEngine {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl DeepgramEngine {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }

    fn cost_per_minute_cents(&self) -> f64 {
        match self.model.as_str() {
            "nova-2" | "nova" => 0.43,
            "enhanced" => 1.45,
            "base" => 1.25,
            _ => 0.43,
        }
    }
}

#[async_trait]
impl TranscriptionEngine for DeepgramEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult> {
        let audio = fs_err::read(audio_path)?;

        let response = self
            .http
            .post("https://api.deepgram.com/v1/listen")
            .query(&[("model", self.model.as_str()), ("smart_format", "true")])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CastnotesError::Transcription(format!(
                "Deepgram returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        let transcript = body["results"]["channels"][0]["alternatives"][0]["transcript"]
            .as_str()
            .ok_or_else(|| {
                CastnotesError::Transcription("Deepgram response missing transcript".into())
            })?
            .to_string();

        Ok(TranscriptionResult {
            transcript,
            model_id: self.model.clone(),
            cost_per_minute_cents: self.cost_per_minute_cents(),
        })
    }

    fn name(&self) -> &'static str {
        "deepgram"
    }
}

/// AssemblyAI hosted transcription engine (upload, then poll)
pub struct AssemblyEngine {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

const ASSEMBLY_POLL_INTERVAL: Duration = Duration::from_secs(3);
const ASSEMBLY_MAX_POLLS: u32 = 200;

impl AssemblyEngine {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }

    fn cost_per_minute_cents(&self) -> f64 {
        match self.model.as_str() {
            "best" => 0.62,
            "nano" => 0.2,
            _ => 0.62,
        }
    }

    async fn upload(&self, audio_path: &Path) -> Result<String> {
        let audio = fs_err::read(audio_path)?;

        let response = self
            .http
            .post("https://api.assemblyai.com/v2/upload")
            .header("Authorization", &self.api_key)
            .body(audio)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CastnotesError::Transcription(format!(
                "AssemblyAI upload returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        body["upload_url"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| {
                CastnotesError::Transcription("AssemblyAI upload response missing URL".into())
            })
    }
}

#[async_trait]
impl TranscriptionEngine for AssemblyEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult> {
        let upload_url = self.upload(audio_path).await?;

        let response = self
            .http
            .post("https://api.assemblyai.com/v2/transcript")
            .header("Authorization", &self.api_key)
            .json(&json!({
                "audio_url": upload_url,
                "speech_model": self.model,
            }))
            .send()
            .await?;

        let body: Value = response.json().await?;
        let job_id = body["id"].as_str().ok_or_else(|| {
            CastnotesError::Transcription("AssemblyAI did not return a transcript id".into())
        })?;

        let status_url = format!("https://api.assemblyai.com/v2/transcript/{job_id}");
        for _ in 0..ASSEMBLY_MAX_POLLS {
            let body: Value = self
                .http
                .get(&status_url)
                .header("Authorization", &self.api_key)
                .send()
                .await?
                .json()
                .await?;

            match body["status"].as_str() {
                Some("completed") => {
                    let transcript = body["text"].as_str().unwrap_or_default().to_string();
                    return Ok(TranscriptionResult {
                        transcript,
                        model_id: self.model.clone(),
                        cost_per_minute_cents: self.cost_per_minute_cents(),
                    });
                }
                Some("error") => {
                    return Err(CastnotesError::Transcription(format!(
                        "AssemblyAI transcription failed: {}",
                        body["error"].as_str().unwrap_or("unknown error")
                    )));
                }
                _ => tokio::time::sleep(ASSEMBLY_POLL_INTERVAL).await,
            }
        }

        Err(CastnotesError::Transcription(
            "AssemblyAI transcription timed out".into(),
        ))
    }

    fn name(&self) -> &'static str {
        "assembly"
    }
}
