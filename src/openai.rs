//! OpenAI API client: text completion (Responses API) and voice transcription.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

pub struct Client {
    api_key: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputItem<'a>>,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct InputItem<'a> {
    role: &'static str,
    content: Vec<InputContent<'a>>,
}

#[derive(Serialize)]
struct InputContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    output: Option<Vec<OutputItem>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct OutputItem {
    /// Present on "message" items; reasoning items have no content.
    content: Option<Vec<OutputContent>>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl Client {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self { api_key, http }
    }

    /// Get a completion for the user's text, with the configured system prompt.
    pub async fn respond(
        &self,
        model: &str,
        system_prompt: &str,
        user_text: &str,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String, Error> {
        let request = ResponsesRequest {
            model,
            input: vec![
                InputItem {
                    role: "system",
                    content: vec![InputContent { kind: "input_text", text: system_prompt }],
                },
                InputItem {
                    role: "user",
                    content: vec![InputContent { kind: "input_text", text: user_text }],
                },
            ],
            temperature,
            max_output_tokens,
        };

        let response = self
            .http
            .post(RESPONSES_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        debug!("Responses API status: {status}");

        if !status.is_success() {
            return Err(Error::Api(format!("{status}: {body}")));
        }

        let parsed: ResponsesResponse =
            serde_json::from_str(&body).map_err(|e| Error::Parse(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(Error::Api(error.message));
        }

        // The output array mixes item kinds; take the first output_text part.
        let text = parsed
            .output
            .unwrap_or_default()
            .into_iter()
            .flat_map(|item| item.content.unwrap_or_default())
            .find(|part| part.kind == "output_text")
            .and_then(|part| part.text)
            .ok_or(Error::Empty)?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(Error::Empty);
        }
        Ok(text)
    }

    /// Transcribe a voice recording (OGG Opus from Telegram) to text.
    pub async fn transcribe(
        &self,
        model: &str,
        audio: Vec<u8>,
        filename: &str,
    ) -> Result<String, Error> {
        info!("Transcribing {} bytes of audio", audio.len());

        let file_part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("audio/ogg")
            .map_err(|e| Error::Http(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .part("file", file_part);

        let response = self
            .http
            .post(TRANSCRIPTIONS_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Api(format!("{status}: {body}")));
        }

        let parsed: TranscriptionResponse =
            serde_json::from_str(&body).map_err(|e| Error::Parse(e.to_string()))?;

        Ok(parsed.text.trim().to_string())
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}
