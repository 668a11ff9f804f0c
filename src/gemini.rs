use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use tracing::{info, warn};

use crate::incident::Incident;
use crate::watcher::Extractor;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-flash-latest";
const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF_MS: u64 = 5000;

const SYSTEM_PROMPT: &str = "Return a single JSON object that matches the schema exactly.\n\
    For any field that is NOT explicitly mentioned in the document, return null (without quotes).\n\
    Date format: DD-MM-YY. Time format: HH:MM.\n\
    Do not add extra keys.";

// Field name, description, and whether the value is an integer.
const SCHEMA_FIELDS: &[(&str, &str, bool)] = &[
    ("mine", "Name of the Mine", false),
    ("owner", "Owner of the Mine", false),
    ("district", "District of the Mine", false),
    ("state", "State (location) of the Mine", false),
    ("mineral", "Mineral of the Mine", false),
    ("place", "Place of Accident", false),
    ("date", "Date of Accident", false),
    ("time", "Time of Accident", false),
    ("casualties", "Number of People killed", true),
    ("injured", "Number of People seriously injured", true),
    ("cause", "Prime facie cause of the Accident", false),
    (
        "best_practices",
        "Best Practices only if the text best practices is explicitly mentioned",
        false,
    ),
    (
        "cause_label",
        "Analyze the cause and classify among 'Fire', 'Explosion', 'Roof Fall', 'Fall', \
         'Machinery', 'Transport', 'Electricity', 'Ground Movement', 'Eruption Of Water', \
         'Flying Pieces', 'Combustible Gas', 'Inundation'",
        false,
    ),
];

/// Gemini client for structured extraction from safety-alert PDFs.
///
/// Holds the full key list from `GEMINI_API_KEYS` and rotates to the next key
/// between failed attempts.
pub struct GeminiClient {
    client: reqwest::Client,
    api_keys: Vec<String>,
    key_index: AtomicUsize,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_keys: Vec<String>) -> Result<Self> {
        if api_keys.is_empty() {
            return Err(anyhow!("no Gemini API keys provided"));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_keys,
            key_index: AtomicUsize::new(0),
            model: DEFAULT_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Create from the `GEMINI_API_KEYS` env var (comma-separated list).
    /// `GEMINI_MODEL` optionally overrides the default model.
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var("GEMINI_API_KEYS").context("GEMINI_API_KEYS not set")?;
        let keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        let mut client = Self::new(keys)?;
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            client = client.with_model(model);
        }
        if let Ok(base) = std::env::var("GEMINI_BASE_URL") {
            client = client.with_base_url(base);
        }
        Ok(client)
    }

    /// Override the model (default: gemini-flash-latest).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Download a PDF and extract an [`Incident`] from it, with bounded retry.
    ///
    /// Transient API failures (network errors, empty or malformed model
    /// output) back off exponentially and rotate the API key; after
    /// `MAX_ATTEMPTS` the last error is returned so the caller can
    /// log-and-skip the item instead of stalling the cycle.
    pub async fn extract_incident(&self, pdf_url: &str) -> Result<Incident> {
        let pdf = self.download_pdf(pdf_url).await?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.generate(&pdf).await {
                Ok(incident) => {
                    info!("Model output retrieved for {} (attempt {})", pdf_url, attempt);
                    return Ok(incident);
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    let backoff =
                        Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt - 1));
                    warn!(
                        "Extraction attempt {}/{} for {} failed: {:#}; backing off {:.0}s",
                        attempt,
                        MAX_ATTEMPTS,
                        pdf_url,
                        e,
                        backoff.as_secs_f64()
                    );
                    self.rotate_key();
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "extraction failed for {} after {} attempts",
                        pdf_url, attempt
                    )));
                }
            }
        }
    }

    async fn download_pdf(&self, pdf_url: &str) -> Result<Vec<u8>> {
        info!("Downloading PDF: {}", pdf_url);
        let resp = self
            .client
            .get(pdf_url)
            .send()
            .await
            .with_context(|| format!("PDF request to {} failed", pdf_url))?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// One generateContent call: PDF inline, strict JSON response schema.
    async fn generate(&self, pdf: &[u8]) -> Result<Incident> {
        let body = json!({
            "contents": [{
                "parts": [{
                    "inlineData": {
                        "mimeType": "application/pdf",
                        "data": BASE64.encode(pdf),
                    }
                }]
            }],
            "systemInstruction": {
                "parts": [{ "text": SYSTEM_PROMPT }]
            },
            "generationConfig": {
                "thinkingConfig": { "thinkingBudget": 0 },
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
            },
        });

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", self.current_key())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, text));
        }

        let value: serde_json::Value = resp.json().await?;
        parse_response(&value)
    }

    fn current_key(&self) -> &str {
        &self.api_keys[self.key_index.load(Ordering::Relaxed) % self.api_keys.len()]
    }

    fn rotate_key(&self) {
        if self.api_keys.len() > 1 {
            self.key_index.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl Extractor for GeminiClient {
    async fn extract(&self, pdf_url: &str) -> Result<Incident> {
        self.extract_incident(pdf_url).await
    }
}

/// Pull the candidate text out of a generateContent response and parse it.
fn parse_response(value: &serde_json::Value) -> Result<Incident> {
    let text = value["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| anyhow!("no candidate text in model response"))?;
    if text.trim().is_empty() {
        return Err(anyhow!("empty model output"));
    }
    serde_json::from_str(text).context("model output did not match the incident schema")
}

/// Response schema sent with every request so the model returns exactly the
/// incident fields, each nullable.
fn response_schema() -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    for (name, description, is_integer) in SCHEMA_FIELDS {
        let field_type = if *is_integer { "INTEGER" } else { "STRING" };
        properties.insert(
            name.to_string(),
            json!({
                "type": field_type,
                "description": description,
                "nullable": true,
            }),
        );
    }
    let required: Vec<&str> = SCHEMA_FIELDS.iter().map(|(name, _, _)| *name).collect();
    json!({
        "type": "OBJECT",
        "description": "Schema for Structured Output of DGMS Safety Alerts.",
        "required": required,
        "properties": properties,
    })
}

// ── Tests ──
