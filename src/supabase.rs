use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::incident::Incident;
use crate::watcher::Sink;

const DEFAULT_TABLE: &str = "incidents";

/// Supabase REST client that inserts extracted incidents.
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Create from the `SUPABASE_URL` and `SUPABASE_KEY` env vars.
    /// `SUPABASE_TABLE` optionally overrides the destination table.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL").context("SUPABASE_URL not set")?;
        let key = std::env::var("SUPABASE_KEY").context("SUPABASE_KEY not set")?;
        let mut client = Self::new(url, key);
        if let Ok(table) = std::env::var("SUPABASE_TABLE") {
            client = client.with_table(table);
        }
        Ok(client)
    }

    /// Override the destination table (default: incidents).
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), self.table)
    }
}

#[async_trait]
impl Sink for SupabaseClient {
    /// Insert one incident row. Single attempt; failures carry the response
    /// body so the log line says why the insert was rejected.
    async fn insert(&self, incident: &Incident) -> Result<()> {
        info!("Inserting incident for mine: {}", incident.label());
        let resp = self
            .client
            .post(self.endpoint())
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=minimal")
            .json(&[incident])
            .send()
            .await
            .context("Supabase request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Supabase insert error {}: {}", status, text));
        }
        Ok(())
    }
}

// ── Tests ──
