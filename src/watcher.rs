use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::detect;
use crate::incident::Incident;
use crate::known::KnownStore;
use crate::page;

/// Turns one PDF URL into a structured incident, or fails after its own
/// bounded retries.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, pdf_url: &str) -> Result<Incident>;
}

/// Persists one incident remotely. Called at most once per item.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn insert(&self, incident: &Incident) -> Result<()>;
}

/// The polling loop: scrape the alerts page, diff against the known list,
/// commit the diff, then extract + ingest each new item sequentially.
pub struct Watcher<E, S> {
    http: reqwest::Client,
    url: String,
    store: KnownStore,
    interval: Duration,
    extractor: E,
    sink: S,
}

impl<E: Extractor, S: Sink> Watcher<E, S> {
    pub fn new(
        url: impl Into<String>,
        store: KnownStore,
        interval: Duration,
        extractor: E,
        sink: S,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            store,
            interval,
            extractor,
            sink,
        }
    }

    /// Poll forever, or run a single cycle when `once` is set.
    ///
    /// A failed cycle (page fetch error, known-list save error) is logged and
    /// the next cycle starts after the usual sleep; persisted state is never
    /// left half-written.
    pub async fn run(&self, once: bool) -> Result<()> {
        let mut known = self.store.load();
        info!(
            "Watching for new safety alerts: url={} json={} interval={}s",
            self.url,
            self.store.path().display(),
            self.interval.as_secs()
        );
        info!("Loaded {} known alerts", known.len());

        loop {
            if let Err(e) = self.cycle(&mut known).await {
                error!("Cycle failed: {:#}", e);
            }
            if once {
                info!("Run complete (single-shot mode), exiting");
                return Ok(());
            }
            debug!("Sleeping {}s", self.interval.as_secs());
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn cycle(&self, known: &mut Vec<String>) -> Result<()> {
        let html = page::fetch_html(&self.http, &self.url).await?;
        let observed = page::extract_pdf_links(&html, &self.url);
        self.process_new(&observed, known).await
    }

    /// Diff, commit, then process. The known-list save happens before any
    /// extraction so a crash mid-processing never re-detects these items.
    async fn process_new(
        &self,
        observed: &IndexMap<String, String>,
        known: &mut Vec<String>,
    ) -> Result<()> {
        let new = detect::new_alerts(observed, known);
        if new.is_empty() {
            info!("No new alerts (found {} total)", observed.len());
            return Ok(());
        }

        info!("{} new alerts found:", new.len());
        for name in new.keys() {
            info!(" - {}", name);
        }

        // Persist first, then adopt the new list in memory. If the save
        // fails the in-memory list must stay untouched so the next cycle
        // re-detects these items instead of silently dropping them.
        let mut updated = known.clone();
        updated.extend(new.keys().cloned());
        self.store.save(&updated)?;
        *known = updated;
        info!(
            "Updated {} ({} known alerts total)",
            self.store.path().display(),
            known.len()
        );

        for (name, url) in &new {
            info!("Processing alert: {} | {}", name, url);
            match self.extractor.extract(url).await {
                Ok(incident) => {
                    debug!("Extracted: {:?}", incident);
                    if let Err(e) = self.sink.insert(&incident).await {
                        warn!("Failed to ingest {}: {:#}", name, e);
                    }
                }
                Err(e) => warn!("Extraction failed for {}: {:#}", name, e),
            }
        }
        info!("Finished processing new alerts");
        Ok(())
    }
}

// ── Tests ──
