//! Sequences offer creation, batch upload, scoring and result retrieval over
//! an [`ApiClient`], holding the fetched records and per-step progress.
//!
//! Held state sits behind a `std::sync::Mutex` that is never held across an
//! await: each operation talks to the service first and applies the outcome
//! in one short critical section, so a failed step leaves state untouched.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use futures::StreamExt;
use leadscore_client::{ApiClient, ApiError, ProgressEvent, ProgressSender};
use leadscore_core::{
    export_file_name, results_to_csv, IntentFilter, Lead, Offer, OfferInput, ScoredResult,
    ValidationError,
};
use tokio::sync::watch;

use crate::batch::BatchFile;
use crate::stats::Stats;
use crate::ExportError;

/// Transient progress of the operation in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowProgress {
    /// 0 while idle; 1-99 while an upload is running.
    pub upload_percent: u8,
    pub is_scoring: bool,
}

#[derive(Debug, Default)]
struct WorkflowState {
    offers: Vec<Offer>,
    leads: Vec<Lead>,
    results: Vec<ScoredResult>,
    skipped: Vec<String>,
}

/// Outcome of each read in [`Workflow::hydrate`], with the number of records
/// now held on success.
#[derive(Debug)]
pub struct HydrateReport {
    pub offers: Result<usize, ApiError>,
    pub leads: Result<usize, ApiError>,
    pub results: Result<usize, ApiError>,
}

impl HydrateReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.offers.is_ok() && self.leads.is_ok() && self.results.is_ok()
    }
}

pub struct Workflow {
    client: ApiClient,
    state: Mutex<WorkflowState>,
    progress: watch::Sender<WorkflowProgress>,
}

impl Workflow {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        let (progress, _) = watch::channel(WorkflowProgress::default());
        Self {
            client,
            state: Mutex::new(WorkflowState::default()),
            progress,
        }
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Creates an offer and appends the service's copy to the held list.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] for a blank required field (nothing is sent),
    /// otherwise whatever [`ApiClient::create_offer`] returns. The held list
    /// is only changed on success.
    pub async fn create_offer(&self, input: OfferInput) -> Result<Offer, ApiError> {
        let offer = self.client.create_offer(input).await.inspect_err(|e| {
            tracing::warn!(error = %e, "create offer failed");
        })?;
        self.lock().offers.push(offer.clone());
        tracing::info!(offer_id = offer.id, name = %offer.name, "offer created");
        Ok(offer)
    }

    /// Uploads a prospect batch and appends the parsed leads.
    ///
    /// `upload_percent` rises while the body is sent and returns to 0 when
    /// the upload settles either way. `progress`, when given, receives the
    /// same values followed by exactly one `Completed` or `Failed`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] if the file is not a non-empty CSV (nothing
    /// is sent), otherwise whatever [`ApiClient::upload_leads`] returns.
    pub async fn upload_batch(
        &self,
        file: &BatchFile,
        progress: Option<ProgressSender>,
    ) -> Result<Vec<Lead>, ApiError> {
        self.set_upload_percent(0);

        if let Err(e) = file.check() {
            tracing::warn!(file = file.name(), error = %e, "batch rejected");
            if let Some(progress) = &progress {
                progress.fail();
            }
            return Err(e.into());
        }

        let (tx, mut events) = leadscore_client::progress::channel();
        let upload = self
            .client
            .upload_leads(file.name(), file.contents(), Some(tx));
        tokio::pin!(upload);

        let outcome = loop {
            tokio::select! {
                outcome = &mut upload => break outcome,
                Some(event) = events.next() => self.forward_upload_event(event, progress.as_ref()),
            }
        };
        while let Some(event) = events.next().await {
            self.forward_upload_event(event, progress.as_ref());
        }
        self.set_upload_percent(0);

        let report = outcome.inspect_err(|e| {
            tracing::warn!(file = file.name(), error = %e, "batch upload failed");
        })?;
        self.lock().leads.extend(report.leads.iter().cloned());
        tracing::info!(file = file.name(), count = report.leads.len(), "batch uploaded");
        Ok(report.leads)
    }

    /// Scores the uploaded leads against a held offer and replaces the held
    /// results with the response.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] if `offer_id` is not in the held offer list,
    /// otherwise whatever [`ApiClient::score_leads`] returns. Held results
    /// are unchanged on failure.
    pub async fn request_scoring(&self, offer_id: i64) -> Result<Vec<ScoredResult>, ApiError> {
        if !self.lock().offers.iter().any(|o| o.id == offer_id) {
            return Err(ValidationError::UnknownOffer(offer_id).into());
        }

        let _scoring = ScoringGuard::start(&self.progress);
        let run = self.client.score_leads(offer_id).await.inspect_err(|e| {
            tracing::warn!(offer_id, error = %e, "scoring failed");
        })?;

        let mut state = self.lock();
        state.results.clone_from(&run.results);
        state.skipped = run.skipped;
        Ok(run.results)
    }

    /// Reloads the offer list.
    ///
    /// # Errors
    ///
    /// Whatever [`ApiClient::list_offers`] returns; the held list is kept.
    pub async fn fetch_offers(&self) -> Result<Vec<Offer>, ApiError> {
        let offers = self.client.list_offers().await.inspect_err(|e| {
            tracing::warn!(error = %e, "fetching offers failed");
        })?;
        self.lock().offers.clone_from(&offers);
        Ok(offers)
    }

    /// Reloads the uploaded leads.
    ///
    /// # Errors
    ///
    /// Whatever [`ApiClient::list_leads`] returns; the held list is kept.
    pub async fn fetch_leads(&self) -> Result<Vec<Lead>, ApiError> {
        let leads = self.client.list_leads().await.inspect_err(|e| {
            tracing::warn!(error = %e, "fetching leads failed");
        })?;
        self.lock().leads.clone_from(&leads);
        Ok(leads)
    }

    /// Reloads the stored scores.
    ///
    /// # Errors
    ///
    /// Whatever [`ApiClient::list_results`] returns; the held list is kept.
    pub async fn fetch_results(&self) -> Result<Vec<ScoredResult>, ApiError> {
        let results = self.client.list_results().await.inspect_err(|e| {
            tracing::warn!(error = %e, "fetching results failed");
        })?;
        self.lock().results.clone_from(&results);
        Ok(results)
    }

    /// Runs the three reads concurrently; each succeeds or fails on its own.
    pub async fn hydrate(&self) -> HydrateReport {
        let (offers, leads, results) =
            tokio::join!(self.fetch_offers(), self.fetch_leads(), self.fetch_results());
        HydrateReport {
            offers: offers.map(|v| v.len()),
            leads: leads.map(|v| v.len()),
            results: results.map(|v| v.len()),
        }
    }

    // -----------------------------------------------------------------------
    // Held state
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn progress(&self) -> WorkflowProgress {
        *self.progress.borrow()
    }

    #[must_use]
    pub fn watch_progress(&self) -> watch::Receiver<WorkflowProgress> {
        self.progress.subscribe()
    }

    #[must_use]
    pub fn offers(&self) -> Vec<Offer> {
        self.lock().offers.clone()
    }

    #[must_use]
    pub fn leads(&self) -> Vec<Lead> {
        self.lock().leads.clone()
    }

    #[must_use]
    pub fn results(&self) -> Vec<ScoredResult> {
        self.lock().results.clone()
    }

    /// Lead names the last scoring run could not score.
    #[must_use]
    pub fn skipped(&self) -> Vec<String> {
        self.lock().skipped.clone()
    }

    #[must_use]
    pub fn filtered_results(&self, filter: IntentFilter) -> Vec<ScoredResult> {
        self.lock()
            .results
            .iter()
            .filter(|r| filter.matches(r.ai_intent))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        let state = self.lock();
        Stats::compute(&state.offers, &state.leads, &state.results)
    }

    /// Held results matching `filter`, rendered as CSV.
    #[must_use]
    pub fn export_csv(&self, filter: IntentFilter) -> String {
        results_to_csv(&self.filtered_results(filter))
    }

    /// Writes [`Workflow::export_csv`] into `dir` under the dated export
    /// file name and returns the path written.
    ///
    /// # Errors
    ///
    /// [`ExportError::Write`] if the file cannot be written.
    pub fn write_export(
        &self,
        filter: IntentFilter,
        dir: &Path,
        date: NaiveDate,
    ) -> Result<PathBuf, ExportError> {
        let path = dir.join(export_file_name(date));
        std::fs::write(&path, self.export_csv(filter)).map_err(|source| ExportError::Write {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %path.display(), "results exported");
        Ok(path)
    }

    fn forward_upload_event(&self, event: ProgressEvent, external: Option<&ProgressSender>) {
        match event {
            ProgressEvent::Advanced(percent) => {
                self.set_upload_percent(percent);
                if let Some(external) = external {
                    external.advance(percent);
                }
            }
            ProgressEvent::Completed => {
                if let Some(external) = external {
                    external.complete();
                }
            }
            ProgressEvent::Failed => {
                if let Some(external) = external {
                    external.fail();
                }
            }
        }
    }

    fn set_upload_percent(&self, percent: u8) {
        self.progress.send_modify(|p| p.upload_percent = percent);
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("client", &self.client)
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

/// Holds `is_scoring` true until dropped, on every exit path.
struct ScoringGuard<'a> {
    progress: &'a watch::Sender<WorkflowProgress>,
}

impl<'a> ScoringGuard<'a> {
    fn start(progress: &'a watch::Sender<WorkflowProgress>) -> Self {
        progress.send_modify(|p| p.is_scoring = true);
        Self { progress }
    }
}

impl Drop for ScoringGuard<'_> {
    fn drop(&mut self) {
        self.progress.send_modify(|p| p.is_scoring = false);
    }
}
