//! Offer, lead and scoring endpoints for [`ApiClient`].

use std::sync::Arc;

use leadscore_core::{Lead, Offer, OfferInput, ScoredResult};

use crate::client::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::progress::ProgressSender;
use crate::types::{ScoreRun, UploadReport};

const OFFER_PATH: &str = "intent/offer/";
const LEADS_PATH: &str = "intent/leads/upload/";
const SCORE_PATH: &str = "intent/score/";
const RESULTS_PATH: &str = "intent/results/";

impl ApiClient {
    /// Lists the offers created by the current user.
    ///
    /// # Errors
    ///
    /// - [`ApiError::AuthExpired`] if the session cannot be renewed.
    /// - [`ApiError::Remote`] / [`ApiError::Network`] on request failure.
    /// - [`ApiError::Deserialize`] if the response is not a list of offers.
    pub async fn list_offers(&self) -> Result<Vec<Offer>, ApiError> {
        self.send_as(ApiRequest::get(OFFER_PATH), "list_offers").await
    }

    /// Creates an offer. The input is validated and normalised first; an
    /// invalid offer never reaches the network.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Validation`] if a required field is blank.
    /// - Otherwise as [`ApiClient::list_offers`].
    pub async fn create_offer(&self, input: OfferInput) -> Result<Offer, ApiError> {
        let input = input.validated()?;
        let body = serde_json::to_value(&input).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.send_as(ApiRequest::post(OFFER_PATH).json(body), "create_offer")
            .await
    }

    /// Lists every lead uploaded so far.
    ///
    /// # Errors
    ///
    /// As [`ApiClient::list_offers`].
    pub async fn list_leads(&self) -> Result<Vec<Lead>, ApiError> {
        self.send_as(ApiRequest::get(LEADS_PATH), "list_leads").await
    }

    /// Uploads a CSV batch as the multipart field `file`.
    ///
    /// When `progress` is given it receives byte-level `Advanced` updates,
    /// then exactly one `Completed` or `Failed`.
    ///
    /// # Errors
    ///
    /// As [`ApiClient::list_offers`]; the service reports malformed CSV as
    /// [`ApiError::Remote`].
    pub async fn upload_leads(
        &self,
        file_name: &str,
        contents: Arc<[u8]>,
        progress: Option<ProgressSender>,
    ) -> Result<UploadReport, ApiError> {
        let request =
            ApiRequest::post(LEADS_PATH).csv_upload(file_name, contents, progress.clone());
        let outcome = self.send_as::<UploadReport>(request, "upload_leads").await;

        if let Some(progress) = &progress {
            match &outcome {
                Ok(_) => progress.complete(),
                Err(_) => progress.fail(),
            }
        }
        if let Ok(report) = &outcome {
            tracing::info!(file = file_name, count = report.count, "leads uploaded");
        }
        outcome
    }

    /// Scores every uploaded lead against `offer_id`.
    ///
    /// # Errors
    ///
    /// As [`ApiClient::list_offers`]; a missing offer or an empty lead set
    /// arrives as [`ApiError::Remote`] with the service's message.
    pub async fn score_leads(&self, offer_id: i64) -> Result<ScoreRun, ApiError> {
        let run: ScoreRun = self
            .send_as(
                ApiRequest::get(SCORE_PATH).query("offer_id", offer_id),
                "score_leads",
            )
            .await?;
        tracing::info!(
            offer_id,
            processed = run.processed,
            skipped = run.skipped.len(),
            "leads scored"
        );
        Ok(run)
    }

    /// Lists every stored score.
    ///
    /// # Errors
    ///
    /// As [`ApiClient::list_offers`].
    pub async fn list_results(&self) -> Result<Vec<ScoredResult>, ApiError> {
        self.send_as(ApiRequest::get(RESULTS_PATH), "list_results")
            .await
    }
}
