//! Remittance and reconciliation files
//!
//! A remittance file holds the payment as received together with its advice:
//!
//! ```json
//! {
//!   "payment": {
//!     "payer_id": "...", "amount": "200.00", "method": "EFT", "payment_date": "2024-03-20"
//!   },
//!   "advice": {"payer_id": "...", "payment_reference": "EFT-7781", "lines": [
//!     {"claim_ref": "CLM-20240301-0A1B2C3D4E", "amount": "200.00"}
//!   ]}
//! }
//! ```
//!
//! Each file is imported in one transaction: the payment is recorded and the
//! advice applied, or nothing is written.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument, warn};

use core_kernel::PaymentId;
use domain_payment::RemittanceAdvice;
use domain_revenue::{
    EngineContext, NewPayment, ReconcileRequest, ReconciliationEngine, RemittanceResult,
    RevenueError,
};

/// Failures reading an input file; these abort the run
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads and decodes a JSON file
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ImportError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ImportError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemittanceFile {
    pub payment: NewPayment,
    pub advice: RemittanceAdvice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileFile {
    pub requests: Vec<ReconcileRequest>,
}

/// What happened to one remittance file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub payment_id: Option<PaymentId>,
    pub result: Option<RemittanceResult>,
    /// Machine code of a business-rule rejection
    pub code: Option<&'static str>,
    pub error: Option<String>,
}

impl FileReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileFailure {
    pub index: usize,
    pub payment: String,
    pub code: Option<&'static str>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub file: String,
    pub succeeded: usize,
    pub failed: Vec<ReconcileFailure>,
}

/// Drives file imports through the engine
#[derive(Clone)]
pub struct BatchImporter {
    ctx: EngineContext,
    reconciliation: ReconciliationEngine,
    actor: String,
}

impl BatchImporter {
    pub fn new(ctx: EngineContext, actor: impl Into<String>) -> Self {
        Self {
            reconciliation: ReconciliationEngine::new(ctx.clone()),
            ctx,
            actor: actor.into(),
        }
    }

    /// Imports one remittance file
    ///
    /// Unreadable files are an `Err`; engine rejections are reported in the
    /// `FileReport` so the remaining files still run.
    #[instrument(skip(self), fields(file = %path.display()))]
    pub async fn import_remittance(&self, path: &Path) -> Result<FileReport, ImportError> {
        let mut file: RemittanceFile = read_json(path).await?;
        let name = path.display().to_string();
        if file.payment.remittance_file.is_none() {
            file.payment.remittance_file =
                path.file_name().map(|n| n.to_string_lossy().into_owned());
        }

        match self.apply(file).await {
            Ok((payment_id, result)) => {
                info!(
                    %payment_id,
                    denied = result.denied.len(),
                    unmatched = result.unmatched.len(),
                    "remittance imported"
                );
                Ok(FileReport {
                    file: name,
                    payment_id: Some(payment_id),
                    result: Some(result),
                    code: None,
                    error: None,
                })
            }
            Err(err) => {
                warn!(error = %err, "remittance rejected");
                Ok(FileReport {
                    file: name,
                    payment_id: None,
                    result: None,
                    code: err.reason_code().map(|c| c.as_str()),
                    error: Some(err.to_string()),
                })
            }
        }
    }

    async fn apply(
        &self,
        file: RemittanceFile,
    ) -> Result<(PaymentId, RemittanceResult), RevenueError> {
        let actor = self.actor.as_str();
        let (outcome, events) = self
            .ctx
            .bounded("import_remittance", async {
                let mut uow = self.ctx.begin().await?;
                let result = async {
                    let payment = self
                        .reconciliation
                        .record_payment_in(&mut uow, file.payment, actor)
                        .await?;
                    let applied = self
                        .reconciliation
                        .apply_remittance_in(&mut uow, payment.id, file.advice, actor)
                        .await?;
                    Ok::<_, RevenueError>((payment.id, applied))
                }
                .await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(outcome)
    }

    /// Runs every request of a reconciliation file, each in its own transaction
    #[instrument(skip(self), fields(file = %path.display()))]
    pub async fn reconcile_file(&self, path: &Path) -> Result<ReconcileReport, ImportError> {
        let file: ReconcileFile = read_json(path).await?;
        let outcome = self.reconciliation.batch_reconcile(file.requests, &self.actor).await;
        Ok(ReconcileReport {
            file: path.display().to_string(),
            succeeded: outcome.succeeded.len(),
            failed: outcome
                .failed
                .iter()
                .map(|failure| ReconcileFailure {
                    index: failure.index,
                    payment: failure.reference.clone(),
                    code: failure.reason_code().map(|c| c.as_str()),
                    error: failure.error.to_string(),
                })
                .collect(),
        })
    }
}
