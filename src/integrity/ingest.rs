use std::sync::Arc;

use tracing::{debug, error};

use crate::error::Result;
use crate::integrity::dedup::{AdmissionReason, DuplicatePreventer};
use crate::integrity::merge::PunchMerge;
use crate::model::attendance::AttendanceRecord;
use crate::model::punch::RawPunchEvent;
use crate::store::LedgerStore;

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Merged {
        record: AttendanceRecord,
        changed: bool,
    },
    Duplicate(AdmissionReason),
}

impl IngestOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, IngestOutcome::Merged { .. })
    }
}

/// Write path shared by the poller, the healer and the mobile validator:
/// admit → record the raw row and merge it into the day record in one write.
pub struct PunchIngestor {
    preventer: Arc<DuplicatePreventer>,
    store: Arc<dyn LedgerStore>,
}

impl PunchIngestor {
    pub fn new(preventer: Arc<DuplicatePreventer>, store: Arc<dyn LedgerStore>) -> Self {
        Self { preventer, store }
    }

    pub async fn ingest(&self, event: &RawPunchEvent) -> Result<IngestOutcome> {
        self.ingest_merge(event, PunchMerge::from_event(event)).await
    }

    /// Like [`Self::ingest`] with a caller-built merge (mobile punches carry coordinates).
    pub async fn ingest_merge(
        &self,
        event: &RawPunchEvent,
        merge: PunchMerge,
    ) -> Result<IngestOutcome> {
        let admission = self.preventer.admit(event).await?;
        if !admission.accepted {
            return Ok(IngestOutcome::Duplicate(admission.reason));
        }

        let recorded = match self.store.record_punch(&admission.key, event, &merge).await {
            Ok(recorded) => recorded,
            Err(e) => {
                // nothing was written; let a retry or the next heal through
                self.preventer.release(&admission.key).await;
                error!(
                    error = %e,
                    employee_code = %event.employee_code,
                    dedup_key = %admission.key,
                    "Failed to record punch"
                );
                return Err(e);
            }
        };

        let Some(outcome) = recorded else {
            // another writer got there first; the unique key caught it
            debug!(dedup_key = %admission.key, "Raw punch rejected by unique key");
            let reason = match event.external_id {
                Some(_) => AdmissionReason::DuplicateExternalId,
                None => AdmissionReason::DuplicateMobileBucket,
            };
            return Ok(IngestOutcome::Duplicate(reason));
        };

        Ok(IngestOutcome::Merged {
            record: outcome.record,
            changed: outcome.changed,
        })
    }
}
