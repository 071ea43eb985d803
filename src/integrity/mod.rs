use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::geofence::GeofenceLearner;
use crate::source::PunchSource;
use crate::store::LedgerStore;

pub mod consistency;
pub mod dedup;
pub mod events;
pub mod gap;
pub mod healer;
pub mod ingest;
pub mod merge;
pub mod poller;
pub mod ticker;
pub mod validator;

use consistency::ConsistencyMonitor;
use dedup::DuplicatePreventer;
use events::{FaultBus, spawn_fault_logger};
use gap::GapDetector;
use healer::TargetedHealer;
use ingest::PunchIngestor;
use poller::Poller;
use ticker::Ticker;
use validator::MobilePunchValidator;

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m.max(1) * 60)
}

/// All engine components wired over one ledger, one punch source and one geofence learner.
/// Shared with request handlers through `web::Data`.
pub struct IntegrityEngine {
    pub store: Arc<dyn LedgerStore>,
    pub preventer: Arc<DuplicatePreventer>,
    pub poller: Arc<Poller>,
    pub detector: Arc<GapDetector>,
    pub healer: Arc<TargetedHealer>,
    pub monitor: Arc<ConsistencyMonitor>,
    pub validator: Arc<MobilePunchValidator>,
    pub faults: FaultBus,
    config: Config,
}

impl IntegrityEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn LedgerStore>,
        source: Arc<dyn PunchSource>,
        learner: Arc<dyn GeofenceLearner>,
    ) -> Self {
        let faults = FaultBus::default();
        let preventer = Arc::new(DuplicatePreventer::new(store.clone(), config.dedup.clone()));
        let ingestor = Arc::new(PunchIngestor::new(preventer.clone(), store.clone()));
        let detector = Arc::new(GapDetector::new(store.clone()));

        let poller = Arc::new(Poller::new(
            config.poller.clone(),
            source.clone(),
            ingestor.clone(),
            faults.clone(),
        ));
        let healer = Arc::new(TargetedHealer::new(
            config.healer.clone(),
            source,
            ingestor.clone(),
            detector.clone(),
            faults.clone(),
        ));
        let monitor = Arc::new(ConsistencyMonitor::new(
            config.consistency.clone(),
            store.clone(),
            faults.clone(),
        ));
        let validator = Arc::new(MobilePunchValidator::new(
            config.validator.clone(),
            store.clone(),
            ingestor,
            learner,
            faults.clone(),
        ));

        Self {
            store,
            preventer,
            poller,
            detector,
            healer,
            monitor,
            validator,
            faults,
            config: config.clone(),
        }
    }

    /// Spawns the fault logger and one ticker per periodic component.
    pub fn start(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            spawn_fault_logger(&self.faults, cancel.clone()),
            Ticker::new(self.config.poller.interval(), cancel.clone()).spawn(self.poller.clone()),
            Ticker::new(minutes(self.config.healer.interval_minutes), cancel.clone())
                .spawn(self.healer.clone()),
            Ticker::new(minutes(self.config.consistency.interval_minutes), cancel.clone())
                .spawn(self.monitor.clone()),
            Ticker::new(minutes(self.config.dedup.cleanup_interval_minutes), cancel.clone())
                .spawn(self.preventer.clone()),
        ]
    }
}
