//! Emergency and anomaly detection.
//!
//! A scan walks the stores of a scope, evaluates every live stock signal
//! against the coverage/intensity rule table, checks the record for data
//! anomalies, and stores the outcome. Scan state is the only mutable state
//! the engine owns; `ScanStore::start` guarantees one running scan per scope.

pub mod detector;
pub mod runner;
pub mod scan;
pub mod store;

pub use detector::{
    Anomaly, AnomalyKind, DemandCurve, Detection, Emergency, FlatCurve, StockSignal, coverage,
    evaluate, intensity,
};
pub use runner::{ScanContext, SignalSource, run_emergency_scan};
pub use scan::{CancellationToken, EmergencyScan, ScanFindings, ScanScope, ScanStatus, TriggerType};
pub use store::{InMemoryScanStore, ScanStats, ScanStore, ScanStoreError};
