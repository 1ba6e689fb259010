//! Scan lifecycle types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invintel_core::{EmergencyLevel, EntityError, ScanId, StoreId};

use crate::detector::{Anomaly, Emergency};

/// Which stores a scan covers. Only one scan may run per scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanScope {
    /// Every store in the chain.
    Network,
    Store(StoreId),
}

impl ScanScope {
    pub fn allows(&self, store_id: &StoreId) -> bool {
        match self {
            ScanScope::Network => true,
            ScanScope::Store(s) => s == store_id,
        }
    }
}

impl fmt::Display for ScanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanScope::Network => write!(f, "network"),
            ScanScope::Store(s) => write!(f, "store:{s}"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Created, not yet started
    Pending,
    /// Evaluating stores
    Running,
    /// Finished; findings are final
    Completed,
    /// Aborted (rejected start, cancellation, or a systemic precondition failed)
    Failed { reason: String },
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ScanStatus::Running)
    }
}

/// Everything a finished scan found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanFindings {
    pub emergencies: Vec<Emergency>,
    pub anomalies: Vec<Anomaly>,
    /// Per-store or per-record failures that did not abort the scan.
    pub errors: Vec<EntityError>,
}

/// One emergency scan and its findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyScan {
    pub id: ScanId,
    pub scope: ScanScope,
    pub trigger: TriggerType,
    pub status: ScanStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub emergencies: Vec<Emergency>,
    pub anomalies: Vec<Anomaly>,
    pub errors: Vec<EntityError>,
}

impl EmergencyScan {
    pub fn new(scope: ScanScope, trigger: TriggerType) -> Self {
        Self {
            id: ScanId::new(),
            scope,
            trigger,
            status: ScanStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            emergencies: Vec::new(),
            anomalies: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = ScanStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, findings: ScanFindings) {
        self.status = ScanStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.emergencies = findings.emergencies;
        self.anomalies = findings.anomalies;
        self.errors = findings.errors;
    }

    /// Partial findings of a failed scan are discarded.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = ScanStatus::Failed {
            reason: reason.into(),
        };
        self.finished_at = Some(Utc::now());
        self.emergencies.clear();
        self.anomalies.clear();
    }

    pub fn count_by_level(&self) -> BTreeMap<EmergencyLevel, usize> {
        let mut out = BTreeMap::new();
        for e in &self.emergencies {
            *out.entry(e.level).or_insert(0) += 1;
        }
        out
    }
}

/// Cooperative cancellation, checked between stores.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
