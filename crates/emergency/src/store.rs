//! Scan state storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use invintel_core::{EngineError, ScanId};

use crate::scan::{EmergencyScan, ScanFindings, ScanScope, ScanStatus};

/// Scan store abstraction.
///
/// `start` is the single-writer guard: at most one scan per scope is
/// `Running` at any time.
pub trait ScanStore: Send + Sync {
    /// Register a new pending scan.
    fn create(&self, scan: EmergencyScan) -> Result<ScanId, ScanStoreError>;

    fn get(&self, id: ScanId) -> Result<Option<EmergencyScan>, ScanStoreError>;

    /// Move a pending scan to `Running`.
    ///
    /// If another scan of the same scope is running, this scan is marked
    /// failed and `AlreadyRunning` is returned.
    fn start(&self, id: ScanId) -> Result<EmergencyScan, ScanStoreError>;

    /// Finish a running scan and make it the scope's current scan.
    fn complete(&self, id: ScanId, findings: ScanFindings) -> Result<EmergencyScan, ScanStoreError>;

    fn fail(&self, id: ScanId, reason: String) -> Result<EmergencyScan, ScanStoreError>;

    /// Latest completed scan for the scope.
    fn current(&self, scope: &ScanScope) -> Result<Option<EmergencyScan>, ScanStoreError>;

    /// Scan history for the scope, newest first.
    fn list(&self, scope: &ScanScope, limit: usize) -> Result<Vec<EmergencyScan>, ScanStoreError>;

    fn stats(&self, scope: Option<&ScanScope>) -> Result<ScanStats, ScanStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanStoreError {
    #[error("scan not found: {0}")]
    NotFound(ScanId),
    #[error("scan already exists: {0}")]
    AlreadyExists(ScanId),
    #[error("scan {running} is already running for {scope}")]
    AlreadyRunning { scope: ScanScope, running: ScanId },
    #[error("scan {id} cannot move from {from}")]
    InvalidTransition { id: ScanId, from: String },
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<ScanStoreError> for EngineError {
    fn from(err: ScanStoreError) -> Self {
        match err {
            ScanStoreError::NotFound(_) => EngineError::not_found(err.to_string()),
            ScanStoreError::AlreadyExists(_)
            | ScanStoreError::AlreadyRunning { .. }
            | ScanStoreError::InvalidTransition { .. } => EngineError::conflict(err.to_string()),
            ScanStoreError::Storage(_) => EngineError::unavailable(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScanStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct State {
    scans: HashMap<ScanId, EmergencyScan>,
    current: HashMap<ScanScope, ScanId>,
}

/// In-memory scan store for tests/dev.
///
/// One lock covers both the scans and the current pointers, so a start check
/// and the status change it guards happen atomically.
#[derive(Debug, Default)]
pub struct InMemoryScanStore {
    state: RwLock<State>,
}

impl InMemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, ScanStoreError> {
        self.state
            .read()
            .map_err(|_| ScanStoreError::Storage("scan store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, ScanStoreError> {
        self.state
            .write()
            .map_err(|_| ScanStoreError::Storage("scan store lock poisoned".into()))
    }
}

fn transition_error(scan: &EmergencyScan) -> ScanStoreError {
    ScanStoreError::InvalidTransition {
        id: scan.id,
        from: format!("{:?}", scan.status),
    }
}

impl ScanStore for InMemoryScanStore {
    fn create(&self, scan: EmergencyScan) -> Result<ScanId, ScanStoreError> {
        let mut state = self.write()?;
        if state.scans.contains_key(&scan.id) {
            return Err(ScanStoreError::AlreadyExists(scan.id));
        }
        if scan.status != ScanStatus::Pending {
            return Err(transition_error(&scan));
        }
        let id = scan.id;
        state.scans.insert(id, scan);
        Ok(id)
    }

    fn get(&self, id: ScanId) -> Result<Option<EmergencyScan>, ScanStoreError> {
        Ok(self.read()?.scans.get(&id).cloned())
    }

    fn start(&self, id: ScanId) -> Result<EmergencyScan, ScanStoreError> {
        let mut state = self.write()?;
        let scope = match state.scans.get(&id) {
            Some(scan) if scan.status == ScanStatus::Pending => scan.scope.clone(),
            Some(scan) => return Err(transition_error(scan)),
            None => return Err(ScanStoreError::NotFound(id)),
        };

        let running = state
            .scans
            .values()
            .find(|s| s.id != id && s.scope == scope && s.status.is_running())
            .map(|s| s.id);

        let scan = state.scans.get_mut(&id).ok_or(ScanStoreError::NotFound(id))?;
        if let Some(running) = running {
            scan.mark_failed(format!("scan {running} already running for {scope}"));
            return Err(ScanStoreError::AlreadyRunning { scope, running });
        }
        scan.mark_running();
        Ok(scan.clone())
    }

    fn complete(&self, id: ScanId, findings: ScanFindings) -> Result<EmergencyScan, ScanStoreError> {
        let mut state = self.write()?;
        let scan = state.scans.get_mut(&id).ok_or(ScanStoreError::NotFound(id))?;
        if !scan.status.is_running() {
            return Err(transition_error(scan));
        }
        scan.mark_completed(findings);
        let done = scan.clone();
        state.current.insert(done.scope.clone(), id);
        Ok(done)
    }

    fn fail(&self, id: ScanId, reason: String) -> Result<EmergencyScan, ScanStoreError> {
        let mut state = self.write()?;
        let scan = state.scans.get_mut(&id).ok_or(ScanStoreError::NotFound(id))?;
        if scan.status.is_terminal() {
            return Err(transition_error(scan));
        }
        scan.mark_failed(reason);
        Ok(scan.clone())
    }

    fn current(&self, scope: &ScanScope) -> Result<Option<EmergencyScan>, ScanStoreError> {
        let state = self.read()?;
        Ok(state
            .current
            .get(scope)
            .and_then(|id| state.scans.get(id))
            .cloned())
    }

    fn list(&self, scope: &ScanScope, limit: usize) -> Result<Vec<EmergencyScan>, ScanStoreError> {
        let state = self.read()?;
        let mut result: Vec<_> = state
            .scans
            .values()
            .filter(|s| &s.scope == scope)
            .cloned()
            .collect();

        // ScanIds are v7 (time-ordered); they break created_at ties.
        result.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_uuid().cmp(a.id.as_uuid()))
        });
        result.truncate(limit);
        Ok(result)
    }

    fn stats(&self, scope: Option<&ScanScope>) -> Result<ScanStats, ScanStoreError> {
        let state = self.read()?;
        let mut stats = ScanStats::default();

        for scan in state.scans.values() {
            if scope.is_some_and(|s| s != &scan.scope) {
                continue;
            }
            match &scan.status {
                ScanStatus::Pending => stats.pending += 1,
                ScanStatus::Running => stats.running += 1,
                ScanStatus::Completed => stats.completed += 1,
                ScanStatus::Failed { .. } => stats.failed += 1,
            }
        }

        Ok(stats)
    }
}

impl ScanStore for Arc<InMemoryScanStore> {
    fn create(&self, scan: EmergencyScan) -> Result<ScanId, ScanStoreError> {
        (**self).create(scan)
    }

    fn get(&self, id: ScanId) -> Result<Option<EmergencyScan>, ScanStoreError> {
        (**self).get(id)
    }

    fn start(&self, id: ScanId) -> Result<EmergencyScan, ScanStoreError> {
        (**self).start(id)
    }

    fn complete(&self, id: ScanId, findings: ScanFindings) -> Result<EmergencyScan, ScanStoreError> {
        (**self).complete(id, findings)
    }

    fn fail(&self, id: ScanId, reason: String) -> Result<EmergencyScan, ScanStoreError> {
        (**self).fail(id, reason)
    }

    fn current(&self, scope: &ScanScope) -> Result<Option<EmergencyScan>, ScanStoreError> {
        (**self).current(scope)
    }

    fn list(&self, scope: &ScanScope, limit: usize) -> Result<Vec<EmergencyScan>, ScanStoreError> {
        (**self).list(scope, limit)
    }

    fn stats(&self, scope: Option<&ScanScope>) -> Result<ScanStats, ScanStoreError> {
        (**self).stats(scope)
    }
}
