//! Runs one emergency scan end to end.

use tracing::{info, warn};

use invintel_core::{EmergencyConfig, EngineError, EngineResult, EntityError, ScanId, StoreId};

use crate::detector::{DemandCurve, StockSignal, evaluate};
use crate::scan::{CancellationToken, EmergencyScan, ScanFindings, ScanScope, TriggerType};
use crate::store::ScanStore;

/// Live stock signals, provided by the data collaborator.
pub trait SignalSource: Send + Sync {
    /// Stores the scope covers.
    fn stores(&self, scope: &ScanScope) -> EngineResult<Vec<StoreId>>;

    fn signals(&self, store_id: &StoreId) -> EngineResult<Vec<StockSignal>>;
}

/// Everything a scan needs besides its scope and trigger.
pub struct ScanContext<'a> {
    pub store: &'a dyn ScanStore,
    pub source: &'a dyn SignalSource,
    pub curve: &'a dyn DemandCurve,
    pub config: &'a EmergencyConfig,
    pub cancel: &'a CancellationToken,
}

/// Marks a started scan failed if dropped before it reached a terminal state.
struct RunningScan<'a> {
    store: &'a dyn ScanStore,
    id: ScanId,
    finished: bool,
}

impl<'a> RunningScan<'a> {
    fn new(store: &'a dyn ScanStore, id: ScanId) -> Self {
        Self {
            store,
            id,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for RunningScan<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let reason = if std::thread::panicking() {
            "scan aborted by a panic"
        } else {
            "scan aborted before completion"
        };
        warn!(scan_id = %self.id, reason, "releasing unfinished emergency scan");
        if let Err(e) = self.store.fail(self.id, reason.to_string()) {
            warn!(scan_id = %self.id, error = %e, "could not mark unfinished scan failed");
        }
    }
}

/// Create, start and drive a scan to a terminal state.
///
/// Returns `Err(Conflict)` when another scan of the same scope is running
/// (the rejected scan is recorded as failed). Otherwise returns the finished
/// scan, which is `Failed` when cancelled or when no store produced usable
/// signals; per-store failures are recorded in `errors` and do not abort.
/// If the scan cannot be stored as finished, it is marked failed before the
/// error is returned.
pub fn run_emergency_scan(
    ctx: &ScanContext<'_>,
    scope: ScanScope,
    trigger: TriggerType,
) -> EngineResult<EmergencyScan> {
    let id = ctx.store.create(EmergencyScan::new(scope.clone(), trigger))?;
    if let Err(e) = ctx.store.start(id) {
        warn!(scan_id = %id, scope = %scope, error = %e, "emergency scan rejected");
        return Err(e.into());
    }
    info!(scan_id = %id, scope = %scope, trigger = ?trigger, "emergency scan started");
    let mut guard = RunningScan::new(ctx.store, id);

    let outcome = scan_stores(ctx, &scope);

    let scan = match outcome {
        Ok(findings) => {
            let scan = ctx.store.complete(id, findings)?;
            guard.finish();
            info!(
                scan_id = %id,
                emergencies = scan.emergencies.len(),
                anomalies = scan.anomalies.len(),
                errors = scan.errors.len(),
                "emergency scan completed"
            );
            scan
        }
        Err(e) => {
            warn!(scan_id = %id, error = %e, "emergency scan failed");
            let scan = ctx.store.fail(id, e.to_string())?;
            guard.finish();
            scan
        }
    };
    Ok(scan)
}

fn scan_stores(ctx: &ScanContext<'_>, scope: &ScanScope) -> EngineResult<ScanFindings> {
    let stores: Vec<StoreId> = ctx
        .source
        .stores(scope)?
        .into_iter()
        .filter(|s| scope.allows(s))
        .collect();
    if stores.is_empty() {
        return Err(EngineError::unavailable(format!("no stores to scan for {scope}")));
    }

    let mut findings = ScanFindings::default();
    let mut evaluated = 0usize;

    for store_id in &stores {
        if ctx.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let signals = match ctx.source.signals(store_id) {
            Ok(s) => s,
            Err(e) => {
                warn!(store = %store_id, error = %e, "store skipped in emergency scan");
                findings
                    .errors
                    .push(EntityError::new(None, Some(store_id.clone()), e.to_string()));
                continue;
            }
        };

        for signal in &signals {
            if &signal.store_id != store_id {
                findings.errors.push(EntityError::new(
                    Some(signal.product_id.clone()),
                    Some(store_id.clone()),
                    format!("signal reported for store {}", signal.store_id),
                ));
                continue;
            }
            match evaluate(signal, ctx.curve, ctx.config) {
                Ok(detection) => {
                    evaluated += 1;
                    findings.emergencies.extend(detection.emergency);
                    findings.anomalies.extend(detection.anomalies);
                }
                Err(e) => findings.errors.push(EntityError::new(
                    Some(signal.product_id.clone()),
                    Some(store_id.clone()),
                    e.to_string(),
                )),
            }
        }
    }

    if evaluated == 0 {
        return Err(EngineError::unavailable(format!(
            "no usable stock signals for {scope} ({} store errors)",
            findings.errors.len()
        )));
    }

    findings.emergencies.sort_by(|a, b| {
        a.level
            .cmp(&b.level)
            .then_with(|| a.store_id.cmp(&b.store_id))
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    Ok(findings)
}
