use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{Duration, NaiveDate};

use invintel_core::EmergencyLevel;
use invintel_emergency::{
    AnomalyKind, CancellationToken, ScanScope, ScanStatus, SignalSource, StockSignal, TriggerType,
};
use invintel_engine::{
    DemandAggregator, DemandPoint, DemandSeries, DemandWindow, DistributionRequest, EngineConfig,
    EngineError, EngineResult, InMemoryPolicySink, InventoryEngine, ProductId, Quadrant,
    StoreDemand, StoreId,
};
use invintel_policy::PolicyBasis;

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
}

fn pid(code: &str) -> ProductId {
    ProductId::new(code).unwrap()
}

fn sid(code: &str) -> StoreId {
    StoreId::new(code).unwrap()
}

/// Daily quantities over the 90 days ending at `as_of()`.
fn daily(product: &str, store: &str, qty: impl Fn(i64) -> f64, unit_price: f64) -> DemandSeries {
    let window = DemandWindow::trailing(as_of(), 90);
    let points = (0..90)
        .map(|d| {
            let q = qty(d);
            DemandPoint::new(window.start + Duration::days(d), q, q * unit_price)
        })
        .filter(|p| p.quantity != 0.0)
        .collect();
    DemandSeries::new(pid(product), sid(store), window, points)
}

#[derive(Default)]
struct FakeAggregator {
    series: Vec<DemandSeries>,
    stock: HashMap<(ProductId, StoreId), f64>,
}

impl DemandAggregator for FakeAggregator {
    fn fetch_demand_series(
        &self,
        product_id: Option<&ProductId>,
        store_id: Option<&StoreId>,
        window: DemandWindow,
    ) -> EngineResult<Vec<DemandSeries>> {
        Ok(self
            .series
            .iter()
            .filter(|s| product_id.is_none_or(|p| p == &s.product_id))
            .filter(|s| store_id.is_none_or(|st| st == &s.store_id))
            .map(|s| DemandSeries {
                window,
                ..s.clone()
            })
            .collect())
    }

    fn fetch_current_stock(&self, product_id: &ProductId, store_id: &StoreId) -> EngineResult<f64> {
        self.stock
            .get(&(product_id.clone(), store_id.clone()))
            .copied()
            .ok_or_else(|| EngineError::not_found(format!("stock for {product_id} @ {store_id}")))
    }
}

fn engine_with(aggregator: FakeAggregator, config: EngineConfig) -> (InventoryEngine, Arc<InMemoryPolicySink>) {
    invintel_observability::init_for_tests();
    let sink = Arc::new(InMemoryPolicySink::new());
    let engine = InventoryEngine::new(Arc::new(aggregator), Arc::new(config), sink.clone());
    (engine, sink)
}

fn planning_fixture() -> FakeAggregator {
    let mut agg = FakeAggregator::default();
    agg.series.push(daily("STEADY", "S1", |_| 10.0, 10.0));
    agg.series.push(daily("LUMPY", "S1", |d| if d % 2 == 0 { 4.0 } else { 0.0 }, 5.0));
    agg.series.push(daily("DEAD", "S1", |_| 0.0, 3.0));
    let mut broken = daily("BROKEN", "S1", |_| 1.0, 1.0);
    broken.points[3].quantity = f64::NAN;
    agg.series.push(broken);

    agg.stock.insert((pid("STEADY"), sid("S1")), 40.0);
    agg.stock.insert((pid("DEAD"), sid("S1")), 0.0);
    agg.stock.insert((pid("BROKEN"), sid("S1")), 5.0);
    // LUMPY has no stock reading.
    agg
}

#[test]
fn plan_classifies_computes_and_stores_policies() {
    let (engine, sink) = engine_with(planning_fixture(), EngineConfig::default());

    let report = engine.plan(as_of(), None, None).unwrap();

    assert_eq!(report.window, DemandWindow::trailing(as_of(), 90));
    assert_eq!(report.classification.results.len(), 3);
    assert_eq!(report.summary.count(Quadrant::NoSales), 1);

    // BROKEN fails classification, LUMPY has no stock reading.
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().any(|e| e.product_id == Some(pid("BROKEN"))));
    assert!(report.errors.iter().any(|e| e.product_id == Some(pid("LUMPY"))));

    let steady = report.policies.iter().find(|p| p.product_id == pid("STEADY")).unwrap();
    assert_eq!(steady.basis, PolicyBasis::Statistical);
    assert!((steady.safety).abs() < 1e-9);
    assert!((steady.reorder_point - 30.0).abs() < 1e-9);
    assert!((steady.maximum - 100.0).abs() < 1e-9);
    assert_eq!(steady.suggested_order, 60);
    assert!(!steady.needs_reorder(40.0));

    let dead = report.policies.iter().find(|p| p.product_id == pid("DEAD")).unwrap();
    assert_eq!(dead.basis, PolicyBasis::NoSalesFloor);
    assert_eq!(dead.quadrant, Quadrant::NoSales);
    assert_eq!(dead.suggested_order, 2);

    assert_eq!(sink.all(), report.policies);
}

#[test]
fn plan_narrowed_to_one_product() {
    let (engine, sink) = engine_with(planning_fixture(), EngineConfig::default());
    let report = engine.plan(as_of(), Some(&pid("STEADY")), Some(&sid("S1"))).unwrap();
    assert_eq!(report.policies.len(), 1);
    assert!(report.errors.is_empty());
    assert_eq!(sink.all().len(), 1);
}

#[test]
fn plan_policies_use_each_series_own_demand() {
    let mut agg = FakeAggregator::default();
    let mut broken = daily("BROKEN", "S1", |_| 1.0, 1.0);
    broken.points[0].revenue = f64::NAN;
    agg.series.push(broken);
    agg.series.push(daily("STEADY", "S1", |_| 10.0, 10.0));
    agg.series.push(daily("SLOW", "S1", |_| 2.0, 10.0));
    agg.stock.insert((pid("BROKEN"), sid("S1")), 1.0);
    agg.stock.insert((pid("STEADY"), sid("S1")), 40.0);
    agg.stock.insert((pid("SLOW"), sid("S1")), 40.0);
    let (engine, _) = engine_with(agg, EngineConfig::default());

    let report = engine.plan(as_of(), None, None).unwrap();
    assert_eq!(report.errors.len(), 1);
    let rop = |code: &str| {
        report
            .policies
            .iter()
            .find(|p| p.product_id == pid(code))
            .map(|p| p.reorder_point)
            .unwrap()
    };
    assert!((rop("STEADY") - 30.0).abs() < 1e-9);
    assert!((rop("SLOW") - 6.0).abs() < 1e-9);
}

#[test]
fn plan_without_demand_data_is_unavailable() {
    let (engine, sink) = engine_with(FakeAggregator::default(), EngineConfig::default());
    let err = engine.plan(as_of(), None, None).unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)));
    assert!(sink.all().is_empty());
}

#[test]
fn plan_is_deterministic() {
    let (engine, _) = engine_with(planning_fixture(), EngineConfig::default());
    let a = engine.plan(as_of(), None, None).unwrap();
    let b = engine.plan(as_of(), None, None).unwrap();
    assert_eq!(a, b);
}

#[test]
fn invalid_configuration_never_reaches_the_algorithms() {
    let mut config = EngineConfig::default();
    config.dpdu.demand_weight = 0.9;
    let (engine, _) = engine_with(planning_fixture(), config);

    let request = DistributionRequest {
        product_id: None,
        supply: 10,
        stores: vec![StoreDemand::new(sid("S1"), 5, 1.0)],
    };
    assert!(matches!(engine.distribute(&request), Err(EngineError::InvalidConfig(_))));
    assert!(matches!(engine.plan(as_of(), None, None), Err(EngineError::InvalidConfig(_))));
}

#[test]
fn distribute_through_the_engine() {
    let (engine, _) = engine_with(FakeAggregator::default(), EngineConfig::default());
    let request = DistributionRequest {
        product_id: Some(pid("SKU-1")),
        supply: 60,
        stores: vec![
            StoreDemand::new(sid("S1"), 100, 2.0),
            StoreDemand::new(sid("S2"), 50, 10.0),
        ],
    };
    let result = engine.distribute(&request).unwrap();
    assert!(result.is_scarce());
    assert_eq!(result.total_allocated(), 60);
    assert!(result.allocations[0].allocated > result.allocations[1].allocated);

    let many = engine.distribute_many(&[request.clone(), request]).unwrap();
    assert_eq!(many.len(), 2);
    assert_eq!(many[0], many[1]);
}

fn signal(store: &str, product: &str, stock: f64, sales_today: f64) -> StockSignal {
    StockSignal {
        product_id: pid(product),
        store_id: sid(store),
        observed_at: as_of().and_hms_opt(12, 0, 0).unwrap(),
        current_stock: stock,
        remaining_period_demand: 20.0,
        sales_today,
        expected_daily_sales: 20.0,
        historical_daily_mean: 20.0,
        days_without_movement: 0,
    }
}

struct StaticSignals(HashMap<StoreId, Vec<StockSignal>>);

impl SignalSource for StaticSignals {
    fn stores(&self, _scope: &ScanScope) -> EngineResult<Vec<StoreId>> {
        let mut stores: Vec<_> = self.0.keys().cloned().collect();
        stores.sort();
        Ok(stores)
    }

    fn signals(&self, store_id: &StoreId) -> EngineResult<Vec<StockSignal>> {
        Ok(self.0.get(store_id).cloned().unwrap_or_default())
    }
}

/// Blocks inside the first `signals` call until released.
struct GatedSignals {
    entered: Mutex<Option<Sender<()>>>,
    release: Mutex<Receiver<()>>,
}

impl SignalSource for GatedSignals {
    fn stores(&self, _scope: &ScanScope) -> EngineResult<Vec<StoreId>> {
        Ok(vec![sid("S1")])
    }

    fn signals(&self, _store_id: &StoreId) -> EngineResult<Vec<StockSignal>> {
        if let Some(tx) = self.entered.lock().unwrap().take() {
            tx.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        Ok(vec![signal("S1", "A", 5.0, 10.0)])
    }
}

#[test]
fn scan_finds_emergencies_and_moves_current_pointer() {
    let (engine, _) = engine_with(FakeAggregator::default(), EngineConfig::default());
    let mut by_store = HashMap::new();
    by_store.insert(sid("S1"), vec![signal("S1", "A", 5.0, 15.0), signal("S1", "B", 500.0, 10.0)]);
    by_store.insert(sid("S2"), vec![signal("S2", "A", -3.0, 10.0)]);
    let engine = engine.with_signal_source(Arc::new(StaticSignals(by_store)));

    let first = engine.run_emergency_scan(ScanScope::Network, TriggerType::Manual).unwrap();
    assert_eq!(first.status, ScanStatus::Completed);
    assert_eq!(first.emergencies.len(), 2);
    assert_eq!(first.emergencies[0].level, EmergencyLevel::Critical);
    assert_eq!(first.anomalies.len(), 1);
    assert_eq!(first.anomalies[0].kind, AnomalyKind::NegativeStock);

    let second = engine.run_emergency_scan(ScanScope::Network, TriggerType::Scheduled).unwrap();
    let current = engine.current_scan(&ScanScope::Network).unwrap().unwrap();
    assert_eq!(current.id, second.id);
    assert_eq!(engine.scan_history(&ScanScope::Network, 10).unwrap().len(), 2);
}

#[test]
fn concurrent_scan_in_same_scope_is_rejected() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let (engine, _) = engine_with(FakeAggregator::default(), EngineConfig::default());
    let engine = Arc::new(engine.with_signal_source(Arc::new(GatedSignals {
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(release_rx),
    })));

    let worker = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.run_emergency_scan(ScanScope::Network, TriggerType::Scheduled))
    };

    // First scan is now running and parked inside the signal source.
    entered_rx.recv().unwrap();
    let err = engine
        .run_emergency_scan(ScanScope::Network, TriggerType::Manual)
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    assert!(engine.current_scan(&ScanScope::Network).unwrap().is_none());

    release_tx.send(()).unwrap();
    let first = worker.join().unwrap().unwrap();
    assert_eq!(first.status, ScanStatus::Completed);
    assert_eq!(engine.current_scan(&ScanScope::Network).unwrap().unwrap().id, first.id);

    let history = engine.scan_history(&ScanScope::Network, 10).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|s| matches!(s.status, ScanStatus::Failed { .. })));
}

#[test]
fn cancelled_scan_is_marked_failed() {
    let (engine, _) = engine_with(FakeAggregator::default(), EngineConfig::default());
    let mut by_store = HashMap::new();
    by_store.insert(sid("S1"), vec![signal("S1", "A", 5.0, 10.0)]);
    let engine = engine.with_signal_source(Arc::new(StaticSignals(by_store)));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let scan = engine
        .run_emergency_scan_with(ScanScope::Network, TriggerType::Manual, &cancel)
        .unwrap();
    assert!(matches!(scan.status, ScanStatus::Failed { ref reason } if reason == "cancelled"));
    assert!(engine.current_scan(&ScanScope::Network).unwrap().is_none());
}

#[test]
fn scan_without_signal_source_is_unavailable() {
    let (engine, _) = engine_with(FakeAggregator::default(), EngineConfig::default());
    let err = engine
        .run_emergency_scan(ScanScope::Store(sid("S1")), TriggerType::Manual)
        .unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)));
}
