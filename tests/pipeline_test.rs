//! End-to-end ingestion tests: alerts in, incidents out

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use vigil_node::bus::EventBus;
use vigil_node::cluster::{ClusterConfig, ClusterEngine};
use vigil_node::error::Error;
use vigil_node::evidence::EvidenceArchive;
use vigil_node::ingest::IngestionCoordinator;
use vigil_node::ledger::{spawn_confirmation_task, LedgerBridge, SimulatedGateway};
use vigil_node::model::{AlertSource, AlertStatus, IncidentStatus, NewAlert};
use vigil_node::store::IncidentStore;

struct TestNode {
    _dir: TempDir,
    store: IncidentStore,
    coordinator: Arc<IngestionCoordinator>,
}

async fn start_node() -> TestNode {
    let dir = TempDir::new().unwrap();
    let store = IncidentStore::open(dir.path().join("node.db")).unwrap();
    let bus = EventBus::new(256);
    let archive = EvidenceArchive::new(dir.path().join("efir")).await.unwrap();

    let (gateway, confirm_rx) = SimulatedGateway::new(Duration::from_millis(20));
    spawn_confirmation_task(store.clone(), bus.clone(), confirm_rx);

    let bridge = LedgerBridge::new(Arc::new(gateway), store.clone(), bus.clone());
    let engine = ClusterEngine::new(ClusterConfig::default());
    let coordinator = Arc::new(IngestionCoordinator::new(
        store.clone(),
        engine,
        bus,
        bridge,
        archive,
    ));

    TestNode {
        _dir: dir,
        store,
        coordinator,
    }
}

fn sos(id: &str, lat: f64, lng: f64) -> NewAlert {
    NewAlert {
        alert_id: id.to_string(),
        digital_id: Some(format!("did-{}", id)),
        tourist_id: None,
        lat: Some(lat),
        lng: Some(lng),
        timestamp: Utc::now(),
        source: AlertSource::App,
        media_refs: vec![],
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_third_nearby_alert_opens_an_incident() {
    let node = start_node().await;

    let first = node
        .coordinator
        .ingest_alert(&sos("a-1", 19.0760, 72.8777))
        .await
        .unwrap();
    assert!(first.created);
    assert!(first.incident.is_none());
    assert_eq!(first.alert.status, AlertStatus::Processed);

    let second = node
        .coordinator
        .ingest_alert(&sos("a-2", 19.0765, 72.8780))
        .await
        .unwrap();
    assert!(second.incident.is_none());

    let third = node
        .coordinator
        .ingest_alert(&sos("a-3", 19.0762, 72.8775))
        .await
        .unwrap();
    let incident = third.incident.expect("third alert should complete the cluster");

    assert_eq!(incident.alert_ids, vec!["a-1", "a-2", "a-3"]);
    assert_eq!(incident.priority, 3);
    assert_eq!(incident.status, IncidentStatus::Received);
    assert_eq!(third.alert.status, AlertStatus::Escalated);

    for id in ["a-1", "a-2", "a-3"] {
        let alert = node.store.get_alert(id).unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::Escalated);
        assert_eq!(
            alert.incident_id.as_deref(),
            Some(incident.incident_id.as_str())
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scattered_alerts_never_group() {
    let node = start_node().await;

    // Roughly 5 km between consecutive points.
    node.coordinator
        .ingest_alert(&sos("a-1", 19.0760, 72.8777))
        .await
        .unwrap();
    node.coordinator
        .ingest_alert(&sos("a-2", 19.1210, 72.8777))
        .await
        .unwrap();
    let third = node
        .coordinator
        .ingest_alert(&sos("a-3", 19.1660, 72.8777))
        .await
        .unwrap();

    assert!(third.incident.is_none());
    assert!(node.store.list_incidents(None, 10, 0).unwrap().is_empty());
    for id in ["a-1", "a-2", "a-3"] {
        assert_eq!(
            node.store.get_alert(id).unwrap().unwrap().status,
            AlertStatus::Processed
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alert_without_coordinates_settles_as_processed() {
    let node = start_node().await;

    let mut blind = sos("a-blind", 0.0, 0.0);
    blind.lat = None;
    blind.lng = None;

    let outcome = node.coordinator.ingest_alert(&blind).await.unwrap();
    assert!(outcome.incident.is_none());
    assert_eq!(outcome.alert.status, AlertStatus::Processed);

    // Two more nearby alerts are not enough without the blind one.
    node.coordinator
        .ingest_alert(&sos("a-1", 19.0760, 72.8777))
        .await
        .unwrap();
    let second = node
        .coordinator
        .ingest_alert(&sos("a-2", 19.0761, 72.8778))
        .await
        .unwrap();
    assert!(second.incident.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_replayed_alert_changes_nothing() {
    let node = start_node().await;

    let first = node
        .coordinator
        .ingest_alert(&sos("a-1", 19.0760, 72.8777))
        .await
        .unwrap();
    assert!(first.created);

    let replay = node
        .coordinator
        .ingest_alert(&sos("a-1", 48.8566, 2.3522))
        .await
        .unwrap();
    assert!(!replay.created);
    assert_eq!(replay.alert.lat, first.alert.lat);
    assert_eq!(node.store.list_alerts(10, 0).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_alert_id_is_rejected() {
    let node = start_node().await;

    let err = node
        .coordinator
        .ingest_alert(&sos("  ", 19.0760, 72.8777))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(node.store.list_alerts(10, 0).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_late_alert_joins_a_new_cluster_not_an_old_incident() {
    let node = start_node().await;

    // First cluster of three.
    for (id, lat) in [("a-1", 19.0760), ("a-2", 19.0761), ("a-3", 19.0762)] {
        node.coordinator
            .ingest_alert(&sos(id, lat, 72.8777))
            .await
            .unwrap();
    }
    assert_eq!(node.store.list_incidents(None, 10, 0).unwrap().len(), 1);

    // Three fresh alerts at the same spot open a second incident; the
    // escalated members of the first are out of every later snapshot.
    for (id, lat) in [("b-1", 19.0760), ("b-2", 19.0761), ("b-3", 19.0762)] {
        node.coordinator
            .ingest_alert(&sos(id, lat, 72.8777))
            .await
            .unwrap();
    }

    let incidents = node.store.list_incidents(None, 10, 0).unwrap();
    assert_eq!(incidents.len(), 2);
    for incident in &incidents {
        assert_eq!(incident.alert_ids.len(), 3);
    }
}
