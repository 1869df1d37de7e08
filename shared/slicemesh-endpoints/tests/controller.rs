use slicemesh_core::{FeatureFlags, Hostname, NamespacedName, PartitionId};
use slicemesh_endpoints::registry::{
    CounterMetricsSink, PartitionStore, ServiceRegistry, WorkloadRegistry,
};
use slicemesh_endpoints::{
    AddressType, EndpointConditions, EndpointEntry, EndpointPort, EndpointSliceController,
    HealthStatus, Partition, Proxy, Service, ServicePort, TargetRef, WorkloadIdentity,
    MCS_SERVICE_NAME_LABEL, SERVICE_NAME_LABEL,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

const SESSION_LABEL: &str = "slicemesh.io/persistent-session";

struct Mesh {
    partitions: Arc<PartitionStore>,
    services: Arc<ServiceRegistry>,
    workloads: Arc<WorkloadRegistry>,
    controller: EndpointSliceController,
}

fn mesh(flags: FeatureFlags) -> Mesh {
    let partitions = Arc::new(PartitionStore::new());
    let services = Arc::new(ServiceRegistry::new());
    let workloads = Arc::new(WorkloadRegistry::new());
    let controller = EndpointSliceController::new(
        partitions.clone(),
        services.clone(),
        workloads.clone(),
        Some(Arc::new(CounterMetricsSink::new())),
        flags,
    );
    Mesh {
        partitions,
        services,
        workloads,
        controller,
    }
}

fn reviews(session_label: bool) -> Service {
    let mut labels = BTreeMap::new();
    if session_label {
        labels.insert(SESSION_LABEL.to_string(), "true".to_string());
    }
    Service {
        hostname: Hostname::from("reviews.default.svc.cluster.local"),
        name: "reviews".to_string(),
        namespace: "default".to_string(),
        ports: vec![ServicePort {
            name: "http".to_string(),
            port: 9080,
            protocol: Default::default(),
        }],
        labels,
    }
}

fn entry(address: &str, ready: Option<bool>, serving: Option<bool>) -> EndpointEntry {
    EndpointEntry {
        addresses: vec![address.to_string()],
        conditions: EndpointConditions {
            ready,
            serving,
            terminating: None,
        },
        ..Default::default()
    }
}

fn slice(name: &str, entries: Vec<EndpointEntry>) -> Partition {
    Partition {
        name: PartitionId::from(name),
        namespace: "default".to_string(),
        labels: BTreeMap::from([(SERVICE_NAME_LABEL.to_string(), "reviews".to_string())]),
        address_type: AddressType::IPv4,
        endpoints: entries,
        ports: vec![EndpointPort {
            name: Some("http".to_string()),
            port: Some(9080),
            protocol: None,
        }],
    }
}

/// Stores the partition and notifies the controller, as an informer would.
fn deliver(mesh: &Mesh, partition: Partition) {
    mesh.partitions.apply(partition.clone());
    mesh.controller.on_partition_changed(&partition);
}

#[test]
fn overlapping_partitions_leave_one_survivor() {
    let flags = FeatureFlags {
        send_unhealthy_endpoints: false,
        persistent_session_label: SESSION_LABEL.to_string(),
    };
    let m = mesh(flags);
    let svc = m.services.upsert(reviews(true));

    // The same address is ready in one partition and draining in the other.
    deliver(
        &m,
        slice("reviews-a", vec![entry("10.0.0.1", Some(true), Some(true))]),
    );
    deliver(
        &m,
        slice("reviews-b", vec![entry("10.0.0.1", Some(false), Some(true))]),
    );

    let eps = m.controller.get_endpoints(&svc.hostname);
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].address, "10.0.0.1");
    // The winner follows partition map iteration order, so either status may survive.
    assert!(matches!(
        eps[0].health_status,
        HealthStatus::Healthy | HealthStatus::Draining
    ));
}

#[test]
fn removing_partitions_cleans_up_service() {
    let m = mesh(FeatureFlags::default());
    let svc = m.services.upsert(reviews(false));
    let a = slice("reviews-a", vec![entry("10.0.0.1", None, None)]);
    let b = slice("reviews-b", vec![entry("10.0.0.2", None, None)]);
    deliver(&m, a.clone());
    deliver(&m, b.clone());

    let affected = m.controller.on_partition_removed(&a);
    let remaining = &affected[&svc.hostname];
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].address, "10.0.0.2");

    m.controller.on_partition_removed(&b);
    assert!(!m.controller.has_endpoints(&svc.hostname));
    assert!(m.controller.get_endpoints(&svc.hostname).is_empty());
}

#[test]
fn multicluster_and_unowned_partitions_ignored() {
    let m = mesh(FeatureFlags::default());
    let svc = m.services.upsert(reviews(false));

    let mut mirrored = slice("reviews-mcs", vec![entry("10.1.0.1", None, None)]);
    mirrored
        .labels
        .insert(MCS_SERVICE_NAME_LABEL.to_string(), "reviews".to_string());
    assert!(m.controller.on_partition_changed(&mirrored).is_empty());

    let mut unowned = slice("orphan", vec![entry("10.1.0.2", None, None)]);
    unowned.labels.clear();
    assert!(m.controller.on_partition_changed(&unowned).is_empty());

    assert!(!m.controller.has_endpoints(&svc.hostname));
}

#[test]
fn relabelled_partition_removal_drops_stale_contribution() {
    let m = mesh(FeatureFlags::default());
    let svc = m.services.upsert(reviews(false));
    let local = slice("reviews-a", vec![entry("10.0.0.1", None, None)]);
    deliver(&m, local.clone());
    assert!(m.controller.has_endpoints(&svc.hostname));

    // Marked multi-cluster after it contributed; removal must still clear it.
    let mut mirrored = local;
    mirrored
        .labels
        .insert(MCS_SERVICE_NAME_LABEL.to_string(), "reviews".to_string());
    let affected = m.controller.on_partition_removed(&mirrored);
    assert!(affected[&svc.hostname].is_empty());
    assert!(!m.controller.has_endpoints(&svc.hostname));
}

#[test]
fn removed_service_forgets_its_endpoints() {
    let m = mesh(FeatureFlags::default());
    let svc = m.services.upsert(reviews(false));
    deliver(&m, slice("reviews-a", vec![entry("10.0.0.1", None, None)]));
    assert_eq!(m.controller.hostnames(), vec![svc.hostname.clone()]);

    assert!(m.controller.on_service_removed(&svc.hostname));
    assert!(!m.controller.on_service_removed(&svc.hostname));
    assert!(m.controller.hostnames().is_empty());
}

#[test]
fn rebuild_reprocesses_listed_partitions() {
    let m = mesh(FeatureFlags::default());
    let svc = m.services.upsert(reviews(false));
    m.partitions.apply(slice("reviews-a", vec![entry("10.0.0.1", None, None)]));
    m.partitions.apply(slice("reviews-b", vec![entry("10.0.0.2", None, None)]));
    assert!(!m.controller.has_endpoints(&svc.hostname));

    let eps = m
        .controller
        .rebuild_service("reviews", "default", &svc.hostname);
    let mut addresses: Vec<_> = eps.iter().map(|e| e.address.clone()).collect();
    addresses.sort();
    assert_eq!(
        addresses,
        vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
    );
}

#[test]
fn workload_arrival_resyncs_waiting_partition() {
    let m = mesh(FeatureFlags::default());
    let svc = m.services.upsert(reviews(false));
    let mut waiting = entry("10.0.0.5", Some(true), None);
    waiting.target_ref = Some(TargetRef {
        kind: "Pod".to_string(),
        name: "reviews-v1-0".to_string(),
        namespace: "default".to_string(),
    });
    deliver(&m, slice("reviews-a", vec![waiting]));
    assert!(!m.controller.has_endpoints(&svc.hostname));

    let pending = m.workloads.upsert(WorkloadIdentity {
        name: "reviews-v1-0".to_string(),
        namespace: "default".to_string(),
        addresses: vec!["10.0.0.5".to_string()],
        ..Default::default()
    });
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].partition,
        NamespacedName::new("default", "reviews-a")
    );

    let affected = m.controller.resync_partition(&pending[0].partition);
    let eps = &affected[&svc.hostname];
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].workload_name.as_deref(), Some("reviews-v1-0"));
}

#[test]
fn instances_by_port_through_controller() {
    let m = mesh(FeatureFlags::default());
    let svc = m.services.upsert(reviews(false));
    m.partitions.apply(slice("reviews-a", vec![entry("10.0.0.1", None, None)]));
    m.partitions.apply(slice("reviews-b", vec![entry("10.0.0.1", None, None)]));

    // Point queries do not deduplicate.
    let instances = m.controller.service_instances_by_port(&svc.hostname, 9080);
    assert_eq!(instances.len(), 2);
    assert!(m
        .controller
        .service_instances_by_port(&Hostname::from("unknown.default.svc.cluster.local"), 9080)
        .is_empty());

    let proxy = Proxy {
        id: "reviews-v1-0.default".to_string(),
        ip_addresses: vec!["10.0.0.1".to_string()],
        namespace: "default".to_string(),
    };
    assert_eq!(m.controller.service_instances_for_proxy(&proxy).len(), 2);
}

#[test]
fn concurrent_writers_and_readers() {
    let m = Arc::new(mesh(FeatureFlags::default()));
    let svc = m.services.upsert(reviews(false));
    let hostname = svc.hostname.clone();

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for round in 0..50 {
                    let entries = (0..4)
                        .map(|i| entry(&format!("10.{w}.{round}.{i}"), None, None))
                        .collect();
                    deliver(&m, slice(&format!("reviews-{w}"), entries));
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            let hostname = hostname.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let eps = m.controller.get_endpoints(&hostname);
                    // Every partition contributes whole rounds of four.
                    assert_eq!(eps.len() % 4, 0);
                    assert!(eps
                        .iter()
                        .all(|e| e.service_port_name == "http" && e.endpoint_port == 9080));
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    let eps = m.controller.get_endpoints(&hostname);
    assert_eq!(eps.len(), 16);
    assert!(eps
        .iter()
        .all(|e| e.address.split('.').nth(2) == Some("49")));
}
