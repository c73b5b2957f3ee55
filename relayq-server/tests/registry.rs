use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use relayq::core::registry::{ClientRequest, Liveness, Submitted};
use relayq::runtime::liveness::sweep_once;
use relayq::Registry;
use relayq_protocol::RoutingId;
use tokio::time::Instant;

const LEASE: Duration = Duration::from_millis(300);

fn request(client: u64, correlation_id: u32, service: &str) -> ClientRequest {
    ClientRequest {
        client: RoutingId::new(client),
        correlation_id,
        service: service.to_string(),
        payload: Bytes::from(format!("r{}", correlation_id)),
    }
}

fn worker(raw: u64) -> RoutingId {
    RoutingId::new(1000 + raw)
}

/// No worker is both busy and idle, and none sits in two idle lists or twice in one.
fn assert_idle_and_busy_exclusive(registry: &Registry, services: &[&str]) {
    let mut seen = HashSet::new();
    for service in services {
        if let Some(entry) = registry.service(service) {
            for identity in entry.idle() {
                assert!(seen.insert(*identity), "worker {} idle twice", identity);
                let w = registry.worker(*identity).expect("idle key must be in the table");
                assert!(!w.is_busy(), "worker {} is idle and busy", identity);
            }
        }
    }
}

#[test]
fn requests_for_one_service_are_dispatched_in_arrival_order() {
    let mut registry = Registry::new(LEASE);
    let now = Instant::now();

    for id in 1..=3 {
        let queued = registry.submit(request(id as u64, id, "x"), now);
        assert_eq!(queued, Submitted::Queued { depth: id as usize });
    }

    let (_, first) = registry.worker_ready(worker(1), "x", now);
    let first = first.expect("queued request should go straight to the new worker");
    assert_eq!(first.request.correlation_id, 1);
    assert_eq!(first.worker, worker(1));

    let (finished, second) = registry.complete(worker(1), now).expect("known worker");
    assert_eq!(finished.map(|f| f.correlation_id), Some(1));
    assert_eq!(second.expect("next request").request.correlation_id, 2);

    let (_, third) = registry.complete(worker(1), now).unwrap();
    assert_eq!(third.expect("next request").request.correlation_id, 3);

    let (_, none) = registry.complete(worker(1), now).unwrap();
    assert!(none.is_none());
    assert!(registry.is_idle(worker(1)));
}

#[test]
fn queued_requests_wait_for_a_worker_of_their_own_service() {
    let mut registry = Registry::new(LEASE);
    let now = Instant::now();

    // five workers, all for another service
    for w in 0..5 {
        assert!(registry.worker_ready(worker(w), "default", now).1.is_none());
    }
    assert_eq!(registry.idle("default"), 5);

    for id in 1..=7 {
        match registry.submit(request(1, id, "x"), now) {
            Submitted::Queued { .. } => {}
            other => panic!("request {} should queue, got {:?}", id, other),
        }
    }
    assert_eq!(registry.pending("x"), 7);
    assert_eq!(registry.idle("default"), 5, "other services' workers are untouched");

    let (_, assignment) = registry.worker_ready(worker(9), "x", now);
    let assignment = assignment.expect("oldest request should be dispatched");
    assert_eq!(assignment.request.correlation_id, 1);
    assert_eq!(registry.pending("x"), 6);
    assert!(!registry.is_idle(worker(9)));
}

#[test]
fn idle_workers_are_taken_longest_idle_first() {
    let mut registry = Registry::new(LEASE);
    let now = Instant::now();

    registry.worker_ready(worker(1), "x", now);
    registry.worker_ready(worker(2), "x", now);

    let a = registry.submit(request(1, 1, "x"), now);
    let b = registry.submit(request(1, 2, "x"), now);
    match (a, b) {
        (Submitted::Assigned(a), Submitted::Assigned(b)) => {
            assert_eq!(a.worker, worker(1));
            assert_eq!(b.worker, worker(2));
        }
        other => panic!("both requests should be assigned, got {:?}", other),
    }
    assert_eq!(registry.idle("x"), 0);
}

#[test]
fn idle_and_busy_stay_exclusive_across_mixed_operations() {
    let mut registry = Registry::new(LEASE);
    let services = ["x", "y"];
    let t0 = Instant::now();

    registry.worker_ready(worker(1), "x", t0);
    assert_idle_and_busy_exclusive(&registry, &services);

    registry.submit(request(1, 1, "x"), t0);
    assert_idle_and_busy_exclusive(&registry, &services);

    registry.submit(request(1, 2, "x"), t0);
    registry.worker_ready(worker(2), "x", t0);
    assert_idle_and_busy_exclusive(&registry, &services);

    // heartbeats while idle must not duplicate the idle entry
    registry.worker_ready(worker(3), "y", t0);
    registry.heartbeat(worker(3), t0).unwrap();
    registry.heartbeat(worker(3), t0).unwrap();
    assert_eq!(registry.idle("y"), 1);
    assert_idle_and_busy_exclusive(&registry, &services);

    // moving to another service leaves the old idle list
    registry.worker_ready(worker(3), "x", t0);
    assert_eq!(registry.idle("y"), 0);
    assert_eq!(registry.idle("x"), 1);
    assert_idle_and_busy_exclusive(&registry, &services);

    registry.complete(worker(1), t0).unwrap();
    registry.remove(worker(2));
    assert_idle_and_busy_exclusive(&registry, &services);

    sweep_once(&mut registry, t0 + LEASE * 2);
    assert_idle_and_busy_exclusive(&registry, &services);
    assert_eq!(registry.worker_count(), 0);
}

#[test]
fn lapsed_worker_is_evicted_from_table_and_idle_list() {
    let mut registry = Registry::new(LEASE);
    let t0 = Instant::now();

    registry.worker_ready(worker(1), "x", t0);
    assert_eq!(registry.idle("x"), 1);

    // exactly at expiry the lease still holds
    assert!(registry.sweep(t0 + LEASE).is_empty());

    let evicted = registry.sweep(t0 + LEASE + Duration::from_millis(1));
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].identity, worker(1));

    assert!(registry.worker(worker(1)).is_none());
    assert_eq!(registry.idle("x"), 0);
    assert!(!registry.is_idle(worker(1)));
    assert!(registry.heartbeat(worker(1), t0).is_err());
}

#[test]
fn sweeping_twice_is_the_same_as_sweeping_once() {
    let mut registry = Registry::new(LEASE);
    let t0 = Instant::now();

    registry.worker_ready(worker(1), "x", t0);
    registry.worker_ready(worker(2), "x", t0);
    registry.heartbeat(worker(2), t0 + LEASE).unwrap();

    let later = t0 + LEASE + Duration::from_millis(10);
    let first = registry.sweep(later);
    let count_after_first = registry.worker_count();
    let idle_after_first = registry.idle("x");

    let second = registry.sweep(later);

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(registry.worker_count(), count_after_first);
    assert_eq!(registry.idle("x"), idle_after_first);
    assert!(registry.worker(worker(2)).is_some());
}

#[test]
fn heartbeat_moves_a_worker_from_registered_to_alive() {
    let mut registry = Registry::new(LEASE);
    let t0 = Instant::now();

    registry.worker_ready(worker(1), "x", t0);
    assert_eq!(
        registry.worker(worker(1)).unwrap().liveness(t0),
        Liveness::Registered
    );

    let t1 = t0 + LEASE / 2;
    registry.heartbeat(worker(1), t1).unwrap();
    let w = registry.worker(worker(1)).unwrap();
    assert_eq!(w.liveness(t1), Liveness::Alive);
    assert_eq!(w.liveness(t1 + LEASE + Duration::from_millis(1)), Liveness::Expired);

    // renewed lease outlives the original expiry
    assert!(registry.sweep(t0 + LEASE + Duration::from_millis(1)).is_empty());
}

#[test]
fn evicting_a_busy_worker_reports_its_request() {
    let mut registry = Registry::new(LEASE);
    let t0 = Instant::now();

    registry.worker_ready(worker(1), "x", t0);
    registry.submit(request(42, 7, "x"), t0);

    let evicted = sweep_once(&mut registry, t0 + LEASE * 2);
    let in_flight = evicted[0].in_flight.expect("worker was busy");
    assert_eq!(in_flight.client, RoutingId::new(42));
    assert_eq!(in_flight.correlation_id, 7);

    // later requests queue rather than reach the dead worker
    assert!(matches!(
        registry.submit(request(42, 8, "x"), t0 + LEASE * 2),
        Submitted::Queued { depth: 1 }
    ));
}

#[test]
fn expired_idle_worker_is_skipped_before_the_sweep_runs() {
    let mut registry = Registry::new(LEASE);
    let t0 = Instant::now();

    registry.worker_ready(worker(1), "x", t0);
    let late = t0 + LEASE + Duration::from_millis(5);

    assert!(matches!(
        registry.submit(request(1, 1, "x"), late),
        Submitted::Queued { depth: 1 }
    ));
    assert_eq!(registry.idle("x"), 0);
}

#[test]
fn drain_pending_empties_every_queue() {
    let mut registry = Registry::new(LEASE);
    let now = Instant::now();

    registry.submit(request(1, 1, "x"), now);
    registry.submit(request(1, 2, "x"), now);
    registry.submit(request(1, 3, "y"), now);

    let mut drained: Vec<u32> = registry
        .drain_pending()
        .into_iter()
        .map(|r| r.correlation_id)
        .collect();
    drained.sort();

    assert_eq!(drained, vec![1, 2, 3]);
    assert_eq!(registry.pending("x"), 0);
    assert_eq!(registry.pending("y"), 0);
}

#[test]
fn busy_worker_that_re_registers_gives_up_its_request() {
    let mut registry = Registry::new(LEASE);
    let t0 = Instant::now();

    registry.worker_ready(worker(1), "x", t0);
    registry.submit(request(42, 7, "x"), t0);
    assert!(registry.worker(worker(1)).unwrap().is_busy());

    let (abandoned, next) = registry.worker_ready(worker(1), "x", t0);
    let abandoned = abandoned.expect("the in-flight request is handed back");
    assert_eq!(abandoned.client, RoutingId::new(42));
    assert_eq!(abandoned.correlation_id, 7);
    assert!(next.is_none());
    assert!(registry.is_idle(worker(1)));

    // an idle worker has nothing to give up
    let (abandoned, _) = registry.worker_ready(worker(1), "x", t0);
    assert!(abandoned.is_none());
    assert_eq!(registry.idle("x"), 1);
}
