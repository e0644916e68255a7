use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};

use cluster_ipc::domains::envelope::Envelope;
use cluster_ipc::services::acks::{new_correlation_id, AckRegistry};

fn response(id: &str, responder: Option<u16>) -> Envelope {
    Envelope::request("splashtail", "ping", id, Map::new(), None).success(responder, json!({"ok": true}))
}

#[tokio::test]
async fn late_resolve_after_expiry_is_dropped() {
    let registry = AckRegistry::new();
    let id = new_correlation_id();
    let waiter = registry.register(&id, 1).unwrap();

    let collected = waiter.collect(Duration::from_millis(20)).await;
    assert!(!collected.is_complete());
    assert!(collected.envelopes.is_empty());
    assert!(!registry.contains(&id));

    assert!(!registry.resolve(&id, response(&id, None)));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn zero_expected_registers_nothing() {
    let registry = AckRegistry::new();
    let waiter = registry.register("nobody", 0).unwrap();
    assert!(registry.is_empty());
    let collected = waiter.collect(Duration::from_millis(10)).await;
    assert!(collected.is_complete());
    assert!(collected.envelopes.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_registrations_never_collide() {
    let registry = AckRegistry::new();
    let mut tasks = Vec::new();
    for _ in 0..10_000 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let id = new_correlation_id();
            let waiter = registry.register(&id, 1).unwrap();
            (id, waiter)
        }));
    }

    let mut waiters = Vec::with_capacity(tasks.len());
    for task in tasks {
        waiters.push(task.await.unwrap());
    }
    assert_eq!(registry.len(), 10_000);

    for (id, _) in &waiters {
        assert!(registry.resolve(id, response(id, None)));
    }
    assert!(registry.is_empty());

    for (id, mut waiter) in waiters {
        assert_eq!(waiter.recv().await.unwrap().correlation_id, id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn expiry_and_delivery_race_resolves_exactly_once() {
    let registry = AckRegistry::new();
    let delivered = Arc::new(AtomicUsize::new(0));
    let expired = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..2_000 {
        let id = new_correlation_id();
        let mut waiter = registry.register(&id, 1).unwrap();

        let resolver = {
            let registry = registry.clone();
            let id = id.clone();
            let delivered = delivered.clone();
            tokio::spawn(async move {
                if registry.resolve(&id, response(&id, None)) {
                    delivered.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        let expirer = {
            let expired = expired.clone();
            tokio::spawn(async move {
                let late = waiter.expire();
                let got = waiter.recv().await;
                // Whatever the resolver managed to hand over is still observable.
                if late.is_empty() && got.is_none() {
                    expired.fetch_add(1, Ordering::SeqCst);
                }
                late.len() + usize::from(got.is_some())
            })
        };
        tasks.push((resolver, expirer));
    }

    let mut received = 0;
    for (resolver, expirer) in tasks {
        resolver.await.unwrap();
        received += expirer.await.unwrap();
    }

    assert_eq!(received, delivered.load(Ordering::SeqCst));
    assert_eq!(
        delivered.load(Ordering::SeqCst) + expired.load(Ordering::SeqCst),
        2_000
    );
    assert!(registry.is_empty());
}
