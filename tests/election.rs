//! Leader election over real loopback sockets.
//!
//! Each test owns a fixed port so they can run in parallel.

use std::time::Duration;

use tokio::time::Instant;

use monarch::config::ElectionConfig;
use monarch::election::{ElectionError, ElectionOutcome, Identity, LeaderElector};

mod common;

fn config(port: u16) -> ElectionConfig {
    ElectionConfig {
        bind_address: format!("127.0.0.1:{port}"),
        connect_timeout_ms: 1_000,
        reply_timeout_ms: 300,
        restart_worker_on_notify: true,
    }
}

#[tokio::test]
async fn concurrent_candidates_elect_exactly_one_master() {
    let config = config(28311);
    let a = LeaderElector::new(&config, Identity::new("app", 101));
    let b = LeaderElector::new(&config, Identity::new("app", 102));

    let (first, second) = tokio::join!(a.elect(), b.elect());

    let (lease, master, follower_saw) = match (first, second) {
        (ElectionOutcome::Master(lease), ElectionOutcome::FollowerNotified(seen)) => {
            (lease, a.identity().clone(), seen)
        }
        (ElectionOutcome::FollowerNotified(seen), ElectionOutcome::Master(lease)) => {
            (lease, b.identity().clone(), seen)
        }
        other => panic!("expected one master and one follower, got {other:?}"),
    };

    assert_eq!(follower_saw, master);
    drop(lease);
}

#[tokio::test]
async fn master_hears_about_later_candidates() {
    let config = config(28312);
    let master = LeaderElector::new(&config, Identity::new("app", 201));
    let mut lease = match master.elect().await {
        ElectionOutcome::Master(lease) => lease,
        other => panic!("expected master, got {other:?}"),
    };

    let candidate = Identity::new("app", 202);
    let outcome = LeaderElector::new(&config, candidate.clone()).elect().await;
    assert!(matches!(outcome, ElectionOutcome::FollowerNotified(ref m) if *m == Identity::new("app", 201)));

    let follower = common::within(Duration::from_secs(5), lease.next_follower()).await;
    assert_eq!(follower, Some(candidate));
}

#[tokio::test]
async fn silent_listener_is_a_communication_failure() {
    let config = config(28313);
    // an unrelated program holding the port that never answers
    let _squatter = std::net::TcpListener::bind("127.0.0.1:28313").unwrap();

    let started = Instant::now();
    let outcome = LeaderElector::new(&config, Identity::new("app", 301))
        .elect()
        .await;

    assert!(matches!(
        outcome,
        ElectionOutcome::CommunicationFailure(ElectionError::ReplyTimeout(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn releasing_the_lease_frees_the_endpoint() {
    let config = config(28314);
    let first = LeaderElector::new(&config, Identity::new("app", 401));
    let lease = match first.elect().await {
        ElectionOutcome::Master(lease) => lease,
        other => panic!("expected master, got {other:?}"),
    };
    drop(lease);

    // the listener notices shutdown on its next poll
    let mut outcome = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let attempt = LeaderElector::new(&config, Identity::new("app", 402)).elect().await;
        if attempt.is_master() {
            outcome = Some(attempt);
            break;
        }
    }
    assert!(outcome.is_some_and(|o| o.is_master()));
}

#[tokio::test]
async fn invalid_address_fails_without_binding() {
    let mut config = config(0);
    config.bind_address = "not an address".into();
    let outcome = LeaderElector::new(&config, Identity::new("app", 501)).elect().await;
    assert!(matches!(
        outcome,
        ElectionOutcome::CommunicationFailure(ElectionError::InvalidAddress(_))
    ));
}
