//! Meta session failover tests.

mod common;

use common::*;
use plexus::core::config::{MetaConfig, SessionConfig};
use plexus::ops::metrics::ClientCounters;
use plexus::rpc::meta::{MetaSession, QueryConfigResponse};
use plexus::{ClientError, ServerCode};
use std::sync::Arc;
use std::time::Duration;

fn meta_session(endpoints: Vec<plexus::Endpoint>, max_retry: u32) -> MetaSession {
    MetaSession::new(
        endpoints,
        SessionConfig::default(),
        &MetaConfig { max_retry },
        Arc::new(ClientCounters::default()),
    )
    .unwrap()
}

#[tokio::test]
async fn query_config_returns_parsed_configuration() {
    let replica = dead_endpoint().await;
    let meta = MockServer::spawn(meta_serving(QueryConfigResponse::ok(
        7,
        8,
        3,
        partitions_at(7, 8, replica),
    )))
    .await;

    let session = meta_session(vec![meta.endpoint], 10);
    let reply = session
        .query_config("temp", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(reply.app_id, 7);
    assert_eq!(reply.partition_count, 8);
    assert_eq!(reply.partitions.len(), 8);
    assert_eq!(reply.partitions[3].gpid.partition_index, 3);
}

#[tokio::test]
async fn failover_follows_forward_hint_and_sticks_to_leader() {
    let replica = dead_endpoint().await;

    // m3 is the leader and answers with the configuration.
    let m3 = MockServer::spawn(meta_serving(QueryConfigResponse::ok(
        1,
        4,
        3,
        partitions_at(1, 4, replica),
    )))
    .await;
    // m2 is a follower and points at m3.
    let m2 = MockServer::spawn(meta_serving(QueryConfigResponse::forward_to(m3.endpoint))).await;
    // m1 refuses connections.
    let m1 = dead_endpoint().await;

    let session = meta_session(vec![m1, m2.endpoint, m3.endpoint], 10);

    let reply = session
        .query_config("temp", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(reply.app_id, 1);
    assert_eq!(session.leader(), m3.endpoint);
    assert_eq!(m2.request_count(), 1);
    assert_eq!(m3.request_count(), 1);

    // Subsequent queries start at the discovered leader.
    session
        .query_config("temp", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(m2.request_count(), 1);
    assert_eq!(m3.request_count(), 2);
}

#[tokio::test]
async fn object_not_found_fails_fast_as_table_not_found() {
    let meta =
        MockServer::spawn(meta_serving(QueryConfigResponse::error(ServerCode::ObjectNotFound)))
            .await;
    let session = meta_session(vec![meta.endpoint], 10);

    let err = session
        .query_config("missing", Duration::from_secs(2))
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::TableNotFound("missing".to_string()));
    assert_eq!(meta.request_count(), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_meta_unreachable() {
    let m1 = dead_endpoint().await;
    let m2 = dead_endpoint().await;
    let m3 = dead_endpoint().await;

    let session = meta_session(vec![m1, m2, m3], 4);
    let err = session
        .query_config("temp", Duration::from_secs(10))
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::MetaUnreachable);
}

#[tokio::test]
async fn deadline_bounds_meta_retries() {
    let m1 = dead_endpoint().await;

    // A large retry budget with a short deadline: the deadline wins.
    let session = meta_session(vec![m1], 1000);
    let start = tokio::time::Instant::now();
    let err = session
        .query_config("temp", Duration::from_millis(300))
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::Timeout);
    assert!(start.elapsed() < Duration::from_secs(3));
}
