//! End-to-end table tests: routing, refresh, retries, deadlines.

mod common;

use bytes::Bytes;
use common::*;
use plexus::base::hash;
use plexus::rpc::meta::QueryConfigResponse;
use plexus::{ClientConfig, ClientError, Cluster, ServerCode};
use std::time::Duration;

fn config_for(meta: &MockServer) -> ClientConfig {
    ClientConfig::new([meta.endpoint.to_string()])
}

async fn cluster_with_kv_table(
    partition_count: i32,
) -> (Cluster, MockServer, MockServer, KvStore, GpidLog) {
    let (behavior, store, gpids) = kv_replica();
    let replica = MockServer::spawn(behavior).await;
    let meta = MockServer::spawn(meta_serving(QueryConfigResponse::ok(
        2,
        partition_count,
        3,
        partitions_at(2, partition_count, replica.endpoint),
    )))
    .await;
    let cluster = Cluster::new(config_for(&meta)).unwrap();
    (cluster, meta, replica, store, gpids)
}

#[tokio::test]
async fn set_get_del_round_trip() {
    let (cluster, _meta, _replica, _store, _gpids) = cluster_with_kv_table(8).await;
    let table = cluster.open_table("temp").await.unwrap();

    table.set(b"user:42", b"profile", b"v1", 0).await.unwrap();
    assert_eq!(
        table.get(b"user:42", b"profile", 0).await.unwrap(),
        Some(Bytes::from_static(b"v1"))
    );

    table.del(b"user:42", b"profile", 0).await.unwrap();
    assert_eq!(table.get(b"user:42", b"profile", 0).await.unwrap(), None);

    cluster.close();
}

#[tokio::test]
async fn incr_accumulates() {
    let (cluster, _meta, _replica, _store, _gpids) = cluster_with_kv_table(4).await;
    let table = cluster.open_table("temp").await.unwrap();

    assert_eq!(table.incr(b"counter", b"hits", 5, 0).await.unwrap(), 5);
    assert_eq!(table.incr(b"counter", b"hits", 3, 0).await.unwrap(), 8);

    cluster.close();
}

#[tokio::test]
async fn exists_and_ttl() {
    let (cluster, _meta, _replica, _store, _gpids) = cluster_with_kv_table(4).await;
    let table = cluster.open_table("temp").await.unwrap();

    assert!(!table.exists(b"h", b"s", 0).await.unwrap());
    table.set(b"h", b"s", b"v", 0).await.unwrap();
    assert!(table.exists(b"h", b"s", 0).await.unwrap());
    assert_eq!(table.ttl(b"h", b"s", 0).await.unwrap(), Some(-1));

    cluster.close();
}

#[tokio::test]
async fn multi_operations_round_trip() {
    let (cluster, _meta, _replica, _store, _gpids) = cluster_with_kv_table(4).await;
    let table = cluster.open_table("temp").await.unwrap();

    table
        .multi_set(b"h", &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")], 0, 0)
        .await
        .unwrap();
    assert_eq!(table.sort_key_count(b"h", 0).await.unwrap(), 3);

    let (all_fetched, pairs) = table.multi_get(b"h", &[], 100, 0).await.unwrap();
    assert!(all_fetched);
    assert_eq!(pairs.len(), 3);
    assert_eq!(&pairs[0].0[..], b"a");

    let (_, selected) = table.multi_get(b"h", &[b"b"], 100, 0).await.unwrap();
    assert_eq!(selected, vec![(Bytes::from_static(b"b"), Bytes::from_static(b"2"))]);

    assert_eq!(table.multi_del(b"h", &[b"a", b"c", b"zz"], 0).await.unwrap(), 2);
    assert_eq!(table.sort_key_count(b"h", 0).await.unwrap(), 1);

    cluster.close();
}

#[tokio::test]
async fn routing_targets_the_hashed_partition() {
    let (cluster, _meta, _replica, _store, gpids) = cluster_with_kv_table(8).await;
    let table = cluster.open_table("temp").await.unwrap();
    assert_eq!(table.partition_count(), 8);

    table.set(b"user:42", b"profile", b"{}", 0).await.unwrap();

    let expected = hash::partition_index(hash::routing_hash(b"user:42", b"profile"), 8);
    let seen = gpids.lock().last().copied().unwrap();
    assert_eq!(seen.partition_index, expected);
    assert_eq!(seen.app_id, 2);

    // Every partition index derives from the hash with the power-of-two
    // mask.
    for i in 0..50u32 {
        let hash_key = format!("key-{i}");
        table.set(hash_key.as_bytes(), b"s", b"v", 0).await.unwrap();
        let expected =
            hash::partition_index(hash::routing_hash(hash_key.as_bytes(), b"s"), 8);
        assert_eq!(gpids.lock().last().unwrap().partition_index, expected);
    }

    cluster.close();
}

#[tokio::test]
async fn empty_hash_key_routes_by_sort_key() {
    let (cluster, _meta, _replica, _store, gpids) = cluster_with_kv_table(8).await;
    let table = cluster.open_table("temp").await.unwrap();

    table.set(b"", b"orders/1", b"v", 0).await.unwrap();
    let expected = hash::partition_index(hash::routing_hash(b"", b"orders/1"), 8);
    assert_eq!(gpids.lock().last().unwrap().partition_index, expected);

    cluster.close();
}

#[tokio::test]
async fn stale_primary_refreshes_and_retries_once() {
    // The old primary rejects everything with a stale-routing code.
    let old_primary = MockServer::spawn(always_err(ServerCode::InvalidState)).await;
    let (behavior, _store, _gpids) = kv_replica();
    let new_primary = MockServer::spawn(behavior).await;

    // First meta answer points at the old primary; answers after the
    // refresh carry the new primary and a higher ballot.
    let meta = MockServer::spawn(meta_with_replies(vec![
        QueryConfigResponse::ok(
            1,
            4,
            3,
            partitions_at_with_ballot(1, 4, old_primary.endpoint, 3),
        ),
        QueryConfigResponse::ok(
            1,
            4,
            3,
            partitions_at_with_ballot(1, 4, new_primary.endpoint, 4),
        ),
    ]))
    .await;

    let cluster = Cluster::new(config_for(&meta)).unwrap();
    let table = cluster.open_table("temp").await.unwrap();

    let start = tokio::time::Instant::now();
    table.set(b"k", b"s", b"v", 3000).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(3));

    // One rejected attempt on the old primary, one successful attempt on
    // the new one.
    assert_eq!(old_primary.request_count(), 1);
    assert_eq!(new_primary.request_count(), 1);
    assert!(meta.request_count() >= 2);

    cluster.close();
}

#[tokio::test]
async fn silent_replica_times_out_without_extra_attempts() {
    let replica = MockServer::spawn(silent()).await;
    let meta = MockServer::spawn(meta_serving(QueryConfigResponse::ok(
        1,
        4,
        3,
        partitions_at(1, 4, replica.endpoint),
    )))
    .await;

    let mut config = config_for(&meta);
    config.operation_timeout_ms = 100;
    let cluster = Cluster::new(config).unwrap();
    let table = cluster.open_table("temp").await.unwrap();

    let start = tokio::time::Instant::now();
    let err = table.get(b"k", b"s", 0).await.unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err, ClientError::Timeout);
    assert!(
        elapsed >= Duration::from_millis(80) && elapsed <= Duration::from_millis(500),
        "timed out after {elapsed:?}"
    );
    assert_eq!(replica.request_count(), 1);

    cluster.close();
}

#[tokio::test]
async fn non_positive_timeout_uses_configured_default() {
    let replica = MockServer::spawn(silent()).await;
    let meta = MockServer::spawn(meta_serving(QueryConfigResponse::ok(
        1,
        4,
        3,
        partitions_at(1, 4, replica.endpoint),
    )))
    .await;

    let mut config = config_for(&meta);
    config.operation_timeout_ms = 150;
    let cluster = Cluster::new(config).unwrap();
    let table = cluster.open_table("temp").await.unwrap();

    let start = tokio::time::Instant::now();
    let err = table.get(b"k", b"s", -7).await.unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err, ClientError::Timeout);
    assert!(
        elapsed >= Duration::from_millis(120) && elapsed <= Duration::from_millis(600),
        "timed out after {elapsed:?}"
    );

    cluster.close();
}

#[tokio::test]
async fn transient_server_errors_retry_without_refresh() {
    // Busy twice, then success.
    let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
    let behavior_attempts = std::sync::Arc::clone(&attempts);
    let behavior: Behavior = std::sync::Arc::new(move |request| {
        let n = behavior_attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if n < 2 {
            vec![err_response(request, ServerCode::Busy)]
        } else {
            vec![ok_response(request, Bytes::new())]
        }
    });
    let replica = MockServer::spawn(behavior).await;
    let meta = MockServer::spawn(meta_serving(QueryConfigResponse::ok(
        1,
        4,
        3,
        partitions_at(1, 4, replica.endpoint),
    )))
    .await;

    let cluster = Cluster::new(config_for(&meta)).unwrap();
    let table = cluster.open_table("temp").await.unwrap();

    table.set(b"k", b"s", b"v", 2000).await.unwrap();
    assert_eq!(replica.request_count(), 3);
    // The open queried meta once; busy retries must not have.
    assert_eq!(meta.request_count(), 1);

    cluster.close();
}

#[tokio::test]
async fn terminal_server_error_preserves_raw_code() {
    let replica = MockServer::spawn(always_err(ServerCode::Other(-1001))).await;
    let meta = MockServer::spawn(meta_serving(QueryConfigResponse::ok(
        1,
        4,
        3,
        partitions_at(1, 4, replica.endpoint),
    )))
    .await;

    let cluster = Cluster::new(config_for(&meta)).unwrap();
    let table = cluster.open_table("temp").await.unwrap();

    let err = table.get(b"k", b"s", 0).await.unwrap_err();
    assert_eq!(err, ClientError::ServerError(ServerCode::Other(-1001)));
    assert_eq!(replica.request_count(), 1);

    cluster.close();
}

#[tokio::test]
async fn concurrent_refresh_triggers_coalesce() {
    // Every partition reports no primary; each attempt triggers a refresh.
    let meta = MockServer::spawn(meta_serving(QueryConfigResponse::ok(
        1,
        4,
        3,
        partitions_at(1, 4, plexus::Endpoint::invalid()),
    )))
    .await;

    let mut config = config_for(&meta);
    config.operation_timeout_ms = 200;
    let cluster = Cluster::new(config).unwrap();
    let table = cluster.open_table("temp").await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let table = table.clone();
        tasks.push(tokio::spawn(async move {
            table.get(b"k", b"s", 0).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), Err(ClientError::Timeout));
    }

    // Twenty operations retried for a full deadline each, yet refreshes
    // collapsed: far fewer meta queries than attempts.
    assert!(
        meta.request_count() <= 10,
        "expected coalesced refreshes, meta saw {}",
        meta.request_count()
    );

    cluster.close();
}

#[tokio::test]
async fn open_unknown_table_fails_fast() {
    let meta =
        MockServer::spawn(meta_serving(QueryConfigResponse::error(ServerCode::ObjectNotFound)))
            .await;
    let cluster = Cluster::new(config_for(&meta)).unwrap();

    let err = cluster.open_table("missing").await.unwrap_err();
    assert_eq!(err, ClientError::TableNotFound("missing".to_string()));

    cluster.close();
}

#[tokio::test]
async fn close_completes_outstanding_operations_with_closed() {
    let replica = MockServer::spawn(silent()).await;
    let meta = MockServer::spawn(meta_serving(QueryConfigResponse::ok(
        1,
        4,
        3,
        partitions_at(1, 4, replica.endpoint),
    )))
    .await;

    let cluster = Cluster::new(config_for(&meta)).unwrap();
    let table = cluster.open_table("temp").await.unwrap();

    let in_flight = {
        let table = table.clone();
        tokio::spawn(async move { table.get(b"k", b"s", 5000).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let closer = cluster.clone();
    closer.close();

    let start = tokio::time::Instant::now();
    assert_eq!(in_flight.await.unwrap(), Err(ClientError::Closed));
    assert!(start.elapsed() < Duration::from_secs(1));

    // New operations fail immediately.
    assert_eq!(
        table.get(b"k", b"s", 0).await.unwrap_err(),
        ClientError::Closed
    );
    assert_eq!(cluster.open_table("temp").await.unwrap_err(), ClientError::Closed);
}

#[tokio::test]
async fn concurrent_operations_complete_exactly_once() {
    let (cluster, _meta, _replica, _store, _gpids) = cluster_with_kv_table(8).await;
    let table = cluster.open_table("temp").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..50u32 {
        let table = table.clone();
        tasks.push(tokio::spawn(async move {
            let hash_key = format!("user:{i}");
            table.set(hash_key.as_bytes(), b"s", b"v", 0).await?;
            table.get(hash_key.as_bytes(), b"s", 0).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), Some(Bytes::from_static(b"v")));
    }

    cluster.close();
}
