//! Pool lifecycle tests against an in-process mock store.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;

use common::{MockBehavior, MockRedis};
use repool::{
    CommandArg, ConnectError, ConnectionConfig, ConnectionPool, ExhaustionPolicy, InMemoryScope,
    PoolConfig, PoolSize, ProtocolError, RedisError,
};

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn make_pool(
    address: String,
    configure: impl FnOnce(&mut PoolConfig),
) -> (ConnectionPool, Arc<InMemoryScope>) {
    let scope = Arc::new(InMemoryScope::new());
    let mut config = PoolConfig {
        connection_config: ConnectionConfig::new(address),
        ..Default::default()
    };
    configure(&mut config);
    (ConnectionPool::new(scope.clone(), config), scope)
}

#[tokio::test]
async fn clean_put_recycles_the_connection() {
    setup_tracing();
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, scope) = make_pool(mock.address(), |_| {});

    let mut conn = pool.get().await.unwrap();
    conn.pipe_append("PING", &[]);
    conn.pipe_response().await.unwrap();
    assert_eq!(scope.gauge_value("cx_active"), 1);
    mock.wait_accepted(1).await;

    pool.put(conn);
    assert_eq!(scope.gauge_value("cx_active"), 0);
    assert_eq!(pool.idle_count(), 1);

    // The next checkout reuses the same transport: no second dial.
    let _conn = pool.get().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.accepted(), 1);
    assert_eq!(scope.counter_value("cx_local_close"), 0);
}

#[tokio::test]
async fn unread_pipeline_closes_the_connection() {
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, scope) = make_pool(mock.address(), |_| {});

    let mut conn = pool.get().await.unwrap();
    conn.pipe_append("INCR", &[CommandArg::Str("hits")]);
    // Reply intentionally left unread.
    pool.put(conn);

    assert_eq!(scope.gauge_value("cx_active"), 0);
    assert_eq!(scope.counter_value("cx_local_close"), 1);
    assert_eq!(pool.idle_count(), 0);

    // The tainted transport is gone; a fresh checkout dials anew.
    let _conn = pool.get().await.unwrap();
    mock.wait_accepted(2).await;
}

#[tokio::test]
async fn reading_more_replies_than_appended_is_misuse() {
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, _scope) = make_pool(mock.address(), |_| {});

    let mut conn = pool.get().await.unwrap();
    conn.pipe_append("PING", &[]);
    conn.pipe_response().await.unwrap();

    assert_matches!(conn.pipe_response().await, Err(RedisError::Misuse(_)));
}

#[tokio::test]
async fn every_get_counts_once_dialed_or_reused() {
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, scope) = make_pool(mock.address(), |_| {});

    let conn = pool.get().await.unwrap();
    assert_eq!(scope.counter_value("cx_total"), 1);
    assert_eq!(scope.gauge_value("cx_active"), 1);
    pool.put(conn);

    let _conn = pool.get().await.unwrap();
    assert_eq!(scope.counter_value("cx_total"), 2);
    assert_eq!(scope.gauge_value("cx_active"), 1);
}

#[tokio::test]
async fn no_credential_means_no_auth_command() {
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, _scope) = make_pool(mock.address(), |_| {});

    let mut conn = pool.get().await.unwrap();
    conn.pipe_append("PING", &[]);
    conn.pipe_response().await.unwrap();

    assert!(!mock.commands().iter().any(|c| c == "AUTH"));
}

#[tokio::test]
async fn empty_credential_means_no_auth_command() {
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, _scope) = make_pool(mock.address(), |config| {
        config.connection_config.credential = Some(String::new());
    });

    let mut conn = pool.get().await.unwrap();
    conn.pipe_append("PING", &[]);
    conn.pipe_response().await.unwrap();

    assert!(!mock.commands().iter().any(|c| c == "AUTH"));
}

#[tokio::test]
async fn credential_authenticates_before_anything_else() {
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, _scope) = make_pool(mock.address(), |config| {
        config.connection_config.credential = Some("hunter2".to_string());
    });

    let mut conn = pool.get().await.unwrap();
    conn.pipe_append("PING", &[]);
    conn.pipe_response().await.unwrap();

    assert_eq!(mock.commands().first().map(String::as_str), Some("AUTH"));
}

#[tokio::test]
async fn rejected_auth_fails_the_dial_and_pools_nothing() {
    let mock = MockRedis::spawn(MockBehavior {
        reject_auth: true,
        ..Default::default()
    })
    .await;
    let (pool, scope) = make_pool(mock.address(), |config| {
        config.connection_config.credential = Some("wrong".to_string());
    });

    let err = pool.get().await.unwrap_err();
    assert_matches!(
        err,
        RedisError::Connect(ConnectError::AuthenticationFailed(reason))
            if reason.contains("invalid password")
    );

    // The half-authenticated socket was closed, not pooled, and no
    // checkout was counted.
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(scope.gauge_value("cx_active"), 0);
    assert_eq!(scope.counter_value("cx_total"), 0);
}

#[tokio::test]
async fn non_integer_reply_fails_typed_decode() {
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, _scope) = make_pool(mock.address(), |_| {});

    let mut conn = pool.get().await.unwrap();
    conn.pipe_append("GET", &[CommandArg::Str("key")]);
    let response = conn.pipe_response().await.unwrap();

    assert_matches!(
        response.int(),
        Err(RedisError::Protocol(ProtocolError::UnexpectedReply { .. }))
    );
}

#[tokio::test]
async fn fail_fast_pool_reports_exhaustion() {
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, _scope) = make_pool(mock.address(), |config| {
        config.pool_size = PoolSize::new(1).unwrap();
        config.exhaustion_policy = ExhaustionPolicy::FailFast;
    });

    let held = pool.get().await.unwrap();
    assert_matches!(pool.get().await, Err(RedisError::PoolExhausted));

    pool.put(held);
    assert!(pool.get().await.is_ok());
}

#[tokio::test]
async fn blocking_pool_waits_for_a_put() {
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, _scope) = make_pool(mock.address(), |config| {
        config.pool_size = PoolSize::new(1).unwrap();
    });

    let held = pool.get().await.unwrap();
    let releasing_pool = pool.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        releasing_pool.put(held);
    });

    let start = Instant::now();
    let _conn = pool.get().await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn silent_server_times_out_the_read() {
    let mock = MockRedis::spawn(MockBehavior {
        silent: true,
        ..Default::default()
    })
    .await;
    let (pool, _scope) = make_pool(mock.address(), |config| {
        config.connection_config.read_timeout = Some(Duration::from_millis(100));
    });

    let mut conn = pool.get().await.unwrap();
    conn.pipe_append("PING", &[]);
    assert_matches!(conn.pipe_response().await, Err(RedisError::Timeout));
}

#[tokio::test]
async fn capacity_holds_under_concurrent_checkouts() {
    setup_tracing();
    let mock = MockRedis::spawn(MockBehavior::default()).await;
    let (pool, scope) = make_pool(mock.address(), |config| {
        config.pool_size = PoolSize::new(4).unwrap();
    });

    let mut workers = Vec::new();
    for _ in 0..16 {
        let pool = pool.clone();
        workers.push(tokio::spawn(async move {
            let mut conn = pool.get().await.unwrap();
            conn.pipe_append("INCR", &[CommandArg::Str("hits")]);
            assert_eq!(conn.pipe_response().await.unwrap().int().unwrap(), 1);
            pool.put(conn);
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    assert_eq!(scope.gauge_value("cx_active"), 0);
    assert_eq!(scope.counter_value("cx_total"), 16);
    assert!(mock.accepted() <= 4);
}
