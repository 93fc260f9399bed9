//! Integration Tests for the Adaptive Cache
//!
//! Exercises the public cache contract end to end, including background tasks
//! and concurrent access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use adaptive_cache::cache::{FixedMemorySampler, MemorySample, PressureLevel};
use adaptive_cache::{AdaptiveCache, CacheError, Config};
use serde::{Deserialize, Serialize};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

// == Helper Functions ==

const THRESHOLD: u64 = 64 * 1024 * 1024;

fn calm_sample() -> MemorySample {
    MemorySample {
        usage_bytes: 1024,
        allocated_bytes: 0,
    }
}

fn pressured_sample() -> MemorySample {
    MemorySample {
        usage_bytes: THRESHOLD * 2,
        allocated_bytes: 0,
    }
}

fn create_test_cache() -> (AdaptiveCache, Arc<FixedMemorySampler>) {
    let sampler = Arc::new(FixedMemorySampler::new(calm_sample()));
    let config = Config {
        memory_pressure_threshold_bytes: THRESHOLD,
        ..Config::default()
    };
    (AdaptiveCache::with_sampler(config, sampler.clone()), sampler)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Project {
    id: u64,
    name: String,
}

#[derive(Debug, PartialEq)]
enum RemoteError {
    Unavailable,
    Cache(CacheError),
}

impl From<CacheError> for RemoteError {
    fn from(err: CacheError) -> Self {
        RemoteError::Cache(err)
    }
}

// == Round Trip ==

#[test]
fn test_structured_value_round_trip() {
    let (cache, _) = create_test_cache();
    let project = Project {
        id: 123,
        name: "apollo".to_string(),
    };

    assert_ok!(cache.set("projects:123", project.clone(), None));

    assert_eq!(cache.get::<Project>("projects:123").unwrap(), Some(project));
    let stats = cache.stats().unwrap();
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.total_size_bytes, br#"{"id":123,"name":"apollo"}"#.len());
}

#[test]
fn test_binary_value_round_trip() {
    let (cache, _) = create_test_cache();

    assert_ok!(cache.set("blobs:1", vec![1u8, 2, 3], None));

    assert_eq!(cache.get::<Vec<u8>>("blobs:1").unwrap(), Some(vec![1, 2, 3]));
    assert_eq!(cache.stats().unwrap().total_size_bytes, 3);
}

#[test]
fn test_malformed_keys_are_rejected() {
    let (cache, _) = create_test_cache();

    assert_err!(cache.set("", 1u8, None));
    assert_err!(cache.set("projects<1>", 1u8, None));
    assert_err!(cache.get::<u8>(&"x".repeat(251)));
    assert_eq!(
        cache.remove("a*b"),
        Err(CacheError::InvalidKey(
            "Key contains forbidden character '*'".to_string()
        ))
    );
}

// == Expiration ==

#[test]
fn test_prefix_ttl_scenario_under_pressure() {
    let (cache, sampler) = create_test_cache();

    cache.set("projects:123", "v1".to_string(), None).unwrap();
    let normal = cache.ttl_remaining("projects:123").unwrap().unwrap();
    assert!(normal > Duration::from_secs(595) && normal <= Duration::from_secs(600));

    sampler.set(pressured_sample());
    cache.check_memory_pressure().unwrap();
    assert_eq!(cache.memory_pressure(), PressureLevel::High);

    cache.set("projects:124", "v2".to_string(), None).unwrap();
    let halved = cache.ttl_remaining("projects:124").unwrap().unwrap();
    assert!(halved > Duration::from_secs(295) && halved <= Duration::from_secs(300));
}

#[test]
fn test_custom_prefix_rules_first_declared_wins() {
    let config = Config::default()
        .with_expiration_rules(Vec::new())
        .with_expiration_rule("rep", Duration::from_secs(30))
        .with_expiration_rule("reports", Duration::from_secs(3000));
    let cache = AdaptiveCache::with_sampler(config, Arc::new(FixedMemorySampler::default()));

    cache.set("reports:q3", 1u32, None).unwrap();

    let remaining = cache.ttl_remaining("reports:q3").unwrap().unwrap();
    assert!(remaining <= Duration::from_secs(30));
}

#[test]
fn test_expired_entry_reads_as_miss() {
    let (cache, _) = create_test_cache();
    cache.set("orgs:1", 1u32, Some(Duration::from_millis(30))).unwrap();

    sleep(Duration::from_millis(60));

    assert_eq!(cache.get::<u32>("orgs:1").unwrap(), None);
    assert!(!cache.exists("orgs:1").unwrap());
    assert_eq!(cache.stats().unwrap().evictions, 1);
}

// == Statistics ==

#[test]
fn test_hit_rate_tracks_gets() {
    let (cache, _) = create_test_cache();
    assert_eq!(cache.stats().unwrap().hit_rate, 0.0);

    cache.set("orgs:1", 1u32, None).unwrap();
    cache.get::<u32>("orgs:1").unwrap();
    cache.get::<u32>("orgs:1").unwrap();
    cache.get::<u32>("orgs:1").unwrap();
    cache.get::<u32>("orgs:2").unwrap();

    let stats = cache.stats().unwrap();
    assert_eq!(stats.requests, 4);
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate, 0.75);
}

#[test]
fn test_exists_does_not_count_requests() {
    let (cache, _) = create_test_cache();
    cache.set("orgs:1", 1u32, None).unwrap();

    assert!(cache.exists("orgs:1").unwrap());
    assert!(!cache.exists("orgs:2").unwrap());

    assert_eq!(cache.stats().unwrap().requests, 0);
}

#[test]
fn test_clear_zeroes_stats_and_entries() {
    let (cache, _) = create_test_cache();
    let keys = ["projects:1", "user:2", "builds:3", "temp:4"];
    for key in keys {
        cache.set(key, key.to_string(), None).unwrap();
        cache.get::<String>(key).unwrap();
    }

    cache.clear().unwrap();

    let stats = cache.stats().unwrap();
    assert_eq!(
        (stats.requests, stats.hits, stats.misses, stats.evictions),
        (0, 0, 0, 0)
    );
    assert_eq!(stats.entry_count, 0);
    assert_eq!(stats.total_size_bytes, 0);
    for key in keys {
        assert!(!cache.exists(key).unwrap());
    }
}

// == Pattern Removal ==

#[test]
fn test_remove_by_pattern_projects() {
    let (cache, _) = create_test_cache();
    for key in ["projects:1", "projects:2/builds", "user:7:projects", "builds:9", "orgs:1"] {
        cache.set(key, 1u8, None).unwrap();
    }

    assert_eq!(cache.remove_by_pattern("projects*").unwrap(), 3);

    assert!(cache.exists("builds:9").unwrap());
    assert!(cache.exists("orgs:1").unwrap());
    assert!(!cache.exists("user:7:projects").unwrap());
}

#[test]
fn test_remove_by_exact_pattern_ignores_case() {
    let (cache, _) = create_test_cache();
    cache.set("Orgs:1", 1u8, None).unwrap();
    cache.set("orgs:10", 1u8, None).unwrap();

    assert_eq!(cache.remove_by_pattern("ORGS:1").unwrap(), 1);
    assert!(cache.exists("orgs:10").unwrap());
}

// == Pressure Eviction ==

#[test]
fn test_concurrent_evictions_count_once() {
    for _ in 0..50 {
        let (cache, sampler) = create_test_cache();
        cache.set("orgs:1", 1u32, Some(Duration::from_millis(1))).unwrap();
        sampler.set(pressured_sample());
        sleep(Duration::from_millis(5));

        std::thread::scope(|scope| {
            scope.spawn(|| cache.get::<u32>("orgs:1").unwrap());
            scope.spawn(|| cache.check_memory_pressure().unwrap());
            scope.spawn(|| cache.remove_expired().unwrap());
        });

        let stats = cache.stats().unwrap();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entry_count, 0);
        assert!(!cache.exists("orgs:1").unwrap());
    }
}

#[test]
fn test_concurrent_writers_keep_ledger_consistent() {
    let (cache, _) = create_test_cache();

    std::thread::scope(|scope| {
        for t in 0..8 {
            let cache = &cache;
            scope.spawn(move || {
                for i in 0..200 {
                    let key = format!("orgs:{}", i % 16);
                    match (t + i) % 3 {
                        0 => cache.set(&key, i, None).unwrap(),
                        1 => {
                            cache.remove(&key).unwrap();
                        }
                        _ => {
                            cache.get::<i32>(&key).unwrap();
                        }
                    }
                }
            });
        }
    });

    for i in 0..16 {
        let key = format!("orgs:{}", i);
        let present = cache.get::<i32>(&key).unwrap().is_some();
        assert_eq!(cache.exists(&key).unwrap(), present, "{} drifted", key);
    }
}

// == Get Or Set ==

#[tokio::test]
async fn test_get_or_set_factory_runs_once_when_sequential() {
    let (cache, _) = create_test_cache();
    let calls = AtomicUsize::new(0);
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        let value: Result<u64, CacheError> = cache
            .get_or_set(
                "projects:1",
                |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                },
                None,
                &cancel,
            )
            .await;
        assert_eq!(value, Ok(7));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_or_set_factory_error_writes_nothing() {
    let (cache, _) = create_test_cache();
    let cancel = CancellationToken::new();

    let result: Result<u64, RemoteError> = cache
        .get_or_set("projects:1", |_| async { Err(RemoteError::Unavailable) }, None, &cancel)
        .await;

    assert_eq!(result, Err(RemoteError::Unavailable));
    assert!(!cache.exists("projects:1").unwrap());
}

#[tokio::test]
async fn test_get_or_set_surfaces_cache_errors() {
    let (cache, _) = create_test_cache();
    let cancel = CancellationToken::new();

    let result: Result<u64, RemoteError> = cache
        .get_or_set("bad|key", |_| async { Ok(1) }, None, &cancel)
        .await;

    assert!(matches!(
        result,
        Err(RemoteError::Cache(CacheError::InvalidKey(_)))
    ));
}

#[tokio::test]
async fn test_get_or_set_cancelled_mid_factory() {
    let (cache, _) = create_test_cache();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result: Result<u64, CacheError> = cache
        .get_or_set(
            "projects:1",
            |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            },
            None,
            &cancel,
        )
        .await;

    assert_eq!(result, Err(CacheError::Cancelled));
    assert!(!cache.exists("projects:1").unwrap());
}

#[tokio::test]
async fn test_get_or_set_stampede_runs_each_factory() {
    let (cache, _) = create_test_cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(tokio::sync::Barrier::new(2));

    let mut handles = Vec::new();
    for n in 0..2u64 {
        let cache = cache.clone();
        let calls = calls.clone();
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let result: Result<u64, CacheError> = cache
                .get_or_set(
                    "projects:hot",
                    |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        gate.wait().await;
                        Ok(n)
                    },
                    None,
                    &cancel,
                )
                .await;
            result
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(cache.exists("projects:hot").unwrap());
}

// == Lifecycle ==

#[tokio::test]
async fn test_started_cache_shuts_down_cleanly() {
    let config = Config {
        cleanup_interval: Duration::from_millis(50),
        pressure_check_interval: Duration::from_millis(50),
        ..Config::default()
    };
    let cache = AdaptiveCache::start(config);
    cache
        .set("temp:1", 1u8, Some(Duration::from_millis(20)))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!cache.exists("temp:1").unwrap());

    cache.shutdown();
    assert!(cache.is_disposed());
    assert_eq!(cache.exists("temp:1"), Err(CacheError::Disposed));
    assert_eq!(cache.remove_by_pattern("*"), Err(CacheError::Disposed));
}
