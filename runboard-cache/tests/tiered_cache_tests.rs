use chrono::{Duration as ChronoDuration, Utc};
use runboard_cache::{CacheStats, TieredCache};
use runboard_core::{RunStatus, StoreTier};
use runboard_test_utils::assertions::{assert_ok, assert_run_files_parse, assert_runs_ordered};
use runboard_test_utils::fixtures::{
    failed_run, fresh_run, new_user_id, run_aged, stuck_run, terminal_run, test_profile,
};
use runboard_test_utils::TestCacheRoot;
use std::sync::Arc;
use std::time::Duration;

fn open(root: &TestCacheRoot, user: &str) -> TieredCache {
    TieredCache::new(Some(user), &root.config())
}

#[test]
fn set_run_is_idempotent() {
    let root = TestCacheRoot::new();
    let cache = open(&root, "alice");

    for run in [terminal_run("done-1"), fresh_run("active-1")] {
        assert_ok(&cache.set_run(&run));
        let once = cache.get_run(&run.id);
        assert_ok(&cache.set_run(&run));
        assert_eq!(cache.get_run(&run.id), once);
        assert_eq!(once, Some(run));
    }

    assert_eq!(
        cache.stats(),
        CacheStats {
            durable_count: 1,
            ephemeral_count: 1,
            repository_count: 0,
        }
    );
}

#[test]
fn terminal_runs_survive_reconstruction() {
    let root = TestCacheRoot::new();
    let done = terminal_run("done-1");
    let failed = failed_run("failed-1");
    {
        let cache = open(&root, "alice");
        cache.set_run(&done).unwrap();
        cache.set_run(&failed).unwrap();
        cache.close();
    }

    let cache = open(&root, "alice");
    assert_eq!(cache.get_run("done-1"), Some(done));
    assert_eq!(cache.get_run("failed-1"), Some(failed));
}

#[test]
fn fresh_runs_do_not_survive_reconstruction() {
    let root = TestCacheRoot::new();
    {
        let cache = open(&root, "alice");
        cache.set_run(&fresh_run("active-1")).unwrap();
        assert!(cache.get_run("active-1").is_some());
    }

    let cache = open(&root, "alice");
    assert_eq!(cache.get_run("active-1"), None);
}

#[test]
fn stuck_runs_are_promoted_to_disk() {
    let root = TestCacheRoot::new();
    let stuck = stuck_run("stuck-1");
    assert_eq!(stuck.tier(), StoreTier::Durable);
    {
        let cache = open(&root, "alice");
        cache.set_run(&stuck).unwrap();
    }

    let cache = open(&root, "alice");
    assert_eq!(cache.get_run("stuck-1"), Some(stuck));
}

#[tokio::test]
async fn get_runs_orders_newest_first() {
    let root = TestCacheRoot::new();
    let cache = open(&root, "alice");

    let runs = vec![
        run_aged("three-hours", RunStatus::Processing, ChronoDuration::hours(3)),
        run_aged("one-hour", RunStatus::Done, ChronoDuration::hours(1)),
        run_aged("half-hour", RunStatus::Processing, ChronoDuration::minutes(30)),
    ];
    cache.set_runs(runs).await.unwrap();

    let listed = cache.get_runs().await.expect("runs were cached");
    let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["half-hour", "one-hour", "three-hours"]);
    assert_runs_ordered(&listed);
    cache.close();
}

#[tokio::test]
async fn get_runs_breaks_creation_ties_by_id() {
    let root = TestCacheRoot::new();
    let cache = open(&root, "alice");

    let created = Utc::now() - ChronoDuration::minutes(20);
    let mut runs = Vec::new();
    for (id, status) in [("c", RunStatus::Done), ("a", RunStatus::Queued), ("b", RunStatus::Failed)] {
        runs.push(runboard_core::Run::new(id, status, "acme/app", created));
    }
    cache.set_runs(runs).await.unwrap();

    let ids: Vec<String> = cache
        .get_runs()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, ["a", "b", "c"]);
    cache.close();
}

#[tokio::test]
async fn get_runs_prefers_newer_copy_across_tiers() {
    let root = TestCacheRoot::new();
    let cache = open(&root, "alice");

    let mut run = fresh_run("r1");
    cache.set_run(&run).unwrap();

    run.status = RunStatus::Done;
    run.updated_at = Utc::now();
    cache.set_run(&run).unwrap();

    let listed = cache.get_runs().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, RunStatus::Done);
    cache.close();
}

#[test]
fn invalidate_active_runs_keeps_durable_runs() {
    let root = TestCacheRoot::new();
    let cache = open(&root, "alice");

    cache.set_run(&terminal_run("done-1")).unwrap();
    cache.set_run(&fresh_run("active-1")).unwrap();
    cache.invalidate_active_runs();

    assert!(cache.get_run("done-1").is_some());
    assert_eq!(cache.get_run("active-1"), None);
}

#[test]
fn invalidate_run_removes_from_both_tiers() {
    let root = TestCacheRoot::new();
    let cache = open(&root, "alice");

    cache.set_run(&terminal_run("done-1")).unwrap();
    cache.set_run(&fresh_run("active-1")).unwrap();
    cache.invalidate_run("done-1");
    cache.invalidate_run("active-1");
    cache.invalidate_run("never-stored");

    assert_eq!(cache.get_run("done-1"), None);
    assert_eq!(cache.get_run("active-1"), None);
    assert_eq!(cache.stats().total_runs(), 0);
}

#[test]
fn corrupt_run_file_reads_as_miss_and_is_removed() {
    let root = TestCacheRoot::new();
    let cache = open(&root, "alice");
    let path = cache
        .durable_layout()
        .expect("durable tier available")
        .run_file("broken");
    std::fs::write(&path, b"{\"id\": \"broken\", \"status\": ").unwrap();

    assert_eq!(cache.get_run("broken"), None);
    assert!(!path.exists());
}

#[test]
fn file_hash_survives_reconstruction() {
    let root = TestCacheRoot::new();
    {
        let cache = open(&root, "alice");
        cache.set_file_hash("src/main.rs", "9f86d081").unwrap();
    }

    let cache = open(&root, "alice");
    assert_eq!(cache.get_file_hash("src/main.rs"), Some("9f86d081".to_string()));
    assert_eq!(cache.get_all_file_hashes().len(), 1);
}

#[test]
fn users_never_observe_each_other() {
    let root = TestCacheRoot::new();
    let alice = open(&root, &new_user_id());
    let bob = open(&root, &new_user_id());
    assert_ne!(alice.namespace(), bob.namespace());

    alice.set_run(&terminal_run("done-1")).unwrap();
    alice.set_file_hash("a.rs", "h1").unwrap();
    alice.set_user_profile(&test_profile()).unwrap();
    alice.record_repository_use("acme/app").unwrap();

    assert_eq!(bob.get_run("done-1"), None);
    assert_eq!(bob.get_file_hash("a.rs"), None);
    assert_eq!(bob.get_user_profile(), None);
    assert_eq!(bob.get_repository_list(), None);
    assert_eq!(bob.stats(), CacheStats::default());
}

#[test]
fn anonymous_user_gets_its_own_namespace() {
    let root = TestCacheRoot::new();
    let anonymous = TieredCache::new(None, &root.config());
    let blank = TieredCache::new(Some("  "), &root.config());
    let alice = open(&root, "alice");

    assert!(anonymous.namespace().is_anonymous());
    assert_eq!(anonymous.namespace(), blank.namespace());
    assert_ne!(anonymous.namespace(), alice.namespace());
}

#[test]
fn clear_wipes_both_tiers() {
    let root = TestCacheRoot::new();
    let cache = open(&root, "alice");

    cache.set_run(&terminal_run("done-1")).unwrap();
    cache.set_run(&fresh_run("active-1")).unwrap();
    cache.set_file_hash("a.rs", "h1").unwrap();
    cache.clear().unwrap();

    assert_eq!(cache.stats(), CacheStats::default());
    assert!(cache.get_all_file_hashes().is_empty());

    cache.set_run(&terminal_run("done-2")).unwrap();
    assert!(cache.get_run("done-2").is_some());
}

#[test]
fn unusable_cache_root_degrades_to_memory() {
    let root = TestCacheRoot::new();
    let blocker = root.path().join("occupied");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let cache = TieredCache::new(
        Some("alice"),
        &root.config().with_cache_root(&blocker),
    );
    assert!(!cache.is_persistent());

    assert_ok(&cache.set_run(&terminal_run("done-1")));
    assert_ok(&cache.set_user_profile(&test_profile()));
    assert_eq!(cache.get_run("done-1"), None);
    assert_eq!(cache.get_user_profile(), None);

    cache.set_run(&fresh_run("active-1")).unwrap();
    assert!(cache.get_run("active-1").is_some());
    assert_eq!(cache.stats().ephemeral_count, 1);
}

#[test]
fn active_runs_expire_after_ttl() {
    let root = TestCacheRoot::new();
    let config = root.config().with_run_ttl(Duration::from_millis(50));
    let cache = TieredCache::new(Some("alice"), &config);

    cache.set_run(&fresh_run("active-1")).unwrap();
    assert!(cache.get_run("active-1").is_some());

    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(cache.get_run("active-1"), None);
}

#[tokio::test]
async fn close_is_idempotent() {
    let root = TestCacheRoot::new();
    let config = root.config().with_sweep_interval(Duration::from_millis(10));
    let cache = TieredCache::new(Some("alice"), &config);

    cache.close();
    cache.close();
    cache.set_run(&fresh_run("active-1")).unwrap();
    assert!(cache.get_run("active-1").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_access_leaves_parseable_files() {
    let root = TestCacheRoot::new();
    let cache = Arc::new(open(&root, "alice"));
    let runs_dir = cache
        .durable_layout()
        .expect("durable tier available")
        .runs_dir();

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            for i in 0..20 {
                let id = format!("run-{}", i % 6);
                let run = match (worker + i) % 3 {
                    0 => terminal_run(&id),
                    1 => fresh_run(&id),
                    _ => stuck_run(&id),
                };
                match (worker + i) % 5 {
                    0 => {
                        cache.set_run(&run).unwrap();
                    }
                    1 => {
                        let _ = cache.get_run(&id);
                    }
                    2 => {
                        cache.set_runs(vec![run, failed_run("batch")]).await.unwrap();
                    }
                    3 => {
                        if let Some(listed) = cache.get_runs().await {
                            assert_runs_ordered(&listed);
                        }
                    }
                    _ => cache.invalidate_run(&id),
                }
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    assert_run_files_parse(&runs_dir);
    let listed = cache.get_runs().await.unwrap_or_default();
    assert_runs_ordered(&listed);
    cache.close();
}
