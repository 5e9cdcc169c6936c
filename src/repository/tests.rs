use super::*;
use crate::error::RepositoryError;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::HashSet;

fn lamp_at(id: u128, created_secs: i64, status: bool) -> LampEntity {
    let ts = Utc.timestamp_opt(created_secs, 0).unwrap();
    LampEntity {
        id: Uuid::from_u128(id),
        status,
        created_at: ts,
        updated_at: ts,
    }
}

fn memory_repo() -> Arc<dyn LampRepository> {
    Arc::new(InMemoryLampRepository::new())
}

fn sqlite_repo() -> Arc<dyn LampRepository> {
    Arc::new(SqliteLampRepository::open_in_memory(Duration::from_secs(5)).unwrap())
}

async fn create_get_update_delete(repo: Arc<dyn LampRepository>) {
    let lamp = LampEntity::new(true);
    repo.create(lamp.clone()).await.unwrap();

    let fetched = repo.get_by_id(lamp.id).await.unwrap();
    assert!(fetched.status);

    let mut changed = fetched.clone();
    changed.update_status(false);
    repo.update(changed.clone()).await.unwrap();

    let fetched = repo.get_by_id(lamp.id).await.unwrap();
    assert!(!fetched.status);
    assert!(fetched.updated_at >= lamp.updated_at);
    assert_eq!(fetched.created_at, lamp.created_at);

    repo.delete(lamp.id).await.unwrap();
    assert!(repo.get_by_id(lamp.id).await.unwrap_err().is_not_found());
    assert!(repo.delete(lamp.id).await.unwrap_err().is_not_found());
}

async fn get_returns_most_recent_store(repo: Arc<dyn LampRepository>) {
    let lamps: Vec<LampEntity> = (1..=10).map(|i| lamp_at(i, 1_000 + i as i64, i % 2 == 0)).collect();
    for lamp in &lamps {
        repo.create(lamp.clone()).await.unwrap();
    }
    for lamp in &lamps {
        assert_eq!(&repo.get_by_id(lamp.id).await.unwrap(), lamp);
    }
}

async fn missing_ids_are_not_found(repo: Arc<dyn LampRepository>) {
    let ghost = LampEntity::new(true);

    assert!(matches!(
        repo.get_by_id(ghost.id).await,
        Err(RepositoryError::NotFound(id)) if id == ghost.id
    ));
    assert!(repo.update(ghost.clone()).await.unwrap_err().is_not_found());
    assert!(repo.delete(ghost.id).await.unwrap_err().is_not_found());
    assert!(!repo.exists(ghost.id).await.unwrap());

    // Update must not create the row as a side effect
    assert!(repo.list(0, 10).await.unwrap().is_empty());
}

async fn update_after_delete_is_not_found(repo: Arc<dyn LampRepository>) {
    let lamp = LampEntity::new(true);
    repo.create(lamp.clone()).await.unwrap();
    repo.delete(lamp.id).await.unwrap();

    let mut stale = lamp.clone();
    stale.update_status(false);
    assert!(repo.update(stale).await.unwrap_err().is_not_found());
    assert!(!repo.exists(lamp.id).await.unwrap());
}

async fn ties_broken_by_id_bytes(repo: Arc<dyn LampRepository>) {
    let a = lamp_at(0x0a, 5_000, true);
    let b = lamp_at(0x0b, 5_000, false);
    let c = lamp_at(0x0c, 5_000, true);
    for lamp in [&c, &a, &b] {
        repo.create(lamp.clone()).await.unwrap();
    }

    assert_eq!(repo.list(0, 2).await.unwrap(), vec![a.clone(), b.clone()]);
    assert_eq!(repo.list(2, 2).await.unwrap(), vec![c.clone()]);
    assert!(repo.list(10, 2).await.unwrap().is_empty());
}

async fn created_at_dominates_id(repo: Arc<dyn LampRepository>) {
    // Higher id but earlier creation sorts first
    let early = lamp_at(0xff, 100, true);
    let late = lamp_at(0x01, 200, true);
    repo.create(late.clone()).await.unwrap();
    repo.create(early.clone()).await.unwrap();

    assert_eq!(repo.list(0, 10).await.unwrap(), vec![early, late]);
}

async fn list_clamps_arguments(repo: Arc<dyn LampRepository>) {
    for i in 0..3 {
        repo.create(lamp_at(i + 1, 10 + i as i64, true)).await.unwrap();
    }

    assert_eq!(repo.list(-5, 2).await.unwrap(), repo.list(0, 2).await.unwrap());
    assert!(repo.list(0, 0).await.unwrap().is_empty());
    assert!(repo.list(0, -1).await.unwrap().is_empty());
    assert_eq!(repo.list(1, 100).await.unwrap().len(), 2);
    assert!(repo.list(i64::MAX, i64::MAX).await.unwrap().is_empty());
}

async fn pages_cover_live_set_exactly(repo: Arc<dyn LampRepository>) {
    let mut expected = Vec::new();
    for i in 0..23u128 {
        // Several lamps share a timestamp to exercise the id tie-break
        let lamp = lamp_at(0x1000 - i * 7, 1_000 + (i % 4) as i64, i % 3 == 0);
        repo.create(lamp.clone()).await.unwrap();
        expected.push(lamp);
    }
    let removed = expected.remove(5);
    repo.delete(removed.id).await.unwrap();
    expected.sort_by(listing_order);

    for n in [1i64, 4, 5, 22, 50] {
        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let page = repo.list(offset, n).await.unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() as i64 <= n);
            offset += page.len() as i64;
            seen.extend(page);
        }
        assert_eq!(seen, expected, "page size {n}");

        let unique: HashSet<Uuid> = seen.iter().map(|l| l.id).collect();
        assert_eq!(unique.len(), seen.len());
    }
}

async fn returned_copies_are_isolated(repo: Arc<dyn LampRepository>) {
    let lamp = LampEntity::new(true);
    repo.create(lamp.clone()).await.unwrap();

    let mut fetched = repo.get_by_id(lamp.id).await.unwrap();
    fetched.status = false;
    fetched.updated_at = fetched.updated_at + ChronoDuration::days(1);

    let mut listed = repo.list(0, 10).await.unwrap();
    listed[0].status = false;

    assert_eq!(repo.get_by_id(lamp.id).await.unwrap(), lamp);
    assert_eq!(repo.list(0, 10).await.unwrap(), vec![lamp]);
}

async fn update_racing_delete_never_resurrects(repo: Arc<dyn LampRepository>) {
    for _ in 0..50 {
        let lamp = LampEntity::new(true);
        repo.create(lamp.clone()).await.unwrap();

        let mut changed = lamp.clone();
        changed.update_status(false);

        let updater = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.update(changed).await })
        };
        let deleter = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.delete(lamp.id).await })
        };

        let updated = updater.await.unwrap();
        let deleted = deleter.await.unwrap();

        deleted.unwrap();
        if let Err(e) = updated {
            assert!(e.is_not_found(), "unexpected update error: {e}");
        }
        assert!(!repo.exists(lamp.id).await.unwrap());
        assert!(repo.get_by_id(lamp.id).await.unwrap_err().is_not_found());
    }
    assert!(repo.list(0, 1000).await.unwrap().is_empty());
}

async fn contended_updates_all_succeed(repo: Arc<dyn LampRepository>) {
    let lamp = LampEntity::new(false);
    repo.create(lamp.clone()).await.unwrap();

    let mut handles = Vec::new();
    for worker in 0..8 {
        let repo = Arc::clone(&repo);
        let base = lamp.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let mut next = base.clone();
                next.status = (worker + i) % 2 == 0;
                next.updated_at = base.updated_at + ChronoDuration::milliseconds(i);
                repo.update(next).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stored = repo.get_by_id(lamp.id).await.unwrap();
    assert_eq!(stored.created_at, lamp.created_at);
    assert_eq!(repo.list(0, 10).await.unwrap().len(), 1);
}

async fn unrelated_ids_proceed_concurrently(repo: Arc<dyn LampRepository>) {
    let mut handles = Vec::new();
    for worker in 0..10 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            let mut lamp = LampEntity::new(worker % 2 == 0);
            repo.create(lamp.clone()).await.unwrap();
            lamp.update_status(!lamp.status);
            repo.update(lamp.clone()).await.unwrap();
            assert_eq!(repo.get_by_id(lamp.id).await.unwrap(), lamp);
            lamp.id
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    let listed: HashSet<Uuid> = repo.list(0, 100).await.unwrap().iter().map(|l| l.id).collect();
    assert_eq!(listed, ids);
}

macro_rules! contract_tests {
    ($backend:ident, $make:expr) => {
        mod $backend {
            use super::*;

            #[tokio::test]
            async fn test_create_get_update_delete() {
                create_get_update_delete($make).await;
            }

            #[tokio::test]
            async fn test_get_returns_most_recent_store() {
                get_returns_most_recent_store($make).await;
            }

            #[tokio::test]
            async fn test_missing_ids_are_not_found() {
                missing_ids_are_not_found($make).await;
            }

            #[tokio::test]
            async fn test_update_after_delete_is_not_found() {
                update_after_delete_is_not_found($make).await;
            }

            #[tokio::test]
            async fn test_ties_broken_by_id_bytes() {
                ties_broken_by_id_bytes($make).await;
            }

            #[tokio::test]
            async fn test_created_at_dominates_id() {
                created_at_dominates_id($make).await;
            }

            #[tokio::test]
            async fn test_list_clamps_arguments() {
                list_clamps_arguments($make).await;
            }

            #[tokio::test]
            async fn test_pages_cover_live_set_exactly() {
                pages_cover_live_set_exactly($make).await;
            }

            #[tokio::test]
            async fn test_returned_copies_are_isolated() {
                returned_copies_are_isolated($make).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn test_update_racing_delete_never_resurrects() {
                update_racing_delete_never_resurrects($make).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn test_contended_updates_all_succeed() {
                contended_updates_all_succeed($make).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn test_unrelated_ids_proceed_concurrently() {
                unrelated_ids_proceed_concurrently($make).await;
            }
        }
    };
}

contract_tests!(memory, memory_repo());
contract_tests!(sqlite, sqlite_repo());

#[test]
fn test_window_clamping() {
    assert_eq!(Window::new(0, 0), None);
    assert_eq!(Window::new(3, -2), None);
    assert_eq!(Window::new(-7, 4), Some(Window { offset: 0, limit: 4 }));

    let w = Window::new(2, 5).unwrap();
    assert_eq!(w.range(10), 2..7);
    assert_eq!(w.range(4), 2..4);
    assert_eq!(w.range(1), 1..1);
    assert_eq!(Window::new(0, 5000).unwrap().capped(MAX_LIST_LIMIT).limit, MAX_LIST_LIMIT);
}

#[test]
fn test_listing_order_compares_raw_id_bytes() {
    let ts = Utc.timestamp_opt(42, 0).unwrap();
    let low = LampEntity {
        id: Uuid::from_bytes([0x00, 0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
        status: true,
        created_at: ts,
        updated_at: ts,
    };
    let high = LampEntity {
        id: Uuid::from_bytes([0x01, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
        ..low.clone()
    };
    assert_eq!(listing_order(&low, &high), std::cmp::Ordering::Less);
    assert_eq!(listing_order(&high, &high), std::cmp::Ordering::Equal);
}

#[test]
fn test_open_repository_selects_backend() {
    let memory = open_repository(&StorageConfig::default()).unwrap();
    assert_eq!(memory.backend(), "memory");

    let dir = tempfile::TempDir::new().unwrap();
    let config = StorageConfig {
        backend: StorageBackend::Sqlite,
        database_path: dir.path().join("lamps.db").to_string_lossy().into_owned(),
        query_timeout_ms: 1_000,
    };
    let sqlite = open_repository(&config).unwrap();
    assert_eq!(sqlite.backend(), "sqlite");
}
