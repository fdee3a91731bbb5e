mod common;

use common::{
    assert_quiet, ids, memory_repo, names, next_snapshot, repo_with, try_next_snapshot, Card,
    FatalLog,
};
use livestore_core::{Predicate, Repository, SortDescriptor, StoreConfig};
use std::time::Duration;
use tokio::sync::oneshot;

const QUIET_WINDOW: Duration = Duration::from_millis(200);

#[tokio::test]
async fn filtered_subscription_follows_saves_and_deletes() {
    let repo = memory_repo();
    repo.save_all(vec![Card::new("1", "A"), Card::new("2", "B")])
        .await
        .unwrap();

    let mut with_a = repo
        .query(&Predicate::field("name").contains("A"), &[])
        .unwrap()
        .subscribe();
    assert_eq!(next_snapshot(&mut with_a).await, vec![Card::new("1", "A")]);

    repo.save(Card::new("1", "C")).await.unwrap();
    assert!(next_snapshot(&mut with_a).await.is_empty());

    repo.delete_all().await.unwrap();
    let mut everything = repo.query_all().subscribe();
    assert!(next_snapshot(&mut everything).await.is_empty());
}

#[tokio::test]
async fn initial_snapshot_is_delivered_for_an_empty_collection() {
    let repo = memory_repo();

    let mut subscription = repo.query_all().subscribe();

    assert!(next_snapshot(&mut subscription).await.is_empty());
}

#[tokio::test]
async fn changes_outside_the_result_set_are_not_emitted() {
    let repo = memory_repo();
    let mut with_a = repo
        .query(&Predicate::field("name").contains("A"), &[])
        .unwrap()
        .subscribe();
    assert!(next_snapshot(&mut with_a).await.is_empty());

    repo.save(Card::new("2", "B")).await.unwrap();
    assert_quiet(&mut with_a, QUIET_WINDOW).await;

    repo.save(Card::new("3", "AA")).await.unwrap();
    assert_eq!(names(&next_snapshot(&mut with_a).await), vec!["AA"]);
}

#[tokio::test]
async fn saving_identical_content_does_not_emit() {
    let repo = memory_repo();
    let mut subscription = repo.query_all().subscribe();
    assert!(next_snapshot(&mut subscription).await.is_empty());

    repo.save(Card::new("1", "A")).await.unwrap();
    assert_eq!(next_snapshot(&mut subscription).await.len(), 1);

    repo.save(Card::new("1", "A")).await.unwrap();
    assert_quiet(&mut subscription, QUIET_WINDOW).await;
}

#[tokio::test]
async fn batch_changes_arrive_as_one_snapshot() {
    let repo = memory_repo();
    let mut subscription = repo.query_all().subscribe();
    assert!(next_snapshot(&mut subscription).await.is_empty());

    repo.save_all(vec![Card::new("1", "A"), Card::new("2", "B"), Card::new("3", "C")])
        .await
        .unwrap();
    assert_eq!(
        names(&next_snapshot(&mut subscription).await),
        vec!["A", "B", "C"]
    );

    repo.delete_many(&[Card::new("1", "A"), Card::new("3", "C")])
        .await
        .unwrap();
    assert_eq!(names(&next_snapshot(&mut subscription).await), vec!["B"]);
}

#[tokio::test]
async fn reordering_emits_a_new_snapshot() {
    let repo = memory_repo();
    repo.save_all(vec![Card::ranked("1", "A", 1), Card::ranked("2", "B", 2)])
        .await
        .unwrap();
    let mut by_rank = repo
        .query(&Predicate::True, &[SortDescriptor::ascending("rank")])
        .unwrap()
        .subscribe();
    assert_eq!(ids(&next_snapshot(&mut by_rank).await), vec!["1", "2"]);

    repo.save(Card::ranked("1", "A", 3)).await.unwrap();

    assert_eq!(ids(&next_snapshot(&mut by_rank).await), vec!["2", "1"]);
}

#[tokio::test]
async fn subscribers_are_independent() {
    let repo = memory_repo();
    let query = repo.query_all();
    let mut first = query.subscribe();
    let mut second = query.subscribe();
    assert!(next_snapshot(&mut first).await.is_empty());
    assert!(next_snapshot(&mut second).await.is_empty());

    first.cancel();
    repo.save(Card::new("1", "A")).await.unwrap();

    assert_eq!(next_snapshot(&mut second).await.len(), 1);
    assert!(try_next_snapshot(&mut first).await.is_none());
    assert_ne!(first.id(), second.id());
}

#[tokio::test]
async fn cancel_ends_the_stream_and_is_idempotent() {
    let repo = memory_repo();
    let mut subscription = repo.query_all().subscribe();
    assert!(next_snapshot(&mut subscription).await.is_empty());

    subscription.cancel();
    subscription.cancel();
    repo.save(Card::new("1", "A")).await.unwrap();

    assert!(subscription.is_cancelled());
    assert!(try_next_snapshot(&mut subscription).await.is_none());
}

#[tokio::test]
async fn dropping_a_subscription_unregisters_its_observer() {
    let repo = memory_repo();
    let mut subscription = repo.query_all().subscribe();
    assert!(next_snapshot(&mut subscription).await.is_empty());

    drop(subscription);

    let (tx, rx) = oneshot::channel();
    repo.worker()
        .schedule(move |ctx| {
            let _ = tx.send(ctx.observer_count());
        })
        .unwrap();
    assert_eq!(rx.await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_converge_on_one_snapshot() {
    let repo = memory_repo();
    let mut subscription = repo.query_all().subscribe();
    assert!(next_snapshot(&mut subscription).await.is_empty());

    let mut writers = Vec::new();
    for writer in 0..4 {
        let repo = repo.clone();
        writers.push(tokio::spawn(async move {
            for n in 0..25 {
                let id = format!("{writer}-{n}");
                repo.save(Card::new(&id, "bulk")).await.unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let mut latest = Vec::new();
    while latest.len() < 100 {
        latest = next_snapshot(&mut subscription).await;
    }
    assert_eq!(latest.len(), 100);
    assert_eq!(repo.query_all().fetch().await.unwrap().len(), 100);
}

#[tokio::test]
async fn commits_from_another_repository_reach_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.sqlite3");
    let writer = repo_with(StoreConfig::file(&path), &FatalLog::default());
    writer.save(Card::new("1", "A")).await.unwrap();

    let reader = repo_with(StoreConfig::file(&path), &FatalLog::default());
    let mut subscription = reader.query_all().subscribe();
    assert_eq!(names(&next_snapshot(&mut subscription).await), vec!["A"]);

    writer.save(Card::new("2", "B")).await.unwrap();

    assert_eq!(
        names(&next_snapshot(&mut subscription).await),
        vec!["A", "B"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commits_from_another_repository_arrive_while_the_reader_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("busy.sqlite3");
    let writer = repo_with(StoreConfig::file(&path), &FatalLog::default());
    writer.save(Card::new("1", "A")).await.unwrap();

    let reader = repo_with(StoreConfig::file(&path), &FatalLog::default());
    let mut subscription = reader.query_all().subscribe();
    assert_eq!(names(&next_snapshot(&mut subscription).await), vec!["A"]);

    let busy_reader = reader.clone();
    let load = tokio::spawn(async move {
        loop {
            busy_reader.query_all().fetch().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    writer.save(Card::new("2", "B")).await.unwrap();
    let snapshot = next_snapshot(&mut subscription).await;
    load.abort();

    assert_eq!(names(&snapshot), vec!["A", "B"]);
}

#[tokio::test]
async fn an_idle_subscriber_only_receives_the_newest_snapshot() {
    let repo = memory_repo();
    let mut subscription = repo.query_all().subscribe();

    for n in 0..50 {
        repo.save(Card::new(&n.to_string(), "bulk")).await.unwrap();
    }
    repo.query_all().fetch().await.unwrap();

    assert_eq!(next_snapshot(&mut subscription).await.len(), 50);
    assert_quiet(&mut subscription, QUIET_WINDOW).await;
}
