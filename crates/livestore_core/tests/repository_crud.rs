mod common;

use common::{ids, memory_repo, names, repo_with, Card, FatalLog};
use livestore_core::{
    DbError, Predicate, QueryError, RepoError, Repository, SortDescriptor, StoreConfig,
};
use std::time::Duration;

#[tokio::test]
async fn save_then_fetch_returns_the_entity() {
    let repo = memory_repo();

    repo.save(Card::new("1", "A")).await.unwrap();

    let cards = repo.query_all().fetch().await.unwrap();
    assert_eq!(cards, vec![Card::new("1", "A")]);
}

#[tokio::test]
async fn saving_an_existing_identity_replaces_it() {
    let repo = memory_repo();

    repo.save(Card::new("1", "A")).await.unwrap();
    repo.save(Card::new("1", "C")).await.unwrap();

    let cards = repo.query_all().fetch().await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].name, "C");
}

#[tokio::test]
async fn unsorted_queries_keep_insertion_order_across_upserts() {
    let repo = memory_repo();
    repo.save_all(vec![
        Card::new("b", "first"),
        Card::new("a", "second"),
        Card::new("c", "third"),
    ])
    .await
    .unwrap();

    repo.save(Card::new("b", "first, edited")).await.unwrap();

    let cards = repo.query_all().fetch().await.unwrap();
    assert_eq!(ids(&cards), vec!["b", "a", "c"]);
}

#[tokio::test]
async fn delete_of_absent_entity_succeeds_without_changes() {
    let repo = memory_repo();
    repo.save(Card::new("1", "A")).await.unwrap();

    repo.delete(&Card::new("missing", "?")).await.unwrap();

    assert_eq!(repo.query_all().fetch().await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_removes_by_identity_regardless_of_other_fields() {
    let repo = memory_repo();
    repo.save(Card::new("1", "A")).await.unwrap();

    repo.delete(&Card::new("1", "stale copy")).await.unwrap();

    assert!(repo.query_all().fetch().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_many_and_delete_all_empty_the_collection() {
    let repo = memory_repo();
    let cards = vec![Card::new("1", "A"), Card::new("2", "B"), Card::new("3", "C")];
    repo.save_all(cards.clone()).await.unwrap();

    repo.delete_many(&cards[..2]).await.unwrap();
    assert_eq!(names(&repo.query_all().fetch().await.unwrap()), vec!["C"]);

    repo.delete_all().await.unwrap();
    assert!(repo.query_all().fetch().await.unwrap().is_empty());

    repo.delete_all().await.unwrap();
}

#[tokio::test]
async fn empty_batches_complete_successfully() {
    let repo = memory_repo();

    repo.save_all(Vec::new()).await.unwrap();
    repo.delete_many(&[]).await.unwrap();

    assert!(repo.query_all().fetch().await.unwrap().is_empty());
}

#[tokio::test]
async fn batch_save_is_all_or_nothing() {
    let config = StoreConfig::in_memory().schema_version(1).migration_step(
        1,
        "CREATE TABLE entity_card (id TEXT PRIMARY KEY NOT NULL, body TEXT NOT NULL);
         CREATE TRIGGER reject_poison BEFORE INSERT ON entity_card
         WHEN json_extract(NEW.body, '$.name') = 'poison'
         BEGIN SELECT RAISE(ABORT, 'poisoned card'); END;",
    );
    let repo = repo_with(config, &FatalLog::default());
    repo.save(Card::new("0", "kept")).await.unwrap();

    let err = repo
        .save_all(vec![
            Card::new("1", "A"),
            Card::new("2", "poison"),
            Card::new("3", "C"),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, RepoError::Db(DbError::Sqlite(_))));
    assert_eq!(names(&repo.query_all().fetch().await.unwrap()), vec!["kept"]);
}

#[tokio::test]
async fn completion_does_nothing_until_polled() {
    let repo = memory_repo();

    let pending = repo.save(Card::new("1", "A"));
    assert!(!pending.is_scheduled());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(repo.query_all().fetch().await.unwrap().is_empty());

    pending.await.unwrap();
    assert_eq!(repo.query_all().fetch().await.unwrap().len(), 1);
}

#[tokio::test]
async fn filtered_queries_match_text_and_null_predicates() {
    let repo = memory_repo();
    let mut decked = Card::new("3", "Gamma");
    decked.deck = Some("spanish".to_string());
    repo.save_all(vec![Card::new("1", "Alpha"), Card::new("2", "beta"), decked])
        .await
        .unwrap();

    let contains = repo
        .query(&Predicate::field("name").contains_ignore_case("A"), &[])
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(names(&contains), vec!["Alpha", "beta", "Gamma"]);

    let case_sensitive = repo
        .query(&Predicate::field("name").begins_with("b"), &[])
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(names(&case_sensitive), vec!["beta"]);

    let suffix = repo
        .query(&Predicate::field("name").ends_with("mma"), &[])
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(names(&suffix), vec!["Gamma"]);

    let without_deck = repo
        .query(&Predicate::field("deck").is_null(), &[])
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&without_deck), vec!["1", "2"]);

    let negated = repo
        .query(&Predicate::field("deck").eq("spanish").negate(), &[])
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&negated), vec!["1", "2"]);
}

#[tokio::test]
async fn ordering_applies_descriptors_then_identity() {
    let repo = memory_repo();
    repo.save_all(vec![
        Card::ranked("c", "x", 2),
        Card::ranked("a", "y", 1),
        Card::ranked("b", "z", 2),
        Card::ranked("d", "w", 3),
    ])
    .await
    .unwrap();

    let by_rank = repo
        .query(
            &Predicate::field("rank").ge(2_i64),
            &[SortDescriptor::descending("rank")],
        )
        .unwrap()
        .fetch()
        .await
        .unwrap();

    assert_eq!(ids(&by_rank), vec!["d", "b", "c"]);
}

#[tokio::test]
async fn invalid_queries_fail_before_scheduling() {
    let repo = memory_repo();

    let err = repo
        .query(&Predicate::field("colour").eq("red"), &[])
        .err()
        .unwrap();
    assert!(matches!(err, QueryError::UnknownField { ref field, .. } if field == "colour"));

    let err = repo
        .query(&Predicate::True, &[SortDescriptor::ascending("name; DROP")])
        .err()
        .unwrap();
    assert!(matches!(err, QueryError::MalformedField(_)));
}

#[tokio::test]
async fn clones_share_one_worker() {
    let repo = memory_repo();
    let clone = repo.clone();

    clone.save(Card::new("1", "A")).await.unwrap();

    assert_eq!(repo.query_all().fetch().await.unwrap().len(), 1);
    assert_eq!(repo.worker().name(), clone.worker().name());
}

#[tokio::test]
async fn range_comparisons_never_match_values_of_another_type() {
    let repo = memory_repo();
    repo.save_all(vec![
        Card::ranked("1", "A", 5),
        Card::ranked("2", "B", 50),
    ])
    .await
    .unwrap();

    let text_above_number = repo
        .query(&Predicate::field("name").gt(1000_i64), &[])
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert!(text_above_number.is_empty());

    let number_below_text = repo
        .query(&Predicate::field("rank").lt("a"), &[])
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert!(number_below_text.is_empty());

    let numeric = repo
        .query(&Predicate::field("rank").gt(10_i64), &[])
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&numeric), vec!["2"]);

    let outside_range = repo
        .query(&Predicate::field("name").gt(1000_i64).negate(), &[])
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(ids(&outside_range), vec!["1", "2"]);
}
