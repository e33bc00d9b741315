mod support;

use shelfwise::{
    application::jobs::{RefreshDisposition, StatsConfig, StatsRecomputer, TaskSupervisor},
    domain::{entities::BookStatsCounts, types::StatusTag},
};
use support::{MemoryStore, UserBookRow};
use uuid::Uuid;

fn rating(user_id: Uuid, book_id: Uuid, rating: Option<i16>, review: &str) -> UserBookRow {
    UserBookRow {
        user_id,
        book_id,
        rating,
        review_text: review.to_string(),
    }
}

#[tokio::test]
async fn refresh_aggregates_ratings_reviews_and_shelves() {
    let store = MemoryStore::new();
    let supervisor = TaskSupervisor::default();
    let stats = StatsRecomputer::new(store.clone(), supervisor.clone(), &StatsConfig::default());
    let book = Uuid::new_v4();
    let (user1, user2, user3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    store.add_user_book(rating(user1, book, Some(4), ""));
    store.add_user_book(rating(user2, book, Some(5), "good"));
    store.add_status_tag(user3, book, StatusTag::Finished);

    assert_eq!(stats.refresh(book), RefreshDisposition::Scheduled);
    supervisor.drain().await;

    let record = store.stats_for(book).expect("stats row");
    assert_eq!(
        record.counts,
        BookStatsCounts {
            rating_sum: 9,
            rating_count: 2,
            review_count: 1,
            reads_count: 1,
            want_to_read_count: 0,
        }
    );
    assert_eq!(record.average_rating(), Some(4.5));
}

#[tokio::test]
async fn unrated_rows_and_blank_reviews_are_ignored() {
    let store = MemoryStore::new();
    let stats = StatsRecomputer::new(
        store.clone(),
        TaskSupervisor::default(),
        &StatsConfig::default(),
    );
    let book = Uuid::new_v4();
    let reader = Uuid::new_v4();

    store.add_user_book(rating(reader, book, Some(0), "   "));
    store.add_user_book(rating(Uuid::new_v4(), book, None, ""));
    store.add_status_tag(reader, book, StatusTag::WantToRead);
    store.add_status_tag(reader, book, StatusTag::Owned);

    let record = stats.recompute_now(book).await.unwrap();

    assert_eq!(record.counts.rating_count, 0);
    assert_eq!(record.counts.review_count, 0);
    assert_eq!(record.counts.want_to_read_count, 1);
    assert_eq!(record.average_rating(), None);
}

#[tokio::test]
async fn recomputing_twice_without_writes_is_idempotent() {
    let store = MemoryStore::new();
    let stats = StatsRecomputer::new(
        store.clone(),
        TaskSupervisor::default(),
        &StatsConfig::default(),
    );
    let book = Uuid::new_v4();
    store.add_user_book(rating(Uuid::new_v4(), book, Some(3), "fine"));

    let first = stats.recompute_now(book).await.unwrap();
    let second = stats.recompute_now(book).await.unwrap();

    assert_eq!(first.counts, second.counts);
    assert_eq!(store.stats_for(book).unwrap().counts, second.counts);
}

#[tokio::test]
async fn refresh_many_schedules_each_book_once() {
    let store = MemoryStore::new();
    let supervisor = TaskSupervisor::default();
    let stats = StatsRecomputer::new(store.clone(), supervisor.clone(), &StatsConfig::default());
    let books: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();

    let scheduled = stats.refresh_many(books.iter().copied());
    supervisor.drain().await;

    assert_eq!(scheduled, books.len());
    assert!(books.iter().all(|book| store.stats_for(*book).is_some()));
    assert_eq!(stats.in_flight(), 0);
}
