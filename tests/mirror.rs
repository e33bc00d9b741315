mod support;

use std::sync::Arc;

use httpmock::MockServer;
use serde_json::json;
use shelfwise::{
    application::{error::CatalogError, mirror::MirrorResolver},
    domain::{books::BookFields, keys::WorkKey},
};
use support::{MemoryStore, catalog_for};

fn resolver(server: &MockServer, store: &Arc<MemoryStore>) -> MirrorResolver {
    MirrorResolver::new(store.clone(), catalog_for(&server.base_url()))
}

#[tokio::test]
async fn later_upserts_only_fill_empty_fields() {
    let server = MockServer::start_async().await;
    let store = MemoryStore::new();
    let mirror = resolver(&server, &store);
    let key = WorkKey::parse("W1").unwrap();

    mirror
        .upsert_book(&key, &BookFields::new().title("A").cover_url(""))
        .await
        .unwrap();
    let book = mirror
        .upsert_book(&key, &BookFields::new().title("B").cover_url("c.jpg"))
        .await
        .unwrap();

    assert_eq!(book.title, "A");
    assert_eq!(book.cover_url, "c.jpg");
    assert_eq!(store.books().len(), 1);
}

#[tokio::test]
async fn repeating_an_upsert_writes_nothing() {
    let server = MockServer::start_async().await;
    let store = MemoryStore::new();
    let mirror = resolver(&server, &store);
    let key = WorkKey::parse("OL7W").unwrap();
    let fields = BookFields::new().title("Kindred").publication_year(1979);

    let first = mirror.upsert_book(&key, &fields).await.unwrap();
    let second = mirror.upsert_book(&key, &fields).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.book_writes(), 1);
}

#[tokio::test]
async fn isbn_resolution_strips_prefix_and_round_trips() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/isbn/9780441172719.json");
            then.status(200).json_body(json!({
                "title": "Dune",
                "covers": [8739161],
                "publishers": ["Ace"],
                "number_of_pages": 535,
                "works": [{"key": "/works/OL893415W"}]
            }));
        })
        .await;
    let store = MemoryStore::new();
    let mirror = resolver(&server, &store);

    let resolution = mirror.resolve_by_isbn("978-0441172719").await.unwrap();
    let work_key = resolution.work_key.expect("work key");
    let book = resolution.book.expect("book");

    assert_eq!(work_key.as_str(), "OL893415W");
    assert_eq!(book.work_key, work_key);
    assert_eq!(book.title, "Dune");
    assert_eq!(book.isbn13, "9780441172719");
    assert_eq!(book.publisher, "Ace");
    assert_eq!(book.page_count, 535);
    assert_eq!(
        book.cover_url,
        "https://covers.openlibrary.org/b/id/8739161-M.jpg"
    );

    let again = mirror
        .upsert_book(&work_key, &BookFields::new())
        .await
        .unwrap();
    assert_eq!(again, book);
    assert_eq!(store.book_writes(), 1);
}

#[tokio::test]
async fn edition_without_works_resolves_to_nothing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/isbn/0441172717.json");
            then.status(200).json_body(json!({"title": "Orphan edition", "works": []}));
        })
        .await;
    let store = MemoryStore::new();
    let mirror = resolver(&server, &store);

    let resolution = mirror.resolve_by_isbn("0441172717").await.unwrap();

    assert!(resolution.work_key.is_none());
    assert!(resolution.book.is_none());
    assert!(store.books().is_empty());
}

#[tokio::test]
async fn upstream_failure_propagates_without_writing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/isbn/9780441172719.json");
            then.status(503);
        })
        .await;
    let store = MemoryStore::new();
    let mirror = resolver(&server, &store);

    let err = mirror
        .resolve_by_isbn_or_fallback("9780441172719", None)
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Upstream(_)));
    assert_eq!(err.kind(), "upstream_status");
    assert_eq!(store.book_writes(), 0);
}

#[tokio::test]
async fn upstream_failure_uses_local_fallback_when_given() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/isbn/9780441172719.json");
            then.status(500);
        })
        .await;
    let store = MemoryStore::new();
    let mirror = resolver(&server, &store);
    let key = WorkKey::parse("/works/OL893415W").unwrap();

    let resolution = mirror
        .resolve_by_isbn_or_fallback(
            "9780441172719",
            Some((key.clone(), BookFields::new().title("Dune").isbn13("9780441172719"))),
        )
        .await
        .unwrap();

    assert_eq!(resolution.work_key, Some(key));
    let book = resolution.book.expect("fallback book");
    assert_eq!(book.title, "Dune");
    assert_eq!(store.books().len(), 1);
}

#[tokio::test]
async fn malformed_isbns_are_rejected_before_any_request() {
    let server = MockServer::start_async().await;
    let store = MemoryStore::new();
    let mirror = resolver(&server, &store);

    let err = mirror.resolve_by_isbn("12345").await.unwrap_err();

    assert_eq!(err.kind(), "invalid");
}

#[tokio::test]
async fn work_resolution_collects_names_best_effort() {
    let server = MockServer::start_async().await;
    let subjects: Vec<String> = (1..=12).map(|n| format!("Subject {n}")).collect();
    server
        .mock_async(|when, then| {
            when.method("GET").path("/works/OL45804W.json");
            then.status(200).json_body(json!({
                "title": "Fantastic Mr Fox",
                "description": {"type": "/type/text", "value": "A fox outwits three farmers."},
                "covers": [6498519],
                "authors": [
                    {"author": {"key": "/authors/OL34184A"}},
                    {"author": {"key": "/authors/OL404A"}}
                ],
                "subjects": subjects
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/authors/OL34184A.json");
            then.status(200)
                .json_body(json!({"name": "Roald Dahl", "key": "/authors/OL34184A"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/authors/OL404A.json");
            then.status(404);
        })
        .await;
    let store = MemoryStore::new();
    let mirror = resolver(&server, &store);

    let book = mirror
        .resolve_work(&WorkKey::parse("OL45804W").unwrap())
        .await
        .unwrap();

    assert_eq!(book.title, "Fantastic Mr Fox");
    assert_eq!(book.authors, "Roald Dahl");
    assert_eq!(
        book.cover_url,
        "https://covers.openlibrary.org/b/id/6498519-M.jpg"
    );
    assert_eq!(book.subjects.split(", ").count(), 10);
    assert!(book.subjects.starts_with("Subject 1, Subject 2"));
}
