use std::fs;

use rental_ingest::{IngestError, SnapshotStore};

fn store_with(files: &[(&str, &str)]) -> (tempfile::TempDir, SnapshotStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = dir.path().join("snapshot");
    fs::create_dir(&db).expect("db dir");
    for (name, content) in files {
        fs::write(db.join(name), content).expect("write collection");
    }
    let uri = format!("file://{}", dir.path().display());
    let store = SnapshotStore::connect(&uri, "snapshot").expect("connect");
    (dir, store)
}

#[test]
fn fetches_all_three_collections() {
    let (_dir, store) = store_with(&[
        (
            "listings.csv",
            "id,host_id,price,amenities\n1,h1,$10.00,\"[\"\"Wifi\"\"]\"\n",
        ),
        (
            "calendar.jsonl",
            "{\"listing_id\": 1, \"date\": \"2024-01-01\", \"available\": \"f\"}\n",
        ),
        (
            "reviews.json",
            r#"[{"listing_id": 1, "id": 7, "date": {"$date": "2024-01-02T00:00:00Z"}}]"#,
        ),
    ]);

    assert_eq!(
        store.collections().expect("collections"),
        vec!["calendar", "listings", "reviews"]
    );
    let listings = store.fetch("listings").expect("listings");
    let calendar = store.fetch("calendar").expect("calendar");
    let reviews = store.fetch("reviews").expect("reviews");
    assert_eq!(listings.shape(), (1, 4));
    assert_eq!(calendar.height(), 1);
    assert_eq!(reviews.height(), 1);
    store.disconnect();
}

#[test]
fn missing_collection_is_an_error() {
    let (_dir, store) = store_with(&[("listings.csv", "id\n1\n")]);
    let result = store.fetch("reviews");
    assert!(matches!(result, Err(IngestError::MissingCollection { .. })));
}

#[test]
fn malformed_json_reports_the_line() {
    let (_dir, store) = store_with(&[("calendar.jsonl", "{\"a\": 1}\n{oops\n")]);
    let result = store.fetch("calendar");
    assert!(matches!(result, Err(IngestError::Json { line: 2, .. })));
}
