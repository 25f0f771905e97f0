use svckit::{
    error::saved_or_duplicate,
    memory::InMemoryStore,
    prelude::*,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Document)]
#[serde(default)]
struct Setting {
    #[serde(rename = "_id")]
    id: String,
    language: String,
    #[serde(rename = "find_f_tid")]
    find_by_tmm_id: i32,
    #[serde(rename = "create_time")]
    created_at: i64,
    #[serde(rename = "update_time")]
    updated_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Document)]
struct Profile {
    #[serde(rename = "_id")]
    id: Option<ObjectId>,
    nickname: String,
    tags: Vec<String>,
    create_time: i64,
    update_time: i64,
}

fn setting(language: &str, find_by_tmm_id: i32) -> Setting {
    Setting {
        language: language.to_string(),
        find_by_tmm_id,
        ..Setting::default()
    }
}

#[tokio::test]
async fn insert_then_find_by_id_round_trips() {
    let store = DocumentStore::new(InMemoryStore::new());
    let settings = store.collection("user_config");

    let id = settings.insert_one(&setting("en", 1)).await.unwrap();
    let found: Setting = settings.find_by_id(id.clone()).await.unwrap();

    assert_eq!(id.as_str().map(str::len), Some(24));
    assert_eq!(found.id, id.as_str().unwrap());
    assert_eq!(found.language, "en");
    assert_eq!(found.find_by_tmm_id, 1);
    assert!(found.created_at > 0);
    assert_eq!(found.created_at, found.updated_at);
}

#[tokio::test]
async fn object_id_records_get_binary_identifiers() {
    let store = DocumentStore::new(InMemoryStore::new());
    let profiles = store.collection("profiles");
    let profile = Profile {
        nickname: "neo".into(),
        tags: vec!["a".into(), "b".into()],
        ..Profile::default()
    };

    let id = profiles.insert_one(&profile).await.unwrap();
    let found: Profile = profiles.find_by_id(id.clone()).await.unwrap();

    assert!(matches!(id, Bson::ObjectId(_)));
    assert_eq!(found.id, id.as_object_id());
    assert_eq!(found.nickname, profile.nickname);
    assert_eq!(found.tags, profile.tags);
    assert!(found.create_time > 0 && found.update_time > 0);
}

#[tokio::test]
async fn supplied_identifiers_and_timestamps_are_kept() {
    let store = DocumentStore::new(InMemoryStore::new());
    let settings = store.collection("user_config");
    let record = Setting {
        id: "u-1".into(),
        created_at: 1_000,
        ..setting("de", 0)
    };

    let id = settings.insert_one(&record).await.unwrap();
    let found: Setting = settings.find_by_id("u-1").await.unwrap();

    assert_eq!(id, Bson::String("u-1".into()));
    assert_eq!(found.created_at, 1_000);
    assert!(found.updated_at > 1_000);
}

#[tokio::test]
async fn update_patches_only_non_zero_fields() {
    let store = DocumentStore::new(InMemoryStore::new());
    let id = store
        .collection("user_config")
        .insert_one(&setting("en", 1))
        .await
        .unwrap();

    let mut handle = store.collection("user_config");
    handle.filter(Filter::id(id.clone()));
    let outcome = handle.update_one(&setting("", 5)).await.unwrap();

    let found: Setting = store.collection("user_config").find_by_id(id).await.unwrap();

    assert_eq!((outcome.matched, outcome.modified), (1, 1));
    assert_eq!(found.language, "en");
    assert_eq!(found.find_by_tmm_id, 5);
    assert!(found.updated_at >= found.created_at);
}

#[tokio::test]
async fn map_patches_keep_explicit_zero_values() {
    let store = DocumentStore::new(InMemoryStore::new());
    let settings = store.collection("user_config");
    let id = settings.insert_one(&setting("en", 1)).await.unwrap();

    let outcome = settings
        .update_by_id(id.clone(), &doc! { "find_f_tid": 0 })
        .await
        .unwrap();
    let found: Setting = settings.find_by_id(id).await.unwrap();

    assert_eq!(outcome.matched, 1);
    assert_eq!(found.find_by_tmm_id, 0);
    assert_eq!(found.language, "en");
}

#[tokio::test]
async fn upsert_creates_from_filter_and_patch() {
    let store = DocumentStore::new(InMemoryStore::new());
    let mut handle = store.collection("user_config");
    handle.filter(Filter::eq("language", "fr"));

    let created: bson::Document = handle.upsert(&setting("", 9)).await.unwrap();
    let updated: bson::Document = handle.upsert(&setting("", 10)).await.unwrap();

    assert_eq!(created.get_str("language").unwrap(), "fr");
    assert_eq!(created.get_i32("find_f_tid").unwrap(), 9);
    assert_eq!(updated.get("_id"), created.get("_id"));
    assert_eq!(updated.get_i32("find_f_tid").unwrap(), 10);
    assert_eq!(handle.count().await.unwrap(), 1);
}

#[tokio::test]
async fn find_many_applies_sort_paging_and_projection() {
    let store = DocumentStore::new(InMemoryStore::new());
    let records = (1..=5)
        .map(|n| setting(if n % 2 == 0 { "en" } else { "de" }, n))
        .collect::<Vec<_>>();
    let ids = store.collection("user_config").insert_many(&records).await.unwrap();

    let mut handle = store.collection("user_config");
    handle
        .filter(Filter::gte("find_f_tid", 2))
        .sort("find_f_tid", SortDirection::Desc)
        .skip(1)
        .limit(2)
        .fields("find_f_tid");
    let page: Vec<Setting> = handle.find_many().await.unwrap();

    assert_eq!(ids.len(), 5);
    assert_eq!(
        page.iter().map(|s| s.find_by_tmm_id).collect::<Vec<_>>(),
        vec![4, 3]
    );
    assert!(page.iter().all(|s| s.language.is_empty() && !s.id.is_empty()));
}

#[tokio::test]
async fn find_one_reports_missing_documents() {
    let store = DocumentStore::new(InMemoryStore::new());
    let mut handle = store.collection("user_config");
    handle.filter(Filter::eq("language", "xx"));

    let err = handle.find_one::<Setting>().await.unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn delete_requires_a_filter() {
    let store = DocumentStore::new(InMemoryStore::new());
    let settings = store.collection("user_config");
    settings.insert_one(&setting("en", 1)).await.unwrap();

    let unfiltered = settings.delete().await;
    let mut empty = store.collection("user_config");
    empty.filter(Filter::and(Vec::new()));
    let empty_filter = empty.delete().await;

    assert!(matches!(unfiltered, Err(DocumentStoreError::UnfilteredDelete(_))));
    assert!(matches!(empty_filter, Err(DocumentStoreError::UnfilteredDelete(_))));
    assert_eq!(settings.count().await.unwrap(), 1);

    let mut filtered = store.collection("user_config");
    filtered.filter(Filter::eq("language", "en"));
    assert_eq!(filtered.delete().await.unwrap(), 1);
    assert_eq!(settings.count().await.unwrap(), 0);
}

#[tokio::test]
async fn delete_rejects_filters_that_match_everything() {
    let store = DocumentStore::new(InMemoryStore::new());
    let settings = store.collection("user_config");
    for language in ["en", "de", "fr"] {
        settings.insert_one(&setting(language, 1)).await.unwrap();
    }

    let mut widened = store.collection("user_config");
    widened.filter(Filter::or([Filter::eq("find_f_tid", 999), Filter::and(Vec::new())]));
    let mut double_negation = store.collection("user_config");
    double_negation.filter(Filter::and(Vec::new()).not().not());

    assert!(matches!(widened.delete().await, Err(DocumentStoreError::UnfilteredDelete(_))));
    assert!(matches!(double_negation.delete().await, Err(DocumentStoreError::UnfilteredDelete(_))));
    assert_eq!(settings.count().await.unwrap(), 3);
}

#[tokio::test]
async fn duplicate_identifiers_are_reported() {
    let store = DocumentStore::new(InMemoryStore::new());
    let settings = store.collection("user_config");

    let first = settings.insert_one_raw(doc! { "_id": "a" }).await;
    let second = settings.insert_one_raw(doc! { "_id": "a" }).await;

    assert!(saved_or_duplicate(&first));
    assert!(saved_or_duplicate(&second));
    assert!(second.unwrap_err().is_duplicate_key());
}

#[tokio::test]
async fn aggregate_runs_typed_stages() {
    let store = DocumentStore::new(InMemoryStore::new());
    let settings = store.collection("user_config");
    settings
        .insert_many(&[setting("en", 3), setting("de", 2), setting("en", 1)])
        .await
        .unwrap();

    let rows: Vec<Setting> = settings
        .aggregate([
            Stage::Match(Filter::eq("language", "en")),
            Stage::Sort(vec![Sort::asc("find_f_tid")]),
        ])
        .await
        .unwrap();

    assert_eq!(
        rows.iter().map(|s| s.find_by_tmm_id).collect::<Vec<_>>(),
        vec![1, 3]
    );
}

#[tokio::test]
async fn collections_in_other_databases_are_separate() {
    let store = DocumentStore::new(InMemoryStore::new());
    store
        .collection_in("tmm", "user_config")
        .insert_one(&setting("en", 1))
        .await
        .unwrap();

    assert_eq!(store.collection("user_config").count().await.unwrap(), 0);
    assert_eq!(store.collection_in("tmm", "user_config").count().await.unwrap(), 1);
}
