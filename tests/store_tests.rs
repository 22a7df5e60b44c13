//! Integration tests for the store facade.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use sealbox::crypto::{KeyCache, KeyNames, MemoryKeyCache, MIN_ITERATIONS};
use sealbox::errors::SecretsError;
use sealbox::file::{FailureReason, FileState, SecretValue, HEADER_LEN};
use sealbox::store::{ItemSearch, SecretsStore};
use tempfile::TempDir;
use zeroize::Zeroizing;

fn store() -> SecretsStore {
    SecretsStore::with_kdf_iterations(Arc::new(MemoryKeyCache::new()), MIN_ITERATIONS)
}

fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A writable, unlocked store at `path`.
async fn writable(path: &Path, password: &str) -> SecretsStore {
    let store = store();
    store.setup(path, false).await.unwrap();
    store.set_credentials(password).await.unwrap();
    store
}

async fn read_only(path: &Path, password: &str) -> SecretsStore {
    let store = store();
    store.setup(path, true).await.unwrap();
    store.set_credentials(password).await.unwrap();
    store
}

#[tokio::test]
async fn wifi_scenario_round_trips() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("s.store");

    let store = writable(&path, "correct-horse").await;
    let work = store.create_collection("work").await.unwrap();
    work.create_item(
        "wifi",
        attrs(&[("ssid", "x")]),
        SecretValue::new("password", b"secret123".to_vec()),
    )
    .unwrap();
    store.save().await.unwrap();
    store.close().await.unwrap();

    let reopened = read_only(&path, "correct-horse").await;
    assert_eq!(reopened.dir_collections().await.unwrap(), vec!["work"]);

    let work = reopened.read_collection("work").await.unwrap();
    let hits = work
        .search_items(&ItemSearch::from_attributes(&attrs(&[("ssid", "")])))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].label().unwrap(), "wifi");
    let value = hits[0].value().unwrap();
    assert_eq!(value.as_bytes(), b"secret123");
    assert_eq!(value.content_type, "password");
}

#[tokio::test]
async fn corrupted_store_refuses_to_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");

    let store = writable(&path, "correct-horse").await;
    let work = store.create_collection("work").await.unwrap();
    work.create_item("k", BTreeMap::new(), SecretValue::new("text/plain", b"v".to_vec()))
        .unwrap();
    store.save().await.unwrap();
    store.close().await.unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let offset = HEADER_LEN + 8 + 9 + 16;
    bytes[offset] ^= 0x80;
    fs::write(&path, &bytes).unwrap();

    let reader = store_for(&path, true).await;
    assert!(matches!(
        reader.set_credentials("correct-horse").await,
        Err(SecretsError::IntegrityCheckFailed)
    ));
    assert_eq!(
        reader.file_state().unwrap(),
        Some(FileState::Failed(FailureReason::IntegrityCheckFailed))
    );
    assert!(matches!(
        reader.dir_collections().await,
        Err(SecretsError::NoCredentials)
    ));
}

async fn store_for(path: &Path, read_only: bool) -> SecretsStore {
    let store = store();
    store.setup(path, read_only).await.unwrap();
    store
}

#[tokio::test]
async fn duplicate_collection_fails_and_leaves_store_unchanged() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    let store = writable(&path, "pw").await;

    store.create_collection("work").await.unwrap();
    assert!(matches!(
        store.create_collection("work").await,
        Err(SecretsError::AlreadyExists(_))
    ));
    assert_eq!(store.dir_collections().await.unwrap(), vec!["work"]);
}

#[tokio::test]
async fn invalid_collection_names_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = writable(&tmp.path().join("s.store"), "pw").await;
    for name in ["", "bad\nname"] {
        assert!(matches!(
            store.create_collection(name).await,
            Err(SecretsError::InvalidName(_))
        ));
    }
}

#[tokio::test]
async fn deleted_collection_disappears_with_its_items() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    let store = writable(&path, "pw").await;

    let work = store.create_collection("work").await.unwrap();
    work.create_item("a", BTreeMap::new(), SecretValue::new("t", b"1".to_vec()))
        .unwrap();
    store.create_collection("home").await.unwrap();
    store.delete_collection("work").await.unwrap();

    assert_eq!(store.dir_collections().await.unwrap(), vec!["home"]);
    assert!(matches!(
        work.items(),
        Err(SecretsError::CollectionNotFound(_))
    ));
    assert!(matches!(
        store.read_collection("work").await,
        Err(SecretsError::CollectionNotFound(_))
    ));

    let home = store.read_collection("home").await.unwrap();
    store.delete_collection(&home).await.unwrap();
    assert!(store.dir_collections().await.unwrap().is_empty());
    assert!(matches!(
        store.delete_collection(&home).await,
        Err(SecretsError::CollectionNotFound(_))
    ));
}

#[tokio::test]
async fn items_support_crud_and_timestamps() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    let store = writable(&path, "pw").await;
    let work = store.create_collection("work").await.unwrap();

    let item = work
        .create_item(
            "mail",
            attrs(&[("user", "me")]),
            SecretValue::new("text/plain", b"hunter2".to_vec()),
        )
        .unwrap();
    let created = item.created_time().unwrap();
    assert_eq!(item.modified_time().unwrap(), created);

    std::thread::sleep(std::time::Duration::from_millis(5));
    item.set_label("email").unwrap();
    item.set_attributes(attrs(&[("user", "you")])).unwrap();
    item.set_value(SecretValue::new("text/plain", b"hunter3".to_vec()))
        .unwrap();

    assert_eq!(item.label().unwrap(), "email");
    assert_eq!(item.attributes().unwrap(), attrs(&[("user", "you")]));
    assert_eq!(item.value().unwrap().as_bytes(), b"hunter3");
    assert_eq!(item.created_time().unwrap(), created);
    assert!(item.modified_time().unwrap() > created);

    store.save().await.unwrap();
    store.close().await.unwrap();

    let reopened = read_only(&path, "pw").await;
    let items = reopened.read_collection("work").await.unwrap().items().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id(), item.id());
    assert_eq!(items[0].label().unwrap(), "email");
    assert_eq!(items[0].created_time().unwrap(), created);
}

#[tokio::test]
async fn duplicate_item_needs_replace_policy() {
    let tmp = TempDir::new().unwrap();
    let store = writable(&tmp.path().join("s.store"), "pw").await;
    let work = store.create_collection("work").await.unwrap();
    let a = attrs(&[("ssid", "x")]);

    let first = work
        .create_item("wifi", a.clone(), SecretValue::new("t", b"one".to_vec()))
        .unwrap();
    assert!(matches!(
        work.create_item("wifi", a.clone(), SecretValue::new("t", b"two".to_vec())),
        Err(SecretsError::AlreadyExists(_))
    ));

    let replaced = work
        .create_or_replace_item("wifi", a.clone(), SecretValue::new("t", b"two".to_vec()))
        .unwrap();
    assert_eq!(replaced, first);
    assert_eq!(work.item_count().unwrap(), 1);
    assert_eq!(first.value().unwrap().as_bytes(), b"two");

    // Different attributes make it a different item.
    work.create_item("wifi", BTreeMap::new(), SecretValue::new("t", b"3".to_vec()))
        .unwrap();
    assert_eq!(work.item_count().unwrap(), 2);
}

#[tokio::test]
async fn renaming_an_item_onto_another_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = writable(&tmp.path().join("s.store"), "pw").await;
    let work = store.create_collection("work").await.unwrap();
    let v = || SecretValue::new("t", b"1".to_vec());

    work.create_item("wifi", attrs(&[("ssid", "x")]), v()).unwrap();
    let other = work.create_item("vpn", attrs(&[("ssid", "x")]), v()).unwrap();
    let bare = work.create_item("wifi", BTreeMap::new(), v()).unwrap();

    assert!(matches!(
        other.set_label("wifi"),
        Err(SecretsError::AlreadyExists(_))
    ));
    assert_eq!(other.label().unwrap(), "vpn");
    assert!(matches!(
        bare.set_attributes(attrs(&[("ssid", "x")])),
        Err(SecretsError::AlreadyExists(_))
    ));
    assert!(bare.attributes().unwrap().is_empty());

    // Setting an item's own identity again is fine.
    other.set_label("vpn").unwrap();
    bare.set_attributes(attrs(&[("ssid", "y")])).unwrap();
    assert_eq!(work.item_count().unwrap(), 3);
}

#[tokio::test]
async fn delete_item_reports_whether_it_removed_anything() {
    let tmp = TempDir::new().unwrap();
    let store = writable(&tmp.path().join("s.store"), "pw").await;
    let work = store.create_collection("work").await.unwrap();
    let home = store.create_collection("home").await.unwrap();

    let item = work
        .create_item("a", BTreeMap::new(), SecretValue::new("t", b"1".to_vec()))
        .unwrap();
    assert!(!home.delete_item(&item).unwrap());
    assert!(work.delete_item(&item).unwrap());
    assert!(!work.delete_item(&item).unwrap());
    assert!(matches!(item.label(), Err(SecretsError::ItemNotFound)));
}

#[tokio::test]
async fn search_combines_label_attributes_and_regex() {
    let tmp = TempDir::new().unwrap();
    let store = writable(&tmp.path().join("s.store"), "pw").await;
    let work = store.create_collection("work").await.unwrap();
    let v = || SecretValue::new("t", b"x".to_vec());

    work.create_item("db", attrs(&[("host", "db.example.com"), ("env", "prod")]), v())
        .unwrap();
    work.create_item("db", attrs(&[("host", "db.example.org"), ("env", "dev")]), v())
        .unwrap();
    work.create_item("cache", attrs(&[("host", "cache.example.com")]), v())
        .unwrap();

    let by_label = work.search_items(&ItemSearch::new().label("db")).unwrap();
    assert_eq!(by_label.len(), 2);

    let any_env = work.search_items(&ItemSearch::new().attribute("env", "")).unwrap();
    assert_eq!(any_env.len(), 2);

    let prod = work
        .search_items(&ItemSearch::new().label("db").attribute("env", "prod"))
        .unwrap();
    assert_eq!(prod.len(), 1);

    let dot_com = ItemSearch::new()
        .attribute_regex("host", r"\.com$")
        .unwrap();
    assert_eq!(work.search_items(&dot_com).unwrap().len(), 2);
}

#[tokio::test]
async fn read_only_store_rejects_mutation() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    let store = writable(&path, "pw").await;
    store.create_collection("work").await.unwrap();
    store.save().await.unwrap();
    store.close().await.unwrap();

    let reader = read_only(&path, "pw").await;
    assert!(matches!(
        reader.create_collection("other").await,
        Err(SecretsError::ReadOnly)
    ));
    let work = reader.read_collection("work").await.unwrap();
    assert!(matches!(
        work.create_item("a", BTreeMap::new(), SecretValue::new("t", b"1".to_vec())),
        Err(SecretsError::ReadOnly)
    ));
    assert!(matches!(reader.save().await, Err(SecretsError::ReadOnly)));
}

#[tokio::test]
async fn read_only_setup_of_missing_file_creates_nothing() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("absent.store");
    let store = store();
    assert!(matches!(
        store.setup(&path, true).await,
        Err(SecretsError::CannotOpenFile { .. })
    ));
    assert!(!path.exists());
}

#[tokio::test]
async fn blank_file_cannot_be_initialised_read_only() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    fs::write(&path, b"").unwrap();

    let store = store_for(&path, true).await;
    assert!(matches!(
        store.set_credentials("pw").await,
        Err(SecretsError::ReadOnly)
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn second_writer_fails_fast() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    let _first = writable(&path, "pw").await;

    let second = store();
    assert!(matches!(
        second.setup(&path, false).await,
        Err(SecretsError::CannotLockFile(_))
    ));

    // Readers do not need the lock.
    let reader = read_only(&path, "pw").await;
    assert!(reader.dir_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn password_change_rekeys_the_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    let store = writable(&path, "old-password").await;
    store.create_collection("work").await.unwrap();
    store.save().await.unwrap();

    store.change_password("new-password").await.unwrap();
    store.close().await.unwrap();

    let old = store_for(&path, true).await;
    assert!(matches!(
        old.set_credentials("old-password").await,
        Err(SecretsError::IntegrityCheckFailed)
    ));
    let new = read_only(&path, "new-password").await;
    assert_eq!(new.dir_collections().await.unwrap(), vec!["work"]);
}

#[tokio::test]
async fn custom_key_names_are_used_in_the_cache() {
    let tmp = TempDir::new().unwrap();
    let cache = MemoryKeyCache::new();
    let store = SecretsStore::with_kdf_iterations(Arc::new(cache.clone()), MIN_ITERATIONS);
    store.setup(tmp.path().join("s.store"), false).await.unwrap();
    store
        .set_credentials_with_names("pw", KeyNames::new("work:enc", "work:mac"))
        .await
        .unwrap();

    assert!(cache.get("work:enc").unwrap().is_some());
    assert!(cache.get("work:mac").unwrap().is_some());
    assert!(cache.get("secrets:encrypting").unwrap().is_none());
}

#[tokio::test]
async fn unsaved_changes_are_not_persisted() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    let store = writable(&path, "pw").await;
    store.save().await.unwrap();
    store.create_collection("draft").await.unwrap();
    store.close().await.unwrap();

    let reader = read_only(&path, "pw").await;
    assert!(reader.dir_collections().await.unwrap().is_empty());
}

/// Key cache that fails one `put` of a chosen name once armed.
#[derive(Clone, Default)]
struct FlakyCache {
    inner: MemoryKeyCache,
    fail_put: Arc<Mutex<Option<String>>>,
}

impl FlakyCache {
    fn fail_next_put(&self, name: &str) {
        *self.fail_put.lock().unwrap() = Some(name.to_string());
    }
}

impl KeyCache for FlakyCache {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), SecretsError> {
        let mut armed = self.fail_put.lock().unwrap();
        if armed.as_deref() == Some(name) {
            *armed = None;
            return Err(SecretsError::KeyCache("transient".into()));
        }
        drop(armed);
        self.inner.put(name, bytes)
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SecretsError> {
        self.inner.get(name)
    }

    fn revoke(&self, name: &str) -> Result<(), SecretsError> {
        self.inner.revoke(name)
    }
}

#[tokio::test]
async fn failed_password_change_keeps_the_old_password() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    let cache = FlakyCache::default();
    let store = SecretsStore::with_kdf_iterations(Arc::new(cache.clone()), MIN_ITERATIONS);
    store.setup(&path, false).await.unwrap();
    store.set_credentials("old-password").await.unwrap();
    store.save().await.unwrap();

    cache.fail_next_put("secrets:mac");
    assert!(matches!(
        store.change_password("new-password").await,
        Err(SecretsError::KeyCache(_))
    ));

    // A later, unrelated save must not re-key the file.
    store.create_collection("work").await.unwrap();
    store.save().await.unwrap();
    store.close().await.unwrap();

    let new = store_for(&path, true).await;
    assert!(matches!(
        new.set_credentials("new-password").await,
        Err(SecretsError::IntegrityCheckFailed)
    ));
    let old = read_only(&path, "old-password").await;
    assert_eq!(old.dir_collections().await.unwrap(), vec!["work"]);
}

#[tokio::test]
async fn closing_a_reader_keeps_the_writers_keys() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("s.store");
    let cache = MemoryKeyCache::new();
    let shared = || SecretsStore::with_kdf_iterations(Arc::new(cache.clone()), MIN_ITERATIONS);

    let writer = shared();
    writer.setup(&path, false).await.unwrap();
    writer.set_credentials("pw").await.unwrap();
    writer.save().await.unwrap();

    let reader = shared();
    reader.setup(&path, true).await.unwrap();
    reader.set_credentials("pw").await.unwrap();
    assert!(reader.dir_collections().await.unwrap().is_empty());
    assert_eq!(cache.len(), 4);
    reader.close().await.unwrap();
    assert_eq!(cache.len(), 2);

    writer.create_collection("work").await.unwrap();
    writer.save().await.unwrap();
    writer.close().await.unwrap();
    assert!(cache.is_empty());

    let check = read_only(&path, "pw").await;
    assert_eq!(check.dir_collections().await.unwrap(), vec!["work"]);
}
