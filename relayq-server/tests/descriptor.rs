mod common;

use std::fs;

use common::folder_to_use;
use relayq::{DescriptorError, DescriptorStore};
use relayq_protocol::BrokerDescriptor;

#[test]
fn published_descriptor_reads_back_equal() {
    let dir = folder_to_use();
    let store = DescriptorStore::new(&dir);
    let descriptor = BrokerDescriptor::new("broker1", 5555);

    let path = store.publish(&descriptor).expect("publish");
    assert_eq!(path, dir.join("broker1.json"));

    let loaded = store.read("broker1").unwrap().expect("descriptor on disk");
    assert_eq!(loaded, descriptor);
    assert_eq!(BrokerDescriptor::load(&path).unwrap(), Some(descriptor));
}

#[test]
fn descriptor_file_uses_the_documented_keys() {
    let dir = folder_to_use();
    let store = DescriptorStore::new(&dir);
    let path = store.publish(&BrokerDescriptor::new("broker1", 5555)).unwrap();

    let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw["name"], "broker1");
    // port is written as a string
    assert_eq!(raw["port"], "5555");
    assert_eq!(raw["pid"], std::process::id());
    assert!(raw["time"].is_string());
    assert!(!dir.join("broker1.json.tmp").exists(), "temp file left behind");
}

#[test]
fn withdraw_then_publish_again() {
    let dir = folder_to_use();
    let store = DescriptorStore::new(&dir);

    let path = store.publish(&BrokerDescriptor::new("broker1", 5555)).unwrap();
    assert!(path.exists());

    store.withdraw(&path).expect("withdraw");
    assert!(!path.exists());
    assert!(store.read("broker1").unwrap().is_none());

    store
        .publish(&BrokerDescriptor::new("broker1", 5555))
        .expect("name is free again after withdraw");
    assert!(path.exists());
}

#[test]
fn withdrawing_a_missing_descriptor_is_not_an_error() {
    let dir = folder_to_use();
    let store = DescriptorStore::new(&dir);

    let path = store.publish(&BrokerDescriptor::new("broker1", 5555)).unwrap();
    fs::remove_file(&path).unwrap();

    store.withdraw(&path).expect("absent file is only logged");
    store.withdraw(&store.path_for("never-published")).unwrap();
}

#[test]
fn live_name_cannot_be_published_twice() {
    let dir = folder_to_use();
    let store = DescriptorStore::new(&dir);
    store.publish(&BrokerDescriptor::new("broker1", 5555)).unwrap();

    let err = store
        .publish(&BrokerDescriptor::new("broker1", 5556))
        .unwrap_err();
    assert!(matches!(err, DescriptorError::AlreadyPublished(ref n) if n == "broker1"));

    // a second store stands in for a second process
    let other = DescriptorStore::new(&dir);
    let err = other
        .publish(&BrokerDescriptor::new("broker1", 5557))
        .unwrap_err();
    assert!(matches!(err, DescriptorError::AlreadyPublished(_)));

    // the original file is untouched
    assert_eq!(store.read("broker1").unwrap().unwrap().port, "5555");

    // other names are unaffected
    other.publish(&BrokerDescriptor::new("broker2", 5558)).unwrap();
}

#[test]
fn dropping_the_store_releases_the_name() {
    let dir = folder_to_use();
    {
        let store = DescriptorStore::new(&dir);
        store.publish(&BrokerDescriptor::new("broker1", 5555)).unwrap();
    }
    // stale file is still there, like after a crash, but the lock is gone
    assert!(dir.join("broker1.json").exists());
    DescriptorStore::new(&dir)
        .publish(&BrokerDescriptor::new("broker1", 6000))
        .expect("stale descriptor is overwritten");
}

#[test]
fn list_returns_descriptors_sorted_by_name() {
    let dir = folder_to_use();
    let store = DescriptorStore::new(&dir);
    assert!(store.list().unwrap().is_empty());

    store.publish(&BrokerDescriptor::new("zeta", 7001)).unwrap();
    store.publish(&BrokerDescriptor::new("alpha", 7002)).unwrap();
    fs::write(dir.join("garbage.json"), b"not json").unwrap();

    let names: Vec<String> = store.list().unwrap().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}

#[test]
fn publish_into_an_unusable_directory_fails() {
    let dir = folder_to_use();
    let blocker = dir.join("not-a-dir");
    fs::write(&blocker, b"").unwrap();

    let store = DescriptorStore::new(blocker.join("brokers"));
    let err = store
        .publish(&BrokerDescriptor::new("broker1", 5555))
        .unwrap_err();
    assert!(matches!(err, DescriptorError::Io(_)));
}

#[test]
fn lock_file_is_reused_across_publish_cycles() {
    let dir = folder_to_use();
    let store = DescriptorStore::new(&dir);

    for port in [5555, 5556, 5557] {
        let path = store.publish(&BrokerDescriptor::new("broker1", port)).unwrap();
        store.withdraw(&path).unwrap();
    }

    let mut names: Vec<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["broker1.lock"]);
    assert!(store.list().unwrap().is_empty());
}
