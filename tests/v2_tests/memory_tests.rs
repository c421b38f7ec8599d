//! Tests for MemoryKeysApi
//!
//! These tests verify:
//! - Action names and index bookkeeping
//! - Compare-and-swap and compare-and-delete
//! - Directory listings (recursive, sorted, hidden keys)
//! - TTL refresh and expiry

use std::sync::Arc;
use std::time::Duration;

use etcd_bridge::v2::{normalize_key, DeleteOptions, GetOptions, KeysApi, MemoryKeysApi, PrevExist, SetOptions};
use etcd_bridge::{ApiError, BridgeError, ManualClock};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store() -> (ManualClock, MemoryKeysApi) {
    let clock = ManualClock::default();
    let store = MemoryKeysApi::with_clock(Arc::new(clock.clone()));
    (clock, store)
}

fn expect_api(err: BridgeError) -> ApiError {
    match err {
        BridgeError::Api(api) => api,
        other => panic!("expected an API error, got {:?}", other),
    }
}

fn ttl(secs: u64) -> SetOptions {
    SetOptions {
        ttl: Duration::from_secs(secs),
        ..SetOptions::default()
    }
}

// =============================================================================
// Actions and Indices
// =============================================================================

#[test]
fn test_actions() {
    let (_, store) = setup_store();

    assert_eq!(store.create("/k", "1").unwrap().action, "create");
    assert_eq!(store.set("/k", "2", &SetOptions::default()).unwrap().action, "set");
    assert_eq!(store.update("/k", "3").unwrap().action, "update");
    assert_eq!(store.get("/k", &GetOptions::default()).unwrap().action, "get");
    assert_eq!(store.delete("/k", &DeleteOptions::default()).unwrap().action, "delete");
}

#[test]
fn test_every_mutation_bumps_index() {
    let (_, store) = setup_store();
    assert_eq!(store.index(), 0);

    store.create("/a", "1").unwrap();
    store.set("/b", "2", &SetOptions::default()).unwrap();
    store.get("/a", &GetOptions::default()).unwrap();
    assert_eq!(store.index(), 2);

    let resp = store.delete("/a", &DeleteOptions::default()).unwrap();
    assert_eq!(resp.index, 3);
    assert_eq!(store.index(), 3);
}

#[test]
fn test_failed_mutation_leaves_index() {
    let (_, store) = setup_store();

    store.create("/a", "1").unwrap();
    let err = expect_api(store.create("/a", "2").unwrap_err());

    assert_eq!(err.code, ApiError::NODE_EXIST);
    assert_eq!(err.index, 1);
    assert_eq!(store.index(), 1);
}

#[test]
fn test_set_returns_prev_node() {
    let (_, store) = setup_store();

    store.create("/k", "old").unwrap();
    let resp = store.set("/k", "new", &SetOptions::default()).unwrap();

    assert_eq!(resp.node.unwrap().value, "new");
    assert_eq!(resp.prev_node.unwrap().value, "old");
}

#[test]
fn test_delete_returns_prev_node() {
    let (_, store) = setup_store();

    store.create("/k", "v").unwrap();
    let resp = store.delete("/k", &DeleteOptions::default()).unwrap();

    let node = resp.node.unwrap();
    assert_eq!(node.key, "/k");
    assert!(node.value.is_empty());
    assert_eq!(node.modified_index, 2);
    assert_eq!(resp.prev_node.unwrap().value, "v");
}

#[test]
fn test_no_value_on_success() {
    let (_, store) = setup_store();

    let opts = SetOptions {
        no_value_on_success: true,
        ..SetOptions::default()
    };
    let resp = store.set("/quiet", "v", &opts).unwrap();

    assert!(resp.node.is_none());
    assert_eq!(resp.action, "set");
    assert_eq!(store.get("/quiet", &GetOptions::default()).unwrap().node.unwrap().value, "v");
}

#[test]
fn test_keys_are_normalized() {
    let (_, store) = setup_store();

    store.create("plain", "v").unwrap();

    let node = store.get("/plain/", &GetOptions::default()).unwrap().node.unwrap();
    assert_eq!(node.key, "/plain");
}

// =============================================================================
// Compare And Swap / Delete
// =============================================================================

#[test]
fn test_compare_and_swap_on_value() {
    let (_, store) = setup_store();
    store.create("/k", "a").unwrap();

    let opts = SetOptions {
        prev_value: Some("a".to_string()),
        ..SetOptions::default()
    };
    let resp = store.set("/k", "b", &opts).unwrap();
    assert_eq!(resp.action, "compareAndSwap");

    let err = expect_api(store.set("/k", "c", &opts).unwrap_err());
    assert_eq!(err.code, ApiError::TEST_FAILED);
    assert_eq!(err.cause, "[a != b]");
}

#[test]
fn test_compare_and_swap_on_index() {
    let (_, store) = setup_store();
    store.create("/k", "a").unwrap();

    let stale = SetOptions {
        prev_index: Some(99),
        ..SetOptions::default()
    };
    let err = expect_api(store.set("/k", "b", &stale).unwrap_err());
    assert_eq!(err.code, ApiError::TEST_FAILED);
    assert_eq!(err.cause, "[99 != 1]");

    let current = SetOptions {
        prev_index: Some(1),
        ..SetOptions::default()
    };
    store.set("/k", "b", &current).unwrap();
    let node = store.get("/k", &GetOptions::default()).unwrap().node.unwrap();
    assert_eq!(node.value, "b");
    assert_eq!(node.created_index, 1);
}

#[test]
fn test_compare_and_swap_missing_key() {
    let (_, store) = setup_store();

    let opts = SetOptions {
        prev_value: Some("a".to_string()),
        ..SetOptions::default()
    };
    let err = expect_api(store.set("/none", "b", &opts).unwrap_err());

    assert_eq!(err.code, ApiError::KEY_NOT_FOUND);
}

#[test]
fn test_compare_and_delete() {
    let (_, store) = setup_store();
    store.create("/k", "a").unwrap();

    let wrong = DeleteOptions {
        prev_value: Some("x".to_string()),
        ..DeleteOptions::default()
    };
    assert_eq!(expect_api(store.delete("/k", &wrong).unwrap_err()).code, ApiError::TEST_FAILED);

    let right = DeleteOptions {
        prev_value: Some("a".to_string()),
        ..DeleteOptions::default()
    };
    assert_eq!(store.delete("/k", &right).unwrap().action, "compareAndDelete");
    assert!(store.is_empty());
}

#[test]
fn test_prev_exist_flags() {
    let (_, store) = setup_store();

    let must_exist = SetOptions {
        prev_exist: PrevExist::Exist,
        ..SetOptions::default()
    };
    assert_eq!(
        expect_api(store.set("/k", "v", &must_exist).unwrap_err()).code,
        ApiError::KEY_NOT_FOUND
    );

    let must_not_exist = SetOptions {
        prev_exist: PrevExist::NoExist,
        ..SetOptions::default()
    };
    store.set("/k", "v", &must_not_exist).unwrap();
    assert_eq!(
        expect_api(store.set("/k", "v", &must_not_exist).unwrap_err()).code,
        ApiError::NODE_EXIST
    );
}

// =============================================================================
// Directory Listings
// =============================================================================

#[test]
fn test_get_directory_lists_children() {
    let (_, store) = setup_store();
    store.create("/dir/b", "2").unwrap();
    store.create("/dir/a", "1").unwrap();
    store.create("/dir/sub/c", "3").unwrap();

    let node = store.get("/dir", &GetOptions::default()).unwrap().node.unwrap();

    assert!(node.dir);
    let mut keys: Vec<_> = node.nodes.iter().map(|n| n.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["/dir/a", "/dir/b", "/dir/sub"]);

    let sub = node.nodes.iter().find(|n| n.key == "/dir/sub").unwrap();
    assert!(sub.dir);
    assert!(sub.nodes.is_empty());
}

#[test]
fn test_get_recursive_and_sorted() {
    let (_, store) = setup_store();
    store.create("/dir/b", "2").unwrap();
    store.create("/dir/a", "1").unwrap();
    store.create("/dir/sub/c", "3").unwrap();

    let opts = GetOptions {
        recursive: true,
        sorted: true,
        quorum: false,
    };
    let node = store.get("/dir", &opts).unwrap().node.unwrap();

    let keys: Vec<_> = node.nodes.iter().map(|n| n.key.as_str()).collect();
    assert_eq!(keys, vec!["/dir/a", "/dir/b", "/dir/sub"]);
    assert_eq!(node.nodes[2].nodes[0].key, "/dir/sub/c");
    assert_eq!(node.nodes[2].nodes[0].value, "3");
}

#[test]
fn test_hidden_keys_are_not_listed() {
    let (_, store) = setup_store();
    store.create("/dir/_hidden", "h").unwrap();
    store.create("/dir/shown", "s").unwrap();

    let node = store.get("/dir", &GetOptions::default()).unwrap().node.unwrap();
    assert_eq!(node.nodes.len(), 1);
    assert_eq!(node.nodes[0].key, "/dir/shown");

    let hidden = store.get("/dir/_hidden", &GetOptions::default()).unwrap().node.unwrap();
    assert_eq!(hidden.value, "h");
}

#[test]
fn test_get_root() {
    let (_, store) = setup_store();
    store.create("/one", "1").unwrap();

    let node = store.get("/", &GetOptions::default()).unwrap().node.unwrap();

    assert!(node.dir);
    assert_eq!(node.key, "/");
    assert_eq!(node.nodes.len(), 1);
}

#[test]
fn test_sibling_prefix_is_not_a_child() {
    let (_, store) = setup_store();
    store.set("/app", "", &SetOptions { dir: true, ..SetOptions::default() }).unwrap();
    store.create("/apple", "fruit").unwrap();

    let node = store.get("/app", &GetOptions::default()).unwrap().node.unwrap();
    assert!(node.nodes.is_empty());

    let opts = DeleteOptions {
        dir: true,
        ..DeleteOptions::default()
    };
    store.delete("/app", &opts).unwrap();
    assert_eq!(store.get("/apple", &GetOptions::default()).unwrap().node.unwrap().value, "fruit");
}

#[test]
fn test_doubled_slashes_are_collapsed() {
    let (_, store) = setup_store();
    store.set("/a//b", "v", &SetOptions::default()).unwrap();

    let dir = store.get("/a", &GetOptions::default()).unwrap().node.unwrap();
    let children: Vec<_> = dir.nodes.iter().map(|n| (n.key.as_str(), n.dir)).collect();
    assert_eq!(children, vec![("/a/b", false)]);

    assert_eq!(store.get("/a/b", &GetOptions::default()).unwrap().node.unwrap().value, "v");
    assert_eq!(store.len(), 2);
}

#[test]
fn test_dot_segments_are_resolved() {
    let (_, store) = setup_store();
    store.set("/a/./b", "1", &SetOptions::default()).unwrap();
    store.set("/a/c/../b", "2", &SetOptions::default()).unwrap();
    store.set("/../../top", "3", &SetOptions::default()).unwrap();

    assert_eq!(store.get("a/b/", &GetOptions::default()).unwrap().node.unwrap().value, "2");
    assert_eq!(store.get("/top", &GetOptions::default()).unwrap().node.unwrap().value, "3");
    assert!(store.get("/a/c", &GetOptions::default()).is_err());
    assert_eq!(store.len(), 3);
}

#[test]
fn test_normalize_key() {
    assert_eq!(normalize_key(""), "/");
    assert_eq!(normalize_key("/"), "/");
    assert_eq!(normalize_key("//"), "/");
    assert_eq!(normalize_key("foo"), "/foo");
    assert_eq!(normalize_key("/foo/"), "/foo");
    assert_eq!(normalize_key("/a//b"), "/a/b");
    assert_eq!(normalize_key("/a/./b/."), "/a/b");
    assert_eq!(normalize_key("/a/b/../c"), "/a/c");
    assert_eq!(normalize_key("/.."), "/");
}

// =============================================================================
// TTL
// =============================================================================

#[test]
fn test_ttl_rounds_up() {
    let (clock, store) = setup_store();
    store.set("/k", "v", &ttl(10)).unwrap();

    clock.advance(Duration::from_millis(2500));

    let node = store.get("/k", &GetOptions::default()).unwrap().node.unwrap();
    assert_eq!(node.ttl, 8);
}

#[test]
fn test_expiry_bumps_index() {
    let (clock, store) = setup_store();
    store.set("/k", "v", &ttl(1)).unwrap();
    assert_eq!(store.index(), 1);

    clock.advance(Duration::from_secs(2));

    assert_eq!(store.len(), 0);
    assert_eq!(store.index(), 2);
}

#[test]
fn test_refresh_extends_ttl_and_keeps_value() {
    let (clock, store) = setup_store();
    store.set("/k", "v", &ttl(5)).unwrap();
    clock.advance(Duration::from_secs(4));

    let refresh = SetOptions {
        ttl: Duration::from_secs(5),
        refresh: true,
        prev_exist: PrevExist::Exist,
        ..SetOptions::default()
    };
    let resp = store.set("/k", "", &refresh).unwrap();
    assert_eq!(resp.action, "update");

    clock.advance(Duration::from_secs(4));
    let node = store.get("/k", &GetOptions::default()).unwrap().node.unwrap();
    assert_eq!(node.value, "v");
    assert_eq!(node.ttl, 1);
}

#[test]
fn test_refresh_rejects_value_and_missing_ttl() {
    let (_, store) = setup_store();
    store.create("/k", "v").unwrap();

    let with_value = SetOptions {
        ttl: Duration::from_secs(5),
        refresh: true,
        ..SetOptions::default()
    };
    assert_eq!(
        expect_api(store.set("/k", "x", &with_value).unwrap_err()).code,
        ApiError::REFRESH_VALUE
    );

    let without_ttl = SetOptions {
        refresh: true,
        ..SetOptions::default()
    };
    assert_eq!(
        expect_api(store.set("/k", "", &without_ttl).unwrap_err()).code,
        ApiError::REFRESH_TTL_REQUIRED
    );
}

#[test]
fn test_update_on_directory_keeps_children() {
    let (_, store) = setup_store();
    store.set("/d", "", &SetOptions { dir: true, ..ttl(5) }).unwrap();
    store.create("/d/x", "v").unwrap();

    // Clearing a directory's TTL goes through update with an empty value
    let opts = SetOptions {
        prev_exist: PrevExist::Exist,
        dir: true,
        ..SetOptions::default()
    };
    store.set("/d", "", &opts).unwrap();

    let node = store.get("/d", &GetOptions::default()).unwrap().node.unwrap();
    assert_eq!(node.ttl, 0);
    assert_eq!(node.nodes.len(), 1);
}

#[test]
fn test_update_directory_with_value_fails() {
    let (_, store) = setup_store();
    store.set("/d", "", &SetOptions { dir: true, ..SetOptions::default() }).unwrap();

    let err = expect_api(store.update("/d", "v").unwrap_err());

    assert_eq!(err.code, ApiError::NOT_FILE);
}
