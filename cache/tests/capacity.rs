use lru_weak_cache::CacheBuilder;
use std::sync::Arc;

fn keys(cache: &lru_weak_cache::Cache<i32, String>) -> Vec<i32> {
  cache.keys().collect()
}

#[test]
fn test_capacity_evicts_least_recently_accessed() {
  let cache = CacheBuilder::<i32, String>::new().capacity(3).build().unwrap();

  cache.set(1, "one".to_string());
  cache.set(2, "two".to_string());
  cache.set(3, "three".to_string());

  // Reading 1 makes 2 the least recently accessed key.
  assert_eq!(cache.get(&1).as_deref().map(String::as_str), Some("one"));
  cache.set(4, "four".to_string());

  assert_eq!(cache.len(), 3);
  assert!(cache.peek(&2).is_none(), "2 should have been evicted");
  assert_eq!(keys(&cache), vec![3, 1, 4]);
  assert_eq!(cache.metrics().evicted_by_capacity, 1);
}

#[test]
fn test_size_never_exceeds_capacity() {
  let cache = CacheBuilder::<i32, String>::new().capacity(5).build().unwrap();

  for i in 0..100 {
    cache.set(i, i.to_string());
    if i % 3 == 0 {
      cache.get(&(i / 2));
    }
    assert!(cache.len() <= 5);
  }
  assert_eq!(cache.len(), 5);
  assert_eq!(cache.metrics().evicted_by_capacity, 95);
}

#[test]
fn test_batch_insert_trims_once_for_the_whole_batch() {
  let cache = CacheBuilder::<i32, String>::new().capacity(3).build().unwrap();
  cache.set_multi(vec![(1, "one".to_string()), (2, "two".to_string()), (3, "three".to_string())]);

  cache.set_multi(vec![(4, "four".to_string()), (5, "five".to_string())]);
  assert_eq!(keys(&cache), vec![3, 4, 5]);
  assert_eq!(cache.metrics().evicted_by_capacity, 2);
}

#[test]
fn test_batch_larger_than_capacity_keeps_its_tail() {
  let cache = CacheBuilder::<i32, String>::new().capacity(2).build().unwrap();
  cache.set_multi((1..=4).map(|i| (i, i.to_string())));

  assert_eq!(keys(&cache), vec![3, 4]);
}

#[test]
fn test_overwrite_moves_key_to_most_recent() {
  let cache = CacheBuilder::<i32, String>::new().capacity(3).build().unwrap();
  cache.set(1, "one".to_string());
  cache.set(2, "two".to_string());
  cache.set(3, "three".to_string());

  cache.set(1, "uno".to_string());
  cache.set(4, "four".to_string());

  assert!(cache.peek(&2).is_none());
  assert_eq!(cache.peek(&1).as_deref().map(String::as_str), Some("uno"));
  assert_eq!(cache.len(), 3);
}

#[test]
fn test_setting_the_same_allocation_is_a_noop() {
  let cache = CacheBuilder::<i32, String>::new().capacity(2).build().unwrap();
  let value = Arc::new("one".to_string());

  cache.set(1, value.clone());
  cache.set(2, "two".to_string());
  // Same allocation: neither a write nor an access.
  cache.set(1, value.clone());
  cache.set(3, "three".to_string());

  assert!(cache.peek(&1).is_none(), "1 kept its old position and was evicted");
  assert_eq!(cache.metrics().inserts, 3);
}

#[test]
fn test_peek_does_not_refresh_position() {
  let cache = CacheBuilder::<i32, String>::new().capacity(2).build().unwrap();
  cache.set(1, "one".to_string());
  cache.set(2, "two".to_string());

  assert!(cache.peek(&1).is_some());
  assert!(cache.contains_key(&1));
  cache.set(3, "three".to_string());

  assert!(!cache.contains_key(&1));
  assert_eq!(keys(&cache), vec![2, 3]);
}

#[test]
fn test_trim_delete_and_clear() {
  let cache = CacheBuilder::<i32, String>::new().build().unwrap();
  for i in 0..10 {
    cache.set(i, i.to_string());
  }

  assert_eq!(cache.trim(3), 3);
  assert_eq!(keys(&cache), (3..10).collect::<Vec<_>>());

  assert!(cache.delete(&5));
  assert!(!cache.delete(&5));
  assert_eq!(cache.metrics().invalidations, 1);
  assert_eq!(cache.len(), 6);

  assert_eq!(cache.trim(100), 6);
  assert!(cache.is_empty());

  cache.set(1, "one".to_string());
  cache.clear();
  assert!(cache.is_empty());
  assert!(cache.get(&1).is_none());
}

#[test]
fn test_unbounded_cache_keeps_everything() {
  let cache = CacheBuilder::<i32, i32>::new().unbounded().build().unwrap();
  for i in 0..1_000 {
    cache.set(i, i);
  }
  assert_eq!(cache.len(), 1_000);
  assert_eq!(cache.metrics().evicted_by_capacity, 0);
}

#[test]
fn test_iter_yields_live_entries_in_access_order() {
  let cache = CacheBuilder::<&'static str, i32>::new().build().unwrap();
  cache.set("a", 1);
  cache.set("b", 2);
  cache.set("c", 3);
  cache.get("a");

  let items: Vec<_> = cache.iter().map(|(key, value)| (key, *value)).collect();
  assert_eq!(items, vec![("b", 2), ("c", 3), ("a", 1)]);
}
