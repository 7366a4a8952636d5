use std::hash::Hash;

use ahash::HashMap;
use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Group<K, V> {
  key: K,
  // LIFO: the most recently pooled value is handed out first.
  values: Vec<V>,
  prev: Option<Index>,
  next: Option<Index>,
}

/// A multimap whose groups are kept in access order.
///
/// Each key maps to a stack of values. Reading a key moves its group to the
/// head; new groups join at the tail, so a bucket that was filled but never
/// asked for is the first to be drained by [`LinkedMultimap::remove_last`].
#[derive(Debug)]
pub(crate) struct LinkedMultimap<K: Eq + Hash + Clone, V> {
  groups: Arena<Group<K, V>>,
  lookup: HashMap<K, Index>,
  head: Option<Index>,
  tail: Option<Index>,
}

impl<K: Eq + Hash + Clone, V> Default for LinkedMultimap<K, V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: Eq + Hash + Clone, V> LinkedMultimap<K, V> {
  pub(crate) fn new() -> Self {
    Self {
      groups: Arena::new(),
      lookup: HashMap::default(),
      head: None,
      tail: None,
    }
  }

  fn unlink(&mut self, index: Index) {
    let (prev, next) = {
      let group = &self.groups[index];
      (group.prev, group.next)
    };
    match prev {
      Some(prev) => self.groups[prev].next = next,
      None => self.head = next,
    }
    match next {
      Some(next) => self.groups[next].prev = prev,
      None => self.tail = prev,
    }
  }

  fn link_head(&mut self, index: Index) {
    let old_head = self.head;
    self.groups[index].prev = None;
    self.groups[index].next = old_head;
    match old_head {
      Some(old_head) => self.groups[old_head].prev = Some(index),
      None => self.tail = Some(index),
    }
    self.head = Some(index);
  }

  fn link_tail(&mut self, index: Index) {
    let old_tail = self.tail;
    self.groups[index].next = None;
    self.groups[index].prev = old_tail;
    match old_tail {
      Some(old_tail) => self.groups[old_tail].next = Some(index),
      None => self.head = Some(index),
    }
    self.tail = Some(index);
  }

  /// Pushes `value` onto the stack for `key`. A brand new group is placed at
  /// the tail; an existing group keeps its position.
  pub(crate) fn put(&mut self, key: K, value: V) {
    if let Some(&index) = self.lookup.get(&key) {
      self.groups[index].values.push(value);
      return;
    }

    let index = self.groups.insert(Group {
      key: key.clone(),
      values: vec![value],
      prev: None,
      next: None,
    });
    self.lookup.insert(key, index);
    self.link_tail(index);
  }

  /// Pops the most recently pushed value for `key` and marks the group as
  /// most recently used.
  pub(crate) fn remove_last_for(&mut self, key: &K) -> Option<V> {
    let index = *self.lookup.get(key)?;
    if self.head != Some(index) {
      self.unlink(index);
      self.link_head(index);
    }
    self.groups[index].values.pop()
  }

  /// Pops a value from the least recently used non-empty group, dropping any
  /// empty groups found along the way.
  pub(crate) fn remove_last(&mut self) -> Option<V> {
    let mut cursor = self.tail;
    while let Some(index) = cursor {
      cursor = self.groups[index].prev;
      if let Some(value) = self.groups[index].values.pop() {
        return Some(value);
      }
      self.unlink(index);
      if let Some(group) = self.groups.remove(index) {
        self.lookup.remove(&group.key);
      }
    }
    None
  }

  #[cfg(test)]
  fn len_for(&self, key: &K) -> usize {
    self
      .lookup
      .get(key)
      .map_or(0, |&index| self.groups[index].values.len())
  }

  pub(crate) fn clear(&mut self) {
    self.groups.clear();
    self.lookup.clear();
    self.head = None;
    self.tail = None;
  }

  #[cfg(test)]
  fn keys_lru_order(&self) -> Vec<K> {
    let mut keys = Vec::new();
    let mut cursor = self.tail;
    while let Some(index) = cursor {
      keys.push(self.groups[index].key.clone());
      cursor = self.groups[index].prev;
    }
    keys
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn values_for_a_key_are_lifo() {
    let mut map = LinkedMultimap::new();
    map.put(1, "a");
    map.put(1, "b");
    map.put(1, "c");

    assert_eq!(map.len_for(&1), 3);
    assert_eq!(map.remove_last_for(&1), Some("c"));
    assert_eq!(map.remove_last_for(&1), Some("b"));
    assert_eq!(map.remove_last_for(&1), Some("a"));
    assert_eq!(map.remove_last_for(&1), None);
    assert_eq!(map.remove_last_for(&2), None);
  }

  #[test]
  fn new_groups_join_the_tail() {
    let mut map = LinkedMultimap::new();
    map.put(1, ());
    map.put(2, ());
    map.put(3, ());
    // Group 3 was never read, so it sits at the least recently used end.
    assert_eq!(map.keys_lru_order(), vec![3, 2, 1]);
  }

  #[test]
  fn reading_a_group_protects_it_from_eviction() {
    let mut map = LinkedMultimap::new();
    map.put("small", 1);
    map.put("large", 2);
    map.put("large", 3);

    map.remove_last_for(&"large");
    assert_eq!(map.remove_last(), Some(1), "small was least recently used");
    assert_eq!(map.remove_last(), Some(2));
    assert_eq!(map.remove_last(), None);
  }

  #[test]
  fn remove_last_drops_empty_groups() {
    let mut map = LinkedMultimap::new();
    map.put(1, "one");
    map.put(2, "two");
    assert_eq!(map.remove_last_for(&2), Some("two"));

    // Group 2 is now empty at the head; group 1 is at the tail.
    assert_eq!(map.remove_last(), Some("one"));
    assert_eq!(map.remove_last(), None);
    assert!(map.keys_lru_order().is_empty());
    assert!(map.lookup.is_empty());
  }

  #[test]
  fn clear_forgets_everything() {
    let mut map = LinkedMultimap::new();
    map.put(1, 1);
    map.put(2, 2);
    map.clear();
    assert_eq!(map.remove_last(), None);
    assert_eq!(map.len_for(&1), 0);
  }
}
