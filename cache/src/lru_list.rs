use std::borrow::Borrow;
use std::hash::Hash;

use ahash::HashMap;
use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Node<K> {
  key: K,
  cost: u64,
  // Towards the head (more recently used).
  prev: Option<Index>,
  // Towards the tail (less recently used).
  next: Option<Index>,
}

/// An access-ordered, cost-tracking list of keys.
///
/// The head is the most recently used key and the tail the least recently
/// used. Nodes live in a generational arena so unlinking and relinking are
/// O(1) without any unsafe pointer juggling.
#[derive(Debug)]
pub(crate) struct LruList<K: Eq + Hash + Clone> {
  nodes: Arena<Node<K>>,
  lookup: HashMap<K, Index>,
  head: Option<Index>,
  tail: Option<Index>,
  current_cost: u64,
}

impl<K: Eq + Hash + Clone> Default for LruList<K> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: Eq + Hash + Clone> LruList<K> {
  pub(crate) fn new() -> Self {
    Self {
      nodes: Arena::new(),
      lookup: HashMap::default(),
      head: None,
      tail: None,
      current_cost: 0,
    }
  }

  fn unlink(&mut self, index: Index) {
    let (prev, next) = {
      let node = &self.nodes[index];
      (node.prev, node.next)
    };

    match prev {
      Some(prev) => self.nodes[prev].next = next,
      None => self.head = next,
    }
    match next {
      Some(next) => self.nodes[next].prev = prev,
      None => self.tail = prev,
    }
  }

  fn link_front(&mut self, index: Index) {
    let old_head = self.head;
    {
      let node = &mut self.nodes[index];
      node.prev = None;
      node.next = old_head;
    }
    if let Some(old_head) = old_head {
      self.nodes[old_head].prev = Some(index);
    }
    self.head = Some(index);
    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.lookup.len()
  }

  #[cfg(test)]
  pub(crate) fn is_empty(&self) -> bool {
    self.lookup.is_empty()
  }

  #[cfg(test)]
  pub(crate) fn contains<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.lookup.contains_key(key)
  }

  pub(crate) fn current_total_cost(&self) -> u64 {
    self.current_cost
  }

  #[cfg(test)]
  pub(crate) fn cost_of<Q>(&self, key: &Q) -> Option<u64>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.lookup.get(key).map(|&index| self.nodes[index].cost)
  }

  /// Inserts `key` as the most recently used entry, or moves an existing
  /// entry to the front and replaces its cost.
  pub(crate) fn push_front(&mut self, key: K, cost: u64) {
    if let Some(&index) = self.lookup.get(&key) {
      self.set_cost(index, cost);
      if self.head != Some(index) {
        self.unlink(index);
        self.link_front(index);
      }
      return;
    }

    let index = self.nodes.insert(Node {
      key: key.clone(),
      cost,
      prev: None,
      next: None,
    });
    self.lookup.insert(key, index);
    self.current_cost += cost;
    self.link_front(index);
  }

  /// Marks `key` as the most recently used entry. Returns `false` if the key
  /// is not tracked.
  pub(crate) fn touch<Q>(&mut self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    match self.lookup.get(key) {
      Some(&index) => {
        if self.head != Some(index) {
          self.unlink(index);
          self.link_front(index);
        }
        true
      }
      None => false,
    }
  }

  /// Replaces the cost of `key` without changing its recency.
  pub(crate) fn update_cost<Q>(&mut self, key: &Q, cost: u64) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    match self.lookup.get(key) {
      Some(&index) => {
        self.set_cost(index, cost);
        true
      }
      None => false,
    }
  }

  fn set_cost(&mut self, index: Index, cost: u64) {
    let node = &mut self.nodes[index];
    self.current_cost = self.current_cost.saturating_sub(node.cost) + cost;
    node.cost = cost;
  }

  /// Removes and returns the least recently used key and its cost.
  pub(crate) fn pop_back(&mut self) -> Option<(K, u64)> {
    let tail = self.tail?;
    let key = self.nodes[tail].key.clone();
    self.remove(&key).map(|cost| (key, cost))
  }

  pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<u64>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let index = self.lookup.remove(key)?;
    self.unlink(index);
    let node = self.nodes.remove(index)?;
    self.current_cost = self.current_cost.saturating_sub(node.cost);
    Some(node.cost)
  }

  pub(crate) fn clear(&mut self) {
    self.nodes.clear();
    self.lookup.clear();
    self.head = None;
    self.tail = None;
    self.current_cost = 0;
  }

  /// Iterates keys from the least recently used to the most recently used.
  pub(crate) fn iter_lru(&self) -> IterLru<'_, K> {
    IterLru {
      list: self,
      cursor: self.tail,
    }
  }
}

pub(crate) struct IterLru<'a, K: Eq + Hash + Clone> {
  list: &'a LruList<K>,
  cursor: Option<Index>,
}

impl<'a, K: Eq + Hash + Clone> Iterator for IterLru<'a, K> {
  type Item = &'a K;

  fn next(&mut self) -> Option<Self::Item> {
    let index = self.cursor?;
    let node = &self.list.nodes[index];
    self.cursor = node.prev;
    Some(&node.key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lru_order(list: &LruList<&'static str>) -> Vec<&'static str> {
    list.iter_lru().copied().collect()
  }

  #[test]
  fn empty_list() {
    let mut list = LruList::<&str>::new();
    assert!(list.is_empty());
    assert_eq!(list.current_total_cost(), 0);
    assert_eq!(list.pop_back(), None);
    assert_eq!(list.iter_lru().count(), 0);
  }

  #[test]
  fn push_front_orders_by_recency() {
    let mut list = LruList::new();
    list.push_front("a", 10);
    list.push_front("b", 20);
    list.push_front("c", 30);

    assert_eq!(lru_order(&list), vec!["a", "b", "c"]);
    assert_eq!(list.current_total_cost(), 60);
    assert_eq!(list.len(), 3);
  }

  #[test]
  fn touch_moves_to_most_recent() {
    let mut list = LruList::new();
    list.push_front("a", 1);
    list.push_front("b", 1);
    list.push_front("c", 1);

    assert!(list.touch(&"a"));
    assert_eq!(lru_order(&list), vec!["b", "c", "a"]);
    assert!(!list.touch(&"missing"));
  }

  #[test]
  fn repush_replaces_cost_and_recency() {
    let mut list = LruList::new();
    list.push_front("a", 100);
    list.push_front("b", 50);

    list.push_front("a", 25);
    assert_eq!(list.current_total_cost(), 75);
    assert_eq!(list.cost_of(&"a"), Some(25));
    assert_eq!(lru_order(&list), vec!["b", "a"]);
  }

  #[test]
  fn update_cost_keeps_recency() {
    let mut list = LruList::new();
    list.push_front("a", 0);
    list.push_front("b", 0);

    assert!(list.update_cost(&"a", 1024));
    assert_eq!(list.current_total_cost(), 1024);
    assert_eq!(lru_order(&list), vec!["a", "b"], "a is still the eldest");
  }

  #[test]
  fn pop_back_evicts_eldest() {
    let mut list = LruList::new();
    list.push_front("a", 3);
    list.push_front("b", 4);
    list.touch(&"a");

    assert_eq!(list.pop_back(), Some(("b", 4)));
    assert_eq!(list.current_total_cost(), 3);
    assert_eq!(list.pop_back(), Some(("a", 3)));
    assert!(list.is_empty());
  }

  #[test]
  fn remove_from_middle_relinks_neighbours() {
    let mut list = LruList::new();
    list.push_front("a", 1);
    list.push_front("b", 2);
    list.push_front("c", 3);

    assert_eq!(list.remove(&"b"), Some(2));
    assert_eq!(list.remove(&"b"), None);
    assert_eq!(lru_order(&list), vec!["a", "c"]);
    assert_eq!(list.current_total_cost(), 4);

    list.push_front("d", 4);
    assert_eq!(lru_order(&list), vec!["a", "c", "d"]);
  }

  #[test]
  fn clear_resets_everything() {
    let mut list = LruList::new();
    list.push_front("a", 1);
    list.push_front("b", 2);
    list.clear();

    assert!(list.is_empty());
    assert_eq!(list.current_total_cost(), 0);
    assert!(!list.contains(&"a"));
    list.push_front("c", 5);
    assert_eq!(lru_order(&list), vec!["c"]);
  }
}
