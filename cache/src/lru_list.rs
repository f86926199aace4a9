use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Node<K> {
  key: K,
  next: Option<Index>,
  prev: Option<Index>,
}

/// An intrusive, arena-backed list of keys ordered by last access.
///
/// The head is the most recently accessed key and the tail the least
/// recently accessed one. Callers keep the returned `Index` next to their
/// own record so touching or unlinking a key is O(1) without a lookup map.
/// Keys accessed "at the same time" keep the order in which they were
/// pushed, which gives insertion order as the tie breaker.
#[derive(Debug)]
pub(crate) struct LruList<K> {
  nodes: Arena<Node<K>>,
  head: Option<Index>,
  tail: Option<Index>,
}

impl<K> LruList<K> {
  pub(crate) fn new() -> Self {
    Self {
      nodes: Arena::new(),
      head: None,
      tail: None,
    }
  }

  // Unlinks a node without removing it from the arena.
  fn unlink(&mut self, index: Index) {
    let (prev, next) = {
      let node = &self.nodes[index];
      (node.prev, node.next)
    };

    match prev {
      Some(prev_idx) => self.nodes[prev_idx].next = next,
      None => self.head = next,
    }

    match next {
      Some(next_idx) => self.nodes[next_idx].prev = prev,
      None => self.tail = prev,
    }
  }

  // Links a node that already lives in the arena as the new head.
  fn link_front(&mut self, index: Index) {
    let old_head = self.head;
    self.nodes[index].next = old_head;
    self.nodes[index].prev = None;
    self.head = Some(index);

    if let Some(old_head) = old_head {
      self.nodes[old_head].prev = Some(index);
    }

    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  /// Adds a key as the most recently accessed one.
  pub(crate) fn push_front(&mut self, key: K) -> Index {
    let index = self.nodes.insert(Node {
      key,
      next: None,
      prev: None,
    });
    self.link_front(index);
    index
  }

  /// Marks the key behind `index` as accessed just now.
  pub(crate) fn touch(&mut self, index: Index) {
    if self.head != Some(index) && self.nodes.contains(index) {
      self.unlink(index);
      self.link_front(index);
    }
  }

  pub(crate) fn remove(&mut self, index: Index) -> Option<K> {
    if !self.nodes.contains(index) {
      return None;
    }
    self.unlink(index);
    self.nodes.remove(index).map(|node| node.key)
  }

  /// The least recently accessed key.
  pub(crate) fn back(&self) -> Option<&K> {
    self.tail.map(|index| &self.nodes[index].key)
  }

  /// Iterates keys from least to most recently accessed.
  pub(crate) fn iter_oldest_first(&self) -> OldestFirst<'_, K> {
    OldestFirst {
      list: self,
      current: self.tail,
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.nodes.len()
  }

  pub(crate) fn clear(&mut self) {
    self.nodes.clear();
    self.head = None;
    self.tail = None;
  }
}

pub(crate) struct OldestFirst<'a, K> {
  list: &'a LruList<K>,
  current: Option<Index>,
}

impl<'a, K> Iterator for OldestFirst<'a, K> {
  type Item = &'a K;

  fn next(&mut self) -> Option<Self::Item> {
    let index = self.current?;
    let node = &self.list.nodes[index];
    self.current = node.prev;
    Some(&node.key)
  }
}
