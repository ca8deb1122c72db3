//! Arena-indexed disjoint-set forest.

use std::collections::HashMap;

/// Disjoint sets over dense indices `0..n`, with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self { parent: (0..n).collect(), rank: vec![0; n] }
    }

    pub fn len(&self) -> usize { self.parent.len() }
    pub fn is_empty(&self) -> bool { self.parent.is_empty() }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root { root = self.parent[root]; }
        // compress
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Returns true when `a` and `b` were in different sets.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb { return false; }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }
}

/// String ids mapped to dense indices in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct IdArena {
    ids: Vec<String>,
    index: HashMap<String, usize>,
}

impl IdArena {
    pub fn intern(&mut self, id: &str) -> usize {
        if let Some(&i) = self.index.get(id) { return i; }
        let i = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), i);
        i
    }

    pub fn get(&self, id: &str) -> Option<usize> { self.index.get(id).copied() }
    pub fn id(&self, i: usize) -> &str { &self.ids[i] }
    pub fn len(&self) -> usize { self.ids.len() }
    pub fn is_empty(&self) -> bool { self.ids.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_reports_merges() {
        let mut uf = UnionFind::new(4);
        assert!(uf.union(0, 1));
        assert!(!uf.union(1, 0));
        assert!(uf.union(2, 3));
        assert!(uf.union(1, 3));
        assert!(!uf.union(0, 2));
        let r = uf.find(0);
        assert!((0..4).all(|i| uf.find(i) == r));
    }

    #[test]
    fn arena_is_stable() {
        let mut a = IdArena::default();
        assert_eq!(a.intern("dc1"), 0);
        assert_eq!(a.intern("dc2"), 1);
        assert_eq!(a.intern("dc1"), 0);
        assert_eq!(a.get("dc2"), Some(1));
        assert_eq!(a.id(1), "dc2");
        assert_eq!(a.len(), 2);
    }
}
