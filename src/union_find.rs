//! Disjoint-set forest over feature indices.
//!
//! Path halving on `find` and union by size keep every operation near O(1),
//! which matters when the threshold search cuts the same spanning tree
//! hundreds of times.

#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    /// `n` singleton sets `0..n`.
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of the set containing `i`.
    pub fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Merge the sets containing `a` and `b`. Returns `false` if they were
    /// already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let mut ra = self.find(a);
        let mut rb = self.find(b);
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Dense 1-based labels in order of first appearance: element 0 always
    /// gets label 1, the next element outside its set gets 2, and so on.
    pub fn labels(&mut self) -> Vec<u32> {
        let n = self.len();
        let mut root_label = vec![0u32; n];
        let mut next = 0u32;
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let root = self.find(i);
            if root_label[root] == 0 {
                next += 1;
                root_label[root] = next;
            }
            labels.push(root_label[root]);
        }
        labels
    }

    /// Number of disjoint sets.
    pub fn count(&mut self) -> usize {
        (0..self.len()).filter(|&i| self.find(i) == i).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut uf = UnionFind::new(3);
        assert!(!uf.connected(0, 1));

        assert!(uf.union(0, 1));
        assert!(uf.connected(0, 1));
        assert!(!uf.connected(0, 2));
        assert!(!uf.union(1, 0));
    }

    #[test]
    fn test_chain_collapses_to_one_root() {
        let mut uf = UnionFind::new(4);
        uf.union(0, 1);
        uf.union(1, 2);
        uf.union(2, 3);

        let root = uf.find(0);
        assert_eq!(uf.find(3), root);
        assert_eq!(uf.count(), 1);
    }

    #[test]
    fn test_labels_first_appearance() {
        let mut uf = UnionFind::new(5);
        uf.union(1, 3);
        uf.union(4, 0);
        assert_eq!(uf.labels(), vec![1, 2, 3, 2, 1]);
        assert_eq!(uf.count(), 3);
    }

    #[test]
    fn test_empty() {
        let mut uf = UnionFind::new(0);
        assert!(uf.is_empty());
        assert!(uf.labels().is_empty());
    }
}
