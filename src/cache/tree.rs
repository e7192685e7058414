//! Arena-backed fork tree
//!
//! Nodes are owned by the arena and linked by integer ids: a parent owns the
//! list of its children, a child keeps a non-owning parent id for upward
//! walks. Pruning is a subtree sweep by id.

use crate::block::Block;
use crate::state::StatePool;
use crate::types::Hash;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub(crate) type NodeId = u64;

#[derive(Debug)]
pub(crate) struct CacheNode {
    pub block: Arc<Block>,
    pub hash: Hash,
    pub state: StatePool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug)]
pub(crate) struct ForkTree {
    nodes: HashMap<NodeId, CacheNode>,
    by_hash: HashMap<Hash, NodeId>,
    root: NodeId,
    next_id: NodeId,
}

impl ForkTree {
    pub fn new(root_block: Arc<Block>, root_state: StatePool) -> Self {
        let hash = root_block.hash();
        let mut nodes = HashMap::new();
        nodes.insert(
            0,
            CacheNode {
                block: root_block,
                hash,
                state: root_state,
                parent: None,
                children: Vec::new(),
            },
        );
        let mut by_hash = HashMap::new();
        by_hash.insert(hash, 0);
        Self {
            nodes,
            by_hash,
            root: 0,
            next_id: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &CacheNode {
        &self.nodes[&id]
    }

    pub fn root_node(&self) -> &CacheNode {
        self.node(self.root)
    }

    pub fn find(&self, hash: &Hash) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn insert(&mut self, parent: NodeId, block: Arc<Block>, state: StatePool) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        let hash = block.hash();
        self.nodes.insert(
            id,
            CacheNode {
                block,
                hash,
                state,
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        self.by_hash.insert(hash, id);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        id
    }

    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.children.is_empty())
            .map(|(id, _)| *id)
            .collect();
        out.sort_unstable();
        out
    }

    /// Deepest leaf; among equal heights the smallest block hash wins, so the
    /// choice depends only on the set of blocks, not their arrival order.
    pub fn longest_leaf(&self) -> NodeId {
        let mut best = self.root;
        for id in self.leaves() {
            if self.outranks(id, best) {
                best = id;
            }
        }
        best
    }

    fn outranks(&self, a: NodeId, b: NodeId) -> bool {
        let (na, nb) = (self.node(a), self.node(b));
        match na.block.number().cmp(&nb.block.number()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => na.hash < nb.hash,
        }
    }

    /// Node ids from the root down to `id`, inclusive.
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut cur = id;
        while let Some(parent) = self.node(cur).parent {
            path.push(parent);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// Remove `id` and every descendant. Returns the number of nodes removed.
    pub fn remove_subtree(&mut self, id: NodeId) -> usize {
        if let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != id);
            }
        }
        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.remove(&cur) {
                self.by_hash.remove(&node.hash);
                stack.extend(node.children);
                removed += 1;
            }
        }
        removed
    }

    /// Make `child` (a child of the root) the new root. The old root and every
    /// sibling subtree are dropped. Returns the number of sibling nodes pruned.
    pub fn promote(&mut self, child: NodeId) -> usize {
        let old_root = self.root;
        let siblings: Vec<NodeId> = self
            .node(old_root)
            .children
            .iter()
            .copied()
            .filter(|c| *c != child)
            .collect();
        let pruned: usize = siblings.into_iter().map(|s| self.remove_subtree(s)).sum();

        if let Some(node) = self.nodes.remove(&old_root) {
            self.by_hash.remove(&node.hash);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
        self.root = child;
        pruned
    }

    /// Drop side branches whose tip is more than `depth` blocks behind
    /// `tip_height`. Nodes in `keep` (the longest chain) are never removed.
    pub fn prune_stale(&mut self, keep: &HashSet<NodeId>, tip_height: u64, depth: u64) -> usize {
        let mut removed = 0;
        for leaf in self.leaves() {
            if keep.contains(&leaf) {
                continue;
            }
            let height = self.node(leaf).block.number();
            if height.saturating_add(depth) >= tip_height {
                continue;
            }
            // climb to the highest ancestor that only carries this dead branch
            let mut top = leaf;
            while let Some(parent) = self.node(top).parent {
                if keep.contains(&parent) || self.node(parent).children.len() > 1 {
                    break;
                }
                top = parent;
            }
            removed += self.remove_subtree(top);
        }
        removed
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::genesis_block;

    fn child(parent: &Block, tag: u8) -> Arc<Block> {
        let mut b = parent.clone();
        b.header.number = parent.number() + 1;
        b.header.parent_hash = parent.hash();
        b.header.info = vec![tag];
        Arc::new(b)
    }

    #[test]
    fn longest_leaf_is_deepest_then_smallest_hash() {
        let g = Arc::new(genesis_block());
        let mut tree = ForkTree::new(g.clone(), StatePool::new());
        let a = child(&g, 1);
        let b = child(&g, 2);
        let ia = tree.insert(0, a.clone(), StatePool::new());
        let ib = tree.insert(0, b.clone(), StatePool::new());

        let expected = if a.hash() < b.hash() { ia } else { ib };
        assert_eq!(tree.longest_leaf(), expected);

        let a2 = child(&a, 3);
        let ia2 = tree.insert(ia, a2, StatePool::new());
        assert_eq!(tree.longest_leaf(), ia2);
        assert_eq!(tree.path_to(ia2), vec![0, ia, ia2]);
    }

    #[test]
    fn promote_prunes_siblings_and_old_root() {
        let g = Arc::new(genesis_block());
        let mut tree = ForkTree::new(g.clone(), StatePool::new());
        let a = child(&g, 1);
        let b = child(&g, 2);
        let ia = tree.insert(0, a.clone(), StatePool::new());
        let ib = tree.insert(0, b.clone(), StatePool::new());
        tree.insert(ib, child(&b, 3), StatePool::new());

        assert_eq!(tree.promote(ia), 2);
        assert_eq!(tree.root(), ia);
        assert_eq!(tree.len(), 1);
        assert!(!tree.contains(&g.hash()));
        assert!(!tree.contains(&b.hash()));
        assert!(tree.root_node().parent.is_none());
    }

    #[test]
    fn stale_branch_is_collected() {
        let g = Arc::new(genesis_block());
        let mut tree = ForkTree::new(g.clone(), StatePool::new());
        let side = child(&g, 9);
        tree.insert(0, side.clone(), StatePool::new());

        let mut parent = 0;
        let mut blk = g.clone();
        for i in 0..5 {
            let next = child(&blk, i);
            parent = tree.insert(parent, next.clone(), StatePool::new());
            blk = next;
        }
        let keep: HashSet<NodeId> = tree.path_to(parent).into_iter().collect();

        assert_eq!(tree.prune_stale(&keep, 5, 10), 0);
        assert_eq!(tree.prune_stale(&keep, 5, 2), 1);
        assert!(!tree.contains(&side.hash()));
        assert_eq!(tree.leaves(), vec![parent]);
    }
}
