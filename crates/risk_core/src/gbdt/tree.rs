//! Decision tree structures for ensemble inference
//!
//! Trees are stored as flat node arrays with node 0 as the root. Traversal
//! compares `value <= threshold` and goes left on equality.

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes `feature`, `left` and `right` are set and `leaf` is
/// `None`. For leaf nodes `leaf` holds the output value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Feature index to split on
    #[serde(default)]
    pub feature: Option<usize>,

    /// Split threshold
    #[serde(default)]
    pub threshold: f64,

    /// Left child index
    #[serde(default)]
    pub left: Option<usize>,

    /// Right child index
    #[serde(default)]
    pub right: Option<usize>,

    /// Leaf value (Some for leaf nodes)
    #[serde(default)]
    pub leaf: Option<f64>,

    /// Training sample weight that reached this node
    #[serde(default)]
    pub cover: Option<f64>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(feature: usize, threshold: f64, left: usize, right: usize) -> Self {
        Self {
            feature: Some(feature),
            threshold,
            left: Some(left),
            right: Some(right),
            leaf: None,
            cover: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(value: f64) -> Self {
        Self {
            feature: None,
            threshold: 0.0,
            left: None,
            right: None,
            leaf: Some(value),
            cover: None,
        }
    }

    pub fn with_cover(mut self, cover: f64) -> Self {
        self.cover = Some(cover);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }

    /// Child taken for a feature value; `None` for leaves
    fn next(&self, features: &[f64]) -> Option<usize> {
        let value = *features.get(self.feature?)?;
        if value <= self.threshold {
            self.left
        } else {
            self.right
        }
    }

    /// Sample weight used when averaging over this node, `None` if unknown
    fn weight(&self) -> Option<f64> {
        self.cover.filter(|c| *c > 0.0)
    }
}

/// A single regression tree, optionally assigned to one class of a
/// multiclass ensemble
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    /// Output class this tree contributes to (0 for regression)
    #[serde(default)]
    pub class_index: usize,

    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            class_index: 0,
            nodes,
        }
    }

    pub fn for_class(class_index: usize, nodes: Vec<Node>) -> Self {
        Self { class_index, nodes }
    }

    /// Index of the leaf reached by a feature vector
    ///
    /// Returns `None` if the walk leaves the node array or exceeds the node
    /// count, which cannot happen for a validated tree.
    pub fn leaf_index(&self, features: &[f64]) -> Option<usize> {
        let mut idx = 0usize;
        for _ in 0..=self.nodes.len() {
            let node = self.nodes.get(idx)?;
            if node.is_leaf() {
                return Some(idx);
            }
            idx = node.next(features)?;
        }
        None
    }

    /// Leaf value reached by a feature vector
    pub fn evaluate(&self, features: &[f64]) -> Option<f64> {
        self.leaf_index(features)
            .and_then(|idx| self.nodes[idx].leaf)
    }

    /// Node indices visited from the root to the reached leaf, inclusive
    pub fn decision_path(&self, features: &[f64]) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut idx = 0usize;
        for _ in 0..=self.nodes.len() {
            let node = self.nodes.get(idx)?;
            path.push(idx);
            if node.is_leaf() {
                return Some(path);
            }
            idx = node.next(features)?;
        }
        None
    }

    /// Validate structure against a feature count
    ///
    /// Every internal node needs a feature inside the schema, a finite
    /// threshold and two in-range children; no node may have two parents and
    /// nothing may point back at the root, which rules out cycles.
    pub fn validate(&self, num_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        let mut parents = vec![0usize; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(cover) = node.cover {
                if !cover.is_finite() || cover < 0.0 {
                    return Err(format!("node {i} has invalid cover {cover}"));
                }
            }

            if let Some(value) = node.leaf {
                if !value.is_finite() {
                    return Err(format!("leaf {i} has non-finite value"));
                }
                continue;
            }

            let feature = node
                .feature
                .ok_or_else(|| format!("internal node {i} has no feature index"))?;
            if feature >= num_features {
                return Err(format!(
                    "node {i} splits on feature {feature}, schema has {num_features}"
                ));
            }
            if !node.threshold.is_finite() {
                return Err(format!("node {i} has non-finite threshold"));
            }

            for (side, child) in [("left", node.left), ("right", node.right)] {
                let child = child.ok_or_else(|| format!("node {i} has no {side} child"))?;
                if child == 0 || child >= self.nodes.len() {
                    return Err(format!("node {i} has invalid {side} child: {child}"));
                }
                parents[child] += 1;
                if parents[child] > 1 {
                    return Err(format!("node {child} is reachable from more than one parent"));
                }
            }
        }

        Ok(())
    }

    /// Root-first ordering of the nodes reachable from the root
    fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let Some(node) = self.nodes.get(idx) else {
                continue;
            };
            order.push(idx);
            if !node.is_leaf() {
                stack.extend(node.right);
                stack.extend(node.left);
            }
            if order.len() > self.nodes.len() {
                break;
            }
        }
        order
    }

    /// Expected output of every subtree
    ///
    /// Leaves contribute their value; internal nodes average their children
    /// weighted by cover, or equally when covers are missing or zero.
    /// Unreachable nodes and nodes with a dangling child keep 0.
    pub fn expectations(&self) -> Vec<f64> {
        let mut expected = vec![0.0; self.nodes.len()];
        for &idx in self.preorder().iter().rev() {
            let node = &self.nodes[idx];
            if let Some(value) = node.leaf {
                expected[idx] = value;
                continue;
            }
            let (Some(left), Some(right)) = (node.left, node.right) else {
                continue;
            };
            let (Some(l), Some(r)) = (self.nodes.get(left), self.nodes.get(right)) else {
                continue;
            };
            expected[idx] = match (l.weight(), r.weight()) {
                (Some(wl), Some(wr)) => (wl * expected[left] + wr * expected[right]) / (wl + wr),
                _ => 0.5 * (expected[left] + expected[right]),
            };
        }
        expected
    }

    /// Depth of the deepest reachable leaf (a lone leaf has depth 0)
    pub fn max_depth(&self) -> usize {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut deepest = 0;
        for idx in self.preorder() {
            let node = &self.nodes[idx];
            deepest = deepest.max(depth[idx]);
            let next = depth[idx] + 1;
            for child in [node.left, node.right].into_iter().flatten() {
                if let Some(d) = depth.get_mut(child) {
                    *d = next;
                }
            }
        }
        deepest
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Spread between the largest and smallest reachable leaf values
    pub fn leaf_range(&self) -> f64 {
        let (min, max) = self
            .preorder()
            .into_iter()
            .filter_map(|idx| self.nodes[idx].leaf)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if min.is_finite() && max.is_finite() {
            max - min
        } else {
            0.0
        }
    }
}
