//! Regression tree builder
//!
//! Exact-greedy CART over first/second-order gradient statistics. Every
//! distinct value of a candidate column is tried as a split point; ties keep
//! the earliest (column, threshold) pair so growth is deterministic.

use serde::{Deserialize, Serialize};

/// Tree node; leaves carry `value`, internal nodes route on `feature < threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub feature: usize,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    pub value: Option<f64>,
}

impl Node {
    fn leaf(value: f64) -> Self {
        Self {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: Some(value),
        }
    }
}

/// Flattened tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Raw leaf output for one row. Missing values (NaN) take the left branch.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };
            if let Some(value) = node.value {
                return value;
            }
            let x = row.get(node.feature).copied().unwrap_or(f64::NAN);
            idx = if x.is_nan() || x < node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if node.value.is_none() => {
                    1 + walk(nodes, node.left).max(walk(nodes, node.right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Growth limits for a single tree
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub reg_lambda: f64,
    pub min_child_weight: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Builds one tree from gradients and hessians
pub struct CartBuilder<'a> {
    features: &'a [Vec<f64>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    columns: &'a [usize],
    config: TreeConfig,
}

impl<'a> CartBuilder<'a> {
    /// `columns` restricts which feature indices may be split on
    pub fn new(
        features: &'a [Vec<f64>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        columns: &'a [usize],
        config: TreeConfig,
    ) -> Self {
        debug_assert_eq!(features.len(), gradients.len());
        debug_assert_eq!(features.len(), hessians.len());
        Self {
            features,
            gradients,
            hessians,
            columns,
            config,
        }
    }

    /// Grow a tree over `rows`, adding each split's gain to `gains[feature]`
    pub fn build(&self, rows: &[usize], gains: &mut [f64]) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(rows, 0, &mut nodes, gains);
        Tree { nodes }
    }

    fn build_node(
        &self,
        rows: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        gains: &mut [f64],
    ) -> usize {
        let current = nodes.len();
        let (g, h) = self.sums(rows);
        let leaf_value = -g / (h + self.config.reg_lambda);

        if depth >= self.config.max_depth || rows.len() < 2 {
            nodes.push(Node::leaf(leaf_value));
            return current;
        }

        let Some(split) = self.find_best_split(rows, g, h) else {
            nodes.push(Node::leaf(leaf_value));
            return current;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.iter().partition(|&&r| {
            let x = self.features[r][split.feature];
            x.is_nan() || x < split.threshold
        });

        if let Some(total) = gains.get_mut(split.feature) {
            *total += split.gain;
        }

        nodes.push(Node {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
            value: None,
        });

        let left = self.build_node(&left_rows, depth + 1, nodes, gains);
        let right = self.build_node(&right_rows, depth + 1, nodes, gains);
        nodes[current].left = left;
        nodes[current].right = right;

        current
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.gradients[r], h + self.hessians[r])
        })
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.config.reg_lambda)
    }

    fn find_best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        let parent_score = self.score(g_total, h_total);
        let mut best: Option<SplitCandidate> = None;

        for &feature in self.columns {
            // Missing values always sit on the left
            let mut g_missing = 0.0;
            let mut h_missing = 0.0;
            let mut present: Vec<(f64, f64, f64)> = Vec::with_capacity(rows.len());
            for &r in rows {
                let x = self.features[r][feature];
                if x.is_nan() {
                    g_missing += self.gradients[r];
                    h_missing += self.hessians[r];
                } else {
                    present.push((x, self.gradients[r], self.hessians[r]));
                }
            }
            present.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut g_left = g_missing;
            let mut h_left = h_missing;
            for i in 0..present.len().saturating_sub(1) {
                let (x, g, h) = present[i];
                g_left += g;
                h_left += h;

                let next = present[i + 1].0;
                if next <= x {
                    continue;
                }

                let g_right = g_total - g_left;
                let h_right = h_total - h_left;
                if h_left < self.config.min_child_weight || h_right < self.config.min_child_weight {
                    continue;
                }

                let gain = 0.5
                    * (self.score(g_left, h_left) + self.score(g_right, h_right) - parent_score);
                if gain <= 1e-12 {
                    continue;
                }

                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: x + (next - x) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}
