//! Random-forest classifier over the transformed feature space.
//!
//! Trees are stored as flat node arrays. Every node keeps its cover (the
//! weighted number of training samples that reached it) and its per-class
//! probability distribution, which is what TreeSHAP needs to attribute a
//! prediction back to the split features.

use crate::error::TrainingError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Child index marking a leaf node.
pub const LEAF: u32 = u32::MAX;

/// Values closer than this are treated as equal when placing thresholds.
const FEATURE_THRESHOLD: f64 = 1e-7;

/// A single decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    n_outputs: usize,
    feature: Vec<u32>,
    threshold: Vec<f64>,
    left: Vec<u32>,
    right: Vec<u32>,
    cover: Vec<f64>,
    /// Row-major `[n_nodes, n_outputs]`
    value: Vec<f64>,
}

impl Tree {
    /// Create an empty tree whose nodes carry `n_outputs` values.
    pub fn new(n_outputs: usize) -> Self {
        Self {
            n_outputs,
            feature: Vec::new(),
            threshold: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
            cover: Vec::new(),
            value: Vec::new(),
        }
    }

    /// Append a leaf and return its index.
    pub fn push_leaf(&mut self, cover: f64, value: &[f64]) -> u32 {
        self.push_node(0, 0.0, cover, value)
    }

    /// Append a split node; its children are attached with [`Tree::set_children`].
    pub fn push_split(&mut self, feature: u32, threshold: f64, cover: f64, value: &[f64]) -> u32 {
        self.push_node(feature, threshold, cover, value)
    }

    pub fn set_children(&mut self, node: u32, left: u32, right: u32) {
        self.left[node as usize] = left;
        self.right[node as usize] = right;
    }

    fn push_node(&mut self, feature: u32, threshold: f64, cover: f64, value: &[f64]) -> u32 {
        debug_assert_eq!(value.len(), self.n_outputs);
        let id = self.feature.len() as u32;
        self.feature.push(feature);
        self.threshold.push(threshold);
        self.left.push(LEAF);
        self.right.push(LEAF);
        self.cover.push(cover);
        self.value.extend_from_slice(value);
        id
    }

    pub fn n_nodes(&self) -> usize {
        self.feature.len()
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn is_leaf(&self, node: u32) -> bool {
        self.left[node as usize] == LEAF
    }

    pub fn split_feature(&self, node: u32) -> usize {
        self.feature[node as usize] as usize
    }

    pub fn threshold(&self, node: u32) -> f64 {
        self.threshold[node as usize]
    }

    pub fn left_child(&self, node: u32) -> u32 {
        self.left[node as usize]
    }

    pub fn right_child(&self, node: u32) -> u32 {
        self.right[node as usize]
    }

    pub fn cover(&self, node: u32) -> f64 {
        self.cover[node as usize]
    }

    pub fn node_value(&self, node: u32) -> &[f64] {
        let start = node as usize * self.n_outputs;
        &self.value[start..start + self.n_outputs]
    }

    /// Whether a sample follows the left branch at `node`.
    pub fn goes_left(&self, node: u32, row: &[f64]) -> bool {
        row[self.split_feature(node)] <= self.threshold(node)
    }

    /// Leaf values reached by `row`.
    pub fn predict(&self, row: &[f64]) -> &[f64] {
        let mut node = 0;
        while !self.is_leaf(node) {
            node = if self.goes_left(node, row) {
                self.left_child(node)
            } else {
                self.right_child(node)
            };
        }
        self.node_value(node)
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(tree: &Tree, node: u32) -> usize {
            if tree.is_leaf(node) {
                1
            } else {
                1 + walk(tree, tree.left_child(node)).max(walk(tree, tree.right_child(node)))
            }
        }
        if self.n_nodes() == 0 {
            0
        } else {
            walk(self, 0)
        }
    }
}

/// Hyperparameters for [`RandomForest::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features drawn per split; `None` means `sqrt(n_features)`
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 250,
            max_depth: None,
            min_samples_split: 4,
            max_features: None,
            seed: 42,
        }
    }
}

/// Bagged ensemble of classification trees with probability averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    n_outputs: usize,
    trees: Vec<Tree>,
}

impl RandomForest {
    /// Assemble a forest from prebuilt trees.
    pub fn from_trees(n_features: usize, trees: Vec<Tree>) -> Self {
        let n_outputs = trees.first().map(Tree::n_outputs).unwrap_or(2);
        Self {
            n_features,
            n_outputs,
            trees,
        }
    }

    /// Fit a binary classifier.
    ///
    /// Each tree sees a bootstrap sample reweighted so both classes carry the
    /// same total weight within that sample.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams) -> Result<Self, TrainingError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(TrainingError::EmptyDataset);
        }
        if !y.contains(&0) || !y.contains(&1) {
            return Err(TrainingError::SingleClass);
        }

        let n_features = x[0].len();
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize)
            .clamp(1, n_features);

        let mut trees = Vec::with_capacity(params.n_estimators);
        for tree_idx in 0..params.n_estimators {
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(tree_idx as u64));
            let mut grower = TreeGrower {
                x,
                y,
                weights: bootstrap_weights(y, &mut rng),
                max_depth: params.max_depth,
                min_samples_split: params.min_samples_split.max(2),
                max_features,
                rng,
                tree: Tree::new(2),
            };
            let mut samples: Vec<usize> = (0..x.len()).filter(|&i| grower.weights[i] > 0.0).collect();
            grower.grow(&mut samples, 0);

            debug!(
                tree = tree_idx,
                nodes = grower.tree.n_nodes(),
                depth = grower.tree.depth(),
                "Tree fitted"
            );
            trees.push(grower.tree);
        }

        Ok(Self {
            n_features,
            n_outputs: 2,
            trees,
        })
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Expected input width.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// Mean of the trees' leaf values for one row.
    pub fn predict_row(&self, row: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_outputs];
        for tree in &self.trees {
            for (o, v) in out.iter_mut().zip(tree.predict(row)) {
                *o += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        out.iter_mut().for_each(|o| *o /= n);
        out
    }

    /// Probability of the positive class for one row.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let out = self.predict_row(row);
        out.get(1).or(out.first()).copied().unwrap_or(0.0).clamp(0.0, 1.0)
    }
}

/// Per-sample weights: bootstrap multiplicity times the class weight
/// `n / (2 * class_count)` computed on the bootstrap sample.
fn bootstrap_weights(y: &[u8], rng: &mut StdRng) -> Vec<f64> {
    let n = y.len();
    let mut counts = vec![0u32; n];
    for _ in 0..n {
        counts[rng.gen_range(0..n)] += 1;
    }

    let mut class_counts = [0.0f64; 2];
    for (i, &c) in counts.iter().enumerate() {
        class_counts[y[i] as usize] += c as f64;
    }
    let class_weight = class_counts.map(|cc| if cc > 0.0 { n as f64 / (2.0 * cc) } else { 0.0 });

    counts
        .iter()
        .zip(y)
        .map(|(&c, &label)| c as f64 * class_weight[label as usize])
        .collect()
}

struct Split {
    feature: usize,
    threshold: f64,
    proxy: f64,
}

struct TreeGrower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    weights: Vec<f64>,
    max_depth: Option<usize>,
    min_samples_split: usize,
    max_features: usize,
    rng: StdRng,
    tree: Tree,
}

impl TreeGrower<'_> {
    fn class_totals(&self, samples: &[usize]) -> [f64; 2] {
        let mut totals = [0.0; 2];
        for &i in samples {
            totals[self.y[i] as usize] += self.weights[i];
        }
        totals
    }

    fn grow(&mut self, samples: &mut [usize], depth: usize) -> u32 {
        let totals = self.class_totals(samples);
        let cover = totals[0] + totals[1];
        let value = if cover > 0.0 {
            [totals[0] / cover, totals[1] / cover]
        } else {
            [0.5, 0.5]
        };

        let is_pure = totals[0] == 0.0 || totals[1] == 0.0;
        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        if is_pure || depth_reached || samples.len() < self.min_samples_split {
            return self.tree.push_leaf(cover, &value);
        }

        let Some(split) = self.best_split(samples, totals) else {
            return self.tree.push_leaf(cover, &value);
        };

        let node = self
            .tree
            .push_split(split.feature as u32, split.threshold, cover, &value);

        let x = self.x;
        let (left, right) = partition(samples, |i| x[i][split.feature] <= split.threshold);
        let left_id = self.grow(left, depth + 1);
        let right_id = self.grow(right, depth + 1);
        self.tree.set_children(node, left_id, right_id);
        node
    }

    fn best_split(&mut self, samples: &[usize], totals: [f64; 2]) -> Option<Split> {
        let n_features = self.x[0].len();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(&mut self.rng);

        let mut best: Option<Split> = None;
        let mut visited = 0;
        for feature in features {
            if visited >= self.max_features && best.is_some() {
                break;
            }
            match self.best_split_on(feature, samples, totals) {
                Some(candidate) => {
                    visited += 1;
                    if best.as_ref().map_or(true, |b| candidate.proxy > b.proxy) {
                        best = Some(candidate);
                    }
                }
                // constant within this node
                None => continue,
            }
        }
        best
    }

    /// Best Gini split on one feature, scored by the negated weighted child
    /// impurity (larger is better).
    fn best_split_on(&self, feature: usize, samples: &[usize], totals: [f64; 2]) -> Option<Split> {
        let mut sorted: Vec<(f64, usize)> = samples.iter().map(|&i| (self.x[i][feature], i)).collect();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let (first, last) = (sorted.first()?.0, sorted.last()?.0);
        if last <= first + FEATURE_THRESHOLD {
            return None;
        }

        let mut left = [0.0f64; 2];
        let mut best: Option<Split> = None;
        for pos in 0..sorted.len() - 1 {
            let (v, i) = sorted[pos];
            left[self.y[i] as usize] += self.weights[i];

            let next = sorted[pos + 1].0;
            if next <= v + FEATURE_THRESHOLD {
                continue;
            }

            let right = [totals[0] - left[0], totals[1] - left[1]];
            let proxy = -(weighted_gini(left) + weighted_gini(right));
            if best.as_ref().map_or(true, |b| proxy > b.proxy) {
                let mut threshold = v / 2.0 + next / 2.0;
                if threshold >= next {
                    threshold = v;
                }
                best = Some(Split {
                    feature,
                    threshold,
                    proxy,
                });
            }
        }
        best
    }
}

/// Gini impurity scaled by the node weight.
fn weighted_gini(counts: [f64; 2]) -> f64 {
    let total = counts[0] + counts[1];
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = counts[0] / total;
    let p1 = counts[1] / total;
    total * (1.0 - p0 * p0 - p1 * p1)
}

/// Stable in-place partition; returns the (matching, non-matching) halves.
fn partition(samples: &mut [usize], pred: impl Fn(usize) -> bool) -> (&mut [usize], &mut [usize]) {
    let (mut yes, no): (Vec<usize>, Vec<usize>) = samples.iter().partition(|&&i| pred(i));
    let split = yes.len();
    yes.extend(no);
    samples.copy_from_slice(&yes);
    samples.split_at_mut(split)
}
