//! Exact path-dependent TreeSHAP.
//!
//! Implements Algorithm 2 of Lundberg et al., "Consistent Individualized
//! Feature Attribution for Tree Ensembles": attributions are computed in
//! polynomial time by tracking, along each root-to-leaf path, the proportion
//! of feature subsets that flow through every node.

use crate::models::forest::{RandomForest, Tree};
use thiserror::Error;

/// Raw attribution output, shaped by the forest's output arity.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapOutput {
    /// One attribution array per class
    PerClass(Vec<Vec<f64>>),
    /// A single array for single-output forests
    Combined(Vec<f64>),
}

/// Canonical attribution vector for one row and one output.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionVector {
    pub values: Vec<f64>,
    pub base_value: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum ShapError {
    #[error("Row has {got} features, model expects {expected}")]
    RowWidth { expected: usize, got: usize },

    #[error("Class {class} not present in {available}-class output")]
    MissingClass { class: usize, available: usize },
}

impl ShapOutput {
    /// Collapse into the attributions for `positive_class`.
    ///
    /// Per-class output selects that class; combined output is used as is.
    pub fn into_attributions(
        self,
        base_values: &[f64],
        positive_class: usize,
    ) -> Result<AttributionVector, ShapError> {
        match self {
            ShapOutput::PerClass(mut per_class) => {
                let available = per_class.len();
                if positive_class >= available {
                    return Err(ShapError::MissingClass {
                        class: positive_class,
                        available,
                    });
                }
                Ok(AttributionVector {
                    values: per_class.swap_remove(positive_class),
                    base_value: base_values.get(positive_class).copied().unwrap_or(0.0),
                })
            }
            ShapOutput::Combined(values) => Ok(AttributionVector {
                values,
                base_value: base_values.first().copied().unwrap_or(0.0),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// TreeSHAP explainer over a fitted forest.
pub struct TreeExplainer<'a> {
    forest: &'a RandomForest,
    base_values: Vec<f64>,
}

impl<'a> TreeExplainer<'a> {
    pub fn new(forest: &'a RandomForest) -> Self {
        let n_outputs = forest.n_outputs();
        let mut base_values = vec![0.0; n_outputs];
        for tree in forest.trees() {
            for (b, v) in base_values.iter_mut().zip(expected_value(tree)) {
                *b += v;
            }
        }
        let n = forest.n_trees().max(1) as f64;
        base_values.iter_mut().for_each(|b| *b /= n);

        Self {
            forest,
            base_values,
        }
    }

    /// Expected model output per class over the training distribution.
    pub fn base_values(&self) -> &[f64] {
        &self.base_values
    }

    /// Attributions for one transformed row.
    pub fn shap_values(&self, row: &[f64]) -> Result<ShapOutput, ShapError> {
        let n_features = self.forest.n_features();
        if row.len() != n_features {
            return Err(ShapError::RowWidth {
                expected: n_features,
                got: row.len(),
            });
        }

        let n_outputs = self.forest.n_outputs();
        let mut phi = vec![vec![0.0; n_features]; n_outputs];
        for tree in self.forest.trees() {
            if tree.n_nodes() > 0 {
                recurse(tree, row, &mut phi, 0, &[], 1.0, 1.0, None);
            }
        }

        let n = self.forest.n_trees().max(1) as f64;
        for output in phi.iter_mut() {
            output.iter_mut().for_each(|v| *v /= n);
        }

        Ok(if n_outputs == 1 {
            ShapOutput::Combined(phi.swap_remove(0))
        } else {
            ShapOutput::PerClass(phi)
        })
    }
}

/// Cover-weighted mean of a tree's leaf values.
fn expected_value(tree: &Tree) -> Vec<f64> {
    let mut total = vec![0.0; tree.n_outputs()];
    if tree.n_nodes() == 0 {
        return total;
    }
    let root_cover = tree.cover(0);
    let mut stack = vec![0u32];
    while let Some(node) = stack.pop() {
        if tree.is_leaf(node) {
            for (t, v) in total.iter_mut().zip(tree.node_value(node)) {
                *t += v * tree.cover(node) / root_cover;
            }
        } else {
            stack.push(tree.left_child(node));
            stack.push(tree.right_child(node));
        }
    }
    total
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    row: &[f64],
    phi: &mut [Vec<f64>],
    node: u32,
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let mut path = parent_path.to_vec();
    extend(&mut path, zero_fraction, one_fraction, feature);

    if tree.is_leaf(node) {
        let leaf = tree.node_value(node);
        for i in 1..path.len() {
            let w = unwound_sum(&path, i);
            let el = path[i];
            if let Some(f) = el.feature {
                let scale = w * (el.one_fraction - el.zero_fraction);
                for (out, v) in phi.iter_mut().zip(leaf) {
                    out[f] += scale * v;
                }
            }
        }
        return;
    }

    let split = tree.split_feature(node);
    let (hot, cold) = if tree.goes_left(node, row) {
        (tree.left_child(node), tree.right_child(node))
    } else {
        (tree.right_child(node), tree.left_child(node))
    };
    let cover = tree.cover(node);
    let hot_zero = tree.cover(hot) / cover;
    let cold_zero = tree.cover(cold) / cover;

    // a feature already on the path is undone and redone at this node
    let mut incoming_zero = 1.0;
    let mut incoming_one = 1.0;
    if let Some(k) = path.iter().position(|el| el.feature == Some(split)) {
        incoming_zero = path[k].zero_fraction;
        incoming_one = path[k].one_fraction;
        unwind(&mut path, k);
    }

    recurse(tree, row, phi, hot, &path, hot_zero * incoming_zero, incoming_one, Some(split));
    recurse(tree, row, phi, cold, &path, cold_zero * incoming_zero, 0.0, Some(split));
}

fn extend(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / denom;
    }
}

fn unwind(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next = path[depth].pweight;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next * denom / ((i + 1) as f64 * one);
            next = tmp - path[i].pweight * zero * (depth - i) as f64 / denom;
        } else {
            path[i].pweight = path[i].pweight * denom / (zero * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let mut next = path[depth].pweight;
    let mut total = 0.0;

    if one != 0.0 {
        for i in (0..depth).rev() {
            let tmp = next / ((i + 1) as f64 * one);
            total += tmp;
            next = path[i].pweight - tmp * zero * (depth - i) as f64;
        }
    } else {
        for i in (0..depth).rev() {
            total += path[i].pweight / (zero * (depth - i) as f64);
        }
    }

    total * (depth + 1) as f64
}
