//! LIME tabular explainer over the original feature space.
//!
//! Continuous columns are discretized into quartile bins of the background
//! sample; `channel` stays categorical. Perturbations are drawn from the
//! per-column bin frequencies, mapped back to concrete values, scored by the
//! full pipeline and fitted with a locally weighted ridge surrogate.

use crate::models::pipeline::ClassifierPipeline;
use crate::types::explanation::ExplanationItem;
use crate::types::transaction::{Channel, Transaction, TransactionField, N_FIELDS};
use ndarray::{Array1, Array2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_NUM_SAMPLES: usize = 5000;

/// Largest `top_k` explained with forward selection
const FORWARD_SELECTION_MAX: usize = 6;
/// Ridge penalty of the final surrogate
const SURROGATE_ALPHA: f64 = 1.0;
/// Ridge penalty used to rank features by weight
const HIGHEST_WEIGHTS_ALPHA: f64 = 0.01;
/// Near-unregularized fit used during forward selection
const FORWARD_SELECTION_ALPHA: f64 = 1e-8;
/// Added to every bin standard deviation
const BIN_STD_FLOOR: f64 = 1e-11;
const TRUNCNORM_ATTEMPTS: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum LimeError {
    #[error("Background sample is empty")]
    EmptyBackground,

    #[error("Row has {got} columns, expected {expected}")]
    RowWidth { expected: usize, got: usize },

    #[error("Surrogate regression produced a non-finite solution")]
    NonFiniteSolution,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimeSettings {
    pub num_samples: usize,
    /// Defaults to `0.75 * sqrt(n_columns)`
    pub kernel_width: Option<f64>,
    /// Fixed seed per explanation; `None` draws from OS entropy
    pub random_seed: Option<u64>,
}

impl Default for LimeSettings {
    fn default() -> Self {
        Self {
            num_samples: DEFAULT_NUM_SAMPLES,
            kernel_width: None,
            random_seed: None,
        }
    }
}

/// Quartile bins of one continuous column.
#[derive(Debug, Clone)]
struct QuartileBins {
    /// De-duplicated quartiles, ascending
    edges: Vec<f64>,
    mins: Vec<f64>,
    maxs: Vec<f64>,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl QuartileBins {
    fn fit(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mut edges: Vec<f64> = [25.0, 50.0, 75.0]
            .iter()
            .map(|&p| percentile(&sorted, p))
            .collect();
        edges.dedup();

        let lowest = sorted.first().copied().unwrap_or(0.0);
        let highest = sorted.last().copied().unwrap_or(0.0);

        let mut bins = Self {
            mins: std::iter::once(lowest).chain(edges.iter().copied()).collect(),
            maxs: edges.iter().copied().chain(std::iter::once(highest)).collect(),
            edges,
            means: Vec::new(),
            stds: Vec::new(),
        };

        for b in 0..bins.n_bins() {
            let selection: Vec<f64> = values.iter().copied().filter(|&v| bins.bin(v) == b).collect();
            if selection.is_empty() {
                bins.means.push(0.0);
                bins.stds.push(BIN_STD_FLOOR);
                continue;
            }
            let n = selection.len() as f64;
            let mean = selection.iter().sum::<f64>() / n;
            let var = selection.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            bins.means.push(mean);
            bins.stds.push(var.sqrt() + BIN_STD_FLOOR);
        }

        bins
    }

    fn n_bins(&self) -> usize {
        self.edges.len() + 1
    }

    /// Bin `i` holds `edges[i-1] < x <= edges[i]`.
    fn bin(&self, x: f64) -> usize {
        self.edges.iter().filter(|&&e| e < x).count()
    }

    fn label(&self, name: &str, bin: usize) -> String {
        let last = self.edges.len() - 1;
        if bin == 0 {
            format!("{} <= {:.2}", name, self.edges[0])
        } else if bin > last {
            format!("{} > {:.2}", name, self.edges[last])
        } else {
            format!("{:.2} < {} <= {:.2}", self.edges[bin - 1], name, self.edges[bin])
        }
    }

    /// Concrete value for a bin: a normal around the bin mean truncated to
    /// the bin's range.
    fn undiscretize(&self, bin: usize, rng: &mut StdRng) -> f64 {
        let (lo, hi) = (self.mins[bin], self.maxs[bin]);
        if lo >= hi {
            return lo;
        }
        let mean = self.means[bin];
        if let Ok(normal) = Normal::new(mean, self.stds[bin]) {
            for _ in 0..TRUNCNORM_ATTEMPTS {
                let v = normal.sample(rng);
                if (lo..=hi).contains(&v) {
                    return v;
                }
            }
        }
        mean.clamp(lo, hi)
    }
}

/// Linear-interpolated percentile of a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[derive(Debug, Clone)]
enum Column {
    Categorical,
    Continuous(QuartileBins),
}

/// Sampling distribution of one discretized column
#[derive(Debug, Clone)]
struct ColumnSampler {
    values: Vec<f64>,
    index: WeightedIndex<f64>,
}

/// Tabular LIME explainer bound to a background sample.
#[derive(Debug, Clone)]
pub struct LimeTabularExplainer {
    pipeline: Arc<ClassifierPipeline>,
    columns: Vec<Column>,
    samplers: Vec<ColumnSampler>,
    scaler_mean: Array1<f64>,
    scaler_scale: Array1<f64>,
    kernel_width: f64,
    settings: LimeSettings,
    background_rows: usize,
}

impl LimeTabularExplainer {
    /// Build from original-space background rows (see [`Transaction::to_row`]).
    pub fn new(
        pipeline: Arc<ClassifierPipeline>,
        background: &[Vec<f64>],
        settings: LimeSettings,
    ) -> Result<Self, LimeError> {
        if background.is_empty() {
            return Err(LimeError::EmptyBackground);
        }
        if let Some(row) = background.iter().find(|r| r.len() != N_FIELDS) {
            return Err(LimeError::RowWidth {
                expected: N_FIELDS,
                got: row.len(),
            });
        }

        let columns: Vec<Column> = TransactionField::ALL
            .iter()
            .map(|field| {
                if field.is_categorical() {
                    Column::Categorical
                } else {
                    let values: Vec<f64> = background.iter().map(|r| r[field.index()]).collect();
                    Column::Continuous(QuartileBins::fit(&values))
                }
            })
            .collect();

        let discretized: Vec<Vec<f64>> = background
            .iter()
            .map(|r| discretize(&columns, r))
            .collect();

        let n = discretized.len() as f64;
        let mut samplers = Vec::with_capacity(N_FIELDS);
        let mut scaler_mean = Array1::zeros(N_FIELDS);
        let mut scaler_scale = Array1::ones(N_FIELDS);
        for col in 0..N_FIELDS {
            let mut column: Vec<f64> = discretized.iter().map(|r| r[col]).collect();

            let mean = column.iter().sum::<f64>() / n;
            let std = (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            scaler_mean[col] = mean;
            scaler_scale[col] = if std > 0.0 { std } else { 1.0 };

            column.sort_by(|a, b| a.total_cmp(b));
            let mut values: Vec<f64> = Vec::new();
            let mut counts: Vec<f64> = Vec::new();
            for v in column {
                if values.last() == Some(&v) {
                    if let Some(c) = counts.last_mut() {
                        *c += 1.0;
                    }
                } else {
                    values.push(v);
                    counts.push(1.0);
                }
            }
            let index = WeightedIndex::new(&counts).map_err(|_| LimeError::EmptyBackground)?;
            samplers.push(ColumnSampler { values, index });
        }

        let kernel_width = settings
            .kernel_width
            .unwrap_or_else(|| 0.75 * (N_FIELDS as f64).sqrt());

        debug!(
            background_rows = background.len(),
            kernel_width,
            num_samples = settings.num_samples,
            "LIME explainer built"
        );

        Ok(Self {
            pipeline,
            columns,
            samplers,
            scaler_mean,
            scaler_scale,
            kernel_width,
            settings,
            background_rows: background.len(),
        })
    }

    pub fn from_transactions(
        pipeline: Arc<ClassifierPipeline>,
        background: &[Transaction],
        settings: LimeSettings,
    ) -> Result<Self, LimeError> {
        let rows: Vec<Vec<f64>> = background.iter().map(Transaction::to_row).collect();
        Self::new(pipeline, &rows, settings)
    }

    /// Degenerate explainer whose background is the instance itself.
    pub fn single_row(
        pipeline: Arc<ClassifierPipeline>,
        tx: &Transaction,
        settings: LimeSettings,
    ) -> Result<Self, LimeError> {
        Self::new(pipeline, &[tx.to_row()], settings)
    }

    pub fn background_rows(&self) -> usize {
        self.background_rows
    }

    /// Top `top_k` original-space conditions by surrogate weight.
    pub fn explain(&self, tx: &Transaction, top_k: usize) -> Result<Vec<ExplanationItem>, LimeError> {
        let row = tx.to_row();
        let mut rng = match self.settings.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (binary, inverse) = self.perturb(&row, &mut rng);
        let inverse_rows: Vec<Vec<f64>> = inverse.outer_iter().map(|r| r.to_vec()).collect();
        let labels = Array1::from(self.pipeline.predict_proba_rows(&inverse_rows));

        let scaled = (&binary - &self.scaler_mean) / &self.scaler_scale;
        let origin = scaled.row(0).to_owned();
        let width_sq = self.kernel_width * self.kernel_width;
        let weights: Array1<f64> = scaled
            .outer_iter()
            .map(|r| {
                let d_sq = (&r - &origin).mapv(|v| v * v).sum();
                (-d_sq / width_sq).exp().sqrt()
            })
            .collect();

        let used = select_features(&scaled, &labels, &weights, top_k)?;
        let fit = weighted_ridge(&scaled.select(Axis(1), &used), &labels, &weights, SURROGATE_ALPHA)?;

        let mut terms: Vec<(usize, f64)> = used.iter().copied().zip(fit.coef.iter().copied()).collect();
        terms.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let local_pred = fit.intercept
            + used
                .iter()
                .zip(fit.coef.iter())
                .map(|(&c, w)| scaled[[0, c]] * w)
                .sum::<f64>();
        debug!(
            intercept = fit.intercept,
            score = fit.score,
            local_pred,
            model_pred = labels[0],
            "LIME surrogate fitted"
        );

        Ok(terms
            .into_iter()
            .map(|(col, weight)| ExplanationItem::lime(self.condition(col, &row), weight))
            .collect())
    }

    /// Binary "same bin as the instance" matrix and the matching
    /// original-space rows. Row 0 is the instance.
    fn perturb(&self, row: &[f64], rng: &mut StdRng) -> (Array2<f64>, Array2<f64>) {
        let n = self.settings.num_samples.max(1);
        let first = discretize(&self.columns, row);
        let mut binary = Array2::zeros((n, N_FIELDS));
        let mut inverse = Array2::zeros((n, N_FIELDS));

        for col in 0..N_FIELDS {
            binary[[0, col]] = 1.0;
            inverse[[0, col]] = row[col];

            let sampler = &self.samplers[col];
            for s in 1..n {
                let value = sampler.values[sampler.index.sample(rng)];
                binary[[s, col]] = if value == first[col] { 1.0 } else { 0.0 };
                inverse[[s, col]] = match &self.columns[col] {
                    Column::Categorical => value,
                    Column::Continuous(bins) => bins.undiscretize(value as usize, rng),
                };
            }
        }

        (binary, inverse)
    }

    /// Human-readable condition the instance satisfies on one column.
    fn condition(&self, col: usize, row: &[f64]) -> String {
        let field = TransactionField::ALL[col];
        match &self.columns[col] {
            Column::Categorical => match Channel::from_code(row[col]) {
                Some(channel) => format!("{}={}", field, channel),
                None => format!("{}={}", field, row[col]),
            },
            Column::Continuous(bins) => bins.label(field.as_str(), bins.bin(row[col])),
        }
    }
}

/// LIME over the cached reference sample, falling back to a single-row
/// background built per request when no sample was loaded.
#[derive(Debug, Clone)]
pub struct LimeExplainer {
    pipeline: Arc<ClassifierPipeline>,
    prebuilt: Option<LimeTabularExplainer>,
    settings: LimeSettings,
}

impl LimeExplainer {
    pub fn new(
        pipeline: Arc<ClassifierPipeline>,
        reference: Option<&[Transaction]>,
        settings: LimeSettings,
    ) -> Self {
        let prebuilt = reference.and_then(|rows| {
            match LimeTabularExplainer::from_transactions(pipeline.clone(), rows, settings.clone()) {
                Ok(explainer) => Some(explainer),
                Err(e) => {
                    warn!(error = %e, "Reference sample unusable, LIME will use the single-row fallback");
                    None
                }
            }
        });

        Self {
            pipeline,
            prebuilt,
            settings,
        }
    }

    /// Whether explanations run against the reference sample.
    pub fn has_reference(&self) -> bool {
        self.prebuilt.is_some()
    }

    /// Rows in the cached background; 0 on the single-row fallback.
    pub fn background_rows(&self) -> usize {
        self.prebuilt.as_ref().map_or(0, LimeTabularExplainer::background_rows)
    }

    pub fn explain(&self, tx: &Transaction, top_k: usize) -> Result<Vec<ExplanationItem>, LimeError> {
        match &self.prebuilt {
            Some(explainer) => explainer.explain(tx, top_k),
            None => {
                debug!("Explaining against the instance itself");
                LimeTabularExplainer::single_row(self.pipeline.clone(), tx, self.settings.clone())?
                    .explain(tx, top_k)
            }
        }
    }
}

fn discretize(columns: &[Column], row: &[f64]) -> Vec<f64> {
    columns
        .iter()
        .zip(row)
        .map(|(column, &v)| match column {
            Column::Categorical => v,
            Column::Continuous(bins) => bins.bin(v) as f64,
        })
        .collect()
}

/// Forward selection for small `top_k`, otherwise the largest
/// `|coef * x0|` of a lightly regularized fit.
fn select_features(
    data: &Array2<f64>,
    labels: &Array1<f64>,
    weights: &Array1<f64>,
    top_k: usize,
) -> Result<Vec<usize>, LimeError> {
    let n_cols = data.ncols();
    if top_k <= FORWARD_SELECTION_MAX {
        let mut used: Vec<usize> = Vec::new();
        for _ in 0..top_k.min(n_cols) {
            let mut best: Option<(usize, f64)> = None;
            for col in (0..n_cols).filter(|c| !used.contains(c)) {
                let mut candidate = used.clone();
                candidate.push(col);
                let fit = weighted_ridge(
                    &data.select(Axis(1), &candidate),
                    labels,
                    weights,
                    FORWARD_SELECTION_ALPHA,
                )?;
                if best.map_or(true, |(_, score)| fit.score > score) {
                    best = Some((col, fit.score));
                }
            }
            match best {
                Some((col, _)) => used.push(col),
                None => break,
            }
        }
        return Ok(used);
    }

    let all: Vec<usize> = (0..n_cols).collect();
    let fit = weighted_ridge(data, labels, weights, HIGHEST_WEIGHTS_ALPHA)?;
    let contribution: Vec<f64> = all.iter().map(|&c| fit.coef[c] * data[[0, c]]).collect();
    let mut ranked = all;
    ranked.sort_by(|&a, &b| {
        contribution[b]
            .abs()
            .partial_cmp(&contribution[a].abs())
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    ranked.truncate(top_k);
    Ok(ranked)
}

#[derive(Debug)]
struct RidgeFit {
    coef: Array1<f64>,
    intercept: f64,
    /// Weighted R² on the training data
    score: f64,
}

/// Minimizes `Σ wᵢ (yᵢ - xᵢβ - b)² + α‖β‖²` through the centered normal
/// equations.
fn weighted_ridge(
    x: &Array2<f64>,
    y: &Array1<f64>,
    w: &Array1<f64>,
    alpha: f64,
) -> Result<RidgeFit, LimeError> {
    let total = w.sum();
    let x_mean = x.t().dot(w) / total;
    let y_mean = y.dot(w) / total;

    let xc = x - &x_mean;
    let yc = y - y_mean;
    let mut xw = xc.clone();
    for (mut row, &wi) in xw.outer_iter_mut().zip(w.iter()) {
        row *= wi;
    }

    let mut gram = xw.t().dot(&xc);
    for i in 0..gram.nrows() {
        gram[[i, i]] += alpha;
    }
    let rhs = xw.t().dot(&yc);

    let coef = solve(gram, rhs)?;
    let intercept = y_mean - x_mean.dot(&coef);
    let predicted = x.dot(&coef) + intercept;

    Ok(RidgeFit {
        score: weighted_r2(y, &predicted, w, y_mean),
        coef,
        intercept,
    })
}

fn weighted_r2(y: &Array1<f64>, predicted: &Array1<f64>, w: &Array1<f64>, y_mean: f64) -> f64 {
    let residual: f64 = y
        .iter()
        .zip(predicted)
        .zip(w)
        .map(|((&yi, &pi), &wi)| wi * (yi - pi).powi(2))
        .sum();
    let total: f64 = y
        .iter()
        .zip(w)
        .map(|(&yi, &wi)| wi * (yi - y_mean).powi(2))
        .sum();

    if total == 0.0 {
        if residual == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - residual / total
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, LimeError> {
    let n = b.len();
    for k in 0..n {
        let pivot = (k..n)
            .max_by(|&i, &j| a[[i, k]].abs().total_cmp(&a[[j, k]].abs()))
            .unwrap_or(k);
        if a[[pivot, k]] == 0.0 {
            return Err(LimeError::NonFiniteSolution);
        }
        if pivot != k {
            for c in 0..n {
                a.swap([k, c], [pivot, c]);
            }
            b.swap(k, pivot);
        }
        for i in (k + 1)..n {
            let factor = a[[i, k]] / a[[k, k]];
            for c in k..n {
                a[[i, c]] -= factor * a[[k, c]];
            }
            b[i] -= factor * b[k];
        }
    }

    let mut x = Array1::zeros(n);
    for k in (0..n).rev() {
        let tail: f64 = ((k + 1)..n).map(|c| a[[k, c]] * x[c]).sum();
        x[k] = (b[k] - tail) / a[[k, k]];
    }

    if x.iter().all(|v: &f64| v.is_finite()) {
        Ok(x)
    } else {
        Err(LimeError::NonFiniteSolution)
    }
}
