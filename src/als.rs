/**
 * BlendReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::sync::Mutex;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scoped_pool::Pool;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info, Level};

use crate::config::Config;
use crate::error::{RecoError, Result};
use crate::interactions::InteractionMatrix;
use crate::topk::{ScoredItem, TopK};
use crate::types::{self, DenseVector, SparseMatrix};
use crate::utils;

/// Rows solved by a single pool job
const ROWS_PER_JOB: usize = 256;

const INIT_SCALE: f64 = 0.01;

/// Hyperparameters of the implicit-feedback factorization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlsParams {
    pub rank: usize,
    pub regularization: f64,
    pub iterations: usize,
    pub confidence_scale: f64,
    pub seed: u64,
}

impl AlsParams {

    pub fn from_config(config: &Config) -> Self {
        AlsParams {
            rank: config.cf_rank,
            regularization: config.cf_regularization,
            iterations: config.cf_iterations,
            confidence_scale: config.cf_confidence_scale,
            seed: config.cf_seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rank == 0 {
            return Err(RecoError::config("cf_rank", "must be at least 1"));
        }
        if self.iterations == 0 {
            return Err(RecoError::config("cf_iterations", "must be at least 1"));
        }
        if !self.regularization.is_finite() || self.regularization <= 0.0 {
            return Err(RecoError::config(
                "cf_regularization",
                format!("must be a positive number, got {}", self.regularization),
            ));
        }
        if !self.confidence_scale.is_finite() || self.confidence_scale < 0.0 {
            return Err(RecoError::config(
                "cf_confidence_scale",
                format!("must be a non-negative number, got {}", self.confidence_scale),
            ));
        }
        Ok(())
    }
}

/// Latent factor model R ~ U * V^T trained with alternating least squares for implicit feedback.
/// Every nonzero r_ui is a positive preference with confidence c_ui = 1 + beta * r_ui. Factors
/// are stored row-major and never change after training.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollaborativeFilteringModel {
    params: AlsParams,
    num_users: usize,
    num_items: usize,
    user_factors: DenseVector,
    item_factors: DenseVector,
}

impl CollaborativeFilteringModel {

    pub fn fit(matrix: &InteractionMatrix, params: AlsParams, pool_size: usize) -> Result<Self> {

        params.validate()?;

        let rank = params.rank;
        let num_users = matrix.num_users();
        let num_items = matrix.num_items();

        let training_start = Instant::now();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut item_factors: DenseVector = (0..num_items * rank)
            .map(|_| rng.gen_range(-INIT_SCALE..INIT_SCALE))
            .collect();
        let mut user_factors = types::new_dense_vector(num_users * rank);

        let pool = Pool::new(pool_size.max(1));

        for iteration in 0..params.iterations {
            user_factors = als_step(matrix.rows(), &item_factors, &params, &pool)?;
            item_factors = als_step(matrix.columns(), &user_factors, &params, &pool)?;

            if tracing::enabled!(Level::DEBUG) {
                let loss = observed_loss(matrix, &user_factors, &item_factors, &params);
                debug!("ALS iteration {}/{}: loss on observed entries = {:.4}",
                    iteration + 1, params.iterations, loss);
            }
        }

        pool.shutdown();

        info!(
            "Trained CF model | users: {}, items: {}, rank: {}, reg: {}, iters: {}, {}ms",
            num_users,
            num_items,
            rank,
            params.regularization,
            params.iterations,
            utils::to_millis(training_start.elapsed()),
        );

        Ok(CollaborativeFilteringModel { params, num_users, num_items, user_factors, item_factors })
    }

    pub fn params(&self) -> &AlsParams {
        &self.params
    }

    pub fn rank(&self) -> usize {
        self.params.rank
    }

    pub fn num_users(&self) -> usize {
        self.num_users
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn user_factors(&self, user: u32) -> Result<&[f64]> {
        if user as usize >= self.num_users {
            return Err(RecoError::UnknownUser(format!("#{}", user)));
        }
        let start = user as usize * self.params.rank;
        Ok(&self.user_factors[start..start + self.params.rank])
    }

    pub fn item_factors(&self, item: u32) -> Result<&[f64]> {
        if item as usize >= self.num_items {
            return Err(RecoError::UnknownItem(format!("#{}", item)));
        }
        let start = item as usize * self.params.rank;
        Ok(&self.item_factors[start..start + self.params.rank])
    }

    /// Users without training interactions keep an all-zero factor row and carry no signal.
    pub fn has_signal(&self, user: u32) -> bool {
        match self.user_factors(user) {
            Ok(factors) => factors.iter().any(|&value| value != 0.0),
            Err(_) => false,
        }
    }

    pub fn score(&self, user: u32, item: u32) -> Result<f64> {
        Ok(dot(self.user_factors(user)?, self.item_factors(item)?))
    }

    /// The `k` highest scoring items for a user, skipping the (sorted) items in `history`.
    pub fn top_k(&self, user: u32, k: usize, history: &[(u32, f64)]) -> Result<Vec<ScoredItem>> {
        let user_vector = self.user_factors(user)?;
        let rank = self.params.rank;

        let mut top = TopK::new(k);
        for (item, item_vector) in self.item_factors.chunks(rank).enumerate() {
            let item = item as u32;
            if history.binary_search_by_key(&item, |&(seen, _)| seen).is_ok() {
                continue;
            }
            top.offer(ScoredItem { item, score: dot(user_vector, item_vector) });
        }

        Ok(top.into_sorted_vec())
    }
}

/// Solves the regularized normal equations for every row of `ratings` while `fixed` stays
/// constant: (F^T F + F^T (C_u - I) F + lambda * I) x_u = F^T C_u p_u. Rows without any
/// entries get zero factors.
fn als_step(
    ratings: &SparseMatrix,
    fixed: &[f64],
    params: &AlsParams,
    pool: &Pool,
) -> Result<DenseVector> {

    let rank = params.rank;
    let gram = gramian(fixed, rank);

    let mut updated = types::new_dense_vector(ratings.len() * rank);
    let failure: Mutex<Option<RecoError>> = Mutex::new(None);

    pool.scoped(|scope| {
        for (job, block) in updated.chunks_mut(ROWS_PER_JOB * rank).enumerate() {

            let first_row = job * ROWS_PER_JOB;
            let reference_to_gram = &gram;
            let reference_to_failure = &failure;

            scope.execute(move || {
                for (offset, solution) in block.chunks_mut(rank).enumerate() {
                    let row = &ratings[first_row + offset];
                    if row.is_empty() {
                        continue;
                    }

                    match solve_row(row, fixed, reference_to_gram, params) {
                        Ok(x) => solution.copy_from_slice(&x),
                        Err(error) => {
                            if let Ok(mut slot) = reference_to_failure.lock() {
                                slot.get_or_insert(error);
                            }
                            return;
                        }
                    }
                }
            });
        }
    });

    let failure = failure.into_inner()
        .map_err(|_| RecoError::NumericalFailure("ALS worker panicked".to_string()))?;

    match failure {
        Some(error) => Err(error),
        None => Ok(updated),
    }
}

fn solve_row(
    row: &[(u32, f64)],
    fixed: &[f64],
    gram: &[f64],
    params: &AlsParams,
) -> Result<DenseVector> {

    let rank = params.rank;
    let mut a = gram.to_vec();
    let mut b = types::new_dense_vector(rank);

    for &(other, rating) in row {
        let start = other as usize * rank;
        let y = &fixed[start..start + rank];
        let confidence = 1.0 + params.confidence_scale * rating;

        for i in 0..rank {
            b[i] += confidence * y[i];
            let scaled = (confidence - 1.0) * y[i];
            for j in 0..rank {
                a[i * rank + j] += scaled * y[j];
            }
        }
    }

    for i in 0..rank {
        a[i * rank + i] += params.regularization;
    }

    cholesky_solve(a, &b, rank)
}

/// F^T F for a row-major matrix with `rank` columns
fn gramian(factors: &[f64], rank: usize) -> DenseVector {
    let mut gram = types::new_dense_vector(rank * rank);
    for vector in factors.chunks(rank) {
        for i in 0..rank {
            if vector[i] == 0.0 {
                continue;
            }
            for j in 0..rank {
                gram[i * rank + j] += vector[i] * vector[j];
            }
        }
    }
    gram
}

/// Solves A x = b for a symmetric positive definite A via A = L L^T.
fn cholesky_solve(mut a: DenseVector, b: &[f64], n: usize) -> Result<DenseVector> {

    // L overwrites the lower triangle of A
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= a[i * n + k] * a[j * n + k];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return Err(RecoError::NumericalFailure(
                        "normal equations are not positive definite".to_string()));
                }
                a[i * n + i] = sum.sqrt();
            } else {
                a[i * n + j] = sum / a[j * n + j];
            }
        }
    }

    // Forward substitution: L y = b
    let mut y = types::new_dense_vector(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= a[i * n + k] * y[k];
        }
        y[i] = sum / a[i * n + i];
    }

    // Backward substitution: L^T x = y
    let mut x = types::new_dense_vector(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= a[k * n + i] * x[k];
        }
        x[i] = sum / a[i * n + i];
    }

    Ok(x)
}

#[inline(always)]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn observed_loss(
    matrix: &InteractionMatrix,
    user_factors: &[f64],
    item_factors: &[f64],
    params: &AlsParams,
) -> f64 {
    let rank = params.rank;
    let mut loss = 0.0;

    for (user, row) in matrix.rows().iter().enumerate() {
        let user_vector = &user_factors[user * rank..(user + 1) * rank];
        for &(item, rating) in row {
            let item_vector = &item_factors[item as usize * rank..(item as usize + 1) * rank];
            let error = 1.0 - dot(user_vector, item_vector);
            loss += (1.0 + params.confidence_scale * rating) * error * error;
        }
    }

    let norms: f64 = user_factors.iter().chain(item_factors.iter()).map(|v| v * v).sum();
    loss + params.regularization * norms
}
