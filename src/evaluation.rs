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

use std::collections::{BTreeMap, BTreeSet};

use serde_derive::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::{RecoError, Result};
use crate::models::Recommender;
use crate::types::InteractionEvent;

/// Temporal per-user split: the most recent events of every user with enough history are held
/// out for testing, everything before goes into training. Users with too little history take
/// part in neither.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSplit {
    train: Vec<InteractionEvent>,
    /// Held out item ids per user
    test: BTreeMap<String, BTreeSet<String>>,
    num_excluded_users: usize,
}

impl EvaluationSplit {

    pub fn from_config(events: &[InteractionEvent], config: &Config) -> Result<Self> {
        EvaluationSplit::build(events, config.min_interactions_for_eval, config.test_fraction)
    }

    pub fn build(
        events: &[InteractionEvent],
        min_interactions: usize,
        test_fraction: f64,
    ) -> Result<Self> {

        if min_interactions < 2 {
            return Err(RecoError::config(
                "min_interactions_for_eval",
                format!("must be at least 2, got {}", min_interactions),
            ));
        }
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(RecoError::config(
                "test_fraction",
                format!("must lie strictly between 0 and 1, got {}", test_fraction),
            ));
        }

        let mut events_per_user: BTreeMap<&str, Vec<&InteractionEvent>> = BTreeMap::new();
        for event in events.iter() {
            events_per_user.entry(event.user_id.as_str()).or_insert_with(Vec::new).push(event);
        }

        let mut train = Vec::with_capacity(events.len());
        let mut test = BTreeMap::new();
        let mut num_excluded_users = 0;

        for (user_id, mut user_events) in events_per_user.into_iter() {
            let num_events = user_events.len();
            if num_events < min_interactions {
                num_excluded_users += 1;
                continue;
            }

            // Stable, events with equal timestamps keep their input order
            user_events.sort_by_key(|event| event.timestamp);

            let test_size = ((num_events as f64 * test_fraction).floor() as usize)
                .max(1)
                .min(num_events - 1);
            let cutoff = num_events - test_size;

            train.extend(user_events[..cutoff].iter().map(|&event| event.clone()));
            let held_out: BTreeSet<String> = user_events[cutoff..].iter()
                .map(|event| event.item_id.clone())
                .collect();
            test.insert(user_id.to_string(), held_out);
        }

        info!(
            "Temporal split: {} train events, {} test users, {} users with too little history",
            train.len(),
            test.len(),
            num_excluded_users,
        );

        Ok(EvaluationSplit { train, test, num_excluded_users })
    }

    pub fn train_events(&self) -> &[InteractionEvent] {
        &self.train
    }

    pub fn num_test_users(&self) -> usize {
        self.test.len()
    }

    pub fn num_excluded_users(&self) -> usize {
        self.num_excluded_users
    }

    /// Test users in ascending id order with their held out items
    pub fn test_users(&self) -> impl Iterator<Item=(&str, &BTreeSet<String>)> {
        self.test.iter().map(|(user_id, items)| (user_id.as_str(), items))
    }

    pub fn relevant_items(&self, user_id: &str) -> Option<&BTreeSet<String>> {
        self.test.get(user_id)
    }
}

/// Ranking quality of a single recommendation list.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RankingMetrics {
    pub precision: f64,
    pub recall: f64,
    pub ndcg: f64,
    pub average_precision: f64,
}

impl RankingMetrics {

    /// Binary relevance, only the first `k` recommendations count. An empty test set or an empty
    /// recommendation list scores 0 on every metric.
    pub fn compute<S: AsRef<str>>(recommended: &[S], relevant: &BTreeSet<String>, k: usize) -> Self {
        if k == 0 || relevant.is_empty() || recommended.is_empty() {
            return RankingMetrics::default();
        }

        let mut hits = 0;
        let mut dcg = 0.0;
        let mut sum_of_precisions = 0.0;

        for (position, item_id) in recommended.iter().take(k).enumerate() {
            if relevant.contains(item_id.as_ref()) {
                hits += 1;
                dcg += 1.0 / (position as f64 + 2.0).log2();
                sum_of_precisions += hits as f64 / (position as f64 + 1.0);
            }
        }

        let ideal_hits = relevant.len().min(k);
        let idcg: f64 = (0..ideal_hits).map(|position| 1.0 / (position as f64 + 2.0).log2()).sum();

        RankingMetrics {
            precision: hits as f64 / k as f64,
            recall: hits as f64 / relevant.len() as f64,
            ndcg: dcg / idcg,
            average_precision: sum_of_precisions / ideal_hits as f64,
        }
    }
}

/// Mean metrics per model, keyed by model name and metric name (e.g. "ndcg@10").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricTable {
    pub k: usize,
    pub users_evaluated: usize,
    pub results: BTreeMap<String, BTreeMap<String, f64>>,
}

impl MetricTable {

    pub fn metric_names(k: usize) -> [String; 4] {
        [
            format!("precision@{}", k),
            format!("recall@{}", k),
            format!("ndcg@{}", k),
            format!("map@{}", k),
        ]
    }

    pub fn get(&self, model: &str, metric: &str) -> Option<f64> {
        self.results.get(model).and_then(|metrics| metrics.get(metric)).cloned()
    }
}

/// Scores every model on every test user of the split. Users the model cannot serve count as
/// an empty recommendation list, any other failure aborts the evaluation.
pub fn evaluate(models: &[&dyn Recommender], split: &EvaluationSplit, k: usize) -> Result<MetricTable> {

    let num_users = split.num_test_users();
    let names = MetricTable::metric_names(k);
    let mut results = BTreeMap::new();

    for model in models.iter() {
        let mut sums = RankingMetrics::default();

        for (user_id, relevant) in split.test_users() {
            let recommended: Vec<String> = match model.recommend(user_id, k) {
                Ok(recommendations) => recommendations.into_iter().map(|r| r.item_id).collect(),
                Err(ref error) if error.is_unknown_identifier() => Vec::new(),
                Err(error) => return Err(error),
            };

            let metrics = RankingMetrics::compute(&recommended, relevant, k);
            sums.precision += metrics.precision;
            sums.recall += metrics.recall;
            sums.ndcg += metrics.ndcg;
            sums.average_precision += metrics.average_precision;
        }

        let mean = |sum: f64| if num_users == 0 { 0.0 } else { sum / num_users as f64 };

        let mut metrics = BTreeMap::new();
        metrics.insert(names[0].clone(), mean(sums.precision));
        metrics.insert(names[1].clone(), mean(sums.recall));
        metrics.insert(names[2].clone(), mean(sums.ndcg));
        metrics.insert(names[3].clone(), mean(sums.average_precision));

        info!(
            "{}: precision@{} = {:.4}, recall@{} = {:.4}, ndcg@{} = {:.4}, map@{} = {:.4}",
            model.name(), k, metrics[&names[0]], k, metrics[&names[1]],
            k, metrics[&names[2]], k, metrics[&names[3]],
        );

        results.insert(model.name().to_string(), metrics);
    }

    Ok(MetricTable { k, users_evaluated: num_users, results })
}
