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

use std::collections::BTreeSet;

use fnv::FnvHashMap;
use serde_derive::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::{RecoError, Result};
use crate::stats::DataDictionary;
use crate::types::{self, check_identifier, DenseVector, EventWeights, InteractionEvent, SparseMatrix};

/// Weighted implicit feedback, users as rows and items as columns. Rows and columns hold the
/// same nonzero entries, sorted by index. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionMatrix {
    dictionary: DataDictionary,
    rows: SparseMatrix,
    columns: SparseMatrix,
}

impl InteractionMatrix {

    pub fn dictionary(&self) -> &DataDictionary {
        &self.dictionary
    }

    pub fn num_users(&self) -> usize {
        self.rows.len()
    }

    pub fn num_items(&self) -> usize {
        self.columns.len()
    }

    pub fn num_nonzeros(&self) -> usize {
        self.rows.iter().map(|row| row.len()).sum()
    }

    pub fn sparsity(&self) -> f64 {
        let cells = self.num_users() * self.num_items();
        if cells == 0 {
            1.0
        } else {
            1.0 - self.num_nonzeros() as f64 / cells as f64
        }
    }

    /// Items and weights of a user, sorted by item index
    pub fn row(&self, user: u32) -> &[(u32, f64)] {
        &self.rows[user as usize]
    }

    /// Users and weights of an item, sorted by user index
    pub fn column(&self, item: u32) -> &[(u32, f64)] {
        &self.columns[item as usize]
    }

    pub fn rows(&self) -> &SparseMatrix {
        &self.rows
    }

    pub fn columns(&self) -> &SparseMatrix {
        &self.columns
    }

    pub fn contains(&self, user: u32, item: u32) -> bool {
        self.row(user).binary_search_by_key(&item, |&(other_item, _)| other_item).is_ok()
    }

    pub fn column_sums(&self) -> DenseVector {
        self.columns.iter()
            .map(|column| column.iter().map(|&(_, weight)| weight).sum())
            .collect()
    }
}

/// Turns raw events into an `InteractionMatrix`: per-type weights, summation of repeated
/// (user, item) events, optional minimum-activity filters and sorted id mappings.
pub struct InteractionMatrixBuilder {
    weights: EventWeights,
    min_user_events: usize,
    min_item_users: usize,
    catalog: BTreeSet<String>,
}

impl InteractionMatrixBuilder {

    pub fn new(weights: EventWeights) -> Self {
        InteractionMatrixBuilder {
            weights,
            min_user_events: 1,
            min_item_users: 1,
            catalog: BTreeSet::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        InteractionMatrixBuilder::new(config.event_weights())
            .with_minimums(config.min_user_events, config.min_item_users)
    }

    /// Users need `min_user_events` distinct items, items need `min_item_users` distinct users.
    pub fn with_minimums(mut self, min_user_events: usize, min_item_users: usize) -> Self {
        self.min_user_events = min_user_events.max(1);
        self.min_item_users = min_item_users.max(1);
        self
    }

    /// Items which should receive an index even without interactions, e.g. items with properties.
    pub fn with_catalog<'a, I>(mut self, item_ids: I) -> Self
        where I: IntoIterator<Item=&'a str> {

        self.catalog.extend(item_ids.into_iter().map(|item_id| item_id.to_string()));
        self
    }

    pub fn build(&self, events: &[InteractionEvent]) -> Result<InteractionMatrix> {

        let weights = [
            ("event_weight_view", self.weights.view),
            ("event_weight_cart", self.weights.add_to_cart),
            ("event_weight_transaction", self.weights.transaction),
        ];
        for &(option, weight) in weights.iter() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RecoError::config(option, format!("must be non-negative, got {}", weight)));
            }
        }

        for item_id in self.catalog.iter() {
            check_identifier("item", item_id, None)?;
        }

        // (weight, number of events) per (user, item)
        let mut aggregated: FnvHashMap<(&str, &str), (f64, u64)> =
            FnvHashMap::with_capacity_and_hasher(events.len(), Default::default());

        for (position, event) in events.iter().enumerate() {
            let line = Some(position as u64 + 1);
            check_identifier("user", &event.user_id, line)?;
            check_identifier("item", &event.item_id, line)?;

            let entry = aggregated
                .entry((event.user_id.as_str(), event.item_id.as_str()))
                .or_insert((0.0, 0));
            entry.0 += self.weights.weight(event.event_type);
            entry.1 += 1;
        }

        let mut pairs: Vec<(&str, &str, f64, u64)> = aggregated.into_iter()
            .filter(|&(_, (weight, _))| weight > 0.0)
            .map(|((user, item), (weight, count))| (user, item, weight, count))
            .collect();

        if self.min_user_events > 1 {
            let mut items_per_user: FnvHashMap<&str, usize> = FnvHashMap::default();
            for &(user, _, _, _) in pairs.iter() {
                *items_per_user.entry(user).or_insert(0) += 1;
            }
            pairs.retain(|&(user, _, _, _)| items_per_user[user] >= self.min_user_events);
        }

        if self.min_item_users > 1 {
            let mut users_per_item: FnvHashMap<&str, usize> = FnvHashMap::default();
            for &(_, item, _, _) in pairs.iter() {
                *users_per_item.entry(item).or_insert(0) += 1;
            }
            pairs.retain(|&(_, item, _, _)| users_per_item[item] >= self.min_item_users);
        }

        let users: BTreeSet<String> = pairs.iter().map(|&(user, _, _, _)| user.to_string()).collect();
        let mut items: BTreeSet<String> = self.catalog.clone();
        items.extend(pairs.iter().map(|&(_, item, _, _)| item.to_string()));

        let num_interactions: u64 = pairs.iter().map(|&(_, _, _, count)| count).sum();
        let dictionary = DataDictionary::from(users, items, num_interactions);

        let mut rows = types::new_sparse_matrix(dictionary.num_users());
        let mut columns = types::new_sparse_matrix(dictionary.num_items());

        for &(user, item, weight, _) in pairs.iter() {
            // Both are present, the dictionary was built from these pairs
            if let (Some(user_index), Some(item_index)) =
                (dictionary.user_index(user), dictionary.item_index(item)) {
                rows[user_index as usize].push((item_index, weight));
                columns[item_index as usize].push((user_index, weight));
            }
        }

        for row in rows.iter_mut() {
            row.sort_by_key(|&(item, _)| item);
        }
        for column in columns.iter_mut() {
            column.sort_by_key(|&(user, _)| user);
        }

        let matrix = InteractionMatrix { dictionary, rows, columns };

        info!(
            "Interaction matrix with {} users, {} items, {} nonzeros from {} events (sparsity {:.6})",
            matrix.num_users(),
            matrix.num_items(),
            matrix.num_nonzeros(),
            num_interactions,
            matrix.sparsity(),
        );

        Ok(matrix)
    }
}
