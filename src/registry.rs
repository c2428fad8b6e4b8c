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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{RecoError, Result};
use crate::models::TrainedModelSet;
use crate::types::Recommendation;

/// A published, immutable model set and the version it was published under.
#[derive(Clone, Debug)]
pub struct PublishedModels {
    pub version: u64,
    pub models: Arc<TrainedModelSet>,
}

/// Holds the active model set per key. Lazy training is single-flight: concurrent callers
/// asking for the same missing key wait for one shared build. Retraining builds a new set
/// off to the side and swaps the reference, readers keep the version they already hold.
pub struct ModelRegistry {
    active: DashMap<String, PublishedModels>,
    pending: DashMap<String, Arc<OnceCell<Arc<TrainedModelSet>>>>,
    next_version: AtomicU64,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        ModelRegistry::new()
    }
}

impl ModelRegistry {

    pub fn new() -> Self {
        ModelRegistry {
            active: DashMap::new(),
            pending: DashMap::new(),
            next_version: AtomicU64::new(1),
        }
    }

    /// The active models for `key`, trained with `build` if there are none yet. At most one
    /// build per key runs at a time, everyone else waits for its result. A failed build is
    /// not cached.
    pub fn get_or_train<F>(&self, key: &str, build: F) -> Result<PublishedModels>
        where F: FnOnce() -> Result<TrainedModelSet> {

        if let Some(published) = self.active.get(key) {
            return Ok(published.clone());
        }

        // No shard lock may be held while building
        let cell = self.pending
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let models = cell.get_or_try_init(|| {
            if let Some(published) = self.active.get(key) {
                return Ok(published.models.clone());
            }
            debug!("Training models for '{}' on first use.", key);
            build().map(Arc::new)
        })?.clone();

        let published = self.active
            .entry(key.to_string())
            .or_insert_with(|| {
                let version = self.next_version.fetch_add(1, Ordering::SeqCst);
                info!("Published models for '{}' as version {}.", key, version);
                PublishedModels { version, models }
            })
            .clone();

        self.pending.remove_if(key, |_, pending| Arc::ptr_eq(pending, &cell));

        Ok(published)
    }

    /// Trains a fresh model set and publishes it, replacing the active one.
    pub fn retrain<F>(&self, key: &str, build: F) -> Result<PublishedModels>
        where F: FnOnce() -> Result<TrainedModelSet> {

        let models = build()?;
        Ok(self.publish(key, models))
    }

    pub fn publish(&self, key: &str, models: TrainedModelSet) -> PublishedModels {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let published = PublishedModels { version, models: Arc::new(models) };

        if let Some(previous) = self.active.insert(key.to_string(), published.clone()) {
            info!("Replaced models for '{}': version {} -> {}.", key, previous.version, version);
        } else {
            info!("Published models for '{}' as version {}.", key, version);
        }

        published
    }

    pub fn active(&self, key: &str) -> Result<PublishedModels> {
        self.active.get(key)
            .map(|published| published.clone())
            .ok_or_else(|| RecoError::ModelNotTrained(key.to_string()))
    }

    pub fn version(&self, key: &str) -> Option<u64> {
        self.active.get(key).map(|published| published.version)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.active.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Forgets the models of `key`, in-flight requests keep their reference.
    pub fn teardown(&self, key: &str) -> bool {
        let removed = self.active.remove(key).is_some();
        if removed {
            info!("Tore down models for '{}'.", key);
        }
        removed
    }

    pub fn clear(&self) {
        self.active.clear();
        self.pending.clear();
    }

    pub fn recommend(
        &self,
        key: &str,
        model_name: &str,
        user_id: &str,
        top_k: usize,
    ) -> Result<Vec<Recommendation>> {
        self.active(key)?.models.recommend(model_name, user_id, top_k)
    }

    pub fn similar_items(&self, key: &str, item_id: &str, top_k: usize) -> Result<Vec<Recommendation>> {
        self.active(key)?.models.similar_items(item_id, top_k)
    }
}
