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

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use fnv::FnvHashSet;
use serde_derive::{Deserialize, Serialize};
use tracing::info;

use crate::als::{AlsParams, CollaborativeFilteringModel};
use crate::config::Config;
use crate::content::{ContentSimilarityIndex, ItemMetadata, TfidfParams};
use crate::error::{RecoError, Result};
use crate::evaluation::{self, EvaluationSplit, MetricTable};
use crate::hybrid::HybridBlender;
use crate::interactions::{InteractionMatrix, InteractionMatrixBuilder};
use crate::popularity::PopularityBaseline;
use crate::stats::DataDictionary;
use crate::topk::{self, ScoredItem};
use crate::types::{InteractionEvent, ItemProperty, Recommendation};
use crate::utils;

/// Anything that turns a user id into a ranked list of items.
pub trait Recommender {
    fn name(&self) -> &str;
    fn recommend(&self, user_id: &str, top_k: usize) -> Result<Vec<Recommendation>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Popularity,
    Collaborative,
    Content,
    Hybrid,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] =
        [ModelKind::Popularity, ModelKind::Collaborative, ModelKind::Content, ModelKind::Hybrid];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Popularity => "popularity",
            ModelKind::Collaborative => "cf",
            ModelKind::Content => "content",
            ModelKind::Hybrid => "hybrid",
        }
    }
}

impl FromStr for ModelKind {
    type Err = RecoError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "popularity" | "baseline" => Ok(ModelKind::Popularity),
            "cf" => Ok(ModelKind::Collaborative),
            "content" => Ok(ModelKind::Content),
            "hybrid" => Ok(ModelKind::Hybrid),
            other => Err(RecoError::UnknownModel(other.to_string())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything trained from one interaction matrix. Immutable, shared read-only between
/// concurrent requests; retraining produces a new set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainedModelSet {
    config: Config,
    matrix: InteractionMatrix,
    popularity: PopularityBaseline,
    cf: CollaborativeFilteringModel,
    content: ContentSimilarityIndex,
}

/// Trains all models on an existing interaction matrix. Properties of items outside of the
/// matrix' catalog are ignored.
pub fn train(
    matrix: InteractionMatrix,
    properties: &[ItemProperty],
    config: &Config,
) -> Result<TrainedModelSet> {

    config.validate()?;

    let training_start = Instant::now();

    let popularity = PopularityBaseline::fit(&matrix);
    let cf = CollaborativeFilteringModel::fit(
        &matrix, AlsParams::from_config(config), config.worker_threads())?;
    let content = ContentSimilarityIndex::fit(
        matrix.dictionary(), properties, TfidfParams::from_config(config))?;

    info!("Trained all models in {}ms.", utils::to_millis(training_start.elapsed()));

    Ok(TrainedModelSet { config: config.clone(), matrix, popularity, cf, content })
}

/// Builds the interaction matrix, with every item that has properties in the catalog, and
/// trains all models on it.
pub fn train_from_events(
    events: &[InteractionEvent],
    properties: &[ItemProperty],
    config: &Config,
) -> Result<TrainedModelSet> {

    config.validate()?;

    let matrix = InteractionMatrixBuilder::from_config(config)
        .with_catalog(properties.iter().map(|property| property.item_id.as_str()))
        .build(events)?;

    train(matrix, properties, config)
}

/// Trains on the training part of the split and compares all model kinds.
pub fn evaluate_all(
    split: &EvaluationSplit,
    properties: &[ItemProperty],
    config: &Config,
    k: usize,
) -> Result<MetricTable> {

    let models = train_from_events(split.train_events(), properties, config)?;

    let views: Vec<ModelView> = ModelKind::ALL.iter().map(|&kind| models.model(kind)).collect();
    let recommenders: Vec<&dyn Recommender> = views.iter().map(|view| view as &dyn Recommender).collect();

    evaluation::evaluate(&recommenders, split, k)
}

impl TrainedModelSet {

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn matrix(&self) -> &InteractionMatrix {
        &self.matrix
    }

    pub fn dictionary(&self) -> &DataDictionary {
        self.matrix.dictionary()
    }

    pub fn popularity(&self) -> &PopularityBaseline {
        &self.popularity
    }

    pub fn cf(&self) -> &CollaborativeFilteringModel {
        &self.cf
    }

    pub fn content(&self) -> &ContentSimilarityIndex {
        &self.content
    }

    /// A view serving one model kind, blending with the configured alpha.
    pub fn model(&self, kind: ModelKind) -> ModelView<'_> {
        ModelView { models: self, kind, alpha: self.config.blend_alpha }
    }

    pub fn blender(&self, alpha: f64) -> Result<HybridBlender<'_>> {
        HybridBlender::new(
            &self.matrix,
            &self.popularity,
            &self.cf,
            &self.content,
            alpha,
            self.config.blend_candidate_factor,
        )
    }

    pub fn recommend(&self, model_name: &str, user_id: &str, top_k: usize) -> Result<Vec<Recommendation>> {
        let kind: ModelKind = model_name.parse()?;
        self.model(kind).recommend(user_id, top_k)
    }

    /// Blended recommendations for a caller supplied history of item ids.
    pub fn recommend_for_history<S: AsRef<str>>(&self, history: &[S], top_k: usize) -> Result<Vec<Recommendation>> {
        let scored_items = self.blender(self.config.blend_alpha)?.recommend_for_history(history, top_k)?;
        Ok(self.to_recommendations(scored_items))
    }

    pub fn similar_items(&self, item_id: &str, top_k: usize) -> Result<Vec<Recommendation>> {
        let item = self.dictionary().require_item(item_id)?;
        let scored_items = self.content.similar_items(item, top_k)?;
        Ok(self.to_recommendations(scored_items))
    }

    pub fn item_metadata(&self, item_id: &str) -> Result<&ItemMetadata> {
        let item = self.dictionary().require_item(item_id)?;
        self.content.metadata(item)
    }

    fn to_recommendations(&self, scored_items: Vec<ScoredItem>) -> Vec<Recommendation> {
        let data_dict = self.dictionary();
        scored_items.into_iter()
            .map(|scored_item| Recommendation {
                item_id: data_dict.item_name(scored_item.item).to_string(),
                score: scored_item.score,
            })
            .collect()
    }
}

/// One model kind of a `TrainedModelSet`.
pub struct ModelView<'a> {
    models: &'a TrainedModelSet,
    kind: ModelKind,
    alpha: f64,
}

impl<'a> ModelView<'a> {

    pub fn with_alpha(mut self, alpha: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(RecoError::config("blend_alpha", format!("must lie within [0, 1], got {}", alpha)));
        }
        self.alpha = alpha;
        Ok(self)
    }

    fn scored_items(&self, user_id: &str, top_k: usize) -> Result<Vec<ScoredItem>> {
        let models = self.models;
        let user = models.dictionary().user_index(user_id);
        let history = user.map(|user| models.matrix.row(user)).unwrap_or(&[]);

        match self.kind {
            ModelKind::Popularity => {
                if models.popularity.num_items() == 0 {
                    return Err(RecoError::UnknownUser(user_id.to_string()));
                }
                let seen: FnvHashSet<u32> = history.iter().map(|&(item, _)| item).collect();
                Ok(models.popularity.top_k_excluding(top_k, &seen))
            },
            ModelKind::Collaborative => match user {
                Some(user) if models.cf.has_signal(user) => models.cf.top_k(user, top_k, history),
                _ => Err(RecoError::UnknownUser(user_id.to_string())),
            },
            ModelKind::Content => {
                if history.is_empty() {
                    return Err(RecoError::UnknownUser(user_id.to_string()));
                }
                let seeds: Vec<u32> = history.iter().map(|&(item, _)| item).collect();
                let affinities = models.content.affinities(&seeds)?;
                let candidates = affinities.into_iter()
                    .filter(|&(item, _)| seeds.binary_search(&item).is_err())
                    .map(|(item, score)| ScoredItem { item, score });
                Ok(topk::top_k(candidates, top_k))
            },
            ModelKind::Hybrid => models.blender(self.alpha)?.recommend(user_id, top_k),
        }
    }
}

impl<'a> Recommender for ModelView<'a> {

    fn name(&self) -> &str {
        self.kind.name()
    }

    fn recommend(&self, user_id: &str, top_k: usize) -> Result<Vec<Recommendation>> {
        let scored_items = self.scored_items(user_id, top_k)?;
        Ok(self.models.to_recommendations(scored_items))
    }
}
