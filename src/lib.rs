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

pub mod error;
pub mod config;
pub mod types;
pub mod utils;
pub mod stats;
pub mod topk;
pub mod interactions;
pub mod popularity;
pub mod als;
pub mod content;
pub mod hybrid;
pub mod models;
pub mod evaluation;
pub mod registry;
pub mod recommend;
pub mod io;


pub use crate::config::Config;
pub use crate::error::{RecoError, Result};
pub use crate::evaluation::{evaluate, EvaluationSplit, MetricTable};
pub use crate::interactions::{InteractionMatrix, InteractionMatrixBuilder};
pub use crate::models::{train, train_from_events, ModelKind, Recommender, TrainedModelSet};
pub use crate::registry::ModelRegistry;
pub use crate::types::{EventType, InteractionEvent, ItemProperty, Recommendation};
