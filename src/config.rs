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

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::error::{RecoError, Result};
use crate::types::EventWeights;

/// All tunable options of the engine. Every field has a documented default, a value is only
/// usable after `validate()` accepted it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub event_weight_view: f64,
    pub event_weight_cart: f64,
    pub event_weight_transaction: f64,

    /// Number of latent factors
    pub cf_rank: usize,
    pub cf_regularization: f64,
    pub cf_iterations: usize,
    /// beta in c_ui = 1 + beta * r_ui
    pub cf_confidence_scale: f64,
    pub cf_seed: u64,

    /// Weight of the collaborative score in the blend, the content score gets 1 - alpha.
    pub blend_alpha: f64,
    /// Candidate pool per source is this factor times the requested number of items.
    pub blend_candidate_factor: usize,
    pub default_top_k: usize,

    pub min_interactions_for_eval: usize,
    pub test_fraction: f64,

    pub min_user_events: usize,
    pub min_item_users: usize,

    pub tfidf_max_features: usize,
    pub tfidf_min_df: usize,
    pub tfidf_max_ngram: usize,

    /// 0 means one thread per cpu
    pub num_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            event_weight_view: 1.0,
            event_weight_cart: 3.0,
            event_weight_transaction: 5.0,
            cf_rank: 40,
            cf_regularization: 0.1,
            cf_iterations: 10,
            cf_confidence_scale: 40.0,
            cf_seed: 42,
            blend_alpha: 0.7,
            blend_candidate_factor: 3,
            default_top_k: 10,
            min_interactions_for_eval: 2,
            test_fraction: 0.2,
            min_user_events: 1,
            min_item_users: 1,
            tfidf_max_features: 5000,
            tfidf_min_df: 1,
            tfidf_max_ngram: 2,
            num_threads: 0,
        }
    }
}

impl Config {

    /// Reads a JSON object of options, missing options keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Config = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        non_negative("event_weight_view", self.event_weight_view)?;
        non_negative("event_weight_cart", self.event_weight_cart)?;
        non_negative("event_weight_transaction", self.event_weight_transaction)?;

        at_least("cf_rank", self.cf_rank, 1)?;
        at_least("cf_iterations", self.cf_iterations, 1)?;
        if !self.cf_regularization.is_finite() || self.cf_regularization <= 0.0 {
            return Err(RecoError::config(
                "cf_regularization",
                format!("must be a positive number, got {}", self.cf_regularization),
            ));
        }
        non_negative("cf_confidence_scale", self.cf_confidence_scale)?;

        if !(0.0..=1.0).contains(&self.blend_alpha) {
            return Err(RecoError::config(
                "blend_alpha",
                format!("must lie within [0, 1], got {}", self.blend_alpha),
            ));
        }
        at_least("blend_candidate_factor", self.blend_candidate_factor, 1)?;
        at_least("default_top_k", self.default_top_k, 1)?;

        at_least("min_interactions_for_eval", self.min_interactions_for_eval, 2)?;
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(RecoError::config(
                "test_fraction",
                format!("must lie strictly between 0 and 1, got {}", self.test_fraction),
            ));
        }

        at_least("min_user_events", self.min_user_events, 1)?;
        at_least("min_item_users", self.min_item_users, 1)?;

        at_least("tfidf_max_features", self.tfidf_max_features, 1)?;
        at_least("tfidf_min_df", self.tfidf_min_df, 1)?;
        if self.tfidf_max_ngram < 1 || self.tfidf_max_ngram > 3 {
            return Err(RecoError::config(
                "tfidf_max_ngram",
                format!("must be 1, 2 or 3, got {}", self.tfidf_max_ngram),
            ));
        }

        Ok(())
    }

    pub fn event_weights(&self) -> EventWeights {
        EventWeights {
            view: self.event_weight_view,
            add_to_cart: self.event_weight_cart,
            transaction: self.event_weight_transaction,
        }
    }

    pub fn worker_threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get()
        } else {
            self.num_threads
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Result<Self> {
        self.blend_alpha = alpha;
        self.validate()?;
        Ok(self)
    }
}

fn non_negative(option: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RecoError::config(option, format!("must be a non-negative number, got {}", value)))
    }
}

fn at_least(option: &'static str, value: usize, minimum: usize) -> Result<()> {
    if value >= minimum {
        Ok(())
    } else {
        Err(RecoError::config(option, format!("must be at least {}, got {}", minimum, value)))
    }
}

#[cfg(test)]
mod tests {

    use std::io::Write;

    use super::Config;
    use crate::error::RecoError;

    fn rejected_option(config: Config) -> &'static str {
        match config.validate() {
            Err(RecoError::Config { option, .. }) => option,
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cf_rank, 40);
        assert_eq!(config.blend_alpha, 0.7);
    }

    #[test]
    fn out_of_range_options_are_rejected() {
        assert_eq!(rejected_option(Config { blend_alpha: 1.2, ..Config::default() }), "blend_alpha");
        assert_eq!(rejected_option(Config { blend_alpha: -0.1, ..Config::default() }), "blend_alpha");
        assert_eq!(rejected_option(Config { cf_rank: 0, ..Config::default() }), "cf_rank");
        assert_eq!(
            rejected_option(Config { event_weight_cart: -3.0, ..Config::default() }),
            "event_weight_cart"
        );
        assert_eq!(
            rejected_option(Config { cf_regularization: 0.0, ..Config::default() }),
            "cf_regularization"
        );
        assert_eq!(rejected_option(Config { test_fraction: 1.0, ..Config::default() }), "test_fraction");
        assert_eq!(
            rejected_option(Config { min_interactions_for_eval: 1, ..Config::default() }),
            "min_interactions_for_eval"
        );
        assert_eq!(rejected_option(Config { tfidf_max_ngram: 4, ..Config::default() }), "tfidf_max_ngram");
    }

    #[test]
    fn alpha_boundaries_are_accepted() {
        assert!(Config::default().with_alpha(0.0).is_ok());
        assert!(Config::default().with_alpha(1.0).is_ok());
        assert!(Config::default().with_alpha(1.0001).is_err());
    }

    #[test]
    fn json_files_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"cf_rank\": 8, \"blend_alpha\": 0.3}}").unwrap();

        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.cf_rank, 8);
        assert_eq!(config.blend_alpha, 0.3);
        assert_eq!(config.cf_iterations, 10);
    }

    #[test]
    fn json_files_with_invalid_or_unknown_options_fail() {
        let mut invalid = tempfile::NamedTempFile::new().unwrap();
        write!(invalid, "{{\"blend_alpha\": 2.0}}").unwrap();
        assert!(Config::from_json_file(invalid.path()).is_err());

        let mut unknown = tempfile::NamedTempFile::new().unwrap();
        write!(unknown, "{{\"cf_factors\": 8}}").unwrap();
        assert!(Config::from_json_file(unknown.path()).is_err());
    }
}
