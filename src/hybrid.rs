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

use fnv::FnvHashSet;
use tracing::debug;

use crate::als::CollaborativeFilteringModel;
use crate::content::ContentSimilarityIndex;
use crate::error::{RecoError, Result};
use crate::interactions::InteractionMatrix;
use crate::popularity::PopularityBaseline;
use crate::topk::{self, ScoredItem};

/// Linear blend of collaborative and content scores with a deterministic fallback chain:
///
/// * known user with factors: CF top-N plus content neighbours of the history, both scores
///   min-max normalized over the candidates, `alpha * cf + (1 - alpha) * content`. Without any
///   content signal among the candidates, the CF ranking is used as is.
/// * user without factors but with known history: content affinity to that history.
/// * no usable history at all: the popularity ranking.
///
/// Items from the user's history are never recommended.
pub struct HybridBlender<'a> {
    matrix: &'a InteractionMatrix,
    popularity: &'a PopularityBaseline,
    cf: &'a CollaborativeFilteringModel,
    content: &'a ContentSimilarityIndex,
    alpha: f64,
    candidate_factor: usize,
}

impl<'a> HybridBlender<'a> {

    pub fn new(
        matrix: &'a InteractionMatrix,
        popularity: &'a PopularityBaseline,
        cf: &'a CollaborativeFilteringModel,
        content: &'a ContentSimilarityIndex,
        alpha: f64,
        candidate_factor: usize,
    ) -> Result<Self> {

        if !(0.0..=1.0).contains(&alpha) {
            return Err(RecoError::config("blend_alpha", format!("must lie within [0, 1], got {}", alpha)));
        }
        if candidate_factor == 0 {
            return Err(RecoError::config("blend_candidate_factor", "must be at least 1"));
        }

        Ok(HybridBlender { matrix, popularity, cf, content, alpha, candidate_factor })
    }

    pub fn recommend(&self, user_id: &str, k: usize) -> Result<Vec<ScoredItem>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        match self.matrix.dictionary().user_index(user_id) {
            Some(user) if self.cf.has_signal(user) => self.blend(user, self.matrix.row(user), k),
            Some(user) => {
                debug!("User {} has no latent factors, falling back to content.", user_id);
                let history: Vec<u32> = self.matrix.row(user).iter().map(|&(item, _)| item).collect();
                self.cold_start(user_id, &history, k)
            },
            None => {
                debug!("User {} is unknown, falling back to popularity.", user_id);
                self.cold_start(user_id, &[], k)
            },
        }
    }

    /// Recommendations for someone outside of the training data, given the identifiers of items
    /// they interacted with. Unknown items in the history are ignored.
    pub fn recommend_for_history<S: AsRef<str>>(&self, history: &[S], k: usize) -> Result<Vec<ScoredItem>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let data_dict = self.matrix.dictionary();
        let known: BTreeSet<u32> = history.iter()
            .filter_map(|item_id| data_dict.item_index(item_id.as_ref()))
            .collect();
        let known: Vec<u32> = known.into_iter().collect();

        self.cold_start("<anonymous>", &known, k)
    }

    fn blend(&self, user: u32, history: &[(u32, f64)], k: usize) -> Result<Vec<ScoredItem>> {

        let pool_size = self.candidate_factor.saturating_mul(k).min(self.matrix.num_items());

        let cf_top = self.cf.top_k(user, pool_size, history)?;

        let history_items: Vec<u32> = history.iter().map(|&(item, _)| item).collect();
        let seen: FnvHashSet<u32> = history_items.iter().cloned().collect();

        let mut candidates: BTreeSet<u32> = cf_top.iter().map(|scored_item| scored_item.item).collect();
        for &item in history_items.iter() {
            for neighbour in self.content.neighbours(item, pool_size.saturating_add(history_items.len()))? {
                if !seen.contains(&neighbour.item) {
                    candidates.insert(neighbour.item);
                }
            }
        }

        let candidates: Vec<u32> = candidates.into_iter().collect();

        let mut content_scores = Vec::with_capacity(candidates.len());
        for &candidate in candidates.iter() {
            let mut affinity: f64 = 0.0;
            for &item in history_items.iter() {
                affinity = affinity.max(self.content.similarity(item, candidate)?);
            }
            content_scores.push(affinity);
        }

        if content_scores.iter().all(|&score| score <= 0.0) {
            debug!("No content signal for user #{}, using collaborative scores only.", user);
            return Ok(cf_top.into_iter().take(k).collect());
        }

        let mut cf_scores = Vec::with_capacity(candidates.len());
        for &candidate in candidates.iter() {
            cf_scores.push(self.cf.score(user, candidate)?);
        }

        min_max_normalize(&mut cf_scores);
        min_max_normalize(&mut content_scores);

        let alpha = self.alpha;
        let blended = candidates.iter()
            .zip(cf_scores.iter().zip(content_scores.iter()))
            .map(|(&item, (&cf_score, &content_score))| ScoredItem {
                item,
                score: alpha * cf_score + (1.0 - alpha) * content_score,
            });

        Ok(topk::top_k(blended, k))
    }

    fn cold_start(&self, label: &str, history: &[u32], k: usize) -> Result<Vec<ScoredItem>> {

        let seen: FnvHashSet<u32> = history.iter().cloned().collect();

        if !history.is_empty() {
            let affinities = self.content.affinities(history)?;
            let by_content = topk::top_k(
                affinities.into_iter()
                    .filter(|(item, _)| !seen.contains(item))
                    .map(|(item, score)| ScoredItem { item, score }),
                k,
            );

            if !by_content.is_empty() {
                return Ok(by_content);
            }
            debug!("No content neighbours for the history of {}, using popularity.", label);
        }

        let popular = self.popularity.top_k_excluding(k, &seen);
        if popular.is_empty() && self.popularity.num_items() == 0 {
            return Err(RecoError::UnknownUser(label.to_string()));
        }

        Ok(popular)
    }
}

/// Rescales onto [0, 1]. A constant list maps to all zeros.
pub fn min_max_normalize(scores: &mut [f64]) {
    let min = scores.iter().cloned().fold(std::f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(std::f64::NEG_INFINITY, f64::max);
    let range = max - min;

    for score in scores.iter_mut() {
        *score = if range > 0.0 { (*score - min) / range } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {

    use super::{min_max_normalize, HybridBlender};
    use crate::als::{AlsParams, CollaborativeFilteringModel};
    use crate::content::{ContentSimilarityIndex, TfidfParams};
    use crate::error::RecoError;
    use crate::interactions::{InteractionMatrix, InteractionMatrixBuilder};
    use crate::popularity::PopularityBaseline;
    use crate::topk::ScoredItem;
    use crate::types::{EventType, EventWeights, InteractionEvent, ItemProperty};

    struct Fixture {
        matrix: InteractionMatrix,
        popularity: PopularityBaseline,
        cf: CollaborativeFilteringModel,
        content: ContentSimilarityIndex,
    }

    impl Fixture {
        fn blender(&self, alpha: f64) -> HybridBlender<'_> {
            HybridBlender::new(&self.matrix, &self.popularity, &self.cf, &self.content, alpha, 3).unwrap()
        }
    }

    fn properties() -> Vec<ItemProperty> {
        let mut properties = Vec::new();
        for (item, text) in &[
            ("i1", "red cotton shirt"),
            ("i2", "red cotton dress"),
            ("i3", "blue cotton shirt"),
            ("i4", "red silk dress"),
            ("i5", "blue denim jeans"),
            ("i6", "black denim jacket"),
            ("i7", "red cotton scarf"),
            ("i8", "green wool scarf"),
        ] {
            properties.push(ItemProperty::new(item, "title", text));
        }
        properties.push(ItemProperty::new("cold", "title", "red cotton socks"));
        properties
    }

    fn fixture() -> Fixture {
        let weights = EventWeights { view: 1.0, add_to_cart: 3.0, transaction: 5.0 };
        let mut events = Vec::new();
        let histories: &[(&str, &[&str])] = &[
            ("u1", &["i1", "i2", "i3"]),
            ("u2", &["i1", "i4", "i7"]),
            ("u3", &["i5", "i6"]),
            ("u4", &["i5", "i6", "i8"]),
            ("u5", &["i2", "i4"]),
            ("u6", &["i3", "i5", "i8"]),
        ];
        for &(user, items) in histories {
            for (timestamp, item) in items.iter().enumerate() {
                events.push(InteractionEvent::new(user, item, EventType::View, timestamp as i64));
            }
        }
        events.push(InteractionEvent::new("u1", "i1", EventType::Transaction, 10));

        let properties = properties();
        let matrix = InteractionMatrixBuilder::new(weights)
            .with_catalog(properties.iter().map(|property| property.item_id.as_str()))
            .build(&events)
            .unwrap();

        let params = AlsParams { rank: 4, regularization: 0.1, iterations: 10, confidence_scale: 5.0, seed: 3 };
        let cf = CollaborativeFilteringModel::fit(&matrix, params, 2).unwrap();
        let tfidf = TfidfParams { max_features: 100, min_df: 1, max_ngram: 1 };
        let content = ContentSimilarityIndex::fit(matrix.dictionary(), &properties, tfidf).unwrap();
        let popularity = PopularityBaseline::fit(&matrix);

        Fixture { matrix, popularity, cf, content }
    }

    fn items(scored_items: &[ScoredItem]) -> Vec<u32> {
        scored_items.iter().map(|scored_item| scored_item.item).collect()
    }

    #[test]
    fn normalization() {
        let mut scores = vec![2.0, 4.0, 3.0];
        min_max_normalize(&mut scores);
        assert_eq!(scores, vec![0.0, 1.0, 0.5]);

        let mut constant = vec![0.7, 0.7];
        min_max_normalize(&mut constant);
        assert_eq!(constant, vec![0.0, 0.0]);
    }

    #[test]
    fn alpha_one_equals_collaborative_ranking() {
        let fixture = fixture();
        let blender = fixture.blender(1.0);

        for user_id in &["u1", "u2", "u3", "u5"] {
            let user = fixture.matrix.dictionary().user_index(user_id).unwrap();
            let expected = fixture.cf.top_k(user, 3, fixture.matrix.row(user)).unwrap();
            let blended = blender.recommend(user_id, 3).unwrap();

            assert_eq!(items(&blended), items(&expected));
        }
    }

    #[test]
    fn alpha_zero_equals_content_ranking() {
        let fixture = fixture();
        let blender = fixture.blender(0.0);
        let data_dict = fixture.matrix.dictionary();

        // u2 saw red items, which have several content neighbours
        let user = data_dict.user_index("u2").unwrap();
        let history: Vec<u32> = fixture.matrix.row(user).iter().map(|&(item, _)| item).collect();
        let affinities = fixture.content.affinities(&history).unwrap();
        let expected = crate::topk::top_k(
            affinities.into_iter()
                .filter(|(item, _)| !history.contains(item))
                .map(|(item, score)| ScoredItem { item, score }),
            2,
        );
        assert_eq!(expected.len(), 2);

        let blended = blender.recommend("u2", 2).unwrap();
        assert_eq!(items(&blended), items(&expected));
    }

    #[test]
    fn history_is_never_recommended() {
        let fixture = fixture();

        for alpha in &[0.0, 0.3, 0.7, 1.0] {
            let blender = fixture.blender(*alpha);
            for user_id in fixture.matrix.dictionary().user_names() {
                let user = fixture.matrix.dictionary().user_index(user_id).unwrap();
                let recommended = blender.recommend(user_id, 5).unwrap();

                assert!(recommended.len() <= 5);
                for scored_item in recommended {
                    assert!(!fixture.matrix.contains(user, scored_item.item));
                }
            }
        }
    }

    fn content_ranking(fixture: &Fixture, user_id: &str, k: usize) -> Vec<ScoredItem> {
        let user = fixture.matrix.dictionary().user_index(user_id).unwrap();
        let history: Vec<u32> = fixture.matrix.row(user).iter().map(|&(item, _)| item).collect();
        let affinities = fixture.content.affinities(&history).unwrap();
        crate::topk::top_k(
            affinities.into_iter()
                .filter(|(item, _)| !history.contains(item))
                .map(|(item, score)| ScoredItem { item, score }),
            k,
        )
    }

    #[test]
    fn more_requested_than_available_returns_every_novel_item() {
        let fixture = fixture();
        let data_dict = fixture.matrix.dictionary();

        for alpha in &[0.0, 0.7, 1.0] {
            let blender = fixture.blender(*alpha);
            for user_id in &["u1", "u3"] {
                let user = data_dict.user_index(user_id).unwrap();
                let mut recommended = items(&blender.recommend(user_id, 100).unwrap());
                recommended.sort();

                let novel: Vec<u32> = (0..data_dict.num_items() as u32)
                    .filter(|&item| !fixture.matrix.contains(user, item))
                    .collect();

                assert_eq!(recommended, novel);
            }
        }

        // only items anyone interacted with are popular, "cold" is not
        let recommended = fixture.blender(0.7).recommend("stranger", 100).unwrap();
        assert_eq!(recommended.len(), 8);
        assert_eq!(items(&recommended), items(fixture.popularity.top_k(100)));
    }

    #[test]
    fn huge_requests_do_not_overflow() {
        let fixture = fixture();
        let blender = fixture.blender(0.7);

        assert_eq!(blender.recommend("u1", usize::MAX).unwrap().len(), 6);
        assert_eq!(blender.recommend("stranger", usize::MAX).unwrap().len(), 8);
        let for_history = blender.recommend_for_history(&["cold"], usize::MAX).unwrap();
        assert!(!for_history.is_empty() && for_history.len() <= 8);
    }

    #[test]
    fn known_users_without_factors_get_content_scores() {
        let fixture = fixture();
        let user = fixture.matrix.dictionary().user_index("u2").unwrap() as usize;

        // same model, but u2 ended up with all zero factors
        let rank = fixture.cf.rank();
        let mut stored = serde_json::to_value(&fixture.cf).unwrap();
        let user_factors = stored["user_factors"].as_array_mut().unwrap();
        for factor in user_factors[user * rank..(user + 1) * rank].iter_mut() {
            *factor = serde_json::json!(0.0);
        }
        let cf: CollaborativeFilteringModel = serde_json::from_value(stored).unwrap();
        assert!(!cf.has_signal(user as u32));

        let blender = HybridBlender::new(
            &fixture.matrix, &fixture.popularity, &cf, &fixture.content, 0.7, 3).unwrap();

        let expected = content_ranking(&fixture, "u2", 3);
        assert!(!expected.is_empty());
        assert_eq!(blender.recommend("u2", 3).unwrap(), expected);
    }

    #[test]
    fn unknown_users_get_popular_items() {
        let fixture = fixture();
        let blender = fixture.blender(0.7);

        let recommended = blender.recommend("stranger", 3).unwrap();
        assert_eq!(items(&recommended), items(fixture.popularity.top_k(3)));
    }

    #[test]
    fn explicit_histories_use_content() {
        let fixture = fixture();
        let blender = fixture.blender(0.7);
        let data_dict = fixture.matrix.dictionary();

        let recommended = blender.recommend_for_history(&["cold", "not-an-item"], 3).unwrap();
        let cold = data_dict.item_index("cold").unwrap();

        assert!(!recommended.is_empty());
        assert!(recommended.iter().all(|scored_item| scored_item.item != cold));
        // red cotton items first
        let first = data_dict.item_name(recommended[0].item);
        assert!(first == "i1" || first == "i2" || first == "i7");

        let only_unknown = blender.recommend_for_history(&["not-an-item"], 2).unwrap();
        assert_eq!(items(&only_unknown), items(fixture.popularity.top_k(2)));
    }

    #[test]
    fn zero_requested_items() {
        let fixture = fixture();
        assert!(fixture.blender(0.5).recommend("u1", 0).unwrap().is_empty());
    }

    #[test]
    fn invalid_alpha_is_rejected() {
        let fixture = fixture();
        let result = HybridBlender::new(
            &fixture.matrix, &fixture.popularity, &fixture.cf, &fixture.content, 1.5, 3);

        match result {
            Err(RecoError::Config { option, .. }) => assert_eq!(option, "blend_alpha"),
            Err(other) => panic!("expected a configuration error, got {:?}", other),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn empty_catalog_fails() {
        let weights = EventWeights { view: 1.0, add_to_cart: 3.0, transaction: 5.0 };
        let matrix = InteractionMatrixBuilder::new(weights).build(&[]).unwrap();
        let params = AlsParams { rank: 2, regularization: 0.1, iterations: 1, confidence_scale: 1.0, seed: 1 };
        let cf = CollaborativeFilteringModel::fit(&matrix, params, 1).unwrap();
        let tfidf = TfidfParams { max_features: 10, min_df: 1, max_ngram: 1 };
        let content = ContentSimilarityIndex::fit(matrix.dictionary(), &[], tfidf).unwrap();
        let popularity = PopularityBaseline::fit(&matrix);

        let blender = HybridBlender::new(&matrix, &popularity, &cf, &content, 0.7, 3).unwrap();

        match blender.recommend("anyone", 3) {
            Err(RecoError::UnknownUser(user)) => assert_eq!(user, "anyone"),
            other => panic!("expected an unknown user, got {:?}", other),
        }
    }
}
