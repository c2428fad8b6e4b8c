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

use scoped_pool::Pool;
use serde_derive::Serialize;
use tracing::info;

use crate::error::{RecoError, Result};
use crate::models::Recommender;
use crate::types::Recommendation;
use crate::utils;

const USERS_PER_JOB: usize = 128;

/// Struct used for JSON serialization of the computed recommendations. Field names will be used
/// in JSON.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserRecommendations {
    pub for_user: String,
    pub recommended_items: Vec<Recommendation>,
}

/// Computes `num_items_to_recommend` items for every user across a pool of `pool_size` threads.
/// The output follows the order of `user_ids`. Users the recommender cannot serve get an empty
/// list.
pub fn recommend_all<R>(
    recommender: &R,
    user_ids: &[String],
    num_items_to_recommend: usize,
    pool_size: usize,
) -> Result<Vec<UserRecommendations>>
    where R: Recommender + Sync + ?Sized {

    let batch_start = Instant::now();

    let mut recommendations: Vec<UserRecommendations> = user_ids.iter()
        .map(|user_id| UserRecommendations { for_user: user_id.clone(), recommended_items: Vec::new() })
        .collect();

    let failure: Mutex<Option<RecoError>> = Mutex::new(None);
    let pool = Pool::new(pool_size.max(1));

    pool.scoped(|scope| {
        for block in recommendations.chunks_mut(USERS_PER_JOB) {

            let reference_to_failure = &failure;

            scope.execute(move || {
                for entry in block.iter_mut() {
                    match recommender.recommend(&entry.for_user, num_items_to_recommend) {
                        Ok(items) => entry.recommended_items = items,
                        Err(ref error) if error.is_unknown_identifier() => {},
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

    pool.shutdown();

    let failure = failure.into_inner()
        .map_err(|_| RecoError::NumericalFailure("recommendation worker panicked".to_string()))?;
    if let Some(error) = failure {
        return Err(error);
    }

    info!(
        "Computed {} recommendations each for {} users in {}ms using {} model",
        num_items_to_recommend,
        user_ids.len(),
        utils::to_millis(batch_start.elapsed()),
        recommender.name(),
    );

    Ok(recommendations)
}

#[cfg(test)]
mod tests {

    use super::recommend_all;
    use crate::error::{RecoError, Result};
    use crate::models::Recommender;
    use crate::types::Recommendation;

    /// Recommends the user id itself, knows only users starting with "u"
    struct Echo;

    impl Recommender for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn recommend(&self, user_id: &str, top_k: usize) -> Result<Vec<Recommendation>> {
            if !user_id.starts_with('u') {
                return Err(RecoError::UnknownUser(user_id.to_string()));
            }
            Ok(vec![Recommendation { item_id: user_id.to_string(), score: 1.0 }; top_k])
        }
    }

    struct Broken;

    impl Recommender for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn recommend(&self, _: &str, _: usize) -> Result<Vec<Recommendation>> {
            Err(RecoError::NumericalFailure("broken".to_string()))
        }
    }

    #[test]
    fn keeps_user_order_across_threads() {
        let user_ids: Vec<String> = (0..1000).map(|user| format!("u{}", user)).collect();

        let recommendations = recommend_all(&Echo, &user_ids, 2, 4).unwrap();

        assert_eq!(recommendations.len(), 1000);
        for (user_id, entry) in user_ids.iter().zip(recommendations.iter()) {
            assert_eq!(&entry.for_user, user_id);
            assert_eq!(entry.recommended_items.len(), 2);
            assert_eq!(&entry.recommended_items[0].item_id, user_id);
        }
    }

    #[test]
    fn unknown_users_get_empty_lists() {
        let user_ids = vec!["u1".to_string(), "stranger".to_string()];
        let recommendations = recommend_all(&Echo, &user_ids, 1, 2).unwrap();

        assert_eq!(recommendations[0].recommended_items.len(), 1);
        assert!(recommendations[1].recommended_items.is_empty());
    }

    #[test]
    fn other_failures_are_reported() {
        let user_ids = vec!["u1".to_string()];
        assert!(recommend_all(&Broken, &user_ids, 1, 2).is_err());
    }
}
