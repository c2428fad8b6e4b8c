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

use fnv::FnvHashSet;
use serde_derive::{Deserialize, Serialize};
use tracing::info;

use crate::interactions::InteractionMatrix;
use crate::topk::{self, ScoredItem};

/// Non-personalized ranking of items by their aggregate interaction weight. Serves as fallback
/// for users without any usable history and as comparison baseline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopularityBaseline {
    /// All items with positive weight, most popular first, ties by ascending item index
    ranking: Vec<ScoredItem>,
}

impl PopularityBaseline {

    pub fn fit(matrix: &InteractionMatrix) -> Self {
        let scored_items = matrix.column_sums()
            .into_iter()
            .enumerate()
            .filter(|&(_, weight)| weight > 0.0)
            .map(|(item, weight)| ScoredItem { item: item as u32, score: weight })
            .collect();

        let ranking = topk::rank(scored_items);

        info!("Fitted popularity baseline on {} items.", ranking.len());

        PopularityBaseline { ranking }
    }

    pub fn num_items(&self) -> usize {
        self.ranking.len()
    }

    /// The same list for everyone
    pub fn top_k(&self, k: usize) -> &[ScoredItem] {
        &self.ranking[..k.min(self.ranking.len())]
    }

    /// Most popular items not contained in `excluded`.
    pub fn top_k_excluding(&self, k: usize, excluded: &FnvHashSet<u32>) -> Vec<ScoredItem> {
        self.ranking.iter()
            .filter(|scored_item| !excluded.contains(&scored_item.item))
            .take(k)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {

    use fnv::FnvHashSet;

    use super::PopularityBaseline;
    use crate::interactions::InteractionMatrixBuilder;
    use crate::types::{EventType, EventWeights, InteractionEvent};

    fn baseline() -> (PopularityBaseline, crate::interactions::InteractionMatrix) {
        let weights = EventWeights { view: 1.0, add_to_cart: 3.0, transaction: 5.0 };
        let events = vec![
            InteractionEvent::new("u1", "d", EventType::Transaction, 1),
            InteractionEvent::new("u1", "b", EventType::AddToCart, 2),
            InteractionEvent::new("u2", "c", EventType::AddToCart, 3),
            InteractionEvent::new("u2", "a", EventType::View, 4),
            InteractionEvent::new("u3", "a", EventType::View, 5),
        ];
        let matrix = InteractionMatrixBuilder::new(weights)
            .with_catalog(vec!["cold"])
            .build(&events)
            .unwrap();

        (PopularityBaseline::fit(&matrix), matrix)
    }

    #[test]
    fn ranks_by_weight_with_ties_by_item_id() {
        let (popularity, matrix) = baseline();
        let data_dict = matrix.dictionary();

        let names: Vec<&str> = popularity.top_k(10).iter()
            .map(|scored_item| data_dict.item_name(scored_item.item))
            .collect();

        // d=5, b=3, c=3, a=2; the cold item has no weight
        assert_eq!(names, vec!["d", "b", "c", "a"]);
        assert_eq!(popularity.num_items(), 4);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let (popularity, _) = baseline();
        assert_eq!(popularity.top_k(3), popularity.top_k(3));
        assert_eq!(popularity.top_k(2).len(), 2);
    }

    #[test]
    fn excluded_items_are_skipped() {
        let (popularity, matrix) = baseline();
        let data_dict = matrix.dictionary();

        let mut excluded = FnvHashSet::default();
        excluded.insert(data_dict.item_index("d").unwrap());

        let top = popularity.top_k_excluding(2, &excluded);
        assert_eq!(data_dict.item_name(top[0].item), "b");
        assert_eq!(data_dict.item_name(top[1].item), "c");
    }
}
