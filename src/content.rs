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

use std::collections::BTreeMap;

use fnv::FnvHashMap;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{RecoError, Result};
use crate::stats::DataDictionary;
use crate::topk::{ScoredItem, TopK};
use crate::types::{self, check_identifier, DenseVector, ItemProperty, SparseMatrix, SparseVector};

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "been", "but", "by", "for", "from",
    "has", "have", "he", "her", "his", "if", "in", "into", "is", "it", "its", "no", "not", "of",
    "on", "or", "our", "she", "so", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "was", "we", "were", "which", "will", "with", "you", "your",
];

/// Values longer than this are too noisy to be shown as an item attribute
const MAX_ATTRIBUTE_LENGTH: usize = 40;
const MAX_ATTRIBUTES: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TfidfParams {
    pub max_features: usize,
    pub min_df: usize,
    pub max_ngram: usize,
}

impl TfidfParams {

    pub fn from_config(config: &Config) -> Self {
        TfidfParams {
            max_features: config.tfidf_max_features,
            min_df: config.tfidf_min_df,
            max_ngram: config.tfidf_max_ngram,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_features == 0 {
            return Err(RecoError::config("tfidf_max_features", "must be at least 1"));
        }
        if self.min_df == 0 {
            return Err(RecoError::config("tfidf_min_df", "must be at least 1"));
        }
        if self.max_ngram < 1 || self.max_ngram > 3 {
            return Err(RecoError::config(
                "tfidf_max_ngram",
                format!("must be 1, 2 or 3, got {}", self.max_ngram),
            ));
        }
        Ok(())
    }
}

/// Display metadata of an item, derived from its properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub category: Option<String>,
    /// (property name, value) pairs
    pub attributes: Vec<(String, String)>,
}

impl ItemMetadata {

    /// The first property whose name mentions "category" is the category, falling back to the
    /// first value. Up to two short, non-numeric values become attributes.
    fn from_properties(properties: &[&ItemProperty]) -> Self {
        let mut category = None;
        let mut attributes = Vec::new();

        for property in properties {
            if category.is_none() && property.name.to_lowercase().contains("category") {
                category = Some(property.value.clone());
                continue;
            }
            if attributes.len() < MAX_ATTRIBUTES
                && property.value.chars().count() <= MAX_ATTRIBUTE_LENGTH
                && !looks_numeric(&property.value) {
                attributes.push((property.name.clone(), property.value.clone()));
            }
        }

        if category.is_none() {
            category = properties.first().map(|property| property.value.clone());
        }

        ItemMetadata { category, attributes }
    }
}

fn looks_numeric(value: &str) -> bool {
    let stripped: String = value.chars().filter(|&c| c != '.' && c != '-').collect();
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}

/// TF-IDF vectors over the concatenated "name value" text of each item's properties, with
/// cosine similarity between items. Vectors are L2-normalized, so cosine similarity is a dot
/// product. Items without properties have an empty vector and are similar to nothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentSimilarityIndex {
    params: TfidfParams,
    /// Sorted terms, the position of a term is its index
    vocabulary: Vec<String>,
    idf: DenseVector,
    /// One vector per item index, sorted by term index
    vectors: SparseMatrix,
    /// Inverted index: (item, weight) per term, sorted by item index
    postings: SparseMatrix,
    metadata: Vec<ItemMetadata>,
}

impl ContentSimilarityIndex {

    pub fn fit(
        dictionary: &DataDictionary,
        properties: &[ItemProperty],
        params: TfidfParams,
    ) -> Result<Self> {

        params.validate()?;

        let num_items = dictionary.num_items();

        let mut properties_per_item: Vec<Vec<&ItemProperty>> = vec![Vec::new(); num_items];
        let mut num_skipped = 0;

        for (position, property) in properties.iter().enumerate() {
            check_identifier("item", &property.item_id, Some(position as u64 + 1))?;

            match dictionary.item_index(&property.item_id) {
                Some(item) => properties_per_item[item as usize].push(property),
                None => num_skipped += 1,
            }
        }

        if num_skipped > 0 {
            debug!("Skipped {} properties of items outside of the catalog.", num_skipped);
        }

        // Term counts per item
        let documents: Vec<FnvHashMap<String, usize>> = properties_per_item.iter()
            .map(|item_properties| {
                let text = item_properties.iter()
                    .map(|property| format!("{} {}", property.name, property.value))
                    .collect::<Vec<_>>()
                    .join(" ");

                let mut term_counts = FnvHashMap::default();
                for term in terms(&tokenize(&text), params.max_ngram) {
                    *term_counts.entry(term).or_insert(0) += 1;
                }
                term_counts
            })
            .collect();

        let num_documents = properties_per_item.iter().filter(|p| !p.is_empty()).count();

        let mut document_frequencies: FnvHashMap<&str, (usize, usize)> = FnvHashMap::default();
        for term_counts in documents.iter() {
            for (term, count) in term_counts.iter() {
                let entry = document_frequencies.entry(term.as_str()).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += count;
            }
        }

        // Most frequent terms over the corpus, ties by term
        let mut candidates: Vec<(&str, usize, usize)> = document_frequencies.into_iter()
            .filter(|&(_, (df, _))| df >= params.min_df)
            .map(|(term, (df, total))| (term, df, total))
            .collect();
        candidates.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(params.max_features);

        let mut selected: BTreeMap<&str, usize> = BTreeMap::new();
        for &(term, df, _) in candidates.iter() {
            selected.insert(term, df);
        }

        let mut vocabulary = Vec::with_capacity(selected.len());
        let mut idf = types::new_dense_vector(selected.len());
        let mut term_index: FnvHashMap<&str, u32> =
            FnvHashMap::with_capacity_and_hasher(selected.len(), Default::default());

        for (index, (term, df)) in selected.iter().enumerate() {
            vocabulary.push(term.to_string());
            idf[index] = ((1.0 + num_documents as f64) / (1.0 + *df as f64)).ln() + 1.0;
            term_index.insert(*term, index as u32);
        }

        let mut vectors = types::new_sparse_matrix(num_items);
        let mut postings = types::new_sparse_matrix(vocabulary.len());

        for (item, term_counts) in documents.iter().enumerate() {
            let mut vector: SparseVector = term_counts.iter()
                .filter_map(|(term, &count)| {
                    term_index.get(term.as_str())
                        .map(|&index| (index, count as f64 * idf[index as usize]))
                })
                .collect();
            vector.sort_by_key(|&(index, _)| index);

            let norm = vector.iter().map(|&(_, weight)| weight * weight).sum::<f64>().sqrt();
            if norm > 0.0 {
                for entry in vector.iter_mut() {
                    entry.1 /= norm;
                }
            }

            for &(index, weight) in vector.iter() {
                postings[index as usize].push((item as u32, weight));
            }
            vectors[item] = vector;
        }

        let metadata = properties_per_item.iter()
            .map(|item_properties| ItemMetadata::from_properties(item_properties))
            .collect();

        info!(
            "Fitted content index for {} items ({} with properties), vocabulary of {} terms",
            num_items,
            num_documents,
            vocabulary.len(),
        );

        Ok(ContentSimilarityIndex { params, vocabulary, idf, vectors, postings, metadata })
    }

    pub fn params(&self) -> &TfidfParams {
        &self.params
    }

    pub fn num_items(&self) -> usize {
        self.vectors.len()
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    pub fn vector(&self, item: u32) -> Result<&[(u32, f64)]> {
        self.vectors.get(item as usize)
            .map(|vector| vector.as_slice())
            .ok_or_else(|| RecoError::UnknownItem(format!("#{}", item)))
    }

    pub fn has_content(&self, item: u32) -> bool {
        self.vector(item).map(|vector| !vector.is_empty()).unwrap_or(false)
    }

    pub fn metadata(&self, item: u32) -> Result<&ItemMetadata> {
        self.metadata.get(item as usize)
            .ok_or_else(|| RecoError::UnknownItem(format!("#{}", item)))
    }

    pub fn similarity(&self, item_a: u32, item_b: u32) -> Result<f64> {
        Ok(sparse_dot(self.vector(item_a)?, self.vector(item_b)?))
    }

    /// Positive similarities of all other items to `item`, via the inverted index. Shared terms
    /// are visited in ascending term order, which keeps the result exactly symmetric.
    fn similarities(&self, item: u32) -> Result<types::Accumulator> {
        let vector = self.vector(item)?;
        let mut accumulator = types::new_accumulator(vector.len() * 8);

        for &(term, weight) in vector.iter() {
            for &(other_item, other_weight) in self.postings[term as usize].iter() {
                if other_item != item {
                    *accumulator.entry(other_item).or_insert(0.0) += weight * other_weight;
                }
            }
        }

        accumulator.retain(|_, similarity| *similarity > 0.0);
        Ok(accumulator)
    }

    /// The `k` most similar other items, best first with ties by ascending item index. Items
    /// without any shared term fill up the list with similarity zero.
    pub fn similar_items(&self, item: u32, k: usize) -> Result<Vec<ScoredItem>> {
        let accumulator = self.similarities(item)?;

        let mut top = TopK::new(k);
        for (&other_item, &similarity) in accumulator.iter() {
            top.offer(ScoredItem { item: other_item, score: similarity });
        }
        let mut similar = top.into_sorted_vec();

        if similar.len() < k {
            let padding = (0..self.num_items() as u32)
                .filter(|&other_item| other_item != item && !accumulator.contains_key(&other_item))
                .take(k - similar.len())
                .map(|other_item| ScoredItem { item: other_item, score: 0.0 });
            similar.extend(padding);
        }

        Ok(similar)
    }

    /// Like `similar_items`, but only items with a positive similarity.
    pub fn neighbours(&self, item: u32, k: usize) -> Result<Vec<ScoredItem>> {
        let accumulator = self.similarities(item)?;

        let mut top = TopK::new(k);
        for (&other_item, &similarity) in accumulator.iter() {
            top.offer(ScoredItem { item: other_item, score: similarity });
        }
        Ok(top.into_sorted_vec())
    }

    /// Content affinity of every item to a set of seed items: the maximum similarity to any
    /// seed. Only positive affinities are contained, seeds themselves are not excluded.
    pub fn affinities(&self, seeds: &[u32]) -> Result<types::Accumulator> {
        let mut affinities = types::new_accumulator(seeds.len() * 16);

        for &seed in seeds {
            for (other_item, similarity) in self.similarities(seed)? {
                let affinity = affinities.entry(other_item).or_insert(0.0);
                if similarity > *affinity {
                    *affinity = similarity;
                }
            }
        }

        Ok(affinities)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .filter(|token| token.chars().count() >= 2 && !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// All n-grams of consecutive tokens for n in 1..=max_ngram
fn terms(tokens: &[String], max_ngram: usize) -> Vec<String> {
    let mut terms = Vec::with_capacity(tokens.len() * max_ngram);
    for n in 1..=max_ngram {
        for window in tokens.windows(n) {
            terms.push(window.join(" "));
        }
    }
    terms
}

fn sparse_dot(a: &[(u32, f64)], b: &[(u32, f64)]) -> f64 {
    let mut sum = 0.0;
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].0 < b[j].0 {
            i += 1;
        } else if a[i].0 > b[j].0 {
            j += 1;
        } else {
            sum += a[i].1 * b[j].1;
            i += 1;
            j += 1;
        }
    }

    sum
}
