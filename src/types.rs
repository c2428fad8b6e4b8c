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

use fnv::FnvHashMap;
use serde_derive::{Deserialize, Serialize};

use crate::error::RecoError;

pub type DenseVector = Vec<f64>;

/// Sorted (index, value) pairs
pub type SparseVector = Vec<(u32, f64)>;
pub type SparseMatrix = Vec<SparseVector>;

pub type Accumulator = FnvHashMap<u32, f64>;

pub fn new_dense_vector(dimensions: usize) -> DenseVector {
    vec![0.0; dimensions]
}

pub fn new_sparse_matrix(num_rows: usize) -> SparseMatrix {
    vec![Vec::new(); num_rows]
}

pub fn new_accumulator(capacity: usize) -> Accumulator {
    FnvHashMap::with_capacity_and_hasher(capacity, Default::default())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    View,
    AddToCart,
    Transaction,
}

impl FromStr for EventType {
    type Err = RecoError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "view" => Ok(EventType::View),
            "addtocart" | "add_to_cart" | "cart" => Ok(EventType::AddToCart),
            "transaction" | "purchase" => Ok(EventType::Transaction),
            other => Err(RecoError::data(None, format!("unknown event type '{}'", other))),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EventType::View => "view",
            EventType::AddToCart => "addtocart",
            EventType::Transaction => "transaction",
        };
        f.write_str(name)
    }
}

/// Implicit feedback strength per event type.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventWeights {
    pub view: f64,
    pub add_to_cart: f64,
    pub transaction: f64,
}

impl EventWeights {
    pub fn weight(&self, event_type: EventType) -> f64 {
        match event_type {
            EventType::View => self.view,
            EventType::AddToCart => self.add_to_cart,
            EventType::Transaction => self.transaction,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub user_id: String,
    pub item_id: String,
    pub event_type: EventType,
    pub timestamp: i64,
}

impl InteractionEvent {
    pub fn new(user_id: &str, item_id: &str, event_type: EventType, timestamp: i64) -> Self {
        InteractionEvent {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            event_type,
            timestamp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemProperty {
    pub item_id: String,
    pub name: String,
    pub value: String,
}

impl ItemProperty {
    pub fn new(item_id: &str, name: &str, value: &str) -> Self {
        ItemProperty { item_id: item_id.to_string(), name: name.to_string(), value: value.to_string() }
    }
}

/// One entry of a ranked result list, using the original item identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: String,
    pub score: f64,
}

/// Identifiers must be non-empty and free of control characters.
pub fn check_identifier(kind: &str, id: &str, line: Option<u64>) -> Result<(), RecoError> {
    if id.trim().is_empty() {
        return Err(RecoError::data(line, format!("empty {} id", kind)));
    }
    if id.chars().any(char::is_control) {
        return Err(RecoError::data(line, format!("{} id {:?} contains control characters", kind, id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {

    use super::{check_identifier, EventType, EventWeights};

    #[test]
    fn event_type_aliases() {
        assert_eq!("view".parse::<EventType>().unwrap(), EventType::View);
        assert_eq!("addtocart".parse::<EventType>().unwrap(), EventType::AddToCart);
        assert_eq!("add_to_cart".parse::<EventType>().unwrap(), EventType::AddToCart);
        assert_eq!(" Transaction ".parse::<EventType>().unwrap(), EventType::Transaction);
        assert!("click".parse::<EventType>().is_err());
    }

    #[test]
    fn weights_per_event_type() {
        let weights = EventWeights { view: 1.0, add_to_cart: 3.0, transaction: 5.0 };
        assert_eq!(weights.weight(EventType::View), 1.0);
        assert_eq!(weights.weight(EventType::AddToCart), 3.0);
        assert_eq!(weights.weight(EventType::Transaction), 5.0);
    }

    #[test]
    fn malformed_identifiers() {
        assert!(check_identifier("user", "alice", None).is_ok());
        assert!(check_identifier("user", "  ", Some(1)).is_err());
        assert!(check_identifier("item", "a\tb", Some(2)).is_err());
    }
}
