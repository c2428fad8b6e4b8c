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

use crate::error::{RecoError, Result};

/// Bijective mapping between the original string identifiers and consecutive integer indices.
/// Indices are assigned in ascending identifier order, so comparing indices compares identifiers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataDictionary {
    user_dict: FnvHashMap<String, u32>,
    item_dict: FnvHashMap<String, u32>,
    user_names: Vec<String>,
    item_names: Vec<String>,
    num_interactions: u64,
}

impl DataDictionary {

    pub fn num_users(&self) -> usize {
        self.user_names.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_names.len()
    }

    pub fn num_interactions(&self) -> u64 {
        self.num_interactions
    }

    pub fn user_index(&self, name: &str) -> Option<u32> {
        self.user_dict.get(name).cloned()
    }

    pub fn item_index(&self, name: &str) -> Option<u32> {
        self.item_dict.get(name).cloned()
    }

    pub fn require_user(&self, name: &str) -> Result<u32> {
        self.user_index(name).ok_or_else(|| RecoError::UnknownUser(name.to_string()))
    }

    pub fn require_item(&self, name: &str) -> Result<u32> {
        self.item_index(name).ok_or_else(|| RecoError::UnknownItem(name.to_string()))
    }

    pub fn user_name(&self, user_index: u32) -> &str {
        &self.user_names[user_index as usize]
    }

    pub fn item_name(&self, item_index: u32) -> &str {
        &self.item_names[item_index as usize]
    }

    pub fn user_names(&self) -> &[String] {
        &self.user_names
    }

    pub fn item_names(&self) -> &[String] {
        &self.item_names
    }
}

impl DataDictionary {

    pub fn from(users: BTreeSet<String>, items: BTreeSet<String>, num_interactions: u64) -> Self {

        let mut user_dict: FnvHashMap<String, u32> =
            FnvHashMap::with_capacity_and_hasher(users.len(), Default::default());
        let mut item_dict: FnvHashMap<String, u32> =
            FnvHashMap::with_capacity_and_hasher(items.len(), Default::default());

        let user_names: Vec<String> = users.into_iter().collect();
        let item_names: Vec<String> = items.into_iter().collect();

        for (user_index, user) in user_names.iter().enumerate() {
            user_dict.insert(user.clone(), user_index as u32);
        }

        for (item_index, item) in item_names.iter().enumerate() {
            item_dict.insert(item.clone(), item_index as u32);
        }

        DataDictionary { user_dict, item_dict, user_names, item_names, num_interactions }
    }
}

#[cfg(test)]
mod tests {

    use std::collections::BTreeSet;

    use super::DataDictionary;
    use crate::error::RecoError;

    fn names(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn indices_follow_identifier_order() {
        let data_dict = DataDictionary::from(names(&["carol", "alice", "bob"]), names(&["z", "a"]), 7);

        assert_eq!(data_dict.num_users(), 3);
        assert_eq!(data_dict.num_items(), 2);
        assert_eq!(data_dict.num_interactions(), 7);

        assert_eq!(data_dict.user_index("alice"), Some(0));
        assert_eq!(data_dict.user_index("carol"), Some(2));
        assert_eq!(data_dict.item_index("a"), Some(0));
        assert_eq!(data_dict.item_name(1), "z");
        assert_eq!(data_dict.user_name(1), "bob");
    }

    #[test]
    fn mapping_is_bijective() {
        let data_dict = DataDictionary::from(names(&["u1", "u2", "u3"]), names(&["i1", "i2"]), 0);

        for (index, name) in data_dict.user_names().iter().enumerate() {
            assert_eq!(data_dict.user_index(name), Some(index as u32));
        }
        for (index, name) in data_dict.item_names().iter().enumerate() {
            assert_eq!(data_dict.item_index(name), Some(index as u32));
        }
    }

    #[test]
    fn unknown_identifiers() {
        let data_dict = DataDictionary::from(names(&["u1"]), names(&["i1"]), 1);

        match data_dict.require_user("nobody") {
            Err(RecoError::UnknownUser(user)) => assert_eq!(user, "nobody"),
            other => panic!("unexpected {:?}", other),
        }
        match data_dict.require_item("nothing") {
            Err(RecoError::UnknownItem(item)) => assert_eq!(item, "nothing"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
