use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::utils::constants::{FIELD_INGREDIENTS, FIELD_STEPS};

/// The field map stored under a recipe name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeFields {
    pub ingredients: String,
    pub steps: String,
}

impl RecipeFields {
    pub fn new(ingredients: impl Into<String>, steps: impl Into<String>) -> Self {
        Self {
            ingredients: ingredients.into(),
            steps: steps.into(),
        }
    }

    /// Field/value pairs in the order they are written to the hash.
    pub fn to_pairs(&self) -> [(&'static str, &str); 2] {
        [
            (FIELD_INGREDIENTS, self.ingredients.as_str()),
            (FIELD_STEPS, self.steps.as_str()),
        ]
    }

    /// Builds fields from an `HGETALL` reply. Unknown fields are ignored and
    /// missing ones read as empty.
    pub fn from_hash(mut map: HashMap<String, String>) -> Self {
        Self {
            ingredients: map.remove(FIELD_INGREDIENTS).unwrap_or_default(),
            steps: map.remove(FIELD_STEPS).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipe {
    pub name: String,
    #[serde(flatten)]
    pub fields: RecipeFields,
}
