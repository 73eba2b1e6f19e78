//! Stage 4: ingredient × allergy cross-reference.

use std::collections::HashSet;

use crate::models::{AllergyRecord, IngredientName};

/// Ingredients whose name equals a declared allergen, case-insensitively.
///
/// Allergen names go through the same normalization as ingredients
/// (trimmed, whitespace collapsed, lower-cased); no synonyms and no
/// substring matching. Result order follows `ingredients`.
pub fn match_allergies(
    ingredients: &[IngredientName],
    allergies: &[AllergyRecord],
) -> Vec<IngredientName> {
    if allergies.is_empty() {
        return Vec::new();
    }

    let allergens: HashSet<IngredientName> = allergies
        .iter()
        .filter_map(|a| IngredientName::normalize(&a.name))
        .collect();

    ingredients
        .iter()
        .filter(|i| allergens.contains(*i))
        .cloned()
        .collect()
}
