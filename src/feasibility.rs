//! Recipe feasibility scoring: how ready each recipe is to cook from stock.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::Recipe;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSuggestion {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub match_percentage: f64,
}

/// Score recipes by the share of their ingredients fully covered by stock.
///
/// An ingredient counts as covered only when the pantry holds at least the
/// required quantity. Recipes without ingredients are left out. Results are
/// sorted by percentage descending, then by name and id.
pub fn score_recipes<'a, I>(recipes: I, pantry: &HashMap<i64, f64>) -> Vec<RecipeSuggestion>
where
    I: IntoIterator<Item = &'a Recipe>,
{
    let mut suggestions: Vec<RecipeSuggestion> = recipes
        .into_iter()
        .filter(|recipe| !recipe.ingredients.is_empty())
        .map(|recipe| {
            let total = recipe.ingredients.len();
            let covered = recipe
                .ingredients
                .iter()
                .filter(|line| {
                    pantry
                        .get(&line.ingredient_id)
                        .is_some_and(|stock| *stock >= line.quantity_required)
                })
                .count();

            RecipeSuggestion {
                recipe_id: recipe.id,
                recipe_name: recipe.name.clone(),
                match_percentage: covered as f64 / total as f64 * 100.0,
            }
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.match_percentage
            .partial_cmp(&a.match_percentage)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.recipe_name.to_lowercase().cmp(&b.recipe_name.to_lowercase()))
            .then(a.recipe_id.cmp(&b.recipe_id))
    });

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecipeLine;

    fn recipe(id: i64, name: &str, lines: &[(i64, f64)]) -> Recipe {
        Recipe {
            id,
            name: name.to_string(),
            instructions: String::new(),
            ingredients: lines
                .iter()
                .map(|(ingredient_id, quantity_required)| RecipeLine {
                    ingredient_id: *ingredient_id,
                    name: format!("ingredient {ingredient_id}"),
                    unit: "unit".to_string(),
                    quantity_required: *quantity_required,
                })
                .collect(),
        }
    }

    #[test]
    fn test_binary_coverage_per_ingredient() {
        let recipes = vec![
            recipe(1, "Pancakes", &[(1, 2.0), (2, 1.0)]),
            recipe(2, "Glass of water", &[]),
        ];
        let pantry = HashMap::from([(1, 5.0), (2, 0.0)]);

        let scores = score_recipes(&recipes, &pantry);

        assert_eq!(
            scores,
            vec![RecipeSuggestion {
                recipe_id: 1,
                recipe_name: "Pancakes".to_string(),
                match_percentage: 50.0,
            }]
        );
    }

    #[test]
    fn test_partial_stock_earns_no_credit() {
        let recipes = vec![recipe(1, "Bread", &[(1, 1.0)])];
        let pantry = HashMap::from([(1, 0.99)]);

        assert_eq!(score_recipes(&recipes, &pantry)[0].match_percentage, 0.0);
    }

    #[test]
    fn test_sorted_descending_with_name_tiebreak() {
        let recipes = vec![
            recipe(1, "soup", &[(1, 1.0), (2, 1.0)]),
            recipe(2, "Salad", &[(1, 1.0)]),
            recipe(3, "Risotto", &[(3, 1.0), (2, 1.0)]),
            recipe(4, "Pasta", &[(1, 1.0), (3, 1.0)]),
        ];
        let pantry = HashMap::from([(1, 1.0), (3, 1.0)]);

        let scores = score_recipes(&recipes, &pantry);
        let order: Vec<&str> = scores.iter().map(|s| s.recipe_name.as_str()).collect();

        assert_eq!(order, vec!["Pasta", "Salad", "Risotto", "soup"]);
        assert_eq!(scores[0].match_percentage, 100.0);
        assert_eq!(scores[3].match_percentage, 50.0);
    }

    #[test]
    fn test_no_recipes_yields_empty_ranking() {
        let recipes: Vec<Recipe> = Vec::new();
        assert!(score_recipes(&recipes, &HashMap::new()).is_empty());
    }
}
