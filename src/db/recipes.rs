//! Recipes and their ingredient lines.

use sqlx::{PgConnection, PgPool};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::errors::{KitchenError, Result};
use crate::feasibility::{score_recipes, RecipeSuggestion};
use crate::model::{Recipe, RecipeDraft, RecipeLine, ValidRecipeLine, DEFAULT_CATEGORY};

use super::catalog::ensure_ingredient;
use super::load_pantry_map;

#[derive(sqlx::FromRow)]
struct RecipeRow {
    id: i64,
    name: String,
    instructions: String,
}

#[derive(sqlx::FromRow)]
struct RecipeLineRow {
    recipe_id: i64,
    ingredient_id: i64,
    name: String,
    unit: String,
    quantity_required: f64,
}

impl From<RecipeLineRow> for RecipeLine {
    fn from(row: RecipeLineRow) -> Self {
        RecipeLine {
            ingredient_id: row.ingredient_id,
            name: row.name,
            unit: row.unit,
            quantity_required: row.quantity_required,
        }
    }
}

const LINE_COLUMNS: &str = "SELECT ri.recipe_id, ri.ingredient_id, i.name, i.unit, ri.quantity_required
     FROM recipe_ingredients ri
     JOIN ingredients i ON i.id = ri.ingredient_id";

pub(crate) async fn fetch_recipe_lines(conn: &mut PgConnection, recipe_id: i64) -> Result<Vec<RecipeLine>> {
    let rows = sqlx::query_as::<_, RecipeLineRow>(&format!(
        "{LINE_COLUMNS} WHERE ri.recipe_id = $1 ORDER BY ri.position"
    ))
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(RecipeLine::from).collect())
}

async fn fetch_recipe(conn: &mut PgConnection, id: i64) -> Result<Recipe> {
    let row = sqlx::query_as::<_, RecipeRow>("SELECT id, name, instructions FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| KitchenError::not_found("recipe", id))?;

    Ok(Recipe {
        id: row.id,
        name: row.name,
        instructions: row.instructions,
        ingredients: fetch_recipe_lines(conn, id).await?,
    })
}

pub(crate) async fn recipe_exists(conn: &mut PgConnection, id: i64) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM recipes WHERE id = $1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists)
}

/// Every recipe with its lines, keyed by id
pub(crate) async fn load_recipes(conn: &mut PgConnection) -> Result<HashMap<i64, Recipe>> {
    let rows = sqlx::query_as::<_, RecipeRow>("SELECT id, name, instructions FROM recipes")
        .fetch_all(&mut *conn)
        .await?;

    let mut recipes: HashMap<i64, Recipe> = rows
        .into_iter()
        .map(|row| {
            (
                row.id,
                Recipe {
                    id: row.id,
                    name: row.name,
                    instructions: row.instructions,
                    ingredients: Vec::new(),
                },
            )
        })
        .collect();

    let lines = sqlx::query_as::<_, RecipeLineRow>(&format!(
        "{LINE_COLUMNS} ORDER BY ri.recipe_id, ri.position"
    ))
    .fetch_all(&mut *conn)
    .await?;

    for line in lines {
        if let Some(recipe) = recipes.get_mut(&line.recipe_id) {
            recipe.ingredients.push(line.into());
        }
    }

    Ok(recipes)
}

/// Resolve line names through the catalog and insert them in order
async fn write_recipe_lines(conn: &mut PgConnection, recipe_id: i64, lines: &[ValidRecipeLine]) -> Result<()> {
    let mut seen = HashSet::new();

    for (position, line) in lines.iter().enumerate() {
        let (ingredient, _) = ensure_ingredient(conn, &line.name, &line.unit, DEFAULT_CATEGORY).await?;

        if !seen.insert(ingredient.id) {
            return Err(KitchenError::Validation(format!(
                "ingredient {} is listed more than once",
                ingredient.name
            )));
        }

        sqlx::query(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, quantity_required, position)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(recipe_id)
        .bind(ingredient.id)
        .bind(line.quantity)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Create a recipe; ingredient names are resolved with get-or-create
pub async fn create_recipe(pool: &PgPool, draft: &RecipeDraft) -> Result<Recipe> {
    let valid = draft.validate()?;
    let mut tx = pool.begin().await?;

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM recipes WHERE name = $1)")
        .bind(&valid.name)
        .fetch_one(&mut *tx)
        .await?;
    if taken {
        return Err(KitchenError::Duplicate(format!("recipe {} already exists", valid.name)));
    }

    let recipe_id: i64 =
        sqlx::query_scalar("INSERT INTO recipes (name, instructions) VALUES ($1, $2) RETURNING id")
            .bind(&valid.name)
            .bind(&valid.instructions)
            .fetch_one(&mut *tx)
            .await?;

    write_recipe_lines(&mut tx, recipe_id, &valid.lines).await?;
    let recipe = fetch_recipe(&mut tx, recipe_id).await?;
    tx.commit().await?;

    info!(recipe_id, name = %recipe.name, lines = recipe.ingredients.len(), "Created recipe");
    Ok(recipe)
}

/// Replace a recipe's name, instructions and every ingredient line
pub async fn update_recipe(pool: &PgPool, id: i64, draft: &RecipeDraft) -> Result<Recipe> {
    let valid = draft.validate()?;
    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE recipes SET name = $2, instructions = $3 WHERE id = $1")
        .bind(id)
        .bind(&valid.name)
        .bind(&valid.instructions)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(KitchenError::not_found("recipe", id));
    }

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    write_recipe_lines(&mut tx, id, &valid.lines).await?;

    let recipe = fetch_recipe(&mut tx, id).await?;
    tx.commit().await?;

    info!(recipe_id = id, lines = recipe.ingredients.len(), "Updated recipe");
    Ok(recipe)
}

pub async fn get_recipe(pool: &PgPool, id: i64) -> Result<Recipe> {
    let mut conn = pool.acquire().await?;
    fetch_recipe(&mut conn, id).await
}

/// All recipes with their lines, sorted by name
pub async fn list_recipes(pool: &PgPool) -> Result<Vec<Recipe>> {
    let mut conn = pool.acquire().await?;
    let mut recipes: Vec<Recipe> = load_recipes(&mut conn).await?.into_values().collect();
    recipes.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then(a.id.cmp(&b.id))
    });
    Ok(recipes)
}

/// Delete a recipe with its lines and meal plan entries
pub async fn delete_recipe(pool: &PgPool, id: i64) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(KitchenError::not_found("recipe", id));
    }

    info!(recipe_id = id, "Deleted recipe");
    Ok(())
}

/// Rank recipes by how much of each can be cooked from current stock
pub async fn suggest_recipes(pool: &PgPool) -> Result<Vec<RecipeSuggestion>> {
    let mut conn = pool.acquire().await?;
    let recipes = load_recipes(&mut conn).await?;
    let pantry = load_pantry_map(&mut conn).await?;

    let suggestions = score_recipes(recipes.values(), &pantry);
    debug!(recipes = recipes.len(), suggestions = suggestions.len(), "Scored recipes");
    Ok(suggestions)
}
