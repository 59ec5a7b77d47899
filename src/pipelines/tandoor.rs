use std::collections::HashSet;

use log::{info, warn};
use serde_json::{json, Map, Value};

use crate::error::AiError;
use crate::model::RecipeDocument;
use crate::session::{AiSession, PromptMode, PromptSpec};

const MAX_STEP_INGREDIENTS: usize = 3;
/// Upper bound on step prompts; the count comes from free-form model text.
const MAX_STEPS: u32 = 50;

fn name_skeleton() -> Value {
    json!({
        "name": "string",
        "description": "string",
        "keywords": [
            {
                "name": "string",
                "description": "string"
            }
        ]
    })
}

fn step_skeleton() -> Value {
    json!({
        "name": "string",
        "instruction": "string",
        "ingredients": [
            {
                "food": {
                    "name": "string",
                    "plural_name": "string"
                },
                "unit": {
                    "name": "string",
                    "plural_name": "string",
                    "description": "string",
                    "base_unit": "string",
                    "open_data_slug": "string"
                },
                "amount": "string",
                "note": "string",
                "order": 0,
                "is_header": true,
                "no_amount": true
            }
        ],
        "time": 0,
        "order": 0,
        "show_as_header": true,
        "show_ingredients_table": true
    })
}

fn servings_skeleton() -> Value {
    json!({
        "servings": 0,
        "servings_text": "string"
    })
}

fn metadata_skeleton() -> Value {
    json!({
        "working_time": 0,
        "waiting_time": 0,
        "source_url": "string",
        "internal": true,
        "show_ingredient_overview": true
    })
}

/// Name and keywords, one exchange per step, servings, then timing metadata.
pub(super) async fn assemble(
    session: &mut AiSession,
    source_url: &str,
) -> Result<RecipeDocument, AiError> {
    let mut document = RecipeDocument::new();

    let name = name_skeleton();
    if let Some(fragment) = session.ask(&PromptSpec::new(PromptMode::Name, &name)).await? {
        document.merge(fragment);
    }

    let count = match session.step_count().await? {
        Some(count) if count > MAX_STEPS => {
            warn!("Step count {} is implausible, asking for {} steps", count, MAX_STEPS);
            MAX_STEPS
        }
        Some(count) => count,
        None => {
            warn!("Could not determine number of steps, skipping step generation");
            0
        }
    };
    let step = step_skeleton();
    let mut steps = Vec::new();
    for n in 1..=count {
        match session.ask(&PromptSpec::new(PromptMode::Step(n), &step)).await? {
            Some(fragment) => steps.push(Value::Object(fragment)),
            None => warn!("Step {} of {} is missing", n, count),
        }
    }
    info!("Collected {} of {} steps", steps.len(), count);
    document.insert("steps", Value::Array(steps));

    let servings = servings_skeleton();
    if let Some(fragment) = session
        .ask(&PromptSpec::new(PromptMode::Servings, &servings))
        .await?
    {
        document.merge(fragment);
    }

    let metadata = metadata_skeleton();
    if let Some(fragment) = session.ask(&PromptSpec::new(PromptMode::Info, &metadata)).await? {
        document.merge(fragment);
    }

    finish(&mut document, source_url);
    Ok(document)
}

/// Stamp the source URL and bring the steps into the shape Tandoor accepts.
fn finish(document: &mut RecipeDocument, source_url: &str) {
    document.insert("source_url", Value::String(source_url.to_string()));

    let Some(Value::Array(steps)) = document.get_mut("steps") else {
        return;
    };
    let mut seen_foods = HashSet::new();
    for (index, step) in steps.iter_mut().enumerate() {
        if let Value::Object(step) = step {
            normalize_step(step, index, &mut seen_foods);
        }
    }
}

/// Name the step by its position, keep at most three ingredients that were not
/// introduced by an earlier step, and round their amounts up.
fn normalize_step(
    step: &mut Map<String, Value>,
    index: usize,
    seen_foods: &mut HashSet<String>,
) {
    step.insert("name".to_string(), json!(format!("{}.", index + 1)));
    step.insert("order".to_string(), json!(index));

    let ingredients = match step.get_mut("ingredients") {
        Some(Value::Array(list)) => std::mem::take(list),
        _ => Vec::new(),
    };

    let mut kept = Vec::new();
    for mut ingredient in ingredients {
        if kept.len() == MAX_STEP_INGREDIENTS {
            break;
        }
        let Value::Object(fields) = &mut ingredient else {
            continue;
        };
        if let Some(food) = food_name(fields) {
            if !seen_foods.insert(food) {
                continue;
            }
        }
        if let Some(amount) = fields.get("amount").and_then(whole_amount) {
            fields.insert("amount".to_string(), json!(amount));
        }
        fields.insert("order".to_string(), json!(kept.len()));
        fields.insert("is_header".to_string(), Value::Bool(false));
        kept.push(ingredient);
    }
    step.insert("ingredients".to_string(), Value::Array(kept));
}

fn food_name(ingredient: &Map<String, Value>) -> Option<String> {
    let name = ingredient.get("food")?.get("name")?.as_str()?.trim();
    (!name.is_empty()).then(|| name.to_lowercase())
}

/// Amount rounded up to a whole number. Accepts numbers and numeric strings such as
/// "1.5", "1,5" or "1/2".
fn whole_amount(amount: &Value) -> Option<u64> {
    let value = match amount {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => parse_amount(text)?,
        _ => return None,
    };
    (value.is_finite() && value >= 0.0).then(|| value.ceil() as u64)
}

fn parse_amount(text: &str) -> Option<f64> {
    let text = text.trim().replace(',', ".");
    if let Some((numerator, denominator)) = text.split_once('/') {
        let numerator: f64 = numerator.trim().parse().ok()?;
        let denominator: f64 = denominator.trim().parse().ok()?;
        return (denominator != 0.0).then(|| numerator / denominator);
    }
    text.parse().ok()
}
