use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::error::AiError;
use crate::model::RecipeDocument;
use crate::session::{AiSession, PromptMode, PromptSpec};

fn instructions_skeleton() -> Value {
    json!({ "recipeInstructions": "string" })
}

fn info_skeleton() -> Value {
    json!({
        "@context": "https://schema.org",
        "@type": "Recipe",
        "author": "string",
        "cookTime": "PT1H",
        "prepTime": "PT15M",
        "datePublished": "string",
        "description": "",
        "image": null,
        "recipeYield": ""
    })
}

fn ingredients_skeleton() -> Value {
    json!({ "recipeIngredient": ["string"] })
}

fn name_skeleton() -> Value {
    json!({ "name": "Mom's World Famous Banana Bread" })
}

fn nutrition_skeleton() -> Value {
    json!({
        "nutrition": {
            "@type": "NutritionInformation",
            "calories": "string",
            "fatContent": "string"
        }
    })
}

/// Fields the model is never asked about.
fn interaction_statistic() -> Value {
    json!({
        "@type": "InteractionCounter",
        "interactionType": "https://schema.org/Comment",
        "userInteractionCount": "140"
    })
}

/// Instructions, metadata, ingredients, name and nutrition, then the transport envelope.
pub(super) async fn assemble(
    session: &mut AiSession,
    source_url: &str,
    published: NaiveDate,
) -> Result<RecipeDocument, AiError> {
    let mut document = RecipeDocument::new();

    let plan = [
        (PromptMode::Instructions, instructions_skeleton()),
        (PromptMode::Info, info_skeleton()),
        (PromptMode::Ingredients, ingredients_skeleton()),
    ];
    for (mode, skeleton) in &plan {
        if let Some(fragment) = session.ask(&PromptSpec::new(*mode, skeleton)).await? {
            document.merge(fragment);
        }
    }

    document.insert("interactionStatistic", interaction_statistic());

    let plan = [
        (PromptMode::Name, name_skeleton()),
        (PromptMode::Nutrition, nutrition_skeleton()),
    ];
    for (mode, skeleton) in &plan {
        if let Some(fragment) = session.ask(&PromptSpec::new(*mode, skeleton)).await? {
            document.merge(fragment);
        }
    }

    document.insert("suitableForDiet", Value::Null);

    Ok(envelope(document, source_url, published))
}

/// Wrap the JSON-LD recipe the way Mealie's HTML-or-JSON importer expects it.
fn envelope(
    mut document: RecipeDocument,
    source_url: &str,
    published: NaiveDate,
) -> RecipeDocument {
    document.insert(
        "datePublished",
        Value::String(published.format("%Y-%m-%d").to_string()),
    );
    document.insert("url", Value::String(source_url.to_string()));

    let json_ld = document.into_value().to_string();
    let script = format!(
        r#"<script type="application/ld+json">{}</script>"#,
        html_escape::encode_script(&json_ld)
    );

    let mut wrapped = RecipeDocument::new();
    wrapped.insert("includeTags", Value::Bool(false));
    wrapped.insert("data", Value::String(script));
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Timeouts;
    use crate::session::testing::ScriptedBackend;

    const OPEN: &str = r#"<script type="application/ld+json">"#;
    const CLOSE: &str = "</script>";

    fn fenced(value: Value) -> String {
        format!("```json\n{}\n```", value)
    }

    fn unwrap_envelope(document: &RecipeDocument) -> Value {
        assert_eq!(document.get("includeTags"), Some(&json!(false)));
        let data = document.get("data").unwrap().as_str().unwrap();
        assert!(data.starts_with(OPEN) && data.ends_with(CLOSE));
        serde_json::from_str(&data[OPEN.len()..data.len() - CLOSE.len()]).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    #[tokio::test]
    async fn test_plan_fills_and_wraps_document() {
        let backend = ScriptedBackend::answering([
            fenced(json!({"recipeInstructions": "Mix and bake for 20 minutes."})),
            fenced(json!({
                "@context": "https://schema.org",
                "@type": "Recipe",
                "author": "chef",
                "prepTime": "PT10M",
                "cookTime": "PT20M",
                "recipeYield": "1 loaf"
            })),
            fenced(json!({"recipeIngredient": ["2 cups flour"]})),
            fenced(json!({"name": "Bread"})),
            fenced(json!({"nutrition": {"calories": "200 kcal", "fatContent": "2 g"}})),
        ]);
        let prompts = backend.prompts.clone();
        let mut session = AiSession::new(Box::new(backend), "en", Timeouts::default());
        assert!(session.initialize("2 cups flour, bake 20 min").await);

        let document = assemble(&mut session, "https://www.instagram.com/p/ABC123/", date())
            .await
            .unwrap();
        let recipe = unwrap_envelope(&document);

        assert_eq!(recipe["name"], json!("Bread"));
        assert_eq!(recipe["recipeIngredient"], json!(["2 cups flour"]));
        assert_eq!(recipe["cookTime"], json!("PT20M"));
        assert_eq!(recipe["interactionStatistic"]["userInteractionCount"], json!("140"));
        assert_eq!(recipe["suitableForDiet"], Value::Null);
        assert_eq!(recipe["datePublished"], json!("2024-05-17"));
        assert_eq!(recipe["url"], json!("https://www.instagram.com/p/ABC123/"));

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 5);
        assert!(prompts[0].contains("recipeInstructions"));
        assert!(prompts[3].contains("Keep the name of the recipe short."));
    }

    #[tokio::test]
    async fn test_missing_fragments_keep_literal_fields() {
        let mut session = AiSession::new(
            Box::new(ScriptedBackend::default()),
            "en",
            Timeouts::default(),
        );
        assert!(session.initialize("caption").await);

        let document = assemble(&mut session, "https://www.tiktok.com/@chef/video/1", date())
            .await
            .unwrap();
        let recipe = unwrap_envelope(&document);

        assert!(recipe.get("name").is_none());
        assert_eq!(recipe["suitableForDiet"], Value::Null);
        assert!(recipe.get("interactionStatistic").is_some());
        assert_eq!(recipe["datePublished"], json!("2024-05-17"));
    }
}
