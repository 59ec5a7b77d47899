use serde_json::Value;

use crate::session::PromptMode;

/// Template every fragment prompt is built from.
///
/// Loaded from `prompt.txt` at compile time; `{language}`, `{skeleton}` and
/// `{instruction}` are filled in by [`build_prompt`].
pub const FILL_JSON_PROMPT: &str = include_str!("prompt.txt");

/// Dedicated exchange asking for the number of recipe steps.
pub const STEP_COUNT_PROMPT: &str =
    "How many steps are in this recipe? Please respond with only a number.";

/// First turn of every conversation: the caption all later prompts refer to.
pub fn seed_prompt(caption: &str) -> String {
    format!(
        "I'm going to ask you questions about this recipe. Please use this recipe information as context for all your responses: {caption}"
    )
}

/// Build the prompt asking the model to fill `skeleton` for `mode`.
pub fn build_prompt(language: &str, mode: &PromptMode, skeleton: &Value) -> String {
    let language = match language.trim() {
        "" => "en",
        trimmed => trimmed,
    };
    FILL_JSON_PROMPT
        .trim_end()
        .replace("{language}", language)
        .replace("{skeleton}", &skeleton.to_string())
        .replace("{instruction}", &instruction(mode))
}

fn instruction(mode: &PromptMode) -> String {
    match mode {
        PromptMode::Name => "Keep the name of the recipe short.".to_string(),
        PromptMode::Info => "Only fill out the descriptive metadata: author, description, yield \
            and the preparation, cooking, working or waiting times. Times written as text use \
            the format PT1H for one hour or PT15M for 15 minutes, numeric times are minutes."
            .to_string(),
        PromptMode::Ingredients => {
            "Append the ingredients to the 'recipeIngredient' list. One ingredient per line."
                .to_string()
        }
        PromptMode::Instructions => "Write the instruction as one long string. No string \
            separation, just one long text! Don't add ingredients here."
            .to_string(),
        PromptMode::Nutrition => "Only fill out calories and fatContent with a string.".to_string(),
        PromptMode::Servings => {
            "Only fill out the number of servings and a short servings text.".to_string()
        }
        PromptMode::Step(n) => format!(
            "Only complete step {n} of the recipe. If the step has more than 3 ingredients, \
             only complete the first 3 and finish the JSON object. The name of the step should \
             be the step number e.g. 'name': '{n}.'. Only include the current instruction \
             description in the instruction field. The amount value of the ingredient can only \
             be a whole number, please round up if the amount is a decimal. If an ingredient \
             has already been mentioned in a previous step, do not include it again as an \
             ingredient in this step."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_is_embedded() {
        assert!(FILL_JSON_PROMPT.contains("{language}"));
        assert!(FILL_JSON_PROMPT.contains("{skeleton}"));
        assert!(FILL_JSON_PROMPT.contains("```json"));
    }

    #[test]
    fn test_build_prompt_fills_placeholders() {
        let prompt = build_prompt("de", &PromptMode::Name, &json!({"name": "string"}));
        assert!(prompt.starts_with("Write your response in the language de."));
        assert!(prompt.contains(r#"{"name":"string"}"#));
        assert!(prompt.contains("Keep the name of the recipe short."));
        assert!(!prompt.contains("{instruction}"));
        assert!(!prompt.contains("{language}"));
    }

    #[test]
    fn test_step_prompt_carries_domain_rules() {
        let prompt = build_prompt("en", &PromptMode::Step(2), &json!({}));
        assert!(prompt.contains("Only complete step 2 of the recipe"));
        assert!(prompt.contains("'name': '2.'"));
        assert!(prompt.contains("first 3"));
        assert!(prompt.contains("round up"));
        assert!(prompt.contains("already been mentioned"));
    }

    #[test]
    fn test_blank_language_falls_back_to_english() {
        let prompt = build_prompt("  ", &PromptMode::Servings, &json!({"servings": 0}));
        assert!(prompt.contains("in the language en."));
    }

    #[test]
    fn test_seed_prompt_contains_caption() {
        let seed = seed_prompt("2 cups flour, bake 20 min");
        assert!(seed.ends_with("context for all your responses: 2 cups flour, bake 20 min"));
    }
}
