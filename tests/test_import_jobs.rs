mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use mockito::{Matcher, Server};
use serde_json::{json, Value};

use common::{fenced, pipeline, FakeCaptions, RecordingStore, Rules};
use social_recipe_import::jobs::{JobStatus, Orchestrator};
use social_recipe_import::{Platform, Target};

const CAPTION: &str = "2 cups flour, bake 20 min";

fn tandoor_rules() -> Rules {
    Rules::new()
        .on(
            "Keep the name of the recipe short.",
            fenced(json!({
                "name": "Quick Bread",
                "description": "Flour, baked",
                "keywords": [{"name": "bread", "description": ""}]
            })),
        )
        .on("How many steps", "There are 2 steps.")
        .on(
            "Only complete step 1 ",
            fenced(json!({
                "name": "x",
                "instruction": "Put 2 cups of flour in a bowl.",
                "ingredients": [{"food": {"name": "flour"}, "amount": "2", "unit": {"name": "cup"}}]
            })),
        )
        .on(
            "Only complete step 2 ",
            fenced(json!({
                "name": "y",
                "instruction": "Bake for 20 minutes.",
                "ingredients": [{"food": {"name": "flour"}, "amount": "1"}]
            })),
        )
        .on(
            "number of servings",
            fenced(json!({"servings": 1, "servings_text": "loaf"})),
        )
        .on(
            "descriptive metadata",
            fenced(json!({"working_time": 5, "waiting_time": 20})),
        )
}

#[tokio::test]
async fn test_instagram_post_to_tandoor() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/api/recipe/")
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::PartialJson(json!({
            "name": "Quick Bread",
            "servings": 1,
            "source_url": "https://www.instagram.com/p/ABC123/"
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 101, "name": "Quick Bread"}"#)
        .create_async()
        .await;

    let rules = tandoor_rules();
    let captions = Arc::new(FakeCaptions::with_caption(CAPTION));
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(
        store.clone(),
        pipeline(&server.url(), captions.clone(), &rules),
    );

    let job = orchestrator
        .create(
            "https://www.instagram.com/p/ABC123/",
            Platform::Instagram,
            Target::Tandoor,
        )
        .unwrap();
    let done = orchestrator.run(&job.id).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(
        done.result_url,
        Some(format!("{}/view/recipe/101", server.url()))
    );
    create.assert_async().await;
    assert_eq!(captions.calls(), 1);
    assert_eq!(rules.closed.load(Ordering::SeqCst), 1);

    let prompts = rules.prompts();
    assert_eq!(prompts.len(), 6);
    assert!(prompts[1].starts_with("How many steps"));
    assert!(prompts[2].contains("Only complete step 1 "));
    assert!(prompts[3].contains("Only complete step 2 "));

    let status = orchestrator.status(&job.id).unwrap().unwrap();
    assert_eq!(status.result_url, done.result_url);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_completion_set_once() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/recipe/")
        .with_status(201)
        .with_body(r#"{"id": 5}"#)
        .create_async()
        .await;

    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(
        store.clone(),
        pipeline(
            &server.url(),
            Arc::new(FakeCaptions::with_caption(CAPTION)),
            &tandoor_rules(),
        ),
    );
    let job = orchestrator
        .create(
            "https://www.instagram.com/p/ABC123/",
            Platform::Instagram,
            Target::Tandoor,
        )
        .unwrap();
    orchestrator.run(&job.id).await.unwrap();

    let history = store.history();
    let progress: Vec<u8> = history.iter().map(|job| job.progress).collect();
    assert_eq!(progress, vec![10, 20, 40, 80, 100]);
    assert_eq!(history[2].message, "Processing for Tandoor...");

    let (last, running) = history.split_last().unwrap();
    assert!(running
        .iter()
        .all(|job| job.status == JobStatus::Processing && job.completed_at.is_none()));
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.message, "Recipe successfully scraped and uploaded!");
    assert!(last.completed_at.is_some());
}

#[tokio::test]
async fn test_publish_failure_fails_job_without_thumbnail_upload() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/api/recipe/")
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;
    let image = server
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let thumbnail = dir.path().join("thumbnail_abc.png");
    std::fs::write(&thumbnail, [0x89, b'P', b'N', b'G']).unwrap();
    let captions = Arc::new(FakeCaptions {
        caption: Some(CAPTION.to_string()),
        thumbnail: Some(thumbnail.clone()),
        ..Default::default()
    });

    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(
        store.clone(),
        pipeline(&server.url(), captions, &tandoor_rules()),
    );
    let job = orchestrator
        .create(
            "https://www.instagram.com/p/ABC123/",
            Platform::Instagram,
            Target::Tandoor,
        )
        .unwrap();
    let done = orchestrator.run(&job.id).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.progress, 80);
    assert!(done.message.contains("HTTP error"), "{}", done.message);
    assert!(done.message.starts_with("Error: Failed to submit recipe to Tandoor"));
    assert!(done.result.unwrap().contains("Internal Server Error"));
    assert!(done.result_url.is_none());
    assert!(done.completed_at.is_some());
    assert!(!thumbnail.exists());

    create.assert_async().await;
    image.assert_async().await;
}

#[tokio::test]
async fn test_invalid_url_never_reaches_extraction() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let rules = tandoor_rules();
    let captions = Arc::new(FakeCaptions::with_caption(CAPTION));
    let store = Arc::new(RecordingStore::default());
    let orchestrator = Orchestrator::new(
        store.clone(),
        pipeline(&server.url(), captions.clone(), &rules),
    );

    let job = orchestrator
        .create(
            "http://example.com/not-instagram",
            Platform::Instagram,
            Target::Tandoor,
        )
        .unwrap();
    let done = orchestrator.run(&job.id).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.progress, 0);
    assert_eq!(done.message, "Invalid instagram URL format");
    assert_eq!(store.history().len(), 1);
    assert_eq!(captions.calls(), 0);
    assert!(rules.prompts().is_empty());
    create.assert_async().await;
}

#[tokio::test]
async fn test_tiktok_post_to_mealie() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/api/recipes/create/html-or-json")
        .match_body(Matcher::PartialJson(json!({"includeTags": false})))
        .with_status(201)
        .with_body("\"garlic-noodles\"")
        .create_async()
        .await;

    let rules = Rules::new()
        .on(
            "one long string",
            fenced(json!({"recipeInstructions": "Boil the noodles, fry the garlic, mix."})),
        )
        .on(
            "descriptive metadata",
            fenced(json!({
                "@context": "https://schema.org",
                "@type": "Recipe",
                "author": "chef",
                "prepTime": "PT5M",
                "cookTime": "PT10M",
                "recipeYield": "2"
            })),
        )
        .on(
            "Append the ingredients",
            fenced(json!({"recipeIngredient": ["200g noodles", "3 cloves garlic"]})),
        )
        .on(
            "Keep the name of the recipe short.",
            fenced(json!({"name": "Garlic Noodles"})),
        )
        .on(
            "calories",
            fenced(json!({"nutrition": {"calories": "450 kcal", "fatContent": "12 g"}})),
        );

    let orchestrator = Orchestrator::new(
        Arc::new(RecordingStore::default()),
        pipeline(
            &server.url(),
            Arc::new(FakeCaptions::with_caption(
                "Garlic noodles: 200g noodles, 3 cloves garlic",
            )),
            &rules,
        ),
    );
    let job = orchestrator
        .create(
            "https://www.tiktok.com/@chef/video/7234",
            Platform::Tiktok,
            Target::Mealie,
        )
        .unwrap();
    let done = orchestrator.run(&job.id).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed, "{:?}", done.result);
    assert_eq!(
        done.result_url,
        Some(format!("{}/g/home/r/garlic-noodles", server.url()))
    );
    let result: Value = serde_json::from_str(done.result.as_deref().unwrap()).unwrap();
    assert_eq!(result["recipe_id"], json!("garlic-noodles"));
    assert_eq!(result["target"], json!("mealie"));
    create.assert_async().await;

    let prompts = rules.prompts();
    assert_eq!(prompts.len(), 5);
    assert!(prompts[0].contains("recipeInstructions"));
    assert!(prompts[4].contains("calories"));
}

#[tokio::test]
async fn test_assembly_without_any_fragment_still_publishes() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/api/recipe/")
        .match_body(Matcher::PartialJson(json!({
            "steps": [],
            "source_url": "https://www.instagram.com/reel/xyz/"
        })))
        .with_status(201)
        .with_body(r#"{"id": 3}"#)
        .create_async()
        .await;

    let orchestrator = Orchestrator::new(
        Arc::new(RecordingStore::default()),
        pipeline(
            &server.url(),
            Arc::new(FakeCaptions::with_caption(CAPTION)),
            &Rules::new(),
        ),
    );
    let job = orchestrator
        .create(
            "https://www.instagram.com/reel/xyz/",
            Platform::Instagram,
            Target::Tandoor,
        )
        .unwrap();
    let done = orchestrator.run(&job.id).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    create.assert_async().await;
}
