//! Upload of finished recipe documents to Tandoor or Mealie.

use std::path::Path;
use std::time::Duration;

use log::{debug, error, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde_json::Value;

use crate::config::{ApiConfig, AppConfig};
use crate::error::PublishError;
use crate::model::{RecipeDocument, Target};

const DEFAULT_MEALIE_GROUP: &str = "home";

/// Where a published recipe ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Tandoor recipe id or Mealie slug
    pub remote_id: String,
    /// Link to the recipe in the manager's web interface
    pub remote_url: String,
}

pub struct Publisher {
    client: Client,
    tandoor: Option<ApiConfig>,
    mealie: Option<ApiConfig>,
}

impl Publisher {
    pub fn new(
        tandoor: Option<ApiConfig>,
        mealie: Option<ApiConfig>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            tandoor,
            mealie,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, PublishError> {
        Self::new(
            config.tandoor.clone(),
            config.mealie.clone(),
            Duration::from_secs(config.publish_timeout),
        )
    }

    fn api(&self, target: Target) -> Option<&ApiConfig> {
        match target {
            Target::Tandoor => self.tandoor.as_ref(),
            Target::Mealie => self.mealie.as_ref(),
        }
    }

    /// Create the recipe, then attach `thumbnail` if there is one.
    ///
    /// The thumbnail is only uploaded once the recipe exists; a failed upload is logged
    /// and does not affect the result.
    pub async fn publish(
        &self,
        document: &RecipeDocument,
        target: Target,
        thumbnail: Option<&Path>,
    ) -> Result<Published, PublishError> {
        let api = self.api(target).ok_or(PublishError::NotConfigured(target))?;
        let base_url = api.base_url.trim_end_matches('/');
        let endpoint = match target {
            Target::Tandoor => "/api/recipe/",
            Target::Mealie => "/api/recipes/create/html-or-json",
        };

        info!("Sending recipe to {} API: {}", target.display_name(), base_url);
        debug!(
            "{}",
            serde_json::to_string_pretty(document.as_map()).unwrap_or_default()
        );
        let response = self
            .client
            .post(format!("{base_url}{endpoint}"))
            .bearer_auth(&api.token)
            .json(document)
            .send()
            .await
            .inspect_err(|e| error!("Request to {} failed: {}", target.display_name(), e))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("HTTP error occurred: {}", status);
            error!("Response content: {}", body);
            return Err(PublishError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let remote_id = recipe_id(target, &body)?;
        info!("{} recipe ID: {}", target.display_name(), remote_id);

        if let Some(path) = thumbnail {
            if let Err(e) = self.upload_thumbnail(api, target, &remote_id, path).await {
                warn!("Failed to upload thumbnail {}: {}", path.display(), e);
            }
        }

        Ok(Published {
            remote_url: remote_url(api, target, &remote_id)?,
            remote_id,
        })
    }

    async fn upload_thumbnail(
        &self,
        api: &ApiConfig,
        target: Target,
        remote_id: &str,
        path: &Path,
    ) -> Result<(), PublishError> {
        let image = tokio::fs::read(path).await.map_err(|e| {
            PublishError::Other(format!("cannot read thumbnail {}: {e}", path.display()))
        })?;
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or("png")
            .to_lowercase();
        let part = Part::bytes(image)
            .file_name(format!("image.{extension}"))
            .mime_str(&format!("image/{extension}"))?;

        let base_url = api.base_url.trim_end_matches('/');
        let (url, form) = match target {
            Target::Tandoor => (
                format!("{base_url}/api/recipe/{remote_id}/image/"),
                Form::new().part("image", part),
            ),
            Target::Mealie => (
                format!("{base_url}/api/recipes/{remote_id}/image"),
                Form::new()
                    .part("image", part)
                    .text("extension", extension.clone()),
            ),
        };

        let response = self
            .client
            .put(url)
            .bearer_auth(&api.token)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Http {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            "Successfully uploaded thumbnail for {} recipe {}",
            target.display_name(),
            remote_id
        );
        Ok(())
    }
}

/// Tandoor answers with the created recipe as JSON, Mealie with the slug as a raw string.
fn recipe_id(target: Target, body: &str) -> Result<String, PublishError> {
    let id = match target {
        Target::Tandoor => {
            let value: Value = serde_json::from_str(body)
                .map_err(|e| PublishError::Other(format!("invalid Tandoor response: {e}")))?;
            match &value["id"] {
                Value::Number(id) => id.to_string(),
                Value::String(id) => id.clone(),
                _ => String::new(),
            }
        }
        Target::Mealie => body.trim().trim_matches(|c| c == '"' || c == '\'').to_string(),
    };

    if id.is_empty() {
        return Err(PublishError::Other(format!(
            "{} response did not contain a recipe id",
            target.display_name()
        )));
    }
    Ok(id)
}

/// Link to the recipe in the manager's web UI; path segments are percent-encoded.
fn remote_url(api: &ApiConfig, target: Target, remote_id: &str) -> Result<String, PublishError> {
    let invalid = |reason: String| {
        PublishError::Other(format!("invalid base URL {}: {reason}", api.base_url))
    };
    let mut url = Url::parse(api.base_url.trim_end_matches('/'))
        .map_err(|e| invalid(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| invalid("cannot carry a path".to_string()))?;
        segments.pop_if_empty();
        match target {
            Target::Tandoor => {
                segments.extend(["view", "recipe", remote_id]);
            }
            Target::Mealie => {
                let group = api.group.as_deref().unwrap_or(DEFAULT_MEALIE_GROUP);
                segments.extend(["g", group, "r", remote_id]);
            }
        }
    }
    Ok(url.to_string())
}
