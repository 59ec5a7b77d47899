//! Recipe assembly: a fixed sequence of AI exchanges per target schema.

mod mealie;
mod tandoor;

use std::sync::Arc;

use chrono::Local;
use log::{debug, info};

use crate::error::AiError;
use crate::model::{Extraction, RecipeDocument, Target};
use crate::providers::{BackendFactory, Timeouts};
use crate::session::AiSession;

/// Builds a complete recipe document for a target from a post caption.
///
/// Every call gets its own backend and conversation, closed again on every exit path.
pub struct RecipeAssembler {
    backends: Arc<dyn BackendFactory>,
    language: String,
    timeouts: Timeouts,
}

impl RecipeAssembler {
    pub fn new(
        backends: Arc<dyn BackendFactory>,
        language: impl Into<String>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            backends,
            language: language.into(),
            timeouts,
        }
    }

    /// Assemble the document for `target`.
    ///
    /// Missing fragments are tolerated; only a session-level failure (or a conversation
    /// that cannot be primed with the caption) is returned as an error.
    pub async fn assemble(
        &self,
        extraction: &Extraction,
        target: Target,
        source_url: &str,
    ) -> Result<RecipeDocument, AiError> {
        let backend = self.backends.create()?;
        info!(
            "Assembling {} recipe with the {} backend",
            target.display_name(),
            backend.name()
        );

        let mut session = AiSession::new(backend, self.language.clone(), self.timeouts);
        let result = run_plan(&mut session, &extraction.caption, target, source_url).await;
        session.close().await;

        let document = result?;
        debug!(
            "Assembled document: {}",
            serde_json::to_string_pretty(document.as_map()).unwrap_or_default()
        );
        Ok(document)
    }
}

async fn run_plan(
    session: &mut AiSession,
    caption: &str,
    target: Target,
    source_url: &str,
) -> Result<RecipeDocument, AiError> {
    if !session.initialize(caption).await {
        return Err(AiError::NotInitialized);
    }
    match target {
        Target::Tandoor => tandoor::assemble(session, source_url).await,
        Target::Mealie => mealie::assemble(session, source_url, Local::now().date_naive()).await,
    }
}
