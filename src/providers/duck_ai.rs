use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use scraper::{Html, Selector};

use crate::browser::{wait_for, wait_until_gone, BrowserLauncher, Page};
use crate::error::AiError;
use crate::providers::{ChatBackend, Reply, Timeouts};
use crate::session::ConversationContext;

const PROMPT_BOX: &str = "textarea[name='user-prompt']";
/// The submit button is disabled once a prompt has been accepted.
const SUBMIT_DISABLED: &str = "button[type='submit'][disabled]";
/// Square icon of the stop control, shown while an answer is being generated.
const STOP_ICON: &str = "button rect[width='10'][height='10']";
/// Buttons of the first-visit dialog that hides the prompt box.
const ONBOARDING_BUTTON: &str = "main div[role='dialog'] button";
const MAX_ONBOARDING_CLICKS: usize = 3;

const JSON_CODE: &str = "code.language-json";
const ASSISTANT_MESSAGE: &str = "div[heading]";

/// Chat backend that drives the duck.ai web interface through a browser page.
///
/// The page keeps the conversation itself, so only the newest turn is ever typed in.
pub struct DuckAiBackend {
    launcher: Arc<dyn BrowserLauncher>,
    chat_url: String,
    page: Option<Box<dyn Page>>,
}

impl DuckAiBackend {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, chat_url: impl Into<String>) -> Self {
        Self {
            launcher,
            chat_url: chat_url.into(),
            page: None,
        }
    }

    async fn dismiss_onboarding(page: &dyn Page) -> Result<(), AiError> {
        for _ in 0..MAX_ONBOARDING_CLICKS {
            if page.exists(PROMPT_BOX).await? || !page.exists(ONBOARDING_BUTTON).await? {
                break;
            }
            debug!("Clicking through onboarding dialog");
            page.click(ONBOARDING_BUTTON).await?;
        }
        Ok(())
    }

    /// Type `text` into the prompt box and wait until the answer is complete.
    async fn send(page: &dyn Page, text: &str, timeouts: &Timeouts) -> Result<(), AiError> {
        info!("Sending prompt: {}...", preview(text));
        wait_for(page, PROMPT_BOX, timeouts.readiness).await?;
        // Enter submits, so the prompt has to stay on one line
        page.submit_text(PROMPT_BOX, &text.replace(['\r', '\n'], " "))
            .await?;
        wait_for(page, SUBMIT_DISABLED, timeouts.generation).await?;
        wait_until_gone(page, STOP_ICON, timeouts.generation).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for DuckAiBackend {
    fn name(&self) -> &str {
        "duck_ai"
    }

    async fn open(
        &mut self,
        context: &ConversationContext,
        timeouts: &Timeouts,
    ) -> Result<(), AiError> {
        let seed = context.last().ok_or(AiError::NotInitialized)?.text.clone();

        info!("Opening chat at {}", self.chat_url);
        let page = self.launcher.open().await?;
        let page = self.page.insert(page);
        page.goto(&self.chat_url).await?;
        Self::dismiss_onboarding(page.as_ref()).await?;
        Self::send(page.as_ref(), &seed, timeouts).await?;
        info!("Chat initialized successfully with recipe context");
        Ok(())
    }

    async fn exchange(
        &mut self,
        context: &ConversationContext,
        timeouts: &Timeouts,
    ) -> Result<Reply, AiError> {
        let page = self.page.as_deref().ok_or(AiError::NotInitialized)?;
        let prompt = context.last().ok_or(AiError::NotInitialized)?;

        Self::send(page, &prompt.text, timeouts).await?;
        let html = page.html().await?;
        Ok(parse_reply(&html))
    }

    async fn close(&mut self) {
        match self.page.take() {
            Some(page) => page.close().await,
            None => debug!("Chat page was never opened"),
        }
    }
}

impl Drop for DuckAiBackend {
    fn drop(&mut self) {
        if self.page.is_some() {
            warn!("Chat backend dropped without being closed");
        }
    }
}

/// Read the latest assistant message: its JSON code blocks and its text.
fn parse_reply(html: &str) -> Reply {
    let document = Html::parse_document(html);
    let (Ok(message), Ok(json_code), Ok(paragraph)) = (
        Selector::parse(ASSISTANT_MESSAGE),
        Selector::parse(JSON_CODE),
        Selector::parse("p"),
    ) else {
        return Reply::default();
    };

    let Some(message) = document.select(&message).last() else {
        return Reply::default();
    };

    let json_blocks = message
        .select(&json_code)
        .map(|code| code.text().collect::<String>().trim().to_string())
        .collect();

    let paragraphs: Vec<String> = message
        .select(&paragraph)
        .map(|p| p.text().collect::<String>())
        .collect();
    let text = if paragraphs.is_empty() {
        message.text().collect::<String>()
    } else {
        paragraphs.join("\n")
    };

    Reply {
        text: text.trim().to_string(),
        json_blocks,
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeLauncher, FakePage};
    use crate::session::Turn;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const CONVERSATION: &str = r#"
        <html><body><main>
            <div heading="GPT-4o mini"><p>Sure.</p><pre><code class="language-json">{"a":1}</code></pre></div>
            <div heading="GPT-4o mini"><p>There are</p><p>2 steps.</p><pre><code class="language-json">{"a":2}</code></pre></div>
        </main></body></html>
    "#;

    fn ready_page(html: &str) -> FakePage {
        FakePage::with_html(html)
            .always_present(PROMPT_BOX)
            .always_present(SUBMIT_DISABLED)
    }

    fn context(turns: &[&str]) -> ConversationContext {
        let mut context = ConversationContext::default();
        for turn in turns {
            context.push(Turn::user(*turn));
        }
        context
    }

    #[test]
    fn test_parse_reply_reads_only_the_latest_message() {
        let reply = parse_reply(CONVERSATION);
        assert_eq!(reply.json_blocks, vec!["{\"a\":2}"]);
        assert_eq!(reply.last_json_block(), Some("{\"a\":2}"));
        assert_eq!(reply.text, "There are\n2 steps.");
    }

    #[test]
    fn test_latest_message_without_block_has_no_json() {
        let html = r#"
            <html><body><main>
                <div heading="GPT-4o mini"><pre><code class="language-json">{"name":"2.","instruction":"Bake"}</code></pre></div>
                <div heading="GPT-4o mini"><p>It serves four people.</p></div>
            </main></body></html>
        "#;
        let reply = parse_reply(html);
        assert!(reply.json_blocks.is_empty());
        assert_eq!(reply.last_json_block(), None);
        assert_eq!(reply.text, "It serves four people.");
    }

    #[test]
    fn test_page_without_messages_gives_empty_reply() {
        let reply = parse_reply("<html><body><main></main></body></html>");
        assert!(reply.text.is_empty());
        assert_eq!(reply.last_json_block(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_and_exchange_submit_single_line_prompts() {
        let page = ready_page(CONVERSATION);
        let submitted = page.submitted.clone();
        let closed = page.closed.clone();
        let mut backend = DuckAiBackend::new(Arc::new(FakeLauncher::new(page)), "https://duck.ai/");

        let mut conversation = context(&["Recipe:\n2 cups flour"]);
        backend
            .open(&conversation, &Timeouts::default())
            .await
            .unwrap();
        conversation.push(Turn::user("How many steps?"));
        let reply = backend
            .exchange(&conversation, &Timeouts::default())
            .await
            .unwrap();
        backend.close().await;

        assert_eq!(
            *submitted.lock().unwrap(),
            vec!["Recipe: 2 cups flour".to_string(), "How many steps?".to_string()]
        );
        assert_eq!(reply.last_json_block(), Some("{\"a\":2}"));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_prompt_box_times_out() {
        let page = FakePage::with_html(CONVERSATION);
        let mut backend = DuckAiBackend::new(Arc::new(FakeLauncher::new(page)), "https://duck.ai/");

        let result = backend
            .open(&context(&["seed"]), &Timeouts::default())
            .await;
        backend.close().await;

        match result {
            Err(AiError::Timeout(timeout)) => assert_eq!(timeout, Duration::from_secs(10)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_before_open_is_rejected() {
        let mut backend = DuckAiBackend::new(Arc::new(FakeLauncher::broken()), "https://duck.ai/");
        let result = backend
            .exchange(&context(&["hello"]), &Timeouts::default())
            .await;
        assert!(matches!(result, Err(AiError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_browser_launch_failure_is_session_fatal() {
        let mut backend = DuckAiBackend::new(Arc::new(FakeLauncher::broken()), "https://duck.ai/");
        let error = backend
            .open(&context(&["seed"]), &Timeouts::default())
            .await
            .unwrap_err();
        assert!(error.is_session_fatal());
    }
}
