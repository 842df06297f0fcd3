use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::str::FromStr;
use tera::{Context as TeraContext, Tera};
use tracing::{debug, info};

use crate::ocr::TextElement;
use crate::providers::Provider;

mod reconcile;

pub use reconcile::{NONE_SENTINEL, ReconcileConfig, reconcile};

const SYSTEM_PROMPT: &str = include_str!("prompts/system.tera");
const EXTRACT_STORE_PROMPT: &str = include_str!("prompts/extract_store.tera");
const EXTRACT_NUMBER_PROMPT: &str = include_str!("prompts/extract_number.tera");
const EXTRACT_FOOD_PROMPT: &str = include_str!("prompts/extract_food.tera");
const FILTER_STORE_PROMPT: &str = include_str!("prompts/filter_store.tera");
const FILTER_FOOD_PROMPT: &str = include_str!("prompts/filter_food.tera");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Store,
    Number,
    Food,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Store => "store",
            Category::Number => "number",
            Category::Food => "food",
        }
    }

    /// Whether recognized image text can be filtered down to this category.
    pub fn filters_images(&self) -> bool {
        matches!(self, Category::Store | Category::Food)
    }

    fn extract_template(&self) -> &'static str {
        match self {
            Category::Store => EXTRACT_STORE_PROMPT,
            Category::Number => EXTRACT_NUMBER_PROMPT,
            Category::Food => EXTRACT_FOOD_PROMPT,
        }
    }

    fn filter_template(&self) -> Option<&'static str> {
        match self {
            Category::Store => Some(FILTER_STORE_PROMPT),
            Category::Food => Some(FILTER_FOOD_PROMPT),
            Category::Number => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "store" => Ok(Category::Store),
            "number" => Ok(Category::Number),
            "food" => Ok(Category::Food),
            other => Err(anyhow!("unknown category '{}'", other)),
        }
    }
}

pub fn render_extract_prompt(text: &str, category: Category) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("text", text);
    Tera::one_off(category.extract_template(), &context, false)
        .with_context(|| format!("failed to render {} extraction prompt", category))
}

pub fn render_filter_prompt(elements: &[TextElement], category: Category) -> Result<String> {
    let template = category
        .filter_template()
        .ok_or_else(|| anyhow!("category '{}' cannot filter image text", category))?;
    let text_list = elements
        .iter()
        .map(|element| format!("\"{}\"", element.text))
        .collect::<Vec<_>>()
        .join(", ");
    let mut context = TeraContext::new();
    context.insert("text_list", &text_list);
    Tera::one_off(template, &context, false)
        .with_context(|| format!("failed to render {} filter prompt", category))
}

/// Category extraction and filtering backed by a language model.
#[derive(Debug, Clone)]
pub struct SemanticService<P: Provider> {
    provider: P,
    reconcile: ReconcileConfig,
}

impl<P: Provider> SemanticService<P> {
    pub fn new(provider: P, reconcile: ReconcileConfig) -> Self {
        Self {
            provider,
            reconcile,
        }
    }

    /// Pulls the single category value out of noisy free text. Returns the
    /// model's answer verbatim, including the `NONE` sentinel.
    pub async fn extract_from_text(&self, text: &str, category: Category) -> Result<String> {
        let prompt = render_extract_prompt(text, category)?;
        let answer = self.ask(prompt).await?;
        info!("semantic: {} extraction answered '{}'", category, answer);
        Ok(answer)
    }

    /// Keeps the elements belonging to `category`, with the model's
    /// corrected spelling and the original coordinates.
    pub async fn filter_elements(
        &self,
        elements: &[TextElement],
        category: Category,
    ) -> Result<Vec<TextElement>> {
        if elements.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = render_filter_prompt(elements, category)?;
        let answer = self.ask(prompt).await?;
        debug!("semantic: {} filter answered '{}'", category, answer);
        let matched = reconcile(elements, &answer, &self.reconcile);
        info!(
            "semantic: {} filter kept {} of {} elements",
            category,
            matched.len(),
            elements.len()
        );
        Ok(matched)
    }

    async fn ask(&self, prompt: String) -> Result<String> {
        let response = self
            .provider
            .clone()
            .append_system_input(SYSTEM_PROMPT.trim().to_string())
            .append_user_input(prompt)
            .complete()
            .await?;
        match &response.usage {
            Some(usage) => debug!(
                "semantic: model={} tokens prompt={:?} completion={:?} total={:?}",
                response.model.as_deref().unwrap_or("unknown"),
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            ),
            None => debug!(
                "semantic: model={} (no usage reported)",
                response.model.as_deref().unwrap_or("unknown")
            ),
        }
        Ok(response.text.trim().to_string())
    }
}
