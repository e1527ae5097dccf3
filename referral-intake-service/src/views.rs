use minijinja::Environment;
use referral_extract::{Extraction, Field};
use serde::Serialize;

const PAGE_TEMPLATE: &str = "page.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    Image,
    Text,
}

#[derive(Debug, Serialize)]
struct ResultRow {
    key: &'static str,
    label: &'static str,
    value: String,
    found: bool,
}

/// Everything the page template can show. An error and a result are never
/// rendered together.
#[derive(Debug, Serialize)]
pub struct PageView {
    active_tab: Tab,
    text: String,
    file_names: Vec<String>,
    rows: Vec<ResultRow>,
    plain_text: Option<String>,
    raw_completion: Option<String>,
    request_id: Option<String>,
    error: Option<String>,
    model: String,
}

impl PageView {
    pub fn idle(model: &str) -> Self {
        Self {
            active_tab: Tab::Image,
            text: String::new(),
            file_names: Vec::new(),
            rows: Vec::new(),
            plain_text: None,
            raw_completion: None,
            request_id: None,
            error: None,
            model: model.to_string(),
        }
    }

    pub fn on_tab(mut self, tab: Tab) -> Self {
        self.active_tab = tab;
        self
    }

    /// Keeps the pasted letter in the text area after submit.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_file_names(mut self, file_names: Vec<String>) -> Self {
        self.file_names = file_names;
        self
    }

    pub fn with_extraction(mut self, extraction: &Extraction) -> Self {
        self.rows = Field::ALL
            .into_iter()
            .map(|field| ResultRow {
                key: field.key(),
                label: field.label(),
                value: extraction.result.get(field).to_string(),
                found: extraction.result.is_found(field),
            })
            .collect();
        self.plain_text = Some(extraction.result.to_plain_text());
        self.raw_completion = Some(extraction.raw_completion.clone());
        self.request_id = Some(extraction.request_id.clone());
        self.error = None;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.rows.clear();
        self.plain_text = None;
        self.raw_completion = None;
        self.request_id = None;
        self.error = Some(message.into());
        self
    }
}

/// Compiled page templates, shared by every request
pub struct PageRenderer {
    env: Environment<'static>,
}

impl PageRenderer {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(PAGE_TEMPLATE, include_str!("templates/page.html"))?;
        Ok(Self { env })
    }

    pub fn render(&self, view: &PageView) -> Result<String, minijinja::Error> {
        self.env.get_template(PAGE_TEMPLATE)?.render(view)
    }
}
