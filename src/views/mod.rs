//! Page rendering
//!
//! Templates live in `templates/` and are embedded into the binary, then
//! registered with Tera in one batch so `{% extends %}` chains resolve.

use rust_embed::RustEmbed;
use tera::{Context as TeraContext, Tera};

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct Templates;

/// Page rendering errors
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Template {0} is not valid UTF-8")]
    Encoding(String),
}

/// Renders the relay's HTML pages
pub struct Views {
    tera: Tera,
}

impl Views {
    /// Load the embedded templates
    pub fn new() -> Result<Self, ViewError> {
        let mut templates = Vec::new();
        for name in Templates::iter() {
            let Some(file) = Templates::get(&name) else {
                continue;
            };
            let content = String::from_utf8(file.data.into_owned())
                .map_err(|_| ViewError::Encoding(name.to_string()))?;
            templates.push((name.to_string(), content));
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)?;
        Ok(Self { tera })
    }

    fn render(&self, template: &str, context: &TeraContext) -> Result<String, ViewError> {
        Ok(self.tera.render(template, context)?)
    }

    /// Message submission page
    pub fn index(&self) -> Result<String, ViewError> {
        self.render("index.html", &TeraContext::new())
    }

    /// Login page linking into the provider's authorization flow
    pub fn login(&self, authorize_url: &str) -> Result<String, ViewError> {
        let mut context = TeraContext::new();
        context.insert("heading", "Log In");
        context.insert("authorize_url", authorize_url);
        self.render("login.html", &context)
    }

    /// Heading plus a line of text
    pub fn generic(&self, heading: &str, message: &str) -> Result<String, ViewError> {
        let mut context = TeraContext::new();
        context.insert("heading", heading);
        context.insert("message", message);
        self.render("generic.html", &context)
    }
}
