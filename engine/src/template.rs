//! Campaign template rendering.
//!
//! Placeholders resolve through an explicit mapping: the statically known
//! accessors (`email`, `name`, `company`) first, then the item's metadata
//! table. Unknown placeholders render empty, so substitution is total and a
//! bad template never fails an individual item.

use std::collections::BTreeMap;

use minijinja::Environment;

use crate::error::{EngineError, EngineResult};
use crate::model::WorkItem;
use crate::provider::RenderedMessage;

/// Subject and body sources with `{{ placeholder }}` syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignTemplate {
    pub subject: String,
    pub body: String,
}

impl CampaignTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Compile-check both sources. Run once before a job touches any item;
    /// a syntax error here is a configuration problem, not an item failure.
    pub fn validate(&self) -> EngineResult<()> {
        let env = Environment::new();
        env.template_from_str(&self.subject)
            .map_err(|e| EngineError::Template(format!("subject: {e}")))?;
        env.template_from_str(&self.body)
            .map_err(|e| EngineError::Template(format!("body: {e}")))?;
        Ok(())
    }

    /// Render both sources for one recipient.
    pub fn render(&self, item: &WorkItem) -> Result<RenderedMessage, minijinja::Error> {
        let env = Environment::new();
        let vars = placeholder_vars(item);
        Ok(RenderedMessage {
            subject: env.render_str(&self.subject, &vars)?,
            body: env.render_str(&self.body, &vars)?,
        })
    }
}

/// Metadata first, then the known accessors, so a metadata key can never
/// shadow `email`, `name` or `company`.
fn placeholder_vars(item: &WorkItem) -> BTreeMap<String, String> {
    let mut vars = item.metadata.clone();
    vars.insert("email".to_string(), item.email.clone());
    vars.insert("name".to_string(), item.name.clone().unwrap_or_default());
    vars.insert(
        "company".to_string(),
        item.company.clone().unwrap_or_default(),
    );
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem::new("ada@example.com")
            .with_name("Ada")
            .with_company("Analytical Engines")
            .with_metadata("plan", "premium")
    }

    #[test]
    fn renders_known_accessors_and_metadata() {
        let template = CampaignTemplate::new(
            "Hi {{ name }}",
            "Your {{ plan }} plan at {{ company }} is ready, {{ email }}.",
        );
        let rendered = template.render(&item()).unwrap();
        assert_eq!(rendered.subject, "Hi Ada");
        assert_eq!(
            rendered.body,
            "Your premium plan at Analytical Engines is ready, ada@example.com."
        );
    }

    #[test]
    fn unknown_placeholders_render_empty() {
        let template = CampaignTemplate::new("Hi {{ nickname }}", "Hello {{ name }}");
        let rendered = template.render(&item()).unwrap();
        assert_eq!(rendered.subject, "Hi ");
    }

    #[test]
    fn metadata_cannot_shadow_known_accessors() {
        let sneaky = item().with_metadata("email", "spoof@example.com");
        let template = CampaignTemplate::new("{{ email }}", "-");
        let rendered = template.render(&sneaky).unwrap();
        assert_eq!(rendered.subject, "ada@example.com");
    }

    #[test]
    fn validate_rejects_broken_syntax() {
        let template = CampaignTemplate::new("Hi {{ name", "body");
        assert!(template.validate().is_err());

        let template = CampaignTemplate::new("Hi {{ name }}", "{{ plan }}");
        assert!(template.validate().is_ok());
    }
}
