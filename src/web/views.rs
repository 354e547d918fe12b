use axum::response::Html;
use handlebars::Handlebars;
use serde::Serialize;

use crate::error::{AppError, AppResult};

const PARTIALS: [(&str, &str); 2] = [
    ("header", include_str!("templates/header.hbs")),
    ("footer", include_str!("templates/footer.hbs")),
];

const TEMPLATES: [(&str, &str); 4] = [
    ("entity_types", include_str!("templates/entity_types.hbs")),
    ("attributes", include_str!("templates/attributes.hbs")),
    ("record_form", include_str!("templates/record_form.hbs")),
    ("records_list", include_str!("templates/records_list.hbs")),
];

/// Compiled page templates, shared by all handlers
pub struct Views {
    registry: Handlebars<'static>,
}

impl Views {
    pub fn new() -> AppResult<Self> {
        let mut registry = Handlebars::new();

        for (name, source) in PARTIALS {
            registry.register_partial(name, source).map_err(|e| {
                AppError::TemplateError(format!("Failed to register partial {}: {}", name, e))
            })?;
        }
        for (name, source) in TEMPLATES {
            registry.register_template_string(name, source).map_err(|e| {
                AppError::TemplateError(format!("Failed to register template {}: {}", name, e))
            })?;
        }

        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> AppResult<Html<String>> {
        Ok(Html(self.registry.render(template, data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_templates_compile_and_escape() {
        let views = Views::new().unwrap();
        let Html(page) = views
            .render(
                "entity_types",
                &json!({
                    "title": "Entity types",
                    "types": [{"id": 1, "name": "<script>alert(1)</script>"}],
                }),
            )
            .unwrap();
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>alert"));
        assert!(page.contains("/records-list/1"));
    }

    #[test]
    fn test_error_is_rendered_inline() {
        let views = Views::new().unwrap();
        let Html(page) = views
            .render(
                "entity_types",
                &json!({"title": "Entity types", "types": [], "error": "Entity type already exists."}),
            )
            .unwrap();
        assert!(page.contains("Entity type already exists."));
        assert!(page.contains("No entity types yet."));
    }
}
