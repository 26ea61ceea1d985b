//! Template registry.
//!
//! A template document is a JSON file with a top-level `templates` list.
//! Each template names its latent variables, carries one natural-language
//! CPD instruction per variable and declares the output shape the oracle
//! must fill in.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{ConfigError, NotFoundError};

/// Template used when none is configured.
pub const DEFAULT_TEMPLATE_ID: &str = "scienceqa_vpgm_4latent_generic";

/// One vPGM scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Latent name -> instruction text. Opaque, rendered verbatim.
    #[serde(default)]
    pub verbal_cpd_templates: Map<String, Value>,

    /// Declared output shape.
    #[serde(default)]
    pub instance_fields: Map<String, Value>,
}

impl Template {
    /// Id an instance must carry: the template's own id, or the one
    /// embedded in `instance_fields.template_id`.
    pub fn expected_id(&self) -> Option<&str> {
        self.id.as_deref().or_else(|| {
            self.instance_fields
                .get("template_id")
                .and_then(Value::as_str)
        })
    }

    /// Latent variable names the instance must contain, in declaration order.
    ///
    /// Read from `instance_fields.latent_posteriors`: object keys, or the
    /// string elements when it is declared as a list.
    pub fn required_latents(&self) -> Vec<&str> {
        match self.instance_fields.get("latent_posteriors") {
            Some(Value::Object(map)) => map.keys().map(String::as_str).collect(),
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// The whole template file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDocument {
    #[serde(default)]
    pub templates: Vec<Template>,
}

impl TemplateDocument {
    /// Read and parse a template document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: TemplateDocument =
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            "Loaded {} templates from {}",
            doc.templates.len(),
            path.display()
        );
        Ok(doc)
    }

    /// Exact, case-sensitive lookup.
    pub fn resolve(&self, id: &str) -> Result<&Template, NotFoundError> {
        self.templates
            .iter()
            .find(|t| t.id.as_deref() == Some(id))
            .ok_or_else(|| NotFoundError::Template(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.templates.iter().filter_map(|t| t.id.as_deref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn doc() -> TemplateDocument {
        serde_json::from_value(json!({
            "templates": [
                {
                    "id": "T",
                    "verbal_cpd_templates": {"L2": "second", "L1": "first"},
                    "instance_fields": {
                        "template_id": "T",
                        "latent_posteriors": {"L2": {}, "L1": {}}
                    }
                },
                {"id": "other"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_resolve_exact_match() {
        let doc = doc();
        assert_eq!(doc.resolve("T").unwrap().id.as_deref(), Some("T"));
        assert_eq!(doc.ids(), vec!["T", "other"]);
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let err = doc().resolve("t").unwrap_err();
        assert_eq!(err, NotFoundError::Template("t".into()));
    }

    #[test]
    fn test_required_latents_keep_declaration_order() {
        let doc = doc();
        assert_eq!(doc.resolve("T").unwrap().required_latents(), vec!["L2", "L1"]);
        assert!(doc.resolve("other").unwrap().required_latents().is_empty());
    }

    #[test]
    fn test_required_latents_from_list() {
        let t: Template = serde_json::from_value(json!({
            "id": "T",
            "instance_fields": {"latent_posteriors": ["A", "B"]}
        }))
        .unwrap();
        assert_eq!(t.required_latents(), vec!["A", "B"]);
    }

    #[test]
    fn test_expected_id_falls_back_to_instance_fields() {
        let t: Template = serde_json::from_value(json!({
            "instance_fields": {"template_id": "embedded"}
        }))
        .unwrap();
        assert_eq!(t.expected_id(), Some("embedded"));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = TemplateDocument::load("/nonexistent/prompt_template.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = TemplateDocument::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }
}
