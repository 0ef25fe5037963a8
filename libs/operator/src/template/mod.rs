//! Template renderer producing manifest YAML from named templates and a
//! data dictionary, plus a patch composer applying strategic-merge patches
//! over a base manifest set ("kustomization"), per §2.2b.
//!
//! Grounded on `tera` for the renderer, the same templating engine used by
//! the deploy tooling in the example pack for exactly this "named template
//! + data dictionary → manifest YAML" shape.

pub mod patch;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};

use crate::error::Result;

/// Owns the compiled template catalog. One instance is built at startup
/// and shared (read-only after construction) across reconciliations.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Builds a renderer from `(name, source)` pairs. Manifest authoring
    /// itself is a peripheral concern (§1 Non-goals); this just compiles
    /// whatever catalog is handed to it.
    pub fn new(templates: &[(&str, &str)]) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates.to_vec())?;
        Ok(Self { tera })
    }

    /// Renders a named template against a data dictionary and parses the
    /// result as a single YAML manifest.
    pub fn render_manifest(&self, name: &str, data: &impl Serialize) -> Result<Value> {
        let yaml = self.render_yaml(name, data)?;
        Ok(serde_yaml::from_str(&yaml).map_err(|e| {
            crate::error::Error::TemplateError(tera::Error::msg(format!(
                "rendered template {name} is not valid YAML: {e}"
            )))
        })?)
    }

    /// Renders a named template against a data dictionary and returns the
    /// raw YAML text, for templates that expand to multiple `---`
    /// separated documents.
    pub fn render_yaml(&self, name: &str, data: &impl Serialize) -> Result<String> {
        let context = Context::from_serialize(data)?;
        Ok(self.tera.render(name, &context)?)
    }

    /// Splits a multi-document rendered template into individual manifest
    /// values, in source order — the order `apply` is required to
    /// preserve (§4.1).
    pub fn render_manifest_list(&self, name: &str, data: &impl Serialize) -> Result<Vec<Value>> {
        let yaml = self.render_yaml(name, data)?;
        let mut manifests = Vec::new();
        for document in serde_yaml::Deserializer::from_str(&yaml) {
            let value = Value::deserialize(document).map_err(|e| {
                crate::error::Error::TemplateError(tera::Error::msg(format!(
                    "rendered template {name} contains an invalid document: {e}"
                )))
            })?;
            if !value.is_null() {
                manifests.push(value);
            }
        }
        Ok(manifests)
    }
}

/// A component's parameter dictionary, ready to be handed to
/// [`Renderer::render_manifest`]. Component modules build one of these from
/// the configuration store plus resource-specific identifiers.
#[derive(Serialize, Default, Clone, Debug)]
pub struct TemplateData {
    pub values: HashMap<String, Value>,
}

impl TemplateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.values
            .insert(key.into(), serde_json::to_value(value).unwrap_or(Value::Null));
        self
    }
}
