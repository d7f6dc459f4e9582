use async_trait::async_trait;
use serde::Deserialize;

use super::{join_documents, EngineError, TemplateEngine, TemplateFile};

/// Concatenates the YAML documents of every `.yaml`/`.yml` input without
/// evaluating templates.
///
/// Each document is parsed and re-serialized, so malformed YAML fails the
/// render. Empty documents are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainYamlEngine;

fn is_yaml(name: &str) -> bool {
    name.ends_with(".yaml") || name.ends_with(".yml")
}

#[async_trait]
impl TemplateEngine for PlainYamlEngine {
    async fn evaluate(&self, files: Vec<TemplateFile>) -> Result<String, EngineError> {
        let mut documents = Vec::new();

        for file in files.iter().filter(|f| is_yaml(&f.name)) {
            let text = std::str::from_utf8(&file.content)
                .map_err(|e| EngineError(format!("{}: {}", file.name, e)))?;

            for document in serde_yaml::Deserializer::from_str(text) {
                let value = serde_yaml::Value::deserialize(document)
                    .map_err(|e| EngineError(format!("{}: {}", file.name, e)))?;
                if value.is_null() {
                    continue;
                }
                let rendered = serde_yaml::to_string(&value)
                    .map_err(|e| EngineError(format!("{}: {}", file.name, e)))?;
                documents.push(rendered);
            }
        }

        Ok(join_documents(documents))
    }
}
