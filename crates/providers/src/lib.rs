//! Model provider implementations for Patchloop.
//!
//! All providers implement the `patchloop_core::Model` trait. The agent uses
//! two models: the main conversational model and the code editor model that
//! turns edit instructions into search/replace blocks.

pub mod gemini;

pub use gemini::GeminiModel;

use patchloop_config::AppConfig;
use patchloop_core::error::ModelError;
use patchloop_core::model::Model;
use std::sync::Arc;

/// The models a session talks to.
pub struct Models {
    pub main: Arc<dyn Model>,
    pub editor: Arc<dyn Model>,
}

/// Build the main and editor models from configuration.
pub fn build_from_config(config: &AppConfig) -> Result<Models, ModelError> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| ModelError::NotConfigured("no API key configured".into()))?;

    let main = GeminiModel::new(api_key.clone(), &config.model)?
        .with_generation(config.temperature, config.max_output_tokens);
    let editor = GeminiModel::new(api_key, &config.editor_model)?
        .with_generation(config.temperature, config.max_output_tokens);

    Ok(Models {
        main: Arc::new(main),
        editor: Arc::new(editor),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let config = AppConfig {
            api_key: None,
            ..AppConfig::default()
        };
        assert!(matches!(
            build_from_config(&config),
            Err(ModelError::NotConfigured(_))
        ));
    }

    #[test]
    fn builds_both_models() {
        let config = AppConfig {
            api_key: Some("k".into()),
            ..AppConfig::default()
        };
        let models = build_from_config(&config).unwrap();
        assert_eq!(models.main.name(), "gemini");
        assert_eq!(models.editor.name(), "gemini");
    }
}
