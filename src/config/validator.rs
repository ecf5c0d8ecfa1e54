use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{ReelseekError, Result, ValidationError};
use std::collections::HashSet;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every problem at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_catalogue(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_store(config, &mut errors);
        Self::validate_benchmark(config, &mut errors);
        Self::validate_indexes(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReelseekError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_catalogue(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is checked when the catalogue is loaded
        if config.catalogue.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "catalogue.path",
                "Catalogue path cannot be empty",
            ));
        }

        if config.catalogue.text_field.trim().is_empty() {
            errors.push(ValidationError::new(
                "catalogue.text_field",
                "Text field cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        let valid_providers = ["openai", "fastembed"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Vector dimension must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if provider == "openai" && !config.embedding.api_base.starts_with("http") {
            errors.push(ValidationError::new(
                "embedding.api_base",
                format!("API base must be an http(s) URL, got '{}'", config.embedding.api_base),
            ));
        }
    }

    fn validate_store(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.store.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "store.path",
                "Store path cannot be empty",
            ));
        }

        if config.store.default_top_k == 0 {
            errors.push(ValidationError::new(
                "store.default_top_k",
                "Default top-k must be greater than 0",
            ));
        }
    }

    fn validate_benchmark(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.benchmark.top_k == 0 {
            errors.push(ValidationError::new(
                "benchmark.top_k",
                "Top-k must be greater than 0",
            ));
        }
    }

    fn validate_indexes(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexes.is_empty() {
            errors.push(ValidationError::new(
                "indexes",
                "At least one index configuration is required",
            ));
        }

        let mut seen = HashSet::new();
        for (i, index) in config.indexes.iter().enumerate() {
            let name = index.collection_name();
            if !seen.insert(name.clone()) {
                errors.push(ValidationError::new(
                    format!("indexes[{}]", i),
                    format!("Duplicate collection {} ({})", name, index.label()),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{IndexConfiguration, IndexType, MetricType};

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.embedding.provider = "word2vec".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_collections() {
        let mut config = Config::default();
        config
            .indexes
            .push(IndexConfiguration::new(IndexType::Hnsw, MetricType::L2).with_param("M", 32));

        match ConfigValidator::validate(&config) {
            Err(ReelseekError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, "indexes[2]");
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        config.embedding.batch_size = 0;
        config.indexes.clear();

        match ConfigValidator::validate(&config) {
            Err(ReelseekError::ConfigValidation { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
