use crate::config::Config;
use crate::error::{Result, SnappyError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_retriever(config, &mut errors);
        Self::validate_tokenizer(config, &mut errors);
        Self::validate_registry(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SnappyError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_retriever(config: &Config, errors: &mut Vec<ValidationError>) {
        let retriever = &config.retriever;

        if !retriever.k1.is_finite() || retriever.k1 <= 0.0 {
            errors.push(ValidationError::new(
                "retriever.k1",
                format!("k1 must be a positive number, got {}", retriever.k1),
            ));
        }

        if !(0.0..=1.0).contains(&retriever.b) {
            errors.push(ValidationError::new(
                "retriever.b",
                format!("b must be within [0, 1], got {}", retriever.b),
            ));
        }

        if retriever.k == 0 {
            errors.push(ValidationError::new(
                "retriever.k",
                "k must be greater than 0",
            ));
        }
    }

    fn validate_tokenizer(config: &Config, errors: &mut Vec<ValidationError>) {
        let tokenizer = &config.retriever.tokenizer;

        if !(1..=4).contains(&tokenizer.cjk_ngram) {
            errors.push(ValidationError::new(
                "retriever.tokenizer.cjk_ngram",
                format!("cjk_ngram must be between 1 and 4, got {}", tokenizer.cjk_ngram),
            ));
        }

        if tokenizer.max_text_bytes == 0 {
            errors.push(ValidationError::new(
                "retriever.tokenizer.max_text_bytes",
                "max_text_bytes must be greater than 0",
            ));
        }
    }

    fn validate_registry(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.registry.ttl_hours == 0 {
            errors.push(ValidationError::new(
                "registry.ttl_hours",
                "ttl_hours must be greater than 0",
            ));
        }
    }
}
