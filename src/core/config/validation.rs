use super::service::{AppConfig, ConfigError};

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let threshold = config.vector_store.similarity_threshold;
    if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
        return Err(invalid(
            "vector_store.similarity_threshold",
            format!("{} is outside [0, 1]", threshold),
        ));
    }

    if config.vector_store.top_k == 0 {
        return Err(invalid("vector_store.top_k", "must be at least 1"));
    }

    if config.search.max_documents == 0 {
        return Err(invalid("search.max_documents", "must be at least 1"));
    }

    if config.search.provider_timeout_secs == 0 {
        return Err(invalid("search.provider_timeout_secs", "must be at least 1"));
    }

    if config.app.request_timeout_secs == 0 {
        return Err(invalid("app.request_timeout_secs", "must be at least 1"));
    }

    if config.generation.max_output_tokens == 0 {
        return Err(invalid("generation.max_output_tokens", "must be at least 1"));
    }

    Ok(())
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let mut config = AppConfig::default();
        config.vector_store.similarity_threshold = 1.5;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "vector_store.similarity_threshold",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_bounds() {
        let mut config = AppConfig::default();
        config.search.max_documents = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.search.provider_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
