use quill_core::config::GatewayConfig;

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// What the request authenticated as; "anonymous" when no key is
    /// configured.
    pub name: String,
}

/// Validate the X-API-Key header against the configured key.
///
/// No configured key means open access. A configured key must match
/// exactly; a missing or wrong header is a failure, never a fallback to
/// anonymous.
pub fn validate_api_key(config: &GatewayConfig, provided: Option<&str>) -> Option<AuthResult> {
    match &config.api_key {
        None => Some(AuthResult {
            name: "anonymous".into(),
        }),
        Some(expected) => {
            if provided == Some(expected.as_str()) {
                Some(AuthResult {
                    name: "api-key".into(),
                })
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(api_key: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            api_key: api_key.map(|s| s.to_string()),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_no_key_configured_allows_everything() {
        let config = gateway(None);
        assert!(validate_api_key(&config, None).is_some());
        // An unexpected header is ignored, not rejected.
        assert!(validate_api_key(&config, Some("anything")).is_some());
    }

    #[test]
    fn test_configured_key_must_match() {
        let config = gateway(Some("secret"));
        assert!(validate_api_key(&config, None).is_none());
        assert!(validate_api_key(&config, Some("wrong")).is_none());
        let auth = validate_api_key(&config, Some("secret")).unwrap();
        assert_eq!(auth.name, "api-key");
    }
}
