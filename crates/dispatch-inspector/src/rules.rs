use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// One user-configured header override: replace or add `key: value` in the
/// outbound request before it leaves the proxy. Disabled rules are kept
/// around (so the UI can re-enable them) but never applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderOverrideRule {
    pub id: String,
    pub enabled: bool,
    pub key: String,
    pub value: String,
}

/// Applies every enabled rule, in order, to `headers`. Unlisted headers pass
/// through untouched. A rule whose key or value isn't valid header syntax is
/// skipped rather than failing the whole request.
pub fn apply_header_overrides(headers: &mut HeaderMap, rules: &[HeaderOverrideRule]) {
    for rule in rules.iter().filter(|rule| rule.enabled) {
        let Ok(name) = HeaderName::from_bytes(rule.key.as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(&rule.value) else {
            continue;
        };
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_rule_overrides_an_existing_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("original"));
        let rules = vec![HeaderOverrideRule {
            id: "r1".to_string(),
            enabled: true,
            key: "x-api-key".to_string(),
            value: "overridden".to_string(),
        }];
        apply_header_overrides(&mut headers, &rules);
        assert_eq!(headers.get("x-api-key").unwrap(), "overridden");
    }

    #[test]
    fn disabled_rule_is_never_applied() {
        let mut headers = HeaderMap::new();
        let rules = vec![HeaderOverrideRule {
            id: "r1".to_string(),
            enabled: false,
            key: "x-custom".to_string(),
            value: "should-not-appear".to_string(),
        }];
        apply_header_overrides(&mut headers, &rules);
        assert!(headers.get("x-custom").is_none());
    }
}
