//! Capability catalog
//!
//! The fixed, ordered set of remote environment profiles a run rotates
//! through. Built once at process start from literal data plus the resolved
//! grid credentials; never mutated afterwards.

use serde::Serialize;
use urlencoding::encode;

use crate::config::Credentials;
use crate::errors::HarnessError;

/// Build label attached to every profile so the provider groups the sessions
/// of one harness version together.
pub const BUILD_LABEL: &str = "gridhook-rust-1";

/// One remote environment profile requested from the grid provider.
///
/// Field order matters: it is the order the provider sees in the serialized
/// `caps` query parameter. Every profile carries the same key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityProfile {
    pub browser: String,
    pub browser_version: String,
    pub os: String,
    pub os_version: String,
    /// Human-readable session name shown in the provider dashboard.
    /// Unique within the catalog.
    pub name: String,
    pub build: String,
    #[serde(rename = "browserstack.username")]
    pub username: String,
    #[serde(rename = "browserstack.accessKey")]
    pub access_key: String,
}

impl CapabilityProfile {
    fn new(
        browser: &str,
        browser_version: &str,
        os: &str,
        os_version: &str,
        name: &str,
        credentials: &Credentials,
    ) -> Self {
        Self {
            browser: browser.to_string(),
            browser_version: browser_version.to_string(),
            os: os.to_string(),
            os_version: os_version.to_string(),
            name: name.to_string(),
            build: BUILD_LABEL.to_string(),
            username: credentials.username.clone(),
            access_key: credentials.access_key.clone(),
        }
    }

    /// Serialize the profile into the provider wire format (compact JSON).
    pub fn to_wire_json(&self) -> String {
        // Serializing a struct of strings cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Build the ordered catalog of capability profiles.
///
/// Pure and deterministic: same credentials in, same catalog out, in the same
/// order every time.
pub fn catalog(credentials: &Credentials) -> Vec<CapabilityProfile> {
    vec![
        CapabilityProfile::new(
            "chrome",
            "latest",
            "osx",
            "catalina",
            "Branded Google Chrome on Catalina",
            credentials,
        ),
        CapabilityProfile::new(
            "edge",
            "latest",
            "osx",
            "catalina",
            "Branded Microsoft Edge on Catalina",
            credentials,
        ),
        CapabilityProfile::new(
            "playwright-chromium",
            "latest",
            "osx",
            "catalina",
            "Playwright Chromium on Catalina",
            credentials,
        ),
    ]
}

/// Build the grid connection endpoint for a profile.
///
/// Format: `<base>?caps=<url-encoded JSON serialization of the profile>`.
/// The base endpoint must be a valid absolute URL.
pub fn endpoint_url(base: &str, profile: &CapabilityProfile) -> Result<String, HarnessError> {
    url::Url::parse(base)
        .map_err(|e| HarnessError::Configuration(format!("invalid grid endpoint '{}': {}", base, e)))?;

    let caps = profile.to_wire_json();
    Ok(format!("{}?caps={}", base, encode(&caps)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            username: "user1".to_string(),
            access_key: "key1".to_string(),
        }
    }

    #[test]
    fn catalog_is_ordered_and_deterministic() {
        let a = catalog(&creds());
        let b = catalog(&creds());
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].browser, "chrome");
        assert_eq!(a[1].browser, "edge");
        assert_eq!(a[2].browser, "playwright-chromium");
    }

    #[test]
    fn session_names_are_unique() {
        let profiles = catalog(&creds());
        let names: std::collections::HashSet<_> = profiles.iter().map(|p| &p.name).collect();
        assert_eq!(names.len(), profiles.len());
    }

    #[test]
    fn every_profile_carries_the_same_key_set() {
        for profile in catalog(&creds()) {
            let value: serde_json::Value = serde_json::from_str(&profile.to_wire_json()).unwrap();
            let obj = value.as_object().unwrap();
            let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
            keys.sort_unstable();
            assert_eq!(
                keys,
                vec![
                    "browser",
                    "browser_version",
                    "browserstack.accessKey",
                    "browserstack.username",
                    "build",
                    "name",
                    "os",
                    "os_version",
                ]
            );
        }
    }

    #[test]
    fn credentials_come_from_config_not_literals() {
        let profiles = catalog(&creds());
        assert!(profiles.iter().all(|p| p.username == "user1"));
        assert!(profiles.iter().all(|p| p.access_key == "key1"));
    }

    #[test]
    fn endpoint_embeds_url_encoded_caps() {
        let profile = &catalog(&creds())[0];
        let url = endpoint_url("wss://cdp.browserstack.com/playwright", profile).unwrap();

        assert!(url.starts_with("wss://cdp.browserstack.com/playwright?caps="));
        // Encoded JSON: no raw braces or quotes may survive in the query
        let query = url.split("caps=").nth(1).unwrap();
        assert!(!query.contains('{') && !query.contains('"'));

        let decoded = urlencoding::decode(query).unwrap();
        let value: serde_json::Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(value["browser"], "chrome");
        assert_eq!(value["browserstack.username"], "user1");
    }

    #[test]
    fn endpoint_rejects_invalid_base() {
        let profile = &catalog(&creds())[0];
        let err = endpoint_url("not a url", profile).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }
}
