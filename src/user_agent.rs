//! User-Agent string sent with every API request.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/forms-client";

/// Default User-Agent for the API client.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("forms-client/{version} (+{PROJECT_UA_URL})")
}
