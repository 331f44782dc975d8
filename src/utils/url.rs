//! Base URL handling for provider endpoints.

use crate::core::error::{ChatError, ChatResult};

/// Strips surrounding whitespace and trailing slashes so endpoints can be
/// appended without doubling separators.
///
/// ```
/// use chatdesk::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url(" https://api.example.com/v1/ "), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Joins a base URL and an endpoint path with exactly one slash.
///
/// ```
/// use chatdesk::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://openrouter.ai/api/v1/", "/chat/completions"),
///     "https://openrouter.ai/api/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        normalize_base_url(base_url),
        endpoint.trim_start_matches('/')
    )
}

/// Normalizes a user-supplied base URL, rejecting anything that is not http(s).
pub fn validate_base_url(base_url: &str) -> ChatResult<String> {
    let normalized = normalize_base_url(base_url);
    let has_host = normalized
        .strip_prefix("https://")
        .or_else(|| normalized.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty());
    if !has_host {
        return Err(ChatError::InvalidValue {
            field: "base_url",
            reason: format!("'{base_url}' is not an http(s) URL"),
        });
    }
    Ok(normalized)
}
