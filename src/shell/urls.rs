// URLs loaded in the in-app browser
//
// Pages opened in the in-app browser may try to leave it through custom
// schemes (login tokens, other apps). Each load is classified here and the
// shell applies the resulting action.

use regex::Regex;
use std::sync::LazyLock;

static PROTOCOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^/:.?]*)://").expect("protocol pattern"));

/// Schemes that stay inside the app
const LOCAL_SCHEMES: [&str; 2] = ["file", "cdvfile"];

/// Scheme of `url` without the `://`, if it has one
pub fn get_url_protocol(url: &str) -> Option<&str> {
    PROTOCOL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|scheme| !scheme.is_empty())
}

/// Remove a leading `http://` or `https://`
pub fn strip_http_prefix(url: &str) -> &str {
    url.strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url)
}

/// What to do with a URL loaded in the in-app browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InAppUrlAction {
    /// App URL scheme: handle it and close the browser
    HandleCustomUrl(String),
    /// Login token meant for another app: close the browser and report it
    RejectSsoToken { scheme: String },
    /// Android only: open the other app through the system browser
    OpenExternalApp(String),
    /// Android only: regular page, remember it as the last loaded URL
    Remember(String),
    Ignore,
}

/// Classify a URL the in-app browser started loading
pub fn classify_in_app_url(
    raw_url: &str,
    is_custom_url: impl Fn(&str) -> bool,
    is_android: bool,
) -> InAppUrlAction {
    // Custom schemes can arrive prefixed with http(s)://
    let url = strip_http_prefix(raw_url);
    let scheme = get_url_protocol(url);
    let external_scheme = scheme.filter(|scheme| !LOCAL_SCHEMES.contains(scheme));

    if is_custom_url(url) {
        return InAppUrlAction::HandleCustomUrl(url.to_string());
    }

    if let Some(scheme) = external_scheme {
        if url.contains("://token=") {
            return InAppUrlAction::RejectSsoToken {
                scheme: scheme.to_string(),
            };
        }
    }

    if !is_android {
        return InAppUrlAction::Ignore;
    }

    match external_scheme {
        Some(_) => InAppUrlAction::OpenExternalApp(url.to_string()),
        // Keep the original protocol so the page can be reopened as loaded
        None => InAppUrlAction::Remember(raw_url.to_string()),
    }
}
