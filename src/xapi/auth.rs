// Inbound statement message authentication

use regex::Regex;
use std::sync::LazyLock;

use crate::site::SiteContext;
use crate::xapi::{MESSAGE_ACTION, MESSAGE_CONTEXT, MESSAGE_ENVIRONMENT, XapiPostMessage};

static ACTIVITY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"xapi/activity/(\d+)").expect("activity id pattern"));

const SUBCONTENT_MARKER: &str = "subContentId=";

/// `object.id` of a statement, if present
pub fn statement_object_id(statement: &serde_json::Value) -> Option<&str> {
    statement.get("object")?.get("id")?.as_str()
}

/// Accept `data` only if it is a statement submission for the activity with
/// tracking context `context_id` on `site`.
///
/// Rejections are silent: any other window may post messages to the app.
pub fn authenticate_post(
    data: &serde_json::Value,
    site: &SiteContext,
    context_id: u64,
) -> Option<XapiPostMessage> {
    if data.is_null() {
        return None;
    }

    let message: XapiPostMessage = serde_json::from_value(data.clone()).ok()?;

    if message.environment != MESSAGE_ENVIRONMENT
        || message.context != MESSAGE_CONTEXT
        || message.action != MESSAGE_ACTION
    {
        return None;
    }

    let tracking_url = message.statements.first().and_then(statement_object_id)?;
    if tracking_url.is_empty() {
        return None;
    }

    if !site.contains_url(tracking_url) {
        log::debug!("Ignoring xAPI statement from another site: {}", tracking_url);
        return None;
    }

    let captured = ACTIVITY_ID.captures(tracking_url)?.get(1)?.as_str();
    if captured.parse::<u64>().ok()? != context_id {
        log::debug!("Ignoring xAPI statement for context {}", captured);
        return None;
    }

    Some(message)
}

/// Final statements are the ones that do not belong to a sub-content
pub fn has_ended(statements: &[serde_json::Value]) -> bool {
    statements
        .iter()
        .filter_map(statement_object_id)
        .any(|id| !id.contains(SUBCONTENT_MARKER))
}
