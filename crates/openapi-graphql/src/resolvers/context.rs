use std::{collections::BTreeMap, sync::Arc};

use async_graphql::dynamic::ResolverContext;
use itertools::Itertools;
use serde_json::{Map, Value};

use crate::model::HttpMethod;

/// The request we sent for a call.
#[derive(Clone, Debug)]
pub struct UsedRequest {
    pub method: HttpMethod,
    pub url: url::Url,
    pub headers: http::HeaderMap,
}

/// Everything descendants of a field might want to know about the call that resolved it.
#[derive(Clone, Debug, Default)]
pub struct CallRecord {
    /// Argument name -> the value that was actually used.
    pub used_params: Map<String, Value>,
    pub used_payload: Option<Value>,
    /// Absent when a custom resolver handled the call.
    pub used_request: Option<UsedRequest>,
    pub status_code: Option<u16>,
    pub response_headers: http::HeaderMap,
}

/// Travels alongside every value produced beneath a root field.
///
/// It is never mutated once shared: resolvers that add to it produce a new
/// context for the values they return.
#[derive(Clone, Debug, Default)]
pub struct ResolutionContext {
    /// Keyed by the path of the field that made the call, without list indices.
    calls: BTreeMap<String, Arc<CallRecord>>,
    /// Credentials supplied through viewers, keyed by the sanitized scheme name.
    security: BTreeMap<String, Map<String, Value>>,
}

impl ResolutionContext {
    pub fn call(&self, identifier: &str) -> Option<&CallRecord> {
        self.calls.get(identifier).map(Arc::as_ref)
    }

    pub fn with_call(&self, identifier: String, record: CallRecord) -> Arc<Self> {
        let mut context = self.clone();
        context.calls.insert(identifier, Arc::new(record));
        Arc::new(context)
    }

    pub fn credentials(&self, key: &str) -> Option<&Map<String, Value>> {
        self.security.get(key)
    }

    pub fn with_credentials(&self, credentials: impl IntoIterator<Item = (String, Map<String, Value>)>) -> Arc<Self> {
        let mut context = self.clone();
        context.security.extend(credentials);
        Arc::new(context)
    }
}

/// The parent value of every object field we generate.
#[derive(Debug)]
pub struct ResolvedValue {
    /// The payload with sanitized keys.
    pub data: Value,
    pub context: Arc<ResolutionContext>,
}

/// The response path of the field being resolved, e.g. `["users", "0", "employer"]`
pub(crate) fn field_path(ctx: &ResolverContext<'_>) -> Vec<String> {
    ctx.path_node.map(|node| node.to_string_vec()).unwrap_or_default()
}

/// Identifies a field independently of the list items it's nested in.
pub(crate) fn path_identifier(path: &[String]) -> String {
    path.iter()
        .filter(|segment| !segment.chars().all(|c| c.is_ascii_digit()))
        .join(".")
}

/// The identifier of the field whose call produced the parent of `path`.
pub(crate) fn parent_identifier(path: &[String]) -> String {
    match path.split_last() {
        Some((_, parent)) => path_identifier(parent),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|segment| segment.to_string()).collect()
    }

    #[rstest]
    #[case(&["user"], "user", "")]
    #[case(&["user", "employerCompany"], "user.employerCompany", "user")]
    #[case(&["users", "3", "employerCompany"], "users.employerCompany", "users")]
    #[case(
        &["viewerApiKey", "users", "0", "cars", "12", "owner"],
        "viewerApiKey.users.cars.owner",
        "viewerApiKey.users.cars"
    )]
    fn test_identifiers(#[case] segments: &[&str], #[case] identifier: &str, #[case] parent: &str) {
        assert_eq!(path_identifier(&path(segments)), identifier);
        assert_eq!(parent_identifier(&path(segments)), parent);
    }

    #[test]
    fn test_contexts_are_copied_not_shared() {
        let root = Arc::new(ResolutionContext::default());

        let mut record = CallRecord::default();
        record.used_params.insert("username".into(), json!("erik"));
        let child = root.with_call("user".into(), record);

        let mut credentials = Map::new();
        credentials.insert("apiKey".into(), json!("secret"));
        let grandchild = child.with_credentials([("apiKey".to_string(), credentials)]);

        assert!(root.call("user").is_none());
        assert_eq!(child.call("user").unwrap().used_params["username"], json!("erik"));
        assert!(child.credentials("apiKey").is_none());
        assert_eq!(grandchild.credentials("apiKey").unwrap()["apiKey"], json!("secret"));
        assert!(grandchild.call("user").is_some());
    }
}
