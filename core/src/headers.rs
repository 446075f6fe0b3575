//! Header storage and Content-Type defaulting.
//!
//! # Design
//! Header names are compared case-insensitively but stored as given, so the
//! descriptor handed to an adapter keeps the caller's spelling. Values on the
//! declaring side are `Option<String>`: `None` is an explicitly undefined
//! header, which is still a deliberate override and goes on the wire as the
//! literal `"undefined"`.

use serde::{Deserialize, Serialize};

use crate::http::RequestBody;

/// Default Content-Type for every body that is not a multipart form.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Wire value of a header that was declared without a value.
pub const UNDEFINED: &str = "undefined";

pub const CONTENT_TYPE: &str = "content-type";

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the first header named `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set `name`, replacing any existing header with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.0.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// Turn declared method headers into the headers sent on the wire.
///
/// Explicit headers always win, including an explicitly undefined
/// Content-Type. Without one, multipart bodies get no Content-Type (the
/// transport supplies it together with the boundary) and every other body
/// gets [`JSON_CONTENT_TYPE`].
pub fn resolve(declared: &[(String, Option<String>)], body: &RequestBody) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in declared {
        headers.insert(name.clone(), value.as_deref().unwrap_or(UNDEFINED));
    }
    if !headers.contains(CONTENT_TYPE) && !body.is_multipart() {
        headers.insert(CONTENT_TYPE, JSON_CONTENT_TYPE);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormData;

    fn declared(pairs: &[(&str, Option<&str>)]) -> Vec<(String, Option<String>)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn lookup_ignores_case() {
        let headers: Headers = [("Content-Type", "application/json")].into_iter().collect();
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(headers.get("accept"), None);
    }

    #[test]
    fn insert_replaces_regardless_of_case() {
        let mut headers = Headers::new();
        headers.insert("X-Token", "a");
        headers.insert("x-token", "b");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-TOKEN"), Some("b"));
    }

    #[test]
    fn json_content_type_is_the_default() {
        let headers = resolve(&[], &RequestBody::Json(serde_json::json!({})));
        assert_eq!(headers.get("content-type"), Some(JSON_CONTENT_TYPE));

        let headers = resolve(&[], &RequestBody::Empty);
        assert_eq!(headers.get("content-type"), Some(JSON_CONTENT_TYPE));
    }

    #[test]
    fn explicit_content_type_wins() {
        let headers = resolve(
            &declared(&[("Content-Type", Some("application/x-www-form-urlencoded"))]),
            &RequestBody::Json(serde_json::json!({})),
        );
        assert_eq!(headers.get("content-type"), Some("application/x-www-form-urlencoded"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn undefined_content_type_is_sent_literally() {
        let headers = resolve(
            &declared(&[("Content-Type", None)]),
            &RequestBody::Json(serde_json::json!({})),
        );
        assert_eq!(headers.get("content-type"), Some("undefined"));
    }

    #[test]
    fn multipart_body_leaves_content_type_unset() {
        let body = RequestBody::Form(FormData::new());
        let headers = resolve(&declared(&[("X-Trace", Some("1"))]), &body);
        assert_eq!(headers.get("content-type"), None);
        assert_eq!(headers.get("x-trace"), Some("1"));
    }

    #[test]
    fn multipart_body_honors_explicit_content_type() {
        let body = RequestBody::Form(FormData::new());
        let headers = resolve(
            &declared(&[("content-type", Some("application/x-www-form-urlencoded"))]),
            &body,
        );
        assert_eq!(headers.get("Content-Type"), Some("application/x-www-form-urlencoded"));
    }
}
