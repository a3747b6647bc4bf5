//! Username/password extraction from form-encoded request bodies.

use std::fmt;

use axum::{
    extract::Multipart,
    http::{HeaderMap, header::CONTENT_TYPE},
};
use url::form_urlencoded;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

/// Username and password submitted for a password grant
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Username, never empty
    pub username: String,
    /// Password, never empty
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Username or password missing from the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("username or password is empty")]
pub struct MissingCredential;

/// Collects the first `username` and `password` values seen
#[derive(Default)]
struct Fields {
    username: Option<String>,
    password: Option<String>,
}

impl Fields {
    fn offer(&mut self, key: &str, value: impl FnOnce() -> String) {
        match key {
            "username" if self.username.is_none() => self.username = Some(value()),
            "password" if self.password.is_none() => self.password = Some(value()),
            _ => {}
        }
    }

    fn finish(self) -> Result<Credential, MissingCredential> {
        match (self.username, self.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Ok(Credential { username, password })
            }
            _ => Err(MissingCredential),
        }
    }
}

/// Extract a [`Credential`] from a form-encoded request body.
///
/// Only bodies sent as `application/x-www-form-urlencoded` are read here;
/// any other content type behaves like an empty form. Multipart bodies go
/// through [`extract_multipart`]. When a field repeats, the first value
/// wins. Values are not trimmed.
pub fn extract(headers: &HeaderMap, body: &[u8]) -> Result<Credential, MissingCredential> {
    if !has_mime(headers, FORM_CONTENT_TYPE) {
        return Err(MissingCredential);
    }

    let mut fields = Fields::default();
    for (key, value) in form_urlencoded::parse(body) {
        fields.offer(&key, || value.into_owned());
    }
    fields.finish()
}

/// Extract a [`Credential`] from the text parts of a `multipart/form-data`
/// body. File parts are skipped and an unreadable body counts as empty.
pub async fn extract_multipart(mut multipart: Multipart) -> Result<Credential, MissingCredential> {
    let mut fields = Fields::default();
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name != "username" && name != "password" {
            continue;
        }
        let Ok(value) = field.text().await else {
            break;
        };
        fields.offer(&name, || value);
    }
    fields.finish()
}

/// Whether the request body is `multipart/form-data`
pub fn is_multipart(headers: &HeaderMap) -> bool {
    has_mime(headers, MULTIPART_CONTENT_TYPE)
}

fn has_mime(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(expected))
}
