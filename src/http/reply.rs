// CLASSIFICATION: COMMUNITY
// Filename: reply.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Transport-neutral HTTP replies and the service's error rendering.

use chrono::{DateTime, Utc};
use datapond_lake::LakeError;
use serde::Serialize;

/// Value of the `x-ms-version` header on every reply.
pub const API_VERSION: &str = "2021-06-08";

pub const REQUEST_ID: &str = "x-ms-request-id";
pub const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
pub const VERSION: &str = "x-ms-version";
pub const ERROR_CODE: &str = "x-ms-error-code";

/// Status, headers and body of a response before it meets the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: &'a str,
}

impl Reply {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn bytes(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/octet-stream".into())],
            body,
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                headers: vec![("Content-Type".into(), "application/json".into())],
                body,
            },
            Err(err) => Self::error(500, "InternalError", &err.to_string()),
        }
    }

    /// Service error: status, `x-ms-error-code` and a JSON body.
    pub fn error(status: u16, code: &str, message: &str) -> Self {
        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        let mut reply = Self::empty(status);
        reply.body = serde_json::to_vec(&body).unwrap_or_default();
        reply
            .with_header("Content-Type", "application/json")
            .with_header(ERROR_CODE, code)
    }

    pub fn missing_query(name: &str) -> Self {
        Self::error(
            400,
            "MissingRequiredQueryParameter",
            &format!("A query parameter that's mandatory for this request is not specified: {}", name),
        )
    }

    pub fn invalid_query(name: &str) -> Self {
        Self::error(
            400,
            "InvalidQueryParameterValue",
            &format!("Value for query parameter {} is invalid.", name),
        )
    }

    pub fn invalid_header(name: &str) -> Self {
        Self::error(
            400,
            "InvalidHeaderValue",
            &format!("The value for header {} is not in the correct format.", name),
        )
    }

    pub fn method_not_allowed() -> Self {
        Self::error(
            405,
            "UnsupportedHttpVerb",
            "The resource doesn't support the specified HTTP verb.",
        )
    }

    pub fn forbidden() -> Self {
        Self::error(
            403,
            "AuthorizationFailure",
            "This request is not authorized to perform this operation.",
        )
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// `ETag` and `Last-Modified` of a resource.
    pub fn stamped(self, etag: &str, modified: &DateTime<Utc>) -> Self {
        self.with_header("ETag", etag)
            .with_header("Last-Modified", http_date(modified))
    }

    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Code carried by an error reply.
    pub fn error_code(&self) -> Option<&str> {
        self.header(ERROR_CODE)
    }
}

impl From<LakeError> for Reply {
    fn from(err: LakeError) -> Self {
        Reply::error(status_of(&err), err.code(), &err.to_string())
    }
}

/// HTTP status the service uses for an engine error.
pub fn status_of(err: &LakeError) -> u16 {
    match err {
        LakeError::PathNotFound { .. } | LakeError::NotFound { .. } => 404,
        LakeError::PathConflict { .. }
        | LakeError::AlreadyExists { .. }
        | LakeError::DirectoryNotEmpty { .. }
        | LakeError::NotADirectory { .. } => 409,
        LakeError::InvalidOffset { .. }
        | LakeError::InvalidName { .. }
        | LakeError::RootNotDeletable { .. } => 400,
        LakeError::RangeNotSatisfiable { .. } => 416,
        LakeError::SimulatedServiceFailure => 503,
        LakeError::InvalidConfig(_) | LakeError::StorageIo(_) => 500,
    }
}

/// RFC 7231 date, as used by `Last-Modified`.
pub fn http_date(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn engine_errors_render_with_code_header_and_body() {
        let reply = Reply::from(LakeError::SimulatedServiceFailure);
        assert_eq!(reply.status, 503);
        assert_eq!(reply.error_code(), Some("ServerBusy"));
        let body: serde_json::Value = serde_json::from_slice(&reply.body).expect("json");
        assert_eq!(body["error"]["code"], "ServerBusy");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap_or_default()
            .contains("Please retry"));
    }

    #[test]
    fn status_table() {
        assert_eq!(status_of(&LakeError::PathNotFound { path: "a".into() }), 404);
        assert_eq!(status_of(&LakeError::DirectoryNotEmpty { path: "a".into() }), 409);
        assert_eq!(
            status_of(&LakeError::RangeNotSatisfiable {
                start: 1,
                len: 1,
                committed: 0
            }),
            416
        );
        assert_eq!(status_of(&LakeError::InvalidName { name: "a b".into() }), 400);
    }

    #[test]
    fn dates_use_http_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).single().expect("date");
        assert_eq!(http_date(&at), "Tue, 05 Mar 2024 07:08:09 GMT");
    }
}
