//! Descriptor pre-flight checks and response acceptance criteria.

use std::ops::RangeInclusive;

use thiserror::Error;

use crate::http::{Method, RequestDescriptor, ResponseHead};

/// Why a descriptor or response was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("GET request must not carry a body")]
    BodyDataInGetRequest,

    #[error("unacceptable status code {0}")]
    UnacceptableStatusCode(u16),

    #[error("unacceptable content type `{actual}`, expected one of [{}]", .acceptable.join(", "))]
    UnacceptableContentType { acceptable: Vec<String>, actual: String },

    #[error("response has no content type, expected one of [{}]", .acceptable.join(", "))]
    MissingContentType { acceptable: Vec<String> },
}

/// Reject descriptors that must never reach a transport.
pub fn validate_descriptor(descriptor: &RequestDescriptor) -> Result<(), ValidationFailure> {
    if *descriptor.method() == Method::Get && descriptor.body().is_some_and(|b| !b.is_empty()) {
        return Err(ValidationFailure::BodyDataInGetRequest);
    }
    Ok(())
}

/// Per-request response acceptance criteria. Empty means accept anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    statuses: Vec<RangeInclusive<u16>>,
    content_types: Vec<String>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only 2xx responses.
    pub fn success() -> Self {
        Self::new().with_status_range(200..=299)
    }

    pub fn with_status_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.statuses.push(range);
        self
    }

    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.statuses.extend(codes.into_iter().map(|c| c..=c));
        self
    }

    /// Accepted MIME types; `*/*` and `type/*` wildcards allowed.
    pub fn with_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_types
            .extend(types.into_iter().map(|t| t.into().to_ascii_lowercase()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty() && self.content_types.is_empty()
    }

    pub fn validate(&self, head: &ResponseHead) -> Result<(), ValidationFailure> {
        if !self.statuses.is_empty() && !self.statuses.iter().any(|r| r.contains(&head.status)) {
            return Err(ValidationFailure::UnacceptableStatusCode(head.status));
        }
        if self.content_types.is_empty() || has_no_content(head) {
            return Ok(());
        }

        let Some(actual) = head.mime_type() else {
            return Err(ValidationFailure::MissingContentType {
                acceptable: self.content_types.clone(),
            });
        };
        if self.content_types.iter().any(|accepted| mime_matches(accepted, &actual)) {
            Ok(())
        } else {
            Err(ValidationFailure::UnacceptableContentType {
                acceptable: self.content_types.clone(),
                actual,
            })
        }
    }
}

fn has_no_content(head: &ResponseHead) -> bool {
    matches!(head.status, 204 | 205) || head.content_length() == Some(0)
}

fn mime_matches(accepted: &str, actual: &str) -> bool {
    if accepted == "*/*" || accepted == actual {
        return true;
    }
    match (accepted.split_once('/'), actual.split_once('/')) {
        (Some((accepted_type, "*")), Some((actual_type, _))) => accepted_type == actual_type,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HeaderSet;

    fn head(status: u16, content_type: Option<&str>) -> ResponseHead {
        let mut headers = HeaderSet::new();
        if let Some(ct) = content_type {
            headers.set("Content-Type", ct);
        }
        ResponseHead::new(status, headers, "http://example.com")
    }

    #[test]
    fn test_get_with_body_rejected() {
        let get = RequestDescriptor::get("http://example.com").with_body("x");
        assert_eq!(validate_descriptor(&get), Err(ValidationFailure::BodyDataInGetRequest));

        let empty = RequestDescriptor::get("http://example.com").with_body("");
        assert!(validate_descriptor(&empty).is_ok());

        let post = RequestDescriptor::post("http://example.com").with_body("x");
        assert!(validate_descriptor(&post).is_ok());
    }

    #[test]
    fn test_status_validation() {
        let validation = Validation::success();
        assert!(validation.validate(&head(204, None)).is_ok());
        assert_eq!(
            validation.validate(&head(503, None)),
            Err(ValidationFailure::UnacceptableStatusCode(503))
        );
        assert!(Validation::new().validate(&head(503, None)).is_ok());
    }

    #[test]
    fn test_content_type_wildcards() {
        let validation = Validation::new().with_content_types(["application/json", "text/*"]);
        assert!(validation.validate(&head(200, Some("application/json; charset=utf-8"))).is_ok());
        assert!(validation.validate(&head(200, Some("text/html"))).is_ok());
        assert!(matches!(
            validation.validate(&head(200, Some("image/png"))),
            Err(ValidationFailure::UnacceptableContentType { .. })
        ));
        assert!(matches!(
            validation.validate(&head(200, None)),
            Err(ValidationFailure::MissingContentType { .. })
        ));
        assert!(validation.validate(&head(204, None)).is_ok());
    }
}
