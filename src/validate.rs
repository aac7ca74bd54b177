//! Submission validation and sanitization.
//!
//! Pure functions only: no I/O, deterministic for a given input.
use serde_json::Value;
use thiserror::Error;

use crate::model::EntryDraft;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Client-caused rejection. The display text is returned to the caller verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name and message are required")]
    Missing,
    #[error("Name and message must be strings")]
    NotText,
    #[error("Name must be 100 characters or less")]
    NameTooLong,
    #[error("Message must be 1000 characters or less")]
    MessageTooLong,
}

/// Raw `(name, message)` pair as received, of unknown type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSubmission {
    pub name: Option<Value>,
    pub message: Option<Value>,
}

impl RawSubmission {
    /// Pull `name` and `message` out of a request body. Non-object bodies
    /// yield an empty submission.
    pub fn from_json(body: &Value) -> Self {
        Self {
            name: body.get("name").cloned(),
            message: body.get("message").cloned(),
        }
    }

    pub fn text(name: &str, message: &str) -> Self {
        Self {
            name: Some(Value::String(name.to_string())),
            message: Some(Value::String(message.to_string())),
        }
    }
}

/// Run the checks in order, short-circuiting on the first failure, then
/// trim and cap both fields.
pub fn validate(raw: &RawSubmission) -> Result<EntryDraft, ValidationError> {
    if is_missing(raw.name.as_ref()) || is_missing(raw.message.as_ref()) {
        return Err(ValidationError::Missing);
    }
    let (Some(Value::String(name)), Some(Value::String(message))) = (&raw.name, &raw.message)
    else {
        return Err(ValidationError::NotText);
    };
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::NameTooLong);
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong);
    }

    Ok(EntryDraft {
        name: sanitize(name, MAX_NAME_CHARS),
        message: sanitize(message, MAX_MESSAGE_CHARS),
    })
}

/// Absent, null, or blank text counts as missing. Non-text values are left
/// for the type check.
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Trim, then cap to `max` characters. The cap is kept even though the
/// length check already ran.
fn sanitize(input: &str, max: usize) -> String {
    input.trim().chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_and_trims() {
        let draft = validate(&RawSubmission::text("  Ann ", "\tHi there\n")).unwrap();
        assert_eq!(draft.name, "Ann");
        assert_eq!(draft.message, "Hi there");
    }

    #[test]
    fn missing_fields_rejected() {
        let cases = [
            json!({}),
            json!({ "name": "Ann" }),
            json!({ "message": "Hi" }),
            json!({ "name": null, "message": "Hi" }),
            json!({ "name": "", "message": "Hi" }),
            json!({ "name": "Ann", "message": "   " }),
            json!("just a string"),
        ];
        for body in cases {
            assert_eq!(
                validate(&RawSubmission::from_json(&body)),
                Err(ValidationError::Missing),
                "body: {body}"
            );
        }
    }

    #[test]
    fn non_text_rejected() {
        let cases = [
            json!({ "name": 5, "message": "Hi" }),
            json!({ "name": "Ann", "message": ["Hi"] }),
            json!({ "name": true, "message": { "text": "Hi" } }),
        ];
        for body in cases {
            assert_eq!(
                validate(&RawSubmission::from_json(&body)),
                Err(ValidationError::NotText),
                "body: {body}"
            );
        }
    }

    #[test]
    fn presence_checked_before_type() {
        let body = json!({ "name": 5, "message": "" });
        assert_eq!(
            validate(&RawSubmission::from_json(&body)),
            Err(ValidationError::Missing)
        );
    }

    #[test]
    fn name_length_limit() {
        let name = "a".repeat(150);
        assert_eq!(
            validate(&RawSubmission::text(&name, "Hi")),
            Err(ValidationError::NameTooLong)
        );
        let name = "a".repeat(100);
        assert_eq!(validate(&RawSubmission::text(&name, "Hi")).unwrap().name, name);
    }

    #[test]
    fn length_is_checked_before_trimming() {
        // 99 letters plus surrounding spaces exceeds the limit pre-trim.
        let name = format!("  {}  ", "a".repeat(99));
        assert_eq!(
            validate(&RawSubmission::text(&name, "Hi")),
            Err(ValidationError::NameTooLong)
        );
    }

    #[test]
    fn message_length_limit() {
        let message = "m".repeat(1001);
        assert_eq!(
            validate(&RawSubmission::text("Ann", &message)),
            Err(ValidationError::MessageTooLong)
        );
        let message = "m".repeat(1000);
        assert_eq!(
            validate(&RawSubmission::text("Ann", &message)).unwrap().message,
            message
        );
    }

    #[test]
    fn name_checked_before_message() {
        let name = "a".repeat(101);
        let message = "m".repeat(1001);
        assert_eq!(
            validate(&RawSubmission::text(&name, &message)),
            Err(ValidationError::NameTooLong)
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        let name = "é".repeat(100);
        assert!(name.len() > 100);
        assert_eq!(validate(&RawSubmission::text(&name, "Hi")).unwrap().name, name);
    }

    #[test]
    fn reason_text() {
        assert_eq!(
            ValidationError::Missing.to_string(),
            "Name and message are required"
        );
        assert_eq!(
            ValidationError::NameTooLong.to_string(),
            "Name must be 100 characters or less"
        );
    }

    #[test]
    fn no_other_transformation() {
        let draft = validate(&RawSubmission::text("<b>Ann</b>", "a  b\n\nc")).unwrap();
        assert_eq!(draft.name, "<b>Ann</b>");
        assert_eq!(draft.message, "a  b\n\nc");
    }
}
