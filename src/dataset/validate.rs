//! Shape check for a converted record before anything is written.

use crate::error::DocprepError;
use serde_json::Value;

const REQUIRED_FIELDS: &[&str] = &["messages", "id", "source"];
const ALLOWED_ROLES: &[&str] = &["user", "assistant", "system"];

/// Check that `sample` (a serialised record) has `messages`, `id` and
/// `source`, and that `messages` is a non-empty list of `{role, content}`
/// objects with a known role.
pub fn validate_sample(sample: &Value) -> Result<(), DocprepError> {
    let fail = |msg: String| Err(DocprepError::ValidationFailed(msg));

    let Some(obj) = sample.as_object() else {
        return fail("sample is not an object".into());
    };
    for field in REQUIRED_FIELDS {
        if !obj.contains_key(*field) {
            return fail(format!("missing field '{field}'"));
        }
    }

    let messages = match obj.get("messages").and_then(Value::as_array) {
        Some(m) if !m.is_empty() => m,
        _ => return fail("'messages' must be a non-empty list".into()),
    };

    for (i, message) in messages.iter().enumerate() {
        let Some(message) = message.as_object() else {
            return fail(format!("message {i} is not an object"));
        };
        if !message.contains_key("content") {
            return fail(format!("message {i} has no 'content'"));
        }
        match message.get("role").and_then(Value::as_str) {
            Some(role) if ALLOWED_ROLES.contains(&role) => {}
            Some(role) => return fail(format!("message {i} has unknown role '{role}'")),
            None => return fail(format!("message {i} has no 'role'")),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_sample_passes() {
        let sample = json!({
            "messages": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "yo"}],
            "id": "x_0",
            "source": "x"
        });
        assert!(validate_sample(&sample).is_ok());
    }

    #[test]
    fn missing_fields_fail() {
        let err = validate_sample(&json!({"messages": [], "id": "x_0"})).unwrap_err();
        assert!(err.to_string().contains("source"), "got {err}");
        assert!(validate_sample(&json!({"messages": [], "id": "a", "source": "b"})).is_err());
        assert!(validate_sample(&json!([1, 2])).is_err());
    }

    #[test]
    fn bad_messages_fail() {
        let base = |m: Value| json!({"messages": [m], "id": "a", "source": "b"});
        assert!(validate_sample(&base(json!({"role": "human", "content": "x"}))).is_err());
        assert!(validate_sample(&base(json!({"role": "user"}))).is_err());
        assert!(validate_sample(&base(json!({"content": "x"}))).is_err());
        assert!(validate_sample(&base(json!("text"))).is_err());
        assert!(validate_sample(&base(json!({"role": "system", "content": "x"}))).is_ok());
    }
}
