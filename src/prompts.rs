//! Prompt and heading templates for page transcription.
//!
//! Both the per-page prompt and the per-page markdown heading are small
//! templates with two placeholders:
//!
//! | Placeholder        | Value                                        |
//! |--------------------|----------------------------------------------|
//! | `{page_number}`    | 1-based position of the page in the run      |
//! | `{page_number:04d}`| same, zero padded to the given width         |
//! | `{image_name}`     | file name of the page image                  |
//!
//! `{{` and `}}` produce literal braces. Any other placeholder is an error,
//! reported when the config is built so a typo never costs a model load.

use crate::error::DocprepError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Prompt sent with every page image unless overridden.
pub const DEFAULT_PAGE_PROMPT: &str = "Put all the text from this page into markdown format.";

/// Heading written above every page's transcription unless overridden.
pub const DEFAULT_HEADING_TEMPLATE: &str = "## Page {page_number}";

static RE_PAGE_NUMBER_SPEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^page_number(?::(?:(0?)(\d+))?d?)?$").unwrap());

/// Render `template` for one page.
pub fn render_template(
    template: &str,
    page_number: usize,
    image_name: &str,
) -> Result<String, DocprepError> {
    let mut out = String::with_capacity(template.len() + image_name.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    field.push(inner);
                }
                if !closed {
                    return Err(DocprepError::InvalidConfig(format!(
                        "unclosed '{{' in template {template:?}"
                    )));
                }
                out.push_str(&render_field(&field, page_number, image_name, template)?);
            }
            '}' => {
                return Err(DocprepError::InvalidConfig(format!(
                    "single '}}' in template {template:?}; use '}}}}' for a literal brace"
                )));
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

fn render_field(
    field: &str,
    page_number: usize,
    image_name: &str,
    template: &str,
) -> Result<String, DocprepError> {
    if field == "image_name" {
        return Ok(image_name.to_string());
    }
    if let Some(caps) = RE_PAGE_NUMBER_SPEC.captures(field) {
        let width: usize = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let zero_pad = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        return Ok(if zero_pad {
            format!("{page_number:0width$}")
        } else {
            format!("{page_number:>width$}")
        });
    }
    Err(DocprepError::InvalidConfig(format!(
        "unknown placeholder '{{{field}}}' in template {template:?}; \
         supported: {{page_number}}, {{image_name}}"
    )))
}

/// Check that `template` renders, without caring about the result.
pub fn validate_template(template: &str) -> Result<(), DocprepError> {
    render_template(template, 1, "page.jpg").map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_heading_renders_page_number() {
        assert_eq!(
            render_template(DEFAULT_HEADING_TEMPLATE, 3, "x.jpg").unwrap(),
            "## Page 3"
        );
    }

    #[test]
    fn default_prompt_has_no_placeholders() {
        assert_eq!(
            render_template(DEFAULT_PAGE_PROMPT, 9, "x.jpg").unwrap(),
            DEFAULT_PAGE_PROMPT
        );
    }

    #[test]
    fn both_placeholders_and_escapes() {
        let out = render_template("{{p}} {page_number} of {image_name}", 2, "doc_page_0002.jpg")
            .unwrap();
        assert_eq!(out, "{p} 2 of doc_page_0002.jpg");
    }

    #[test]
    fn zero_padded_width() {
        assert_eq!(
            render_template("p{page_number:04d}", 7, "x").unwrap(),
            "p0007"
        );
        assert_eq!(render_template("[{page_number:3}]", 7, "x").unwrap(), "[  7]");
    }

    #[test]
    fn bare_integer_format() {
        assert_eq!(render_template("p{page_number:d}", 12, "x").unwrap(), "p12");
        assert!(validate_template("## Page {page_number:d}").is_ok());
        assert!(validate_template("{page_number:x}").is_err());
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let err = validate_template("Page {page}").unwrap_err();
        assert!(matches!(err, DocprepError::InvalidConfig(_)));
        assert!(err.to_string().contains("{page}"), "got: {err}");
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        assert!(validate_template("Page {page_number").is_err());
        assert!(validate_template("Page }").is_err());
    }
}
