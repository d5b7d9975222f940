//! URL-template parser for the cnam HTTP driver.
//!
//! Grammar: literal text interspersed with balanced `{key}` placeholders.
//! Malformed templates and payloads are rejected with
//! `ErrorCode::DriverResolvingError`.

use lnp_core::{ErrorCode, ResolverError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self, ResolverError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut placeholder: Option<String> = None;

        for c in template.chars() {
            match c {
                '{' => {
                    if placeholder.is_some() {
                        return Err(template_error("'{' inside a placeholder"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    placeholder = Some(String::new());
                }
                '}' => match placeholder.take() {
                    Some(key) if key.is_empty() => {
                        return Err(template_error("empty placeholder"));
                    }
                    Some(key) => segments.push(Segment::Placeholder(key)),
                    None => return Err(template_error("unexpected '}' outside a placeholder")),
                },
                _ => match &mut placeholder {
                    Some(key) => key.push(c),
                    None => literal.push(c),
                },
            }
        }

        if placeholder.is_some() {
            return Err(template_error("unterminated placeholder"));
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Substitute each placeholder against a top-level key in `payload`.
    /// Strings are inserted verbatim, numbers and booleans are formatted,
    /// anything else (missing key, array, object, null) is an error.
    pub fn render(&self, payload: &serde_json::Value) -> Result<String, ResolverError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => {
                    let value = payload.get(key).ok_or_else(|| {
                        ResolverError::new(
                            ErrorCode::DriverResolvingError,
                            format!("missing template key '{key}'"),
                        )
                    })?;
                    match value {
                        serde_json::Value::String(s) => out.push_str(s),
                        serde_json::Value::Number(n) => out.push_str(&n.to_string()),
                        serde_json::Value::Bool(b) => out.push_str(&b.to_string()),
                        _ => {
                            return Err(ResolverError::new(
                                ErrorCode::DriverResolvingError,
                                format!("unsupported value type for template key '{key}'"),
                            ))
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

fn template_error(description: &str) -> ResolverError {
    ResolverError::new(ErrorCode::DriverResolvingError, description.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_literal_and_placeholder() {
        let tmpl = UrlTemplate::parse("http://x/?n={num}").unwrap();
        let rendered = tmpl.render(&json!({"num": "42"})).unwrap();
        assert_eq!(rendered, "http://x/?n=42");
    }

    #[test]
    fn renders_number_and_bool() {
        let tmpl = UrlTemplate::parse("{a}-{b}").unwrap();
        let rendered = tmpl.render(&json!({"a": 7, "b": true})).unwrap();
        assert_eq!(rendered, "7-true");
    }

    #[test]
    fn rejects_unexpected_close_brace() {
        assert!(UrlTemplate::parse("http://x/}").is_err());
    }

    #[test]
    fn rejects_nested_open_brace() {
        assert!(UrlTemplate::parse("http://x/{a{b}").is_err());
    }

    #[test]
    fn rejects_empty_placeholder() {
        assert!(UrlTemplate::parse("http://x/{}").is_err());
    }

    #[test]
    fn rejects_unterminated_placeholder() {
        assert!(UrlTemplate::parse("http://x/{a").is_err());
    }

    #[test]
    fn missing_key_is_an_error() {
        let tmpl = UrlTemplate::parse("{missing}").unwrap();
        assert!(tmpl.render(&json!({})).is_err());
    }

    #[test]
    fn unsupported_value_type_is_an_error() {
        let tmpl = UrlTemplate::parse("{a}").unwrap();
        assert!(tmpl.render(&json!({"a": [1,2,3]})).is_err());
    }
}
