//! Route template handling.
//!
//! Host routers describe URLs with bracketed placeholders such as
//! `/users/<int:id>`. The published document uses `{id}`.

use crate::error::SpecError;

/// Convert every `<[converter[(args)]:]name>` placeholder into `{name}`.
pub fn normalize_rule(rule: &str) -> Result<String, SpecError> {
    rewrite_rule(rule, |_, name| format!("{{{name}}}"))
}

/// Rewrite each placeholder of a route template.
///
/// `render` receives the converter (without arguments), if any, and the
/// placeholder name.
pub fn rewrite_rule(
    rule: &str,
    render: impl Fn(Option<&str>, &str) -> String,
) -> Result<String, SpecError> {
    let malformed = |reason: &str| SpecError::MalformedRule {
        rule: rule.to_string(),
        reason: reason.to_string(),
    };

    let mut out = String::with_capacity(rule.len());
    let mut rest = rule;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('>')
            .ok_or_else(|| malformed("unterminated placeholder"))?;
        let inner = &after[..end];
        let (converter, name) = match inner.rsplit_once(':') {
            Some((converter, name)) => {
                let converter = converter.split('(').next().unwrap_or(converter).trim();
                (Some(converter).filter(|c| !c.is_empty()), name.trim())
            }
            None => (None, inner.trim()),
        };
        if name.is_empty() {
            return Err(malformed("placeholder without a name"));
        }
        if name.contains('<') || name.contains('{') || name.contains('}') {
            return Err(malformed("nested placeholder"));
        }
        out.push_str(&render(converter, name));
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Join a namespace prefix and a rule, then normalize slashes.
pub fn join_rule(prefix: &str, rule: &str) -> String {
    normalize_path(&format!("{}/{}", prefix, rule))
}

/// Normalize a path: collapse double slashes, strip the trailing slash.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    let mut prev_slash = false;

    if !path.starts_with('/') {
        normalized.push('/');
        prev_slash = true;
    }

    for ch in path.chars() {
        if ch == '/' {
            if !prev_slash {
                normalized.push('/');
            }
            prev_slash = true;
        } else {
            normalized.push(ch);
            prev_slash = false;
        }
    }

    // Strip trailing slash (but keep root "/")
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    normalized
}
