use thiserror::Error;

use crate::literal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("undefined template variable `{0}`")]
    UndefinedVariable(String),
    #[error("unknown template filter `{0}`")]
    UnknownFilter(String),
}

/// Formats template parts into one block of code.
///
/// Each part is interpolated (`${name}` substitutes a variable,
/// `${name|filter}` runs it through a filter), then re-indented: every line
/// after the part's first is prefixed with the first line's leading
/// whitespace, so a multi-line substitution lines up under the point where
/// it was spliced in. Parts are joined with newlines.
///
/// The only filter is `string`, which renders the value as a host-language
/// string literal.
pub fn format(parts: &[&str], vars: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let interpolated = interpolate(part, vars)?;
        push_indented(&mut out, &interpolated);
    }
    Ok(out)
}

fn interpolate(part: &str, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(part.len());
    let mut rest = part;

    while let Some(start) = rest.find("${") {
        let Some((name, filter, end)) = scan_token(&rest[start + 2..]) else {
            // not a well-formed token, pass the `${` through
            out.push_str(&rest[..start + 2]);
            rest = &rest[start + 2..];
            continue;
        };

        out.push_str(&rest[..start]);
        let value = vars
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| TemplateError::UndefinedVariable(name.to_owned()))?;

        match filter {
            None => out.push_str(value),
            Some("string") => out.push_str(&literal::quote(value)),
            Some(other) => return Err(TemplateError::UnknownFilter(other.to_owned())),
        }

        rest = &rest[start + 2 + end..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Scans `name` or `name|filter` followed by `}` at the start of `input`.
/// Returns the identifiers and the offset just past the closing brace.
fn scan_token(input: &str) -> Option<(&str, Option<&str>, usize)> {
    let name_len = scan_ident(input)?;
    let (name, rest) = input.split_at(name_len);

    if rest.starts_with('}') {
        return Some((name, None, name_len + 1));
    }

    let rest = rest.strip_prefix('|')?;
    let filter_len = scan_ident(rest)?;
    let filter = &rest[..filter_len];
    rest[filter_len..].strip_prefix('}')?;

    Some((name, Some(filter), name_len + 1 + filter_len + 1))
}

fn scan_ident(input: &str) -> Option<usize> {
    let mut bytes = input.bytes();
    match bytes.next() {
        Some(b'A'..=b'Z' | b'a'..=b'z' | b'_') => {}
        _ => return None,
    }
    let len = 1 + bytes
        .take_while(|b| matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_'))
        .count();
    Some(len)
}

fn push_indented(out: &mut String, part: &str) {
    let Some((first, rest)) = part.split_once('\n') else {
        out.push_str(part);
        return;
    };

    let indent_len = first
        .find(|c| c != ' ' && c != '\t')
        .unwrap_or(first.len());
    let indent = &first[..indent_len];

    out.push_str(first);
    for line in rest.split('\n') {
        out.push('\n');
        out.push_str(indent);
        out.push_str(line);
    }
}
