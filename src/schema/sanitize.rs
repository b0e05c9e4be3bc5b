use crate::error::PipelineError;

use super::{Issue, IssueKind};

/// Clean backend output so it can be handed to an XML parser
///
/// Strips markdown fences, surrounding prose and namespace declarations, then
/// escapes stray `&` and `<` characters. Fails only when no diagram markup is present at all.
pub fn sanitize(candidate: &str, issues: &mut Vec<Issue>) -> Result<String, PipelineError> {
    let unfenced = strip_fences(candidate);
    if unfenced.len() != candidate.len() {
        issues.push(Issue::new(IssueKind::Sanitized, "removed markdown code fences"));
    }

    let body = extract_markup(&unfenced)?;
    let before = &unfenced[..body.0];
    let after = &unfenced[body.1..];
    if has_prose(before) || !after.trim().is_empty() {
        issues.push(Issue::new(
            IssueKind::Sanitized,
            "removed text surrounding the diagram markup",
        ));
    }

    let (markup, removed) = strip_namespaces(&unfenced[body.0..body.1]);
    if removed > 0 {
        issues.push(Issue::new(
            IssueKind::Sanitized,
            format!("removed {} namespace declaration(s)", removed),
        ));
    }

    let (escaped, fixes) = escape_stray_markup(&markup);
    if fixes > 0 {
        issues.push(Issue::new(
            IssueKind::Sanitized,
            format!("escaped {} reserved character(s)", fixes),
        ));
    }

    Ok(escaped)
}

fn strip_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Byte range from the opening diagram tag to the end of its closing tag
fn extract_markup(text: &str) -> Result<(usize, usize), PipelineError> {
    let mxfile = text.find("<mxfile");
    let model = text.find("<mxGraphModel");

    let (start, close) = match (mxfile, model) {
        (Some(f), Some(m)) if f < m => (f, "</mxfile>"),
        (Some(f), None) => (f, "</mxfile>"),
        (_, Some(m)) => (m, "</mxGraphModel>"),
        (None, None) => {
            return Err(PipelineError::SchemaInvalid(
                "no <mxGraphModel> element found".to_string(),
            ));
        }
    };

    let end = text[start..]
        .rfind(close)
        .map(|pos| start + pos + close.len())
        .unwrap_or(text.len());

    Ok((start, end))
}

/// Anything other than whitespace and an XML declaration
fn has_prose(prefix: &str) -> bool {
    let trimmed = prefix.trim();
    match trimmed.strip_prefix("<?xml") {
        Some(rest) => rest
            .find("?>")
            .is_none_or(|pos| !rest[pos + 2..].trim().is_empty()),
        None => !trimmed.is_empty(),
    }
}

/// Remove `xmlns` attributes. Prefixed declarations are kept while the
/// prefix is still used by an element or attribute.
fn strip_namespaces(markup: &str) -> (String, usize) {
    let mut out = String::with_capacity(markup.len());
    let mut removed = 0;
    let mut rest = markup;

    while let Some(pos) = rest.find("xmlns") {
        let (head, tail) = rest.split_at(pos);
        let in_attribute_position = head.ends_with(|c: char| c.is_whitespace());
        match namespace_declaration_len(tail, markup).filter(|_| in_attribute_position) {
            Some(len) => {
                out.push_str(head.trim_end());
                rest = &tail[len..];
                removed += 1;
            }
            None => {
                out.push_str(head);
                out.push_str("xmlns");
                rest = &tail["xmlns".len()..];
            }
        }
    }
    out.push_str(rest);

    (out, removed)
}

/// Length of a removable `xmlns[:prefix]="..."` attribute at the start of `text`
fn namespace_declaration_len(text: &str, markup: &str) -> Option<usize> {
    let after = &text["xmlns".len()..];
    let (prefix, after) = match after.strip_prefix(':') {
        Some(named) => {
            let end = named
                .find(|c: char| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.')))
                .unwrap_or(named.len());
            (Some(&named[..end]), &named[end..])
        }
        None => (None, after),
    };

    let value = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let close = value[1..].find(quote)?;
    let len = text.len() - value.len() + close + 2;

    if let Some(prefix) = prefix {
        if prefix.is_empty() {
            return None;
        }
        let used = ["<", "</", " "]
            .iter()
            .any(|lead| markup.contains(&format!("{}{}:", lead, prefix)));
        if used {
            return None;
        }
    }
    Some(len)
}

#[derive(Clone, Copy)]
enum State {
    Text,
    Tag,
    Value(char),
}

/// Escape `&` not starting an entity, and `<` that cannot start markup or
/// appears inside an attribute value. Returns the text and the fix count.
fn escape_stray_markup(text: &str) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut fixes = 0;
    let mut state = State::Text;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        match state {
            State::Text => match ch {
                '<' => {
                    if let Some(len) = special_section_len(rest) {
                        out.push_str(&rest[..len]);
                        i += len;
                        continue;
                    }
                    let starts_tag = rest[1..]
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_alphabetic() || c == '/' || c == '_');
                    if starts_tag {
                        out.push('<');
                        state = State::Tag;
                    } else {
                        out.push_str("&lt;");
                        fixes += 1;
                    }
                }
                '&' if !starts_entity(rest) => {
                    out.push_str("&amp;");
                    fixes += 1;
                }
                _ => out.push(ch),
            },
            State::Tag => {
                match ch {
                    '"' | '\'' => state = State::Value(ch),
                    '>' => state = State::Text,
                    _ => {}
                }
                out.push(ch);
            }
            State::Value(quote) => match ch {
                c if c == quote => {
                    out.push(ch);
                    state = State::Tag;
                }
                '<' => {
                    out.push_str("&lt;");
                    fixes += 1;
                }
                '&' if !starts_entity(rest) => {
                    out.push_str("&amp;");
                    fixes += 1;
                }
                _ => out.push(ch),
            },
        }

        i += ch.len_utf8();
    }

    (out, fixes)
}

/// Length of a comment, CDATA, processing instruction or declaration at the start of `rest`
fn special_section_len(rest: &str) -> Option<usize> {
    let terminator = if rest.starts_with("<!--") {
        "-->"
    } else if rest.starts_with("<![CDATA[") {
        "]]>"
    } else if rest.starts_with("<?") {
        "?>"
    } else if rest.starts_with("<!") {
        ">"
    } else {
        return None;
    };
    Some(
        rest.find(terminator)
            .map(|pos| pos + terminator.len())
            .unwrap_or(rest.len()),
    )
}

fn starts_entity(rest: &str) -> bool {
    let Some(end) = rest.find(';') else {
        return false;
    };
    if end < 2 || end > 12 {
        return false;
    }
    let name = &rest[1..end];
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
    } else if let Some(dec) = name.strip_prefix('#') {
        !dec.is_empty() && dec.chars().all(|c| c.is_ascii_digit())
    } else {
        matches!(name, "amp" | "lt" | "gt" | "quot" | "apos")
    }
}
