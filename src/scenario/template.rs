/// `${var}` string templates used by seeds, paths and JSON bodies.
use crate::error::WorkflowError;
use serde_json::Value;

/// Placeholder that expands to a fresh identifier at every occurrence.
pub const UUID_VAR: &str = "uuid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Var(&'a str),
}

/// Split a template into literal text and placeholders.
pub fn segments(template: &str) -> Result<Vec<Segment<'_>>, WorkflowError> {
    let mut out = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("${") {
        if open > 0 {
            out.push(Segment::Literal(&rest[..open]));
        }
        let after = &rest[open + 2..];
        let close = after
            .find('}')
            .ok_or_else(|| WorkflowError::UnterminatedPlaceholder(template.to_string()))?;
        let name = after[..close].trim();
        if name.is_empty() {
            return Err(WorkflowError::EmptyPlaceholder(template.to_string()));
        }
        out.push(Segment::Var(name));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        out.push(Segment::Literal(rest));
    }
    Ok(out)
}

/// Names referenced by a template, in order of appearance.
pub fn placeholders(template: &str) -> Result<Vec<&str>, WorkflowError> {
    Ok(segments(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Var(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Every string leaf of a JSON template.
pub fn json_strings(value: &Value) -> Vec<&str> {
    let mut out = Vec::new();
    collect_strings(value, &mut out);
    out
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Expand a template. `lookup` returns `None` for an unbound name, which is
/// reported against `owner`.
pub fn render<F>(template: &str, owner: &str, mut lookup: F) -> Result<String, WorkflowError>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    for segment in segments(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Var(name) => {
                let value = lookup(name).ok_or_else(|| WorkflowError::UnboundVariable {
                    owner: owner.to_string(),
                    var: name.to_string(),
                })?;
                out.push_str(&value);
            }
        }
    }
    Ok(out)
}

/// Expand every string leaf of a JSON template. Non-string values are kept.
pub fn render_json<F>(value: &Value, owner: &str, lookup: &mut F) -> Result<Value, WorkflowError>
where
    F: FnMut(&str) -> Option<String>,
{
    Ok(match value {
        Value::String(s) => Value::String(render(s, owner, &mut *lookup)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_json(v, owner, lookup))
                .collect::<Result<_, WorkflowError>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), render_json(v, owner, lookup)?)))
                .collect::<Result<_, WorkflowError>>()?,
        ),
        other => other.clone(),
    })
}
