use serde_json::{Map, Value};

/// Replaces every `{{.key}}` with the argument of that name. Strings are inserted as-is,
/// anything else as compact JSON. Placeholders without a matching argument stay untouched.
pub fn substitute_template(template: &str, params: &Map<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in params {
        let placeholder = format!("{{{{.{key}}}}}");
        if !rendered.contains(&placeholder) {
            continue;
        }
        let replacement = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &replacement);
    }
    rendered
}

pub fn expand_env(value: &str) -> String {
    expand_env_with(value, |name| std::env::var(name).ok())
}

/// Expands `$NAME` and `${NAME}`; unset variables become empty.
pub fn expand_env_with<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(position) = rest.find('$') {
        expanded.push_str(&rest[..position]);
        let after = &rest[position + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                expanded.push_str(&lookup(name).unwrap_or_default());
                rest = &braced[end + 1..];
                continue;
            }
            expanded.push('$');
            rest = after;
            continue;
        }

        let name_len = after
            .char_indices()
            .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || *ch == '_'))
            .map(|(index, _)| index)
            .unwrap_or(after.len());
        if name_len == 0 {
            expanded.push('$');
            rest = after;
            continue;
        }
        expanded.push_str(&lookup(&after[..name_len]).unwrap_or_default());
        rest = &after[name_len..];
    }

    expanded.push_str(rest);
    expanded
}
