//! Renders prompt bodies: `{{name}}` / `{{a.b.c}}` placeholders resolved
//! against a dotted-path context via [`crate::value::Value::get_path`].

use crate::value::Value;

/// Substitute every `{{path}}` placeholder in `body` with the value found
/// at that dotted path in `context`, rendered via `Value::to_text`. A path
/// that resolves to nothing is replaced with an empty string.
pub fn render(body: &str, context: &Value) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str("{{");
            rest = after_open;
            continue;
        };
        let path = after_open[..end].trim();
        match context.get_path(path) {
            Some(value) => out.push_str(&value.to_text()),
            None => {}
        }
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}
