use indexmap::IndexMap;

use crate::value::Value;

use super::{as_str, builtin, module_value};

/// Minimal Markdown-to-HTML conversion: headings and paragraphs only, enough
/// for scripts that exercise the contract (`markdown.markdown(text)`), not a
/// CommonMark implementation.
pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "markdown".into(),
        builtin("markdown", |_, args, _| {
            let text = as_str(&args[0]);
            let mut html = String::new();
            for line in text.lines() {
                if let Some(heading) = line.strip_prefix("# ") {
                    html.push_str(&format!("<h1>{heading}</h1>\n"));
                } else if let Some(heading) = line.strip_prefix("## ") {
                    html.push_str(&format!("<h2>{heading}</h2>\n"));
                } else if !line.is_empty() {
                    html.push_str(&format!("<p>{line}</p>\n"));
                }
            }
            Ok(Value::str(html))
        }),
    );
    module_value("markdown", attrs)
}
