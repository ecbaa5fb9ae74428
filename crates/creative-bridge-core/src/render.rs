use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value as JsonValue;

pub const DISPLAY_WRAPPER_TMPL: &str = include_str!("../static/templates/display_wrapper.html.hbs");
pub const VAST_WRAPPER_TMPL: &str = include_str!("../static/templates/vast_wrapper.xml.hbs");

/// Render `tmpl` against `data`. A broken template is logged and renders as
/// an empty string.
pub fn render_template_str(tmpl: &str, data: &JsonValue) -> String {
    let mut reg = Handlebars::new();
    // Double-stash values stay HTML/XML escaped; raw markup goes through triple-stash.
    if let Err(e) = reg.register_template_string("t", tmpl) {
        log::error!("Template failed to compile: {}", e);
        return String::new();
    }
    reg.render("t", data).unwrap_or_else(|e| {
        log::error!("Template failed to render: {}", e);
        String::new()
    })
}

/// Pretty JSON that is safe to drop inside a `<script>` element.
pub fn script_json<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize config: {}\"}}", e));
    json.replace("</", "<\\/")
}

/// Split any `]]>` so the text can sit inside a single CDATA section.
pub fn cdata_safe(text: &str) -> String {
    text.replace("]]>", "]]]]><![CDATA[>")
}
