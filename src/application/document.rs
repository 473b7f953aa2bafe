//! Final HTML document assembly around the renderer's output.

use lol_html::{RewriteStrSettings, element, rewrite_str};
use serde_json::Value;

use super::render::{RenderError, RenderOutput};

pub const MOUNT_POINT: &str = r#"<div id="app"></div>"#;
pub const HEAD_MARKER: &str = "<!--app-head-->";
pub const STATE_MARKER: &str = "<!--app-state-->";
const BODY_CLOSE: &str = "</body>";

/// Site injection markers and the site setting that fills each one.
pub const SITE_INJECTIONS: [(&str, &str); 3] = [
    ("<!--site-analytics-->", "analytics"),
    ("<!--site-custom-script-->", "customScript"),
    ("<!--site-custom-style-->", "customStyle"),
];

const DEV_ONLY_SELECTORS: [&str; 2] = ["script[data-dev-only]", r#"script[src^="/@vite"]"#];

/// Build the response document from the base template and one render result.
pub fn assemble(
    template: &str,
    output: &RenderOutput,
    strip_dev_scripts: bool,
) -> Result<String, RenderError> {
    let mut html = if strip_dev_scripts {
        strip_dev_only_scripts(template)?
    } else {
        template.to_string()
    };

    for (placeholder, value) in &output.page_metadata {
        if !placeholder.is_empty() {
            html = html.replace(placeholder.as_str(), value);
        }
    }

    html = html.replacen(HEAD_MARKER, &output.head_metadata, 1);

    for (marker, key) in SITE_INJECTIONS {
        html = html.replace(marker, output.site_setting(key));
    }

    html = html.replacen(
        MOUNT_POINT,
        &format!(r#"<div id="app">{}</div>"#, output.markup),
        1,
    );

    let state = state_scripts(output);
    if html.contains(STATE_MARKER) {
        html = html.replacen(STATE_MARKER, &state, 1);
    } else if let Some(index) = html.rfind(BODY_CLOSE) {
        html.insert_str(index, &state);
    } else {
        html.push_str(&state);
    }

    Ok(html)
}

fn state_scripts(output: &RenderOutput) -> String {
    format!(
        "<script>window.__INITIAL_STATE__={};window.__ENTITY_DATA__={};window.__PREFETCH_DATA__={};</script>",
        script_json(&output.application_state),
        script_json(&output.entity_data),
        script_json(&output.prefetch_data),
    )
}

/// JSON safe to embed inside a `<script>` element.
fn script_json(value: &Value) -> String {
    value.to_string().replace('<', "\\u003c")
}

fn strip_dev_only_scripts(html: &str) -> Result<String, RenderError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(DEV_ONLY_SELECTORS[0], |el| {
                    el.remove();
                    Ok(())
                }),
                element!(DEV_ONLY_SELECTORS[1], |el| {
                    el.remove();
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Document(err.to_string()))
}
