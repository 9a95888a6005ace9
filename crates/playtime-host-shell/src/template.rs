//! Grant command templates

use std::borrow::Cow;

/// Values that may appear in a grant template
#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    pub uuid: &'a str,
    pub player: &'a str,
    pub group: Option<&'a str>,
    pub permission: Option<&'a str>,
    pub command: Option<&'a str>,
}

fn quote(value: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(value))
}

/// Render a template into a shell line. Every substituted value is quoted
/// as a single shell word. Placeholders without a value are left as is.
pub fn render_template(template: &str, vars: &TemplateVars<'_>) -> String {
    let mut line = template
        .replace("{uuid}", &quote(vars.uuid))
        .replace("{player}", &quote(vars.player));

    for (placeholder, value) in [
        ("{group}", vars.group),
        ("{permission}", vars.permission),
        ("{command}", vars.command),
    ] {
        if let Some(value) = value {
            line = line.replace(placeholder, &quote(value));
        }
    }

    line
}
