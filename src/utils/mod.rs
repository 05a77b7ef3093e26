//! Utility functions.
//!
//! Collection of helper functions used across the bot.

use teloxide::types::{LinkPreviewOptions, User};

/// Escape text for Telegram HTML parse mode.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Format a username for display.
///
/// If the user has a username, returns @username.
/// Otherwise, returns the full name.
pub fn format_username(user: &User) -> String {
    match user.username.as_deref() {
        Some(u) => format!("@{}", u),
        None => user.full_name(),
    }
}

/// HTML mention link for a user.
pub fn mention_html(user: &User) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user.id,
        html_escape(&user.full_name())
    )
}

/// Render a configured message template.
///
/// Templates are written across several TOML lines, so raw newlines are
/// folded to spaces and `<br>` marks a real line break.
/// Placeholders: `{escaped_fname}`, `{chat}`.
///
/// Placeholders are filled in one pass, so a name that itself reads
/// `{chat}` is left as is.
pub fn render_template(template: &str, first_name: &str, chat: &str) -> String {
    let template = template.replace('\n', " ").replace("<br>", "\n");
    let first_name = html_escape(first_name);

    let mut out = String::with_capacity(template.len());
    let mut rest = template.as_str();
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        if let Some(after) = rest.strip_prefix("{escaped_fname}") {
            out.push_str(&first_name);
            rest = after;
        } else if let Some(after) = rest.strip_prefix("{chat}") {
            out.push_str(chat);
            rest = after;
        } else {
            out.push('{');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Link preview options that turn previews off.
pub fn no_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<b>Tom & Jerry</b>"), "&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;");
    }

    #[test]
    fn test_render_template_folds_lines_and_fills() {
        let template = "Hi {escaped_fname},\nwelcome to {chat}!<br>Read the rules.";
        assert_eq!(
            render_template(template, "<Fox>", "fc"),
            "Hi &lt;Fox&gt;, welcome to fc!\nRead the rules."
        );
    }

    #[test]
    fn test_render_template_does_not_expand_inside_names() {
        assert_eq!(
            render_template("Hi {escaped_fname}, this is {chat} {not a placeholder}", "{chat}", "fc"),
            "Hi {chat}, this is fc {not a placeholder}"
        );
    }
}
