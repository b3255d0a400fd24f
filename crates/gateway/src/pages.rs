//! # HTML pages
//!
//! The upload form and the link page. Any value interpolated into markup is
//! HTML-escaped.

/// Escapes `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        escape_html(title)
    )
}

/// Upload form, optionally with a notice above it.
pub fn upload_form(notice: Option<&str>) -> String {
    let notice = notice
        .map(|n| format!("<p class=\"notice\">{}</p>\n", escape_html(n)))
        .unwrap_or_default();
    layout(
        "Share a file",
        &format!(
            "<h1>Share a file</h1>\n{notice}<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n<input type=\"file\" name=\"file\">\n<button type=\"submit\">Upload</button>\n</form>"
        ),
    )
}

/// Page showing a signed URL for copying.
pub fn link_page(url: &str) -> String {
    let url = escape_html(url);
    layout(
        "Your link",
        &format!(
            "<h1>Your link</h1>\n<p><a href=\"{url}\">{url}</a></p>\n<input type=\"text\" readonly value=\"{url}\" size=\"80\">\n<p><a href=\"/\">Share another file</a></p>"
        ),
    )
}
