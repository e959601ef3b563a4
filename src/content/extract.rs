use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::gmail::wire::MessagePart;

/// Best-effort bodies recovered from one provider message.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub html: String,
    pub text: String,
    pub has_inline_images: bool,
}

impl ExtractedContent {
    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.text.is_empty()
    }
}

/// Walk the message's MIME tree and pull out the HTML and plain-text bodies.
/// Inline image attachments are noted but never fetched. Non-empty HTML is
/// guaranteed to come back as a full document with a charset declaration.
pub fn extract_content(payload: &MessagePart) -> ExtractedContent {
    let mut out = ExtractedContent::default();
    walk(payload, &mut out);
    if !out.html.is_empty() {
        out.html = ensure_document(&out.html);
    }
    out
}

fn walk(part: &MessagePart, out: &mut ExtractedContent) {
    if !part.parts.is_empty() {
        for child in &part.parts {
            walk(child, out);
        }
        return;
    }

    let data = part.body.as_ref().and_then(|b| b.data.as_deref());

    if part.mime_type.eq_ignore_ascii_case("text/html") {
        if out.html.is_empty() {
            if let Some(data) = data {
                out.html = decode_transport(data);
            }
        }
    } else if part.mime_type.eq_ignore_ascii_case("text/plain") {
        if out.text.is_empty() {
            if let Some(data) = data {
                out.text = decode_transport(data);
            }
        }
    } else if part.mime_type.starts_with("image/") {
        let named = part.filename.as_deref().is_some_and(|f| !f.is_empty());
        let attached = part
            .body
            .as_ref()
            .is_some_and(|b| b.attachment_id.is_some());
        if named || attached {
            out.has_inline_images = true;
        }
    }
}

/// Decode provider transport encoding. Gmail uses URL-safe base64, usually
/// without padding, but other variants show up in the wild; malformed input
/// falls back to the raw string rather than failing the message.
pub fn decode_transport(data: &str) -> String {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = URL_SAFE_NO_PAD
        .decode(cleaned.as_bytes())
        .or_else(|_| URL_SAFE.decode(cleaned.as_bytes()))
        .or_else(|_| STANDARD.decode(cleaned.as_bytes()))
        .or_else(|_| STANDARD_NO_PAD.decode(cleaned.as_bytes()));
    match decoded {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => data.to_string(),
    }
}

/// Wrap fragment HTML into a minimal valid document and make sure a charset
/// declaration is present. Applying this to its own output changes nothing.
pub fn ensure_document(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let has_html = lower.contains("<html");
    let has_charset = lower.contains("charset");

    if !has_html {
        return format!(
            "<html><head><meta charset=\"utf-8\"></head><body>{html}</body></html>"
        );
    }
    if has_charset {
        return html.to_string();
    }

    const META: &str = "<meta charset=\"utf-8\">";
    if let Some(head_start) = lower.find("<head") {
        if let Some(rel_gt) = html[head_start..].find('>') {
            let insert_at = head_start + rel_gt + 1;
            return format!("{}{}{}", &html[..insert_at], META, &html[insert_at..]);
        }
    }
    if let Some(html_start) = lower.find("<html") {
        if let Some(rel_gt) = html[html_start..].find('>') {
            let insert_at = html_start + rel_gt + 1;
            return format!(
                "{}<head>{}</head>{}",
                &html[..insert_at],
                META,
                &html[insert_at..]
            );
        }
    }
    html.to_string()
}

/// Strip tags and collapse whitespace to derive a short text preview from
/// HTML when no plain-text part exists.
pub fn text_preview(html_or_text: &str, max_chars: usize) -> String {
    let mut stripped = String::with_capacity(html_or_text.len());
    let mut in_tag = false;
    for ch in html_or_text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                stripped.push(' ');
            }
            c if !in_tag => stripped.push(c),
            _ => {}
        }
    }
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}
