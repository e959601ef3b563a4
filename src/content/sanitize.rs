/// HTML sanitization for passive newsletter display: drop active content and
/// tracking pixels, force https references, keep legitimate inline images.
/// Single-pass tag scanner; `sanitize_html(sanitize_html(x)) == sanitize_html(x)`.

/// Subdomain labels that mark an image host as a marketing/analytics tracker.
const TRACKER_HOST_LABELS: &[&str] = &[
    "mail", "email", "click", "clicks", "track", "tracking", "analytics", "beacon", "beacons",
    "pixel", "pixels", "link", "links", "open", "metrics",
];

pub fn sanitize_html(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut i = 0;

    while i < html.len() {
        let Some(rel) = lower[i..].find('<') else {
            out.push_str(&html[i..]);
            break;
        };
        let lt = i + rel;
        out.push_str(&html[i..lt]);

        if starts_tag(&lower[lt..], "script") {
            // drop the whole block, unterminated scripts drop the rest
            if let Some(close_rel) = lower[lt..].find("</script") {
                let close = lt + close_rel;
                match lower[close..].find('>') {
                    Some(gt_rel) => i = close + gt_rel + 1,
                    None => i = html.len(),
                }
            } else {
                i = html.len();
            }
            continue;
        }

        let Some(gt_rel) = lower[lt..].find('>') else {
            // malformed tail, keep verbatim
            out.push_str(&html[lt..]);
            break;
        };
        let gt = lt + gt_rel;
        let tag = &html[lt..=gt];

        if starts_tag(&lower[lt..], "img") && is_tracking_pixel(tag) {
            i = gt + 1;
            continue;
        }

        out.push_str(&rewrite_tag_urls(tag));
        i = gt + 1;
    }

    out
}

/// Strip stray whitespace right after `base64,` in data URIs. Payload bytes
/// are otherwise preserved verbatim.
pub fn normalize_data_uris(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(pos) = rest.find("base64,") {
        let after = pos + "base64,".len();
        out.push_str(&rest[..after]);
        rest = rest[after..].trim_start();
    }
    out.push_str(rest);
    out
}

fn starts_tag(lower_rest: &str, name: &str) -> bool {
    let Some(rest) = lower_rest.strip_prefix('<') else {
        return false;
    };
    let Some(after) = rest.strip_prefix(name) else {
        return false;
    };
    after
        .chars()
        .next()
        .map_or(true, |c| c.is_whitespace() || c == '>' || c == '/')
}

fn is_tracking_pixel(tag: &str) -> bool {
    // (a) explicit 0x0 or 1x1 dimensions
    if let (Some(w), Some(h)) = (attr_value(tag, "width"), attr_value(tag, "height")) {
        if dim_at_most_one(w) && dim_at_most_one(h) {
            return true;
        }
    }

    // (c) hidden via inline style
    if let Some(style) = attr_value(tag, "style") {
        let compact: String = style
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if compact.contains("display:none") || compact.contains("visibility:hidden") {
            return true;
        }
    }

    // (b) src host carries a marketing subdomain label
    if let Some(src) = attr_value(tag, "src") {
        if let Some(host) = url_host(src) {
            let labels: Vec<&str> = host.split('.').collect();
            if labels.len() > 2 {
                // everything left of the registrable domain
                for label in &labels[..labels.len() - 2] {
                    if TRACKER_HOST_LABELS.contains(label) {
                        return true;
                    }
                }
            }
        }
    }

    false
}

fn dim_at_most_one(value: &str) -> bool {
    let trimmed = value.trim().trim_end_matches("px").trim();
    matches!(trimmed.parse::<u32>(), Ok(n) if n <= 1)
}

/// Upgrade `http://` to `https://` inside src/href values. Protocol-relative,
/// already-secure, and `data:` URIs pass through untouched.
fn rewrite_tag_urls(tag: &str) -> String {
    let mut out = tag.to_string();
    for name in ["src", "href"] {
        if let Some((start, end)) = attr_span(&out, name) {
            if out[start..end].starts_with("http://") {
                out.replace_range(start..start + "http://".len(), "https://");
            }
        }
    }
    out
}

/// Byte span of the value of `name=` within a tag, quote-aware. The match
/// must be preceded by whitespace so `data-src=` never matches `src=`.
fn attr_span(tag: &str, name: &str) -> Option<(usize, usize)> {
    let lower = tag.to_ascii_lowercase();
    let pat = format!("{name}=");
    let mut from = 0;

    while let Some(rel) = lower[from..].find(&pat) {
        let start = from + rel;
        let preceded_ok = start > 0 && lower.as_bytes()[start - 1].is_ascii_whitespace();
        if !preceded_ok {
            from = start + pat.len();
            continue;
        }

        let vstart = start + pat.len();
        if vstart >= tag.len() {
            return None;
        }
        let bytes = tag.as_bytes();
        return Some(match bytes[vstart] {
            q @ (b'"' | b'\'') => {
                let vstart = vstart + 1;
                let vend = tag[vstart..]
                    .find(q as char)
                    .map(|r| vstart + r)
                    .unwrap_or_else(|| tag.len().saturating_sub(1));
                (vstart, vend)
            }
            _ => {
                let vend = tag[vstart..]
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .map(|r| vstart + r)
                    .unwrap_or_else(|| tag.len().saturating_sub(1));
                (vstart, vend)
            }
        });
    }
    None
}

fn attr_value<'t>(tag: &'t str, name: &str) -> Option<&'t str> {
    attr_span(tag, name).map(|(s, e)| &tag[s..e])
}
