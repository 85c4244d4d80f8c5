//! HTML escaping and sanitizing for broadcast content.
//!
//! # Design Decisions
//! - Allow-list of formatting tags; everything else is stripped
//! - `script`/`style`-like elements lose their content too
//! - Only `title` and `href` survive; links must be relative or use an
//!   allow-listed scheme
//! - A `<` that does not open a tag stays visible as text

const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "br", "code", "div", "em", "h1", "h2", "h3", "h4", "hr", "i", "li", "ol", "p",
    "pre", "small", "span", "strong", "u", "ul",
];

const DROPPED_WITH_CONTENT: &[&str] = &["script", "style", "iframe", "object", "embed", "template"];

const VOID_TAGS: &[&str] = &["br", "hr"];

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

/// Escape plain text and turn line breaks into `<br/>`.
pub fn plain_to_html(text: &str) -> String {
    escape_html(&text.replace("\r\n", "\n")).replace('\n', "<br/>")
}

/// Strip everything but allow-listed markup from `html`.
pub fn sanitize_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        if let Some(comment) = after.strip_prefix("<!--") {
            rest = match comment.find("-->") {
                Some(end) => &comment[end + 3..],
                None => "",
            };
            continue;
        }

        if !opens_tag(&after[1..]) {
            out.push_str("&lt;");
            rest = &after[1..];
            continue;
        }

        let Some(end) = after.find('>') else {
            out.push_str(&escape_html(after));
            return out;
        };
        let inner = &after[1..end];
        rest = &after[end + 1..];

        let Some(tag) = Tag::parse(inner) else {
            out.push_str(&escape_html(&after[..=end]));
            continue;
        };

        if DROPPED_WITH_CONTENT.contains(&tag.name.as_str()) {
            if !tag.closing && !tag.self_closing {
                rest = skip_past_closing(rest, &tag.name);
            }
            continue;
        }

        if ALLOWED_TAGS.contains(&tag.name.as_str()) {
            out.push_str(&tag.render());
        }
    }

    out.push_str(rest);
    out
}

/// A tag name starts with an ASCII letter, right after `<` or `</`.
fn opens_tag(after_lt: &str) -> bool {
    let name = after_lt.strip_prefix('/').unwrap_or(after_lt);
    name.starts_with(|c: char| c.is_ascii_alphabetic())
}

fn skip_past_closing<'a>(html: &'a str, name: &str) -> &'a str {
    let lower = html.to_ascii_lowercase();
    let needle = format!("</{name}");
    match lower.find(&needle) {
        Some(pos) => match html[pos..].find('>') {
            Some(end) => &html[pos + end + 1..],
            None => "",
        },
        None => "",
    }
}

struct Tag {
    name: String,
    closing: bool,
    self_closing: bool,
    attributes: Vec<(String, String)>,
}

impl Tag {
    fn parse(inner: &str) -> Option<Self> {
        let (closing, body) = match inner.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, inner),
        };
        let body = body.trim();
        let (self_closing, body) = match body.strip_suffix('/') {
            Some(body) => (true, body.trim_end()),
            None => (false, body),
        };

        let name_len = body
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(body.len());
        if name_len == 0 {
            return None;
        }
        let name = body[..name_len].to_ascii_lowercase();
        let attributes = if closing {
            Vec::new()
        } else {
            parse_attributes(&body[name_len..])
        };

        Some(Self {
            name,
            closing,
            self_closing,
            attributes,
        })
    }

    fn render(&self) -> String {
        if self.closing {
            return format!("</{}>", self.name);
        }
        let mut out = format!("<{}", self.name);
        for (key, value) in &self.attributes {
            if !attribute_allowed(&self.name, key, value) {
                continue;
            }
            out.push_str(&format!(" {}=\"{}\"", key, escape_html(value)));
        }
        if self.self_closing || VOID_TAGS.contains(&self.name.as_str()) {
            out.push_str("/>");
        } else {
            out.push('>');
        }
        out
    }
}

fn attribute_allowed(tag: &str, key: &str, value: &str) -> bool {
    match key {
        "title" => true,
        "href" if tag == "a" => link_allowed(value),
        _ => false,
    }
}

/// Relative links and allow-listed schemes only.
///
/// Browsers drop whitespace and control characters inside URLs, so the
/// scheme is read from what is left after removing them.
fn link_allowed(value: &str) -> bool {
    let url: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect();
    match url.find(|c: char| matches!(c, ':' | '/' | '?' | '#')) {
        Some(pos) if url[pos..].starts_with(':') => {
            let scheme = url[..pos].to_ascii_lowercase();
            ALLOWED_SCHEMES.contains(&scheme.as_str())
        }
        _ => true,
    }
}

fn parse_attributes(mut input: &str) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    loop {
        input = input.trim_start();
        if input.is_empty() {
            break;
        }
        let key_len = input
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(input.len());
        if key_len == 0 {
            input = &input[1..];
            continue;
        }
        let key = input[..key_len].to_ascii_lowercase();
        input = input[key_len..].trim_start();

        let value = if let Some(after_eq) = input.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body.find(quote).unwrap_or(body.len());
                    input = body.get(end + 1..).unwrap_or("");
                    body[..end].to_string()
                }
                _ => {
                    let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                    input = &after_eq[end..];
                    after_eq[..end].to_string()
                }
            }
        } else {
            String::new()
        };
        attributes.push((key, value));
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_escaped_and_broken() {
        assert_eq!(
            plain_to_html("<b>x</b>\nY"),
            "&lt;b&gt;x&lt;/b&gt;<br/>Y"
        );
        assert_eq!(plain_to_html("a\r\nb & c"), "a<br/>b &amp; c");
    }

    #[test]
    fn test_valid_markup_passes_through() {
        let html = "<p>Server restart at <b>22:00</b><br/>Please save your work.</p>";
        assert_eq!(sanitize_html(html), html);
    }

    #[test]
    fn test_dangerous_markup_is_removed() {
        assert_eq!(
            sanitize_html("Hi<script>alert(1)</script> there"),
            "Hi there"
        );
        assert_eq!(
            sanitize_html("<a href=\"javascript:evil()\" onclick=\"x()\">link</a>"),
            "<a>link</a>"
        );
        assert_eq!(
            sanitize_html("<a href='/system/news' title=News>news</a>"),
            "<a href=\"/system/news\" title=\"News\">news</a>"
        );
        assert_eq!(sanitize_html("<blink>text</blink><!-- hidden -->"), "text");
        assert_eq!(sanitize_html("1 < 2"), "1 &lt; 2");
    }

    #[test]
    fn test_obfuscated_script_links_are_dropped() {
        assert_eq!(
            sanitize_html("<a href=\"java\tscript:alert(1)\">x</a>"),
            "<a>x</a>"
        );
        assert_eq!(
            sanitize_html("<a href=\"\x01javascript:alert(1)\">x</a>"),
            "<a>x</a>"
        );
        assert_eq!(
            sanitize_html("<a href=\"JaVa\nScRiPt:alert(1)\">x</a>"),
            "<a>x</a>"
        );
        assert_eq!(sanitize_html("<a href=\"data:text/html,x\">x</a>"), "<a>x</a>");
        assert_eq!(sanitize_html("<a href=\"ftp://host/file\">x</a>"), "<a>x</a>");
    }

    #[test]
    fn test_allowed_links_survive() {
        assert_eq!(
            sanitize_html("<a href=\"https://example.org/a?b=c:d\">x</a>"),
            "<a href=\"https://example.org/a?b=c:d\">x</a>"
        );
        assert_eq!(
            sanitize_html("<a href=\"mailto:ops@example.org\">ops</a>"),
            "<a href=\"mailto:ops@example.org\">ops</a>"
        );
        assert_eq!(
            sanitize_html("<a href=\"news/item?at=12:00\">item</a>"),
            "<a href=\"news/item?at=12:00\">item</a>"
        );
    }

    #[test]
    fn test_comparisons_keep_their_text() {
        assert_eq!(
            sanitize_html("<p>1 < 2 and 3 > 1</p>"),
            "<p>1 &lt; 2 and 3 > 1</p>"
        );
        assert_eq!(sanitize_html("a <3 b"), "a &lt;3 b");
        assert_eq!(sanitize_html("x < /y>"), "x &lt; /y>");
    }
}
