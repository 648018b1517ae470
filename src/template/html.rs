//! Plain-text rendering of an HTML body, for terminal previews.

/// Elements whose content is never shown.
const HIDDEN: [&str; 2] = ["script", "style"];

/// Elements that start or end a line.
const LINE_BREAKING: [&str; 12] = [
    "br", "p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
];

/// Convert HTML to readable plain text.
///
/// Tags are scanned once. Block-level tags become line breaks, hidden
/// elements are dropped with their content, entities in text are decoded and
/// runs of blank lines collapse to one.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut hidden: Option<String> = None;
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        let (before, tag_start) = rest.split_at(open);
        if hidden.is_none() {
            push_decoded(&mut text, before);
        }
        // An unterminated tag swallows the rest of the input.
        let Some(close) = tag_start.find('>') else {
            rest = "";
            break;
        };
        let tag = Tag::parse(&tag_start[1..close]);
        rest = &tag_start[close + 1..];

        if let Some(name) = &hidden {
            if tag.closing && tag.name == *name {
                hidden = None;
            }
            continue;
        }
        if !tag.closing && HIDDEN.contains(&tag.name.as_str()) {
            hidden = Some(tag.name);
        } else if LINE_BREAKING.contains(&tag.name.as_str()) {
            text.push('\n');
        }
    }
    if hidden.is_none() {
        push_decoded(&mut text, rest);
    }

    collapse_blank_lines(&text)
}

struct Tag {
    name: String,
    closing: bool,
}

impl Tag {
    /// Parse the inside of `<...>`: `p class="x"`, `/div`, `br/`.
    fn parse(inner: &str) -> Self {
        let inner = inner.trim_start();
        let (closing, inner) = match inner.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, inner),
        };
        let name = inner
            .chars()
            .take_while(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_lowercase();
        Self { name, closing }
    }
}

/// Append `text`, decoding entities in a single pass.
fn push_decoded(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
}

fn entity(name: &str) -> Option<char> {
    match name {
        "nbsp" => Some(' '),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            match char::from_u32(code)? {
                '\u{a0}' => Some(' '),
                c => Some(c),
            }
        }
    }
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !blank_run {
                out.push('\n');
            }
            blank_run = true;
        } else {
            out.push_str(line);
            out.push('\n');
            blank_run = false;
        }
    }
    out.trim().to_string()
}
