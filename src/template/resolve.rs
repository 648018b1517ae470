//! Placeholder resolution with punctuation cleanup.
//!
//! A placeholder is the literal `{{Header}}` for every visible header. Filled
//! placeholders are replaced by the cell value. Empty ones are removed along
//! with the separator that would otherwise dangle around them, so that
//! `"Dear {{Title}} {{Name}},"` with no title reads `"Dear Bob,"`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MergeError, Result};
use crate::model::row::Cell;

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.])").expect("valid regex"));
static REPEATED_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",{2,}").expect("valid regex"));
static REPEATED_PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.{2,}").expect("valid regex"));
static LEADING_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[,.]\s*").expect("valid regex"));
static PLACEHOLDER_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.+?)\}\}").expect("valid regex"));
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Removal patterns for one header, applied in order when its cell is empty.
#[derive(Debug, Clone)]
struct Placeholder {
    token: String,
    /// The placeholder alone on its line.
    whole_line: Regex,
    /// `, {{h}}`
    comma_before: Regex,
    /// `{{h}} , `
    comma_after: Regex,
    /// ` {{h}}`
    space_before: Regex,
    /// `{{h}} `
    space_after: Regex,
}

impl Placeholder {
    fn compile(header: &str) -> Result<Self> {
        let token = format!("{{{{{header}}}}}");
        let esc = regex::escape(&token);
        let build = |pattern: String| {
            Regex::new(&pattern).map_err(|source| MergeError::Pattern {
                header: header.to_string(),
                source,
            })
        };
        Ok(Self {
            whole_line: build(format!(r"(?m)^\s*{esc}\s*$"))?,
            comma_before: build(format!(r",\s*{esc}"))?,
            comma_after: build(format!(r"{esc}\s*,\s+"))?,
            space_before: build(format!(r"\s+{esc}"))?,
            space_after: build(format!(r"{esc}\s+"))?,
            token,
        })
    }

    fn remove(&self, text: String) -> String {
        if !text.contains(&self.token) {
            return text;
        }
        let text = self.whole_line.replace_all(&text, "").into_owned();
        let text = self.comma_before.replace_all(&text, "").into_owned();
        let text = self.comma_after.replace_all(&text, "").into_owned();
        let text = self.space_before.replace_all(&text, "").into_owned();
        let text = self.space_after.replace_all(&text, "").into_owned();
        text.replace(&self.token, "")
    }
}

/// Compiled placeholders for a header list.
///
/// Compile once per run and resolve every row against it.
#[derive(Debug, Clone)]
pub struct Placeholders {
    entries: Vec<Placeholder>,
}

impl Placeholders {
    pub fn compile(headers: &[String]) -> Result<Self> {
        let entries = headers
            .iter()
            .map(|h| Placeholder::compile(h))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Resolve `text` against `values`, which are aligned with the headers
    /// this set was compiled from. Missing trailing values count as empty.
    pub fn resolve(&self, text: &str, values: &[Cell]) -> String {
        let mut text = text.to_string();
        for (i, placeholder) in self.entries.iter().enumerate() {
            let value = values.get(i).and_then(|v| v.as_deref());
            match value {
                Some(v) if !v.trim().is_empty() => {
                    text = text.replace(&placeholder.token, v);
                }
                _ => text = placeholder.remove(text),
            }
        }
        tidy_punctuation(&text)
    }

    /// Like [`resolve`](Self::resolve), after stripping editor markup from
    /// inside every `{{...}}` span. Used for previews.
    pub fn resolve_tag_stripped(&self, text: &str, values: &[Cell]) -> String {
        self.resolve(&strip_placeholder_markup(text), values)
    }
}

/// One-shot resolution. Prefer [`Placeholders`] when resolving many rows.
pub fn resolve(text: &str, values: &[Cell], headers: &[String]) -> Result<String> {
    Ok(Placeholders::compile(headers)?.resolve(text, values))
}

/// One-shot tag-stripped resolution.
pub fn resolve_tag_stripped(text: &str, values: &[Cell], headers: &[String]) -> Result<String> {
    Ok(Placeholders::compile(headers)?.resolve_tag_stripped(text, values))
}

/// Rewrite `{{<b>Na</b>me&nbsp;}}` as `{{Name}}`.
pub fn strip_placeholder_markup(text: &str) -> String {
    PLACEHOLDER_SPAN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let inner = HTML_TAG.replace_all(&caps[1], "");
            let inner = inner
                .replace("&nbsp;", " ")
                .replace("&amp;", "&")
                .replace("&lt;", "<")
                .replace("&gt;", ">");
            format!("{{{{{}}}}}", inner.trim())
        })
        .into_owned()
}

fn tidy_punctuation(text: &str) -> String {
    let text = SPACE_BEFORE_PUNCT.replace_all(text, "$1");
    let text = REPEATED_COMMA.replace_all(&text, ",");
    let mut text = REPEATED_PERIOD.replace_all(&text, ".").into_owned();
    // Repeat so that mixed runs like ".," leave nothing for a second pass.
    while let Some(m) = LEADING_PUNCT.find(&text) {
        text.replace_range(..m.end(), "");
    }
    text
}
