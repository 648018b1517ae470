//! To / CC / BCC resolution for a row.

use serde::{Deserialize, Serialize};

use crate::model::row::{cell_text, find_column, Cell};

/// How CC or BCC addresses are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecipientMode {
    /// The same operator-supplied list for every row.
    Global,
    /// A `CC` / `BCC` column in the recipient list.
    Individual,
    /// No addresses. Unknown mode names in config files land here too.
    #[default]
    #[serde(other)]
    None,
}

/// CC and BCC configuration for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientSettings {
    pub cc_mode: RecipientMode,
    pub bcc_mode: RecipientMode,
    /// Addresses separated by commas or line breaks.
    pub global_cc: String,
    pub global_bcc: String,
}

/// Resolved envelope recipients. Empty strings mean "none".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientSet {
    pub to: String,
    pub cc: String,
    pub bcc: String,
}

impl RecipientSet {
    pub fn has_recipient(&self) -> bool {
        !self.to.is_empty()
    }
}

/// The row's `Email` cell, trimmed, if it holds anything.
pub fn recipient<'a>(row: &'a [Cell], headers: &[String]) -> Option<&'a str> {
    let idx = find_column(headers, "email")?;
    cell_text(row.get(idx))
}

/// Resolve to, cc and bcc for one row.
pub fn resolve_recipients(
    row: &[Cell],
    headers: &[String],
    settings: &RecipientSettings,
) -> RecipientSet {
    RecipientSet {
        to: recipient(row, headers).unwrap_or_default().to_string(),
        cc: copy_list(row, headers, settings.cc_mode, &settings.global_cc, "cc"),
        bcc: copy_list(row, headers, settings.bcc_mode, &settings.global_bcc, "bcc"),
    }
}

fn copy_list(
    row: &[Cell],
    headers: &[String],
    mode: RecipientMode,
    global: &str,
    column: &str,
) -> String {
    match mode {
        RecipientMode::Global => normalize_address_list(global),
        RecipientMode::Individual => find_column(headers, column)
            .and_then(|idx| cell_text(row.get(idx)))
            .unwrap_or_default()
            .to_string(),
        RecipientMode::None => String::new(),
    }
}

/// Split on commas and line breaks, trim, drop empties, join with `", "`.
pub fn normalize_address_list(raw: &str) -> String {
    raw.split([',', '\n', '\r'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(values: &[Option<&str>]) -> Vec<Cell> {
        values.iter().map(|v| v.map(String::from)).collect()
    }

    #[test]
    fn test_global_list_is_normalized() {
        assert_eq!(
            normalize_address_list("a@x.com, b@x.com\nc@x.com"),
            "a@x.com, b@x.com, c@x.com"
        );
        assert_eq!(normalize_address_list(" ,\r\n, "), "");
    }

    #[test]
    fn test_global_mode_applies_to_every_row() {
        let h = headers(&["Email"]);
        let settings = RecipientSettings {
            cc_mode: RecipientMode::Global,
            global_cc: "a@x.com, b@x.com\nc@x.com".into(),
            ..Default::default()
        };
        for email in ["one@x.com", "two@x.com"] {
            let set = resolve_recipients(&row(&[Some(email)]), &h, &settings);
            assert_eq!(set.to, email);
            assert_eq!(set.cc, "a@x.com, b@x.com, c@x.com");
            assert_eq!(set.bcc, "");
        }
    }

    #[test]
    fn test_individual_mode_reads_columns() {
        let h = headers(&[" EMAIL", "Cc", "BCC "]);
        let settings = RecipientSettings {
            cc_mode: RecipientMode::Individual,
            bcc_mode: RecipientMode::Individual,
            ..Default::default()
        };
        let set = resolve_recipients(
            &row(&[Some(" bob@x.com "), Some(" boss@x.com "), None]),
            &h,
            &settings,
        );
        assert_eq!(set.to, "bob@x.com");
        assert_eq!(set.cc, "boss@x.com");
        assert_eq!(set.bcc, "");
    }

    #[test]
    fn test_individual_mode_without_column() {
        let h = headers(&["Email"]);
        let settings = RecipientSettings {
            cc_mode: RecipientMode::Individual,
            ..Default::default()
        };
        let set = resolve_recipients(&row(&[Some("bob@x.com")]), &h, &settings);
        assert_eq!(set.cc, "");
    }

    #[test]
    fn test_missing_recipient() {
        let h = headers(&["Name", "Email"]);
        assert_eq!(recipient(&row(&[Some("Bob"), Some("  ")]), &h), None);
        assert_eq!(recipient(&row(&[Some("Bob")]), &h), None);
        assert_eq!(recipient(&row(&[Some("Bob")]), &headers(&["Name"])), None);
        let set = resolve_recipients(&row(&[Some("Bob")]), &h, &RecipientSettings::default());
        assert!(!set.has_recipient());
    }

    #[test]
    fn test_unknown_mode_in_config_is_none() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: RecipientMode,
        }
        let parsed: Wrapper = toml::from_str("mode = \"everyone\"").unwrap();
        assert_eq!(parsed.mode, RecipientMode::None);
        let parsed: Wrapper = toml::from_str("mode = \"global\"").unwrap();
        assert_eq!(parsed.mode, RecipientMode::Global);
    }
}
