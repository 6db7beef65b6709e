//! Structured metadata mining over normalized document text.
//!
//! The documents this pipeline ingests are Brazilian project status reports
//! that carry a planned-start and an actual-completion date behind fixed
//! Portuguese labels. Both fields are optional and mined independently.

use std::sync::OnceLock;

use regex::Regex;

/// Start/end date pair mined from a document, kept in their source
/// `dd/mm/yyyy` textual form. Comparison and range filtering happen on the
/// textual representation (see `storage`), so no calendar parsing is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentDates {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn start_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Data de início:\s*(\d{2}/\d{2}/\d{4})").expect("valid start-date pattern")
    })
}

fn end_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Conclusão Efetiva:\s*(\d{2}/\d{2}/\d{4})").expect("valid end-date pattern")
    })
}

/// Scan normalized text for the first occurrence of each date label.
///
/// The two searches are independent; a document may carry either date
/// without the other. Absence is not an error.
pub fn extract_dates(text: &str) -> DocumentDates {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    DocumentDates {
        start_date: capture(start_date_re()),
        end_date: capture(end_date_re()),
    }
}
