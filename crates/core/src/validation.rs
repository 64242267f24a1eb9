//! Caller-side validation for submitted tender URLs.
//!
//! The task manager does not re-validate; a URL that passes here is the only
//! kind that ever enters the state machine.

use thiserror::Error;
use url::Url;

/// Required host of the procurement portal.
pub const PORTAL_HOST: &str = "zakupki.gov.ru";

/// Rejection reasons for a submitted URL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Empty or whitespace-only input.
    #[error("url must not be empty")]
    Empty,
    /// Not parseable as an absolute URL.
    #[error("malformed url")]
    Malformed,
    /// Host is not the procurement portal.
    #[error("url must point to {PORTAL_HOST}")]
    WrongHost,
    /// The mandatory registration-number query parameter is missing.
    #[error("url is missing the regNumber query parameter")]
    MissingRegNumber,
}

/// Checks that `url` is an absolute portal URL carrying `regNumber`.
pub fn validate_tender_url(url: &str) -> Result<(), ValidationError> {
    if url.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    let parsed = Url::parse(url).map_err(|_| ValidationError::Malformed)?;

    let host_ok = parsed
        .host_str()
        .map(|h| h == PORTAL_HOST || h.ends_with(&format!(".{PORTAL_HOST}")))
        .unwrap_or(false);
    if !host_ok {
        return Err(ValidationError::WrongHost);
    }

    if extract_reg_number(url).is_none() {
        return Err(ValidationError::MissingRegNumber);
    }

    Ok(())
}

/// Pulls the `regNumber` query parameter out of a URL, if present.
pub fn extract_reg_number(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "regNumber")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Normalizes scraped text: NBSP and control whitespace become spaces,
/// runs of whitespace collapse, ends are trimmed. Quotes are kept.
pub fn clean_text(text: &str) -> String {
    let replaced = text
        .replace('\u{a0}', " ")
        .replace("&nbsp;", " ")
        .replace(['\n', '\r', '\t'], " ");

    let mut out = String::with_capacity(replaced.len());
    let mut prev_space = false;
    for c in replaced.chars() {
        if c == ' ' {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out.trim().to_string()
}
