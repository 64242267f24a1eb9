//! Tests for URL validation and text cleanup.

use tender_core::validation::{
    clean_text, extract_reg_number, validate_tender_url, ValidationError,
};

const GOOD_URL: &str =
    "https://zakupki.gov.ru/epz/order/notice/ea20/view/common-info.html?regNumber=0123456789012345678";

#[test]
fn accepts_portal_url_with_reg_number() {
    assert_eq!(validate_tender_url(GOOD_URL), Ok(()));
}

#[test]
fn accepts_www_subdomain() {
    let url = "https://www.zakupki.gov.ru/epz/order/notice/view.html?regNumber=42";
    assert_eq!(validate_tender_url(url), Ok(()));
}

#[test]
fn rejects_empty_url() {
    assert_eq!(validate_tender_url(""), Err(ValidationError::Empty));
    assert_eq!(validate_tender_url("   "), Err(ValidationError::Empty));
}

#[test]
fn rejects_malformed_url() {
    assert_eq!(
        validate_tender_url("not a url at all"),
        Err(ValidationError::Malformed)
    );
}

#[test]
fn rejects_foreign_host() {
    assert_eq!(
        validate_tender_url("https://example.com/?regNumber=1"),
        Err(ValidationError::WrongHost)
    );
    // Host must match exactly or be a subdomain, not merely contain the name.
    assert_eq!(
        validate_tender_url("https://zakupki.gov.ru.evil.com/?regNumber=1"),
        Err(ValidationError::WrongHost)
    );
}

#[test]
fn rejects_missing_reg_number() {
    assert_eq!(
        validate_tender_url("https://zakupki.gov.ru/epz/order/notice/view.html"),
        Err(ValidationError::MissingRegNumber)
    );
    assert_eq!(
        validate_tender_url("https://zakupki.gov.ru/view.html?regNumber="),
        Err(ValidationError::MissingRegNumber)
    );
}

#[test]
fn extracts_reg_number() {
    assert_eq!(
        extract_reg_number(GOOD_URL).as_deref(),
        Some("0123456789012345678")
    );
    assert_eq!(extract_reg_number("https://zakupki.gov.ru/x.html"), None);
}

#[test]
fn clean_text_collapses_whitespace() {
    assert_eq!(clean_text("  a\u{a0}b&nbsp;c \n\t d  "), "a b c d");
    assert_eq!(clean_text(""), "");
    // Quotes survive cleanup.
    assert_eq!(
        clean_text("Поставка \u{ab}товаров\u{bb}\n медицинских"),
        "Поставка \u{ab}товаров\u{bb} медицинских"
    );
}
