//! CSS extraction over the rendered notice HTML.
//!
//! The portal serves two markups for the same notice: the "paste" variant
//! wraps sections in collapsible blocks, the plain variant lays them out
//! flat. Both carry `section.blockInfo__section` elements with a
//! `span.section__title` label and a `span.section__info` value, so most
//! fields are extracted by label lookup rather than positional selectors.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use tender_core::model::{
    Attachment, DeliveryInfo, GeneralRequirements, Item, ItemCharacteristic, PaymentInfo, Price,
    TenderData, TenderInfo,
};
use tender_core::validation::clean_text;

use crate::extract::ExtractError;

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// True when the notice uses the collapsible "paste" markup.
pub fn is_paste_format(doc: &Html) -> bool {
    doc.select(&sel("div.blockInfo__collapse.collapseInfo"))
        .next()
        .is_some()
}

fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<String>())
}

/// Value of the first section whose title contains `label`.
fn section_info(doc: &Html, label: &str) -> Option<String> {
    let section_sel = sel("section.blockInfo__section, section.section");
    let title_sel = sel("span.section__title");
    let info_sel = sel("span.section__info");

    for section in doc.select(&section_sel) {
        let Some(title) = section.select(&title_sel).next() else {
            continue;
        };
        if !element_text(title).contains(label) {
            continue;
        }
        if let Some(info) = section.select(&info_sel).next() {
            let text = element_text(info);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Normalizes a portal price string ("160 000,00 ₽") into a float.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned: String = clean_text(text)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let normalized = cleaned.replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse().ok()
}

/// OKPD2 classification code, format `XX.XX.XX.XXX`. A KTRU cell matches
/// too: its first eleven characters are the OKPD2 prefix.
pub fn extract_okpd2_code(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\d{2}\.\d{2}\.\d{2}\.\d{3}").expect("okpd2 regex compiles")
    });
    re.find(text).map(|m| m.as_str().to_string())
}

/// KTRU catalogue code, format `XX.XX.XX.XXX-XXXXXXXX`.
pub fn extract_ktru_code(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\d{2}\.\d{2}\.\d{2}\.\d{3}-\d{8}").expect("ktru regex compiles")
    });
    re.find(text).map(|m| m.as_str().to_string())
}

fn parse_quantity(text: &str) -> Option<u32> {
    let digits: String = clean_text(text)
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn tender_number(doc: &Html) -> Option<String> {
    let link = doc
        .select(&sel("span.cardMainInfo__purchaseLink a"))
        .next()?;
    let text = element_text(link);
    let number = match text.rsplit_once('№') {
        Some((_, tail)) => tail.trim().to_string(),
        None => text,
    };
    if number.is_empty() {
        None
    } else {
        Some(number)
    }
}

fn delivery_info(doc: &Html) -> DeliveryInfo {
    DeliveryInfo {
        delivery_address: section_info(doc, "Место поставки товара"),
        delivery_term: section_info(doc, "Дата начала исполнения контракта")
            .or_else(|| section_info(doc, "Срок исполнения контракта")),
        delivery_conditions: section_info(doc, "Условия поставки"),
    }
}

fn payment_info(doc: &Html) -> PaymentInfo {
    PaymentInfo {
        payment_term: section_info(doc, "Срок оплаты"),
        payment_method: section_info(doc, "Порядок оплаты")
            .or_else(|| Some("Безналичный расчет".to_string())),
        payment_conditions: section_info(doc, "Реквизиты"),
    }
}

/// Line items from the KTRU position table.
///
/// Column order on the portal: position marker, codes, name, unit,
/// quantity, unit price, total. Expanded characteristic sub-rows carry a
/// `truInfo_N` class and hold a nested characteristics table; they attach
/// to the item row just above them.
fn parse_items(doc: &Html) -> Vec<Item> {
    let row_sel = sel("#positionKTRU table.tableBlock tbody.tableBlock__body > tr.tableBlock__row");
    let cell_sel = sel("td.tableBlock__col");

    let mut items: Vec<Item> = Vec::new();
    let mut next_id = 1u32;

    for row in doc.select(&row_sel) {
        let classes = row.value().attr("class").unwrap_or_default();
        if classes.contains("truInfo_") {
            if let Some(item) = items.last_mut() {
                if item.characteristics.is_empty() {
                    item.characteristics = parse_characteristics(row);
                }
            }
            continue;
        }

        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        if cells.len() < 7 {
            continue;
        }

        let code_cell = element_text(cells[1]);
        // The name cell can carry variant lines below the actual name.
        let name = cells[2]
            .text()
            .collect::<String>()
            .lines()
            .map(clean_text)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let quantity = match parse_quantity(&element_text(cells[4])) {
            Some(q) => q,
            None => {
                debug!(row = %name, "item row without a parseable quantity, skipped");
                continue;
            }
        };

        items.push(Item {
            id: next_id,
            name,
            okpd2_code: extract_okpd2_code(&code_cell),
            ktru_code: extract_ktru_code(&code_cell),
            quantity,
            unit_of_measurement: element_text(cells[3]),
            unit_price: parse_price_text(&element_text(cells[5])).map(Price::rub),
            total_price: parse_price_text(&element_text(cells[6])).map(Price::rub),
            characteristics: Vec::new(),
            additional_requirements: None,
        });
        next_id += 1;
    }

    items
}

const CHARACTERISTICS_HEADER: &str = "НАИМЕНОВАНИЕ ХАРАКТЕРИСТИК";

fn characteristic_kind(instruction: &str) -> String {
    if instruction.to_lowercase().contains("конкретное значение") {
        "Количественная".to_string()
    } else {
        "Качественная".to_string()
    }
}

fn characteristic_changeable(instruction: &str) -> bool {
    let lower = instruction.to_lowercase();
    if lower.contains("не может изменяться") {
        return false;
    }
    lower.contains("указывает в заявке")
}

/// Characteristics from the nested table inside an expanded `truInfo_` row.
///
/// Multi-valued characteristics span rows via `rowspan` on the name cell;
/// the continuation rows hold only the extra values, which join into one
/// comma-separated value.
fn parse_characteristics(tru_row: ElementRef<'_>) -> Vec<ItemCharacteristic> {
    let table_sel = sel("table.tableBlock");
    let row_sel = sel("tbody tr.tableBlock__row");
    let cell_sel = sel("td");

    for table in tru_row.select(&table_sel) {
        let table_text = table.text().collect::<String>().to_uppercase();
        if !table_text.contains(CHARACTERISTICS_HEADER) {
            continue;
        }

        let rows: Vec<ElementRef<'_>> = table.select(&row_sel).collect();
        let mut out = Vec::new();
        let mut next_id = 1u32;
        let mut i = 0usize;

        while i < rows.len() {
            let cells: Vec<ElementRef<'_>> = rows[i].select(&cell_sel).collect();
            if cells.len() < 2 {
                i += 1;
                continue;
            }

            let name = element_text(cells[0]);
            if name.is_empty() || name.to_uppercase().contains(CHARACTERISTICS_HEADER) {
                i += 1;
                continue;
            }

            let rowspan = cells[0]
                .value()
                .attr("rowspan")
                .and_then(|r| r.trim().parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);

            let mut values = vec![element_text(cells[1])];
            for j in 1..rowspan {
                if let Some(next) = rows.get(i + j) {
                    if let Some(cell) = next.select(&cell_sel).next() {
                        let value = element_text(cell);
                        if !value.is_empty() {
                            values.push(value);
                        }
                    }
                }
            }

            let unit = cells.get(2).map(|c| element_text(*c)).filter(|t| !t.is_empty());
            let instruction = cells.get(3).map(|c| element_text(*c)).filter(|t| !t.is_empty());

            out.push(ItemCharacteristic {
                id: next_id,
                name,
                value: values.join(", "),
                unit,
                kind: characteristic_kind(instruction.as_deref().unwrap_or_default()),
                required: true,
                changeable: characteristic_changeable(instruction.as_deref().unwrap_or_default()),
                fill_instruction: instruction,
            });
            next_id += 1;
            i += rowspan;
        }

        if !out.is_empty() {
            return out;
        }
    }

    Vec::new()
}

/// Warranty block of the notice, condensed to one line.
///
/// The block is present only when the heading exists and the notice says a
/// quality warranty is required; term, service and manufacturer clauses
/// join with "; ".
fn warranty_requirements(doc: &Html) -> Option<String> {
    let h2_sel = sel("h2");
    let has_block = doc
        .select(&h2_sel)
        .any(|h| element_text(h).contains("Требования к гарантии качества товара"));
    if !has_block {
        return None;
    }

    if let Some(required) = section_info(doc, "Требуется гарантия качества") {
        if !required.to_lowercase().contains("да") {
            return None;
        }
    }

    let mut parts = Vec::new();
    if let Some(term) = section_info(doc, "Срок, на который предоставляется гарантия") {
        if term != "-" {
            parts.push(term);
        }
    }
    if let Some(service) = section_info(doc, "Информация о требованиях к гарантийному обслуживанию")
    {
        if service != "-" {
            parts.push(format!("Гарантийное обслуживание: {service}"));
        }
    }
    if let Some(maker) = section_info(doc, "Требования к гарантии производителя") {
        if maker != "-" {
            parts.push(format!("Гарантия производителя: {maker}"));
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn general_requirements(doc: &Html) -> Option<GeneralRequirements> {
    let warranty = warranty_requirements(doc)?;
    Some(GeneralRequirements {
        warranty_requirements: Some(warranty),
        ..GeneralRequirements::default()
    })
}

/// Attachment rows from the documents tab.
pub fn parse_attachments(html: &str) -> Vec<Attachment> {
    let doc = Html::parse_document(html);
    let row_sel = sel("div.blockFilesTabDocs .attachment.row, div.blockFilesTabDocs .attachment");
    let link_sel = sel(r#"a[href*="filestore"]"#);
    let icon_sel = sel(r#"img[src*="/icons/type/"]"#);

    let mut out = Vec::new();
    for row in doc.select(&row_sel) {
        let Some(link) = row.select(&link_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href") else {
            continue;
        };

        let mut name = element_text(link);
        if name.is_empty() {
            if let Some(title) = link.value().attr("title") {
                // Title carries the filename; drop the extension.
                name = match title.rsplit_once('.') {
                    Some((stem, ext)) if !ext.contains(' ') => stem.to_string(),
                    _ => title.to_string(),
                };
                name = clean_text(&name);
            }
        }
        if name.is_empty() {
            continue;
        }

        let kind = row
            .select(&icon_sel)
            .next()
            .and_then(|icon| icon.value().attr("src"))
            .map(file_type_from_icon)
            .unwrap_or_else(|| "document".to_string());

        out.push(Attachment {
            name,
            kind,
            description: None,
            url: url.to_string(),
        });
    }
    out
}

/// File type from the portal's icon path, e.g. `.../icons/type/docx.svg`.
fn file_type_from_icon(src: &str) -> String {
    src.rsplit('/')
        .next()
        .and_then(|file| file.split('.').next())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .unwrap_or_else(|| "document".to_string())
}

/// Full extraction from the rendered common-info page.
///
/// Fails only when the registration number cannot be found: without the
/// natural key there is nothing to upsert.
pub fn parse_notice(html: &str) -> Result<TenderData, ExtractError> {
    let doc = Html::parse_document(html);

    // Both markups share the label/value section structure, so detection
    // only matters for diagnostics when a page yields nothing.
    if is_paste_format(&doc) {
        debug!("notice uses the collapsible paste markup");
    }

    let number = tender_number(&doc)
        .ok_or_else(|| ExtractError::new("tender number not found on page"))?;

    let info = TenderInfo {
        tender_name: section_info(&doc, "Наименование объекта закупки").unwrap_or_default(),
        tender_number: number,
        customer_name: section_info(&doc, "Организация, осуществляющая размещение")
            .unwrap_or_default(),
        description: None,
        purchase_type: section_info(&doc, "Способ определения поставщика")
            .unwrap_or_else(|| "Электронный аукцион".to_string()),
        financing_source: section_info(&doc, "Источник финансирования"),
        max_price: section_info(&doc, "Начальная (максимальная) цена контракта")
            .and_then(|t| parse_price_text(&t))
            .map(|amount| Price {
                amount,
                currency: section_info(&doc, "Валюта").unwrap_or_else(|| "RUB".to_string()),
            }),
        delivery_info: Some(delivery_info(&doc)),
        payment_info: Some(payment_info(&doc)),
    };

    Ok(TenderData {
        tender_info: info,
        items: parse_items(&doc),
        general_requirements: general_requirements(&doc),
        attachments: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTICE_HTML: &str = r#"
        <html><body>
          <span class="cardMainInfo__purchaseLink distancedText">
            <a href="/epz/order/notice/ea20/view/common-info.html?regNumber=0373100064623000001">
              № 0373100064623000001</a>
          </span>
          <section class="blockInfo__section section">
            <span class="section__title">Наименование объекта закупки</span>
            <span class="section__info">Поставка перчаток&nbsp;смотровых</span>
          </section>
          <section class="blockInfo__section section">
            <span class="section__title">Организация, осуществляющая размещение</span>
            <span class="section__info">ГБУЗ "Городская больница №1"</span>
          </section>
          <section class="blockInfo__section section">
            <span class="section__title">Начальная (максимальная) цена контракта</span>
            <span class="section__info">160&nbsp;000,00 ₽</span>
          </section>
          <section class="blockInfo__section section">
            <span class="section__title">Валюта</span>
            <span class="section__info">Российский рубль</span>
          </section>
          <section class="blockInfo__section section">
            <span class="section__title">Место поставки товара</span>
            <span class="section__info">г. Москва, ул. Ленина, д. 1</span>
          </section>
          <h2>Требования к гарантии качества товара</h2>
          <section class="blockInfo__section section">
            <span class="section__title">Требуется гарантия качества</span>
            <span class="section__info">Да</span>
          </section>
          <section class="blockInfo__section section">
            <span class="section__title">Срок, на который предоставляется гарантия</span>
            <span class="section__info">12 месяцев</span>
          </section>
          <div id="positionKTRU">
            <table class="tableBlock">
              <tbody class="tableBlock__body">
                <tr class="tableBlock__row">
                  <td class="tableBlock__col">1</td>
                  <td class="tableBlock__col">22.19.60.119-00000012</td>
                  <td class="tableBlock__col">Перчатки смотровые
Вариант поставки</td>
                  <td class="tableBlock__col">пара</td>
                  <td class="tableBlock__col">500</td>
                  <td class="tableBlock__col">32,00</td>
                  <td class="tableBlock__col">16&nbsp;000,00</td>
                </tr>
                <tr class="tableBlock__row truInfo_1">
                  <td colspan="7">
                    <table class="tableBlock">
                      <tbody>
                        <tr class="tableBlock__row">
                          <td>Наименование характеристики</td>
                          <td>Значение</td>
                          <td>Ед. изм.</td>
                          <td>Инструкция</td>
                        </tr>
                        <tr class="tableBlock__row">
                          <td>Материал</td>
                          <td>Нитрил</td>
                          <td></td>
                          <td>Значение характеристики не может изменяться участником закупки</td>
                        </tr>
                        <tr class="tableBlock__row">
                          <td rowspan="2">Размер</td>
                          <td>M</td>
                          <td></td>
                          <td>Участник закупки указывает в заявке конкретное значение характеристики</td>
                        </tr>
                        <tr class="tableBlock__row">
                          <td>L</td>
                        </tr>
                      </tbody>
                    </table>
                  </td>
                </tr>
              </tbody>
            </table>
          </div>
        </body></html>
    "#;

    #[test]
    fn parses_notice_fields() {
        let tender = parse_notice(NOTICE_HTML).unwrap();
        let info = &tender.tender_info;
        assert_eq!(info.tender_number, "0373100064623000001");
        assert_eq!(info.tender_name, "Поставка перчаток смотровых");
        assert_eq!(info.customer_name, "ГБУЗ \"Городская больница №1\"");
        assert_eq!(info.purchase_type, "Электронный аукцион");

        let price = info.max_price.as_ref().unwrap();
        assert_eq!(price.amount, 160000.0);
        assert_eq!(price.currency, "Российский рубль");

        let delivery = info.delivery_info.as_ref().unwrap();
        assert_eq!(
            delivery.delivery_address.as_deref(),
            Some("г. Москва, ул. Ленина, д. 1")
        );

        let reqs = tender.general_requirements.unwrap();
        assert_eq!(reqs.warranty_requirements.as_deref(), Some("12 месяцев"));
        assert!(reqs.quality_requirements.is_none());
    }

    #[test]
    fn parses_item_rows_with_split_codes() {
        let tender = parse_notice(NOTICE_HTML).unwrap();
        assert_eq!(tender.items.len(), 1);
        let item = &tender.items[0];
        assert_eq!(item.name, "Перчатки смотровые");
        assert_eq!(item.okpd2_code.as_deref(), Some("22.19.60.119"));
        assert_eq!(item.ktru_code.as_deref(), Some("22.19.60.119-00000012"));
        assert_eq!(item.quantity, 500);
        assert_eq!(item.unit_of_measurement, "пара");
        assert_eq!(item.unit_price.as_ref().unwrap().amount, 32.0);
        assert_eq!(item.total_price.as_ref().unwrap().amount, 16000.0);
    }

    #[test]
    fn parses_characteristics_from_expanded_sub_rows() {
        let tender = parse_notice(NOTICE_HTML).unwrap();
        let chars = &tender.items[0].characteristics;
        assert_eq!(chars.len(), 2);

        assert_eq!(chars[0].name, "Материал");
        assert_eq!(chars[0].value, "Нитрил");
        assert_eq!(chars[0].kind, "Качественная");
        assert!(!chars[0].changeable);
        assert!(chars[0].required);

        // Rowspan-grouped values merge into one characteristic.
        assert_eq!(chars[1].name, "Размер");
        assert_eq!(chars[1].value, "M, L");
        assert_eq!(chars[1].kind, "Количественная");
        assert!(chars[1].changeable);
    }

    #[test]
    fn code_extraction_splits_okpd2_and_ktru() {
        let cell = "22.19.60.119-00000012 Перчатки";
        assert_eq!(extract_okpd2_code(cell).as_deref(), Some("22.19.60.119"));
        assert_eq!(
            extract_ktru_code(cell).as_deref(),
            Some("22.19.60.119-00000012")
        );

        // A bare OKPD2 cell has no KTRU code.
        assert_eq!(extract_okpd2_code("32.50.50.190").as_deref(), Some("32.50.50.190"));
        assert_eq!(extract_ktru_code("32.50.50.190"), None);
        assert_eq!(extract_okpd2_code("нет кода"), None);
    }

    #[test]
    fn no_warranty_block_means_no_general_requirements() {
        let html = r##"
            <html><body>
              <span class="cardMainInfo__purchaseLink">
                <a href="#">№ 0373100064623000002</a>
              </span>
              <h2>Требования к гарантии качества товара</h2>
              <section class="blockInfo__section section">
                <span class="section__title">Требуется гарантия качества</span>
                <span class="section__info">Нет</span>
              </section>
            </body></html>
        "##;
        let tender = parse_notice(html).unwrap();
        assert!(tender.general_requirements.is_none());
    }

    #[test]
    fn missing_tender_number_is_an_error() {
        let err = parse_notice("<html><body></body></html>").unwrap_err();
        assert!(err.to_string().contains("tender number"));
    }

    #[test]
    fn detects_paste_format() {
        let paste = Html::parse_document(
            r#"<div class="blockInfo__collapse collapseInfo"></div>"#,
        );
        let plain = Html::parse_document(NOTICE_HTML);
        assert!(is_paste_format(&paste));
        assert!(!is_paste_format(&plain));
    }

    #[test]
    fn parses_attachment_rows() {
        let html = r#"
            <div class="blockFilesTabDocs">
              <div class="attachment row">
                <img src="/epz/static/icons/type/pdf.svg"/>
                <a href="https://zakupki.gov.ru/filestore/public/1.0/download/x"
                   title="Извещение.pdf">Извещение о закупке</a>
              </div>
              <div class="attachment row">
                <a href="https://zakupki.gov.ru/filestore/public/1.0/download/y"
                   title="Проект контракта.docx"> </a>
              </div>
              <div class="attachment row">
                <a href="/elsewhere">не документ</a>
              </div>
            </div>
        "#;
        let docs = parse_attachments(html);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "Извещение о закупке");
        assert_eq!(docs[0].kind, "pdf");
        assert!(docs[0].url.contains("filestore"));
        // Empty link text falls back to the title without extension.
        assert_eq!(docs[1].name, "Проект контракта");
        assert_eq!(docs[1].kind, "document");
    }

    #[test]
    fn price_text_normalization() {
        assert_eq!(parse_price_text("160\u{a0}000,00 ₽"), Some(160000.0));
        assert_eq!(parse_price_text("32,00"), Some(32.0));
        assert_eq!(parse_price_text("1500"), Some(1500.0));
        assert_eq!(parse_price_text("нет данных"), None);
    }
}
