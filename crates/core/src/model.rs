//! Task lifecycle and tender domain model.
//!
//! Tender structures serialize with camelCase field names; that is the
//! wire format existing clients of the service already speak.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a parse task.
///
/// Transitions are strictly `pending -> processing -> {completed | failed}`;
/// the two final states are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, waiting for an execution slot.
    Pending,
    /// Extraction in progress.
    Processing,
    /// Finished with a stored result.
    Completed,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// True for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire string for this status, e.g. `"pending"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Monetary amount with currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Price {
    /// Numeric amount.
    pub amount: f64,
    /// Currency name or code; rubles unless the notice says otherwise.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "RUB".to_string()
}

impl Price {
    /// Price in the default currency (rubles).
    pub fn rub(amount: f64) -> Self {
        Self {
            amount,
            currency: default_currency(),
        }
    }
}

/// A named characteristic of a purchase item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCharacteristic {
    /// Ordinal within the item.
    pub id: u32,
    /// Characteristic name.
    pub name: String,
    /// Stated value.
    pub value: String,
    /// Unit of the value, when quantitative.
    #[serde(default)]
    pub unit: Option<String>,
    /// Characteristic kind, e.g. "Качественная" or "Количественная".
    #[serde(rename = "type", default = "default_characteristic_kind")]
    pub kind: String,
    /// Whether the characteristic is mandatory.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Whether the bidder may substitute the value.
    #[serde(default)]
    pub changeable: bool,
    /// Portal instruction on how to fill the value in a bid.
    #[serde(default)]
    pub fill_instruction: Option<String>,
}

fn default_characteristic_kind() -> String {
    "Качественная".to_string()
}

fn default_true() -> bool {
    true
}

/// One purchase line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Ordinal within the tender.
    pub id: u32,
    /// Item name as stated on the notice.
    pub name: String,
    /// OKPD2 classification code.
    #[serde(default)]
    pub okpd2_code: Option<String>,
    /// KTRU catalogue code.
    #[serde(default)]
    pub ktru_code: Option<String>,
    /// Ordered quantity.
    pub quantity: u32,
    /// Unit of measurement, e.g. "шт" or "пара".
    pub unit_of_measurement: String,
    /// Price per unit, when stated.
    #[serde(default)]
    pub unit_price: Option<Price>,
    /// Line total, when stated.
    #[serde(default)]
    pub total_price: Option<Price>,
    /// Item characteristics from the KTRU card.
    #[serde(default)]
    pub characteristics: Vec<ItemCharacteristic>,
    /// Free-text extra requirements attached to the item.
    #[serde(default)]
    pub additional_requirements: Option<String>,
}

/// A document attached to the notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Display name of the document.
    pub name: String,
    /// File type derived from the portal icon, e.g. "pdf" or "docx".
    #[serde(rename = "type", default = "default_attachment_kind")]
    pub kind: String,
    /// Optional portal description.
    #[serde(default)]
    pub description: Option<String>,
    /// Download URL into the portal file store.
    pub url: String,
}

fn default_attachment_kind() -> String {
    "document".to_string()
}

/// Delivery terms stated on the notice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInfo {
    /// Delivery address.
    #[serde(default)]
    pub delivery_address: Option<String>,
    /// Delivery or contract-start term.
    #[serde(default)]
    pub delivery_term: Option<String>,
    /// Free-text delivery conditions.
    #[serde(default)]
    pub delivery_conditions: Option<String>,
}

/// Payment terms stated on the notice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    /// Payment deadline.
    #[serde(default)]
    pub payment_term: Option<String>,
    /// Payment method, typically "Безналичный расчет".
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Free-text payment conditions.
    #[serde(default)]
    pub payment_conditions: Option<String>,
}

/// Free-text requirement blocks some notices carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralRequirements {
    /// Quality requirements.
    #[serde(default)]
    pub quality_requirements: Option<String>,
    /// Packaging requirements.
    #[serde(default)]
    pub packaging_requirements: Option<String>,
    /// Marking requirements.
    #[serde(default)]
    pub marking_requirements: Option<String>,
    /// Warranty requirements.
    #[serde(default)]
    pub warranty_requirements: Option<String>,
    /// Safety requirements.
    #[serde(default)]
    pub safety_requirements: Option<String>,
    /// Regulatory compliance requirements.
    #[serde(default)]
    pub regulatory_requirements: Option<String>,
}

/// Headline tender metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenderInfo {
    /// Name of the purchase object.
    pub tender_name: String,
    /// Registration number on the portal; the natural key for storage.
    pub tender_number: String,
    /// Purchasing organization.
    pub customer_name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Procurement procedure, e.g. "Электронный аукцион".
    #[serde(default = "default_purchase_type")]
    pub purchase_type: String,
    /// Funding source, e.g. "Бюджетные средства".
    #[serde(default)]
    pub financing_source: Option<String>,
    /// Initial (maximum) contract price.
    #[serde(default)]
    pub max_price: Option<Price>,
    /// Delivery terms.
    #[serde(default)]
    pub delivery_info: Option<DeliveryInfo>,
    /// Payment terms.
    #[serde(default)]
    pub payment_info: Option<PaymentInfo>,
}

fn default_purchase_type() -> String {
    "Электронный аукцион".to_string()
}

/// Everything extracted from one tender notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenderData {
    /// Headline metadata.
    pub tender_info: TenderInfo,
    /// Purchase line items.
    #[serde(default)]
    pub items: Vec<Item>,
    /// Free-text requirement blocks, when present.
    #[serde(default)]
    pub general_requirements: Option<GeneralRequirements>,
    /// Attached documents.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}
