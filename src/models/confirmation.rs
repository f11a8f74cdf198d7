use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Credit,
    Debit,
    Pix,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryConfirmation {
    pub delivery_id: String,
    pub signature_image: Option<Vec<u8>>,
    pub photo_image: Option<Vec<u8>>,
    pub receiver_name: String,
    pub receiver_document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<Decimal>,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub delivery_id: String,
    pub is_paid: bool,
    pub total_value: Decimal,
}
