use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signature::{sign, SIGNATURE_VERSION};
use crate::{
    config::RedsysConfig,
    domain::{Collaboration, Order},
    error::{AppError, Result},
};

/// Marker between the collaboration id and the time suffix of a first
/// order id.
pub const COLLABORATION_MARKER: char = 'C';

/// `DS_MERCHANT_*` parameters, serialized to JSON then base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MerchantParameters {
    #[serde(rename = "DS_MERCHANT_AMOUNT")]
    pub amount: String,
    #[serde(rename = "DS_MERCHANT_CURRENCY")]
    pub currency: String,
    #[serde(rename = "DS_MERCHANT_MERCHANTCODE")]
    pub merchant_code: String,
    #[serde(rename = "DS_MERCHANT_MERCHANTNAME")]
    pub merchant_name: String,
    #[serde(rename = "DS_MERCHANT_TERMINAL")]
    pub terminal: String,
    #[serde(rename = "DS_MERCHANT_TRANSACTIONTYPE")]
    pub transaction_type: String,
    #[serde(rename = "DS_MERCHANT_PAYMETHODS")]
    pub pay_methods: String,
    #[serde(rename = "DS_MERCHANT_MERCHANTDATA")]
    pub merchant_data: String,
    #[serde(rename = "DS_MERCHANT_MERCHANTURL")]
    pub merchant_url: String,
    #[serde(rename = "DS_MERCHANT_ORDER")]
    pub order: String,
    #[serde(rename = "DS_MERCHANT_IDENTIFIER")]
    pub identifier: String,
    #[serde(rename = "DS_MERCHANT_URLOK", skip_serializing_if = "Option::is_none")]
    pub url_ok: Option<String>,
    #[serde(rename = "DS_MERCHANT_URLKO", skip_serializing_if = "Option::is_none")]
    pub url_ko: Option<String>,
    #[serde(rename = "DS_MERCHANT_DIRECTPAYMENT", skip_serializing_if = "Option::is_none")]
    pub direct_payment: Option<String>,
}

/// The three form fields the gateway expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedParameters {
    #[serde(rename = "Ds_SignatureVersion")]
    pub signature_version: String,
    #[serde(rename = "Ds_MerchantParameters")]
    pub merchant_parameters: String,
    #[serde(rename = "Ds_Signature")]
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RedsysRequest {
    /// Where the fields are posted: the payment form for first orders, the
    /// direct-payment endpoint otherwise.
    pub url: String,
    pub merchant_order_id: String,
    pub parameters: MerchantParameters,
    pub fields: SignedParameters,
}

/// Merchant order id of a stored order.
pub fn persisted_order_id(order_id: i64) -> String {
    format!("{:012}", order_id)
}

/// Largest collaboration id that fits the seven digits of a first-order id.
pub const MAX_FIRST_ORDER_COLLABORATION_ID: i64 = 9_999_999;

/// Merchant order id for a first payment: the collaboration id, the marker
/// and the last four base-36 digits of the current time. The gateway caps
/// order ids at 12 characters.
pub fn first_order_id(collaboration_id: i64, now: DateTime<Utc>) -> Result<String> {
    if !(0..=MAX_FIRST_ORDER_COLLABORATION_ID).contains(&collaboration_id) {
        return Err(AppError::BadRequest(format!(
            "Collaboration {} does not fit a first-payment order id",
            collaboration_id
        )));
    }

    let stamp = to_base36(now.timestamp().max(0) as u64);
    let tail = &stamp[stamp.len().saturating_sub(4)..];
    Ok(format!("{:07}{}{}", collaboration_id, COLLABORATION_MARKER, tail))
}

/// Collaboration embedded in a first-order id, if it has that shape.
pub fn collaboration_id_from_order_id(order_id: &str) -> Option<i64> {
    let head = order_id.get(..7)?;
    let marker = order_id.get(7..8)?;
    if marker.chars().next() != Some(COLLABORATION_MARKER) {
        return None;
    }
    head.parse().ok()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Builds and signs the gateway request for an order. First orders ask the
/// gateway to tokenize the card and notify the callback URL; later orders
/// reuse the stored token as a direct payment.
pub fn build_request(
    config: &RedsysConfig,
    order: &Order,
    collaboration: &Collaboration,
    merchant_order_id: &str,
) -> Result<RedsysRequest> {
    let merchant_data = collaboration
        .user_id()
        .map(|id| id.to_string())
        .unwrap_or_default();

    let mut parameters = MerchantParameters {
        amount: order.amount.to_string(),
        currency: config.currency.clone(),
        merchant_code: config.merchant_code.clone(),
        merchant_name: config.merchant_name.clone(),
        terminal: config.terminal.clone(),
        transaction_type: config.transaction_type.clone(),
        pay_methods: config.payment_methods.clone(),
        merchant_data,
        merchant_url: String::new(),
        order: merchant_order_id.to_string(),
        identifier: String::new(),
        url_ok: None,
        url_ko: None,
        direct_payment: None,
    };

    let url = if order.first {
        parameters.identifier = config.identifier.clone();
        parameters.merchant_url = config.callback_url.clone();
        parameters.url_ok = Some(config.ok_url.clone());
        parameters.url_ko = Some(config.ko_url.clone());
        config.form_url.clone()
    } else {
        parameters.identifier = collaboration.gateway_token.clone().ok_or_else(|| {
            AppError::Payment(format!("Collaboration {} has no card token", collaboration.id))
        })?;
        parameters.direct_payment = Some("true".to_string());
        config.post_url.clone()
    };

    let json = serde_json::to_string(&parameters).map_err(|e| AppError::Internal(e.to_string()))?;
    let merchant_parameters = STANDARD.encode(json);
    let signature = sign(&config.secret_key, merchant_order_id, &merchant_parameters)?;

    Ok(RedsysRequest {
        url,
        merchant_order_id: merchant_order_id.to_string(),
        parameters,
        fields: SignedParameters {
            signature_version: SIGNATURE_VERSION.to_string(),
            merchant_parameters,
            signature,
        },
    })
}
