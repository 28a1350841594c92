use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{sepa_reason, BillingPeriod, PaymentType};
use crate::payments::redsys::response_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Charging,
    Paid,
    Warning,
    Error,
    Returned,
}

impl OrderStatus {
    pub fn code(self) -> i64 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Charging => 1,
            OrderStatus::Paid => 2,
            OrderStatus::Warning => 3,
            OrderStatus::Error => 4,
            OrderStatus::Returned => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(OrderStatus::New),
            1 => Some(OrderStatus::Charging),
            2 => Some(OrderStatus::Paid),
            3 => Some(OrderStatus::Warning),
            4 => Some(OrderStatus::Error),
            5 => Some(OrderStatus::Returned),
            _ => None,
        }
    }

    /// Paid orders can still be returned by the bank weeks later; error and
    /// returned are final.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, next),
            (New, Charging | Error)
                | (Charging, Paid | Warning | Error | Returned)
                | (Paid, Warning | Error | Returned)
                | (Warning, Error | Returned)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Error | OrderStatus::Returned)
    }
}

/// One charge attempt of a collaboration for a billing period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub collaboration_id: i64,
    pub user_id: Option<Uuid>,
    pub period: BillingPeriod,
    pub payable_at: NaiveDate,
    pub amount: i64,
    pub periods_covered: i32,
    pub first: bool,
    pub status: OrderStatus,
    pub payment_type: PaymentType,
    pub payment_identifier: Option<String>,
    pub gateway_order_id: Option<String>,
    pub reference: String,
    pub territory: String,
    /// Raw gateway or bank answer, kept for audit.
    pub payment_response: Option<String>,
    pub payed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_chargeable(&self) -> bool {
        self.status == OrderStatus::New
    }

    pub fn is_payable(&self) -> bool {
        matches!(self.status, OrderStatus::New | OrderStatus::Charging)
    }

    pub fn is_paid(&self) -> bool {
        self.payed_at.is_some() && matches!(self.status, OrderStatus::Paid | OrderStatus::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.status == OrderStatus::Error
    }

    pub fn was_returned(&self) -> bool {
        self.status == OrderStatus::Returned
    }

    pub fn is_credit_card(&self) -> bool {
        self.payment_type == PaymentType::CreditCard
    }

    pub fn is_bank(&self) -> bool {
        self.payment_type.is_bank()
    }

    /// SEPA sequence type.
    pub fn due_code(&self) -> &'static str {
        if self.first {
            "FRST"
        } else {
            "RCUR"
        }
    }

    /// Human readable outcome, derived from the stored response.
    pub fn status_text(&self) -> String {
        if self.is_bank() {
            self.bank_status_text()
        } else {
            self.card_status_text()
        }
    }

    fn bank_status_text(&self) -> String {
        let reason = self.payment_response.as_deref().map(|code| match sepa_reason(code) {
            Some(reason) => format!("{}: {}", reason.code, reason.text),
            None => code.to_string(),
        });

        match (self.status, reason) {
            (OrderStatus::Error | OrderStatus::Returned | OrderStatus::Warning, Some(reason)) => reason,
            (OrderStatus::Error, None) => "Error".to_string(),
            (OrderStatus::Returned, None) => "Order returned".to_string(),
            _ => String::new(),
        }
    }

    fn card_status_text(&self) -> String {
        if self.status == OrderStatus::Returned {
            return "Order returned".to_string();
        }

        match self.gateway_code() {
            Some(code) => format!("{}: {}", code, response_text(&code)),
            None => "Transaction not processed".to_string(),
        }
    }

    /// Callback answers are stored as a JSON object carrying `Ds_Response`;
    /// direct payments as the list of markers found in the response page.
    fn gateway_code(&self) -> Option<String> {
        let raw = self.payment_response.as_deref()?;
        match serde_json::from_str::<serde_json::Value>(raw).ok()? {
            serde_json::Value::Object(map) => map.get("Ds_Response")?.as_str().map(str::to_string),
            serde_json::Value::Array(items) => items.last()?.as_str().map(str::to_string),
            _ => None,
        }
    }
}

/// Values the scheduler computes for an order that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub collaboration_id: i64,
    pub user_id: Option<Uuid>,
    pub period: BillingPeriod,
    pub payable_at: NaiveDate,
    pub amount: i64,
    pub periods_covered: i32,
    pub first: bool,
    pub payment_type: PaymentType,
    pub payment_identifier: Option<String>,
    pub reference: String,
    pub territory: String,
}

/// Why a bank or gateway gave an order back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnReason {
    /// Return without a reason code.
    Unspecified,
    /// SEPA reason code from a bank return file.
    Sepa(String),
    /// Card declined by the gateway, carrying its response code if any.
    GatewayDecline(Option<String>),
}

/// What happened to an order, as reported to its collaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderOutcome {
    pub had_error: bool,
    pub had_warning: bool,
    /// Rejected outright by the gateway rather than returned by a bank.
    pub hard_failure: bool,
    pub was_first: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, payment_type: PaymentType) -> Order {
        let now = Utc::now();
        Order {
            id: 7,
            collaboration_id: 3,
            user_id: None,
            period: BillingPeriod::of(now.date_naive()),
            payable_at: now.date_naive(),
            amount: 1000,
            periods_covered: 1,
            first: true,
            status,
            payment_type,
            payment_identifier: None,
            gateway_order_id: None,
            reference: "Colaboración mayo 2024".into(),
            territory: "Estatal".into(),
            payment_response: None,
            payed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(New.can_transition_to(Charging));
        assert!(New.can_transition_to(Error));
        assert!(!New.can_transition_to(Paid));
        assert!(Charging.can_transition_to(Paid));
        assert!(Charging.can_transition_to(Returned));
        assert!(Paid.can_transition_to(Returned));
        assert!(Warning.can_transition_to(Error));
        assert!(!Returned.can_transition_to(Paid));
        assert!(!Error.can_transition_to(Charging));
        assert!(!Charging.can_transition_to(Charging));
    }

    #[test]
    fn test_predicates() {
        let mut o = order(OrderStatus::New, PaymentType::IbanBank);
        assert!(o.is_chargeable());
        assert!(o.is_payable());
        assert_eq!(o.due_code(), "FRST");

        o.status = OrderStatus::Paid;
        assert!(!o.is_paid());
        o.payed_at = Some(Utc::now());
        assert!(o.is_paid());

        o.first = false;
        assert_eq!(o.due_code(), "RCUR");
    }

    #[test]
    fn test_bank_status_text() {
        let mut o = order(OrderStatus::Returned, PaymentType::IbanBank);
        assert_eq!(o.status_text(), "Order returned");
        o.payment_response = Some("AM04".into());
        assert_eq!(o.status_text(), "AM04: Insufficient funds.");
        o.payment_response = Some("XX00".into());
        assert_eq!(o.status_text(), "XX00");
    }

    #[test]
    fn test_card_status_text() {
        let mut o = order(OrderStatus::Error, PaymentType::CreditCard);
        assert_eq!(o.status_text(), "Transaction not processed");

        o.payment_response = Some(r#"{"Ds_Response":"0116"}"#.into());
        assert_eq!(o.status_text(), "0116: Insufficient funds");

        o.payment_response = Some(r#"["RSisReciboKO","SIS0321"]"#.into());
        assert!(o.status_text().starts_with("SIS0321: "));
    }
}
