use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::banking;
use crate::domain::{BillingPeriod, Order, User};

/// Who pays a collaboration: an account holder, or a guest whose contact
/// data travels with the collaboration itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Payer {
    User(Uuid),
    Guest(GuestPayer),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct GuestPayer {
    #[validate(length(min = 3, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 5, max = 20, message = "Document number is required"))]
    pub document_vatid: String,
    #[validate(email(message = "Invalid e-mail address"))]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub town_name: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub ine_town: Option<String>,
}

fn default_country() -> String {
    "ES".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Single,
    Monthly,
    Quarterly,
    Annual,
}

impl Frequency {
    /// Months between charges; 0 for a one-off donation.
    pub fn months(self) -> i32 {
        match self {
            Frequency::Single => 0,
            Frequency::Monthly => 1,
            Frequency::Quarterly => 3,
            Frequency::Annual => 12,
        }
    }

    pub fn from_months(months: i64) -> Option<Self> {
        match months {
            0 => Some(Frequency::Single),
            1 => Some(Frequency::Monthly),
            3 => Some(Frequency::Quarterly),
            12 => Some(Frequency::Annual),
            _ => None,
        }
    }

    pub fn is_recurrent(self) -> bool {
        self != Frequency::Single
    }

    /// Word printed on receipts after "Cuota"/"Colaboración".
    fn reference_word(self) -> &'static str {
        match self {
            Frequency::Single => "Puntual ",
            Frequency::Monthly => "",
            Frequency::Quarterly => "Trimestral ",
            Frequency::Annual => "Anual ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    CreditCard,
    LegacyCcc,
    IbanBank,
}

impl PaymentType {
    pub fn code(self) -> i64 {
        match self {
            PaymentType::CreditCard => 1,
            PaymentType::LegacyCcc => 2,
            PaymentType::IbanBank => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(PaymentType::CreditCard),
            2 => Some(PaymentType::LegacyCcc),
            3 => Some(PaymentType::IbanBank),
            _ => None,
        }
    }

    pub fn is_bank(self) -> bool {
        self != PaymentType::CreditCard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationStatus {
    Incomplete,
    Error,
    Unconfirmed,
    Ok,
    Warning,
}

impl CollaborationStatus {
    pub fn code(self) -> i64 {
        match self {
            CollaborationStatus::Incomplete => 0,
            CollaborationStatus::Error => 1,
            CollaborationStatus::Unconfirmed => 2,
            CollaborationStatus::Ok => 3,
            CollaborationStatus::Warning => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CollaborationStatus::Incomplete),
            1 => Some(CollaborationStatus::Error),
            2 => Some(CollaborationStatus::Unconfirmed),
            3 => Some(CollaborationStatus::Ok),
            4 => Some(CollaborationStatus::Warning),
            _ => None,
        }
    }

    /// Transition table. Writing the current status again is always allowed
    /// and treated as a no-op by the repository.
    pub fn can_transition_to(self, next: CollaborationStatus) -> bool {
        use CollaborationStatus::*;

        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Incomplete, Unconfirmed | Ok | Warning | Error)
                | (Unconfirmed, Ok | Warning | Error)
                | (Ok, Warning | Error)
                | (Warning, Ok | Error)
                | (Error, Unconfirmed | Ok | Warning)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CccAccount {
    pub entity: u16,
    pub office: u16,
    pub dc: u8,
    pub account: u64,
}

impl CccAccount {
    pub fn pretty(&self) -> String {
        banking::pretty_ccc(self.entity, self.office, self.dc, self.account)
    }

    pub fn is_valid(&self) -> bool {
        banking::validate_ccc(&self.pretty())
    }
}

/// Bank details of a debit collaboration. Only one representation is stored;
/// the other one is derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankAccount {
    Ccc(CccAccount),
    Iban { iban: String, bic: Option<String> },
}

impl BankAccount {
    pub fn iban(&self) -> Option<String> {
        match self {
            BankAccount::Ccc(ccc) => banking::iban_from_ccc(ccc.entity, ccc.office, ccc.dc, ccc.account),
            BankAccount::Iban { iban, .. } => Some(banking::normalize_iban(iban)),
        }
    }

    pub fn bic(&self) -> Option<String> {
        match self {
            BankAccount::Iban { bic: Some(bic), .. } if !bic.trim().is_empty() => Some(bic.trim().to_uppercase()),
            _ => self
                .spanish_entity()
                .and_then(banking::bic_from_entity)
                .map(str::to_string),
        }
    }

    pub fn ccc_full(&self) -> Option<String> {
        match self {
            BankAccount::Ccc(ccc) => Some(ccc.pretty()),
            BankAccount::Iban { iban, .. } => banking::ccc_from_spanish_iban(iban),
        }
    }

    pub fn is_national(&self) -> bool {
        match self {
            BankAccount::Ccc(_) => true,
            BankAccount::Iban { iban, .. } => banking::normalize_iban(iban).starts_with("ES"),
        }
    }

    fn spanish_entity(&self) -> Option<u16> {
        match self {
            BankAccount::Ccc(ccc) => Some(ccc.entity),
            BankAccount::Iban { iban, .. } => {
                let iban = banking::normalize_iban(iban);
                if !iban.starts_with("ES") {
                    return None;
                }
                iban.get(4..8)?.parse().ok()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TerritorialAssignment {
    Town,
    Island,
    Autonomy,
    #[default]
    Country,
}

impl TerritorialAssignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerritorialAssignment::Town => "town",
            TerritorialAssignment::Island => "island",
            TerritorialAssignment::Autonomy => "autonomy",
            TerritorialAssignment::Country => "country",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "town" => Some(TerritorialAssignment::Town),
            "island" => Some(TerritorialAssignment::Island),
            "autonomy" => Some(TerritorialAssignment::Autonomy),
            "country" => Some(TerritorialAssignment::Country),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collaboration {
    pub id: i64,
    pub payer: Payer,
    /// Cents charged per billing period.
    pub amount: i64,
    pub frequency: Frequency,
    pub payment_type: PaymentType,
    pub bank_account: Option<BankAccount>,
    pub status: CollaborationStatus,
    pub status_reason: Option<String>,
    pub gateway_token: Option<String>,
    pub token_expiration: Option<NaiveDate>,
    pub territorial_assignment: TerritorialAssignment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Collaboration {
    pub fn user_id(&self) -> Option<Uuid> {
        match &self.payer {
            Payer::User(id) => Some(*id),
            Payer::Guest(_) => None,
        }
    }

    pub fn guest(&self) -> Option<&GuestPayer> {
        match &self.payer {
            Payer::Guest(guest) => Some(guest),
            Payer::User(_) => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_recurrent(&self) -> bool {
        self.frequency.is_recurrent()
    }

    pub fn is_credit_card(&self) -> bool {
        self.payment_type == PaymentType::CreditCard
    }

    pub fn is_bank(&self) -> bool {
        self.payment_type.is_bank()
    }

    pub fn is_bank_national(&self) -> bool {
        self.is_bank() && self.bank_account.as_ref().map_or(false, BankAccount::is_national)
    }

    pub fn is_bank_international(&self) -> bool {
        self.is_bank() && !self.is_bank_national()
    }

    /// Still expected to pay: not deleted and either awaiting or past its
    /// first confirmed charge.
    pub fn is_payable(&self) -> bool {
        !self.is_deleted()
            && matches!(self.status, CollaborationStatus::Unconfirmed | CollaborationStatus::Ok)
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted()
            && matches!(
                self.status,
                CollaborationStatus::Unconfirmed | CollaborationStatus::Ok | CollaborationStatus::Warning
            )
    }

    pub fn has_confirmed_payment(&self) -> bool {
        matches!(self.status, CollaborationStatus::Ok | CollaborationStatus::Warning)
    }

    /// What a charge is sent against: the card token, or `IBAN/BIC`.
    pub fn payment_identifier(&self) -> Option<String> {
        if self.is_credit_card() {
            return self.gateway_token.clone();
        }

        let account = self.bank_account.as_ref()?;
        Some(format!("{}/{}", account.iban()?, account.bic().unwrap_or_default()))
    }

    /// A national account whose BIC cannot be resolved can't be debited
    /// through SEPA without manual intervention.
    pub fn lacks_spanish_bic(&self) -> bool {
        self.is_bank_national() && self.bank_account.as_ref().and_then(BankAccount::bic).is_none()
    }

    /// Day of month charges fall on. Bank debits use the configured payment
    /// day when there is one.
    pub fn charge_day(&self, payment_day: Option<u32>) -> u32 {
        match payment_day {
            Some(day) if self.is_bank() => day,
            _ => self.created_at.day(),
        }
    }

    /// Period of the first charge. A bank collaboration created on or after
    /// the payment day misses that month's batch.
    pub fn first_period(&self, payment_day: Option<u32>) -> BillingPeriod {
        let created = BillingPeriod::of(self.created_at.date_naive());
        match payment_day {
            Some(day) if self.is_bank() && self.created_at.day() >= day => created.offset(1),
            _ => created,
        }
    }

    pub fn is_due_period(&self, period: BillingPeriod, payment_day: Option<u32>) -> bool {
        let elapsed = period.months_since(self.first_period(payment_day));
        if elapsed < 0 {
            return false;
        }

        match self.frequency.months() {
            0 => elapsed == 0,
            months => elapsed % months == 0,
        }
    }

    pub fn due_date(&self, period: BillingPeriod, payment_day: Option<u32>) -> NaiveDate {
        period.day(self.charge_day(payment_day))
    }

    /// Every charge date in `[from, to]`.
    pub fn due_dates(&self, from: NaiveDate, to: NaiveDate, payment_day: Option<u32>) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        if from > to {
            return dates;
        }

        let step = self.frequency.months().max(1);
        let last = BillingPeriod::of(to);
        let mut period = self.first_period(payment_day);

        while period <= last {
            let date = self.due_date(period, payment_day);
            if date >= from && date <= to {
                dates.push(date);
            }
            if !self.is_recurrent() {
                break;
            }
            period = period.offset(step);
        }

        dates
    }

    /// Whether the period containing `date` still needs an order, given the
    /// orders already stored for this collaboration.
    pub fn must_have_order(&self, date: NaiveDate, orders: &[Order], payment_day: Option<u32>) -> bool {
        let period = BillingPeriod::of(date);
        if !self.is_due_period(period, payment_day) {
            return false;
        }

        let mut live_first = orders
            .iter()
            .filter(|o| o.first && o.deleted_at.is_none() && (o.is_payable() || o.is_paid()));

        !live_first.any(|o| o.period > period || (o.period == period && o.is_paid()))
    }

    /// Receipt concept, e.g. "Colaboración Trimestral mayo 2024".
    pub fn reference_for(&self, period: BillingPeriod, militant: bool) -> String {
        let head = if militant && self.is_recurrent() { "Cuota " } else { "Colaboración " };
        format!("{}{}{}", head, self.frequency.reference_word(), period.label())
    }

    pub fn territory_text(&self, town_name: Option<&str>) -> String {
        let town = town_name.unwrap_or_default();
        match self.territorial_assignment {
            TerritorialAssignment::Town => format!("Municipal {}", town).trim_end().to_string(),
            TerritorialAssignment::Island => format!("Isla {}", town).trim_end().to_string(),
            TerritorialAssignment::Autonomy => "Autonómico".to_string(),
            TerritorialAssignment::Country => "Estatal".to_string(),
        }
    }
}

/// A pledge as submitted by the payer, before it becomes a collaboration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pledge {
    pub payer: Payer,
    pub amount: i64,
    pub frequency: Frequency,
    pub payment_type: PaymentType,
    #[serde(default)]
    pub ccc: Option<CccAccount>,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub bic: Option<String>,
    #[serde(default)]
    pub territorial_assignment: TerritorialAssignment,
    #[serde(default)]
    pub terms_of_service: bool,
    #[serde(default)]
    pub minimal_year_old: bool,
}

pub const MINIMUM_AGE: i32 = 18;

fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

impl Pledge {
    /// The bank account this pledge will be debited from. An IBAN that does
    /// not validate carries no BIC.
    pub fn bank_account(&self) -> Option<BankAccount> {
        match self.payment_type {
            PaymentType::CreditCard => None,
            PaymentType::LegacyCcc => self.ccc.map(BankAccount::Ccc),
            PaymentType::IbanBank => self.iban.as_ref().map(|iban| {
                let valid = banking::validate_iban(iban);
                BankAccount::Iban {
                    iban: banking::normalize_iban(iban),
                    bic: if valid { self.bic.clone().filter(|b| !b.trim().is_empty()) } else { None },
                }
            }),
        }
    }

    /// Field-level checks that need nothing but the pledge and, for account
    /// holders, their user record. The one-recurring-per-payer rule needs
    /// storage and is checked by the service.
    pub fn check(&self, user: Option<&User>, today: NaiveDate) -> Result<(), ValidationErrors> {
        let mut errors = match &self.payer {
            Payer::Guest(guest) => match guest.validate() {
                Ok(()) => ValidationErrors::new(),
                Err(e) => e,
            },
            Payer::User(_) => ValidationErrors::new(),
        };

        if self.amount <= 0 {
            errors.add("amount", field_error("range", "Amount must be positive"));
        }
        if !self.terms_of_service {
            errors.add("terms_of_service", field_error("accepted", "Terms of service must be accepted"));
        }
        if !self.minimal_year_old {
            errors.add("minimal_year_old", field_error("accepted", "You must declare being of age"));
        }

        if let Payer::User(_) = self.payer {
            match user {
                Some(user) if user.deleted_at.is_none() => {
                    if user.is_passport() {
                        errors.add("user", field_error("passport", "Payers identified by passport can't collaborate"));
                    }
                    if user.age_on(today).map_or(true, |age| age < MINIMUM_AGE) {
                        errors.add("user", field_error("age", "Payer must be at least 18 years old"));
                    }
                }
                _ => errors.add("user", field_error("missing", "Payer account does not exist")),
            }
        }

        match self.payment_type {
            PaymentType::CreditCard => {}
            PaymentType::LegacyCcc => match &self.ccc {
                None => errors.add("ccc", field_error("required", "Bank account is required")),
                Some(ccc) if !ccc.is_valid() => errors.add("ccc", field_error("ccc", "Invalid bank account")),
                Some(_) => {}
            },
            PaymentType::IbanBank => match self.iban.as_deref().map(banking::normalize_iban) {
                None => errors.add("iban", field_error("required", "IBAN is required")),
                Some(iban) if iban.is_empty() => errors.add("iban", field_error("required", "IBAN is required")),
                Some(iban) if !banking::validate_iban(&iban) => {
                    errors.add("iban", field_error("iban", "Invalid IBAN"))
                }
                Some(iban) if iban.starts_with("ES") && banking::ccc_from_spanish_iban(&iban).is_none() => {
                    errors.add("iban", field_error("ccc", "Invalid bank account"))
                }
                Some(_) => {}
            },
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
