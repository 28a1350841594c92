use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account holder as seen by billing: contact data for receipts and
/// notifications plus what pledge eligibility depends on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub document_vatid: String,
    pub document_type: DocumentType,
    pub born_at: Option<NaiveDate>,
    pub address: String,
    pub town_name: String,
    pub postal_code: String,
    pub country: String,
    pub militant: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Dni,
    Nie,
    Passport,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Dni => "dni",
            DocumentType::Nie => "nie",
            DocumentType::Passport => "passport",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "dni" => Some(DocumentType::Dni),
            "nie" => Some(DocumentType::Nie),
            "passport" => Some(DocumentType::Passport),
            _ => None,
        }
    }
}

impl User {
    pub fn is_passport(&self) -> bool {
        self.document_type == DocumentType::Passport
    }

    /// Whole years lived on `on`, if the birth date is known.
    pub fn age_on(&self, on: NaiveDate) -> Option<i32> {
        let born = self.born_at?;
        let mut age = on.year() - born.year();
        if (on.month(), on.day()) < (born.month(), born.day()) {
            age -= 1;
        }
        Some(age)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub full_name: String,
    pub email: String,
    pub document_vatid: String,
    pub document_type: DocumentType,
    pub born_at: Option<NaiveDate>,
    #[serde(default)]
    pub town_name: String,
    pub militant: bool,
}
