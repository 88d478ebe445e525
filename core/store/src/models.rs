//! Typed read-only views over the stored entities.
//!
//! Each entity is a fixed struct populated field-by-field from the generic
//! record at the store boundary, with its table name fixed at compile time.
//! Everything here is read-only; only the sync engine writes.

use serde_json::Value as Json;

use lenda_common::Result;

use crate::records::{Record, Store};

fn field_i64(record: &Record, key: &str) -> Option<i64> {
    record.get(key).and_then(Json::as_i64)
}

fn field_f64(record: &Record, key: &str) -> Option<f64> {
    record.get(key).and_then(Json::as_f64)
}

fn field_text(record: &Record, key: &str) -> Option<String> {
    record.get(key).and_then(Json::as_str).map(str::to_owned)
}

// Booleans come back from the store as 0/1 integers.
fn field_bool(record: &Record, key: &str) -> Option<bool> {
    field_i64(record, key).map(|v| v != 0)
}

macro_rules! entity_accessors {
    ($type:ident, $table:literal) => {
        impl $type {
            /// Table backing this entity.
            pub const TABLE: &'static str = $table;

            /// Fetch one entity by its remote identifier.
            pub fn get(store: &Store, id: i64) -> Result<Option<Self>> {
                Ok(store.get_one(Self::TABLE, id)?.map(|r| Self::from_record(&r)))
            }

            /// Fetch all stored entities, or only the given ids.
            pub fn list(store: &Store, ids: Option<&[i64]>) -> Result<Vec<Self>> {
                Ok(store
                    .get_all(Self::TABLE, ids)?
                    .iter()
                    .map(Self::from_record)
                    .collect())
            }
        }
    };
}

/// Point-in-time wallet snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    pub id: Option<i64>,
    pub balance: Option<f64>,
    pub available_balance: Option<f64>,
    pub blocked_balance: Option<f64>,
    pub credit_sum: Option<f64>,
}

impl Wallet {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: field_i64(record, "id"),
            balance: field_f64(record, "balance"),
            available_balance: field_f64(record, "availableBalance"),
            blocked_balance: field_f64(record, "blockedBalance"),
            credit_sum: field_f64(record, "creditSum"),
        }
    }
}
entity_accessors!(Wallet, "a_wallet");

/// Pending reservation against the wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockedAmount {
    pub id: Option<i64>,
    pub loan_id: Option<i64>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub date_start: Option<String>,
}

impl BlockedAmount {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: field_i64(record, "id"),
            loan_id: field_i64(record, "loanId"),
            amount: field_f64(record, "amount"),
            category: field_text(record, "category"),
            date_start: field_text(record, "dateStart"),
        }
    }
}
entity_accessors!(BlockedAmount, "a_blocked_amounts");

/// Marketplace loan listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Loan {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub interest_rate: Option<f64>,
    pub rating: Option<String>,
    pub term_in_months: Option<i64>,
    pub date_published: Option<String>,
    pub deadline: Option<String>,
    pub remaining_investment: Option<f64>,
    pub investments_count: Option<i64>,
    pub topped: Option<bool>,
    pub covered: Option<bool>,
}

impl Loan {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: field_i64(record, "id"),
            name: field_text(record, "name"),
            amount: field_f64(record, "amount"),
            interest_rate: field_f64(record, "interestRate"),
            rating: field_text(record, "rating"),
            term_in_months: field_i64(record, "termInMonths"),
            date_published: field_text(record, "datePublished"),
            deadline: field_text(record, "deadline"),
            remaining_investment: field_f64(record, "remainingInvestment"),
            investments_count: field_i64(record, "investmentsCount"),
            topped: field_bool(record, "topped"),
            covered: field_bool(record, "covered"),
        }
    }
}
entity_accessors!(Loan, "a_loans");

/// Any investor's stake in a specific loan.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanInvestment {
    pub id: Option<i64>,
    pub loan_id: Option<i64>,
    pub amount: Option<f64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub time_created: Option<String>,
}

impl LoanInvestment {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: field_i64(record, "id"),
            loan_id: field_i64(record, "loanId"),
            amount: field_f64(record, "amount"),
            first_name: field_text(record, "firstName"),
            last_name: field_text(record, "lastName"),
            time_created: field_text(record, "timeCreated"),
        }
    }
}
entity_accessors!(LoanInvestment, "a_loan_investments");

/// The authenticated user's own investment position.
#[derive(Debug, Clone, PartialEq)]
pub struct UserInvestment {
    pub id: Option<i64>,
    pub loan_id: Option<i64>,
    pub loan_name: Option<String>,
    pub amount: Option<f64>,
    pub interest_rate: Option<f64>,
    pub rating: Option<String>,
    pub paid: Option<f64>,
    pub remaining_principal: Option<f64>,
    pub remaining_months: Option<i64>,
    pub next_payment_date: Option<String>,
    pub status: Option<String>,
    pub time_created: Option<String>,
}

impl UserInvestment {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: field_i64(record, "id"),
            loan_id: field_i64(record, "loanId"),
            loan_name: field_text(record, "loanName"),
            amount: field_f64(record, "amount"),
            interest_rate: field_f64(record, "interestRate"),
            rating: field_text(record, "rating"),
            paid: field_f64(record, "paid"),
            remaining_principal: field_f64(record, "remainingPrincipal"),
            remaining_months: field_i64(record, "remainingMonths"),
            next_payment_date: field_text(record, "nextPaymentDate"),
            status: field_text(record, "status"),
            time_created: field_text(record, "timeCreated"),
        }
    }
}
entity_accessors!(UserInvestment, "a_user_investments");

/// Wallet ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Option<i64>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub orientation: Option<String>,
    pub transaction_date: Option<String>,
    pub loan_id: Option<i64>,
    pub loan_name: Option<String>,
    pub nick_name: Option<String>,
}

impl Transaction {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: field_i64(record, "id"),
            amount: field_f64(record, "amount"),
            category: field_text(record, "category"),
            orientation: field_text(record, "orientation"),
            transaction_date: field_text(record, "transactionDate"),
            loan_id: field_i64(record, "loanId"),
            loan_name: field_text(record, "loanName"),
            nick_name: field_text(record, "nickName"),
        }
    }
}
entity_accessors!(Transaction, "a_transactions");

/// Event raised by the remote system; `link` is the opaque payload the
/// relation resolver classifies.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Option<i64>,
    pub date: Option<String>,
    pub text: Option<String>,
    pub visited: Option<bool>,
    pub link: Option<String>,
}

impl Notification {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: field_i64(record, "id"),
            date: field_text(record, "date"),
            text: field_text(record, "text"),
            visited: field_bool(record, "visited"),
            link: field_text(record, "link"),
        }
    }
}
entity_accessors!(Notification, "a_notifications");
