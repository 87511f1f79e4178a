//! # Ledger Postings
//!
//! Double-entry rules for billing events. Every event becomes exactly one
//! debit and one credit of the same positive amount, sharing a timestamp,
//! a reference and an event id.
//!
//! ## Posting Table
//! ```text
//! ┌──────────────────────┬───────────────────────────┬───────────────────────────┐
//! │ Event                │ Debit                     │ Credit                    │
//! ├──────────────────────┼───────────────────────────┼───────────────────────────┤
//! │ Invoice issued       │ ACCOUNTS_RECEIVABLE total │ REVENUE total             │
//! │ Payment (method M)   │ account(M) amount         │ ACCOUNTS_RECEIVABLE amount│
//! │ Refund (method M)    │ ACCOUNTS_RECEIVABLE |amt| │ account(M) |amt|          │
//! └──────────────────────┴───────────────────────────┴───────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{EntrySide, LedgerEntry};

/// Fixed ledger account names.
pub mod accounts {
    pub const CASH: &str = "CASH";
    pub const CARD_PAYMENTS: &str = "CARD_PAYMENTS";
    pub const ONLINE_PAYMENTS: &str = "ONLINE_PAYMENTS";
    pub const ACCOUNTS_RECEIVABLE: &str = "ACCOUNTS_RECEIVABLE";
    pub const REVENUE: &str = "REVENUE";
    pub const INVENTORY: &str = "INVENTORY";
    /// Sentinel for a payment whose method has no strategy.
    pub const UNKNOWN_PAYMENT: &str = "UNKNOWN_PAYMENT";
}

/// Actor recorded on entries written without a user (invoice issuance).
pub const SYSTEM_ACTOR: &str = "system";

// =============================================================================
// Billing Events
// =============================================================================

/// A billing event that produces ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BillingEvent {
    InvoiceIssued {
        invoice_number: String,
        booking_id: Option<String>,
        total: Money,
    },
    PaymentCaptured {
        invoice_number: String,
        /// Ledger account of the payment method.
        account: String,
        reference: Option<String>,
        amount: Money,
    },
    RefundIssued {
        invoice_number: String,
        account: String,
        reference: Option<String>,
        /// Refunded amount; sign is ignored.
        amount: Money,
    },
}

/// One side of a posting, before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingLeg {
    pub account: String,
    pub side: EntrySide,
    pub amount: Money,
    pub description: String,
}

/// The balanced pair for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub reference: Option<String>,
    pub debit: PostingLeg,
    pub credit: PostingLeg,
}

impl BillingEvent {
    /// Applies the posting table.
    pub fn posting(&self) -> Posting {
        match self {
            BillingEvent::InvoiceIssued {
                invoice_number,
                booking_id,
                total,
            } => {
                let source = booking_id.as_deref().unwrap_or("-");
                Posting {
                    reference: Some(invoice_number.clone()),
                    debit: PostingLeg {
                        account: accounts::ACCOUNTS_RECEIVABLE.to_string(),
                        side: EntrySide::Debit,
                        amount: *total,
                        description: format!("Invoice created for booking {}", source),
                    },
                    credit: PostingLeg {
                        account: accounts::REVENUE.to_string(),
                        side: EntrySide::Credit,
                        amount: *total,
                        description: format!("Revenue from invoice {}", invoice_number),
                    },
                }
            }
            BillingEvent::PaymentCaptured {
                invoice_number,
                account,
                reference,
                amount,
            } => {
                let description = format!("Payment received for invoice {}", invoice_number);
                Posting {
                    reference: reference.clone(),
                    debit: PostingLeg {
                        account: account.clone(),
                        side: EntrySide::Debit,
                        amount: *amount,
                        description: description.clone(),
                    },
                    credit: PostingLeg {
                        account: accounts::ACCOUNTS_RECEIVABLE.to_string(),
                        side: EntrySide::Credit,
                        amount: *amount,
                        description,
                    },
                }
            }
            BillingEvent::RefundIssued {
                invoice_number,
                account,
                reference,
                amount,
            } => {
                let description = format!("Refund issued for invoice {}", invoice_number);
                Posting {
                    reference: reference.clone(),
                    debit: PostingLeg {
                        account: accounts::ACCOUNTS_RECEIVABLE.to_string(),
                        side: EntrySide::Debit,
                        amount: amount.abs(),
                        description: description.clone(),
                    },
                    credit: PostingLeg {
                        account: account.clone(),
                        side: EntrySide::Credit,
                        amount: amount.abs(),
                        description,
                    },
                }
            }
        }
    }
}

impl Posting {
    /// Materialises both legs as ledger rows sharing `event_id` and `at`.
    pub fn into_entries(
        self,
        event_id: &str,
        at: DateTime<Utc>,
        actor: Option<&str>,
        mut new_id: impl FnMut() -> String,
    ) -> [LedgerEntry; 2] {
        let reference = self.reference;
        let created_by = actor.map(str::to_string);
        let mut entry = |leg: PostingLeg| LedgerEntry {
            id: new_id(),
            event_id: event_id.to_string(),
            transaction_at: at,
            account: leg.account,
            side: leg.side,
            amount_cents: leg.amount.cents(),
            reference: reference.clone(),
            description: Some(leg.description),
            created_by: created_by.clone(),
            created_at: at,
        };
        let debit = entry(self.debit);
        let credit = entry(self.credit);
        [debit, credit]
    }
}

// =============================================================================
// Balance Helpers
// =============================================================================

// =============================================================================
// Unit Tests
// =============================================================================
