// src/models/wallet.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::id_generator::generate_transaction_id;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    CancellationFee,          // Debit on the cancelling party
    CancellationCompensation, // Credit to the counterparty
    Commission,               // Platform share of a completed fare
    RideEarning,              // Driver share of an online fare
}

/// One side of a wallet movement. Positive amounts credit the wallet,
/// negative amounts debit it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub ride_id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(user_id: &str, ride_id: &str, kind: TransactionKind, amount: i64, at: DateTime<Utc>) -> Self {
        Self {
            id: generate_transaction_id(),
            user_id: user_id.to_string(),
            ride_id: ride_id.to_string(),
            kind,
            amount,
            created_at: at,
        }
    }
}

/// Moves `amount` from `payer` to `payee`, one record per side.
pub fn transfer(
    payer: &str,
    payee: &str,
    ride_id: &str,
    debit_kind: TransactionKind,
    credit_kind: TransactionKind,
    amount: i64,
    at: DateTime<Utc>,
) -> Vec<LedgerEntry> {
    vec![
        LedgerEntry::new(payer, ride_id, debit_kind, -amount, at),
        LedgerEntry::new(payee, ride_id, credit_kind, amount, at),
    ]
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub user_id: String,
    pub balance: i64,
}
