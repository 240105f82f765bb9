// src/utils/id_generator.rs
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    Ride,
    Transaction,
    Payment,
}

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::Ride => "rid",
            IdType::Transaction => "txn",
            IdType::Payment => "pay",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefix())
    }
}

pub struct IdGenerator;

impl IdGenerator {
    /// Generate a unique ID with format: {prefix}-{YYMMDD}-{5 char suffix}
    pub fn generate(id_type: IdType) -> String {
        Self::generate_with_timestamp(id_type, Utc::now())
    }

    /// Generate ID with a specific timestamp (useful for testing)
    pub fn generate_with_timestamp(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        let date_part = timestamp.format("%y%m%d").to_string();
        let random_suffix = Self::generate_random_suffix();

        format!("{}-{}-{}", id_type.to_prefix(), date_part, random_suffix)
    }

    /// 3 hexchars + 2 alphanumeric, or the other way round
    fn generate_random_suffix() -> String {
        if rand::random::<bool>() {
            format!(
                "{}{}",
                Self::generate_from_chars(HEX_CHARS, 3),
                Self::generate_from_chars(ALPHANUMERIC_CHARS, 2)
            )
        } else {
            format!(
                "{}{}",
                Self::generate_from_chars(ALPHANUMERIC_CHARS, 3),
                Self::generate_from_chars(HEX_CHARS, 2)
            )
        }
    }

    fn generate_from_chars(charset: &[u8], n: usize) -> String {
        let mut rng = rand::rng();
        (0..n)
            .map(|_| charset[rng.random_range(0..charset.len())] as char)
            .collect()
    }

    /// Numeric one-time code handed to the rider and checked at ride start.
    pub fn generate_otp() -> String {
        format!("{:04}", rand::rng().random_range(0..10_000u32))
    }
}

const HEX_CHARS: &[u8] = b"0123456789abcdef";
const ALPHANUMERIC_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn generate_ride_id() -> String {
    IdGenerator::generate(IdType::Ride)
}

pub fn generate_transaction_id() -> String {
    IdGenerator::generate(IdType::Transaction)
}
