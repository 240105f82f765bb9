// src/services/payment_service.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    utils::id_generator::{IdGenerator, IdType},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentOrder {
    pub order_id: String,
    pub ride_id: String,
    pub receipt: String,
    pub amount: i64,
    pub currency: String,
}

/// External payment provider. The service opens orders; a confirmation that
/// comes back through `/payments/confirm` is only trusted once the provider
/// reports the named payment as captured against the order.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, ride_id: &str, amount: i64) -> SparrowResult<PaymentOrder>;

    /// Ok when `payment_id` is a captured payment of `amount` on `order_id`.
    async fn verify_payment(&self, order_id: &str, payment_id: &str, amount: i64) -> SparrowResult<()>;
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    order_id: String,
    status: String,
    amount: i64,
}

const CAPTURED: &str = "captured";

pub struct HttpPaymentGateway {
    base_url: String,
    currency: String,
    client: reqwest::Client,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            currency: "INR".to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(&self, ride_id: &str, amount: i64) -> SparrowResult<PaymentOrder> {
        if amount <= 0 {
            return Err(AppError::bad_request(format!("cannot open an order for {}", amount)));
        }
        let receipt = IdGenerator::generate(IdType::Payment);
        let request_id = Uuid::new_v4();

        let response = self
            .client
            .post(self.url("orders"))
            .header("X-Request-Id", request_id.to_string())
            .json(&json!({
                "amount": amount,
                "currency": self.currency,
                "receipt": receipt,
                "notes": { "ride_id": ride_id },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Payment order for ride {} rejected (request {}): {}", ride_id, request_id, error_text);
            return Err(AppError::upstream(error_text));
        }

        let order: OrderResponse = response.json().await?;
        tracing::info!("Opened payment order {} for ride {} ({})", order.id, ride_id, amount);

        Ok(PaymentOrder {
            order_id: order.id,
            ride_id: ride_id.to_string(),
            receipt,
            amount,
            currency: self.currency.clone(),
        })
    }

    async fn verify_payment(&self, order_id: &str, payment_id: &str, amount: i64) -> SparrowResult<()> {
        let response = self.client.get(self.url(&format!("payments/{}", payment_id))).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::PaymentUnverified(format!("unknown payment {}", payment_id)));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Payment lookup {} failed: {}", payment_id, error_text);
            return Err(AppError::upstream(error_text));
        }

        let payment: PaymentResponse = response.json().await?;
        if payment.order_id != order_id || payment.status != CAPTURED || payment.amount != amount {
            tracing::warn!(
                "Payment {} does not settle order {} ({} {} of {})",
                payment_id, order_id, payment.status, payment.amount, amount
            );
            return Err(AppError::PaymentUnverified(format!(
                "payment {} does not settle order {}",
                payment_id, order_id
            )));
        }
        Ok(())
    }
}

/// Issues local order ids without talking to any provider. Payments exist
/// only once `capture` records them.
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    orders: Mutex<Vec<PaymentOrder>>,
    captured: Mutex<HashMap<String, (String, i64)>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<PaymentOrder> {
        self.orders.lock().map(|orders| orders.clone()).unwrap_or_default()
    }

    /// Stands in for the rider paying the order in full; returns the payment id.
    pub fn capture(&self, order_id: &str) -> Option<String> {
        let amount = self.orders().into_iter().find(|o| o.order_id == order_id)?.amount;
        let payment_id = format!("pay_{}", nanoid::nanoid!(14));
        tracing::info!("[MOCK] Would capture payment {} for order {}", payment_id, order_id);
        self.captured
            .lock()
            .ok()?
            .insert(payment_id.clone(), (order_id.to_string(), amount));
        Some(payment_id)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(&self, ride_id: &str, amount: i64) -> SparrowResult<PaymentOrder> {
        let order = PaymentOrder {
            order_id: format!("order_{}", nanoid::nanoid!(14)),
            ride_id: ride_id.to_string(),
            receipt: IdGenerator::generate(IdType::Payment),
            amount,
            currency: "INR".to_string(),
        };
        tracing::info!("[MOCK] Would open payment order {} for ride {} ({})", order.order_id, ride_id, amount);
        if let Ok(mut orders) = self.orders.lock() {
            orders.push(order.clone());
        }
        Ok(order)
    }

    async fn verify_payment(&self, order_id: &str, payment_id: &str, amount: i64) -> SparrowResult<()> {
        let captured = self
            .captured
            .lock()
            .ok()
            .and_then(|payments| payments.get(payment_id).cloned());
        match captured {
            Some((order, paid)) if order == order_id && paid == amount => Ok(()),
            _ => Err(AppError::PaymentUnverified(format!(
                "payment {} does not settle order {}",
                payment_id, order_id
            ))),
        }
    }
}
