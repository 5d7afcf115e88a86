//! Purchase orders and the requests that create them.

use crate::error::mentions_insufficient_funds;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Order lifecycle phase.
///
/// Advances quote → payment → delivery → completed; `Failed` is reachable
/// from any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderPhase {
    Quote,
    Payment,
    Delivery,
    Completed,
    Failed,
    /// Phase missing from the response or not recognised.
    #[serde(other)]
    Unknown,
}

impl OrderPhase {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "quote" => Self::Quote,
            "payment" => Self::Payment,
            "delivery" => Self::Delivery,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(&self) -> Option<u8> {
        match self {
            Self::Quote => Some(0),
            Self::Payment => Some(1),
            Self::Delivery => Some(2),
            Self::Completed => Some(3),
            Self::Failed | Self::Unknown => None,
        }
    }

    /// Whether moving from `self` to `next` respects the monotonic order.
    /// Re-reading the same phase is allowed.
    pub fn can_advance_to(&self, next: OrderPhase) -> bool {
        if *self == next {
            return true;
        }
        match (self.rank(), next.rank()) {
            _ if next == Self::Failed => !self.is_terminal(),
            (Some(current), Some(next)) => next >= current,
            // Nothing is known about where an unrecognised phase sits.
            _ if next == Self::Unknown || *self == Self::Unknown => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Payment => "payment",
            Self::Delivery => "delivery",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OrderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the service could not prepare payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailure {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl PaymentFailure {
    pub fn is_insufficient_funds(&self) -> bool {
        self.code.as_deref().is_some_and(mentions_insufficient_funds)
            || self.message.as_deref().is_some_and(mentions_insufficient_funds)
    }

    pub fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "unspecified".to_string(),
        }
    }
}

/// One product line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_locator: Option<String>,
    pub title: Option<String>,
    pub quantity: u32,
    pub delivery_status: Option<String>,
}

/// An order as last reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub phase: OrderPhase,
    pub payment_status: Option<String>,
    pub delivery_status: Option<String>,
    pub line_items: Vec<LineItem>,
    pub payment_failure: Option<PaymentFailure>,
    /// Signable payment transaction prepared by the service, if any.
    pub serialized_transaction: Option<String>,
}

impl Order {
    /// Normalize a create-order or get-order response.
    ///
    /// Creation responses wrap the order as `{ "order": { ... } }`; reads
    /// return it bare. Both are accepted.
    #[allow(clippy::result_large_err)]
    pub fn from_value(value: &Value) -> Result<Self> {
        let order = value.get("order").filter(|o| o.is_object()).unwrap_or(value);

        let order_id = order
            .get("orderId")
            .or_else(|| order.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::protocol("order response has no orderId"))?
            .to_string();

        let phase = order
            .get("phase")
            .and_then(Value::as_str)
            .map(OrderPhase::from_wire)
            .unwrap_or(OrderPhase::Unknown);

        let payment_failure = order.pointer("/payment/failureReason").and_then(|reason| {
            if let Some(text) = reason.as_str() {
                return Some(PaymentFailure {
                    code: None,
                    message: Some(text.to_string()),
                });
            }
            let code = reason.get("code").and_then(Value::as_str).map(str::to_string);
            let message = reason
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            (code.is_some() || message.is_some()).then_some(PaymentFailure { code, message })
        });

        let line_items: Vec<LineItem> = order
            .get("lineItems")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(line_item).collect())
            .unwrap_or_default();

        let delivery_status = order
            .pointer("/delivery/status")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| line_items.iter().find_map(|i| i.delivery_status.clone()));

        Ok(Self {
            order_id,
            phase,
            payment_status: order
                .pointer("/payment/status")
                .and_then(Value::as_str)
                .map(str::to_string),
            delivery_status,
            line_items,
            payment_failure,
            serialized_transaction: order
                .pointer("/payment/preparation/serializedTransaction")
                .and_then(Value::as_str)
                .filter(|tx| !tx.is_empty())
                .map(str::to_string),
        })
    }

    /// The order could not be paid because the payer lacks funds.
    pub fn is_insufficient_funds(&self) -> bool {
        self.payment_failure
            .as_ref()
            .is_some_and(PaymentFailure::is_insufficient_funds)
            || self
                .payment_status
                .as_deref()
                .is_some_and(mentions_insufficient_funds)
    }

    /// Reject a later read of this order whose phase moved backwards.
    #[allow(clippy::result_large_err)]
    pub fn check_successor(&self, next: &Order) -> Result<()> {
        if next.order_id != self.order_id {
            return Err(Error::protocol(format!(
                "expected order {}, service returned {}",
                self.order_id, next.order_id
            )));
        }
        if !self.phase.can_advance_to(next.phase) {
            return Err(Error::protocol(format!(
                "order {} moved from phase {} back to {}",
                self.order_id, self.phase, next.phase
            )));
        }
        Ok(())
    }
}

fn line_item(value: &Value) -> LineItem {
    LineItem {
        product_locator: value
            .get("productLocator")
            .and_then(Value::as_str)
            .map(str::to_string),
        title: value
            .pointer("/metadata/name")
            .or_else(|| value.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string),
        quantity: value
            .get("quantity")
            .and_then(Value::as_u64)
            .and_then(|q| u32::try_from(q).ok())
            .unwrap_or(1),
        delivery_status: value
            .pointer("/delivery/status")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Shipping destination for physical goods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalAddress {
    pub name: String,
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

impl PhysicalAddress {
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("recipient.physicalAddress.name", &self.name),
            ("recipient.physicalAddress.line1", &self.line1),
            ("recipient.physicalAddress.city", &self.city),
            ("recipient.physicalAddress.postalCode", &self.postal_code),
            ("recipient.physicalAddress.country", &self.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::validation(field, "is required"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_address: Option<PhysicalAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    pub product_locator: String,
}

/// What an agent asks to buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub recipient: Recipient,
    pub line_items: Vec<LineItemRequest>,
    /// Payment chain, e.g. `solana`.
    pub payment_method: String,
    /// Payment token, e.g. `usdc`.
    pub currency: String,
}

impl OrderRequest {
    pub const DEFAULT_PAYMENT_METHOD: &'static str = "solana";
    pub const DEFAULT_CURRENCY: &'static str = "usdc";

    /// Single-product order paid in the default currency.
    pub fn single(product_locator: impl Into<String>, recipient: Recipient) -> Self {
        Self {
            recipient,
            line_items: vec![LineItemRequest {
                product_locator: product_locator.into(),
            }],
            payment_method: Self::DEFAULT_PAYMENT_METHOD.to_string(),
            currency: Self::DEFAULT_CURRENCY.to_string(),
        }
    }

    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.line_items.is_empty() {
            return Err(Error::validation("lineItems", "must contain at least one item"));
        }
        if self
            .line_items
            .iter()
            .any(|item| item.product_locator.trim().is_empty())
        {
            return Err(Error::validation("lineItems.productLocator", "is required"));
        }
        let has_email = self
            .recipient
            .email
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        match &self.recipient.physical_address {
            Some(address) => address.validate()?,
            None if !has_email => {
                return Err(Error::validation(
                    "recipient",
                    "needs an email or a physical address",
                ))
            }
            None => {}
        }
        if self.payment_method.trim().is_empty() {
            return Err(Error::validation("payment.method", "is required"));
        }
        if self.currency.trim().is_empty() {
            return Err(Error::validation("payment.currency", "is required"));
        }
        Ok(())
    }

    /// Wire body for create-order, paid from `payer_address`.
    pub fn to_body(&self, payer_address: &str) -> Value {
        serde_json::json!({
            "recipient": self.recipient,
            "payment": {
                "method": self.payment_method,
                "currency": self.currency,
                "payerAddress": payer_address,
            },
            "lineItems": self.line_items,
        })
    }
}
