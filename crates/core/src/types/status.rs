//! Status enums for orders and payment results.

use serde::{Deserialize, Serialize};

/// Order status as stored in `venthub_orders.status`.
///
/// The backend moves an order `pending → paid | failed` when the payment
/// provider calls back, and admin flows later move paid orders through
/// fulfilment. The storefront only reacts to the two payment outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    /// A status this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Whether payment polling stops at this status.
    ///
    /// Only `paid` and `failed` are terminal for the payment flow; the
    /// fulfilment states are reached later through admin actions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }

    /// The payment result this status resolves to, if any.
    #[must_use]
    pub const fn payment_result(self) -> Option<PaymentResult> {
        match self {
            Self::Paid => Some(PaymentResult::Success),
            Self::Failed => Some(PaymentResult::Failure),
            _ => None,
        }
    }

    /// Wire name used by the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Confirmed => "confirmed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "paid" => Self::Paid,
            "failed" => Self::Failed,
            "confirmed" => Self::Confirmed,
            "shipped" => Self::Shipped,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            _ => Self::Unknown,
        })
    }
}

/// Outcome carried to the payment result page (`status=success|failure`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentResult {
    Success,
    Failure,
}

impl PaymentResult {
    /// Query-string value for this result.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for PaymentResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_paid_and_failed_are_terminal() {
        let all = [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Failed,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
            OrderStatus::Unknown,
        ];
        let terminal: Vec<_> = all.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![OrderStatus::Paid, OrderStatus::Failed]);
    }

    #[test]
    fn test_payment_result_mapping() {
        assert_eq!(
            OrderStatus::Paid.payment_result(),
            Some(PaymentResult::Success)
        );
        assert_eq!(
            OrderStatus::Failed.payment_result(),
            Some(PaymentResult::Failure)
        );
        assert_eq!(OrderStatus::Shipped.payment_result(), None);
    }

    #[test]
    fn test_unknown_status_deserializes() {
        let status: OrderStatus = serde_json::from_str("\"awaiting_review\"").unwrap();
        assert_eq!(status, OrderStatus::Unknown);

        let status: OrderStatus = serde_json::from_str("\"paid\"").unwrap();
        assert_eq!(status, OrderStatus::Paid);
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("PAID".parse::<OrderStatus>().unwrap(), OrderStatus::Paid);
        assert_eq!(" failed ".parse::<OrderStatus>().unwrap(), OrderStatus::Failed);
        assert_eq!("??".parse::<OrderStatus>().unwrap(), OrderStatus::Unknown);
    }
}
