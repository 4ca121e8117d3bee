//! The pending order marker.
//!
//! Written to local storage when checkout hands control to the hosted
//! payment form, read by the payment watcher, and removed once the order
//! reaches a terminal status. At most one marker exists at a time; writing a
//! new one replaces the previous.

use serde::{Deserialize, Serialize};

use super::id::{ConversationId, OrderId};

/// Client-local record of an order awaiting payment confirmation.
///
/// Serialized as `{"orderId": "...", "conversationId": "..."}`. Both fields
/// are optional on read so a marker written by an older client (or a
/// half-written one) is still recognised and simply ignored by the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrderMarker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub conversation_id: ConversationId,
}

impl PendingOrderMarker {
    /// Marker for an order the backend just created.
    #[must_use]
    pub const fn new(order_id: OrderId, conversation_id: ConversationId) -> Self {
        Self {
            order_id: Some(order_id),
            conversation_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_wire_format() {
        let order_id: OrderId = "0b6c9c7e-3d1a-4d5e-8f60-2a1b3c4d5e6f".parse().unwrap();
        let marker = PendingOrderMarker::new(order_id, ConversationId::new("conv-1"));
        let json = serde_json::to_string(&marker).unwrap();
        assert_eq!(
            json,
            r#"{"orderId":"0b6c9c7e-3d1a-4d5e-8f60-2a1b3c4d5e6f","conversationId":"conv-1"}"#
        );
    }

    #[test]
    fn test_marker_without_order_id_still_parses() {
        let marker: PendingOrderMarker = serde_json::from_str("{}").unwrap();
        assert_eq!(marker.order_id, None);
        assert!(marker.conversation_id.is_empty());
    }
}
