//! Builds the `iyzico-payment` request body from checkout state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use venthub_core::{CartItem, UserId, round_money};

use super::form::{CheckoutForm, LegalConsents};
use crate::supabase::{
    ConsentRecord, InvoicePayload, LegalConsentsPayload, PaymentCartLine, PaymentRequest,
};

/// Assemble the payment request.
///
/// Pure: `now` stamps the consent records. Marketing consent carries no
/// timestamp unless it was given.
#[must_use]
pub fn build_payment_request(
    amount: Decimal,
    items: &[CartItem],
    form: &CheckoutForm,
    user_id: Option<UserId>,
    now: DateTime<Utc>,
) -> PaymentRequest {
    let cart_items = items
        .iter()
        .map(|item| PaymentCartLine {
            product_id: item.product_id(),
            quantity: item.quantity,
            price: round_money(item.effective_unit_price()),
            product_name: item.product.name.clone(),
            product_image_url: item.product.image_url.clone(),
        })
        .collect();

    PaymentRequest {
        amount: round_money(amount),
        cart_items,
        customer_info: form.customer.clone(),
        shipping_address: form.shipping.clone(),
        billing_address: form.billing_address().clone(),
        user_id,
        invoice_type: form.invoice_type,
        invoice_info: InvoicePayload {
            info: form.invoice_info.clone(),
            invoice_type: form.invoice_type,
        },
        legal_consents: consent_records(form.legal_consents, now),
        preferred_carrier: form
            .preferred_carrier
            .clone()
            .filter(|carrier| !carrier.trim().is_empty()),
    }
}

fn consent_records(consents: LegalConsents, now: DateTime<Utc>) -> LegalConsentsPayload {
    let stamped = |accepted: bool| ConsentRecord {
        accepted,
        ts: Some(now),
    };

    LegalConsentsPayload {
        kvkk: stamped(consents.kvkk),
        distance_sales: stamped(consents.distance_sales),
        pre_info: stamped(consents.pre_info),
        order_confirm: stamped(consents.order_confirm),
        marketing: ConsentRecord {
            accepted: consents.marketing,
            ts: consents.marketing.then_some(now),
        },
    }
}
