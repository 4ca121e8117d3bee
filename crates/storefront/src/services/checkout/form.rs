//! Checkout form state.

use serde::{Deserialize, Serialize};

/// Contact details from step 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A shipping or billing address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub full_address: String,
    pub city: String,
    pub district: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceType {
    #[default]
    Individual,
    Corporate,
}

/// Invoice details. Individuals fill `tckn`; companies fill the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tckn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vkn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_office: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_invoice: Option<bool>,
}

/// Legal texts the shopper ticked. The first four are mandatory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalConsents {
    pub kvkk: bool,
    pub distance_sales: bool,
    pub pre_info: bool,
    pub order_confirm: bool,
    #[serde(default)]
    pub marketing: bool,
}

/// Everything the shopper enters across the checkout steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutForm {
    pub customer: CustomerInfo,
    pub shipping: Address,
    pub billing: Address,
    pub same_as_shipping: bool,
    pub invoice_type: InvoiceType,
    pub invoice_info: InvoiceInfo,
    pub legal_consents: LegalConsents,
    pub preferred_carrier: Option<String>,
}

impl Default for CheckoutForm {
    fn default() -> Self {
        Self {
            customer: CustomerInfo::default(),
            shipping: Address::default(),
            billing: Address::default(),
            same_as_shipping: true,
            invoice_type: InvoiceType::default(),
            invoice_info: InvoiceInfo::default(),
            legal_consents: LegalConsents::default(),
            preferred_carrier: None,
        }
    }
}

impl CheckoutForm {
    /// The address to bill, honouring "same as shipping".
    #[must_use]
    pub const fn billing_address(&self) -> &Address {
        if self.same_as_shipping {
            &self.shipping
        } else {
            &self.billing
        }
    }
}
