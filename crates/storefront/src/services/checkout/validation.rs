//! Client-side checks run before leaving a checkout step.
//!
//! Rejections never reach the network; the caller shows the error and keeps
//! the shopper on the current step.

use thiserror::Error;

use super::form::{Address, CheckoutForm, CustomerInfo, InvoiceInfo, InvoiceType, LegalConsents};

/// Why a checkout step cannot be left yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name is required")]
    NameRequired,
    #[error("a valid email address is required")]
    EmailInvalid,
    #[error("phone number is required")]
    PhoneRequired,
    #[error("address is required")]
    AddressRequired,
    #[error("city is required")]
    CityRequired,
    #[error("district is required")]
    DistrictRequired,
    #[error("postal code is required")]
    PostalCodeRequired,
    #[error("TCKN is required")]
    TcknRequired,
    #[error("TCKN must be 11 digits")]
    TcknFormat,
    #[error("company name is required")]
    CompanyRequired,
    #[error("VKN is required")]
    VknRequired,
    #[error("VKN must be 10 digits")]
    VknFormat,
    #[error("tax office is required")]
    TaxOfficeRequired,
    #[error("KVKK consent is required")]
    KvkkRequired,
    #[error("distance sales agreement must be accepted")]
    DistanceSalesRequired,
    #[error("pre-information form must be accepted")]
    PreInfoRequired,
    #[error("order confirmation must be accepted")]
    OrderConfirmRequired,
    #[error("cart is empty")]
    EmptyCart,
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn trimmed(value: Option<&str>) -> &str {
    value.map_or("", str::trim)
}

fn digits_of_len(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

/// Step 1: contact details.
pub fn validate_customer(customer: &CustomerInfo) -> Result<(), ValidationError> {
    if blank(&customer.name) {
        return Err(ValidationError::NameRequired);
    }
    if blank(&customer.email) || !customer.email.contains('@') {
        return Err(ValidationError::EmailInvalid);
    }
    if blank(&customer.phone) {
        return Err(ValidationError::PhoneRequired);
    }
    Ok(())
}

pub fn validate_address(address: &Address) -> Result<(), ValidationError> {
    if blank(&address.full_address) {
        return Err(ValidationError::AddressRequired);
    }
    if blank(&address.city) {
        return Err(ValidationError::CityRequired);
    }
    if blank(&address.district) {
        return Err(ValidationError::DistrictRequired);
    }
    if blank(&address.postal_code) {
        return Err(ValidationError::PostalCodeRequired);
    }
    Ok(())
}

pub fn validate_invoice(
    invoice_type: InvoiceType,
    info: &InvoiceInfo,
) -> Result<(), ValidationError> {
    match invoice_type {
        InvoiceType::Individual => {
            let tckn = trimmed(info.tckn.as_deref());
            if tckn.is_empty() {
                return Err(ValidationError::TcknRequired);
            }
            if !digits_of_len(tckn, 11) {
                return Err(ValidationError::TcknFormat);
            }
        }
        InvoiceType::Corporate => {
            if trimmed(info.company_name.as_deref()).is_empty() {
                return Err(ValidationError::CompanyRequired);
            }
            let vkn = trimmed(info.vkn.as_deref());
            if vkn.is_empty() {
                return Err(ValidationError::VknRequired);
            }
            if !digits_of_len(vkn, 10) {
                return Err(ValidationError::VknFormat);
            }
            if trimmed(info.tax_office.as_deref()).is_empty() {
                return Err(ValidationError::TaxOfficeRequired);
            }
        }
    }
    Ok(())
}

pub const fn validate_consents(consents: &LegalConsents) -> Result<(), ValidationError> {
    if !consents.kvkk {
        return Err(ValidationError::KvkkRequired);
    }
    if !consents.distance_sales {
        return Err(ValidationError::DistanceSalesRequired);
    }
    if !consents.pre_info {
        return Err(ValidationError::PreInfoRequired);
    }
    if !consents.order_confirm {
        return Err(ValidationError::OrderConfirmRequired);
    }
    Ok(())
}

/// Step 2: addresses, invoice details and legal consents.
pub fn validate_delivery(form: &CheckoutForm) -> Result<(), ValidationError> {
    validate_address(&form.shipping)?;
    if !form.same_as_shipping {
        validate_address(&form.billing)?;
    }
    validate_invoice(form.invoice_type, &form.invoice_info)?;
    validate_consents(&form.legal_consents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            full_address: "Atatürk Cad. No:1".to_string(),
            city: "İstanbul".to_string(),
            district: "Kadıköy".to_string(),
            postal_code: "34710".to_string(),
        }
    }

    fn valid_form() -> CheckoutForm {
        CheckoutForm {
            customer: CustomerInfo {
                name: "Ayşe Yılmaz".to_string(),
                email: "ayse@example.com".to_string(),
                phone: "05551112233".to_string(),
            },
            shipping: address(),
            invoice_info: InvoiceInfo {
                tckn: Some("12345678901".to_string()),
                ..InvoiceInfo::default()
            },
            legal_consents: LegalConsents {
                kvkk: true,
                distance_sales: true,
                pre_info: true,
                order_confirm: true,
                marketing: false,
            },
            ..CheckoutForm::default()
        }
    }

    #[test]
    fn test_valid_form_passes() {
        let form = valid_form();
        assert_eq!(validate_customer(&form.customer), Ok(()));
        assert_eq!(validate_delivery(&form), Ok(()));
    }

    #[test]
    fn test_customer_checks_in_order() {
        let mut customer = valid_form().customer;
        customer.email = "ayse.example.com".to_string();
        assert_eq!(validate_customer(&customer), Err(ValidationError::EmailInvalid));

        customer.name = "  ".to_string();
        assert_eq!(validate_customer(&customer), Err(ValidationError::NameRequired));

        let mut customer = valid_form().customer;
        customer.phone = String::new();
        assert_eq!(validate_customer(&customer), Err(ValidationError::PhoneRequired));
    }

    #[test]
    fn test_billing_checked_only_when_separate() {
        let mut form = valid_form();
        form.billing = Address::default();
        assert_eq!(validate_delivery(&form), Ok(()));

        form.same_as_shipping = false;
        assert_eq!(validate_delivery(&form), Err(ValidationError::AddressRequired));
    }

    #[test]
    fn test_tckn_rules() {
        let mut info = InvoiceInfo::default();
        assert_eq!(
            validate_invoice(InvoiceType::Individual, &info),
            Err(ValidationError::TcknRequired)
        );
        info.tckn = Some("1234567890".to_string());
        assert_eq!(
            validate_invoice(InvoiceType::Individual, &info),
            Err(ValidationError::TcknFormat)
        );
        info.tckn = Some("1234567890a".to_string());
        assert_eq!(
            validate_invoice(InvoiceType::Individual, &info),
            Err(ValidationError::TcknFormat)
        );
        info.tckn = Some(" 12345678901 ".to_string());
        assert_eq!(validate_invoice(InvoiceType::Individual, &info), Ok(()));
    }

    #[test]
    fn test_corporate_rules() {
        let mut info = InvoiceInfo {
            company_name: Some("VentHub Ltd".to_string()),
            vkn: Some("123456789".to_string()),
            ..InvoiceInfo::default()
        };
        assert_eq!(
            validate_invoice(InvoiceType::Corporate, &info),
            Err(ValidationError::VknFormat)
        );
        info.vkn = Some("1234567890".to_string());
        assert_eq!(
            validate_invoice(InvoiceType::Corporate, &info),
            Err(ValidationError::TaxOfficeRequired)
        );
        info.tax_office = Some("Kadıköy".to_string());
        assert_eq!(validate_invoice(InvoiceType::Corporate, &info), Ok(()));
    }

    #[test]
    fn test_each_mandatory_consent_is_required() {
        let all = valid_form().legal_consents;
        assert_eq!(validate_consents(&all), Ok(()));

        let cases = [
            (LegalConsents { kvkk: false, ..all }, ValidationError::KvkkRequired),
            (
                LegalConsents { distance_sales: false, ..all },
                ValidationError::DistanceSalesRequired,
            ),
            (LegalConsents { pre_info: false, ..all }, ValidationError::PreInfoRequired),
            (
                LegalConsents { order_confirm: false, ..all },
                ValidationError::OrderConfirmRequired,
            ),
        ];
        for (consents, expected) in cases {
            assert_eq!(validate_consents(&consents), Err(expected));
        }
    }
}
