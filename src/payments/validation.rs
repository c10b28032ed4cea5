//! Request validation, applied before any provider call.

use super::error::PaymentError;
use super::types::{CustomerRequest, PaymentMethodDetails, PaymentMethodRequest, PaymentRequest, RefundRequest};

/// Active ISO 4217 currency codes, lower-case.
const ISO_4217: &[&str] = &[
    "aed", "afn", "all", "amd", "ang", "aoa", "ars", "aud", "awg", "azn", "bam", "bbd", "bdt", "bgn", "bhd",
    "bif", "bmd", "bnd", "bob", "brl", "bsd", "btn", "bwp", "byn", "bzd", "cad", "cdf", "chf", "clp", "cny",
    "cop", "crc", "cup", "cve", "czk", "djf", "dkk", "dop", "dzd", "egp", "ern", "etb", "eur", "fjd", "fkp",
    "gbp", "gel", "ghs", "gip", "gmd", "gnf", "gtq", "gyd", "hkd", "hnl", "htg", "huf", "idr", "ils", "inr",
    "iqd", "irr", "isk", "jmd", "jod", "jpy", "kes", "kgs", "khr", "kmf", "kpw", "krw", "kwd", "kyd", "kzt",
    "lak", "lbp", "lkr", "lrd", "lsl", "lyd", "mad", "mdl", "mga", "mkd", "mmk", "mnt", "mop", "mru", "mur",
    "mvr", "mwk", "mxn", "myr", "mzn", "nad", "ngn", "nio", "nok", "npr", "nzd", "omr", "pab", "pen", "pgk",
    "php", "pkr", "pln", "pyg", "qar", "ron", "rsd", "rub", "rwf", "sar", "sbd", "scr", "sdg", "sek", "sgd",
    "shp", "sle", "sll", "sos", "srd", "ssp", "stn", "svc", "syp", "szl", "thb", "tjs", "tmt", "tnd", "top",
    "try", "ttd", "twd", "tzs", "uah", "ugx", "usd", "uyu", "uzs", "ves", "vnd", "vuv", "wst", "xaf", "xcd",
    "xof", "xpf", "yer", "zar", "zmw", "zwl",
];

pub fn is_known_currency(code: &str) -> bool {
    let code = code.trim().to_ascii_lowercase();
    ISO_4217.contains(&code.as_str())
}

fn invalid(message: impl Into<String>) -> PaymentError {
    PaymentError::Validation(message.into())
}

pub fn validate_id(field: &str, value: &str) -> Result<(), PaymentError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

pub fn validate_payment_request(request: &PaymentRequest) -> Result<(), PaymentError> {
    if request.amount <= 0 {
        return Err(invalid("amount must be greater than 0"));
    }
    if !is_known_currency(&request.currency) {
        return Err(invalid(format!("unsupported currency '{}'", request.currency)));
    }
    if let Some(customer) = &request.customer_id {
        validate_id("customer_id", customer)?;
    }
    if let Some(pm) = &request.payment_method_id {
        validate_id("payment_method_id", pm)?;
    }
    Ok(())
}

pub fn validate_customer_request(request: &CustomerRequest) -> Result<(), PaymentError> {
    if !request.email.contains('@') {
        return Err(invalid("email must contain '@'"));
    }
    Ok(())
}

pub fn validate_refund_request(request: &RefundRequest) -> Result<(), PaymentError> {
    validate_id("payment_intent_id", &request.payment_intent_id)?;
    if matches!(request.amount, Some(amount) if amount <= 0) {
        return Err(invalid("refund amount must be greater than 0"));
    }
    Ok(())
}

pub fn validate_payment_method_request(request: &PaymentMethodRequest) -> Result<(), PaymentError> {
    validate_id("customer_id", &request.customer_id)?;
    match &request.details {
        PaymentMethodDetails::Card(card) => {
            let digits = card.number.chars().filter(|c| !c.is_whitespace()).count();
            if digits < 12 || !card.number.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
                return Err(invalid("card number is malformed"));
            }
            if !(1..=12).contains(&card.exp_month) {
                return Err(invalid("exp_month must be between 1 and 12"));
            }
        }
        PaymentMethodDetails::BankAccount(bank) => {
            validate_id("routing_number", &bank.routing_number)?;
            validate_id("account_number", &bank.account_number)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::CardDetails;

    #[test]
    fn test_payment_request_rules() {
        assert!(validate_payment_request(&PaymentRequest::new(5000, "usd", "fee")).is_ok());
        assert!(validate_payment_request(&PaymentRequest::new(5000, "EUR", "fee")).is_ok());

        let err = validate_payment_request(&PaymentRequest::new(0, "usd", "fee")).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: amount must be greater than 0");
        assert!(validate_payment_request(&PaymentRequest::new(-5, "usd", "fee")).is_err());
        assert!(validate_payment_request(&PaymentRequest::new(100, "usdx", "fee")).is_err());
        assert!(validate_payment_request(&PaymentRequest::new(100, "", "fee")).is_err());
    }

    #[test]
    fn test_customer_and_refund_rules() {
        assert!(validate_customer_request(&CustomerRequest::new("a@b.co")).is_ok());
        assert!(validate_customer_request(&CustomerRequest::new("nope")).is_err());

        assert!(validate_refund_request(&RefundRequest::full("pi_1")).is_ok());
        assert!(validate_refund_request(&RefundRequest::full(" ")).is_err());
        let mut refund = RefundRequest::full("pi_1");
        refund.amount = Some(0);
        assert!(validate_refund_request(&refund).is_err());
    }

    #[test]
    fn test_payment_method_rules() {
        let mut request = PaymentMethodRequest {
            customer_id: "cus_1".into(),
            details: PaymentMethodDetails::Card(CardDetails {
                number: "4242 4242 4242 4242".into(),
                exp_month: 12,
                exp_year: 2030,
                cvc: "123".into(),
            }),
            billing_details: None,
        };
        assert!(validate_payment_method_request(&request).is_ok());

        request.customer_id = String::new();
        assert!(validate_payment_method_request(&request).is_err());
    }
}
