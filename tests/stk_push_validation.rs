use tumaini_api::services::mpesa_service::{daraja_password, normalize_phone, validate_amount};

// Every accepted input form must collapse to the one canonical 254… shape
// before the gateway sees it.
#[test]
fn all_valid_phone_forms_normalize_to_canonical_international() {
    for input in ["0712345678", "+254712345678", "254712345678", "712345678"] {
        assert_eq!(
            normalize_phone(input).unwrap(),
            "254712345678",
            "input: {}",
            input
        );
    }
}

#[test]
fn whitespace_is_tolerated() {
    assert_eq!(normalize_phone("  0712345678 ").unwrap(), "254712345678");
}

#[test]
fn malformed_numbers_are_rejected_before_any_network_call() {
    for input in ["", "0712", "2547123456789", "071234567a", "+1555123456"] {
        assert!(normalize_phone(input).is_err(), "input: {}", input);
    }
}

#[test]
fn zero_and_negative_amounts_are_rejected() {
    assert!(validate_amount(0.0).is_err());
    assert!(validate_amount(-1.0).is_err());
    assert!(validate_amount(f64::NEG_INFINITY).is_err());
}

#[test]
fn fractional_amounts_are_rejected() {
    assert!(validate_amount(499.99).is_err());
}

#[test]
fn whole_positive_amounts_pass_through() {
    assert_eq!(validate_amount(500.0).unwrap(), 500);
    assert_eq!(validate_amount(1.0).unwrap(), 1);
}

#[test]
fn password_derivation_is_shortcode_passkey_timestamp() {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let timestamp = "20240115103000";
    let password = daraja_password("174379", "bfb279f9aa9b", timestamp);

    let decoded = String::from_utf8(STANDARD.decode(password).unwrap()).unwrap();
    assert_eq!(decoded, format!("174379bfb279f9aa9b{}", timestamp));
}
