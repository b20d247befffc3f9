//! Tests for error types

use bosscore::{Error, ErrorKind};

#[test]
fn test_malformed_range_error() {
    let error = Error::MalformedRange("x range 5:0 is reversed".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Malformed range"));
    assert!(error_str.contains("5:0"));
    assert_eq!(error.code(), 30001);
    assert_eq!(error.status(), 400);
}

#[test]
fn test_out_of_bounds_error() {
    let error = Error::OutOfBounds("x range 0:251 outside 0:250".to_string());
    assert!(format!("{error}").contains("Out of bounds"));
    assert_eq!(error.kind(), ErrorKind::OutOfBounds);
    assert_eq!(error.code(), 30002);
}

#[test]
fn test_not_found_error() {
    let error = Error::NotFound("view token 'token1'".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Not found"));
    assert!(error_str.contains("token1"));
    assert_eq!(error.status(), 404);
}

#[test]
fn test_missing_argument_error() {
    let error = Error::MissingArgument("query parameter 'value'".to_string());
    assert!(format!("{error}").contains("Missing argument"));
    assert_eq!(error.code(), 30000);
}

#[test]
fn test_backend_unavailable_error() {
    let error = Error::BackendUnavailable("connection refused".to_string());
    assert!(format!("{error}").contains("Backend unavailable"));
    assert_eq!(error.status(), 503);
}

#[test]
fn test_serialization_error_is_backend_failure() {
    let serde_error = serde_json::from_str::<u64>("not json").unwrap_err();
    let error = Error::from(serde_error);
    assert!(format!("{error}").contains("Serialization error"));
    assert_eq!(error.kind(), ErrorKind::BackendUnavailable);
}

#[test]
fn test_codes_are_unique() {
    let kinds = [
        ErrorKind::MalformedRange,
        ErrorKind::OutOfBounds,
        ErrorKind::NotFound,
        ErrorKind::MissingArgument,
        ErrorKind::AlreadyExists,
        ErrorKind::InvalidName,
        ErrorKind::InvalidPayload,
        ErrorKind::InvalidFrame,
        ErrorKind::MethodNotAllowed,
        ErrorKind::InvalidConfig,
        ErrorKind::BackendUnavailable,
    ];
    let mut codes: Vec<u32> = kinds.iter().map(|k| k.code()).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), kinds.len());
}

#[test]
fn test_status_classes() {
    assert_eq!(ErrorKind::AlreadyExists.status(), 400);
    assert_eq!(ErrorKind::InvalidName.status(), 400);
    assert_eq!(ErrorKind::InvalidPayload.status(), 400);
    assert_eq!(ErrorKind::InvalidFrame.status(), 400);
    assert_eq!(ErrorKind::MethodNotAllowed.status(), 405);
    assert_eq!(ErrorKind::InvalidConfig.status(), 500);
}

#[test]
fn test_error_debug() {
    let error = Error::InvalidName("a&b".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("InvalidName"));
}
