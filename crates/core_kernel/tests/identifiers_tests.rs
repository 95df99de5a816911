//! Unit tests for the identifier newtypes

use core_kernel::{
    AuthorizationId, ClaimId, ClaimPaymentId, ClientId, DocumentId, PayerId,
    PaymentId, ProgramId, ServiceId, ServiceTypeId, StatusHistoryId,
};
use uuid::Uuid;

#[test]
fn test_prefixes() {
    assert!(ClientId::new().to_string().starts_with("CLI-"));
    assert!(PayerId::new().to_string().starts_with("PYR-"));
    assert!(ProgramId::new().to_string().starts_with("PRG-"));
    assert!(ServiceTypeId::new().to_string().starts_with("STY-"));
    assert!(ServiceId::new().to_string().starts_with("SVC-"));
    assert!(DocumentId::new().to_string().starts_with("DOC-"));
    assert!(AuthorizationId::new().to_string().starts_with("AUTH-"));
    assert!(ClaimId::new().to_string().starts_with("CLM-"));
    assert!(StatusHistoryId::new().to_string().starts_with("CSH-"));
    assert!(PaymentId::new().to_string().starts_with("PAY-"));
    assert!(ClaimPaymentId::new().to_string().starts_with("CPAY-"));
}

#[test]
fn test_uuid_round_trip() {
    let uuid = Uuid::new_v4();
    let id = ClaimId::from_uuid(uuid);
    let back: Uuid = id.into();
    assert_eq!(uuid, back);
    assert_eq!(ClaimId::from(uuid), id);
}

#[test]
fn test_parse_rejects_garbage() {
    assert!("CLM-not-a-uuid".parse::<ClaimId>().is_err());
}

#[test]
fn test_serializes_as_bare_uuid() {
    let id = PaymentId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{}\"", id.as_uuid()));
}

#[test]
fn test_new_generates_unique_ids() {
    assert_ne!(ServiceId::new(), ServiceId::new());
}
