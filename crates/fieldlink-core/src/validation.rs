//! # Validation Module
//!
//! Payload checks applied before an action enters the offline queue.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: App forms                                                    │
//! │  └── Immediate agent feedback                                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Offline queue (Rust)                                         │
//! │  ├── Type validation (closed OfflineActionKind enum)                   │
//! │  └── THIS MODULE: payload rules (ids, coordinates, text)               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Backend API                                                  │
//! │  └── Order lifecycle rules (not known to the client)                   │
//! │                                                                         │
//! │  An action rejected here never burns a retry slot on replay.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use fieldlink_core::validation::{validate_coordinates, validate_order_id};
//!
//! assert!(validate_order_id("ord-42").is_ok());
//! assert!(validate_coordinates(91.0, 0.0).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::OfflineActionKind;
use crate::{MAX_NOTE_LEN, MAX_ORDER_ID_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an order identifier.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_ORDER_ID_LEN`] characters
/// - Only letters, digits, hyphens and underscores (it is spliced into a URL path)
pub fn validate_order_id(order_id: &str) -> ValidationResult<()> {
    let order_id = order_id.trim();

    if order_id.is_empty() {
        return Err(ValidationError::Required {
            field: "order_id".to_string(),
        });
    }

    if order_id.len() > MAX_ORDER_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "order_id".to_string(),
            max: MAX_ORDER_ID_LEN,
        });
    }

    if !order_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "order_id".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates an optional free-text field (note, reason, recipient name).
pub fn validate_optional_text(field: &str, value: Option<&str>) -> ValidationResult<()> {
    match value {
        Some(text) if text.chars().count() > MAX_NOTE_LEN => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTE_LEN,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a GPS fix.
///
/// ## Rules
/// - Latitude within [-90, 90]
/// - Longitude within [-180, 180]
/// - NaN is rejected by both checks
pub fn validate_coordinates(latitude: f64, longitude: f64) -> ValidationResult<()> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ValidationError::OutOfRange {
            field: "latitude".to_string(),
            min: -90.0,
            max: 90.0,
        });
    }

    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ValidationError::OutOfRange {
            field: "longitude".to_string(),
            min: -180.0,
            max: 180.0,
        });
    }

    Ok(())
}

// =============================================================================
// Action Validator
// =============================================================================

/// Validates a whole action payload before it is queued.
///
/// ## Flow
/// ```text
/// enqueue(kind)
///      │
///      ▼
/// validate_action(&kind) ← THIS FUNCTION
///      │
///      ├── bad order id?      → Error
///      ├── bad coordinates?   → Error
///      ├── oversized text?    → Error
///      ├── empty proof?       → Error (needs otp, photo, or recipient)
///      │
///      └── OK → persisted to the queue
/// ```
pub fn validate_action(kind: &OfflineActionKind) -> ValidationResult<()> {
    match kind {
        OfflineActionKind::UpdateStatus { .. } => Ok(()),
        OfflineActionKind::AcceptOrder { order_id } => validate_order_id(order_id),
        OfflineActionKind::RejectOrder { order_id, reason } => {
            validate_order_id(order_id)?;
            validate_optional_text("reason", reason.as_deref())
        }
        OfflineActionKind::UpdateOrderStatus { order_id, note, .. } => {
            validate_order_id(order_id)?;
            validate_optional_text("note", note.as_deref())
        }
        OfflineActionKind::UpdateLocation {
            latitude,
            longitude,
            ..
        } => validate_coordinates(*latitude, *longitude),
        OfflineActionKind::SubmitProofOfDelivery {
            order_id,
            otp,
            photo_url,
            recipient_name,
        } => {
            validate_order_id(order_id)?;
            validate_optional_text("recipient_name", recipient_name.as_deref())?;

            let has_proof = [otp, photo_url, recipient_name]
                .iter()
                .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()));
            if !has_proof {
                return Err(ValidationError::Required {
                    field: "proof".to_string(),
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentStatus, OrderStatus};

    #[test]
    fn test_validate_order_id() {
        assert!(validate_order_id("ord-42").is_ok());
        assert!(validate_order_id("ORD_2024_001").is_ok());

        assert!(matches!(
            validate_order_id("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_order_id(&"a".repeat(MAX_ORDER_ID_LEN + 1)),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(matches!(
            validate_order_id("ord/../admin"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(24.8607, 67.0011).is_ok());
        assert!(validate_coordinates(-90.0, 180.0).is_ok());
        assert!(validate_coordinates(90.5, 0.0).is_err());
        assert!(validate_coordinates(0.0, -181.0).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_validate_optional_text() {
        assert!(validate_optional_text("note", None).is_ok());
        assert!(validate_optional_text("note", Some("left at door")).is_ok());
        assert!(validate_optional_text("note", Some(&"x".repeat(MAX_NOTE_LEN + 1))).is_err());
    }

    #[test]
    fn test_validate_action_variants() {
        assert!(validate_action(&OfflineActionKind::UpdateStatus {
            status: AgentStatus::OnDuty
        })
        .is_ok());

        assert!(validate_action(&OfflineActionKind::UpdateOrderStatus {
            order_id: "ord-1".into(),
            status: OrderStatus::PickedUp,
            note: Some("x".repeat(MAX_NOTE_LEN + 1)),
        })
        .is_err());

        assert!(validate_action(&OfflineActionKind::AcceptOrder {
            order_id: String::new()
        })
        .is_err());
    }

    #[test]
    fn test_proof_of_delivery_needs_some_proof() {
        let empty = OfflineActionKind::SubmitProofOfDelivery {
            order_id: "ord-1".into(),
            otp: None,
            photo_url: Some("  ".into()),
            recipient_name: None,
        };
        assert!(matches!(
            validate_action(&empty),
            Err(ValidationError::Required { .. })
        ));

        let with_otp = OfflineActionKind::SubmitProofOfDelivery {
            order_id: "ord-1".into(),
            otp: Some("4821".into()),
            photo_url: None,
            recipient_name: None,
        };
        assert!(validate_action(&with_otp).is_ok());
    }
}
