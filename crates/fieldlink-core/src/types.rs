//! # Domain Types
//!
//! Core types shared by the store and sync layers.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────┐   │
//! │  │ OfflineAction   │   │ OfflineActionKind   │   │  CacheItem<T>   │   │
//! │  │  ─────────────  │   │  ─────────────────  │   │  ─────────────  │   │
//! │  │  id (ActionId)  │──►│  UpdateStatus       │   │  data: T        │   │
//! │  │  kind           │   │  AcceptOrder        │   │  written_at     │   │
//! │  │  enqueued_at    │   │  RejectOrder        │   │  expires_at     │   │
//! │  │  retry_count    │   │  UpdateOrderStatus  │   └─────────────────┘   │
//! │  │  max_retries    │   │  UpdateLocation     │                         │
//! │  └─────────────────┘   │  SubmitProofOf...   │   ┌─────────────────┐   │
//! │                        └─────────────────────┘   │  Credentials    │   │
//! │  ┌─────────────────┐   ┌─────────────────────┐   │  ─────────────  │   │
//! │  │  AgentStatus    │   │  OrderStatus        │   │  access_token   │   │
//! │  │  OnDuty         │   │  PickedUp           │   │  refresh_token  │   │
//! │  │  OffDuty        │   │  InTransit          │   │  (redacted)     │   │
//! │  │  OnBreak        │   │  Delivered / Failed │   └─────────────────┘   │
//! │  └─────────────────┘   └─────────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Action kinds serialize adjacently tagged, so the persisted queue and the
//! request bodies stay readable:
//! ```json
//! { "kind": "accept_order", "payload": { "order_id": "ord-42" } }
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DEFAULT_MAX_RETRIES;

// =============================================================================
// Action Id
// =============================================================================

/// Identifier of a queued offline action.
///
/// Format: `<kind>-<unix_millis>-<8 hex chars>`, e.g.
/// `accept_order-1718000000000-3f2a9c01`. Unique within one installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Generates a fresh id for an action of the given kind.
    pub fn generate(kind: &str, now: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        ActionId(format!("{}-{}-{}", kind, now.timestamp_millis(), &random[..8]))
    }

    /// Returns the id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        ActionId(value)
    }
}

// =============================================================================
// Agent Status
// =============================================================================

/// Duty status of a field agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Accepting new orders.
    OnDuty,
    /// Signed off.
    OffDuty,
    /// Temporarily unavailable.
    OnBreak,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::OnDuty => "on_duty",
            AgentStatus::OffDuty => "off_duty",
            AgentStatus::OnBreak => "on_break",
        }
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Delivery progress an agent can report for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PickedUp,
    InTransit,
    Delivered,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Failed => "failed",
        }
    }
}

// =============================================================================
// Offline Action Kind
// =============================================================================

/// A mutating action the agent can take while offline.
///
/// The set is closed: every kind has a typed payload, and the executor maps
/// each one to exactly one backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum OfflineActionKind {
    /// Change the agent's duty status.
    UpdateStatus { status: AgentStatus },

    /// Accept an offered order.
    AcceptOrder { order_id: String },

    /// Decline an offered order.
    RejectOrder {
        order_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Report delivery progress for an accepted order.
    UpdateOrderStatus {
        order_id: String,
        status: OrderStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },

    /// Report a GPS fix taken while offline.
    UpdateLocation {
        latitude: f64,
        longitude: f64,
        recorded_at: DateTime<Utc>,
    },

    /// Close out a delivery with proof.
    SubmitProofOfDelivery {
        order_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        photo_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient_name: Option<String>,
    },
}

impl OfflineActionKind {
    /// Wire name of the kind (the `kind` tag).
    pub fn name(&self) -> &'static str {
        match self {
            OfflineActionKind::UpdateStatus { .. } => "update_status",
            OfflineActionKind::AcceptOrder { .. } => "accept_order",
            OfflineActionKind::RejectOrder { .. } => "reject_order",
            OfflineActionKind::UpdateOrderStatus { .. } => "update_order_status",
            OfflineActionKind::UpdateLocation { .. } => "update_location",
            OfflineActionKind::SubmitProofOfDelivery { .. } => "submit_proof_of_delivery",
        }
    }

    /// Order the action refers to, if any.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            OfflineActionKind::AcceptOrder { order_id }
            | OfflineActionKind::RejectOrder { order_id, .. }
            | OfflineActionKind::UpdateOrderStatus { order_id, .. }
            | OfflineActionKind::SubmitProofOfDelivery { order_id, .. } => Some(order_id),
            OfflineActionKind::UpdateStatus { .. } | OfflineActionKind::UpdateLocation { .. } => {
                None
            }
        }
    }
}

// =============================================================================
// Offline Action
// =============================================================================

/// A queued action awaiting replay.
///
/// Owned by the offline queue. `retry_count` only moves during a drain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAction {
    pub id: ActionId,

    #[serde(rename = "action")]
    pub kind: OfflineActionKind,

    pub enqueued_at: DateTime<Utc>,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl OfflineAction {
    /// Creates a fresh action with `retry_count = 0`.
    pub fn new(kind: OfflineActionKind, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: ActionId::generate(kind.name(), now),
            kind,
            enqueued_at: now,
            retry_count: 0,
            max_retries,
        }
    }

    /// Records one failed replay and reports whether the action is now spent.
    pub fn record_failure(&mut self) -> bool {
        self.retry_count = self.retry_count.saturating_add(1);
        self.is_exhausted()
    }

    /// True once the action has failed `max_retries` times.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

// =============================================================================
// Cache Item
// =============================================================================

/// Envelope stored for every cached value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem<T> {
    pub data: T,
    pub written_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheItem<T> {
    /// Wraps `data` with an expiry `ttl` after `now`.
    ///
    /// A TTL too large to represent saturates to the maximum timestamp.
    pub fn new(data: T, ttl: Duration, now: DateTime<Utc>) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            data,
            written_at: now,
            expires_at,
        }
    }

    /// Visible only while `now < expires_at`.
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time since the value was written.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.written_at).to_std().unwrap_or_default()
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Access/refresh token pair for the current session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_action_id_format() {
        let id = ActionId::generate("accept_order", t0());
        let parts: Vec<&str> = id.as_str().rsplitn(3, '-').collect();

        assert_eq!(parts[2], "accept_order");
        assert_eq!(parts[1], t0().timestamp_millis().to_string());
        assert_eq!(parts[0].len(), 8);
        assert!(parts[0].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_action_ids_are_unique() {
        let a = ActionId::generate("update_status", t0());
        let b = ActionId::generate("update_status", t0());
        assert_ne!(a, b);
    }

    #[test]
    fn test_kind_serializes_adjacently_tagged() {
        let kind = OfflineActionKind::AcceptOrder {
            order_id: "ord-42".to_string(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "accept_order", "payload": { "order_id": "ord-42" } })
        );

        let status = OfflineActionKind::UpdateStatus {
            status: AgentStatus::OnDuty,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["payload"]["status"], "on_duty");
    }

    #[test]
    fn test_kind_name_matches_tag() {
        let kinds = vec![
            OfflineActionKind::UpdateStatus {
                status: AgentStatus::OnBreak,
            },
            OfflineActionKind::RejectOrder {
                order_id: "o1".into(),
                reason: Some("too far".into()),
            },
            OfflineActionKind::UpdateLocation {
                latitude: 24.86,
                longitude: 67.0,
                recorded_at: t0(),
            },
        ];
        for kind in kinds {
            let json = serde_json::to_value(&kind).unwrap();
            assert_eq!(json["kind"], kind.name());
        }
    }

    #[test]
    fn test_offline_action_survives_persistence() {
        let action = OfflineAction::new(
            OfflineActionKind::UpdateOrderStatus {
                order_id: "ord-7".into(),
                status: OrderStatus::Delivered,
                note: None,
            },
            3,
            t0(),
        );
        let json = serde_json::to_string(&action).unwrap();
        let restored: OfflineAction = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, action);
        assert_eq!(restored.retry_count, 0);
    }

    #[test]
    fn test_missing_retry_fields_use_defaults() {
        let json = r#"{
            "id": "accept_order-1-deadbeef",
            "action": { "kind": "accept_order", "payload": { "order_id": "x" } },
            "enqueued_at": "2024-06-10T09:00:00Z"
        }"#;
        let action: OfflineAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.retry_count, 0);
        assert_eq!(action.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_record_failure_until_exhausted() {
        let mut action = OfflineAction::new(
            OfflineActionKind::AcceptOrder {
                order_id: "o".into(),
            },
            2,
            t0(),
        );
        assert!(!action.record_failure());
        assert!(action.record_failure());
        assert_eq!(action.retry_count, 2);
    }

    #[test]
    fn test_cache_item_expiry_boundary() {
        let item = CacheItem::new("orders", Duration::from_millis(1000), t0());
        assert!(!item.is_expired(t0() + chrono::Duration::milliseconds(999)));
        assert!(item.is_expired(t0() + chrono::Duration::milliseconds(1000)));
        assert_eq!(
            item.age(t0() + chrono::Duration::milliseconds(250)),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_cache_item_huge_ttl_saturates() {
        let item = CacheItem::new(1u8, Duration::from_secs(u64::MAX), t0());
        assert_eq!(item.expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("secret-access", "secret-refresh");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_order_id_accessor() {
        let kind = OfflineActionKind::UpdateStatus {
            status: AgentStatus::OffDuty,
        };
        assert_eq!(kind.order_id(), None);

        let kind = OfflineActionKind::SubmitProofOfDelivery {
            order_id: "ord-1".into(),
            otp: Some("1234".into()),
            photo_url: None,
            recipient_name: None,
        };
        assert_eq!(kind.order_id(), Some("ord-1"));
    }
}
