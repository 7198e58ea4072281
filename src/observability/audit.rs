/// Security event logging for cpujail
/// Emits one JSON record per security-relevant decision through the `log`
/// facade under the `cpujail::audit` target.
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "cpujail::audit";

/// Security event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecuritySeverity {
    High,
    Medium,
    Low,
}

/// Types of security events we track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityEventType {
    /// Caller allowed to read a sandbox's affinity
    InspectionGranted,
    /// Caller refused; nothing was disclosed
    InspectionDenied,
    /// Target pid named the launcher and was replaced by its first child
    LauncherRedirect,
    /// Mask written to the state file
    MaskPersisted,
    /// Affinity could not be set or verified
    AffinityDegraded,
}

impl SecurityEventType {
    pub fn default_severity(&self) -> SecuritySeverity {
        match self {
            SecurityEventType::InspectionDenied => SecuritySeverity::High,
            SecurityEventType::AffinityDegraded => SecuritySeverity::Medium,
            SecurityEventType::InspectionGranted
            | SecurityEventType::LauncherRedirect
            | SecurityEventType::MaskPersisted => SecuritySeverity::Low,
        }
    }
}

/// Individual security event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_id: String,
    pub event_type: SecurityEventType,
    pub severity: SecuritySeverity,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    pub details: String,
    pub process_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_pid: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_uid: Option<u32>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, details: String) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            severity: event_type.default_severity(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            details,
            process_id: std::process::id(),
            target_pid: None,
            caller_uid: None,
        }
    }

    pub fn with_target_pid(mut self, pid: i32) -> Self {
        self.target_pid = Some(pid);
        self
    }

    pub fn with_caller_uid(mut self, uid: u32) -> Self {
        self.caller_uid = Some(uid);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            serde_json::json!({
                "event_type": format!("{:?}", self.event_type),
                "details": self.details,
            })
            .to_string()
        })
    }

    pub fn emit(&self) {
        match self.severity {
            SecuritySeverity::High | SecuritySeverity::Medium => {
                warn!(target: AUDIT_TARGET, "{}", self.to_json())
            }
            SecuritySeverity::Low => info!(target: AUDIT_TARGET, "{}", self.to_json()),
        }
    }
}

/// Convenience constructors for the events cpujail emits
pub mod events {
    use super::*;

    pub fn inspection_granted(target_pid: i32, caller_uid: u32) {
        SecurityEvent::new(
            SecurityEventType::InspectionGranted,
            "cpu affinity inspection authorized".to_string(),
        )
        .with_target_pid(target_pid)
        .with_caller_uid(caller_uid)
        .emit();
    }

    pub fn inspection_denied(target_pid: i32, caller_uid: u32) {
        SecurityEvent::new(
            SecurityEventType::InspectionDenied,
            "caller does not own the target sandbox".to_string(),
        )
        .with_target_pid(target_pid)
        .with_caller_uid(caller_uid)
        .emit();
    }

    pub fn launcher_redirect(launcher_pid: i32, child_pid: i32) {
        SecurityEvent::new(
            SecurityEventType::LauncherRedirect,
            format!("launcher {} resolved to first child {}", launcher_pid, child_pid),
        )
        .with_target_pid(child_pid)
        .emit();
    }

    pub fn mask_persisted(path: &std::path::Path, mask_bits: u32) {
        SecurityEvent::new(
            SecurityEventType::MaskPersisted,
            format!("cpu mask {:x} saved to {}", mask_bits, path.display()),
        )
        .emit();
    }

    pub fn affinity_degraded(details: String) {
        SecurityEvent::new(SecurityEventType::AffinityDegraded, details).emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_inspection_is_high_severity() {
        let event = SecurityEvent::new(SecurityEventType::InspectionDenied, "x".to_string());
        assert_eq!(event.severity, SecuritySeverity::High);
    }

    #[test]
    fn event_serializes_with_optional_fields() {
        let event = SecurityEvent::new(SecurityEventType::InspectionGranted, "ok".to_string())
            .with_target_pid(42)
            .with_caller_uid(1000);
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(value["event_type"], "InspectionGranted");
        assert_eq!(value["target_pid"], 42);
        assert_eq!(value["caller_uid"], 1000);
        assert!(Uuid::parse_str(value["event_id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn absent_fields_are_omitted() {
        let event = SecurityEvent::new(SecurityEventType::MaskPersisted, "saved".to_string());
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert!(value.get("target_pid").is_none());
        assert!(value.get("caller_uid").is_none());
    }

    #[test]
    fn event_ids_are_unique() {
        let a = SecurityEvent::new(SecurityEventType::MaskPersisted, String::new());
        let b = SecurityEvent::new(SecurityEventType::MaskPersisted, String::new());
        assert_ne!(a.event_id, b.event_id);
    }
}
