//! Outbound side effects: invitation email delivery and audit events.
//!
//! Both are traits so storage-free deployments and tests can swap them
//! out. The null implementations are the defaults; actions work without
//! either being wired up.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AuthError;

/// A domain event worth an audit trail entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Machine-readable action name, e.g. `invitation.accepted`.
    pub action: String,
    pub organization_id: i64,
    /// User performing the action, when one is known.
    pub actor_id: Option<i64>,
    pub detail: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, organization_id: i64, actor_id: Option<i64>) -> Self {
        Self {
            action: action.into(),
            organization_id,
            actor_id,
            detail: serde_json::Value::Null,
            occurred_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Delivers invitation emails. The plain invitation token passes through
/// here once and is never stored.
#[async_trait]
pub trait EmailSink: Send + Sync {
    async fn send_invitation(
        &self,
        recipient: &str,
        organization_name: &str,
        token: &str,
    ) -> Result<(), AuthError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AuthError>;
}

/// Discards invitation emails with a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEmailSink;

#[async_trait]
impl EmailSink for NullEmailSink {
    async fn send_invitation(
        &self,
        recipient: &str,
        organization_name: &str,
        _token: &str,
    ) -> Result<(), AuthError> {
        log::debug!(
            target: "portcullis",
            "msg=\"invitation email discarded (no sink configured)\", recipient=\"{recipient}\", organization=\"{organization_name}\""
        );
        Ok(())
    }
}

/// Discards audit events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _event: AuditEvent) -> Result<(), AuthError> {
        Ok(())
    }
}

#[cfg(any(test, feature = "mocks"))]
pub use recording::{RecordingAuditSink, RecordingEmailSink};

#[cfg(any(test, feature = "mocks"))]
mod recording {
    use std::sync::{Arc, RwLock};

    use super::*;

    /// Captures sent invitations for assertions. Clones share the capture
    /// buffer.
    #[derive(Clone, Default)]
    pub struct RecordingEmailSink {
        sent: Arc<RwLock<Vec<SentInvitation>>>,
    }

    #[derive(Debug, Clone)]
    pub struct SentInvitation {
        pub recipient: String,
        pub organization_name: String,
        pub token: String,
    }

    impl RecordingEmailSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<SentInvitation> {
            self.sent.read().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl EmailSink for RecordingEmailSink {
        async fn send_invitation(
            &self,
            recipient: &str,
            organization_name: &str,
            token: &str,
        ) -> Result<(), AuthError> {
            self.sent
                .write()
                .map_err(|_| AuthError::Internal("email sink lock poisoned".into()))?
                .push(SentInvitation {
                    recipient: recipient.to_owned(),
                    organization_name: organization_name.to_owned(),
                    token: token.to_owned(),
                });
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingAuditSink {
        events: Arc<RwLock<Vec<AuditEvent>>>,
    }

    impl RecordingAuditSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<AuditEvent> {
            self.events.read().map(|e| e.clone()).unwrap_or_default()
        }

        pub fn actions(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .map(|e| e.action)
                .collect()
        }
    }

    #[async_trait]
    impl AuditSink for RecordingAuditSink {
        async fn record(&self, event: AuditEvent) -> Result<(), AuthError> {
            self.events
                .write()
                .map_err(|_| AuthError::Internal("audit sink lock poisoned".into()))?
                .push(event);
            Ok(())
        }
    }
}
