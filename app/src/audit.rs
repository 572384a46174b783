// ==============================================================================
// audit.rs - Audit Logging for Ingestion Runs
// ==============================================================================
// Description: Durable trail of per-file and per-pass ingestion outcomes
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================
// Events are written outside the per-file transaction, so a rolled-back file
// still leaves its `file_rolled_back` event behind.
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{StoreError, VariantStore};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Run lifecycle
    RunStarted,
    RunCompleted,

    // Variant files
    FileCommitted,
    FileRolledBack,
    FileRejected,

    // ClinVar pass
    AnnotationPassCommitted,
    AnnotationPassRolledBack,
    AnnotationFileMissing,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RunStarted => "run_started",
            AuditEventType::RunCompleted => "run_completed",
            AuditEventType::FileCommitted => "file_committed",
            AuditEventType::FileRolledBack => "file_rolled_back",
            AuditEventType::FileRejected => "file_rejected",
            AuditEventType::AnnotationPassCommitted => "annotation_pass_committed",
            AuditEventType::AnnotationPassRolledBack => "annotation_pass_rolled_back",
            AuditEventType::AnnotationFileMissing => "annotation_file_missing",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

impl LogSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSeverity::Info => "info",
            LogSeverity::Warning => "warning",
            LogSeverity::Error => "error",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub event_type: AuditEventType,
    /// Input file the event refers to, if any
    pub resource: Option<String>,
    pub details: serde_json::Value,
    pub severity: LogSeverity,
}

impl AuditEvent {
    pub fn new(
        run_id: Uuid,
        event_type: AuditEventType,
        resource: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        let severity = match event_type {
            AuditEventType::FileRejected | AuditEventType::AnnotationFileMissing => LogSeverity::Warning,

            AuditEventType::FileRolledBack | AuditEventType::AnnotationPassRolledBack => LogSeverity::Error,

            _ => LogSeverity::Info,
        };

        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            event_type,
            resource,
            details,
            severity,
        }
    }

    pub fn log<S: VariantStore + ?Sized>(&self, store: &mut S) -> Result<(), StoreError> {
        tracing::debug!(
            target: "audit",
            event_type = self.event_type.as_str(),
            resource = self.resource.as_deref().unwrap_or("-"),
            "{}",
            self.details
        );
        store.record_audit(self)
    }
}

/// Convenience function to log an audit event
pub fn log_event<S: VariantStore + ?Sized>(
    store: &mut S,
    run_id: Uuid,
    event_type: AuditEventType,
    resource: Option<String>,
    details: serde_json::Value,
) -> Result<(), StoreError> {
    AuditEvent::new(run_id, event_type, resource, details).log(store)
}
