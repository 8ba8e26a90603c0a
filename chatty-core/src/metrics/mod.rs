//! Metrics for invite, vault and message activity
//!
//! Recorded through the `metrics` facade. The library installs no recorder;
//! a host that wants them exported installs its own.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const INVITES_ISSUED: &str = "chatty_invites_issued_total";
pub const JOIN_REQUESTS: &str = "chatty_join_requests_total";
pub const JOINS_RESOLVED: &str = "chatty_joins_resolved_total";
pub const DECRYPT_FAILURES: &str = "chatty_decrypt_failures_total";
pub const VAULT_SAVES: &str = "chatty_vault_saves_total";
pub const VAULT_UNLOCK_DURATION: &str = "chatty_vault_unlock_duration_ms";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(INVITES_ISSUED, "Invite codes published by this device");
    describe_counter!(JOIN_REQUESTS, "Join requests sent by this device");
    describe_counter!(JOINS_RESOLVED, "Join responses resolved, labelled by outcome");
    describe_counter!(DECRYPT_FAILURES, "Message ciphertexts that failed to decrypt");
    describe_counter!(VAULT_SAVES, "Vault blobs written to disk");
    describe_histogram!(VAULT_UNLOCK_DURATION, "Password verification time in milliseconds");
}

/// Outcome label for [`JOINS_RESOLVED`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeLabel {
    Accepted,
    Rejected,
}

impl OutcomeLabel {
    fn as_label(self) -> &'static str {
        match self {
            OutcomeLabel::Accepted => "accepted",
            OutcomeLabel::Rejected => "rejected",
        }
    }
}

pub fn record_invite_issued() {
    counter!(INVITES_ISSUED).increment(1);
}

pub fn record_join_request() {
    counter!(JOIN_REQUESTS).increment(1);
}

pub fn record_join_resolved(outcome: OutcomeLabel) {
    counter!(JOINS_RESOLVED, "outcome" => outcome.as_label()).increment(1);
}

pub fn record_decrypt_failure() {
    counter!(DECRYPT_FAILURES).increment(1);
}

pub fn record_vault_save() {
    counter!(VAULT_SAVES).increment(1);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}
