//! Outbound mail dispatch seam.
//!
//! Transport is out of scope here: the flow layer only needs a `send` call
//! that can fail. Production deployments plug in a real
//! transport; the default `LogMailer` writes the message to the log, which
//! is also what local development wants.

use async_trait::async_trait;
use tracing::info;

/// Error from the mail transport. The flow maps it to a dispatch failure
/// without inspecting the cause.
#[derive(Debug)]
pub struct MailError(pub String);

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mail dispatch failed: {}", self.0)
    }
}

impl std::error::Error for MailError {}

/// Mail dispatch collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, code: &str) -> Result<(), MailError>;
}

/// Development mailer: logs the passcode instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, code: &str) -> Result<(), MailError> {
        info!(to = %to, subject = %subject, code = %code, "Passcode email (log transport)");
        Ok(())
    }
}
