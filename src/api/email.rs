//! Outbound notification dispatch.
//!
//! Handlers never wait on delivery. They build an `EmailMessage` and push it
//! onto a bounded in-process queue; a background task drains the queue and
//! hands each message to an `EmailSender`. The sender decides how to deliver
//! (SMTP, API, etc.) and owns any retry policy. When the queue is full the
//! message is dropped with a warning, so a stalled sender can never block or
//! fail a request.
//!
//! The default sender for local dev is `LogEmailSender`, which logs the
//! payload and returns `Ok(())`.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

impl EmailMessage {
    /// Verification code for the pre-registration email check.
    #[must_use]
    pub fn verification_code(to_email: &str, code: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: "verification_code".to_string(),
            payload_json: json!({ "email": to_email, "code": code }).to_string(),
        }
    }

    /// Approval or rejection outcome for a registration request.
    #[must_use]
    pub fn registration_result(
        to_email: &str,
        name: &str,
        approved: bool,
        reject_reason: Option<&str>,
    ) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: "registration_result".to_string(),
            payload_json: json!({
                "email": to_email,
                "name": name,
                "approved": approved,
                "reject_reason": reject_reason,
            })
            .to_string(),
        }
    }

    /// Password reset link.
    #[must_use]
    pub fn password_reset(to_email: &str, name: &str, reset_url: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: "password_reset".to_string(),
            payload_json: json!({ "email": to_email, "name": name, "reset_url": reset_url })
                .to_string(),
        }
    }
}

/// Email delivery abstraction used by the notifier task.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error. Retries are the sender's
    /// concern; the queue hands each message over exactly once.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

/// Cheap cloneable handle handlers use to enqueue notifications.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<EmailMessage>,
}

impl Notifier {
    /// Fire-and-forget enqueue. Never blocks; a full queue drops the
    /// message and logs a warning.
    pub fn dispatch(&self, message: EmailMessage) {
        if let Err(err) = self.tx.try_send(message) {
            warn!("dropping outbound notification: {err}");
        }
    }
}

/// Start the notifier task and return the enqueue handle.
#[must_use]
pub fn spawn_notifier(
    sender: Arc<dyn EmailSender>,
    queue_capacity: usize,
) -> (Notifier, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<EmailMessage>(queue_capacity.max(1));
    let handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(err) = sender.send(&message) {
                error!(
                    to_email = %message.to_email,
                    template = %message.template,
                    "failed to send notification: {err}"
                );
            }
        }
    });
    (Notifier { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::{spawn_notifier, EmailMessage, EmailSender};
    use anyhow::Result;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl EmailSender for RecordingSender {
        fn send(&self, message: &EmailMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatch_reaches_the_sender() {
        let sender = Arc::new(RecordingSender::default());
        let (notifier, _handle) = spawn_notifier(sender.clone(), 8);

        notifier.dispatch(EmailMessage::verification_code("a@x.com", "123456"));
        notifier.dispatch(EmailMessage::password_reset("b@x.com", "Bea", "https://x/r?token=t"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].template, "verification_code");
        assert_eq!(sent[1].to_email, "b@x.com");
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        struct BlackHole;
        impl EmailSender for BlackHole {
            fn send(&self, _message: &EmailMessage) -> Result<()> {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            }
        }

        let (notifier, _handle) = spawn_notifier(Arc::new(BlackHole), 1);
        // Enqueue far more than capacity; dispatch must return immediately.
        for _ in 0..16 {
            notifier.dispatch(EmailMessage::verification_code("a@x.com", "123456"));
        }
    }

    #[test]
    fn templates_carry_their_payload() {
        let message = EmailMessage::registration_result("a@x.com", "Ada", false, Some("duplicate"));
        assert_eq!(message.template, "registration_result");
        let payload: serde_json::Value = serde_json::from_str(&message.payload_json).unwrap();
        assert_eq!(payload["approved"], false);
        assert_eq!(payload["reject_reason"], "duplicate");
    }
}
