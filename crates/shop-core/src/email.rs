//! # Email Collaborator
//!
//! Outbound mail goes through [`EmailSender`]. The bundled [`MemoryOutbox`]
//! keeps the most recent messages and logs each one, which is what
//! development and tests use.

use crate::error::{ShopError, ShopResult};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Messages a [`MemoryOutbox`] retains by default
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1000;

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html_body: html_body.into(),
        }
    }

    pub fn confirm_email(to: impl Into<String>, link: &str) -> Self {
        Self::new(
            to,
            "Book Store - Confirm Your Email!",
            format!("<h1>Confirm Your Email By Clicking <a href='{link}'>Here</a></h1>"),
        )
    }

    pub fn password_reset_code(to: impl Into<String>, code: &str) -> Self {
        Self::new(
            to,
            "Book Store - Reset Your Password",
            format!("<h1>Use This OTP: {code} To Reset Your Account. Don't share it.</h1>"),
        )
    }

    pub fn resent_code(to: impl Into<String>, code: &str) -> Self {
        Self::new(
            to,
            "Your OTP Code",
            format!("<h2>Your new OTP code is: <strong>{code}</strong></h2>"),
        )
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> ShopResult<()>;
}

/// Type alias for a shared email sender (dynamic dispatch)
pub type BoxedEmailSender = Arc<dyn EmailSender>;

/// Email sender that records messages instead of delivering them.
/// Once `capacity` messages are held the oldest is dropped.
#[derive(Debug, Clone)]
pub struct MemoryOutbox {
    sent: Arc<Mutex<VecDeque<EmailMessage>>>,
    capacity: usize,
}

impl Default for MemoryOutbox {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sent: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Retained messages, oldest first
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recent message addressed to `to`
    pub fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.messages().into_iter().rev().find(|m| m.to == to)
    }
}

#[async_trait]
impl EmailSender for MemoryOutbox {
    async fn send(&self, message: EmailMessage) -> ShopResult<()> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| ShopError::Internal("outbox lock poisoned".to_string()))?;
        if sent.len() >= self.capacity {
            sent.pop_front();
        }
        info!(to = %message.to, subject = %message.subject, "email queued");
        sent.push_back(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outbox_records_messages() {
        let outbox = MemoryOutbox::new();
        outbox
            .send(EmailMessage::password_reset_code("a@example.com", "1234"))
            .await
            .unwrap();
        outbox
            .send(EmailMessage::resent_code("a@example.com", "5678"))
            .await
            .unwrap();

        assert_eq!(outbox.messages().len(), 2);
        let last = outbox.last_to("a@example.com").unwrap();
        assert_eq!(last.subject, "Your OTP Code");
        assert!(last.html_body.contains("5678"));
    }

    #[tokio::test]
    async fn test_outbox_drops_oldest_beyond_capacity() {
        let outbox = MemoryOutbox::with_capacity(3);
        for n in 0..5 {
            outbox
                .send(EmailMessage::resent_code(format!("u{n}@example.com"), "1234"))
                .await
                .unwrap();
        }

        let to: Vec<_> = outbox.messages().into_iter().map(|m| m.to).collect();
        assert_eq!(to, ["u2@example.com", "u3@example.com", "u4@example.com"]);
        assert!(outbox.last_to("u0@example.com").is_none());
        assert!(outbox.last_to("u4@example.com").is_some());
    }

    #[tokio::test]
    async fn test_poisoned_outbox_reports_failure() {
        let outbox = MemoryOutbox::new();
        let sent = outbox.sent.clone();
        let _ = std::thread::spawn(move || {
            let _held = sent.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(
            outbox
                .send(EmailMessage::resent_code("a@example.com", "1234"))
                .await,
            Err(ShopError::Internal(_))
        ));
    }
}
