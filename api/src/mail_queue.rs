//! In-memory outbox for parent emails.
//!
//! Handlers push messages and return immediately. A worker thread owns the
//! mail client and drains the queue, so a slow or failing provider never
//! holds up a request.

use school_common::config::MailSettings;
use school_common::email::Mailer;
use school_common::notifications::ParentEmail;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

#[derive(Default)]
struct Outbox {
    messages: Mutex<VecDeque<ParentEmail>>,
    ready: Condvar,
}

/// Thread-safe queue of parent emails waiting to be sent.
#[derive(Clone, Default)]
pub struct MailQueue {
    outbox: Arc<Outbox>,
}

impl MailQueue {
    /// Create the queue and start the worker that sends its messages.
    pub fn start(settings: MailSettings) -> Self {
        let queue = MailQueue::default();
        if !settings.is_enabled() {
            tracing::warn!("SENDGRID_API_KEY is not set, parent emails will be dropped");
        }

        let worker = queue.clone();
        let spawned = thread::Builder::new()
            .name("mail-outbox".to_string())
            .spawn(move || worker.run(settings));
        if let Err(e) = spawned {
            tracing::error!(error = %e, "Failed to start the mail worker");
        }
        queue
    }

    pub fn enqueue(&self, message: ParentEmail) {
        let mut messages = self
            .outbox
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        messages.push_back(message);
        tracing::debug!(queue_size = messages.len(), "Queued parent email");
        self.outbox.ready.notify_one();
    }

    pub fn enqueue_all(&self, messages: impl IntoIterator<Item = ParentEmail>) {
        for message in messages {
            self.enqueue(message);
        }
    }

    /// Number of messages waiting to be sent.
    pub fn pending(&self) -> usize {
        self.outbox
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Block until a message is available and take it.
    fn next(&self) -> ParentEmail {
        let mut messages = self
            .outbox
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(message) = messages.pop_front() {
                return message;
            }
            messages = self
                .outbox
                .ready
                .wait(messages)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn run(&self, settings: MailSettings) {
        let mailer = match Mailer::new(settings) {
            Ok(mailer) => mailer,
            Err(e) => {
                tracing::error!(error = %e, "Mail worker stopped");
                return;
            }
        };
        loop {
            let message = self.next();
            if let Err(e) = mailer.send(&message) {
                tracing::warn!(error = %e, to = %message.to, "Dropping parent email");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> ParentEmail {
        ParentEmail {
            to: to.to_string(),
            subject: "Homework".to_string(),
            html: "<p>hi</p>".to_string(),
        }
    }

    #[test_log::test]
    fn test_queue_is_fifo() {
        let queue = MailQueue::default();
        queue.enqueue_all([message("a@example.com"), message("b@example.com")]);
        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.next().to, "a@example.com");
        assert_eq!(queue.next().to, "b@example.com");
        assert_eq!(queue.pending(), 0);
    }

    #[test_log::test]
    fn test_clones_share_the_outbox() {
        let queue = MailQueue::default();
        let handle = queue.clone();
        handle.enqueue(message("parent@example.com"));
        assert_eq!(queue.pending(), 1);
    }
}
