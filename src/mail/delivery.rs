use serde::Serialize;
use std::path::PathBuf;
use std::thread;

use crate::domain::credentials::{Credentials, Secret};
use crate::mail::api::ApiClient;
use crate::mail::smtp::SmtpSender;

/// A rendered application email. The attachment is referenced by path and
/// read again for every delivery attempt.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub subject: String,
    pub html: String,
    pub attachment_path: PathBuf,
    pub attachment_name: String,
}

/// Result of delivering to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub recipient: String,
    pub success: bool,
    pub message: String,
}

impl SendOutcome {
    pub fn sent(recipient: &str, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.to_string(),
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(recipient: &str, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.to_string(),
            success: false,
            message: message.into(),
        }
    }
}

/// Delivers one message to one recipient. Failures are returned as values.
pub trait MailSender: Send + Sync {
    fn send(&self, mail: &OutgoingMail, recipient: &str, creds: &Credentials) -> SendOutcome;
}

/// Routes API keys to the HTTP provider and passwords to SMTP.
pub struct Dispatcher {
    smtp: SmtpSender,
    api: ApiClient,
}

impl Dispatcher {
    pub fn new(smtp: SmtpSender, api: ApiClient) -> Self {
        Self { smtp, api }
    }
}

impl MailSender for Dispatcher {
    fn send(&self, mail: &OutgoingMail, recipient: &str, creds: &Credentials) -> SendOutcome {
        match &creds.secret {
            Secret::ApiKey(key) => self.api.send(mail, recipient, &creds.account, key),
            Secret::Password(password) => {
                self.smtp.send(mail, recipient, &creds.account, password)
            }
        }
    }
}

/// Send to every recipient concurrently and wait for all of them. Outcomes
/// come back in recipient order. A send that panics, or whose thread cannot
/// be started, counts as a failure.
pub fn send_all(
    sender: &dyn MailSender,
    mail: &OutgoingMail,
    recipients: &[String],
    creds: &Credentials,
) -> Vec<SendOutcome> {
    thread::scope(|s| {
        let handles: Vec<_> = recipients
            .iter()
            .map(|r| {
                let spawned = thread::Builder::new()
                    .name("mail-send".into())
                    .spawn_scoped(s, move || sender.send(mail, r, creds));
                (r, spawned)
            })
            .collect();

        handles
            .into_iter()
            .map(|(r, spawned)| match spawned {
                Ok(h) => h.join().unwrap_or_else(|_| {
                    log::error!("send thread for {r} panicked");
                    SendOutcome::failed(r, "Internal error while sending")
                }),
                Err(e) => {
                    log::error!("cannot start send thread for {r}: {e}");
                    SendOutcome::failed(r, "Internal error while sending")
                }
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FlakySender {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl MailSender for FlakySender {
        fn send(&self, _mail: &OutgoingMail, recipient: &str, _creds: &Credentials) -> SendOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(recipient.to_string());
            match recipient {
                "slow@co.com" => {
                    thread::sleep(Duration::from_millis(50));
                    SendOutcome::sent(recipient, "ok")
                }
                "boom@co.com" => panic!("transport exploded"),
                r if r.contains('@') => SendOutcome::sent(recipient, "ok"),
                r => SendOutcome::failed(r, format!("Invalid recipient address {r:?}")),
            }
        }
    }

    fn mail() -> OutgoingMail {
        OutgoingMail {
            subject: "s".into(),
            html: "<p>h</p>".into(),
            attachment_path: PathBuf::from("unused.pdf"),
            attachment_name: "x.pdf".into(),
        }
    }

    #[test]
    fn collects_every_outcome_in_order() {
        let sender = FlakySender {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        };
        let creds = Credentials::new("me@example.com", "pw", "SG.");
        let recipients: Vec<String> = ["slow@co.com", "bad", "a@co.com", "boom@co.com"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let out = send_all(&sender, &mail(), &recipients, &creds);

        assert_eq!(sender.calls.load(Ordering::SeqCst), 4);
        let names: Vec<&str> = out.iter().map(|o| o.recipient.as_str()).collect();
        assert_eq!(names, vec!["slow@co.com", "bad", "a@co.com", "boom@co.com"]);
        let ok: Vec<bool> = out.iter().map(|o| o.success).collect();
        assert_eq!(ok, vec![true, false, true, false]);
        assert!(out[1].message.contains("bad"));
        assert_eq!(out[3].message, "Internal error while sending");
    }

    #[test]
    fn empty_recipient_list_sends_nothing() {
        let sender = FlakySender {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        };
        let creds = Credentials::new("me@example.com", "pw", "SG.");
        assert!(send_all(&sender, &mail(), &[], &creds).is_empty());
        assert_eq!(sender.calls.load(Ordering::SeqCst), 0);
    }
}
