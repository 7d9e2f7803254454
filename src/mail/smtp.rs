use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use std::fmt;
use std::time::Duration;

use crate::mail::decoders::html_to_text;
use crate::mail::delivery::{OutgoingMail, SendOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (SMTPS).
    Implicit,
    /// Plain connect, STARTTLS required.
    StartTls,
    /// STARTTLS if offered, plaintext otherwise.
    Opportunistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub port: u16,
    pub mode: TlsMode,
    pub label: &'static str,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} port {}", self.label, self.port)
    }
}

/// Tried in order; the first success wins.
pub const DEFAULT_ROUTES: [Route; 3] = [
    Route {
        port: 465,
        mode: TlsMode::Implicit,
        label: "SMTPS",
    },
    Route {
        port: 587,
        mode: TlsMode::StartTls,
        label: "submission",
    },
    Route {
        port: 25,
        mode: TlsMode::Opportunistic,
        label: "relay",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Refused, unreachable, TLS failure, timeout or a transient reply.
    /// The next route may still work.
    Unreachable(String),
    /// The server rejected the credentials.
    Auth(String),
    /// The server permanently rejected the message.
    Rejected(String),
    /// The message could not be built (bad address, unreadable resume).
    Message(String),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::Unreachable(_))
    }
}

impl From<lettre::transport::smtp::Error> for AttemptError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        if e.is_timeout() {
            return AttemptError::Unreachable(format!("connection timeout: {e}"));
        }
        if e.is_permanent() {
            let code = e.status().map(|c| c.to_string()).unwrap_or_default();
            if matches!(code.as_str(), "530" | "534" | "535") {
                return AttemptError::Auth(e.to_string());
            }
            return AttemptError::Rejected(e.to_string());
        }
        AttemptError::Unreachable(e.to_string())
    }
}

/// One delivery attempt over one route.
pub trait Relay: Send + Sync {
    fn attempt(
        &self,
        route: &Route,
        user: &str,
        password: &str,
        message: &Message,
    ) -> Result<(), AttemptError>;
}

/// Blocking lettre transport, rebuilt for every attempt.
pub struct LettreRelay {
    pub host: String,
    pub timeout: Duration,
}

impl LettreRelay {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }
}

impl Relay for LettreRelay {
    fn attempt(
        &self,
        route: &Route,
        user: &str,
        password: &str,
        message: &Message,
    ) -> Result<(), AttemptError> {
        let params = TlsParameters::new(self.host.clone())?;
        let tls = match route.mode {
            TlsMode::Implicit => Tls::Wrapper(params),
            TlsMode::StartTls => Tls::Required(params),
            TlsMode::Opportunistic => Tls::Opportunistic(params),
        };

        let transport = SmtpTransport::builder_dangerous(self.host.as_str())
            .port(route.port)
            .tls(tls)
            .credentials(SmtpCredentials::new(user.to_string(), password.to_string()))
            .timeout(Some(self.timeout))
            .build();

        transport.send(message)?;
        Ok(())
    }
}

/// Build the outgoing MIME message, reading the resume from disk.
pub fn build_message(mail: &OutgoingMail, from: &str, to: &str) -> Result<Message, AttemptError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| AttemptError::Message(format!("Invalid sender address {from:?}: {e}")))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| AttemptError::Message(format!("Invalid recipient address {to:?}: {e}")))?;

    let pdf = std::fs::read(&mail.attachment_path).map_err(|e| {
        AttemptError::Message(format!(
            "Cannot read resume {}: {e}",
            mail.attachment_path.display()
        ))
    })?;
    let pdf_type = ContentType::parse("application/pdf")
        .map_err(|e| AttemptError::Message(e.to_string()))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.as_str())
        .multipart(
            MultiPart::mixed()
                .multipart(MultiPart::alternative_plain_html(
                    html_to_text(&mail.html),
                    mail.html.clone(),
                ))
                .singlepart(Attachment::new(mail.attachment_name.clone()).body(pdf, pdf_type)),
        )
        .map_err(|e| AttemptError::Message(format!("Failed to build email: {e}")))
}

/// SMTP delivery walking an ordered route table.
pub struct SmtpSender {
    relay: Box<dyn Relay>,
    routes: Vec<Route>,
    api_key_prefix: String,
}

impl SmtpSender {
    pub fn new(relay: Box<dyn Relay>, api_key_prefix: impl Into<String>) -> Self {
        Self::with_routes(relay, DEFAULT_ROUTES.to_vec(), api_key_prefix)
    }

    pub fn with_routes(
        relay: Box<dyn Relay>,
        routes: Vec<Route>,
        api_key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            relay,
            routes,
            api_key_prefix: api_key_prefix.into(),
        }
    }

    pub fn send(
        &self,
        mail: &OutgoingMail,
        recipient: &str,
        account: &str,
        password: &str,
    ) -> SendOutcome {
        let mut failures = Vec::new();

        for route in &self.routes {
            // rebuilt each time so the resume is re-read per attempt
            let message = match build_message(mail, account, recipient) {
                Ok(m) => m,
                Err(e) => return SendOutcome::failed(recipient, describe(&e)),
            };

            match self.relay.attempt(route, account, password, &message) {
                Ok(()) => {
                    log::info!("sent to {recipient} via {route}");
                    return SendOutcome::sent(
                        recipient,
                        format!("Email sent successfully via {route}"),
                    );
                }
                Err(e) if e.is_retryable() => {
                    log::warn!("{route} failed for {recipient}: {}", describe(&e));
                    failures.push(format!("{route}: {}", describe(&e)));
                }
                Err(e) => {
                    log::warn!("{route} rejected {recipient}: {}", describe(&e));
                    return SendOutcome::failed(recipient, describe(&e));
                }
            }
        }

        SendOutcome::failed(
            recipient,
            format!(
                "All SMTP connection attempts failed ({}). Outbound SMTP may be blocked on this \
                 server; use an email API key (starting with {:?}) instead of a password.",
                failures.join("; "),
                self.api_key_prefix
            ),
        )
    }
}

fn describe(e: &AttemptError) -> String {
    match e {
        AttemptError::Unreachable(d) => d.clone(),
        AttemptError::Auth(d) => {
            format!("Authentication failed - Check your email and app password ({d})")
        }
        AttemptError::Rejected(d) => format!("Message rejected by SMTP server: {d}"),
        AttemptError::Message(d) => d.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Relay answering from a script, recording the ports it was asked for.
    struct ScriptedRelay {
        script: Mutex<Vec<Result<(), AttemptError>>>,
        ports: Arc<Mutex<Vec<u16>>>,
    }

    impl ScriptedRelay {
        fn new(script: Vec<Result<(), AttemptError>>) -> (Self, Arc<Mutex<Vec<u16>>>) {
            let ports = Arc::new(Mutex::new(Vec::new()));
            let relay = ScriptedRelay {
                script: Mutex::new(script.into_iter().rev().collect()),
                ports: ports.clone(),
            };
            (relay, ports)
        }
    }

    impl Relay for ScriptedRelay {
        fn attempt(
            &self,
            route: &Route,
            _user: &str,
            _password: &str,
            _message: &Message,
        ) -> Result<(), AttemptError> {
            self.ports.lock().unwrap().push(route.port);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(AttemptError::Unreachable("script exhausted".into())))
        }
    }

    fn mail(dir: &tempfile::TempDir) -> OutgoingMail {
        let path = dir.path().join("resume.pdf");
        std::fs::write(&path, b"%PDF-1.4 test").unwrap();
        OutgoingMail {
            subject: "Backend role - Jane".into(),
            html: "<p>Hello</p>".into(),
            attachment_path: path,
            attachment_name: "Jane_resume.pdf".into(),
        }
    }

    fn unreachable() -> Result<(), AttemptError> {
        Err(AttemptError::Unreachable("connection refused".into()))
    }

    #[test]
    fn first_route_success_stops() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, ports) = ScriptedRelay::new(vec![Ok(())]);
        let sender = SmtpSender::new(Box::new(relay), "SG.");

        let out = sender.send(&mail(&dir), "hr@acme.com", "me@example.com", "pw");
        assert!(out.success, "{}", out.message);
        assert_eq!(*ports.lock().unwrap(), vec![465]);
    }

    #[test]
    fn falls_back_in_table_order() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, ports) = ScriptedRelay::new(vec![unreachable(), unreachable(), Ok(())]);
        let sender = SmtpSender::new(Box::new(relay), "SG.");

        let out = sender.send(&mail(&dir), "hr@acme.com", "me@example.com", "pw");
        assert!(out.success);
        assert!(out.message.contains("port 25"));
        assert_eq!(*ports.lock().unwrap(), vec![465, 587, 25]);
    }

    #[test]
    fn exhausted_routes_advise_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, ports) = ScriptedRelay::new(vec![unreachable(), unreachable(), unreachable()]);
        let sender = SmtpSender::new(Box::new(relay), "SG.");

        let out = sender.send(&mail(&dir), "hr@acme.com", "me@example.com", "pw");
        assert!(!out.success);
        assert_eq!(out.recipient, "hr@acme.com");
        assert!(out.message.contains("API key"));
        assert!(out.message.contains("\"SG.\""));
        assert_eq!(ports.lock().unwrap().len(), 3);
    }

    #[test]
    fn auth_failure_does_not_try_other_ports() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, ports) = ScriptedRelay::new(vec![Err(AttemptError::Auth(
            "535 bad credentials".into(),
        ))]);
        let sender = SmtpSender::new(Box::new(relay), "SG.");

        let out = sender.send(&mail(&dir), "hr@acme.com", "me@example.com", "pw");
        assert!(!out.success);
        assert!(out.message.starts_with("Authentication failed"));
        assert_eq!(*ports.lock().unwrap(), vec![465]);
    }

    #[test]
    fn invalid_recipient_fails_without_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, ports) = ScriptedRelay::new(vec![Ok(())]);
        let sender = SmtpSender::new(Box::new(relay), "SG.");

        let out = sender.send(&mail(&dir), "bad", "me@example.com", "pw");
        assert!(!out.success);
        assert!(out.message.contains("bad"));
        assert!(ports.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_resume_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = mail(&dir);
        m.attachment_path = PathBuf::from("/nonexistent/resume.pdf");
        let (relay, _) = ScriptedRelay::new(vec![Ok(())]);
        let sender = SmtpSender::new(Box::new(relay), "SG.");

        let out = sender.send(&m, "hr@acme.com", "me@example.com", "pw");
        assert!(!out.success);
        assert!(out.message.starts_with("Cannot read resume"));
    }

    #[test]
    fn built_message_carries_subject_and_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let msg = build_message(&mail(&dir), "me@example.com", "hr@acme.com").unwrap();
        let raw = String::from_utf8_lossy(&msg.formatted()).into_owned();
        assert!(raw.contains("Subject: Backend role - Jane"));
        assert!(raw.contains("Jane_resume.pdf"));
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("text/html"));
    }
}
