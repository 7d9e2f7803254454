use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::mail::delivery::{OutgoingMail, SendOutcome};

/// Client for the HTTPS email API, used when the caller's secret is an API
/// key. One request per recipient, no retry.
pub struct ApiClient {
    http: Client,
    endpoint: Url,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    attachments: Vec<ApiAttachment<'a>>,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct ApiAttachment<'a> {
    content: String,
    filename: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    disposition: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    message: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("invalid API base URL {base_url:?}"))?;
        // keep any path prefix of the base
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("v3/mail/send")?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn send(
        &self,
        mail: &OutgoingMail,
        recipient: &str,
        account: &str,
        api_key: &str,
    ) -> SendOutcome {
        match self.post(mail, recipient, account, api_key) {
            Ok(()) => {
                log::info!("sent to {recipient} via email API");
                SendOutcome::sent(recipient, "Email sent successfully via email API")
            }
            Err(e) => {
                log::warn!("email API failed for {recipient}: {e:#}");
                SendOutcome::failed(recipient, format!("{e:#}"))
            }
        }
    }

    fn post(&self, mail: &OutgoingMail, recipient: &str, account: &str, api_key: &str) -> Result<()> {
        let pdf = std::fs::read(&mail.attachment_path)
            .with_context(|| format!("Cannot read resume {}", mail.attachment_path.display()))?;

        let body = SendRequest {
            personalizations: vec![Personalization {
                to: vec![Address { email: recipient }],
            }],
            from: Address { email: account },
            subject: &mail.subject,
            content: vec![Content {
                kind: "text/html",
                value: &mail.html,
            }],
            attachments: vec![ApiAttachment {
                content: general_purpose::STANDARD.encode(&pdf),
                filename: &mail.attachment_name,
                kind: "application/pdf",
                disposition: "attachment",
            }],
        };

        let resp = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .context("Email API request failed")?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let text = resp.text().unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .map(|b| {
                b.errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|s| !s.is_empty())
            .unwrap_or(text);
        anyhow::bail!("Email API rejected the request ({status}): {detail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;

    /// Serve one request with `status` / `body`, handing back what was received.
    fn one_shot(
        status: u16,
        body: &'static str,
    ) -> (String, thread::JoinHandle<(String, Option<String>, String)>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr());
        let handle = thread::spawn(move || {
            let mut req = server.recv().unwrap();
            let auth = req
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.as_str().to_string());
            let mut received = String::new();
            req.as_reader().read_to_string(&mut received).unwrap();
            let url = req.url().to_string();
            req.respond(tiny_http::Response::from_string(body).with_status_code(status))
                .unwrap();
            (url, auth, received)
        });
        (base, handle)
    }

    fn mail(dir: &tempfile::TempDir) -> OutgoingMail {
        let path = dir.path().join("r.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();
        OutgoingMail {
            subject: "Role - Jane".into(),
            html: "<p>Hi</p>".into(),
            attachment_path: path,
            attachment_name: "Jane_resume.pdf".into(),
        }
    }

    #[test]
    fn posts_payload_with_bearer_key() {
        let dir = tempfile::tempdir().unwrap();
        let (base, handle) = one_shot(202, "");
        let client = ApiClient::new(&base, Duration::from_secs(5)).unwrap();

        let out = client.send(&mail(&dir), "hr@acme.com", "me@example.com", "SG.key");
        let (url, auth, body) = handle.join().unwrap();

        assert!(out.success, "{}", out.message);
        assert_eq!(url, "/v3/mail/send");
        assert_eq!(auth.as_deref(), Some("Bearer SG.key"));

        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["personalizations"][0]["to"][0]["email"], "hr@acme.com");
        assert_eq!(v["from"]["email"], "me@example.com");
        assert_eq!(v["subject"], "Role - Jane");
        assert_eq!(v["content"][0]["type"], "text/html");
        assert_eq!(v["attachments"][0]["content"], "JVBERi0xLjc=");
        assert_eq!(v["attachments"][0]["filename"], "Jane_resume.pdf");
    }

    #[test]
    fn provider_error_is_single_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (base, handle) = one_shot(401, r#"{"errors":[{"message":"invalid key"}]}"#);
        let client = ApiClient::new(&base, Duration::from_secs(5)).unwrap();

        let out = client.send(&mail(&dir), "hr@acme.com", "me@example.com", "SG.bad");
        handle.join().unwrap();

        assert!(!out.success);
        assert!(out.message.contains("401"));
        assert!(out.message.contains("invalid key"));
    }

    #[test]
    fn unreadable_resume_never_calls_provider() {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let m = OutgoingMail {
            subject: "s".into(),
            html: "h".into(),
            attachment_path: PathBuf::from("/nonexistent/r.pdf"),
            attachment_name: "r.pdf".into(),
        };
        let out = client.send(&m, "hr@acme.com", "me@example.com", "SG.k");
        assert!(!out.success);
        assert!(out.message.starts_with("Cannot read resume"));
    }

    #[test]
    fn endpoint_joins_base() {
        let client = ApiClient::new("https://api.sendgrid.com", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://api.sendgrid.com/v3/mail/send"
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        for base in ["https://relay.example/sendgrid", "https://relay.example/sendgrid/"] {
            let client = ApiClient::new(base, Duration::from_secs(1)).unwrap();
            assert_eq!(
                client.endpoint().as_str(),
                "https://relay.example/sendgrid/v3/mail/send"
            );
        }
    }
}
