use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;

use crate::domain::credentials::{Credentials, Secret};
use crate::domain::email::ParsedEmail;
use crate::mail::mailbox::{list_senders, list_sent};
use crate::server::{AppState, Incoming, Reply};

const SENT_PAGE_SIZE: usize = 10;
const SENDERS_PAGE_SIZE: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct EmailsRequest {
    #[serde(alias = "smtpEmail")]
    pub account: Option<String>,
    #[serde(alias = "smtpPassword")]
    pub secret: Option<String>,
    pub page: Option<Value>,
    pub limit: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SentResponse {
    success: bool,
    page: usize,
    limit: usize,
    total: usize,
    total_pages: usize,
    count: usize,
    unique_senders: usize,
    senders: Vec<String>,
    emails: Vec<ParsedEmail>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendersResponse {
    success: bool,
    page: usize,
    limit: usize,
    total: usize,
    total_pages: usize,
    unique_senders: usize,
    senders: Vec<String>,
    execution_time: String,
}

/// Validated query: who to log in as and which page.
struct Query {
    creds: Credentials,
    page: usize,
    limit: usize,
}

pub fn sent(state: &AppState, req: &Incoming) -> Reply {
    let q = match query(state, req, SENT_PAGE_SIZE) {
        Ok(q) => q,
        Err(reply) => return reply,
    };
    log::info!(
        "listing sent mail for {} (page {}, limit {})",
        q.creds.account,
        q.page,
        q.limit
    );

    let result = open_and(state, &q, |folder| list_sent(folder, q.page, q.limit));
    match result {
        Ok(page) => to_reply(&SentResponse {
            success: true,
            page: q.page,
            limit: q.limit,
            total: page.total,
            total_pages: page.total.div_ceil(q.limit),
            count: page.emails.len(),
            unique_senders: page.senders.len(),
            senders: page.senders,
            emails: page.emails,
        }),
        Err(e) => failure("Failed to fetch emails", &e),
    }
}

pub fn senders(state: &AppState, req: &Incoming) -> Reply {
    let started = Instant::now();
    let q = match query(state, req, SENDERS_PAGE_SIZE) {
        Ok(q) => q,
        Err(reply) => return reply,
    };

    let result = open_and(state, &q, |folder| list_senders(folder, q.page, q.limit));
    match result {
        Ok(page) => {
            let elapsed = started.elapsed().as_secs_f64();
            log::info!(
                "collected {} recipients for {} in {elapsed:.2}s",
                page.senders.len(),
                q.creds.account
            );
            to_reply(&SendersResponse {
                success: true,
                page: q.page,
                limit: q.limit,
                total: page.total,
                total_pages: page.total.div_ceil(q.limit),
                unique_senders: page.senders.len(),
                senders: page.senders,
                execution_time: format!("{elapsed:.2}s"),
            })
        }
        Err(e) => failure("Failed to fetch senders list", &e),
    }
}

fn open_and<T>(
    state: &AppState,
    q: &Query,
    f: impl FnOnce(&mut dyn crate::mail::mailbox::SentFolder) -> Result<T>,
) -> Result<T> {
    let mut folder = state.mailbox.open_sent(&q.creds)?;
    f(folder.as_mut())
}

fn query(state: &AppState, req: &Incoming, default_limit: usize) -> Result<Query, Reply> {
    let body: EmailsRequest = if req.body.is_empty() {
        EmailsRequest::default()
    } else {
        serde_json::from_slice(&req.body)
            .map_err(|e| bad_request(&format!("Invalid JSON body: {e}")))?
    };

    let account = body.account.as_deref().map(str::trim).unwrap_or_default();
    let secret = body.secret.as_deref().map(str::trim).unwrap_or_default();
    if account.is_empty() || secret.is_empty() {
        return Err(bad_request("Email account and secret are required"));
    }

    let creds = Credentials::new(account, secret, &state.api_key_prefix);
    if matches!(creds.secret, Secret::ApiKey(_)) {
        return Err(bad_request(
            "An email API key cannot read a mailbox; use the account's app password",
        ));
    }

    Ok(Query {
        creds,
        page: positive(body.page.as_ref()).unwrap_or(1),
        limit: positive(body.limit.as_ref())
            .unwrap_or(default_limit)
            .min(state.max_page_size.max(1)),
    })
}

/// Reads a page number the way browsers submit them: a JSON number or a
/// string with leading digits. Anything below 1 counts as absent.
fn positive(v: Option<&Value>) -> Option<usize> {
    let n = match v? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 1.0).map(|f| f as u64))?,
        Value::String(s) => {
            let digits: String = s
                .trim_start()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse::<u64>().ok()?
        }
        _ => return None,
    };
    usize::try_from(n).ok().filter(|n| *n >= 1)
}

fn to_reply<T: Serialize>(body: &T) -> Reply {
    match serde_json::to_value(body) {
        Ok(v) => Reply::json(200, v),
        Err(e) => failure("Failed to encode response", &e.into()),
    }
}

fn bad_request(message: &str) -> Reply {
    Reply::json(400, json!({ "success": false, "message": message }))
}

fn failure(message: &str, e: &anyhow::Error) -> Reply {
    log::error!("{message}: {e:#}");
    Reply::json(
        500,
        json!({ "success": false, "message": message, "error": format!("{e:#}") }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_parse_leniently() {
        assert_eq!(positive(Some(&json!(3))), Some(3));
        assert_eq!(positive(Some(&json!("4"))), Some(4));
        assert_eq!(positive(Some(&json!(" 12abc"))), Some(12));
        assert_eq!(positive(Some(&json!(2.7))), Some(2));
        assert_eq!(positive(Some(&json!(0))), None);
        assert_eq!(positive(Some(&json!(-1))), None);
        assert_eq!(positive(Some(&json!("abc"))), None);
        assert_eq!(positive(Some(&json!(null))), None);
        assert_eq!(positive(None), None);
    }
}
