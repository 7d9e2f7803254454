use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;

use crate::domain::applicant::{NewApplicant, is_valid_email};
use crate::domain::credentials::Credentials;
use crate::error::{ApiError, ApiResult};
use crate::mail::delivery::{OutgoingMail, SendOutcome, send_all};
use crate::server::multipart::{is_multipart, parse_form};
use crate::server::{AppState, Incoming, Reply};

const DEFAULT_SUBJECT: &str = "Job Application";

/// Body of `POST /api/apply`, from JSON or form fields.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub cover_letter: Option<String>,
    pub email_subject: Option<String>,
    pub resume_base64: Option<String>,
    pub resume_file_name: Option<String>,
    #[serde(alias = "smtpEmail")]
    pub account: Option<String>,
    #[serde(alias = "smtpPassword")]
    pub secret: Option<String>,
    pub company_emails: Option<Value>,
    #[serde(skip)]
    pub upload: Option<Upload>,
}

/// A resume sent as a multipart file part.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Validated intake, ready to persist and send.
#[derive(Debug)]
struct Application {
    name: String,
    email: String,
    cover_letter: String,
    subject: String,
    creds: Credentials,
    recipients: Vec<String>,
}

pub fn handle(state: &AppState, req: &Incoming) -> Reply {
    match submit(state, req) {
        Ok(reply) => reply,
        Err(e) => e.into(),
    }
}

fn submit(state: &AppState, req: &Incoming) -> ApiResult<Reply> {
    let body = parse_body(req)?;
    let app = validate(&body, &state.api_key_prefix, state.max_recipients)?;
    let resume_path = store_resume(state, &body)?;

    let applicant = match state.repo.create(&NewApplicant {
        name: app.name.clone(),
        email: app.email.clone(),
        cover_letter: app.cover_letter.clone(),
        resume_path: resume_path.to_string_lossy().into_owned(),
    }) {
        Ok(a) => a,
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&resume_path) {
                log::debug!("cannot remove {}: {rm}", resume_path.display());
            }
            return Err(e.into());
        }
    };
    log::info!(
        "applicant {} stored, sending to {} recipient(s)",
        applicant.id,
        app.recipients.len()
    );

    let mail = OutgoingMail {
        subject: format!("{} - {}", app.subject, app.name),
        html: app.cover_letter.clone(),
        attachment_path: resume_path,
        attachment_name: format!("{}_resume.pdf", app.name),
    };
    let outcomes = send_all(state.sender.as_ref(), &mail, &app.recipients, &app.creds);

    let failed: Vec<&SendOutcome> = outcomes.iter().filter(|o| !o.success).collect();
    if failed.is_empty() {
        return Ok(Reply::json(
            200,
            json!({
                "message": "Application submitted successfully to all recipients",
                "applicantId": applicant.id,
            }),
        ));
    }

    log::warn!(
        "applicant {}: {} of {} sends failed",
        applicant.id,
        failed.len(),
        outcomes.len()
    );
    let errors: Vec<String> = failed
        .iter()
        .map(|o| format!("{}: {}", o.recipient, o.message))
        .collect();
    Ok(Reply::json(
        500,
        json!({
            "message": "Some emails failed to send",
            "errors": errors,
            "failed": failed,
            "applicantId": applicant.id,
        }),
    ))
}

fn parse_body(req: &Incoming) -> ApiResult<ApplyRequest> {
    let ct = req.content_type.as_deref();
    if is_multipart(ct) {
        return from_form(ct.unwrap_or_default(), &req.body);
    }
    if req.body.is_empty() {
        return Ok(ApplyRequest::default());
    }
    serde_json::from_slice(&req.body)
        .map_err(|e| ApiError::validation(format!("Invalid JSON body: {e}")))
}

fn from_form(content_type: &str, body: &[u8]) -> ApiResult<ApplyRequest> {
    let mut out = ApplyRequest::default();
    let mut recipients: Vec<Value> = Vec::new();

    for part in parse_form(content_type, body)? {
        if part.name == "resume" {
            if let Some(file_name) = part.filename.clone() {
                out.upload = Some(Upload {
                    file_name,
                    data: part.data,
                });
            }
            continue;
        }

        let value = part.text();
        match part.name.as_str() {
            "name" => out.name = Some(value),
            "email" => out.email = Some(value),
            "coverLetter" => out.cover_letter = Some(value),
            "emailSubject" => out.email_subject = Some(value),
            "resumeBase64" => out.resume_base64 = Some(value),
            "resumeFileName" => out.resume_file_name = Some(value),
            "account" | "smtpEmail" => out.account = Some(value),
            "secret" | "smtpPassword" => out.secret = Some(value),
            "companyEmails" | "companyEmails[]" => {
                // a single field may carry a JSON array
                match serde_json::from_str::<Value>(&value) {
                    Ok(Value::Array(items)) => recipients.extend(items),
                    _ => recipients.push(Value::String(value)),
                }
            }
            other => log::debug!("ignoring form field {other:?}"),
        }
    }

    if !recipients.is_empty() {
        out.company_emails = Some(Value::Array(recipients));
    }
    Ok(out)
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn validate(
    req: &ApplyRequest,
    api_key_prefix: &str,
    max_recipients: usize,
) -> ApiResult<Application> {
    let (Some(name), Some(email), Some(cover_letter)) = (
        present(&req.name),
        present(&req.email),
        present(&req.cover_letter),
    ) else {
        return Err(ApiError::validation(
            "Name, email, and cover letter are required",
        ));
    };
    if !is_valid_email(email) {
        return Err(ApiError::validation("Please provide a valid email address"));
    }

    let (Some(account), Some(secret)) = (present(&req.account), present(&req.secret)) else {
        return Err(ApiError::validation("Email account and secret are required"));
    };

    let recipients = recipients(req.company_emails.as_ref())?;
    if recipients.len() > max_recipients {
        return Err(ApiError::validation(format!(
            "Too many company emails (at most {max_recipients} per application)"
        )));
    }

    Ok(Application {
        name: name.to_string(),
        email: email.to_string(),
        cover_letter: cover_letter.to_string(),
        subject: present(&req.email_subject)
            .unwrap_or(DEFAULT_SUBJECT)
            .to_string(),
        creds: Credentials::new(account, secret, api_key_prefix),
        recipients,
    })
}

fn recipients(v: Option<&Value>) -> ApiResult<Vec<String>> {
    let missing = || ApiError::validation("At least one company email is required");
    let Some(Value::Array(items)) = v else {
        return Err(missing());
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Value::String(s) = item else {
            return Err(ApiError::validation(
                "companyEmails must be a list of email addresses",
            ));
        };
        let s = s.trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
    }
    if out.is_empty() {
        return Err(missing());
    }
    Ok(out)
}

/// Validate and write the resume; nothing is persisted or sent before this
/// succeeds.
fn store_resume(state: &AppState, req: &ApplyRequest) -> ApiResult<PathBuf> {
    let resumes = &state.resumes;

    if let (Some(payload), Some(file_name)) = (
        present(&req.resume_base64),
        present(&req.resume_file_name),
    ) {
        let bytes = resumes.decode_base64(payload)?;
        resumes.validate(&bytes)?;
        return Ok(resumes.save(file_name, &bytes)?);
    }

    if let Some(upload) = &req.upload {
        resumes.check_extension(&upload.file_name)?;
        resumes.validate(&upload.data)?;
        return Ok(resumes.save(&upload.file_name, &upload.data)?);
    }

    Err(ApiError::validation("Resume file is required"))
}
