pub mod apply;
pub mod emails;
pub mod multipart;
pub mod routes;

use anyhow::{Result, anyhow};
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tiny_http::{Header, Method, Request, Response, Server};

use crate::config::Settings;
use crate::error::ApiError;
use crate::mail::api::ApiClient;
use crate::mail::delivery::{Dispatcher, MailSender};
use crate::mail::imap_client::ImapClient;
use crate::mail::mailbox::MailboxConnector;
use crate::mail::smtp::{LettreRelay, SmtpSender};
use crate::store::repo::ApplicantRepository;
use crate::store::sqlite::SqliteRepo;
use crate::store::uploads::ResumeStore;

/// Everything a request handler needs. Collaborators sit behind traits so
/// they can be swapped out.
pub struct AppState {
    pub repo: Arc<dyn ApplicantRepository>,
    pub sender: Arc<dyn MailSender>,
    pub mailbox: Arc<dyn MailboxConnector>,
    pub resumes: ResumeStore,
    pub api_key_prefix: String,
    pub max_page_size: usize,
    pub max_recipients: usize,
    pub started: Instant,
}

impl AppState {
    /// Wire the production collaborators from settings.
    pub fn from_settings(s: &Settings) -> Result<Self> {
        let repo = SqliteRepo::open(&s.db_path)?;
        let smtp = SmtpSender::new(
            Box::new(LettreRelay::new(s.smtp_host.clone(), s.attempt_timeout)),
            s.api_key_prefix.clone(),
        );
        let api = ApiClient::new(&s.api_base_url, s.attempt_timeout * 3)?;
        let imap = ImapClient::new(s.imap_host.clone(), s.imap_port, s.sent_folder.clone())
            .with_timeouts(s.attempt_timeout, s.attempt_timeout * 6);

        Ok(Self {
            repo: Arc::new(repo),
            sender: Arc::new(Dispatcher::new(smtp, api)),
            mailbox: Arc::new(imap),
            resumes: ResumeStore::new(s.upload_dir.clone(), s.max_resume_bytes),
            api_key_prefix: s.api_key_prefix.clone(),
            max_page_size: s.max_page_size,
            max_recipients: s.max_recipients,
            started: Instant::now(),
        })
    }

    /// Largest accepted request body: a base64-encoded resume plus the form.
    pub fn max_body_bytes(&self) -> u64 {
        self.resumes.max_bytes() / 3 * 4 + 4 + 1024 * 1024
    }
}

/// A fully read request, detached from the socket.
#[derive(Debug)]
pub struct Incoming {
    pub method: Method,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Status plus JSON body.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }
}

impl From<ApiError> for Reply {
    fn from(e: ApiError) -> Self {
        if let ApiError::Internal(inner) = &e {
            log::error!("internal error: {inner:#}");
        }
        Reply::json(e.status(), e.body())
    }
}

/// Stops the worker pool.
#[derive(Clone)]
pub struct ShutdownHandle {
    http: Arc<Server>,
    stopping: Arc<AtomicBool>,
    workers: usize,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        for _ in 0..self.workers {
            self.http.unblock();
        }
    }
}

pub struct ApiServer {
    http: Arc<Server>,
    state: Arc<AppState>,
    workers: usize,
    stopping: Arc<AtomicBool>,
}

impl ApiServer {
    pub fn bind(addr: &str, state: AppState, workers: usize) -> Result<Self> {
        let http = Server::http(addr).map_err(|e| anyhow!("cannot listen on {addr}: {e}"))?;
        Ok(Self {
            http: Arc::new(http),
            state: Arc::new(state),
            workers: workers.max(1),
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> String {
        self.http.server_addr().to_string()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            http: self.http.clone(),
            stopping: self.stopping.clone(),
            workers: self.workers,
        }
    }

    /// Serve until shut down. Each worker handles one request at a time.
    pub fn run(self) -> Result<()> {
        log::info!(
            "listening on http://{} with {} workers",
            self.local_addr(),
            self.workers
        );

        let handles: Vec<_> = (0..self.workers)
            .map(|i| {
                let http = self.http.clone();
                let state = self.state.clone();
                let stopping = self.stopping.clone();
                thread::Builder::new()
                    .name(format!("http-worker-{i}"))
                    .spawn(move || worker_loop(&http, &state, &stopping))
            })
            .collect::<std::io::Result<_>>()?;

        for h in handles {
            if h.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
        log::info!("server stopped");
        Ok(())
    }
}

fn worker_loop(http: &Server, state: &AppState, stopping: &AtomicBool) {
    loop {
        match http.recv() {
            Ok(req) => handle_request(state, req),
            Err(_) if stopping.load(Ordering::SeqCst) => break,
            Err(e) => {
                log::warn!("accept error: {e}");
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn header_value(req: &Request, name: &'static str) -> Option<String> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_string())
}

fn read_body(req: &mut Request, limit: u64) -> Result<Vec<u8>, ApiError> {
    if req.body_length().is_some_and(|n| n as u64 > limit) {
        return Err(ApiError::PayloadTooLarge { limit });
    }
    let mut body = Vec::new();
    req.as_reader()
        .take(limit + 1)
        .read_to_end(&mut body)
        .map_err(|e| ApiError::Internal(anyhow!("cannot read request body: {e}")))?;
    if body.len() as u64 > limit {
        return Err(ApiError::PayloadTooLarge { limit });
    }
    Ok(body)
}

fn handle_request(state: &AppState, mut req: Request) {
    let started = Instant::now();
    let method = req.method().clone();
    let url = req.url().to_string();
    let path = url.split('?').next().unwrap_or("").to_string();

    let reply = match read_body(&mut req, state.max_body_bytes()) {
        Ok(body) => {
            let incoming = Incoming {
                method: method.clone(),
                path: path.clone(),
                content_type: header_value(&req, "Content-Type"),
                body,
            };
            // a panicking handler must not take the worker down with it
            panic::catch_unwind(AssertUnwindSafe(|| routes::dispatch(state, &incoming)))
                .unwrap_or_else(|_| {
                    log::error!("handler for {method} {path} panicked");
                    Reply::json(500, serde_json::json!({ "message": "Server error" }))
                })
        }
        Err(e) => Reply::from(e),
    };

    log::info!(
        "{method} {path} -> {} in {}ms",
        reply.status,
        started.elapsed().as_millis()
    );

    if let Err(e) = req.respond(to_response(&reply)) {
        log::warn!("failed to write response for {path}: {e}");
    }
}

fn to_response(reply: &Reply) -> Response<std::io::Cursor<Vec<u8>>> {
    let body = serde_json::to_vec(&reply.body).unwrap_or_else(|_| b"{}".to_vec());
    let mut resp = Response::from_data(body).with_status_code(reply.status);
    if let Ok(h) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        resp.add_header(h);
    }
    resp
}
