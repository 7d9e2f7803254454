use anyhow::{Context, Result, anyhow};
use native_tls::{TlsConnector, TlsStream};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::domain::credentials::{Credentials, Secret};
use crate::domain::email::EmailId;
use crate::mail::mailbox::{MailboxConnector, SentFolder};

type TlsSession = imap::Session<TlsStream<TcpStream>>;

/// IMAP over implicit TLS with plain LOGIN. A fresh connection per call.
pub struct ImapClient {
    pub server: String,
    pub port: u16,
    pub sent_folder: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl ImapClient {
    pub fn new(server: impl Into<String>, port: u16, sent_folder: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            sent_folder: sent_folder.into(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    fn connect_and_login(&self, user: &str, password: &str) -> Result<TlsSession> {
        let addr = (self.server.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("cannot resolve {}", self.server))?
            .next()
            .ok_or_else(|| anyhow!("no address for {}", self.server))?;

        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .with_context(|| format!("cannot connect to {}:{}", self.server, self.port))?;
        tcp.set_read_timeout(Some(self.read_timeout))?;
        tcp.set_write_timeout(Some(self.read_timeout))?;

        let tls = TlsConnector::builder().build()?;
        let stream = tls
            .connect(self.server.as_str(), tcp)
            .map_err(|e| anyhow!("TLS handshake with {} failed: {e}", self.server))?;

        let mut client = imap::Client::new(stream);
        client.read_greeting()?;

        client
            .login(user, password)
            .map_err(|(e, _client)| anyhow!("IMAP login failed for {user}: {e}"))
    }
}

impl MailboxConnector for ImapClient {
    fn open_sent(&self, creds: &Credentials) -> Result<Box<dyn SentFolder>> {
        let password = match &creds.secret {
            Secret::Password(p) => p,
            Secret::ApiKey(_) => return Err(anyhow!("an API key cannot open a mailbox")),
        };

        log::debug!("connecting to {}:{}", self.server, self.port);
        let mut session = self.connect_and_login(&creds.account, password)?;

        // EXAMINE keeps the folder read-only (no \Seen side effects)
        let mailbox = session
            .examine(&self.sent_folder)
            .with_context(|| format!("cannot open folder {:?}", self.sent_folder))?;
        log::debug!("{} has {} messages", self.sent_folder, mailbox.exists);

        Ok(Box::new(ImapSentFolder { session }))
    }
}

struct ImapSentFolder {
    session: TlsSession,
}

impl SentFolder for ImapSentFolder {
    fn search_all(&mut self) -> Result<Vec<EmailId>> {
        let found = self.session.search("ALL").context("SEARCH failed")?;
        Ok(found.into_iter().collect())
    }

    fn fetch_raw(&mut self, ids: &[EmailId]) -> Result<Vec<(EmailId, Vec<u8>)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let set = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        // returns once the tagged completion arrives, so every message of the
        // batch is already here
        let fetches = self
            .session
            .fetch(set, "BODY.PEEK[]")
            .context("FETCH failed")?;

        let mut out = Vec::with_capacity(fetches.len());
        for f in fetches.iter() {
            match f.body() {
                Some(body) => out.push((f.message, body.to_vec())),
                None => log::debug!("message {} came back without a body", f.message),
            }
        }
        Ok(out)
    }
}

impl Drop for ImapSentFolder {
    fn drop(&mut self) {
        if let Err(e) = self.session.logout() {
            log::debug!("IMAP logout failed: {e}");
        }
    }
}
