//! Newest-first pagination over a sent folder stored oldest-first.
//!
//! The folder is searched in full, a window of sequence numbers is cut out
//! of the ascending result list, and only that window is fetched and parsed.

use anyhow::Result;
use std::collections::BTreeSet;
use std::ops::Range;

use crate::domain::credentials::Credentials;
use crate::domain::email::{EmailId, ParsedEmail, SendersPage, SentPage};
use crate::mail::message::decode_message;

/// An open, read-only view of one folder.
pub trait SentFolder {
    /// Sequence numbers of every message in the folder.
    fn search_all(&mut self) -> Result<Vec<EmailId>>;

    /// Raw RFC 822 bytes for each requested sequence number. Messages the
    /// server does not return are simply absent.
    fn fetch_raw(&mut self, ids: &[EmailId]) -> Result<Vec<(EmailId, Vec<u8>)>>;
}

/// Opens a sent folder for a caller's credentials. One session per call.
pub trait MailboxConnector: Send + Sync {
    fn open_sent(&self, creds: &Credentials) -> Result<Box<dyn SentFolder>>;
}

/// Index range `[start, end)` into the ascending search result that holds
/// page `page` (1-based) of `page_size`, counted from the newest message.
/// `None` when the page lies beyond the folder.
pub fn page_window(total: usize, page: usize, page_size: usize) -> Option<Range<usize>> {
    let page = page.max(1);
    let page_size = page_size.max(1);

    let skip_newest = (page - 1).saturating_mul(page_size);
    let end = total.saturating_sub(skip_newest);
    let start = total.saturating_sub(page.saturating_mul(page_size));

    if start >= end { None } else { Some(start..end) }
}

/// Fetch the window's messages newest-first.
fn fetch_window(
    folder: &mut dyn SentFolder,
    page: usize,
    page_size: usize,
) -> Result<(usize, Vec<(EmailId, Vec<u8>)>)> {
    let mut ids = folder.search_all()?;
    ids.sort_unstable();
    ids.dedup();
    let total = ids.len();

    let Some(window) = page_window(total, page, page_size) else {
        log::debug!("page {page} (size {page_size}) is past the end of {total} messages");
        return Ok((total, Vec::new()));
    };

    let mut wanted: Vec<EmailId> = ids[window.clone()].to_vec();
    wanted.reverse();
    log::debug!(
        "fetching indices {}..{} ({} messages)",
        window.start,
        window.end,
        wanted.len()
    );

    let mut raw = folder.fetch_raw(&wanted)?;
    // servers answer FETCH in ascending order regardless of request order
    raw.sort_by(|a, b| b.0.cmp(&a.0));
    Ok((total, raw))
}

/// Page of parsed sent emails plus the distinct recipients seen in it.
pub fn list_sent(folder: &mut dyn SentFolder, page: usize, page_size: usize) -> Result<SentPage> {
    let (total, raw) = fetch_window(folder, page, page_size)?;

    let mut emails: Vec<ParsedEmail> = Vec::with_capacity(raw.len());
    let mut recipients = BTreeSet::new();

    for (id, bytes) in raw {
        match decode_message(id, &bytes) {
            Ok(decoded) => {
                recipients.extend(decoded.recipients);
                emails.push(decoded.email);
            }
            Err(e) => log::debug!("skipping message {id}: {e}"),
        }
    }

    // fetch order is already newest-first, but the folder may have changed
    // between SEARCH and FETCH; undated messages sort last
    emails.sort_by(|a, b| b.date.cmp(&a.date));

    Ok(SentPage {
        total,
        emails,
        senders: recipients.into_iter().collect(),
    })
}

/// Same window as [`list_sent`], keeping only the recipient set.
pub fn list_senders(
    folder: &mut dyn SentFolder,
    page: usize,
    page_size: usize,
) -> Result<SendersPage> {
    let (total, raw) = fetch_window(folder, page, page_size)?;
    let count = raw.len();

    let mut recipients = BTreeSet::new();
    for (processed, (id, bytes)) in raw.into_iter().enumerate() {
        match decode_message(id, &bytes) {
            Ok(decoded) => recipients.extend(decoded.recipients),
            Err(e) => log::debug!("skipping message {id}: {e}"),
        }
        if (processed + 1) % 10 == 0 {
            log::debug!("processed {}/{} messages", processed + 1, count);
        }
    }

    Ok(SendersPage {
        total,
        senders: recipients.into_iter().collect(),
    })
}
