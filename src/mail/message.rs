use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailHeaderMap, MailParseError, ParsedMail};

use crate::domain::email::{AttachmentInfo, EmailId, ParsedEmail};
use crate::mail::decoders::{format_address, header_addresses, html_to_text, normalize_address};

/// A fetched message after parsing: the record plus the lower-cased
/// recipient addresses (To and Cc) found in it.
pub struct Decoded {
    pub email: ParsedEmail,
    pub recipients: Vec<String>,
}

pub fn decode_message(id: EmailId, raw: &[u8]) -> Result<Decoded, MailParseError> {
    let parsed = mailparse::parse_mail(raw)?;

    let from = header_addresses(&parsed.headers, "From");
    let to = header_addresses(&parsed.headers, "To");
    let cc = header_addresses(&parsed.headers, "Cc");

    let recipients = to
        .iter()
        .chain(cc.iter())
        .filter_map(|a| normalize_address(&a.addr))
        .collect();

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let date = parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));

    let mut bodies = Bodies::default();
    collect_parts(&parsed, &mut bodies);

    let text = match (bodies.text, &bodies.html) {
        (Some(t), _) => t,
        (None, Some(h)) => html_to_text(h),
        (None, None) => String::new(),
    };

    Ok(Decoded {
        email: ParsedEmail {
            id,
            from: from.iter().map(format_address).collect(),
            to: to.iter().map(format_address).collect(),
            cc: cc.iter().map(format_address).collect(),
            subject,
            date,
            text,
            html: bodies.html.unwrap_or_default(),
            attachments: bodies.attachments,
        },
        recipients,
    })
}

#[derive(Default)]
struct Bodies {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<AttachmentInfo>,
}

fn collect_parts(part: &ParsedMail, out: &mut Bodies) {
    if !part.subparts.is_empty() {
        for sp in &part.subparts {
            collect_parts(sp, out);
        }
        return;
    }

    let mime = part.ctype.mimetype.to_ascii_lowercase();
    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();

    let is_attachment = matches!(disposition.disposition, DispositionType::Attachment)
        || (filename.is_some() && !mime.starts_with("text/"));

    if is_attachment {
        let size = part.get_body_raw().map(|b| b.len()).unwrap_or(0);
        out.attachments.push(AttachmentInfo {
            filename,
            size,
            content_type: mime,
        });
        return;
    }

    match mime.as_str() {
        "text/plain" if out.text.is_none() => out.text = part.get_body().ok(),
        "text/html" if out.html.is_none() => out.html = part.get_body().ok(),
        _ => {}
    }
}
