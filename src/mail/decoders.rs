use mailparse::{MailAddr, MailHeaderMap, SingleInfo};

/// All mailboxes listed in every `name` header, groups flattened. A header
/// that does not parse as an address list contributes nothing.
pub fn header_addresses(headers: &[mailparse::MailHeader], name: &str) -> Vec<SingleInfo> {
    let mut out = Vec::new();
    for h in headers.get_all_headers(name) {
        let list = match mailparse::addrparse_header(h) {
            Ok(list) => list,
            Err(e) => {
                log::debug!("ignoring unparseable {name} header {:?}: {e}", h.get_value());
                continue;
            }
        };
        for addr in list.iter() {
            match addr {
                MailAddr::Single(info) => out.push(info.clone()),
                MailAddr::Group(group) => out.extend(group.addrs.iter().cloned()),
            }
        }
    }
    out
}

/// `Name <addr>` when a display name exists, bare `addr` otherwise.
pub fn format_address(info: &SingleInfo) -> String {
    match info.display_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => format!("{} <{}>", name, info.addr),
        _ => info.addr.clone(),
    }
}

/// Canonical form used for the recipient set. Empty input yields `None`.
pub fn normalize_address(addr: &str) -> Option<String> {
    let a = addr.trim();
    if a.is_empty() {
        None
    } else {
        Some(a.to_lowercase())
    }
}

/// Best-effort plain text for an HTML fragment.
pub fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 80).unwrap_or_else(|_| strip_tags(html))
}

fn strip_tags(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(raw: &[u8]) -> Vec<mailparse::MailHeader<'_>> {
        mailparse::parse_headers(raw).unwrap().0
    }

    #[test]
    fn flattens_groups_and_repeated_headers() {
        let raw = b"To: Alice <alice@example.com>, team: bob@example.com, carol@example.com;\r\nTo: dave@example.com\r\n\r\n";
        let hs = headers(raw);
        let addrs: Vec<String> = header_addresses(&hs, "To")
            .into_iter()
            .map(|a| a.addr)
            .collect();
        assert_eq!(
            addrs,
            vec![
                "alice@example.com",
                "bob@example.com",
                "carol@example.com",
                "dave@example.com"
            ]
        );
    }

    #[test]
    fn missing_header_is_empty() {
        let hs = headers(b"Subject: hi\r\n\r\n");
        assert!(header_addresses(&hs, "Cc").is_empty());
    }

    #[test]
    fn unparseable_header_contributes_nothing() {
        let hs = headers(b"To: John Smith\r\nTo: ok@example.com\r\nCc: <>\r\n\r\n");
        let to: Vec<String> = header_addresses(&hs, "To")
            .into_iter()
            .map(|a| a.addr)
            .collect();
        assert_eq!(to, vec!["ok@example.com"]);
        assert!(header_addresses(&hs, "Cc").is_empty());
    }

    #[test]
    fn formats_with_and_without_name() {
        let named = SingleInfo {
            display_name: Some("Jane Roe".into()),
            addr: "jane@example.com".into(),
        };
        let bare = SingleInfo {
            display_name: None,
            addr: "jane@example.com".into(),
        };
        assert_eq!(format_address(&named), "Jane Roe <jane@example.com>");
        assert_eq!(format_address(&bare), "jane@example.com");
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(
            normalize_address("  HR@Example.COM "),
            Some("hr@example.com".to_string())
        );
        assert_eq!(normalize_address("   "), None);
    }

    #[test]
    fn html_text_keeps_words() {
        let text = html_to_text("<p>Dear <b>team</b>,</p><p>Regards</p>");
        assert!(text.contains("Dear"));
        assert!(text.contains("team"));
        assert!(!text.contains("<p>"));
    }
}
