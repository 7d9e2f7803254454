//! `multipart/form-data` bodies are MIME multiparts, so they are parsed with
//! the same parser used for mailbox messages.

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl FormPart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }
}

pub fn is_multipart(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.trim_start()
            .to_ascii_lowercase()
            .starts_with("multipart/form-data")
    })
}

pub fn parse_form(content_type: &str, body: &[u8]) -> Result<Vec<FormPart>, ApiError> {
    let mut raw = format!("Content-Type: {content_type}\r\n\r\n").into_bytes();
    raw.extend_from_slice(body);

    let parsed = mailparse::parse_mail(&raw)
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?;
    if !parsed.ctype.mimetype.eq_ignore_ascii_case("multipart/form-data") {
        return Err(ApiError::validation("Expected multipart/form-data"));
    }

    let mut parts = Vec::with_capacity(parsed.subparts.len());
    for sp in &parsed.subparts {
        let disposition = sp.get_content_disposition();
        let Some(name) = disposition.params.get("name") else {
            continue;
        };
        let data = sp
            .get_body_raw()
            .map_err(|e| ApiError::validation(format!("Malformed form field {name:?}: {e}")))?;
        parts.push(FormPart {
            name: name.clone(),
            filename: disposition.params.get("filename").cloned(),
            data,
        });
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=----b0undary";

    fn body() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"------b0undary\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nJane Roe\r\n");
        b.extend_from_slice(b"------b0undary\r\nContent-Disposition: form-data; name=\"companyEmails\"\r\n\r\na@co.com\r\n");
        b.extend_from_slice(b"------b0undary\r\nContent-Disposition: form-data; name=\"companyEmails\"\r\n\r\nb@co.com\r\n");
        b.extend_from_slice(b"------b0undary\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"cv.pdf\"\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.4\x00\x01\r\n");
        b.extend_from_slice(b"------b0undary--\r\n");
        b
    }

    #[test]
    fn detects_content_type() {
        assert!(is_multipart(Some(CT)));
        assert!(is_multipart(Some("Multipart/Form-Data; boundary=x")));
        assert!(!is_multipart(Some("application/json")));
        assert!(!is_multipart(None));
    }

    #[test]
    fn splits_fields_and_file() {
        let parts = parse_form(CT, &body()).unwrap();
        let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name", "companyEmails", "companyEmails", "resume"]);
        assert_eq!(parts[0].text(), "Jane Roe");
        assert_eq!(parts[2].text(), "b@co.com");

        let file = &parts[3];
        assert_eq!(file.filename.as_deref(), Some("cv.pdf"));
        assert!(file.data.starts_with(b"%PDF-1.4"));
    }

    #[test]
    fn rejects_other_multiparts() {
        let err = parse_form("multipart/mixed; boundary=----b0undary", &body()).unwrap_err();
        assert_eq!(err.status(), 400);
    }
}
