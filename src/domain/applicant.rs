use chrono::{DateTime, Utc};
use serde::Serialize;

pub type ApplicantId = i64;

/// Fields accepted from the intake form, before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplicant {
    pub name: String,
    pub email: String,
    pub cover_letter: String,
    pub resume_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    pub id: ApplicantId,
    pub name: String,
    pub email: String,
    pub cover_letter: String,
    pub resume_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Loose `something@host.tld` check.
pub fn is_valid_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    // at least one char before and after some dot in the domain part
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

#[cfg(test)]
mod tests {
    use super::is_valid_email;

    #[test]
    fn accepts_basic_shapes() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("a@b.c"));
        assert!(is_valid_email("first.last@mail.example.org"));
    }

    #[test]
    fn rejects_missing_parts() {
        assert!(!is_valid_email("jane"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane@.com"));
        assert!(!is_valid_email("jane@example."));
    }
}
