use std::fmt;

/// Caller-supplied secret, classified once at the HTTP boundary.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    /// Key for the HTTP email API.
    ApiKey(String),
    /// Account password (or app password) for SMTP and IMAP.
    Password(String),
}

impl Secret {
    pub fn classify(raw: &str, api_key_prefix: &str) -> Self {
        if !api_key_prefix.is_empty() && raw.starts_with(api_key_prefix) {
            Secret::ApiKey(raw.to_string())
        } else {
            Secret::Password(raw.to_string())
        }
    }
}

// never print the secret itself
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::ApiKey(_) => f.write_str("ApiKey(***)"),
            Secret::Password(_) => f.write_str("Password(***)"),
        }
    }
}

/// Account address plus secret, passed explicitly on every call.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub account: String,
    pub secret: Secret,
}

impl Credentials {
    pub fn new(account: impl Into<String>, raw_secret: &str, api_key_prefix: &str) -> Self {
        Self {
            account: account.into(),
            secret: Secret::classify(raw_secret, api_key_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_selects_api_key() {
        assert_eq!(
            Secret::classify("SG.abc.def", "SG."),
            Secret::ApiKey("SG.abc.def".into())
        );
        assert_eq!(
            Secret::classify("abcd efgh ijkl", "SG."),
            Secret::Password("abcd efgh ijkl".into())
        );
        // prefix is case sensitive
        assert!(matches!(Secret::classify("sg.abc", "SG."), Secret::Password(_)));
    }

    #[test]
    fn empty_prefix_never_matches() {
        assert!(matches!(Secret::classify("SG.abc", ""), Secret::Password(_)));
    }

    #[test]
    fn debug_hides_value() {
        let c = Credentials::new("me@example.com", "hunter2", "SG.");
        let printed = format!("{c:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("Password(***)"));
    }
}
