use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Reasons a submitted resume is refused. All of these are caller errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResumeError {
    #[error("Resume is not valid base64")]
    InvalidBase64,
    #[error("Invalid PDF file")]
    NotPdf,
    #[error("Only PDF files are allowed")]
    BadExtension,
    #[error("Resume file size exceeds {}MB limit", .limit / (1024 * 1024))]
    TooLarge { limit: u64 },
}

/// Write-once storage for resume files.
#[derive(Debug, Clone)]
pub struct ResumeStore {
    dir: PathBuf,
    max_bytes: u64,
}

impl ResumeStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Decode a base64 payload, with or without a `data:...;base64,` prefix.
    pub fn decode_base64(&self, payload: &str) -> Result<Vec<u8>, ResumeError> {
        let data = strip_data_uri(payload.trim());
        let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|_| ResumeError::InvalidBase64)
    }

    /// Signature first, then size.
    pub fn validate(&self, bytes: &[u8]) -> Result<(), ResumeError> {
        if !bytes.starts_with(PDF_SIGNATURE) {
            return Err(ResumeError::NotPdf);
        }
        if bytes.len() as u64 > self.max_bytes {
            return Err(ResumeError::TooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Uploaded files must carry a `.pdf` extension.
    pub fn check_extension(&self, file_name: &str) -> Result<(), ResumeError> {
        let ok = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if ok { Ok(()) } else { Err(ResumeError::BadExtension) }
    }

    /// Write `bytes` as `{unix_millis}-{sanitized name}`, never overwriting
    /// an existing file.
    pub fn save(&self, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create {}", self.dir.display()))?;

        let millis = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
        let base = sanitize_file_name(original_name);

        for n in 0u32.. {
            let name = if n == 0 {
                format!("{millis}-{base}")
            } else {
                format!("{millis}-{n}-{base}")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    f.write_all(bytes)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("cannot create {}", path.display()));
                }
            }
        }
        anyhow::bail!("no free file name for {base} in {}", self.dir.display())
    }
}

fn strip_data_uri(s: &str) -> &str {
    if s.starts_with("data:")
        && let Some(idx) = s.find(";base64,")
    {
        return &s[idx + ";base64,".len()..];
    }
    s
}

/// Basename only, with anything outside `[A-Za-z0-9._-]` replaced.
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    // also treat backslashes as separators for uploads from Windows browsers
    let base = base.rsplit('\\').next().unwrap_or(base);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "resume.pdf".to_string()
    } else {
        cleaned
    }
}
