//! Backend response envelope
//!
//! Every backend answer has the shape
//! `{success, code, message, data, errors, meta}`. Failures put a global code
//! in `code` (e.g. `TOKEN_INVALID`, `AUTH_FAILED`) and per-field codes in
//! `errors`, where each entry is either a bare code string or a
//! `{code, params}` object.
//!
//! Parsing happens once, at the boundary; callers work with the extracted
//! codes instead of re-inspecting raw JSON.

use std::collections::HashMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Enveloped { data: T },
    Bare(T),
}

/// Decode a success body into `T`, accepting both the enveloped form
/// (`{"data": T, ...}`) and a bare `T` (views that bypass the envelope).
pub fn decode_payload<T: DeserializeOwned>(body: &[u8]) -> serde_json::Result<T> {
    let payload: Payload<T> = serde_json::from_slice(body)?;
    Ok(match payload {
        Payload::Enveloped { data } => data,
        Payload::Bare(value) => value,
    })
}

/// A single error entry inside `errors.<field>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorEntry {
    Code(String),
    Detailed {
        code: String,
        #[serde(default)]
        params: Option<serde_json::Value>,
    },
    Other(serde_json::Value),
}

impl ErrorEntry {
    pub fn code(&self) -> Option<&str> {
        match self {
            ErrorEntry::Code(code) | ErrorEntry::Detailed { code, .. } => Some(code),
            ErrorEntry::Other(_) => None,
        }
    }
}

/// `errors.<field>` is normally a list but tolerate a single entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ErrorList {
    Many(Vec<ErrorEntry>),
    One(ErrorEntry),
}

impl ErrorList {
    fn entries(&self) -> &[ErrorEntry] {
        match self {
            ErrorList::Many(entries) => entries,
            ErrorList::One(entry) => std::slice::from_ref(entry),
        }
    }
}

/// Error side of the envelope, extracted from a failed response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    errors: HashMap<String, ErrorList>,
    /// Plain DRF answers (`{"detail": "..."}`) bypass the envelope.
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorBody {
    /// Parse a failure body. Returns `None` for empty or non-JSON bodies.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }

    /// All machine-readable codes: the global code first, then per-field codes.
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.code.as_deref().into_iter().collect();
        for list in self.errors.values() {
            codes.extend(list.entries().iter().filter_map(ErrorEntry::code));
        }
        codes
    }

    /// Whether any code matches, ignoring ASCII case (the backend upper-cases
    /// codes but not consistently for every error source).
    pub fn has_code(&self, code: &str) -> bool {
        self.codes().iter().any(|c| c.eq_ignore_ascii_case(code))
    }
}
