//! Document validation.
//!
//! Models commonly wrap YAML in markdown code fences even when asked not to.
//! [`validate_document`] removes those fences, trims the text and parses it
//! as YAML, returning a [`ValidatedDocument`] that is safe to write to disk.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// A fence delimiter plus an optional language hint (```` ```yaml ````).
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("fence pattern is valid"));

const FENCE_MARKER: &str = "```";

/// A model response that parsed as YAML.
#[derive(Debug, Clone)]
pub struct ValidatedDocument {
    /// Text exactly as returned by the generator.
    pub raw: String,
    /// Cleaned text, terminated by exactly one newline. This is what gets written.
    pub text: String,
    /// Parsed document.
    pub value: serde_yaml::Value,
    /// SHA-256 of `text`.
    pub digest: DocumentDigest,
}

impl ValidatedDocument {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// SHA-256 hex digest of a document's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct DocumentDigest(String);

impl DocumentDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        DocumentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for DocumentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remove every code-fence delimiter (and its language hint) and trim.
///
/// The result never contains three consecutive backticks.
pub fn strip_code_fences(raw: &str) -> String {
    let mut cleaned = FENCE.replace_all(raw, "").into_owned();
    while cleaned.contains(FENCE_MARKER) {
        cleaned = cleaned.replace(FENCE_MARKER, "");
    }
    cleaned.trim().to_string()
}

/// Clean a raw model response and parse it as YAML.
///
/// Empty output, and output that parses to YAML `null` (blank, comments only,
/// `~`), is rejected with [`ValidationError::EmptyDocument`].
pub fn validate_document(raw: &str) -> Result<ValidatedDocument, ValidationError> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(ValidationError::EmptyDocument);
    }

    let value: serde_yaml::Value = serde_yaml::from_str(&cleaned)?;
    if value.is_null() {
        return Err(ValidationError::EmptyDocument);
    }

    let text = format!("{cleaned}\n");
    let digest = DocumentDigest::from_bytes(text.as_bytes());
    tracing::debug!(bytes = text.len(), digest = %digest.short(), "document parsed");

    Ok(ValidatedDocument {
        raw: raw.to_string(),
        text,
        value,
        digest,
    })
}

/// Validate a document already on disk.
pub fn validate_file(path: &Path) -> crate::Result<ValidatedDocument> {
    let raw = std::fs::read_to_string(path).map_err(|source| crate::AgentError::Artifact {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(validate_document(&raw)?)
}
