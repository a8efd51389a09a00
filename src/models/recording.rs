//! # Recording Model
//!
//! A dictated recording and the clinical documents generated from it.
//!
//! ## Database Schema
//!
//! Maps to the `recordings` table:
//! - `id`: Primary key (INTEGER)
//! - `filename`: Audio file path on disk
//! - `transcript`: Speech-to-text output, populated by the pipeline
//! - `soap_note` / `referral` / `letter`: Generated clinical documents
//! - `processing_status`: Last pipeline outcome for this recording
//! - `patient_name`: Optional patient association

use crate::constants::DocumentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A recording row with its transcript and generated documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Recording {
    pub id: i64,
    pub filename: String,
    pub transcript: Option<String>,
    pub soap_note: Option<String>,
    pub referral: Option<String>,
    pub letter: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub processing_status: String,
    pub patient_name: Option<String>,
    pub duration_seconds: Option<f64>,
    pub provider: Option<String>,
    pub error_message: Option<String>,
}

impl Recording {
    /// The generated document of the given kind, if present and non-empty.
    pub fn document(&self, kind: DocumentKind) -> Option<&str> {
        let value = match kind {
            DocumentKind::SoapNote => self.soap_note.as_deref(),
            DocumentKind::Referral => self.referral.as_deref(),
            DocumentKind::Letter => self.letter.as_deref(),
        };
        value.filter(|text| !text.trim().is_empty())
    }

    /// Whether a non-empty document of the given kind already exists.
    pub fn has_document(&self, kind: DocumentKind) -> bool {
        self.document(kind).is_some()
    }

    /// Whether a non-empty transcript already exists.
    pub fn has_transcript(&self) -> bool {
        self.transcript
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }
}

/// New recording for insertion (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecording {
    pub filename: String,
    pub patient_name: Option<String>,
    pub duration_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_with(soap: Option<&str>) -> Recording {
        Recording {
            id: 1,
            filename: "visit_001.wav".to_string(),
            transcript: Some("patient presents with".to_string()),
            soap_note: soap.map(str::to_string),
            referral: None,
            letter: None,
            timestamp: Utc::now(),
            processing_status: "completed".to_string(),
            patient_name: Some("Doe, Jane".to_string()),
            duration_seconds: Some(42.5),
            provider: Some("deepgram".to_string()),
            error_message: None,
        }
    }

    #[test]
    fn test_has_document() {
        assert!(recording_with(Some("S: ...")).has_document(DocumentKind::SoapNote));
        assert!(!recording_with(None).has_document(DocumentKind::SoapNote));
        assert!(!recording_with(None).has_document(DocumentKind::Referral));
    }

    #[test]
    fn test_blank_document_counts_as_missing() {
        assert!(!recording_with(Some("   ")).has_document(DocumentKind::SoapNote));
    }
}
