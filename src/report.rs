//! Intake and validation of problem reports.
//!
//! `intake` maps the raw multipart parts onto the report fields using the
//! configured [`FieldKeys`]; `validate` turns the result into a
//! [`SubmissionRequest`] or a client error. Neither touches the network.

use std::collections::HashMap;

use log::debug;

use crate::config::FieldKeys;
use crate::web::errors::ReportError;

/// Everything a multipart body contained, before any interpretation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<RawFile>,
}

impl RawForm {
    /// Records a text part. The first value under a key is kept.
    pub fn push_field(&mut self, name: String, value: String) {
        self.fields.entry(name).or_insert(value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub field: String,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Intake output: fields located, nothing checked yet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedSubmission {
    pub reporter_name: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub attachment: Option<Attachment>,
}

/// A validated report. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    reporter_name: String,
    location: String,
    description: String,
    attachment: Option<Attachment>,
}

impl SubmissionRequest {
    pub fn reporter_name(&self) -> &str {
        &self.reporter_name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub attachment_required: bool,
    pub mime_prefixes: Vec<String>,
}

pub fn intake(form: RawForm, keys: &FieldKeys) -> Result<ParsedSubmission, ReportError> {
    let RawForm { mut fields, files } = form;

    if files.len() > 1 {
        return Err(ReportError::TooManyFiles);
    }

    let attachment = match files.into_iter().next() {
        Some(file) if file.field != keys.photo => {
            return Err(ReportError::UnexpectedFile { field: file.field })
        }
        Some(file) => Some(Attachment {
            filename: file.filename,
            mime_type: file.mime_type,
            bytes: file.bytes,
        }),
        None => None,
    };

    let parsed = ParsedSubmission {
        reporter_name: fields.remove(&keys.reporter_name),
        location: fields.remove(&keys.location),
        description: fields.remove(&keys.description),
        attachment,
    };

    if !fields.is_empty() {
        debug!(
            "[report] ignoring unknown form fields: {:?}",
            fields.keys().collect::<Vec<_>>()
        );
    }
    Ok(parsed)
}

pub fn validate(
    parsed: ParsedSubmission,
    policy: &ValidationPolicy,
) -> Result<SubmissionRequest, ReportError> {
    fn present(value: &Option<String>) -> bool {
        value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
    }

    let mut missing = Vec::new();
    if !present(&parsed.reporter_name) {
        missing.push("reporter name");
    }
    if !present(&parsed.location) {
        missing.push("location");
    }
    if !present(&parsed.description) {
        missing.push("description");
    }
    if !missing.is_empty() {
        return Err(ReportError::MissingFields(missing));
    }

    match &parsed.attachment {
        None if policy.attachment_required => return Err(ReportError::MissingAttachment),
        Some(att)
            if !policy.mime_prefixes.is_empty()
                && !policy
                    .mime_prefixes
                    .iter()
                    .any(|prefix| att.mime_type.to_ascii_lowercase().starts_with(prefix.as_str())) =>
        {
            return Err(ReportError::UnsupportedMediaType(att.mime_type.clone()))
        }
        _ => {}
    }

    Ok(SubmissionRequest {
        reporter_name: parsed.reporter_name.unwrap_or_default(),
        location: parsed.location.unwrap_or_default(),
        description: parsed.description.unwrap_or_default(),
        attachment: parsed.attachment,
    })
}
