use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use log::debug;

use crate::report::{RawFile, RawForm};
use crate::web::errors::ReportError;

fn read_error(e: MultipartError) -> ReportError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ReportError::PayloadTooLarge
    } else {
        ReportError::MalformedBody(e.body_text())
    }
}

/// Drains a multipart body into memory. Parts carrying a filename are
/// files; everything else is text.
pub async fn collect_multipart(mut multipart: Multipart) -> Result<RawForm, ReportError> {
    let mut form = RawForm::default();

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        let name = field.name().unwrap_or("").to_string();

        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(read_error)?;

                // An untouched <input type="file"> still submits an empty part.
                if filename.is_empty() && bytes.is_empty() {
                    debug!("[forms] skipping empty file part {:?}", name);
                    continue;
                }

                debug!(
                    "[forms] file part {:?}: {} ({}, {} bytes)",
                    name,
                    filename,
                    mime_type,
                    bytes.len()
                );
                form.files.push(RawFile {
                    field: name,
                    filename,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            None => {
                let value = field.text().await.map_err(read_error)?;
                form.push_field(name, value);
            }
        }
    }

    Ok(form)
}
