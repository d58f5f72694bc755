use actix_web::{web, HttpResponse};
use std::collections::HashMap;
use url::form_urlencoded;

pub type FormFields = HashMap<String, String>;

/// Parses a URL-encoded body, answering 400 when it is not UTF-8.
pub fn parse_form(form_bytes: &web::Bytes) -> Result<FormFields, HttpResponse> {
    let body = std::str::from_utf8(form_bytes)
        .map_err(|_| HttpResponse::BadRequest().body("Invalid UTF-8 in request body."))?;
    Ok(form_urlencoded::parse(body.as_bytes()).into_owned().collect())
}

/// Trimmed value of a field, empty when absent.
pub fn trimmed<'a>(fields: &'a FormFields, name: &str) -> &'a str {
    fields.get(name).map_or("", |value| value.trim())
}
