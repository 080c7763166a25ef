//! CloudEvents HTTP protocol binding.
//!
//! Outbound events use binary mode: context attributes travel as `ce-*`
//! headers and the payload is the request body. Inbound requests are accepted
//! in binary mode or in structured mode (`application/cloudevents+json`).
//!
//! Header values are percent-encoded on the way out, so any UTF-8 attribute
//! survives the trip, and percent-decoded on the way in.

use std::borrow::Cow;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{
    header::{HeaderName, CONTENT_TYPE},
    HeaderMap, HeaderValue,
};
use percent_encoding::{percent_decode, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::{
    error::{EventError, Result},
    event::{Event, EventAttributes, ExtensionValue},
};

/// Media type of a structured-mode request body.
pub const CLOUDEVENTS_JSON: &str = "application/cloudevents+json";

/// Header carrying `specversion` in binary mode.
pub const CE_SPECVERSION: &str = "ce-specversion";
/// Header carrying `id` in binary mode.
pub const CE_ID: &str = "ce-id";
/// Header carrying `source` in binary mode.
pub const CE_SOURCE: &str = "ce-source";
/// Header carrying `type` in binary mode.
pub const CE_TYPE: &str = "ce-type";
/// Header carrying `time` in binary mode.
pub const CE_TIME: &str = "ce-time";
/// Header carrying `subject` in binary mode.
pub const CE_SUBJECT: &str = "ce-subject";
/// Header carrying `dataschema` in binary mode.
pub const CE_DATASCHEMA: &str = "ce-dataschema";

const CE_PREFIX: &str = "ce-";

/// Space, double quote, percent, and everything outside printable ASCII.
const HEADER_VALUE_ESCAPES: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'%');

/// Encodes an event as binary-mode headers and body.
///
/// # Errors
///
/// Returns `InvalidFormat` if an attribute cannot be carried in a header.
pub fn encode_binary(event: &Event) -> Result<(HeaderMap, Bytes)> {
    let mut headers = HeaderMap::new();

    insert(&mut headers, HeaderName::from_static(CE_SPECVERSION), event.spec_version())?;
    insert(&mut headers, HeaderName::from_static(CE_ID), event.id())?;
    insert(&mut headers, HeaderName::from_static(CE_SOURCE), event.source())?;
    insert(&mut headers, HeaderName::from_static(CE_TYPE), event.event_type())?;
    if let Some(subject) = event.subject() {
        insert(&mut headers, HeaderName::from_static(CE_SUBJECT), subject)?;
    }
    if let Some(schema) = event.data_schema() {
        insert(&mut headers, HeaderName::from_static(CE_DATASCHEMA), schema)?;
    }
    if let Some(time) = event.time() {
        insert(&mut headers, HeaderName::from_static(CE_TIME), &time.to_rfc3339())?;
    }
    for (name, value) in event.extensions() {
        let header = HeaderName::try_from(format!("{CE_PREFIX}{name}")).map_err(|_| {
            EventError::invalid_format(format!("extension '{name}' is not a valid header name"))
        })?;
        insert(&mut headers, header, &value.to_string())?;
    }

    let content_type = HeaderValue::from_str(event.data_content_type()).map_err(|_| {
        EventError::invalid_format("datacontenttype is not a valid header value")
    })?;
    headers.insert(CONTENT_TYPE, content_type);

    Ok((headers, event.data().clone()))
}

/// Decodes an inbound HTTP request into an event.
///
/// Every `ce-*` header that is not a known context attribute becomes a string
/// extension attribute.
///
/// # Errors
///
/// Returns `InvalidFormat` when a required attribute is missing or unreadable,
/// or when the payload does not match its declared content type.
pub fn decode_request(headers: &HeaderMap, body: Bytes) -> Result<Event> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .map(|value| {
            value.to_str().map_err(|_| {
                EventError::invalid_format(format!("header {CONTENT_TYPE} is not visible ASCII"))
            })
        })
        .transpose()?;

    if content_type.is_some_and(is_structured) {
        return Event::from_json(&body);
    }

    let mut attributes = EventAttributes {
        data_content_type: content_type.map(str::to_string),
        ..Default::default()
    };
    let (mut spec_version, mut id, mut source, mut event_type) = (None, None, None, None);

    for (name, value) in headers {
        let Some(attribute) = name.as_str().strip_prefix(CE_PREFIX) else {
            continue;
        };
        let value = decode_value(name.as_str(), value)?;

        match attribute {
            "specversion" => spec_version = Some(value),
            "id" => id = Some(value),
            "source" => source = Some(value),
            "type" => event_type = Some(value),
            "subject" => attributes.subject = Some(value),
            "dataschema" => attributes.data_schema = Some(value),
            "time" => attributes.time = Some(parse_time(&value)?),
            extension => {
                attributes.extensions.insert(extension.to_string(), ExtensionValue::String(value));
            },
        }
    }

    attributes.spec_version = required(spec_version, CE_SPECVERSION)?;
    attributes.id = required(id, CE_ID)?;
    attributes.source = required(source, CE_SOURCE)?;
    attributes.event_type = required(event_type, CE_TYPE)?;

    Event::from_parts(attributes, body)
}

fn is_structured(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(CLOUDEVENTS_JSON))
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<()> {
    let encoded = utf8_percent_encode(value, HEADER_VALUE_ESCAPES).to_string();
    let value = HeaderValue::try_from(encoded).map_err(|_| {
        EventError::invalid_format(format!("attribute for {name} is not a valid header value"))
    })?;
    headers.insert(name, value);
    Ok(())
}

/// Percent-decodes a header value. Raw UTF-8 from producers that skip the
/// encoding is accepted as well.
fn decode_value(name: &str, value: &HeaderValue) -> Result<String> {
    percent_decode(value.as_bytes())
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| EventError::invalid_format(format!("header {name} is not valid UTF-8")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EventError::invalid_format(format!("invalid {CE_TIME} header: {e}")))
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value.ok_or_else(|| EventError::invalid_format(format!("missing required header {name}")))
}
