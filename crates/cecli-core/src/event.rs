//! CloudEvents 1.0 event model and structured JSON encoding.
//!
//! An [`Event`] carries the required context attributes (`specversion`, `id`,
//! `source`, `type`), the optional ones (`datacontenttype`, `dataschema`,
//! `subject`, `time`), any extension attributes, and an opaque data payload.
//! The id is assigned once at construction and has no setter; only the data
//! payload can be replaced afterwards.
//!
//! JSON payloads are stored as validated JSON text with surrounding whitespace
//! removed, which keeps the bytes stable across an encode/decode cycle.

use std::{collections::BTreeMap, fmt};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{de, de::DeserializeOwned, ser, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::error::{EventError, Result};

/// CloudEvents specification version produced and accepted.
pub const SPEC_VERSION: &str = "1.0";

/// Source used when none is supplied.
pub const DEFAULT_SOURCE: &str = "ce/uri";

/// Type used when none is supplied.
pub const DEFAULT_TYPE: &str = "ce.type";

/// Content type of JSON payloads.
pub const APPLICATION_JSON: &str = "application/json";

/// Attribute names that cannot be used as extensions.
const RESERVED_ATTRIBUTES: &[&str] = &[
    "specversion",
    "id",
    "source",
    "type",
    "datacontenttype",
    "dataschema",
    "subject",
    "time",
    "data",
];

/// Value of an extension attribute.
///
/// Binary mode carries every extension as a string; structured mode keeps the
/// JSON type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    /// JSON boolean.
    Boolean(bool),
    /// JSON integer.
    Integer(i64),
    /// JSON string.
    String(String),
}

impl fmt::Display for ExtensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ExtensionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// Optional attributes used when constructing an [`Event`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOptions {
    /// Event source, `ce/uri` when absent or empty.
    pub source: Option<String>,
    /// Event type, `ce.type` when absent or empty.
    pub event_type: Option<String>,
    /// Application payload, `{}` when absent.
    pub data: Option<serde_json::Value>,
}

/// Context attributes of an event decoded from the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventAttributes {
    /// Declared `specversion`.
    pub spec_version: String,
    /// Declared `id`.
    pub id: String,
    /// Declared `source`.
    pub source: String,
    /// Declared `type`.
    pub event_type: String,
    /// Declared `datacontenttype`, JSON when absent.
    pub data_content_type: Option<String>,
    /// Declared `dataschema`.
    pub data_schema: Option<String>,
    /// Declared `subject`.
    pub subject: Option<String>,
    /// Declared `time`.
    pub time: Option<DateTime<Utc>>,
    /// Extension attributes by name.
    pub extensions: BTreeMap<String, ExtensionValue>,
}

/// A single CloudEvent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    id: String,
    source: String,
    event_type: String,
    data_content_type: String,
    data_schema: Option<String>,
    subject: Option<String>,
    time: Option<DateTime<Utc>>,
    extensions: BTreeMap<String, ExtensionValue>,
    data: Bytes,
}

impl Event {
    /// Creates an event with a generated UUID v4 id.
    pub fn new(options: &EventOptions) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), options)
    }

    /// Creates an event with a caller-supplied id.
    pub fn with_id(id: impl Into<String>, options: &EventOptions) -> Self {
        let source = non_empty(options.source.as_deref()).unwrap_or(DEFAULT_SOURCE).to_string();
        let event_type =
            non_empty(options.event_type.as_deref()).unwrap_or(DEFAULT_TYPE).to_string();
        let data = options
            .data
            .as_ref()
            .map_or_else(|| Bytes::from_static(b"{}"), |value| Bytes::from(value.to_string()));

        Self {
            id: id.into(),
            source,
            event_type,
            data_content_type: APPLICATION_JSON.to_string(),
            data_schema: None,
            subject: None,
            time: Some(Utc::now()),
            extensions: BTreeMap::new(),
            data,
        }
    }

    /// Builds an event from decoded attributes and payload bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` when a required attribute is empty, the spec
    /// version is not `1.0`, an extension name is not lowercase alphanumeric,
    /// or a JSON content type is declared for a payload that is not valid
    /// JSON.
    pub fn from_parts(attributes: EventAttributes, data: Bytes) -> Result<Self> {
        if attributes.spec_version != SPEC_VERSION {
            return Err(EventError::invalid_format(format!(
                "unsupported specversion '{}'",
                attributes.spec_version
            )));
        }

        for (name, value) in
            [("id", &attributes.id), ("source", &attributes.source), ("type", &attributes.event_type)]
        {
            if value.is_empty() {
                return Err(EventError::invalid_format(format!(
                    "required attribute '{name}' is empty"
                )));
            }
        }

        if let Some(name) = attributes.extensions.keys().find(|name| !is_extension_name(name)) {
            return Err(EventError::invalid_format(format!(
                "invalid extension attribute name '{name}'"
            )));
        }

        let data_content_type =
            attributes.data_content_type.unwrap_or_else(|| APPLICATION_JSON.to_string());

        let data = if is_json_content_type(&data_content_type) && !data.is_empty() {
            validated_json(&data)?
        } else {
            data
        };

        Ok(Self {
            id: attributes.id,
            source: attributes.source,
            event_type: attributes.event_type,
            data_content_type,
            data_schema: attributes.data_schema,
            subject: attributes.subject,
            time: attributes.time,
            extensions: attributes.extensions,
            data,
        })
    }

    /// Decodes an event from its structured JSON encoding.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for malformed JSON or a missing attribute.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| EventError::invalid_format(e.to_string()))
    }

    /// Encodes the event in its structured JSON form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the payload cannot be embedded.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| EventError::invalid_format(e.to_string()))
    }

    /// Replaces the payload with raw JSON text.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `raw` is not valid JSON. The event is left
    /// untouched on failure.
    pub fn load_json_data(&mut self, raw: &[u8]) -> Result<()> {
        self.data = validated_json(raw)?;
        self.data_content_type = APPLICATION_JSON.to_string();
        Ok(())
    }

    /// Replaces the payload with a JSON value.
    pub fn set_data(&mut self, value: &serde_json::Value) {
        self.data = Bytes::from(value.to_string());
        self.data_content_type = APPLICATION_JSON.to_string();
    }

    /// Deserializes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the payload does not match `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.data).map_err(|e| EventError::invalid_format(e.to_string()))
    }

    /// Returns the CloudEvents spec version.
    pub fn spec_version(&self) -> &'static str {
        SPEC_VERSION
    }

    /// Returns the event id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the event source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the event type.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns the payload content type.
    pub fn data_content_type(&self) -> &str {
        &self.data_content_type
    }

    /// Returns the payload schema URI, if set.
    pub fn data_schema(&self) -> Option<&str> {
        self.data_schema.as_deref()
    }

    /// Returns the event subject, if set.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the event time, if set.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    /// Returns the extension attributes by name.
    pub fn extensions(&self) -> &BTreeMap<String, ExtensionValue> {
        &self.extensions
    }

    /// Returns one extension attribute.
    pub fn extension(&self, name: &str) -> Option<&ExtensionValue> {
        self.extensions.get(name)
    }

    /// Returns the raw payload bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Returns true for `application/json`, `text/json`, and `+json` media types.
pub fn is_json_content_type(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    media_type == APPLICATION_JSON || media_type == "text/json" || media_type.ends_with("+json")
}

/// Extension names are lowercase ASCII letters and digits and must not
/// shadow a context attribute.
fn is_extension_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        && !RESERVED_ATTRIBUTES.contains(&name)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn validated_json(raw: &[u8]) -> Result<Bytes> {
    let trimmed = raw.trim_ascii();
    serde_json::from_slice::<de::IgnoredAny>(trimmed)
        .map_err(|e| EventError::invalid_format(format!("data is not valid JSON: {e}")))?;
    Ok(Bytes::copy_from_slice(trimmed))
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    specversion: &'static str,
    id: &'a str,
    source: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    datacontenttype: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dataschema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extensions: &'a BTreeMap<String, ExtensionValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<EnvelopeData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_base64: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EnvelopeData<'a> {
    Json(&'a RawValue),
    Text(&'a str),
}

#[derive(Deserialize)]
struct Envelope {
    specversion: String,
    id: String,
    source: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    datacontenttype: Option<String>,
    #[serde(default)]
    dataschema: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    #[serde(default)]
    data: Option<Box<RawValue>>,
    #[serde(default)]
    data_base64: Option<String>,
    #[serde(flatten)]
    extensions: BTreeMap<String, ExtensionValue>,
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut data = None;
        let mut data_base64 = None;

        if !self.data.is_empty() {
            if is_json_content_type(&self.data_content_type) {
                let raw: &RawValue =
                    serde_json::from_slice(&self.data).map_err(ser::Error::custom)?;
                data = Some(EnvelopeData::Json(raw));
            } else {
                match std::str::from_utf8(&self.data) {
                    Ok(text) => data = Some(EnvelopeData::Text(text)),
                    Err(_) => data_base64 = Some(STANDARD.encode(&self.data)),
                }
            }
        }

        EnvelopeRef {
            specversion: SPEC_VERSION,
            id: &self.id,
            source: &self.source,
            event_type: &self.event_type,
            datacontenttype: &self.data_content_type,
            dataschema: self.data_schema.as_deref(),
            subject: self.subject.as_deref(),
            time: self.time,
            extensions: &self.extensions,
            data,
            data_base64,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let envelope = Envelope::deserialize(deserializer)?;
        Self::try_from(envelope).map_err(|e| de::Error::custom(e.message()))
    }
}

impl TryFrom<Envelope> for Event {
    type Error = EventError;

    fn try_from(envelope: Envelope) -> Result<Self> {
        let is_json = envelope.datacontenttype.as_deref().map_or(true, is_json_content_type);

        let data = match (envelope.data, envelope.data_base64) {
            (Some(_), Some(_)) => {
                return Err(EventError::invalid_format(
                    "event carries both 'data' and 'data_base64'",
                ));
            },
            (Some(raw), None) if is_json => Bytes::copy_from_slice(raw.get().as_bytes()),
            (Some(raw), None) => match serde_json::from_str::<String>(raw.get()) {
                Ok(text) => Bytes::from(text),
                Err(_) => Bytes::copy_from_slice(raw.get().as_bytes()),
            },
            (None, Some(encoded)) => STANDARD
                .decode(encoded)
                .map(Bytes::from)
                .map_err(|e| EventError::invalid_format(format!("invalid data_base64: {e}")))?,
            (None, None) => Bytes::new(),
        };

        Self::from_parts(
            EventAttributes {
                spec_version: envelope.specversion,
                id: envelope.id,
                source: envelope.source,
                event_type: envelope.event_type,
                data_content_type: envelope.datacontenttype,
                data_schema: envelope.dataschema,
                subject: envelope.subject,
                time: envelope.time,
                extensions: envelope.extensions,
            },
            data,
        )
    }
}
