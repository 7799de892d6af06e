//! Provider response interpretation
//!
//! Turns the body and status of a dynamic-DNS update response into a
//! normalized outcome. Namecheap-style XML bodies are inspected for the
//! `ErrCount`, `IsSuccess`, `Err<n>` and `Error` fields; anything else is
//! treated as opaque text.
//!
//! Interpretation never fails: malformed markup yields no fields.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::traits::UpdateStatus;

const ERR_COUNT: &str = "ErrCount";
const IS_SUCCESS: &str = "IsSuccess";
const ERR1: &str = "Err1";

/// Recognized provider fields in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFields {
    entries: Vec<(String, String)>,
}

impl ProviderFields {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over `(name, value)` pairs in discovery order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Insert unless the field is already known; first occurrence wins
    fn insert_first(&mut self, key: &str, value: &str) {
        if !self.contains(key) {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }
}

/// Normalized outcome of one provider response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub status: UpdateStatus,
    pub message: String,
    pub fields: ProviderFields,
}

/// Interpret a provider response
///
/// `http_status` is `None` when no response line was received.
pub fn interpret(body: &str, http_status: Option<u16>) -> Interpretation {
    let fields = parse_fields(body);
    let failed = http_status.is_some_and(|code| code >= 400) || reports_error(&fields);

    Interpretation {
        status: if failed {
            UpdateStatus::Error
        } else {
            UpdateStatus::Success
        },
        message: compose_message(body, http_status, &fields),
        fields,
    }
}

/// Collect recognized fields from a markup body
///
/// Bodies without `<` are not parsed. Any syntax error discards every field.
pub fn parse_fields(body: &str) -> ProviderFields {
    if !body.contains('<') {
        return ProviderFields::default();
    }
    parse_markup(body).unwrap_or_default()
}

/// An element whose direct text is still being collected
struct OpenElement {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
}

impl OpenElement {
    fn from_start(start: &BytesStart<'_>) -> Option<Self> {
        let tag = std::str::from_utf8(start.local_name().as_ref())
            .ok()?
            .to_string();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.ok()?;
            let key = std::str::from_utf8(attribute.key.local_name().as_ref())
                .ok()?
                .to_string();
            let value = attribute.unescape_value().ok()?.into_owned();
            attributes.push((key, value));
        }
        Some(Self {
            tag,
            attributes,
            text: String::new(),
        })
    }

    fn apply(self, fields: &mut ProviderFields) {
        let tag = self.tag.as_str();
        let text = self.text.trim();

        if !text.is_empty() {
            if tag == ERR_COUNT || tag == IS_SUCCESS || is_numbered_error(tag) {
                fields.insert_first(tag, text);
            } else if tag == "Error" {
                fields.insert_first(ERR1, text);
            }
        }

        for (key, value) in &self.attributes {
            if key == IS_SUCCESS || key == ERR_COUNT {
                fields.insert_first(key, value);
            }
        }
    }
}

fn parse_markup(body: &str) -> Option<ProviderFields> {
    let mut reader = Reader::from_str(body);
    let mut fields = ProviderFields::default();
    let mut pending: Option<OpenElement> = None;
    let mut depth: usize = 0;

    loop {
        match reader.read_event().ok()? {
            Event::Start(start) => {
                if let Some(element) = pending.take() {
                    element.apply(&mut fields);
                }
                pending = Some(OpenElement::from_start(&start)?);
                depth += 1;
            }
            Event::Empty(start) => {
                if let Some(element) = pending.take() {
                    element.apply(&mut fields);
                }
                OpenElement::from_start(&start)?.apply(&mut fields);
            }
            Event::End(_) => {
                if let Some(element) = pending.take() {
                    element.apply(&mut fields);
                }
                depth = depth.checked_sub(1)?;
            }
            Event::Text(text) => {
                let text = text.unescape().ok()?;
                match pending.as_mut() {
                    Some(element) => element.text.push_str(&text),
                    None if depth == 0 && !text.trim().is_empty() => return None,
                    None => {}
                }
            }
            Event::CData(data) => {
                let data = data.into_inner();
                let data = std::str::from_utf8(&data).ok()?;
                match pending.as_mut() {
                    Some(element) => element.text.push_str(data),
                    None if depth == 0 => return None,
                    None => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return None;
    }
    if let Some(element) = pending.take() {
        element.apply(&mut fields);
    }
    Some(fields)
}

fn is_numbered_error(tag: &str) -> bool {
    tag.strip_prefix("Err")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Whether the provider fields report a failure
///
/// Fields that do not parse are ignored.
pub fn reports_error(fields: &ProviderFields) -> bool {
    let error_count = fields
        .get(ERR_COUNT)
        .and_then(|count| count.trim().parse::<i64>().ok())
        .is_some_and(|count| count > 0);

    let negative_success = fields
        .get(IS_SUCCESS)
        .map(|value| value.trim().to_ascii_lowercase())
        .is_some_and(|value| matches!(value.as_str(), "false" | "0" | "no"));

    error_count || negative_success
}

fn compose_message(body: &str, http_status: Option<u16>, fields: &ProviderFields) -> String {
    let mut details = Vec::with_capacity(fields.len() + 1);
    if let Some(code) = http_status {
        details.push(format!("HTTP {code}"));
    }
    for key in [ERR_COUNT, IS_SUCCESS, ERR1] {
        if let Some(value) = fields.get(key) {
            details.push(format!("{key}={value}"));
        }
    }
    for (key, value) in fields.iter() {
        if key != ERR_COUNT && key != IS_SUCCESS && key != ERR1 {
            details.push(format!("{key}={value}"));
        }
    }

    let base = body.trim();
    if details.is_empty() {
        return base.to_string();
    }
    let detail = details.join(" | ");
    if base.is_empty() {
        detail
    } else {
        format!("{base} ({detail})")
    }
}
