use crate::constants::{DATE_FORMAT, DAY_FORMAT, describe_code};
use crate::error::{LumixError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;
use url::Url;

/// Flat view of one camera reply: element text and attributes keyed by local name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommandResult {
    fields: BTreeMap<String, String>,
}

impl CommandResult {
    pub fn from_xml(body: &str) -> Result<Self> {
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);

        let mut fields = BTreeMap::new();
        let mut stack: Vec<String> = Vec::new();
        let mut seen_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    seen_root = true;
                    collect_attributes(&e, &mut fields)?;
                    stack.push(local_name(&e));
                }
                Event::Empty(e) => {
                    seen_root = true;
                    collect_attributes(&e, &mut fields)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(t) => {
                    if let Some(tag) = stack.last() {
                        fields.entry(tag.clone()).or_insert(t.unescape()?.into_owned());
                    }
                }
                Event::CData(c) => {
                    if let Some(tag) = stack.last() {
                        let text = String::from_utf8_lossy(&c.into_inner()).trim().to_string();
                        fields.entry(tag.clone()).or_insert(text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(LumixError::ProtocolError("Empty response".to_string()));
        }

        Ok(Self { fields })
    }

    /// Fails with the device's own reason when `result` is present and not an `ok*` code.
    pub fn ensure_ok(self, operation: &str) -> Result<Self> {
        if let Some(code) = self.result_code()
            && !code.starts_with("ok")
        {
            return Err(LumixError::ProtocolError(format!(
                "{} failed: {} ({})",
                operation,
                describe_code(code),
                code
            )));
        }
        Ok(self)
    }

    pub fn result_code(&self) -> Option<&str> {
        self.try_get("result")
    }

    pub fn is_ok(&self) -> bool {
        self.result_code().is_some_and(|c| c.starts_with("ok"))
    }

    pub fn get(&self, key: &str) -> Result<&str> {
        self.try_get(key).ok_or_else(|| {
            LumixError::ProtocolError(format!("Field '{}' missing from camera reply", key))
        })
    }

    pub fn try_get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn parse<T: FromStr>(&self, key: &str) -> Result<T> {
        let raw = self.get(key)?;
        raw.parse().map_err(|_| {
            LumixError::ProtocolError(format!("Field '{}' has invalid value {:?}", key, raw))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn collect_attributes(e: &BytesStart<'_>, fields: &mut BTreeMap<String, String>) -> Result<()> {
    for attr in e.attributes() {
        let attr = attr
            .map_err(|e| LumixError::ProtocolError(format!("Malformed XML attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        // namespace declarations are not data
        if key == "xmlns" || attr.key.as_ref().starts_with(b"xmlns:") {
            continue;
        }
        let value = attr.unescape_value()?.into_owned();
        fields.entry(key).or_insert(value);
    }
    Ok(())
}

/// One file entry from the camera's content directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub size: Option<u64>,
    pub date: Option<NaiveDateTime>,
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BrowsePage {
    pub items: Vec<MediaItem>,
    /// Entries the camera says it returned, including ones skipped for lacking a URL.
    pub number_returned: u32,
    pub total_matches: Option<u32>,
}

pub fn browse_request_body(object_id: &str, start_index: u32, count: u32) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
 <s:Body>
  <u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1" xmlns:pana="urn:schemas-panasonic-com:pana">
   <ObjectID>{}</ObjectID>
   <BrowseFlag>BrowseDirectChildren</BrowseFlag>
   <Filter>*</Filter>
   <StartingIndex>{}</StartingIndex>
   <RequestedCount>{}</RequestedCount>
   <SortCriteria></SortCriteria>
   <pana:X_FromCP>LumixLink2.0</pana:X_FromCP>
  </u:Browse>
 </s:Body>
</s:Envelope>"#,
        quick_xml::escape::escape(object_id),
        start_index,
        count
    )
}

/// Parses a `BrowseResponse` SOAP envelope, including the DIDL-Lite document embedded in `Result`.
pub fn parse_browse_response(body: &str) -> Result<BrowsePage> {
    let envelope = CommandResult::from_xml(body)?;

    if let Some(fault) = envelope.try_get("faultstring") {
        let detail = envelope
            .try_get("errorDescription")
            .or_else(|| envelope.try_get("errorCode"))
            .unwrap_or("no detail");
        return Err(LumixError::ProtocolError(format!(
            "Browse failed: {} ({})",
            fault, detail
        )));
    }

    let (items, raw_count) = match envelope.try_get("Result") {
        Some(didl) if !didl.is_empty() => parse_didl(didl)?,
        _ => (Vec::new(), 0),
    };

    let number_returned = match envelope.try_get("NumberReturned") {
        Some(_) => envelope.parse("NumberReturned")?,
        None => raw_count,
    };
    let total_matches = match envelope.try_get("TotalMatches") {
        Some(_) => Some(envelope.parse("TotalMatches")?),
        None => None,
    };

    Ok(BrowsePage {
        items,
        number_returned,
        total_matches,
    })
}

#[derive(Default)]
struct PendingItem {
    id: String,
    title: Option<String>,
    date: Option<String>,
    url: Option<String>,
    size: Option<u64>,
    mime: Option<String>,
    in_res: bool,
    res_claimed: bool,
}

impl PendingItem {
    fn finish(self) -> Option<MediaItem> {
        let Some(url) = self.url else {
            debug!(id = %self.id, "skipping content entry without a download URL");
            return None;
        };
        let title = match self.title {
            Some(t) if !t.is_empty() => t,
            _ => file_name_from_url(&url).unwrap_or_else(|| url.clone()),
        };
        Some(MediaItem {
            id: self.id,
            title,
            date: self.date.as_deref().and_then(parse_didl_date),
            url,
            size: self.size,
            mime: self.mime,
        })
    }
}

/// Returns the parsed items and the raw number of `item` entries seen.
pub fn parse_didl(didl: &str) -> Result<(Vec<MediaItem>, u32)> {
    let mut reader = Reader::from_str(didl);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut raw_count = 0u32;
    let mut current: Option<PendingItem> = None;
    let mut tag: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(&e);
                if name == "item" {
                    raw_count += 1;
                    current = Some(PendingItem {
                        id: attribute(&e, "id")?.unwrap_or_default(),
                        ..Default::default()
                    });
                } else if name == "res"
                    && let Some(item) = current.as_mut()
                    && !item.res_claimed
                {
                    item.res_claimed = true;
                    item.in_res = true;
                    item.size = attribute(&e, "size")?.and_then(|s| s.parse().ok());
                    item.mime = attribute(&e, "protocolInfo")?
                        .and_then(|info| info.split(':').nth(2).map(str::to_string))
                        .filter(|m| !m.is_empty() && m != "*");
                }
                tag = Some(name);
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"item" {
                    raw_count += 1;
                }
            }
            Event::Text(t) => {
                if let (Some(item), Some(name)) = (current.as_mut(), tag.as_deref()) {
                    let text = t.unescape()?.into_owned();
                    match name {
                        "title" if item.title.is_none() => item.title = Some(text),
                        "date" if item.date.is_none() => item.date = Some(text),
                        "res" if item.in_res => item.url = Some(text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    if let Some(done) = current.take().and_then(PendingItem::finish) {
                        items.push(done);
                    }
                } else if name.as_ref() == b"res"
                    && let Some(item) = current.as_mut()
                {
                    item.in_res = false;
                }
                tag = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((items, raw_count))
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr
            .map_err(|e| LumixError::ProtocolError(format!("Malformed XML attribute: {}", e)))?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_didl_date(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DAY_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Last non-empty path segment of an absolute URL or a camera path.
pub fn file_name_from_url(url: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(url) {
        return parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string);
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').find(|s| !s.is_empty()).map(str::to_string)
}
