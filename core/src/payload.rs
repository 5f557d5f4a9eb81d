//! Request bodies sent by the write operations.
//!
//! XML documents are emitted through `quick_xml::Writer` and JSON through
//! serde, so caller text is always escaped and documents are well-formed.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::{PowerAction, ServerType, SupportLevel};

pub const XML_CONTENT_TYPE: &str = "application/xml";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Validated body of a server creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDocument {
    pub title: String,
    pub server_type: ServerType,
    pub memory: String,
    pub memory_max: String,
    pub hdd: String,
    pub support: SupportLevel,
    pub os: String,
}

impl ServerDocument {
    pub fn to_xml(&self) -> Result<String> {
        let support = self.support.code().to_string();
        let fields = [
            ("vps_title", self.title.as_str()),
            ("vps_type", self.server_type.as_str()),
            ("vps_memory", self.memory.as_str()),
            ("vps_memory_max", self.memory_max.as_str()),
            ("vps_hdd", self.hdd.as_str()),
            ("vps_admin", support.as_str()),
            ("vps_os", self.os.as_str()),
        ];

        let mut doc = XmlDocument::new()?;
        doc.write(Event::Start(BytesStart::new("server")))?;
        for (name, value) in fields {
            doc.write(Event::Start(BytesStart::new(name)))?;
            doc.write(Event::Text(BytesText::new(value)))?;
            doc.write(Event::End(BytesEnd::new(name)))?;
        }
        doc.write(Event::End(BytesEnd::new("server")))?;
        doc.finish()
    }
}

/// `<start/>`, `<stop/>` or `<reboot/>`.
pub fn power_action_xml(action: PowerAction) -> Result<String> {
    let mut doc = XmlDocument::new()?;
    doc.write(Event::Empty(BytesStart::new(action.as_str())))?;
    doc.finish()
}

/// `<rebuild imageId=".." vps_isp=".."/>`.
pub fn rebuild_xml(image_id: &str, isp: &str) -> Result<String> {
    let mut doc = XmlDocument::new()?;
    let element =
        BytesStart::new("rebuild").with_attributes([("imageId", image_id), ("vps_isp", isp)]);
    doc.write(Event::Empty(element))?;
    doc.finish()
}

/// Reporting window in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Serialize)]
struct BillingQuery {
    billing: Period,
}

#[derive(Debug, Serialize)]
struct StatsQuery {
    stats: Period,
}

/// `{"billing":{"from":..,"to":..}}`
pub fn billing_json(period: Period) -> Result<String> {
    to_json(&BillingQuery { billing: period })
}

/// `{"stats":{"from":..,"to":..}}`
pub fn stats_json(period: Period) -> Result<String> {
    to_json(&StatsQuery { stats: period })
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Serialization(e.to_string()))
}

/// An XML document that opens with the UTF-8 declaration and a newline.
struct XmlDocument {
    writer: Writer<Vec<u8>>,
}

impl XmlDocument {
    fn new() -> Result<Self> {
        let mut doc = Self {
            writer: Writer::new(Vec::new()),
        };
        doc.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        doc.write(Event::Text(BytesText::new("\n")))?;
        Ok(doc)
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}
