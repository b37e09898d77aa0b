//! XMLTV guide indexer
//! Streaming parser for the channel list of an XMLTV document - builds a
//! display-name -> channel-id lookup without holding the document in memory.
//! Supports both plain XML and gzip-compressed (.xml.gz) files.

use std::collections::HashMap;
use std::io::{BufRead, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

#[derive(Debug, thiserror::Error)]
pub enum GuideParseError {
    #[error("cannot read guide file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed guide document at byte {position}: {source}")]
    Parse {
        position: u64,
        source: quick_xml::Error,
    },
}

/// Lookup table from lowercased channel display name to channel id.
///
/// Built fresh for every sync of every entry, used by exactly one rewrite
/// and discarded. Duplicate display names collapse to the last channel
/// parsed, which matches the behavior downstream players already rely on.
#[derive(Debug, Default)]
pub struct GuideIndex {
    by_name: HashMap<String, String>,
}

impl GuideIndex {
    /// Build an index from a guide file - auto-detects gzip compression
    pub fn from_file(path: &Path) -> Result<Self, GuideParseError> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::with_capacity(64 * 1024, file);

        // Check the first 2 bytes for the gzip magic number (1f 8b)
        let mut magic = [0u8; 2];
        let peeked = reader.read(&mut magic)?;
        reader.seek(SeekFrom::Start(0))?;

        if peeked == 2 && magic[0] == 0x1f && magic[1] == 0x8b {
            let decoder = GzDecoder::new(reader);
            Self::from_reader(std::io::BufReader::with_capacity(64 * 1024, decoder))
        } else {
            Self::from_reader(reader)
        }
    }

    /// Build an index from an XMLTV string (for smaller documents and tests)
    pub fn from_xml(xml: &str) -> Result<Self, GuideParseError> {
        Self::from_reader(xml.as_bytes())
    }

    /// Build an index from a reader - streaming, handles large files
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, GuideParseError> {
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.config_mut().trim_text(true);

        let mut by_name = HashMap::new();
        let mut buf = Vec::with_capacity(8192);

        // Channel currently open, if any
        let mut channel_id: Option<String> = None;
        let mut channel_name: Option<String> = None;
        let mut in_display_name = false;
        let mut text_buf = String::new();

        loop {
            let position = xml_reader.buffer_position();
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"channel" => {
                        channel_id = get_attribute(e, b"id");
                        channel_name = None;
                    }
                    // XMLTV allows several display-name children; the first
                    // non-empty one wins, same as the players we feed
                    b"display-name" if channel_id.is_some() && channel_name.is_none() => {
                        in_display_name = true;
                        text_buf.clear();
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if in_display_name {
                        let raw = String::from_utf8_lossy(e.as_ref());
                        text_buf.push_str(&decode_xml_entities(&raw));
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"display-name" if in_display_name => {
                        in_display_name = false;
                        let name = text_buf.trim();
                        if !name.is_empty() {
                            channel_name = Some(name.to_string());
                        }
                    }
                    b"channel" => {
                        if let (Some(id), Some(name)) = (channel_id.take(), channel_name.take()) {
                            if !id.is_empty() {
                                by_name.insert(name.to_lowercase(), id);
                            }
                        }
                        channel_id = None;
                        channel_name = None;
                        in_display_name = false;
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(source) => return Err(GuideParseError::Parse { position, source }),
            }
            buf.clear();
        }

        Ok(Self { by_name })
    }

    /// Look up a channel id by display name, case-insensitively
    pub fn lookup(&self, display_name: &str) -> Option<&str> {
        self.by_name
            .get(&display_name.to_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Get attribute value from XML element
fn get_attribute(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let raw = String::from_utf8(attr.value.as_ref().to_vec()).ok()?;
            return Some(decode_xml_entities(&raw));
        }
    }
    None
}

/// Decode XML entities back to normal characters
fn decode_xml_entities(s: &str) -> String {
    let mut result = s.to_string();

    result = result.replace("&amp;", "&");
    result = result.replace("&lt;", "<");
    result = result.replace("&gt;", ">");
    result = result.replace("&quot;", "\"");
    result = result.replace("&apos;", "'");

    // Numeric entities, decimal and hex
    while let Some(start) = result.find("&#") {
        if let Some(end) = result[start..].find(';') {
            let entity = &result[start..start + end + 1];
            let num_str = &entity[2..entity.len() - 1];

            let decoded = if num_str.starts_with('x') || num_str.starts_with('X') {
                u32::from_str_radix(&num_str[1..], 16).ok()
            } else {
                num_str.parse::<u32>().ok()
            };

            if let Some(c) = decoded.and_then(char::from_u32) {
                result = result.replace(entity, &c.to_string());
                continue;
            }
        }
        break; // Malformed entity, stop processing
    }

    result
}
