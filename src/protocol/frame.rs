//! Outbound frames.
//!
//! A frame is one text message. Its parts are split by ASCII 30 (record
//! separator); the fields inside an entity record are split by ASCII 31 (unit
//! separator). The first part is the tag:
//!
//! ```text
//! v RS <counter> RS <record> RS <record> ...     visual
//! a RS <alias> RS <alias> ...                    audio
//! d RS <message>                                 debug
//! ```
//!
//! Entity records, fields in order:
//!
//! ```text
//! p  colour x y vx vy
//! s  alias  x y vx vy
//! l  colour x1 y1 x2 y2 vx vy
//! t  colour size font x y vx vy text
//! ```
//!
//! Velocities go out per *second* (per-tick velocity times the tick rate) so
//! the viewer can interpolate on wall-clock time between frames. Numbers are
//! written with one decimal place.
//!
//! Free text (colours, fonts, captions, debug messages) has both separators,
//! `\n` and `\r` replaced by a space before it is written, so a frame is
//! always a single line. This is lossy: none of those characters in a caption
//! can round-trip.

use std::borrow::Cow;

use crate::core::{AssetCatalog, Entity, Shape};
use crate::error::ProtocolError;

pub const RECORD_SEP: char = '\x1e';
pub const FIELD_SEP: char = '\x1f';

const RS: &str = "\x1e";
const US: &str = "\x1f";

const VISUAL_TAG: &str = "v";
const AUDIO_TAG: &str = "a";
const DEBUG_TAG: &str = "d";

/// A decoded frame. Record velocities are per second, as sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Visual { counter: u64, records: Vec<Record> },
    Audio(Vec<String>),
    Debug(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Point {
        colour: String,
        x: f64,
        y: f64,
        vx: f64,
        vy: f64,
    },
    Sprite {
        alias: String,
        x: f64,
        y: f64,
        vx: f64,
        vy: f64,
    },
    Line {
        colour: String,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        vx: f64,
        vy: f64,
    },
    Text {
        colour: String,
        size: f64,
        font: String,
        x: f64,
        y: f64,
        vx: f64,
        vy: f64,
        text: String,
    },
}

const RESERVED: [char; 4] = [RECORD_SEP, FIELD_SEP, '\n', '\r'];

/// Replace protocol separators and line breaks with a space.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if text.contains(RESERVED) {
        Cow::Owned(text.replace(RESERVED, " "))
    } else {
        Cow::Borrowed(text)
    }
}

pub fn encode_visual(counter: u64, entities: &[Entity], assets: &AssetCatalog, tick_rate: f64) -> String {
    let mut parts = Vec::with_capacity(entities.len() + 2);
    parts.push(VISUAL_TAG.to_string());
    parts.push(counter.to_string());
    parts.extend(entities.iter().map(|e| encode_entity(e, assets, tick_rate)));
    parts.join(RS)
}

fn encode_entity(entity: &Entity, assets: &AssetCatalog, tick_rate: f64) -> String {
    let vx = entity.vx * tick_rate;
    let vy = entity.vy * tick_rate;
    let (x, y) = (entity.x, entity.y);

    let fields: Vec<String> = match &entity.shape {
        Shape::Point { colour } => vec![
            "p".into(),
            sanitize(colour).into_owned(),
            num(x),
            num(y),
            num(vx),
            num(vy),
        ],
        Shape::Sprite { file } => vec![
            "s".into(),
            assets.sprite_alias(file).unwrap_or_default().to_string(),
            num(x),
            num(y),
            num(vx),
            num(vy),
        ],
        Shape::Line { colour, x2, y2 } => vec![
            "l".into(),
            sanitize(colour).into_owned(),
            num(x),
            num(y),
            num(*x2),
            num(*y2),
            num(vx),
            num(vy),
        ],
        Shape::Text {
            colour,
            size,
            font,
            text,
        } => vec![
            "t".into(),
            sanitize(colour).into_owned(),
            num(*size),
            sanitize(font).into_owned(),
            num(x),
            num(y),
            num(vx),
            num(vy),
            sanitize(text).into_owned(),
        ],
    };

    fields.join(US)
}

fn num(value: f64) -> String {
    format!("{value:.1}")
}

/// `None` when there is nothing to play.
pub fn encode_audio(cues: &[String]) -> Option<String> {
    if cues.is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(cues.len() + 1);
    parts.push(AUDIO_TAG);
    parts.extend(cues.iter().map(String::as_str));
    Some(parts.join(RS))
}

/// The viewer shows debug messages as HTML, so they are escaped as well as sanitized.
pub fn encode_debug(message: &str) -> String {
    format!("{DEBUG_TAG}{RECORD_SEP}{}", escape_html(&sanitize(message)))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn decode_frame(message: &str) -> Result<Frame, ProtocolError> {
    let mut parts = message.split(RECORD_SEP);
    let tag = parts.next().unwrap_or_default();

    match tag {
        VISUAL_TAG => {
            let raw_counter = parts.next().ok_or_else(|| ProtocolError::MalformedRecord(message.to_string()))?;
            let counter = raw_counter
                .parse()
                .map_err(|_| ProtocolError::MalformedRecord(raw_counter.to_string()))?;
            let records = parts.map(decode_record).collect::<Result<_, _>>()?;
            Ok(Frame::Visual { counter, records })
        }
        AUDIO_TAG => Ok(Frame::Audio(parts.map(str::to_string).collect())),
        DEBUG_TAG => Ok(Frame::Debug(parts.next().unwrap_or_default().to_string())),
        "" => Err(ProtocolError::Empty),
        other => Err(ProtocolError::UnknownFrameTag(other.to_string())),
    }
}

fn decode_record(raw: &str) -> Result<Record, ProtocolError> {
    let fields: Vec<&str> = raw.split(FIELD_SEP).collect();
    let malformed = || ProtocolError::MalformedRecord(raw.to_string());
    let float = |i: usize| -> Result<f64, ProtocolError> {
        fields.get(i).and_then(|f| f.parse().ok()).ok_or_else(|| malformed())
    };

    let record = match (fields[0], fields.len()) {
        ("p", 6) => Record::Point {
            colour: fields[1].to_string(),
            x: float(2)?,
            y: float(3)?,
            vx: float(4)?,
            vy: float(5)?,
        },
        ("s", 6) => Record::Sprite {
            alias: fields[1].to_string(),
            x: float(2)?,
            y: float(3)?,
            vx: float(4)?,
            vy: float(5)?,
        },
        ("l", 8) => Record::Line {
            colour: fields[1].to_string(),
            x1: float(2)?,
            y1: float(3)?,
            x2: float(4)?,
            y2: float(5)?,
            vx: float(6)?,
            vy: float(7)?,
        },
        ("t", 9) => Record::Text {
            colour: fields[1].to_string(),
            size: float(2)?,
            font: fields[3].to_string(),
            x: float(4)?,
            y: float(5)?,
            vx: float(6)?,
            vy: float(7)?,
            text: fields[8].to_string(),
        },
        _ => return Err(malformed()),
    };
    Ok(record)
}
