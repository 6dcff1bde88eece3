//! # Score Document
//!
//! Reads the MusicXML document handed to the player.
//!
//! ## Inspection
//! [`ScoreDocument::parse`] checks that the text is a well-formed `score-partwise` document
//! and pulls out what the player needs before conversion: the title and the measure count.
//!
//! ## Unrolling
//! [`unroll`] rewrites a document so that repeats are played out linearly. Each part's
//! measures are re-emitted in playback order and renumbered, and the `<repeat>` and
//! `<ending>` markup is dropped so the renderer shows a straight sequence.
//!
//! Playback order follows these rules:
//! - `||: ... :||` plays the section twice
//! - a first ending is played on the first pass only; the measures after the repeat (the
//!   second ending) continue after the second pass
//! - a backward repeat with no forward repeat replays from the end of the previous repeat
//!   (or the start of the piece), with the same first/second ending rule
//!
//! ```text
//! marks:  |  0  |: 1  |  2 [1. 3 :| [2. 4 |  5  |
//! order:     0     1     2     3     1     2     4     5
//! ```

use std::borrow::Cow;
use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::PlayerError;

const ROOT: &[u8] = b"score-partwise";

/// What the player reads from a document before conversion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreDocument {
    pub title: Option<String>,
    /// Measures in the first part.
    pub measure_count: usize,
    pub part_count: usize,
}

impl ScoreDocument {
    /// Inspect a MusicXML document.
    ///
    /// # Errors
    /// Returns [`PlayerError::Document`] if the text is not well-formed XML or the root
    /// element is not `score-partwise`.
    pub fn parse(text: &str) -> Result<Self, PlayerError> {
        let mut reader = Reader::from_str(text);
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut document = ScoreDocument::default();
        let mut work_title: Option<String> = None;
        let mut movement_title: Option<String> = None;
        let mut has_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.name().as_ref().to_vec();
                    document.observe_element(&path, &name)?;
                    has_root = true;
                    path.push(name);
                }
                Event::Empty(e) => {
                    document.observe_element(&path, e.name().as_ref())?;
                    has_root = true;
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    match path.as_slice() {
                        [_, work, title] if work == b"work" && title == b"work-title" => {
                            work_title.get_or_insert_with(|| text.to_string());
                        }
                        [_, title] if title == b"movement-title" => {
                            movement_title.get_or_insert_with(|| text.to_string());
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = path.last() {
            return Err(PlayerError::Document(format!(
                "unexpected end of document inside <{}>",
                String::from_utf8_lossy(open)
            )));
        }
        if !has_root {
            return Err(PlayerError::Document("missing score-partwise root".to_string()));
        }

        document.title = work_title.or(movement_title);
        Ok(document)
    }

    fn observe_element(&mut self, path: &[Vec<u8>], name: &[u8]) -> Result<(), PlayerError> {
        match path {
            [] if name != ROOT => Err(PlayerError::Document(format!(
                "expected <score-partwise> root, found <{}>",
                String::from_utf8_lossy(name)
            ))),
            [_] if name == b"part" => {
                self.part_count += 1;
                Ok(())
            }
            [_, part] if part == b"part" && name == b"measure" && self.part_count == 1 => {
                self.measure_count += 1;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    First,
    Second,
}

/// Repeat markup found on one measure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepeatMarks {
    pub repeat_start: bool,
    pub repeat_end: bool,
    pub ending: Option<Ending>,
}

impl RepeatMarks {
    fn is_plain(&self) -> bool {
        !self.repeat_start && !self.repeat_end && self.ending.is_none()
    }
}

/// Measure indices in the order they are played.
pub fn playback_order(measures: &[RepeatMarks]) -> Vec<usize> {
    let mut order = Vec::with_capacity(measures.len() * 2);
    let mut section_start = 0;
    let mut i = 0;

    while i < measures.len() {
        let marks = measures[i];
        if marks.repeat_start {
            let Some(end) = (i..measures.len()).find(|&j| measures[j].repeat_end) else {
                // Forward repeat that is never closed plays through
                order.push(i);
                i += 1;
                continue;
            };
            let main_end = (i..=end)
                .find(|&j| measures[j].ending == Some(Ending::First))
                .unwrap_or(end + 1);

            order.extend(i..=end);
            order.extend(i..main_end);
            i = end + 1;
            section_start = i;
        } else if marks.repeat_end {
            // Backward repeat alone: the measures before it were already played once
            let replay_end = (section_start..=i)
                .find(|&j| measures[j].ending == Some(Ending::First))
                .unwrap_or(i + 1);
            order.push(i);
            order.extend(section_start..replay_end);
            i += 1;
            section_start = i;
        } else {
            order.push(i);
            i += 1;
        }
    }

    order
}

struct MeasureXml<'a> {
    start: BytesStart<'a>,
    body: Vec<Event<'a>>,
    self_closing: bool,
    marks: RepeatMarks,
}

enum Chunk<'a> {
    Event(Event<'a>),
    Measures(Vec<MeasureXml<'a>>),
}

/// Play repeats out linearly. A document without repeats is returned unchanged.
///
/// # Errors
/// Returns [`PlayerError::Unroll`] if the document cannot be read or written back.
pub fn unroll(text: &str) -> Result<Cow<'_, str>, PlayerError> {
    let chunks = read_chunks(text).map_err(|e| PlayerError::Unroll(e.to_string()))?;

    let has_repeats = chunks.iter().any(|chunk| match chunk {
        Chunk::Measures(measures) => measures.iter().any(|m| !m.marks.is_plain()),
        Chunk::Event(_) => false,
    });
    if !has_repeats {
        return Ok(Cow::Borrowed(text));
    }

    let unrolled = write_chunks(&chunks).map_err(|e| PlayerError::Unroll(e.to_string()))?;
    Ok(Cow::Owned(unrolled))
}

fn read_chunks(text: &str) -> Result<Vec<Chunk<'_>>, quick_xml::Error> {
    let mut reader = Reader::from_str(text);
    let mut chunks: Vec<Chunk<'_>> = Vec::new();
    let mut current: Option<MeasureXml<'_>> = None;
    let mut depth = 0usize;
    let mut skip_from: Option<usize> = None;
    let mut open_ending: Option<Ending> = None;
    let mut close_ending = false;

    loop {
        let event = reader.read_event()?;

        if let Some(measure) = current.as_mut() {
            match &event {
                Event::End(_) if depth == 0 => {
                    if measure.marks.ending.is_none() {
                        measure.marks.ending = open_ending;
                    }
                    if std::mem::take(&mut close_ending) {
                        open_ending = None;
                    }
                    if let Some(measure) = current.take() {
                        push_measure(&mut chunks, measure);
                    }
                    continue;
                }
                Event::Eof => {
                    return Err(quick_xml::Error::UnexpectedEof("measure".to_string()));
                }
                _ => {}
            }

            let skipping = skip_from.is_some();
            match &event {
                Event::Start(e) => {
                    if skip_from.is_none() && is_repeat_markup(e) {
                        read_marks(e, &mut measure.marks, &mut open_ending, &mut close_ending)?;
                        skip_from = Some(depth);
                    }
                    depth += 1;
                }
                Event::Empty(e) if skip_from.is_none() && is_repeat_markup(e) => {
                    read_marks(e, &mut measure.marks, &mut open_ending, &mut close_ending)?;
                    continue;
                }
                Event::End(_) => {
                    depth -= 1;
                    if skip_from == Some(depth) {
                        skip_from = None;
                        continue;
                    }
                }
                _ => {}
            }
            if !skipping && skip_from.is_none() {
                measure.body.push(event);
            }
            continue;
        }

        match event {
            Event::Start(e) if e.name().as_ref() == b"measure" => {
                current = Some(MeasureXml {
                    start: e,
                    body: Vec::new(),
                    self_closing: false,
                    marks: RepeatMarks::default(),
                });
                depth = 0;
            }
            Event::Empty(e) if e.name().as_ref() == b"measure" => {
                let marks = RepeatMarks {
                    ending: open_ending,
                    ..RepeatMarks::default()
                };
                push_measure(
                    &mut chunks,
                    MeasureXml {
                        start: e,
                        body: Vec::new(),
                        self_closing: true,
                        marks,
                    },
                );
            }
            Event::Text(t)
                if t.iter().all(u8::is_ascii_whitespace)
                    && matches!(chunks.last(), Some(Chunk::Measures(_))) => {}
            Event::Eof => break,
            other => chunks.push(Chunk::Event(other)),
        }
    }

    Ok(chunks)
}

fn push_measure<'a>(chunks: &mut Vec<Chunk<'a>>, measure: MeasureXml<'a>) {
    match chunks.last_mut() {
        Some(Chunk::Measures(measures)) => measures.push(measure),
        _ => chunks.push(Chunk::Measures(vec![measure])),
    }
}

fn is_repeat_markup(e: &BytesStart<'_>) -> bool {
    matches!(e.name().as_ref(), b"repeat" | b"ending")
}

fn read_marks(
    e: &BytesStart<'_>,
    marks: &mut RepeatMarks,
    open_ending: &mut Option<Ending>,
    close_ending: &mut bool,
) -> Result<(), quick_xml::Error> {
    let attribute = |key: &[u8]| -> Result<Option<String>, quick_xml::Error> {
        match e.try_get_attribute(key)? {
            Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
            None => Ok(None),
        }
    };

    if e.name().as_ref() == b"repeat" {
        match attribute(b"direction")?.as_deref() {
            Some("forward") => marks.repeat_start = true,
            Some("backward") => marks.repeat_end = true,
            _ => {}
        }
        return Ok(());
    }

    let ending = match attribute(b"number")?.as_deref().map(str::trim) {
        Some("1") => Some(Ending::First),
        Some("2") => Some(Ending::Second),
        _ => None,
    };
    match attribute(b"type")?.as_deref() {
        Some("start") => {
            marks.ending = ending;
            *open_ending = ending;
        }
        Some("stop") | Some("discontinue") => {
            if marks.ending.is_none() {
                marks.ending = ending.or(*open_ending);
            }
            *close_ending = true;
        }
        _ => {}
    }
    Ok(())
}

fn write_chunks(chunks: &[Chunk<'_>]) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    for chunk in chunks {
        match chunk {
            Chunk::Event(event) => writer.write_event(event)?,
            Chunk::Measures(measures) => {
                let marks: Vec<RepeatMarks> = measures.iter().map(|m| m.marks).collect();
                for (position, index) in playback_order(&marks).into_iter().enumerate() {
                    let measure = &measures[index];
                    let start = renumber(&measure.start, position + 1)?;
                    if measure.self_closing {
                        writer.write_event(Event::Empty(start))?;
                        continue;
                    }
                    writer.write_event(Event::Start(start))?;
                    for event in &measure.body {
                        writer.write_event(event)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("measure")))?;
                }
            }
        }
    }

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| quick_xml::Error::NonDecodable(Some(e.utf8_error())))
}

fn renumber(start: &BytesStart<'_>, number: usize) -> Result<BytesStart<'static>, quick_xml::Error> {
    let mut renumbered = BytesStart::new("measure");
    renumbered.push_attribute(("number", number.to_string().as_str()));
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"number" {
            renumbered.push_attribute(attr);
        }
    }
    Ok(renumbered)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITH_REPEAT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <work><work-title>Little Repeat</work-title></work>
  <part-list><score-part id="P1"><part-name>Music</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1"><note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration></note></measure>
    <measure number="2"><barline location="left"><repeat direction="forward"/></barline><note><pitch><step>D</step><octave>4</octave></pitch><duration>4</duration></note></measure>
    <measure number="3"><barline location="left"><ending number="1" type="start">1.</ending></barline><note><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration></note><barline location="right"><ending number="1" type="stop"/><repeat direction="backward"/></barline></measure>
    <measure number="4"><barline location="left"><ending number="2" type="start">2.</ending></barline><note><pitch><step>F</step><octave>4</octave></pitch><duration>4</duration></note><barline location="right"><ending number="2" type="discontinue"/></barline></measure>
  </part>
</score-partwise>
"#;

    const PLAIN: &str = r#"<score-partwise version="4.0">
  <movement-title>Plain Song</movement-title>
  <part id="P1">
    <measure number="1"/>
    <measure number="2"/>
  </part>
</score-partwise>"#;

    fn steps(xml: &str) -> String {
        xml.split("<step>")
            .skip(1)
            .filter_map(|rest| rest.chars().next())
            .collect()
    }

    fn marks(repeat_start: bool, repeat_end: bool, ending: Option<Ending>) -> RepeatMarks {
        RepeatMarks {
            repeat_start,
            repeat_end,
            ending,
        }
    }

    #[test]
    fn test_parse_reads_work_title_and_measures() {
        let document = ScoreDocument::parse(WITH_REPEAT).unwrap();
        assert_eq!(document.title.as_deref(), Some("Little Repeat"));
        assert_eq!(document.measure_count, 4);
        assert_eq!(document.part_count, 1);
    }

    #[test]
    fn test_parse_falls_back_to_movement_title() {
        let document = ScoreDocument::parse(PLAIN).unwrap();
        assert_eq!(document.title.as_deref(), Some("Plain Song"));
        assert_eq!(document.measure_count, 2);
    }

    #[test]
    fn test_parse_rejects_other_roots() {
        let result = ScoreDocument::parse("<score-timewise></score-timewise>");
        assert!(matches!(result, Err(PlayerError::Document(_))));
    }

    #[test]
    fn test_parse_rejects_malformed_xml() {
        assert!(ScoreDocument::parse("<score-partwise><part></score-partwise>").is_err());
        assert!(ScoreDocument::parse("<score-partwise><part>").is_err());
        assert!(ScoreDocument::parse("").is_err());
    }

    #[test]
    fn test_order_without_repeats() {
        let plain = vec![RepeatMarks::default(); 3];
        assert_eq!(playback_order(&plain), vec![0, 1, 2]);
    }

    #[test]
    fn test_order_simple_repeat() {
        let measures = vec![
            RepeatMarks::default(),
            marks(true, false, None),
            marks(false, true, None),
            RepeatMarks::default(),
        ];
        assert_eq!(playback_order(&measures), vec![0, 1, 2, 1, 2, 3]);
    }

    #[test]
    fn test_order_with_endings() {
        let measures = vec![
            RepeatMarks::default(),
            marks(true, false, None),
            RepeatMarks::default(),
            marks(false, true, Some(Ending::First)),
            marks(false, false, Some(Ending::Second)),
            RepeatMarks::default(),
        ];
        assert_eq!(playback_order(&measures), vec![0, 1, 2, 3, 1, 2, 4, 5]);
    }

    #[test]
    fn test_order_backward_repeat_with_endings() {
        let measures = vec![
            RepeatMarks::default(),
            marks(false, true, Some(Ending::First)),
            marks(false, false, Some(Ending::Second)),
            RepeatMarks::default(),
        ];
        assert_eq!(playback_order(&measures), vec![0, 1, 0, 2, 3]);
    }

    #[test]
    fn test_order_backward_repeat_with_long_first_ending() {
        let measures = vec![
            RepeatMarks::default(),
            marks(false, false, Some(Ending::First)),
            marks(false, true, Some(Ending::First)),
            marks(false, false, Some(Ending::Second)),
        ];
        assert_eq!(playback_order(&measures), vec![0, 1, 2, 0, 3]);
    }

    #[test]
    fn test_order_backward_repeat_only() {
        let measures = vec![
            RepeatMarks::default(),
            marks(false, true, None),
            RepeatMarks::default(),
        ];
        assert_eq!(playback_order(&measures), vec![0, 1, 0, 1, 2]);
    }

    #[test]
    fn test_order_second_backward_repeat_starts_after_first() {
        let measures = vec![
            marks(false, true, None),
            RepeatMarks::default(),
            marks(false, true, None),
        ];
        assert_eq!(playback_order(&measures), vec![0, 0, 1, 2, 1, 2]);
    }

    #[test]
    fn test_order_unclosed_forward_repeat() {
        let measures = vec![marks(true, false, None), RepeatMarks::default()];
        assert_eq!(playback_order(&measures), vec![0, 1]);
    }

    #[test]
    fn test_unroll_without_repeats_is_unchanged() {
        let unrolled = unroll(PLAIN).unwrap();
        assert!(matches!(unrolled, Cow::Borrowed(_)));
    }

    #[test]
    fn test_unroll_plays_repeat_out() {
        let unrolled = unroll(WITH_REPEAT).unwrap();
        assert_eq!(steps(&unrolled), "CDEDF");
        assert!(!unrolled.contains("<repeat"));
        assert!(!unrolled.contains("<ending"));
        assert!(unrolled.contains(r#"<measure number="5">"#));

        let document = ScoreDocument::parse(&unrolled).unwrap();
        assert_eq!(document.measure_count, 5);
        assert_eq!(document.title.as_deref(), Some("Little Repeat"));
    }

    #[test]
    fn test_unroll_reports_broken_documents() {
        let result = unroll("<score-partwise><part><measure number=\"1\">");
        assert!(matches!(result, Err(PlayerError::Unroll(_))));
    }
}
