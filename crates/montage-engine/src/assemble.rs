use crate::error::{EngineError, EngineResult};
use crate::normalize::{Canvas, VisualSegment};

/// How consecutive main-body segments are joined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Cut,
    /// Each segment after the first fades in over the last `fade` seconds of its predecessor
    Crossfade { fade: f64 },
}

/// A segment placed on the output time axis
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub segment: VisualSegment,
    /// Offset in seconds from the start of the output
    pub start: f64,
    /// Opacity ramp applied over the overlap with the previous entry
    pub fade_in: Option<f64>,
}

impl TimelineEntry {
    pub fn end(&self) -> f64 {
        self.start + self.segment.duration
    }
}

/// Continuous sequence of segments with an optional hard-cut closer
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    closing: Option<TimelineEntry>,
    transition: Transition,
}

impl Timeline {
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn closing(&self) -> Option<&TimelineEntry> {
        self.closing.as_ref()
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn canvas(&self) -> Canvas {
        self.entries[0].segment.canvas
    }

    /// Length of the main body, overlaps already subtracted
    pub fn main_duration(&self) -> f64 {
        self.entries.last().map(TimelineEntry::end).unwrap_or(0.0)
    }

    /// Length of the whole output including the closer
    pub fn duration(&self) -> f64 {
        match &self.closing {
            Some(closing) => closing.end(),
            None => self.main_duration(),
        }
    }
}

/// Lay segments out on a timeline
///
/// With `crossfade` each segment after the first starts `fade` seconds before the
/// previous one ends. The closing segment is always hard-appended after the main
/// body. A non-positive `fade` degrades to hard cuts.
pub fn assemble(
    segments: Vec<VisualSegment>,
    closing: Option<VisualSegment>,
    crossfade: bool,
    fade: f64,
) -> EngineResult<Timeline> {
    if segments.is_empty() {
        return Err(EngineError::EmptySegmentList);
    }

    let transition = if crossfade && fade > 0.0 {
        Transition::Crossfade { fade }
    } else {
        Transition::Cut
    };

    let mut entries: Vec<TimelineEntry> = Vec::with_capacity(segments.len());
    for segment in segments {
        let entry = match (entries.last(), transition) {
            (None, _) => TimelineEntry { segment, start: 0.0, fade_in: None },
            (Some(prev), Transition::Cut) => TimelineEntry {
                start: prev.end(),
                segment,
                fade_in: None,
            },
            (Some(prev), Transition::Crossfade { fade }) => TimelineEntry {
                start: prev.end() - fade,
                segment,
                fade_in: Some(fade),
            },
        };
        entries.push(entry);
    }

    let main_end = entries.last().map(TimelineEntry::end).unwrap_or(0.0);
    let closing = closing.map(|segment| TimelineEntry {
        segment,
        start: main_end,
        fade_in: None,
    });

    Ok(Timeline {
        entries,
        closing,
        transition,
    })
}
