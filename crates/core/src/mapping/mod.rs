//! Maps the playback position onto the scalar highway parameters carried by
//! path events (zoom, pitch, lane offset, roll).

use serde::{Deserialize, Serialize};

use crate::chart::Time;

/// Which highway parameter a path track drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathKind {
    Zoom,
    Pitch,
    Offset,
    Roll,
}

impl PathKind {
    pub const ALL: [PathKind; 4] = [
        PathKind::Zoom,
        PathKind::Pitch,
        PathKind::Offset,
        PathKind::Roll,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            PathKind::Zoom => 0,
            PathKind::Pitch => 1,
            PathKind::Offset => 2,
            PathKind::Roll => 3,
        }
    }
}

/// A single path event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub position: Time,
    pub value: f32,
}

/// Ordered sequence of path points for one parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathTrack {
    points: Vec<PathPoint>,
}

impl PathTrack {
    /// Builds a track, sorting the points by position. Points sharing a
    /// position keep their input order, so the last one wins.
    pub fn new(mut points: Vec<PathPoint>) -> Self {
        points.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { points }
    }

    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Samples the track at `position`.
    ///
    /// Before the first point the first value is used, after the last point
    /// its value is held, and an empty track reads as zero.
    pub fn value_at(&self, position: Time) -> f32 {
        let count = self.points.partition_point(|p| p.position <= position);
        let Some(current) = count.checked_sub(1).map(|i| self.points[i]) else {
            return self.points.first().map(|p| p.value).unwrap_or(0.0);
        };

        match self.points.get(count) {
            Some(next) => {
                // next.position > position >= current.position, so the span is non-zero.
                let alpha = ((position - current.position) / (next.position - current.position)) as f32;
                lerp(current.value, next.value, alpha)
            }
            None => current.value,
        }
    }
}

/// Resolved path parameters for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PathValues {
    pub zoom: f32,
    pub pitch: f32,
    pub offset: f32,
    pub roll: f32,
}

/// One [`PathTrack`] per [`PathKind`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSet {
    tracks: [PathTrack; 4],
}

impl PathSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_track(&mut self, kind: PathKind, track: PathTrack) {
        self.tracks[kind.index()] = track;
    }

    pub fn track(&self, kind: PathKind) -> &PathTrack {
        &self.tracks[kind.index()]
    }

    pub fn resolve(&self, position: Time) -> PathValues {
        PathValues {
            zoom: self.track(PathKind::Zoom).value_at(position),
            pitch: self.track(PathKind::Pitch).value_at(position),
            offset: self.track(PathKind::Offset).value_at(position),
            roll: self.track(PathKind::Roll).value_at(position),
        }
    }
}

/// `a + (b - a) * alpha`; exact at `alpha == 0` and when `a == b`.
pub fn lerp(a: f32, b: f32, alpha: f32) -> f32 {
    a + (b - a) * alpha
}
