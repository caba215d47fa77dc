//! Sliding-window chart playback.
//!
//! The scheduler tracks one playback position and reports every boundary an
//! object (or event) crosses when that position moves. Three boundaries move
//! with the position `t`:
//!
//! * primary, at `t + look_ahead`: heads crossing it make objects appear;
//! * critical, at `t`: heads and tails crossing it begin and end gameplay;
//! * secondary, at `t - look_behind`: tails crossing it make objects disappear.
//!
//! A head has passed a boundary `b` when `head <= b`; a tail has passed it when
//! `tail < b`. Objects on one lane never overlap, so each crossing set is a
//! contiguous index range found by binary search and the scheduler needs no
//! state besides its last position.

use std::{cmp::Ordering, ops::Range, sync::Arc};

use crate::chart::{Chart, EventId, Lane, ObjectId, PerLane, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrossingKind {
    HeadCrossPrimary,
    TailCrossSecondary,
    HeadCrossCritical,
    TailCrossCritical,
}

/// What crossed a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackItem {
    Object(ObjectId),
    Event(EventId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub kind: CrossingKind,
    pub direction: PlayDirection,
    pub item: PlaybackItem,
    /// Chart position of the edge that crossed.
    pub at: Time,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    head: Time,
    tail: Time,
    item: PlaybackItem,
}

impl Span {
    /// Spans whose head lies in `(lo, hi]`.
    fn heads_between(spans: &[Span], lo: Time, hi: Time) -> Range<usize> {
        spans.partition_point(|s| s.head <= lo)..spans.partition_point(|s| s.head <= hi)
    }

    /// Spans whose tail lies in `[lo, hi)`.
    fn tails_between(spans: &[Span], lo: Time, hi: Time) -> Range<usize> {
        spans.partition_point(|s| s.tail < lo)..spans.partition_point(|s| s.tail < hi)
    }
}

/// Crossing plus the tie-breaking data used to order a batch.
#[derive(Debug, Clone, Copy)]
struct Pending {
    rank: u8,
    head: Time,
    crossing: Crossing,
}

pub struct PlaybackScheduler {
    chart: Arc<Chart>,
    lanes: PerLane<Vec<Span>>,
    events: Vec<Span>,
    look_ahead: Time,
    look_behind: Time,
    position: Option<Time>,
    pending: Vec<Pending>,
}

impl PlaybackScheduler {
    pub fn new(chart: Arc<Chart>, look_ahead: Time, look_behind: Time) -> Self {
        let lanes = PerLane::from_fn(|lane| {
            chart
                .lane_objects(lane)
                .map(|obj| Span {
                    head: obj.position,
                    tail: obj.end_position(),
                    item: PlaybackItem::Object(obj.id),
                })
                .collect()
        });
        let events = chart
            .events()
            .iter()
            .map(|evt| Span {
                head: evt.position,
                tail: evt.position,
                item: PlaybackItem::Event(evt.id),
            })
            .collect();

        Self {
            chart,
            lanes,
            events,
            look_ahead: look_ahead.max(0.0),
            look_behind: look_behind.max(0.0),
            position: None,
            pending: Vec::new(),
        }
    }

    pub fn chart(&self) -> &Arc<Chart> {
        &self.chart
    }

    pub fn look_ahead(&self) -> Time {
        self.look_ahead
    }

    pub fn look_behind(&self) -> Time {
        self.look_behind
    }

    /// Last position handed to [`set_position`](Self::set_position) or
    /// [`reset_to`](Self::reset_to).
    pub fn position(&self) -> Option<Time> {
        self.position
    }

    /// Forgets the position; the next `set_position` replays every crossing
    /// from the start of the chart.
    pub fn reset(&mut self) {
        self.position = None;
    }

    /// Jumps to `position` without emitting crossings. Callers rebuild their
    /// state from [`visible_objects`](Self::visible_objects) and
    /// [`active_object`](Self::active_object).
    pub fn reset_to(&mut self, position: Time) {
        if position.is_nan() {
            tracing::warn!("ignoring NaN playback position");
            return;
        }
        self.position = Some(position);
    }

    /// Moves to `position`, writing every crossing into `out` (cleared first).
    ///
    /// Forward batches list appearances, then critical crossings in ascending
    /// chart order, then disappearances. Backward batches are the exact
    /// reverse, so an object always appears before it can disappear.
    pub fn set_position(&mut self, position: Time, out: &mut Vec<Crossing>) {
        out.clear();
        if position.is_nan() {
            tracing::warn!("ignoring NaN playback position");
            return;
        }

        let previous = self.position.replace(position).unwrap_or(f64::NEG_INFINITY);
        let direction = match position.partial_cmp(&previous) {
            Some(Ordering::Greater) => PlayDirection::Forward,
            Some(Ordering::Less) => PlayDirection::Backward,
            _ => return,
        };
        let (lo, hi) = match direction {
            PlayDirection::Forward => (previous, position),
            PlayDirection::Backward => (position, previous),
        };

        let mut pending = std::mem::take(&mut self.pending);
        pending.clear();

        for (_, spans) in self.lanes.iter() {
            Self::collect(
                &mut pending,
                spans,
                Span::heads_between(spans, lo + self.look_ahead, hi + self.look_ahead),
                0,
                CrossingKind::HeadCrossPrimary,
                direction,
            );
            Self::collect_critical(&mut pending, spans, lo, hi, direction);
            Self::collect(
                &mut pending,
                spans,
                Span::tails_between(spans, lo - self.look_behind, hi - self.look_behind),
                2,
                CrossingKind::TailCrossSecondary,
                direction,
            );
        }
        // Events have no rendered span; only the critical line matters.
        Self::collect_critical(&mut pending, &self.events, lo, hi, direction);

        pending.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then(a.crossing.at.total_cmp(&b.crossing.at))
                .then(a.head.total_cmp(&b.head))
                .then(edge_order(a.crossing.kind).cmp(&edge_order(b.crossing.kind)))
        });
        if direction == PlayDirection::Backward {
            pending.reverse();
        }

        out.extend(pending.iter().map(|p| p.crossing));
        for crossing in out.iter() {
            tracing::trace!(?crossing, "crossing");
        }
        self.pending = pending;
    }

    fn collect_critical(
        pending: &mut Vec<Pending>,
        spans: &[Span],
        lo: Time,
        hi: Time,
        direction: PlayDirection,
    ) {
        Self::collect(
            pending,
            spans,
            Span::heads_between(spans, lo, hi),
            1,
            CrossingKind::HeadCrossCritical,
            direction,
        );
        Self::collect(
            pending,
            spans,
            Span::tails_between(spans, lo, hi),
            1,
            CrossingKind::TailCrossCritical,
            direction,
        );
    }

    fn collect(
        pending: &mut Vec<Pending>,
        spans: &[Span],
        range: Range<usize>,
        rank: u8,
        kind: CrossingKind,
        direction: PlayDirection,
    ) {
        if range.is_empty() {
            return;
        }
        pending.extend(spans[range].iter().map(|span| Pending {
            rank,
            head: span.head,
            crossing: Crossing {
                kind,
                direction,
                item: span.item,
                at: match kind {
                    CrossingKind::HeadCrossPrimary | CrossingKind::HeadCrossCritical => span.head,
                    CrossingKind::TailCrossSecondary | CrossingKind::TailCrossCritical => {
                        span.tail
                    }
                },
            },
        }));
    }

    /// Objects on `lane` whose span overlaps
    /// `[t - look_behind, t + look_ahead]`.
    pub fn visible_objects(&self, lane: Lane) -> impl Iterator<Item = ObjectId> + '_ {
        let range = match self.position {
            Some(t) => {
                let spans = &self.lanes[lane];
                spans.partition_point(|s| s.tail < t - self.look_behind)
                    ..spans.partition_point(|s| s.head <= t + self.look_ahead)
            }
            None => 0..0,
        };
        self.lanes[lane]
            .get(range)
            .unwrap_or_default()
            .iter()
            .filter_map(|span| match span.item {
                PlaybackItem::Object(id) => Some(id),
                PlaybackItem::Event(_) => None,
            })
    }

    /// Object on `lane` spanning the critical line. When several do (a slam
    /// and the segment it connects to), the latest one wins.
    pub fn active_object(&self, lane: Lane) -> Option<ObjectId> {
        let t = self.position?;
        let spans = &self.lanes[lane];
        let range = spans.partition_point(|s| s.tail < t)..spans.partition_point(|s| s.head <= t);
        spans.get(range)?.last().and_then(|span| match span.item {
            PlaybackItem::Object(id) => Some(id),
            PlaybackItem::Event(_) => None,
        })
    }

    /// Events at or before the current position, in chart order.
    pub fn passed_events(&self) -> impl Iterator<Item = EventId> + '_ {
        let count = match self.position {
            Some(t) => self.events.partition_point(|s| s.head <= t),
            None => 0,
        };
        self.events[..count].iter().filter_map(|span| match span.item {
            PlaybackItem::Event(id) => Some(id),
            PlaybackItem::Object(_) => None,
        })
    }
}

/// Head before tail for the same instant when moving forward.
fn edge_order(kind: CrossingKind) -> u8 {
    match kind {
        CrossingKind::HeadCrossPrimary | CrossingKind::HeadCrossCritical => 0,
        CrossingKind::TailCrossSecondary | CrossingKind::TailCrossCritical => 1,
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("position", &self.position)
            .field("look_ahead", &self.look_ahead)
            .field("look_behind", &self.look_behind)
            .field("events", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::chart::{AnalogSegment, EventKind};

    const LOOK_AHEAD: Time = 0.75;

    fn chart() -> Arc<Chart> {
        let mut builder = Chart::builder();
        builder.button(Lane::BT_A, 1.0, 0.0).unwrap();
        builder.button(Lane::BT_A, 1.5, 1.0).unwrap();
        builder.button(Lane::BT_A, 2.5, 0.0).unwrap();
        builder.button(Lane::BT_B, 0.2, 4.0).unwrap();
        builder.button(Lane::FX_L, 3.0, 0.25).unwrap();
        builder
            .analog(Lane::LASER_L, 1.0, 2.0, AnalogSegment::new(0.0, 1.0))
            .unwrap();
        builder
            .analog(Lane::LASER_L, 3.0, 0.0, AnalogSegment::new(1.0, 0.0).connected())
            .unwrap();
        builder
            .analog(Lane::LASER_R, 5.0, 0.5, AnalogSegment::new(1.0, 0.5))
            .unwrap();
        builder.event(2.0, EventKind::LaserFilterGain { gain: 0.3 });
        Arc::new(builder.build().unwrap())
    }

    /// Visible set tracked purely from notifications.
    #[derive(Default)]
    struct Tracker {
        visible: BTreeSet<ObjectId>,
        active: BTreeSet<ObjectId>,
    }

    impl Tracker {
        fn apply(&mut self, crossings: &[Crossing]) {
            for c in crossings {
                let PlaybackItem::Object(id) = c.item else {
                    continue;
                };
                use CrossingKind::*;
                use PlayDirection::*;
                let (set, insert) = match (c.kind, c.direction) {
                    (HeadCrossPrimary, Forward) | (TailCrossSecondary, Backward) => {
                        (&mut self.visible, true)
                    }
                    (HeadCrossPrimary, Backward) | (TailCrossSecondary, Forward) => {
                        (&mut self.visible, false)
                    }
                    (HeadCrossCritical, Forward) | (TailCrossCritical, Backward) => {
                        (&mut self.active, true)
                    }
                    (HeadCrossCritical, Backward) | (TailCrossCritical, Forward) => {
                        (&mut self.active, false)
                    }
                };
                if insert {
                    assert!(set.insert(id), "{id:?} inserted twice by {c:?}");
                } else {
                    assert!(set.remove(&id), "{id:?} removed while absent by {c:?}");
                }
            }
        }
    }

    fn brute_visible(chart: &Chart, t: Time) -> BTreeSet<ObjectId> {
        chart
            .objects()
            .iter()
            .filter(|o| o.position <= t + LOOK_AHEAD && o.end_position() >= t)
            .map(|o| o.id)
            .collect()
    }

    fn brute_active(chart: &Chart, t: Time) -> BTreeSet<ObjectId> {
        chart
            .objects()
            .iter()
            .filter(|o| o.contains(t))
            .map(|o| o.id)
            .collect()
    }

    fn scheduler_visible(scheduler: &PlaybackScheduler) -> BTreeSet<ObjectId> {
        Lane::ALL
            .iter()
            .flat_map(|lane| scheduler.visible_objects(*lane))
            .collect()
    }

    #[test]
    fn forward_steps_keep_window_consistent() {
        let chart = chart();
        let mut scheduler = PlaybackScheduler::new(chart.clone(), LOOK_AHEAD, 0.0);
        let mut tracker = Tracker::default();
        let mut out = Vec::new();

        // Uneven steps, including ones larger than the window.
        let steps = [0.013, 0.2, 0.0625, 1.1, 0.004, 0.33, 0.5, 2.2, 0.01];
        let mut t = -1.0;
        for step in steps.iter().cycle().take(40) {
            t += step;
            scheduler.set_position(t, &mut out);
            tracker.apply(&out);

            assert_eq!(tracker.visible, brute_visible(&chart, t), "visible at {t}");
            assert_eq!(tracker.active, brute_active(&chart, t), "active at {t}");
            assert_eq!(scheduler_visible(&scheduler), tracker.visible);
        }
    }

    #[test]
    fn reversing_matches_a_fresh_seek() {
        let chart = chart();
        let mut scheduler = PlaybackScheduler::new(chart.clone(), LOOK_AHEAD, 0.0);
        let mut tracker = Tracker::default();
        let mut out = Vec::new();

        let mut t = -0.5;
        while t < 4.2 {
            t += 0.07;
            scheduler.set_position(t, &mut out);
            tracker.apply(&out);
        }
        while t > 1.3 {
            t -= 0.05;
            scheduler.set_position(t, &mut out);
            tracker.apply(&out);
        }

        let mut fresh = PlaybackScheduler::new(chart.clone(), LOOK_AHEAD, 0.0);
        let mut fresh_tracker = Tracker::default();
        fresh.set_position(t, &mut out);
        fresh_tracker.apply(&out);

        assert_eq!(tracker.visible, fresh_tracker.visible);
        assert_eq!(tracker.active, fresh_tracker.active);
        for lane in Lane::ALL {
            assert_eq!(scheduler.active_object(lane), fresh.active_object(lane));
        }
    }

    fn is_critical(crossing: &Crossing) -> bool {
        matches!(
            crossing.kind,
            CrossingKind::HeadCrossCritical | CrossingKind::TailCrossCritical
        )
    }

    #[test]
    fn instant_objects_cross_head_then_tail() {
        let chart = chart();
        let mut scheduler = PlaybackScheduler::new(chart.clone(), LOOK_AHEAD, 0.0);
        let mut out = Vec::new();
        let chip = PlaybackItem::Object(chart.lane_ids(Lane::BT_A)[0]);

        scheduler.reset_to(0.9);
        scheduler.set_position(1.1, &mut out);
        let kinds: Vec<_> = out
            .iter()
            .filter(|c| c.item == chip && is_critical(c))
            .map(|c| c.kind)
            .collect();
        assert_eq!(
            kinds,
            [CrossingKind::HeadCrossCritical, CrossingKind::TailCrossCritical]
        );
        // with no look-behind the tail also leaves the window at once
        assert!(out
            .iter()
            .any(|c| c.item == chip && c.kind == CrossingKind::TailCrossSecondary));

        scheduler.set_position(0.9, &mut out);
        let kinds: Vec<_> = out
            .iter()
            .filter(|c| c.item == chip && is_critical(c))
            .map(|c| c.kind)
            .collect();
        assert_eq!(
            kinds,
            [CrossingKind::TailCrossCritical, CrossingKind::HeadCrossCritical]
        );
        assert!(out.iter().all(|c| c.direction == PlayDirection::Backward));
    }

    #[test]
    fn connected_segments_end_before_the_next_begins() {
        let chart = chart();
        let mut scheduler = PlaybackScheduler::new(chart.clone(), LOOK_AHEAD, 0.0);
        let mut out = Vec::new();
        let [segment, slam] = [chart.lane_ids(Lane::LASER_L)[0], chart.lane_ids(Lane::LASER_L)[1]];

        scheduler.reset_to(2.9);
        scheduler.set_position(3.1, &mut out);
        let critical: Vec<_> = out
            .iter()
            .filter(|c| is_critical(c))
            .filter(|c| matches!(c.item, PlaybackItem::Object(id) if id == segment || id == slam))
            .map(|c| (c.kind, c.item))
            .collect();
        assert_eq!(
            critical,
            [
                (CrossingKind::TailCrossCritical, PlaybackItem::Object(segment)),
                (CrossingKind::HeadCrossCritical, PlaybackItem::Object(slam)),
                (CrossingKind::TailCrossCritical, PlaybackItem::Object(slam)),
            ]
        );
    }

    #[test]
    fn events_only_cross_the_critical_line() {
        let chart = chart();
        let mut scheduler = PlaybackScheduler::new(chart, LOOK_AHEAD, 0.0);
        let mut out = Vec::new();

        scheduler.set_position(1.9, &mut out);
        assert!(!out.iter().any(|c| matches!(c.item, PlaybackItem::Event(_))));

        scheduler.set_position(2.1, &mut out);
        let events: Vec<_> = out
            .iter()
            .filter(|c| matches!(c.item, PlaybackItem::Event(_)))
            .map(|c| c.kind)
            .collect();
        assert_eq!(
            events,
            [CrossingKind::HeadCrossCritical, CrossingKind::TailCrossCritical]
        );
        assert_eq!(scheduler.passed_events().count(), 1);
    }

    #[test]
    fn out_of_range_positions_are_empty() {
        let chart = chart();
        let mut scheduler = PlaybackScheduler::new(chart, LOOK_AHEAD, 0.0);
        assert_eq!(scheduler.active_object(Lane::BT_A), None);

        scheduler.reset_to(1_000.0);
        assert!(scheduler_visible(&scheduler).is_empty());
        assert!(Lane::ALL.iter().all(|lane| scheduler.active_object(*lane).is_none()));

        scheduler.reset_to(-1_000.0);
        assert!(scheduler_visible(&scheduler).is_empty());
    }

    #[test]
    fn long_seek_reports_appear_and_disappear_once() {
        let chart = chart();
        let mut scheduler = PlaybackScheduler::new(chart.clone(), LOOK_AHEAD, 0.0);
        let mut out = Vec::new();
        scheduler.reset_to(-5.0);
        scheduler.set_position(100.0, &mut out);

        for obj in chart.objects() {
            let item = PlaybackItem::Object(obj.id);
            let appear = out
                .iter()
                .position(|c| c.item == item && c.kind == CrossingKind::HeadCrossPrimary);
            let disappear = out
                .iter()
                .position(|c| c.item == item && c.kind == CrossingKind::TailCrossSecondary);
            assert!(appear.is_some() && disappear.is_some());
            assert!(appear < disappear);
        }
        assert_eq!(out.len(), chart.objects().len() * 4 + chart.events().len() * 2);
    }
}
