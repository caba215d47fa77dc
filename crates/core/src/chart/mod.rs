//! Read-only chart data consumed by the playback pipeline: lane objects kept
//! in an arena, timed events, tempo control points and path tracks.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{
    audio::EffectDef,
    control::{LaserApplication, LaserParams, SpinParams, SwingParams, WobbleParams},
    mapping::{PathKind, PathPoint, PathSet, PathTrack},
    HighwayError, Result,
};

/// Absolute chart time in seconds.
pub type Time = f64;

/// Positions closer than this are treated as the same instant when checking
/// connections between analog segments.
const POSITION_EPSILON: Time = 1e-9;

/// Fraction of a measure a slam occupies on the highway.
const SLAM_MEASURE_FRACTION: f64 = 1.0 / 32.0;

/// One of the eight lanes: BT 0-3, FX 4-5, analog (laser) 6-7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Lane(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneGroup {
    Bt,
    Fx,
    Analog,
}

impl Lane {
    pub const COUNT: usize = 8;

    pub const BT_A: Lane = Lane(0);
    pub const BT_B: Lane = Lane(1);
    pub const BT_C: Lane = Lane(2);
    pub const BT_D: Lane = Lane(3);
    pub const FX_L: Lane = Lane(4);
    pub const FX_R: Lane = Lane(5);
    pub const LASER_L: Lane = Lane(6);
    pub const LASER_R: Lane = Lane(7);

    pub const ALL: [Lane; 8] = [
        Lane::BT_A,
        Lane::BT_B,
        Lane::BT_C,
        Lane::BT_D,
        Lane::FX_L,
        Lane::FX_R,
        Lane::LASER_L,
        Lane::LASER_R,
    ];

    /// The six lanes played with buttons (BT and FX).
    pub const BUTTONS: [Lane; 6] = [
        Lane::BT_A,
        Lane::BT_B,
        Lane::BT_C,
        Lane::BT_D,
        Lane::FX_L,
        Lane::FX_R,
    ];

    pub const LASERS: [Lane; 2] = [Lane::LASER_L, Lane::LASER_R];

    pub fn new(index: u8) -> Option<Lane> {
        (usize::from(index) < Self::COUNT).then_some(Lane(index))
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn group(self) -> LaneGroup {
        match self.0 {
            0..=3 => LaneGroup::Bt,
            4 | 5 => LaneGroup::Fx,
            _ => LaneGroup::Analog,
        }
    }

    pub fn is_button(self) -> bool {
        self.group() != LaneGroup::Analog
    }

    pub fn is_analog(self) -> bool {
        self.group() == LaneGroup::Analog
    }

    pub fn is_fx(self) -> bool {
        self.group() == LaneGroup::Fx
    }

    /// 0 for the left laser, 1 for the right laser.
    pub fn laser_side(self) -> Option<usize> {
        self.is_analog().then(|| self.index() - Lane::LASER_L.index())
    }
}

impl TryFrom<u8> for Lane {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Lane::new(value).ok_or_else(|| format!("lane index {value} out of range"))
    }
}

impl From<Lane> for u8 {
    fn from(lane: Lane) -> Self {
        lane.0
    }
}

/// Fixed-size per-lane storage addressed by [`Lane`].
#[derive(Debug, Clone, PartialEq)]
pub struct PerLane<T>([T; Lane::COUNT]);

impl<T> PerLane<T> {
    pub fn from_fn(mut f: impl FnMut(Lane) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Lane::ALL[i])))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Lane, &T)> {
        Lane::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Lane, &mut T)> {
        Lane::ALL.into_iter().zip(self.0.iter_mut())
    }
}

impl<T: Clone> PerLane<T> {
    pub fn filled(value: T) -> Self {
        Self::from_fn(|_| value.clone())
    }
}

impl<T: Default> Default for PerLane<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Lane> for PerLane<T> {
    type Output = T;

    fn index(&self, lane: Lane) -> &T {
        &self.0[lane.index()]
    }
}

impl<T> IndexMut<Lane> for PerLane<T> {
    fn index_mut(&mut self, lane: Lane) -> &mut T {
        &mut self.0[lane.index()]
    }
}

/// Index of an object in the chart arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObjectId(usize);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a timed event in the chart's event list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventId(usize);

impl EventId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaneObject {
    pub id: ObjectId,
    pub lane: Lane,
    pub position: Time,
    /// Zero for instant objects (chips and slams).
    pub duration: Time,
    pub kind: ObjectKind,
}

impl LaneObject {
    pub fn end_position(&self) -> Time {
        self.position + self.duration
    }

    pub fn is_instant(&self) -> bool {
        self.duration <= 0.0
    }

    pub fn analog(&self) -> Option<&AnalogData> {
        match &self.kind {
            ObjectKind::Analog(data) => Some(data),
            ObjectKind::Button => None,
        }
    }

    pub fn contains(&self, position: Time) -> bool {
        self.position <= position && position <= self.end_position()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    /// A chip when instant, a hold otherwise.
    Button,
    /// A laser segment, or a slam when instant.
    Analog(AnalogData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalogData {
    pub initial_value: f32,
    pub final_value: f32,
    /// Doubles the effective lane width of the segment.
    pub range_extended: bool,
    pub previous: Option<ObjectId>,
    pub next: Option<ObjectId>,
}

/// Tempo and time signature in effect from `position` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub position: Time,
    pub beats_per_minute: f64,
    #[serde(default = "ControlPoint::default_numerator")]
    pub numerator: u8,
    #[serde(default = "ControlPoint::default_denominator")]
    pub denominator: u8,
}

impl ControlPoint {
    pub fn new(position: Time, beats_per_minute: f64) -> Self {
        Self {
            position,
            beats_per_minute,
            numerator: 4,
            denominator: 4,
        }
    }

    pub fn quarter_note_duration(&self) -> Time {
        60.0 / self.beats_per_minute
    }

    pub fn measure_duration(&self) -> Time {
        self.quarter_note_duration() * 4.0 * f64::from(self.numerator)
            / f64::from(self.denominator)
    }

    fn default_numerator() -> u8 {
        4
    }

    fn default_denominator() -> u8 {
        4
    }
}

impl Default for ControlPoint {
    fn default() -> Self {
        Self::new(0.0, 120.0)
    }
}

/// Which laser(s) a parameter event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaserSide {
    Left,
    Right,
    Both,
}

impl LaserSide {
    pub fn includes(self, side: usize) -> bool {
        match self {
            LaserSide::Left => side == 0,
            LaserSide::Right => side == 1,
            LaserSide::Both => side < 2,
        }
    }
}

/// Lane-independent instruction fired when it crosses the critical line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// Installs (or with `None`, removes) a button effect on a slot.
    EffectKind {
        slot: Lane,
        effect: Option<EffectDef>,
    },
    LaserFilterKind {
        effect: EffectDef,
    },
    LaserFilterGain {
        gain: f32,
    },
    LaserParams {
        side: LaserSide,
        params: LaserParams,
    },
    LaserApplication {
        application: LaserApplication,
    },
    SlamVolume {
        volume: f32,
    },
    SpinImpulse {
        params: SpinParams,
    },
    SwingImpulse {
        params: SwingParams,
    },
    WobbleImpulse {
        params: WobbleParams,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub id: EventId,
    pub position: Time,
    pub kind: EventKind,
}

/// Shape of an analog segment handed to [`ChartBuilder::analog`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogSegment {
    pub initial_value: f32,
    pub final_value: f32,
    pub range_extended: bool,
    /// Continue the path of the previous segment on the same lane.
    pub connected: bool,
}

impl AnalogSegment {
    pub fn new(initial_value: f32, final_value: f32) -> Self {
        Self {
            initial_value,
            final_value,
            range_extended: false,
            connected: false,
        }
    }

    pub fn connected(mut self) -> Self {
        self.connected = true;
        self
    }

    pub fn extended(mut self) -> Self {
        self.range_extended = true;
        self
    }
}

/// Owns every object, event and control point of a chart for its lifetime.
#[derive(Debug, Clone)]
pub struct Chart {
    offset: Time,
    objects: Vec<LaneObject>,
    lanes: PerLane<Vec<ObjectId>>,
    events: Vec<TimedEvent>,
    control_points: Vec<ControlPoint>,
    paths: PathSet,
}

impl Chart {
    pub fn builder() -> ChartBuilder {
        ChartBuilder::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let descriptor: ChartDescriptor = serde_json::from_str(json)?;
        descriptor.build()
    }

    /// Audio position corresponding to chart time zero.
    pub fn offset(&self) -> Time {
        self.offset
    }

    pub fn object(&self, id: ObjectId) -> &LaneObject {
        &self.objects[id.0]
    }

    pub fn objects(&self) -> &[LaneObject] {
        &self.objects
    }

    /// Ids on `lane`, ordered by position with non-overlapping spans.
    pub fn lane_ids(&self, lane: Lane) -> &[ObjectId] {
        &self.lanes[lane]
    }

    pub fn lane_objects(&self, lane: Lane) -> impl Iterator<Item = &LaneObject> + '_ {
        self.lanes[lane].iter().map(move |id| self.object(*id))
    }

    pub fn event(&self, id: EventId) -> &TimedEvent {
        &self.events[id.0]
    }

    /// Events ordered by position.
    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn control_points(&self) -> &[ControlPoint] {
        &self.control_points
    }

    pub fn paths(&self) -> &PathSet {
        &self.paths
    }

    /// Object on `lane` with the latest start at or before `position`.
    pub fn most_recent_object(&self, lane: Lane, position: Time) -> Option<&LaneObject> {
        let ids = &self.lanes[lane];
        let count = ids.partition_point(|id| self.object(*id).position <= position);
        count.checked_sub(1).map(|i| self.object(ids[i]))
    }

    /// Object on `lane` whose span contains `position`, if any.
    pub fn object_at(&self, lane: Lane, position: Time) -> Option<&LaneObject> {
        self.most_recent_object(lane, position)
            .filter(|obj| obj.end_position() >= position)
    }

    pub fn first_object_time(&self) -> Option<Time> {
        Lane::ALL
            .iter()
            .filter_map(|lane| self.lanes[*lane].first())
            .map(|id| self.object(*id).position)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn previous_connected(&self, id: ObjectId) -> Option<&LaneObject> {
        self.object(id)
            .analog()
            .and_then(|a| a.previous)
            .map(|prev| self.object(prev))
    }

    pub fn next_connected(&self, id: ObjectId) -> Option<&LaneObject> {
        self.object(id)
            .analog()
            .and_then(|a| a.next)
            .map(|next| self.object(next))
    }

    /// First object of the connected analog chain containing `id`. Button
    /// objects are their own head.
    pub fn head(&self, id: ObjectId) -> ObjectId {
        let mut current = id;
        while let Some(prev) = self.object(current).analog().and_then(|a| a.previous) {
            current = prev;
        }
        current
    }

    /// Samples an analog object's value at `position`, clamped to its span.
    /// Button objects sample as zero.
    pub fn sample_value(&self, id: ObjectId, position: Time) -> f32 {
        let obj = self.object(id);
        let Some(analog) = obj.analog() else {
            return 0.0;
        };
        if obj.is_instant() {
            return analog.final_value;
        }

        let alpha = ((position - obj.position) / obj.duration).clamp(0.0, 1.0) as f32;
        crate::mapping::lerp(analog.initial_value, analog.final_value, alpha)
    }

    /// Control point with the latest start at or before `position`; the first
    /// one is used before the chart starts.
    pub fn control_point_at(&self, position: Time) -> &ControlPoint {
        let count = self
            .control_points
            .partition_point(|cp| cp.position <= position);
        &self.control_points[count.saturating_sub(1)]
    }

    /// Time a slam occupies on the highway, derived from the measure length
    /// at its position.
    pub fn slam_duration(&self, id: ObjectId) -> Time {
        self.control_point_at(self.object(id).position)
            .measure_duration()
            * SLAM_MEASURE_FRACTION
    }
}

/// Incrementally assembles a validated [`Chart`].
///
/// Objects must be added in position order per lane.
#[derive(Debug, Default)]
pub struct ChartBuilder {
    offset: Time,
    objects: Vec<LaneObject>,
    lanes: PerLane<Vec<ObjectId>>,
    events: Vec<(Time, EventKind)>,
    control_points: Vec<ControlPoint>,
    paths: [Vec<PathPoint>; 4],
}

impl ChartBuilder {
    pub fn offset(&mut self, offset: Time) -> &mut Self {
        self.offset = offset;
        self
    }

    pub fn control_point(&mut self, point: ControlPoint) -> &mut Self {
        self.control_points.push(point);
        self
    }

    pub fn event(&mut self, position: Time, kind: EventKind) -> &mut Self {
        self.events.push((position, kind));
        self
    }

    pub fn path_point(&mut self, kind: PathKind, position: Time, value: f32) -> &mut Self {
        self.paths[kind.index()].push(PathPoint { position, value });
        self
    }

    /// Adds a chip (`duration == 0`) or hold on a BT or FX lane.
    pub fn button(&mut self, lane: Lane, position: Time, duration: Time) -> Result<ObjectId> {
        if !lane.is_button() {
            return Err(HighwayError::chart(format!(
                "button object at {position} placed on analog lane {}",
                lane.index()
            )));
        }
        self.push(lane, position, duration, ObjectKind::Button)
    }

    /// Adds a laser segment (or a slam when `duration == 0`) on an analog lane.
    pub fn analog(
        &mut self,
        lane: Lane,
        position: Time,
        duration: Time,
        segment: AnalogSegment,
    ) -> Result<ObjectId> {
        if !lane.is_analog() {
            return Err(HighwayError::chart(format!(
                "analog object at {position} placed on button lane {}",
                lane.index()
            )));
        }
        for value in [segment.initial_value, segment.final_value] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HighwayError::chart(format!(
                    "analog value {value} at {position} outside [0, 1]"
                )));
            }
        }

        let previous = if segment.connected {
            let prev = self
                .lanes[lane]
                .last()
                .map(|id| &self.objects[id.0])
                .ok_or_else(|| {
                    HighwayError::chart(format!(
                        "connected segment at {position} has no predecessor"
                    ))
                })?;
            if (prev.end_position() - position).abs() > POSITION_EPSILON {
                return Err(HighwayError::chart(format!(
                    "connected segment at {position} does not start where the previous one ends ({})",
                    prev.end_position()
                )));
            }
            Some(prev.id)
        } else {
            None
        };

        let id = self.push(
            lane,
            position,
            duration,
            ObjectKind::Analog(AnalogData {
                initial_value: segment.initial_value,
                final_value: segment.final_value,
                range_extended: segment.range_extended,
                previous,
                next: None,
            }),
        )?;

        if let Some(prev) = previous {
            if let ObjectKind::Analog(data) = &mut self.objects[prev.0].kind {
                data.next = Some(id);
            }
        }
        Ok(id)
    }

    fn push(
        &mut self,
        lane: Lane,
        position: Time,
        duration: Time,
        kind: ObjectKind,
    ) -> Result<ObjectId> {
        if !position.is_finite() || !duration.is_finite() || duration < 0.0 {
            return Err(HighwayError::chart(format!(
                "object on lane {} has invalid span {position} + {duration}",
                lane.index()
            )));
        }
        if let Some(last) = self.lanes[lane].last().map(|id| &self.objects[id.0]) {
            if position < last.end_position() - POSITION_EPSILON {
                return Err(HighwayError::chart(format!(
                    "object at {position} overlaps the previous object on lane {} ending at {}",
                    lane.index(),
                    last.end_position()
                )));
            }
        }

        let id = ObjectId(self.objects.len());
        self.objects.push(LaneObject {
            id,
            lane,
            position,
            duration,
            kind,
        });
        self.lanes[lane].push(id);
        Ok(id)
    }

    pub fn build(self) -> Result<Chart> {
        let mut control_points = self.control_points;
        if control_points.iter().any(|cp| !(cp.beats_per_minute > 0.0)) {
            return Err(HighwayError::chart("control point with non-positive tempo"));
        }
        if control_points.iter().any(|cp| cp.numerator == 0 || cp.denominator == 0) {
            return Err(HighwayError::chart("control point with an empty time signature"));
        }
        control_points.sort_by(|a, b| a.position.total_cmp(&b.position));
        if control_points.is_empty() {
            control_points.push(ControlPoint::default());
        }

        let mut events = self.events;
        events.sort_by(|a, b| a.0.total_cmp(&b.0));
        let events = events
            .into_iter()
            .enumerate()
            .map(|(i, (position, kind))| TimedEvent {
                id: EventId(i),
                position,
                kind,
            })
            .collect();

        let mut paths = PathSet::new();
        for (kind, points) in PathKind::ALL.into_iter().zip(self.paths) {
            paths.set_track(kind, PathTrack::new(points));
        }

        Ok(Chart {
            offset: self.offset,
            objects: self.objects,
            lanes: self.lanes,
            events,
            control_points,
            paths,
        })
    }
}

/// Serialisable chart fixture used by tools and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartDescriptor {
    pub offset: Time,
    pub control_points: Vec<ControlPoint>,
    pub objects: Vec<ObjectDescriptor>,
    pub events: Vec<EventDescriptor>,
    pub paths: Vec<PathDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectDescriptor {
    Button {
        lane: Lane,
        position: Time,
        #[serde(default)]
        duration: Time,
    },
    Analog {
        lane: Lane,
        position: Time,
        #[serde(default)]
        duration: Time,
        initial: f32,
        #[serde(rename = "final")]
        final_value: f32,
        #[serde(default)]
        range_extended: bool,
        #[serde(default)]
        connected: bool,
    },
}

impl ObjectDescriptor {
    fn position(&self) -> Time {
        match self {
            ObjectDescriptor::Button { position, .. } | ObjectDescriptor::Analog { position, .. } => {
                *position
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub position: Time,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathDescriptor {
    pub kind: PathKind,
    pub points: Vec<PathPoint>,
}

impl ChartDescriptor {
    pub fn build(mut self) -> Result<Chart> {
        // Stable, so a slam keeps its place before the segment it connects to.
        self.objects
            .sort_by(|a, b| a.position().total_cmp(&b.position()));

        let mut builder = Chart::builder();
        builder.offset(self.offset);
        for point in self.control_points {
            builder.control_point(point);
        }
        for object in self.objects {
            match object {
                ObjectDescriptor::Button {
                    lane,
                    position,
                    duration,
                } => {
                    builder.button(lane, position, duration)?;
                }
                ObjectDescriptor::Analog {
                    lane,
                    position,
                    duration,
                    initial,
                    final_value,
                    range_extended,
                    connected,
                } => {
                    builder.analog(
                        lane,
                        position,
                        duration,
                        AnalogSegment {
                            initial_value: initial,
                            final_value,
                            range_extended,
                            connected,
                        },
                    )?;
                }
            }
        }
        for event in self.events {
            builder.event(event.position, event.kind);
        }
        for path in self.paths {
            for point in path.points {
                builder.path_point(path.kind, point.position, point.value);
            }
        }
        builder.build()
    }
}
