//! Judgement contract consumed by the frame loop, plus a reference judge for
//! the six button lanes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    chart::{Chart, Lane, ObjectId, PerLane, Time},
    config::InputConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JudgeKind {
    Miss,
    Bad,
    Near,
    Perfect,
    Critical,
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub kind: JudgeKind,
    /// Input time minus object time; negative means early.
    pub difference: Time,
}

impl JudgeResult {
    pub fn new(kind: JudgeKind, difference: Time) -> Self {
        Self { kind, difference }
    }

    pub fn is_early(&self) -> bool {
        self.difference < 0.0
    }
}

/// Notifications produced while judging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JudgeEvent {
    TickProcessed {
        object: ObjectId,
        position: Time,
        result: JudgeResult,
    },
    ChipPressed {
        position: Time,
        object: ObjectId,
    },
    HoldPressed {
        position: Time,
        object: ObjectId,
    },
    HoldReleased {
        position: Time,
        object: ObjectId,
    },
}

pub trait Judgement {
    /// Advances to the clock `position`, appending the resulting events.
    fn set_position(&mut self, position: Time, events: &mut Vec<JudgeEvent>);

    /// Button press on `lane`; `None` when nothing was in range to judge.
    fn press(&mut self, lane: Lane, position: Time, events: &mut Vec<JudgeEvent>)
        -> Option<JudgeResult>;

    fn release(&mut self, lane: Lane, position: Time, events: &mut Vec<JudgeEvent>);

    /// Jumps to `position` without emitting events; everything before it is
    /// treated as already judged.
    fn reset_to(&mut self, position: Time);
}

/// Half-widths of the timing windows, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeWindows {
    pub critical: Time,
    pub perfect: Time,
    pub near: Time,
    pub bad: Time,
}

impl Default for JudgeWindows {
    fn default() -> Self {
        Self {
            critical: 0.025,
            perfect: 0.0375,
            near: 0.05,
            bad: 0.1,
        }
    }
}

impl JudgeWindows {
    pub fn classify(&self, difference: Time) -> Option<JudgeKind> {
        let distance = difference.abs();
        if distance <= self.critical {
            Some(JudgeKind::Critical)
        } else if distance <= self.perfect {
            Some(JudgeKind::Perfect)
        } else if distance <= self.near {
            Some(JudgeKind::Near)
        } else if distance <= self.bad {
            Some(JudgeKind::Bad)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct LaneState {
    cursor: usize,
    holding: Option<ObjectId>,
    pressed: bool,
}

/// Judges BT and FX lanes against chart time.
pub struct ButtonJudge {
    chart: Arc<Chart>,
    lanes: PerLane<LaneState>,
    windows: JudgeWindows,
    /// Added to the clock position before judging.
    offset: Time,
    auto_play: bool,
    position: Option<Time>,
}

impl ButtonJudge {
    pub fn new(chart: Arc<Chart>) -> Self {
        Self {
            chart,
            lanes: PerLane::default(),
            windows: JudgeWindows::default(),
            offset: 0.0,
            auto_play: false,
            position: None,
        }
    }

    /// Judge configured from the player's input settings.
    pub fn from_config(chart: Arc<Chart>, input: &InputConfig) -> Self {
        Self::new(chart)
            .with_offset(f64::from(input.offset_ms) / 1000.0)
            .with_auto_play(input.auto_play.buttons)
    }

    pub fn with_offset(mut self, offset: Time) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = auto_play;
        self
    }

    pub fn with_windows(mut self, windows: JudgeWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn auto_play(&self) -> bool {
        self.auto_play
    }

    pub fn is_holding(&self, lane: Lane) -> bool {
        self.lanes[lane].holding.is_some()
    }

    fn judge_position(&self, position: Time) -> Time {
        position + self.offset
    }

    fn step_lane(&mut self, lane: Lane, position: Time, events: &mut Vec<JudgeEvent>) {
        let chart = &self.chart;
        let ids = chart.lane_ids(lane);
        let state = &mut self.lanes[lane];

        if let Some(hold) = state.holding {
            let end = chart.object(hold).end_position();
            if position >= end {
                events.push(JudgeEvent::TickProcessed {
                    object: hold,
                    position: end,
                    result: JudgeResult::new(JudgeKind::Critical, 0.0),
                });
                events.push(JudgeEvent::HoldReleased {
                    position: end,
                    object: hold,
                });
                state.holding = None;
            }
        }

        while let Some(&id) = ids.get(state.cursor) {
            let obj = chart.object(id);
            if self.auto_play {
                if obj.position > position {
                    break;
                }
                let result = JudgeResult::new(JudgeKind::Critical, 0.0);
                if obj.is_instant() {
                    events.push(JudgeEvent::ChipPressed {
                        position: obj.position,
                        object: id,
                    });
                    events.push(JudgeEvent::TickProcessed {
                        object: id,
                        position: obj.position,
                        result,
                    });
                } else {
                    events.push(JudgeEvent::HoldPressed {
                        position: obj.position,
                        object: id,
                    });
                    events.push(JudgeEvent::TickProcessed {
                        object: id,
                        position: obj.position,
                        result,
                    });
                    state.holding = Some(id);
                }
            } else {
                if obj.position + self.windows.bad >= position {
                    break;
                }
                events.push(JudgeEvent::TickProcessed {
                    object: id,
                    position: obj.position + self.windows.bad,
                    result: JudgeResult::new(JudgeKind::Miss, self.windows.bad),
                });
            }
            state.cursor += 1;
        }
    }
}

impl Judgement for ButtonJudge {
    fn set_position(&mut self, position: Time, events: &mut Vec<JudgeEvent>) {
        let position = self.judge_position(position);
        if let Some(previous) = self.position {
            if position < previous {
                self.reset_to(position - self.offset);
                return;
            }
        }
        self.position = Some(position);

        for lane in Lane::BUTTONS {
            self.step_lane(lane, position, events);
        }
    }

    fn press(
        &mut self,
        lane: Lane,
        position: Time,
        events: &mut Vec<JudgeEvent>,
    ) -> Option<JudgeResult> {
        if self.auto_play || !lane.is_button() {
            return None;
        }
        let position = self.judge_position(position);
        let state = &mut self.lanes[lane];
        state.pressed = true;

        let id = *self.chart.lane_ids(lane).get(state.cursor)?;
        let obj = self.chart.object(id);
        let difference = position - obj.position;
        let kind = self.windows.classify(difference)?;
        let result = JudgeResult::new(kind, difference);

        if obj.is_instant() {
            events.push(JudgeEvent::ChipPressed { position, object: id });
        } else {
            events.push(JudgeEvent::HoldPressed { position, object: id });
            state.holding = Some(id);
        }
        events.push(JudgeEvent::TickProcessed {
            object: id,
            position,
            result,
        });
        state.cursor += 1;
        Some(result)
    }

    fn release(&mut self, lane: Lane, position: Time, events: &mut Vec<JudgeEvent>) {
        if self.auto_play || !lane.is_button() {
            return;
        }
        let position = self.judge_position(position);
        let state = &mut self.lanes[lane];
        state.pressed = false;

        let Some(hold) = state.holding.take() else {
            return;
        };
        let end = self.chart.object(hold).end_position();
        let kind = if position >= end - self.windows.bad {
            JudgeKind::Critical
        } else {
            JudgeKind::Miss
        };
        events.push(JudgeEvent::TickProcessed {
            object: hold,
            position,
            result: JudgeResult::new(kind, position - end),
        });
        events.push(JudgeEvent::HoldReleased {
            position,
            object: hold,
        });
    }

    fn reset_to(&mut self, position: Time) {
        let position = self.judge_position(position);
        self.position = Some(position);

        for lane in Lane::BUTTONS {
            let ids = self.chart.lane_ids(lane);
            let state = &mut self.lanes[lane];
            state.cursor = ids.partition_point(|id| self.chart.object(*id).position < position);
            state.holding = None;
            state.pressed = false;

            if self.auto_play {
                state.holding = state
                    .cursor
                    .checked_sub(1)
                    .map(|i| ids[i])
                    .filter(|id| {
                        let obj = self.chart.object(*id);
                        !obj.is_instant() && obj.end_position() > position
                    });
            }
        }
    }
}

impl std::fmt::Debug for ButtonJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ButtonJudge")
            .field("offset", &self.offset)
            .field("auto_play", &self.auto_play)
            .field("position", &self.position)
            .finish()
    }
}
