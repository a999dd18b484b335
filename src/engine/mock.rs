//! Scripted in-memory engine with a call log, used by tests and demos.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::task::Poll;

use super::{ready, CreateFrame, EngineError, EngineFuture, FrameEngine, RootVector, TimeRange};
use crate::pose::{FrameRecord, PoseSample};

/// One call received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Create(CreateFrame),
    Frame { id: String, t: f64 },
    Frames { t: f64 },
    PoseRange { id: String, range: TimeRange },
    ToRoot { frame_id: String, v: [f64; 3], t: f64 },
}

#[derive(Default)]
struct MockState {
    records: HashMap<String, FrameRecord>,
    order: Vec<String>,
    /// Linear motion per frame, engine units per second.
    velocity: HashMap<String, [f64; 3]>,
    scripted: HashMap<String, VecDeque<Result<Vec<PoseSample>, EngineError>>>,
    calls: Vec<EngineCall>,
}

/// An engine whose answers are set up by the test.
///
/// Unscripted pose ranges follow each frame's linear motion, so the sample at
/// time `t` sits at `position + velocity * t`.
#[derive(Default)]
pub struct MockEngine {
    state: RefCell<MockState>,
    unreachable: Cell<bool>,
    gate: Option<Rc<Cell<bool>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pose range requests stay pending until the returned flag is set.
    pub fn gated() -> (Self, Rc<Cell<bool>>) {
        let open = Rc::new(Cell::new(false));
        let engine = Self {
            gate: Some(open.clone()),
            ..Self::default()
        };
        (engine, open)
    }

    /// Fail every call as if the engine were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.set(unreachable);
    }

    pub fn set_velocity(&self, id: &str, velocity: [f64; 3]) {
        self.state.borrow_mut().velocity.insert(id.to_string(), velocity);
    }

    /// Queue the answer for the next pose range request on `id`.
    pub fn push_range(&self, id: &str, response: Result<Vec<PoseSample>, EngineError>) {
        self.state
            .borrow_mut()
            .scripted
            .entry(id.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.borrow().calls.clone()
    }

    pub fn range_calls(&self, id: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::PoseRange { id: other, .. } if other == id))
            .count()
    }

    fn log(&self, call: EngineCall) {
        self.state.borrow_mut().calls.push(call);
    }

    fn check_reachable(&self) -> Result<(), EngineError> {
        if self.unreachable.get() {
            Err(EngineError::Unreachable("mock engine offline".into()))
        } else {
            Ok(())
        }
    }

    fn pose_at(state: &MockState, id: &str, t: f64) -> Result<PoseSample, EngineError> {
        let record = state.records.get(id).ok_or_else(|| not_found(id))?;
        let v = state.velocity.get(id).copied().unwrap_or([0.0; 3]);
        let p = record.pose.position;
        Ok(PoseSample::new(
            [p[0] + v[0] * t, p[1] + v[1] * t, p[2] + v[2] * t],
            record.pose.orientation,
        ))
    }

    fn answer_range(&self, id: &str, range: TimeRange) -> Result<Vec<PoseSample>, EngineError> {
        self.check_reachable()?;
        let mut state = self.state.borrow_mut();
        if let Some(response) = state.scripted.get_mut(id).and_then(|q| q.pop_front()) {
            return response;
        }
        range
            .sample_times()
            .into_iter()
            .map(|t| Self::pose_at(&state, id, t))
            .collect()
    }
}

fn not_found(id: &str) -> EngineError {
    EngineError::Rejected(format!("Frame '{}' not found", id))
}

impl FrameEngine for MockEngine {
    fn create_frame<'a>(&'a self, request: &'a CreateFrame) -> EngineFuture<'a, ()> {
        self.log(EngineCall::Create(request.clone()));
        let result = self.check_reachable().and_then(|()| {
            let mut state = self.state.borrow_mut();
            if let Some(parent) = request.parent_id() {
                if !state.records.contains_key(parent) {
                    return Err(not_found(parent));
                }
            }
            let id = request.id().to_string();
            if !state.records.contains_key(&id) {
                state.order.push(id.clone());
            }
            state.records.insert(
                id.clone(),
                FrameRecord {
                    name: request.kind().label().to_string(),
                    id,
                    parent_id: request.parent_id().map(str::to_string),
                    pose: PoseSample::identity(),
                },
            );
            Ok(())
        });
        ready(result)
    }

    fn frame<'a>(&'a self, id: &'a str, t: f64) -> EngineFuture<'a, FrameRecord> {
        self.log(EngineCall::Frame { id: id.to_string(), t });
        let result = self.check_reachable().and_then(|()| {
            let state = self.state.borrow();
            let mut record = state.records.get(id).cloned().ok_or_else(|| not_found(id))?;
            record.pose = Self::pose_at(&state, id, t)?;
            Ok(record)
        });
        ready(result)
    }

    fn frames(&self, t: f64) -> EngineFuture<'_, Vec<FrameRecord>> {
        self.log(EngineCall::Frames { t });
        let result = self.check_reachable().and_then(|()| {
            let state = self.state.borrow();
            state
                .order
                .iter()
                .map(|id| -> Result<FrameRecord, EngineError> {
                    let mut record = state.records.get(id).cloned().ok_or_else(|| not_found(id))?;
                    record.pose = Self::pose_at(&state, id, t)?;
                    Ok(record)
                })
                .collect()
        });
        ready(result)
    }

    fn pose_range<'a>(&'a self, id: &'a str, range: TimeRange) -> EngineFuture<'a, Vec<PoseSample>> {
        self.log(EngineCall::PoseRange {
            id: id.to_string(),
            range,
        });
        match &self.gate {
            None => ready(self.answer_range(id, range)),
            Some(open) => {
                let open = open.clone();
                Box::pin(std::future::poll_fn(move |_| {
                    if open.get() {
                        Poll::Ready(self.answer_range(id, range))
                    } else {
                        Poll::Pending
                    }
                }))
            }
        }
    }

    fn to_root<'a>(&'a self, frame_id: &'a str, v: [f64; 3], t: f64) -> EngineFuture<'a, RootVector> {
        self.log(EngineCall::ToRoot {
            frame_id: frame_id.to_string(),
            v,
            t,
        });
        let result = self.check_reachable().and_then(|()| {
            let state = self.state.borrow();
            let pose = Self::pose_at(&state, frame_id, t)?;
            let p = pose.position;
            Ok(RootVector {
                position: [p[0] + v[0], p[1] + v[1], p[2] + v[2]],
                orientation: pose.orientation,
            })
        });
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_parent_rejected() {
        let engine = MockEngine::new();
        let request = CreateFrame::Fixed {
            id: "ecef".into(),
            parent_id: "missing".into(),
            epoch_seconds: 0.0,
        };
        let err = pollster::block_on(engine.create_frame(&request)).unwrap_err();
        assert_eq!(err, EngineError::Rejected("Frame 'missing' not found".into()));
        assert!(pollster::block_on(engine.frames(0.0)).unwrap().is_empty());
    }

    #[test]
    fn test_linear_motion_range() {
        let engine = MockEngine::new();
        pollster::block_on(engine.create_frame(&CreateFrame::Inertial { id: "eci".into() })).unwrap();
        engine.set_velocity("eci", [100.0, 0.0, 0.0]);

        let poses =
            pollster::block_on(engine.pose_range("eci", TimeRange::new(-10.0, 10.0, 5))).unwrap();
        let xs: Vec<f64> = poses.iter().map(|p| p.position[0]).collect();
        assert_eq!(xs, vec![-1000.0, -500.0, 0.0, 500.0, 1000.0]);
    }

    #[test]
    fn test_scripted_response_consumed_once() {
        let engine = MockEngine::new();
        pollster::block_on(engine.create_frame(&CreateFrame::Inertial { id: "eci".into() })).unwrap();
        engine.push_range("eci", Ok(Vec::new()));

        let range = TimeRange::new(0.0, 1.0, 3);
        assert!(pollster::block_on(engine.pose_range("eci", range)).unwrap().is_empty());
        assert_eq!(pollster::block_on(engine.pose_range("eci", range)).unwrap().len(), 3);
        assert_eq!(engine.range_calls("eci"), 2);
    }
}
