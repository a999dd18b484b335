//! Asynchronous frame engine contract.
//!
//! The engine owns frame records and computes poses. Every call is
//! asynchronous and may fail with a typed [`EngineError`]; an empty result is
//! not an error. The trait is object safe so markers can share one engine
//! behind an `Rc<dyn FrameEngine>`.

pub mod ipc;
pub mod mock;
pub mod replay;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pose::{FrameKind, FrameRecord, PoseSample};

pub use ipc::{InvokeError, IpcEngine, Transport};
pub use mock::{EngineCall, MockEngine};
pub use replay::{Recording, ReplayEngine};

/// Boxed future returned by engine calls. Single-threaded, so not `Send`.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine could not be reached at all.
    #[error("engine unreachable: {0}")]
    Unreachable(String),
    /// The engine understood the request and refused it.
    #[error("engine rejected request: {0}")]
    Rejected(String),
    /// The engine answered with something that could not be decoded.
    #[error("malformed engine response: {0}")]
    Malformed(String),
}

impl EngineError {
    pub fn is_rejected(&self) -> bool {
        matches!(self, EngineError::Rejected(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, EngineError::Unreachable(_) | EngineError::Malformed(_))
    }
}

/// A request to create a frame in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateFrame {
    Inertial {
        id: String,
    },
    Fixed {
        id: String,
        parent_id: String,
        /// Reference epoch in seconds.
        epoch_seconds: f64,
    },
    Topocentric {
        id: String,
        parent_id: String,
        latitude_rad: f64,
        longitude_rad: f64,
        altitude_km: f64,
    },
}

impl CreateFrame {
    pub fn id(&self) -> &str {
        match self {
            CreateFrame::Inertial { id }
            | CreateFrame::Fixed { id, .. }
            | CreateFrame::Topocentric { id, .. } => id,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            CreateFrame::Inertial { .. } => None,
            CreateFrame::Fixed { parent_id, .. } | CreateFrame::Topocentric { parent_id, .. } => {
                Some(parent_id)
            }
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            CreateFrame::Inertial { .. } => FrameKind::Inertial,
            CreateFrame::Fixed { .. } => FrameKind::Fixed,
            CreateFrame::Topocentric { .. } => FrameKind::Topocentric,
        }
    }

    /// Time at which the initial placement of a new frame is fetched.
    /// Fixed frames are placed relative to their reference epoch.
    pub fn placement_time(&self, sim_seconds: f64) -> f64 {
        match self {
            CreateFrame::Fixed { epoch_seconds, .. } => epoch_seconds + sim_seconds,
            _ => sim_seconds,
        }
    }
}

/// A closed time interval sampled at `steps` evenly spaced instants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
    pub steps: usize,
}

impl TimeRange {
    pub fn new(start: f64, end: f64, steps: usize) -> Self {
        Self { start, end, steps }
    }

    /// Sample instants, first at `start` and last at `end`.
    pub fn sample_times(&self) -> Vec<f64> {
        match self.steps {
            0 => Vec::new(),
            1 => vec![self.end],
            n => {
                let dt = (self.end - self.start) / (n - 1) as f64;
                (0..n)
                    .map(|i| if i == n - 1 { self.end } else { self.start + dt * i as f64 })
                    .collect()
            }
        }
    }
}

/// A vector expressed in the root frame, returned by [`FrameEngine::to_root`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RootVector {
    pub position: [f64; 3],
    pub orientation: [f64; 4],
}

pub trait FrameEngine {
    fn create_frame<'a>(&'a self, request: &'a CreateFrame) -> EngineFuture<'a, ()>;

    /// Snapshot of one frame at time `t` seconds.
    fn frame<'a>(&'a self, id: &'a str, t: f64) -> EngineFuture<'a, FrameRecord>;

    /// Snapshots of every known frame at time `t` seconds.
    fn frames(&self, t: f64) -> EngineFuture<'_, Vec<FrameRecord>>;

    /// Time-ordered poses of a frame over `range`. May be empty.
    fn pose_range<'a>(&'a self, id: &'a str, range: TimeRange) -> EngineFuture<'a, Vec<PoseSample>>;

    /// Express vector `v` given in `frame_id` in the root frame at time `t`.
    fn to_root<'a>(&'a self, frame_id: &'a str, v: [f64; 3], t: f64) -> EngineFuture<'a, RootVector>;
}

/// Wrap an already computed result as an engine future.
pub(crate) fn ready<'a, T: 'a>(result: Result<T, EngineError>) -> EngineFuture<'a, T> {
    Box::pin(std::future::ready(result))
}
