//! Live marker for one reference frame.
//!
//! A marker owns an axis triad in the scene graph. Every tick it fetches the
//! frame's pose range from the engine, writes the last sample to the triad,
//! and offers it to a rate limiter that decides whether the user-facing
//! snapshot is replaced. The transform is never held back by the limiter.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use serde::Serialize;

use crate::config::ViewerConfig;
use crate::engine::{CreateFrame, EngineError, FrameEngine};
use crate::pose::{FrameKind, FrameSnapshot, ScenePose};
use crate::runtime::{TickContext, Updatable};
use crate::sampler::{hours_to_seconds, PoseSampler};
use crate::scene_graph::{EntityId, SceneGraph, Transform, Triad};
use crate::throttle::RateLimiter;

type PoseFuture = Pin<Box<dyn Future<Output = Result<Option<ScenePose>, EngineError>>>>;

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

/// Markers are polled every tick, so wake-ups carry no information.
fn noop_waker() -> Waker {
    Waker::from(Arc::new(NoopWake))
}

/// Per-marker parameters taken from the viewer config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerSettings {
    pub sampler: PoseSampler,
    pub throttle_ms: f64,
    pub triad_size: f32,
}

impl MarkerSettings {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            sampler: config.sampler(),
            throttle_ms: config.ui_throttle_ms,
            triad_size: config.triad_size,
        }
    }
}

impl Default for MarkerSettings {
    fn default() -> Self {
        Self::from_config(&ViewerConfig::default())
    }
}

/// Result of one successful update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A pose was applied to the triad; `published` tells whether the
    /// snapshot was replaced too.
    Applied { published: bool },
    /// The engine returned no samples. Nothing changed.
    NoData,
}

/// What a call to [`FrameMarker::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerTick {
    /// The request is still in flight.
    Pending,
    Completed(Result<UpdateOutcome, EngineError>),
    /// The marker was disposed and ignored the tick.
    Disposed,
}

/// Label and value for frame pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickerOption {
    pub label: String,
    pub value: String,
}

/// A frame created in the engine and placed once, not yet in any scene.
///
/// Splitting creation lets callers await the engine without holding the
/// scene borrowed.
pub struct PreparedFrame {
    engine: Rc<dyn FrameEngine>,
    kind: FrameKind,
    snapshot: FrameSnapshot,
}

impl PreparedFrame {
    /// Create the frame, then fetch its initial placement. Nothing is kept
    /// if either call fails.
    pub async fn fetch(
        engine: Rc<dyn FrameEngine>,
        request: &CreateFrame,
        sim_hours: f64,
        scale: f64,
    ) -> Result<Self, EngineError> {
        engine.create_frame(request).await?;
        let t = request.placement_time(hours_to_seconds(sim_hours));
        let record = engine.frame(request.id(), t).await?;
        log::info!(
            "Created {} frame '{}' (parent {:?})",
            request.kind().label(),
            record.id,
            record.parent_id
        );
        Ok(Self {
            kind: request.kind(),
            snapshot: record.into_snapshot(scale),
            engine,
        })
    }

    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    /// Add the triad to `scene` at the fetched placement.
    pub fn spawn(self, scene: &mut SceneGraph, settings: &MarkerSettings) -> FrameMarker {
        let pose = self.snapshot.pose;
        let entity = scene.spawn(
            Box::new(Triad::new(settings.triad_size)),
            Transform::from_position_rotation(pose.translation(), pose.rotation()),
        );
        FrameMarker {
            engine: self.engine,
            kind: self.kind,
            entity,
            snapshot: self.snapshot,
            current: pose,
            sampler: settings.sampler,
            throttle: RateLimiter::new(settings.throttle_ms),
            axes_visible: true,
            pending: None,
            failing: false,
            disposed: false,
        }
    }
}

pub struct FrameMarker {
    engine: Rc<dyn FrameEngine>,
    kind: FrameKind,
    entity: EntityId,
    /// Published state, lags the transform by up to one throttle interval.
    snapshot: FrameSnapshot,
    /// Last pose written to the transform.
    current: ScenePose,
    sampler: PoseSampler,
    throttle: RateLimiter,
    axes_visible: bool,
    pending: Option<PoseFuture>,
    /// Last tick ended in an engine error.
    failing: bool,
    disposed: bool,
}

impl std::fmt::Debug for FrameMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameMarker")
            .field("id", &self.snapshot.id)
            .field("kind", &self.kind)
            .field("entity", &self.entity)
            .field("pending", &self.pending.is_some())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl FrameMarker {
    pub async fn create(
        engine: Rc<dyn FrameEngine>,
        request: &CreateFrame,
        scene: &mut SceneGraph,
        settings: &MarkerSettings,
        sim_hours: f64,
    ) -> Result<Self, EngineError> {
        let prepared = PreparedFrame::fetch(engine, request, sim_hours, settings.sampler.scale).await?;
        Ok(prepared.spawn(scene, settings))
    }

    pub async fn create_inertial(
        engine: Rc<dyn FrameEngine>,
        id: &str,
        scene: &mut SceneGraph,
        settings: &MarkerSettings,
        sim_hours: f64,
    ) -> Result<Self, EngineError> {
        let request = CreateFrame::Inertial { id: id.to_string() };
        Self::create(engine, &request, scene, settings, sim_hours).await
    }

    pub async fn create_fixed(
        engine: Rc<dyn FrameEngine>,
        id: &str,
        parent_id: &str,
        epoch_seconds: f64,
        scene: &mut SceneGraph,
        settings: &MarkerSettings,
        sim_hours: f64,
    ) -> Result<Self, EngineError> {
        let request = CreateFrame::Fixed {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            epoch_seconds,
        };
        Self::create(engine, &request, scene, settings, sim_hours).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_topocentric(
        engine: Rc<dyn FrameEngine>,
        id: &str,
        parent_id: &str,
        latitude_rad: f64,
        longitude_rad: f64,
        altitude_km: f64,
        scene: &mut SceneGraph,
        settings: &MarkerSettings,
        sim_hours: f64,
    ) -> Result<Self, EngineError> {
        let request = CreateFrame::Topocentric {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            latitude_rad,
            longitude_rad,
            altitude_km,
        };
        Self::create(engine, &request, scene, settings, sim_hours).await
    }

    /// Write `pose` to the triad transform.
    pub fn apply_pose(&mut self, scene: &mut SceneGraph, pose: ScenePose) {
        self.current = pose;
        if let Some(transform) = scene.transform_mut(self.entity) {
            transform.position = pose.translation();
            transform.rotation = pose.rotation();
        }
    }

    /// Sample the pose at `sim_hours` and apply it.
    pub async fn update(
        &mut self,
        scene: &mut SceneGraph,
        sim_hours: f64,
        now_ms: f64,
    ) -> Result<UpdateOutcome, EngineError> {
        let t = hours_to_seconds(sim_hours);
        let pose = self
            .sampler
            .sample(self.engine.as_ref(), &self.snapshot.id, t)
            .await?;
        Ok(self.finish_update(scene, pose, now_ms))
    }

    fn finish_update(
        &mut self,
        scene: &mut SceneGraph,
        pose: Option<ScenePose>,
        now_ms: f64,
    ) -> UpdateOutcome {
        let Some(pose) = pose else {
            return UpdateOutcome::NoData;
        };
        self.apply_pose(scene, pose);
        let published = self.throttle.try_accept(now_ms);
        if published {
            self.snapshot.pose = pose;
        }
        UpdateOutcome::Applied { published }
    }

    fn start_fetch(&self, t: f64) -> PoseFuture {
        let engine = self.engine.clone();
        let id = self.snapshot.id.clone();
        let sampler = self.sampler;
        Box::pin(async move { sampler.sample(engine.as_ref(), &id, t).await })
    }

    /// Drive the update from the render loop. Polls the in-flight request,
    /// or starts a new one if there is none. Failures are logged and leave
    /// the transform where it was.
    pub fn tick(&mut self, scene: &mut SceneGraph, sim_hours: f64, now_ms: f64) -> MarkerTick {
        if self.disposed {
            log::debug!("Frame '{}' ticked after dispose", self.snapshot.id);
            return MarkerTick::Disposed;
        }

        let mut future = match self.pending.take() {
            Some(future) => future,
            None => self.start_fetch(hours_to_seconds(sim_hours)),
        };

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Pending => {
                self.pending = Some(future);
                MarkerTick::Pending
            }
            Poll::Ready(Ok(pose)) => {
                if self.failing {
                    log::info!("Frame '{}' pose updates recovered", self.snapshot.id);
                    self.failing = false;
                }
                let outcome = self.finish_update(scene, pose, now_ms);
                log::trace!("Frame '{}': {:?}", self.snapshot.id, outcome);
                MarkerTick::Completed(Ok(outcome))
            }
            Poll::Ready(Err(e)) => {
                if self.failing {
                    log::debug!("Frame '{}' pose update still failing: {}", self.snapshot.id, e);
                } else {
                    log::warn!("Frame '{}' pose update failed: {}", self.snapshot.id, e);
                    self.failing = true;
                }
                MarkerTick::Completed(Err(e))
            }
        }
    }

    /// Flip triad visibility. Returns the new state.
    pub fn toggle_axes(&mut self, scene: &mut SceneGraph) -> bool {
        self.axes_visible = !self.axes_visible;
        scene.set_visible(self.entity, self.axes_visible);
        self.axes_visible
    }

    /// Remove the triad from the scene. The engine's frame is untouched.
    pub fn dispose(&mut self, scene: &mut SceneGraph) {
        if self.disposed {
            return;
        }
        scene.destroy(self.entity);
        self.pending = None;
        self.disposed = true;
        log::info!("Disposed marker for frame '{}'", self.snapshot.id);
    }

    pub fn id(&self) -> &str {
        &self.snapshot.id
    }

    pub fn name(&self) -> &str {
        &self.snapshot.name
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.snapshot.parent_id.as_deref()
    }

    /// Published position, scene units.
    pub fn position(&self) -> [f64; 3] {
        self.snapshot.pose.position
    }

    /// Published orientation quaternion (x, y, z, w).
    pub fn orientation(&self) -> [f64; 4] {
        self.snapshot.pose.orientation
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    pub fn current_pose(&self) -> ScenePose {
        self.current
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn axes_visible(&self) -> bool {
        self.axes_visible
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the most recent tick failed.
    pub fn is_failing(&self) -> bool {
        self.failing
    }

    pub fn to_option(&self) -> PickerOption {
        PickerOption {
            label: self.snapshot.name.clone(),
            value: self.snapshot.id.clone(),
        }
    }
}

impl Updatable for RefCell<FrameMarker> {
    fn update(&self, ctx: &mut TickContext<'_>) {
        match self.try_borrow_mut() {
            Ok(mut marker) => {
                marker.tick(ctx.scene, ctx.sim_hours, ctx.now_ms);
            }
            Err(_) => log::debug!("Frame marker busy, skipping tick"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::pose::PoseSample;

    fn sample(x: f64) -> PoseSample {
        PoseSample::new([x, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0])
    }

    fn root_marker(engine: &Rc<MockEngine>, scene: &mut SceneGraph) -> FrameMarker {
        pollster::block_on(FrameMarker::create_inertial(
            engine.clone(),
            "eci",
            scene,
            &MarkerSettings::default(),
            0.0,
        ))
        .unwrap()
    }

    #[test]
    fn test_create_places_triad() {
        let engine = Rc::new(MockEngine::new());
        let mut scene = SceneGraph::new();
        let marker = root_marker(&engine, &mut scene);

        assert_eq!(marker.id(), "eci");
        assert_eq!(marker.kind(), FrameKind::Inertial);
        assert!(scene.exists(marker.entity()));
        assert_eq!(marker.to_option().value, "eci");
    }

    #[test]
    fn test_transform_updates_while_snapshot_throttled() {
        let engine = Rc::new(MockEngine::new());
        let mut scene = SceneGraph::new();
        let mut marker = root_marker(&engine, &mut scene);

        engine.push_range("eci", Ok(vec![sample(1000.0)]));
        engine.push_range("eci", Ok(vec![sample(2000.0)]));

        let first = pollster::block_on(marker.update(&mut scene, 1.0, 0.0)).unwrap();
        assert_eq!(first, UpdateOutcome::Applied { published: true });

        let second = pollster::block_on(marker.update(&mut scene, 1.0, 10.0)).unwrap();
        assert_eq!(second, UpdateOutcome::Applied { published: false });

        let transform = scene.get(marker.entity()).unwrap().transform;
        assert_eq!(transform.position, glam::Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(marker.position(), [1.0, 0.0, 0.0]);
        assert_eq!(marker.current_pose().position, [2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_toggle_axes_only_changes_visibility() {
        let engine = Rc::new(MockEngine::new());
        let mut scene = SceneGraph::new();
        let mut marker = root_marker(&engine, &mut scene);
        let before = scene.get(marker.entity()).unwrap().transform;

        assert!(!marker.toggle_axes(&mut scene));
        assert!(!scene.is_visible(marker.entity()));
        assert!(marker.toggle_axes(&mut scene));
        assert!(scene.is_visible(marker.entity()));
        assert_eq!(scene.get(marker.entity()).unwrap().transform, before);
        assert!(engine.range_calls("eci") == 0);
    }

    #[test]
    fn test_dispose_removes_triad_and_ignores_ticks() {
        let engine = Rc::new(MockEngine::new());
        let mut scene = SceneGraph::new();
        let mut marker = root_marker(&engine, &mut scene);

        marker.dispose(&mut scene);
        assert!(scene.is_empty());
        assert!(marker.is_disposed());
        assert_eq!(marker.tick(&mut scene, 1.0, 0.0), MarkerTick::Disposed);
        assert_eq!(engine.range_calls("eci"), 0);
    }

    #[test]
    fn test_tick_keeps_single_request_in_flight() {
        let (engine, open) = MockEngine::gated();
        let engine = Rc::new(engine);
        let mut scene = SceneGraph::new();
        let mut marker = root_marker(&engine, &mut scene);

        for i in 0..5 {
            assert_eq!(marker.tick(&mut scene, 1.0, i as f64 * 16.0), MarkerTick::Pending);
        }
        assert_eq!(engine.range_calls("eci"), 1);
        assert!(marker.has_pending_request());

        open.set(true);
        let done = marker.tick(&mut scene, 1.0, 100.0);
        assert_eq!(done, MarkerTick::Completed(Ok(UpdateOutcome::Applied { published: true })));
        assert!(!marker.has_pending_request());

        marker.tick(&mut scene, 1.0, 116.0);
        assert_eq!(engine.range_calls("eci"), 2);
    }

    #[test]
    fn test_tick_error_keeps_transform() {
        let engine = Rc::new(MockEngine::new());
        let mut scene = SceneGraph::new();
        let mut marker = root_marker(&engine, &mut scene);
        let before = scene.get(marker.entity()).unwrap().transform;

        engine.set_unreachable(true);
        let tick = marker.tick(&mut scene, 1.0, 0.0);
        assert!(matches!(tick, MarkerTick::Completed(Err(EngineError::Unreachable(_)))));
        assert_eq!(scene.get(marker.entity()).unwrap().transform, before);
    }

    #[test]
    fn test_failing_state_tracks_transitions() {
        let engine = Rc::new(MockEngine::new());
        let mut scene = SceneGraph::new();
        let mut marker = root_marker(&engine, &mut scene);
        assert!(!marker.is_failing());

        engine.set_unreachable(true);
        for i in 0..3 {
            marker.tick(&mut scene, 1.0, i as f64 * 16.0);
            assert!(marker.is_failing());
        }

        engine.set_unreachable(false);
        engine.push_range("eci", Ok(vec![sample(1000.0)]));
        let tick = marker.tick(&mut scene, 1.0, 64.0);
        assert!(matches!(tick, MarkerTick::Completed(Ok(_))));
        assert!(!marker.is_failing());
    }
}
