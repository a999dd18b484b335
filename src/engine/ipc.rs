//! Frame engine reached through an invoke-style command transport.
//!
//! Each engine call becomes one named command with a JSON argument object.
//! The transport is responsible for delivery only; decoding and error
//! mapping happen here.

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{CreateFrame, EngineError, EngineFuture, FrameEngine, RootVector, TimeRange};
use crate::pose::{FrameRecord, PoseSample};

pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, InvokeError>> + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// The command never reached the engine.
    Transport(String),
    /// The engine ran the command and returned an error message.
    Command(String),
}

impl From<InvokeError> for EngineError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Transport(msg) => EngineError::Unreachable(msg),
            InvokeError::Command(msg) => EngineError::Rejected(msg),
        }
    }
}

pub trait Transport {
    fn invoke<'a>(&'a self, command: &'a str, args: Value) -> InvokeFuture<'a>;
}

pub struct IpcEngine<T> {
    transport: T,
}

impl<T: Transport> IpcEngine<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call<R: DeserializeOwned>(&self, command: &str, args: Value) -> Result<R, EngineError> {
        log::trace!("ipc {} {}", command, args);
        let value = self.transport.invoke(command, args).await?;
        serde_json::from_value(value)
            .map_err(|e| EngineError::Malformed(format!("{}: {}", command, e)))
    }
}

fn create_command(request: &CreateFrame) -> (&'static str, Value) {
    match request {
        CreateFrame::Inertial { id } => ("create_eci", json!({ "id": id })),
        CreateFrame::Fixed {
            id,
            parent_id,
            epoch_seconds,
        } => (
            "create_ecef",
            json!({ "id": id, "parentId": parent_id, "t0": epoch_seconds }),
        ),
        CreateFrame::Topocentric {
            id,
            parent_id,
            latitude_rad,
            longitude_rad,
            altitude_km,
        } => (
            "create_sez",
            json!({
                "id": id,
                "parentId": parent_id,
                "lat": latitude_rad,
                "lon": longitude_rad,
                "alt": altitude_km,
            }),
        ),
    }
}

impl<T: Transport> FrameEngine for IpcEngine<T> {
    fn create_frame<'a>(&'a self, request: &'a CreateFrame) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            let (command, args) = create_command(request);
            // create commands answer with null
            let _: Value = self.call(command, args).await?;
            Ok(())
        })
    }

    fn frame<'a>(&'a self, id: &'a str, t: f64) -> EngineFuture<'a, FrameRecord> {
        Box::pin(self.call("get_frame", json!({ "id": id, "t": t })))
    }

    fn frames(&self, t: f64) -> EngineFuture<'_, Vec<FrameRecord>> {
        Box::pin(self.call("list_frames", json!({ "t": t })))
    }

    fn pose_range<'a>(&'a self, id: &'a str, range: TimeRange) -> EngineFuture<'a, Vec<PoseSample>> {
        Box::pin(async move {
            let records: Vec<FrameRecord> = self
                .call(
                    "get_frame_range",
                    json!({
                        "id": id,
                        "tStart": range.start,
                        "tEnd": range.end,
                        "steps": range.steps,
                    }),
                )
                .await?;
            Ok(records.into_iter().map(|r| r.pose).collect())
        })
    }

    fn to_root<'a>(&'a self, frame_id: &'a str, v: [f64; 3], t: f64) -> EngineFuture<'a, RootVector> {
        Box::pin(async move {
            let (position, orientation): ([f64; 3], [f64; 4]) = self
                .call("frame_to_root_cmd", json!({ "frameId": frame_id, "v": v, "t": t }))
                .await?;
            Ok(RootVector {
                position,
                orientation,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records every command and answers from a fixed reply.
    struct FakeTransport {
        calls: RefCell<Vec<(String, Value)>>,
        reply: Result<Value, InvokeError>,
    }

    impl FakeTransport {
        fn replying(reply: Result<Value, InvokeError>) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                reply,
            }
        }
    }

    impl Transport for FakeTransport {
        fn invoke<'a>(&'a self, command: &'a str, args: Value) -> InvokeFuture<'a> {
            self.calls.borrow_mut().push((command.to_string(), args));
            let reply = self.reply.clone();
            Box::pin(async move { reply })
        }
    }

    fn record_json(x: f64) -> Value {
        json!({
            "id": "ecef",
            "name": "ECEF",
            "parent_id": "eci",
            "pose": { "position": [x, 0.0, 0.0], "rotation": [0.0, 0.0, 0.0, 1.0] }
        })
    }

    #[test]
    fn test_create_commands() {
        let engine = IpcEngine::new(FakeTransport::replying(Ok(Value::Null)));
        let requests = [
            CreateFrame::Inertial { id: "eci".into() },
            CreateFrame::Fixed {
                id: "ecef".into(),
                parent_id: "eci".into(),
                epoch_seconds: 12.5,
            },
            CreateFrame::Topocentric {
                id: "sez".into(),
                parent_id: "ecef".into(),
                latitude_rad: 0.5,
                longitude_rad: -1.0,
                altitude_km: 0.2,
            },
        ];
        for request in &requests {
            pollster::block_on(engine.create_frame(request)).unwrap();
        }

        let calls = engine.transport().calls.borrow();
        assert_eq!(calls[0], ("create_eci".to_string(), json!({ "id": "eci" })));
        assert_eq!(
            calls[1],
            (
                "create_ecef".to_string(),
                json!({ "id": "ecef", "parentId": "eci", "t0": 12.5 })
            )
        );
        assert_eq!(calls[2].0, "create_sez");
        assert_eq!(calls[2].1["lat"], json!(0.5));
        assert_eq!(calls[2].1["alt"], json!(0.2));
    }

    #[test]
    fn test_pose_range_encoding() {
        let reply = json!([record_json(1.0), record_json(2.0)]);
        let engine = IpcEngine::new(FakeTransport::replying(Ok(reply)));
        let poses =
            pollster::block_on(engine.pose_range("ecef", TimeRange::new(-10.0, 10.0, 2))).unwrap();
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[1].position, [2.0, 0.0, 0.0]);

        let calls = engine.transport().calls.borrow();
        assert_eq!(calls[0].0, "get_frame_range");
        assert_eq!(
            calls[0].1,
            json!({ "id": "ecef", "tStart": -10.0, "tEnd": 10.0, "steps": 2 })
        );
    }

    #[test]
    fn test_to_root_decodes_tuple() {
        let reply = json!([[1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 1.0]]);
        let engine = IpcEngine::new(FakeTransport::replying(Ok(reply)));
        let root = pollster::block_on(engine.to_root("sez", [0.0, 0.0, 1.0], 5.0)).unwrap();
        assert_eq!(root.position, [1.0, 2.0, 3.0]);

        let calls = engine.transport().calls.borrow();
        assert_eq!(calls[0].1, json!({ "frameId": "sez", "v": [0.0, 0.0, 1.0], "t": 5.0 }));
    }

    #[test]
    fn test_error_mapping() {
        let engine = IpcEngine::new(FakeTransport::replying(Err(InvokeError::Command(
            "Frame 'x' not found".into(),
        ))));
        let err = pollster::block_on(engine.frame("x", 0.0)).unwrap_err();
        assert_eq!(err, EngineError::Rejected("Frame 'x' not found".into()));

        let engine = IpcEngine::new(FakeTransport::replying(Err(InvokeError::Transport(
            "closed".into(),
        ))));
        let err = pollster::block_on(engine.frames(0.0)).unwrap_err();
        assert!(matches!(err, EngineError::Unreachable(_)));

        let engine = IpcEngine::new(FakeTransport::replying(Ok(json!({ "nope": true }))));
        let err = pollster::block_on(engine.frame("eci", 0.0)).unwrap_err();
        assert!(matches!(err, EngineError::Malformed(ref m) if m.starts_with("get_frame")));
    }
}
