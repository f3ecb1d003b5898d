//! The window/event-loop contract and a frame pump that honours it.
//!
//! A host calls, in order: `on_resize` with the initial size, `on_load` once,
//! then `on_update` followed by `on_render` for every frame, and finally
//! `on_unload` exactly once. [`FramePump`] is that host for headless runs and
//! tests; a windowed host drives the same [`FrameHandler`] from its own loop.

use crate::error::RenderError;
use crate::time::{FrameClock, FrameTime};

/// Directive returned from [`FrameHandler::on_render`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoopControl {
    Continue,
    Exit,
}

/// Callbacks a window host invokes. GPU work happens only inside them.
pub trait FrameHandler {
    /// The surface is now `width` x `height` pixels. May arrive at any time.
    fn on_resize(&mut self, width: u32, height: u32);

    /// Acquires resources. Called once, after the first resize.
    fn on_load(&mut self) -> Result<(), RenderError>;

    /// Advances simulation by `dt` seconds.
    fn on_update(&mut self, dt: f64) -> Result<(), RenderError>;

    /// Draws and presents one frame.
    fn on_render(&mut self) -> Result<LoopControl, RenderError>;

    /// Releases resources. Called exactly once, also after a failed load.
    fn on_unload(&mut self);
}

/// How the pump produces frame deltas.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Pacing {
    /// Every frame advances by exactly this many seconds.
    Fixed(f64),
    /// Deltas come from the wall clock through a [`FrameClock`].
    RealTime,
}

impl Default for Pacing {
    /// Sixty frames per second of simulated time.
    fn default() -> Self {
        Pacing::Fixed(1.0 / 60.0)
    }
}

/// Why a pump run ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopReason {
    /// The configured frame limit was reached.
    FrameLimit,
    /// The handler or an observer asked to stop.
    Requested,
}

/// Summary of a completed run.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PumpReport {
    pub frames: u64,
    pub elapsed: f64,
    pub stop: StopReason,
}

/// Requests an observer can make between frames.
#[derive(Debug, Default)]
pub struct PumpControl {
    resize: Option<(u32, u32)>,
    exit: bool,
}

impl PumpControl {
    /// Delivers a resize to the handler before the next update.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.resize = Some((width, height));
    }

    /// Stops the pump after the current frame, as a window close does.
    pub fn request_exit(&mut self) {
        self.exit = true;
    }
}

/// Drives a [`FrameHandler`] through its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePump {
    pub width: u32,
    pub height: u32,
    pub pacing: Pacing,
    /// Stop after this many frames; `None` runs until exit is requested.
    pub max_frames: Option<u64>,
}

impl FramePump {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pacing: Pacing::default(),
            max_frames: None,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    pub fn run<H: FrameHandler>(&self, handler: &mut H) -> Result<PumpReport, RenderError> {
        self.run_with(handler, |_, _, _| {})
    }

    /// Runs the handler, calling `observe` after every presented frame.
    ///
    /// `on_unload` runs exactly once however the run ends, and the first
    /// error is returned after it.
    pub fn run_with<H, F>(&self, handler: &mut H, mut observe: F) -> Result<PumpReport, RenderError>
    where
        H: FrameHandler,
        F: FnMut(&mut H, &FrameTime, &mut PumpControl),
    {
        handler.on_resize(self.width, self.height);
        let result = self.drive(handler, &mut observe);
        handler.on_unload();
        match &result {
            Ok(report) => log::info!(
                "frame pump stopped after {} frame(s) ({:?})",
                report.frames,
                report.stop
            ),
            Err(e) => log::error!("frame pump aborted: {e}"),
        }
        result
    }

    fn drive<H, F>(&self, handler: &mut H, observe: &mut F) -> Result<PumpReport, RenderError>
    where
        H: FrameHandler,
        F: FnMut(&mut H, &FrameTime, &mut PumpControl),
    {
        handler.on_load()?;

        let mut clock = FrameClock::new();
        let mut frames = 0;
        let mut elapsed = 0.0;
        loop {
            if self.max_frames.is_some_and(|max| frames >= max) {
                return Ok(PumpReport {
                    frames,
                    elapsed,
                    stop: StopReason::FrameLimit,
                });
            }

            let time = match self.pacing {
                Pacing::Fixed(dt) => clock.advance(dt),
                Pacing::RealTime => clock.tick(),
            };
            handler.on_update(time.dt)?;
            let control = handler.on_render()?;
            frames += 1;
            elapsed = time.elapsed;

            let mut requests = PumpControl::default();
            observe(handler, &time, &mut requests);
            if let Some((width, height)) = requests.resize {
                handler.on_resize(width, height);
            }
            if control == LoopControl::Exit || requests.exit {
                return Ok(PumpReport {
                    frames,
                    elapsed,
                    stop: StopReason::Requested,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        fail_load: bool,
        fail_render_at: Option<usize>,
        exit_after: Option<usize>,
        renders: usize,
    }

    impl FrameHandler for Recorder {
        fn on_resize(&mut self, width: u32, height: u32) {
            self.calls.push(format!("resize {width}x{height}"));
        }

        fn on_load(&mut self) -> Result<(), RenderError> {
            self.calls.push("load".into());
            if self.fail_load {
                return Err(RenderError::resource("vertex buffer", "refused"));
            }
            Ok(())
        }

        fn on_update(&mut self, dt: f64) -> Result<(), RenderError> {
            self.calls.push(format!("update {dt}"));
            Ok(())
        }

        fn on_render(&mut self) -> Result<LoopControl, RenderError> {
            self.renders += 1;
            self.calls.push("render".into());
            if self.fail_render_at == Some(self.renders) {
                return Err(RenderError::ShaderLink("lost".into()));
            }
            if self.exit_after == Some(self.renders) {
                return Ok(LoopControl::Exit);
            }
            Ok(LoopControl::Continue)
        }

        fn on_unload(&mut self) {
            self.calls.push("unload".into());
        }
    }

    fn count(calls: &[String], name: &str) -> usize {
        calls.iter().filter(|c| *c == name).count()
    }

    #[test]
    fn callbacks_arrive_in_contract_order() {
        let mut rec = Recorder::default();
        let report = FramePump::new(64, 32)
            .with_pacing(Pacing::Fixed(0.5))
            .with_max_frames(2)
            .run(&mut rec)
            .unwrap();
        assert_eq!(
            rec.calls,
            vec![
                "resize 64x32",
                "load",
                "update 0.5",
                "render",
                "update 0.5",
                "render",
                "unload"
            ]
        );
        assert_eq!(report.frames, 2);
        assert_eq!(report.stop, StopReason::FrameLimit);
        assert!((report.elapsed - 1.0).abs() < 1e-12);
    }

    #[test]
    fn failed_load_still_unloads_once() {
        let mut rec = Recorder {
            fail_load: true,
            ..Recorder::default()
        };
        let err = FramePump::new(8, 8).run(&mut rec).unwrap_err();
        assert!(matches!(err, RenderError::ResourceCreation { .. }));
        assert_eq!(rec.calls, vec!["resize 8x8", "load", "unload"]);
    }

    #[test]
    fn render_error_mid_run_unloads_once() {
        let mut rec = Recorder {
            fail_render_at: Some(3),
            ..Recorder::default()
        };
        assert!(FramePump::new(8, 8).run(&mut rec).is_err());
        assert_eq!(count(&rec.calls, "render"), 3);
        assert_eq!(count(&rec.calls, "unload"), 1);
        assert_eq!(rec.calls.last().map(String::as_str), Some("unload"));
    }

    #[test]
    fn handler_exit_stops_without_frame_limit() {
        let mut rec = Recorder {
            exit_after: Some(4),
            ..Recorder::default()
        };
        let report = FramePump::new(8, 8).run(&mut rec).unwrap();
        assert_eq!(report.frames, 4);
        assert_eq!(report.stop, StopReason::Requested);
    }

    #[test]
    fn observer_can_resize_and_exit() {
        let mut rec = Recorder::default();
        let mut seen = Vec::new();
        let report = FramePump::new(8, 8)
            .run_with(&mut rec, |_, time, control| {
                seen.push(time.frame_index);
                if time.frame_index == 0 {
                    control.request_resize(16, 4);
                }
                if time.frame_index == 1 {
                    control.request_exit();
                }
            })
            .unwrap();
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(report.stop, StopReason::Requested);
        assert_eq!(rec.calls[4], "resize 16x4", "resize lands between frames");
    }

    #[test]
    fn zero_frame_limit_loads_and_unloads() {
        let mut rec = Recorder::default();
        let report = FramePump::new(8, 8).with_max_frames(0).run(&mut rec).unwrap();
        assert_eq!(report.frames, 0);
        assert_eq!(rec.calls, vec!["resize 8x8", "load", "unload"]);
    }
}
