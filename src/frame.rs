// Frame loop - WAIT_FENCE -> ACQUIRE -> RECORD -> SUBMIT -> PRESENT, repeat
//
// One frame in flight. The loop itself is GPU-agnostic: it drives a
// `FrameBackend` and checks every step against a `FrameSequencer`, so the
// command buffer can never be re-recorded before the fence was waited on.

use crate::backend::error::Result;
use crate::backend::swapchain::{AcquireOutcome, ImageIndex, PresentOutcome};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Where a frame currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// No frame started yet, or the last one was abandoned
    Idle,
    FenceWaited,
    ImageAcquired(ImageIndex),
    Recorded(ImageIndex),
    Submitted(ImageIndex),
    Presented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    WaitFence,
    Acquire,
    Record,
    Submit,
    Present,
    Abandon,
}

impl fmt::Display for FrameStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitFence => "wait fence",
            Self::Acquire => "acquire image",
            Self::Record => "record",
            Self::Submit => "submit",
            Self::Present => "present",
            Self::Abandon => "abandon frame",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    #[error("cannot {attempted} while in {from:?}")]
    OutOfOrder { from: FramePhase, attempted: FrameStep },

    #[error("recording image {attempted:?} but image {acquired:?} was acquired")]
    WrongImage {
        acquired: ImageIndex,
        attempted: ImageIndex,
    },
}

/// Tracks the phase of the single in-flight frame and rejects any step taken
/// out of order.
#[derive(Debug, Clone)]
pub struct FrameSequencer {
    phase: FramePhase,
}

impl Default for FrameSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSequencer {
    pub fn new() -> Self {
        Self { phase: FramePhase::Idle }
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    fn reject(&self, attempted: FrameStep) -> SequenceError {
        SequenceError::OutOfOrder { from: self.phase, attempted }
    }

    pub fn wait_fence(&mut self) -> std::result::Result<(), SequenceError> {
        match self.phase {
            FramePhase::Idle | FramePhase::Presented => {
                self.phase = FramePhase::FenceWaited;
                Ok(())
            }
            _ => Err(self.reject(FrameStep::WaitFence)),
        }
    }

    pub fn acquire(&mut self, image: ImageIndex) -> std::result::Result<(), SequenceError> {
        match self.phase {
            FramePhase::FenceWaited => {
                self.phase = FramePhase::ImageAcquired(image);
                Ok(())
            }
            _ => Err(self.reject(FrameStep::Acquire)),
        }
    }

    pub fn record(&mut self, image: ImageIndex) -> std::result::Result<(), SequenceError> {
        match self.phase {
            FramePhase::ImageAcquired(acquired) if acquired == image => {
                self.phase = FramePhase::Recorded(image);
                Ok(())
            }
            FramePhase::ImageAcquired(acquired) => Err(SequenceError::WrongImage {
                acquired,
                attempted: image,
            }),
            _ => Err(self.reject(FrameStep::Record)),
        }
    }

    pub fn submit(&mut self) -> std::result::Result<ImageIndex, SequenceError> {
        match self.phase {
            FramePhase::Recorded(image) => {
                self.phase = FramePhase::Submitted(image);
                Ok(image)
            }
            _ => Err(self.reject(FrameStep::Submit)),
        }
    }

    pub fn present(&mut self) -> std::result::Result<ImageIndex, SequenceError> {
        match self.phase {
            FramePhase::Submitted(image) => {
                self.phase = FramePhase::Presented;
                Ok(image)
            }
            _ => Err(self.reject(FrameStep::Present)),
        }
    }

    /// Give up on a frame whose acquire failed; the fence must have been re-armed.
    pub fn abandon(&mut self) -> std::result::Result<(), SequenceError> {
        match self.phase {
            FramePhase::FenceWaited => {
                self.phase = FramePhase::Idle;
                Ok(())
            }
            _ => Err(self.reject(FrameStep::Abandon)),
        }
    }
}

/// Cooperative stop signal, checked once per frame boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutdatedStage {
    Acquire,
    Present,
}

/// GPU side of one frame. Implemented by the Vulkan renderer and by test doubles.
pub trait FrameBackend {
    /// Block on the frame fence, then reset it.
    fn wait_for_frame(&mut self) -> Result<()>;

    fn acquire_image(&mut self) -> Result<AcquireOutcome>;

    fn record(&mut self, image: ImageIndex) -> Result<()>;

    /// Submit the recorded commands, signaling the frame fence on completion.
    fn submit(&mut self) -> Result<()>;

    fn present(&mut self, image: ImageIndex) -> Result<PresentOutcome>;

    /// Signal the (reset) fence without rendering, so an abandoned frame
    /// doesn't leave the next wait blocked forever.
    fn rearm_fence(&mut self) -> Result<()>;

    /// Called when the swapchain no longer matches the surface.
    ///
    /// Recreating the swapchain belongs here; the default only reports it.
    fn on_outdated(&mut self, stage: OutdatedStage) -> Result<()> {
        log::warn!("Swapchain out of date at {:?}; not recreated", stage);
        Ok(())
    }
}

/// Windowing side: drains OS events between frames and cancels the token on close.
pub trait EventPump {
    fn pump_events(&mut self, token: &CancellationToken);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub skipped: u64,
    pub outdated: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented(ImageIndex),
    Skipped,
}

#[derive(Debug, Default)]
pub struct FrameLoop {
    sequencer: FrameSequencer,
    stats: FrameStats,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Run frames until `token` is cancelled.
    ///
    /// The token is checked before each frame; a frame that has started always
    /// runs to the end.
    pub fn run(
        &mut self,
        backend: &mut impl FrameBackend,
        pump: &mut impl EventPump,
        token: &CancellationToken,
    ) -> Result<FrameStats> {
        while !token.is_cancelled() {
            self.run_frame(backend)?;
            pump.pump_events(token);
        }
        log::info!(
            "Frame loop stopped: {} presented, {} skipped",
            self.stats.presented,
            self.stats.skipped
        );
        Ok(self.stats)
    }

    /// One pass through the cycle.
    pub fn run_frame(&mut self, backend: &mut impl FrameBackend) -> Result<FrameOutcome> {
        self.sequencer.wait_fence()?;
        backend.wait_for_frame()?;

        let image = match backend.acquire_image()? {
            AcquireOutcome::Image { index, suboptimal } => {
                if suboptimal {
                    log::trace!("Acquired suboptimal image {}", index.get());
                }
                index
            }
            AcquireOutcome::Outdated => {
                backend.rearm_fence()?;
                self.sequencer.abandon()?;
                self.stats.skipped += 1;
                self.stats.outdated += 1;
                backend.on_outdated(OutdatedStage::Acquire)?;
                return Ok(FrameOutcome::Skipped);
            }
        };
        self.sequencer.acquire(image)?;

        self.sequencer.record(image)?;
        backend.record(image)?;

        self.sequencer.submit()?;
        backend.submit()?;

        let image = self.sequencer.present()?;
        match backend.present(image)? {
            PresentOutcome::Presented { .. } => {}
            PresentOutcome::Outdated => {
                self.stats.outdated += 1;
                backend.on_outdated(OutdatedStage::Present)?;
            }
        }
        self.stats.presented += 1;
        log::trace!("Presented image {}", image.get());

        Ok(FrameOutcome::Presented(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::RenderError;
    use ash::vk;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait,
        Acquire,
        Record(u32),
        Submit,
        Present(u32),
        Rearm,
        Outdated(OutdatedStage),
    }

    /// Records calls and checks them with its own sequencer, independently of
    /// the loop under test.
    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<Call>,
        checker: FrameSequencer,
        next_image: u32,
        acquire_script: VecDeque<AcquireOutcome>,
        present_script: VecDeque<PresentOutcome>,
        fail_submit: bool,
    }

    impl RecordingBackend {
        fn image(raw: u32) -> ImageIndex {
            ImageIndex::new(raw).unwrap()
        }
    }

    impl FrameBackend for RecordingBackend {
        fn wait_for_frame(&mut self) -> Result<()> {
            self.calls.push(Call::Wait);
            self.checker.wait_fence()?;
            Ok(())
        }

        fn acquire_image(&mut self) -> Result<AcquireOutcome> {
            self.calls.push(Call::Acquire);
            let outcome = self.acquire_script.pop_front().unwrap_or_else(|| {
                let index = Self::image(self.next_image);
                self.next_image = (self.next_image + 1) % 2;
                AcquireOutcome::Image { index, suboptimal: false }
            });
            if let AcquireOutcome::Image { index, .. } = outcome {
                self.checker.acquire(index)?;
            }
            Ok(outcome)
        }

        fn record(&mut self, image: ImageIndex) -> Result<()> {
            self.calls.push(Call::Record(image.get()));
            self.checker.record(image)?;
            Ok(())
        }

        fn submit(&mut self) -> Result<()> {
            self.calls.push(Call::Submit);
            if self.fail_submit {
                return Err(RenderError::SubmitRejected(vk::Result::ERROR_DEVICE_LOST));
            }
            self.checker.submit()?;
            Ok(())
        }

        fn present(&mut self, image: ImageIndex) -> Result<PresentOutcome> {
            self.calls.push(Call::Present(image.get()));
            assert_eq!(self.checker.present()?, image);
            Ok(self
                .present_script
                .pop_front()
                .unwrap_or(PresentOutcome::Presented { suboptimal: false }))
        }

        fn rearm_fence(&mut self) -> Result<()> {
            self.calls.push(Call::Rearm);
            self.checker.abandon()?;
            Ok(())
        }

        fn on_outdated(&mut self, stage: OutdatedStage) -> Result<()> {
            self.calls.push(Call::Outdated(stage));
            Ok(())
        }
    }

    /// Cancels after a fixed number of pumps.
    struct CountdownPump {
        remaining: usize,
        pumped: usize,
    }

    impl CountdownPump {
        fn new(frames: usize) -> Self {
            Self { remaining: frames, pumped: 0 }
        }
    }

    impl EventPump for CountdownPump {
        fn pump_events(&mut self, token: &CancellationToken) {
            self.pumped += 1;
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                token.cancel();
            }
        }
    }

    fn full_frame(image: u32) -> Vec<Call> {
        vec![Call::Wait, Call::Acquire, Call::Record(image), Call::Submit, Call::Present(image)]
    }

    #[test]
    fn frames_run_in_order_until_cancelled() {
        let mut backend = RecordingBackend::default();
        let mut pump = CountdownPump::new(3);
        let token = CancellationToken::new();

        let stats = FrameLoop::new().run(&mut backend, &mut pump, &token).unwrap();

        let expected: Vec<Call> = [0, 1, 0].into_iter().flat_map(full_frame).collect();
        assert_eq!(backend.calls, expected);
        assert_eq!(stats, FrameStats { presented: 3, skipped: 0, outdated: 0 });
        assert_eq!(pump.pumped, 3);
    }

    #[test]
    fn cancelled_token_runs_no_frames() {
        let mut backend = RecordingBackend::default();
        let mut pump = CountdownPump::new(1);
        let token = CancellationToken::new();
        token.cancel();

        let stats = FrameLoop::new().run(&mut backend, &mut pump, &token).unwrap();
        assert!(backend.calls.is_empty());
        assert_eq!(pump.pumped, 0);
        assert_eq!(stats.presented, 0);
    }

    #[test]
    fn token_clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn outdated_acquire_rearms_and_skips() {
        let mut backend = RecordingBackend::default();
        backend.acquire_script.push_back(AcquireOutcome::Outdated);
        let mut pump = CountdownPump::new(2);
        let token = CancellationToken::new();

        let stats = FrameLoop::new().run(&mut backend, &mut pump, &token).unwrap();

        let mut expected = vec![
            Call::Wait,
            Call::Acquire,
            Call::Rearm,
            Call::Outdated(OutdatedStage::Acquire),
        ];
        expected.extend(full_frame(0));
        assert_eq!(backend.calls, expected);
        assert_eq!(stats, FrameStats { presented: 1, skipped: 1, outdated: 1 });
    }

    #[test]
    fn outdated_present_still_completes_frame() {
        let mut backend = RecordingBackend::default();
        backend.present_script.push_back(PresentOutcome::Outdated);
        let mut frame_loop = FrameLoop::new();

        let outcome = frame_loop.run_frame(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented(RecordingBackend::image(0)));
        assert_eq!(backend.calls.last(), Some(&Call::Outdated(OutdatedStage::Present)));

        // next frame proceeds normally
        frame_loop.run_frame(&mut backend).unwrap();
        assert_eq!(frame_loop.stats().presented, 2);
        assert_eq!(frame_loop.stats().outdated, 1);
    }

    #[test]
    fn rejected_submit_stops_the_loop() {
        let mut backend = RecordingBackend { fail_submit: true, ..Default::default() };
        let mut pump = CountdownPump::new(5);
        let token = CancellationToken::new();

        let err = FrameLoop::new().run(&mut backend, &mut pump, &token).unwrap_err();
        assert!(matches!(err, RenderError::SubmitRejected(_)));
        assert_eq!(backend.calls.last(), Some(&Call::Submit));
        assert_eq!(pump.pumped, 0);
    }

    #[test]
    fn sequencer_rejects_record_before_fence_wait() {
        let mut seq = FrameSequencer::new();
        let err = seq.record(RecordingBackend::image(0)).unwrap_err();
        assert_eq!(
            err,
            SequenceError::OutOfOrder { from: FramePhase::Idle, attempted: FrameStep::Record }
        );
    }

    #[test]
    fn sequencer_rejects_resubmit_without_new_wait() {
        let image = RecordingBackend::image(1);
        let mut seq = FrameSequencer::new();
        seq.wait_fence().unwrap();
        seq.acquire(image).unwrap();
        seq.record(image).unwrap();
        seq.submit().unwrap();
        assert!(seq.submit().is_err());
        seq.present().unwrap();

        // re-recording after present needs a fresh wait + acquire
        assert!(seq.record(image).is_err());
        assert!(seq.submit().is_err());
        seq.wait_fence().unwrap();
        assert_eq!(seq.phase(), FramePhase::FenceWaited);
    }

    #[test]
    fn sequencer_rejects_double_wait_and_wrong_image() {
        let mut seq = FrameSequencer::new();
        seq.wait_fence().unwrap();
        assert!(seq.wait_fence().is_err());

        seq.acquire(RecordingBackend::image(0)).unwrap();
        let err = seq.record(RecordingBackend::image(1)).unwrap_err();
        assert!(matches!(err, SequenceError::WrongImage { .. }));
    }

    #[test]
    fn abandon_only_right_after_wait() {
        let mut seq = FrameSequencer::new();
        assert!(seq.abandon().is_err());
        seq.wait_fence().unwrap();
        seq.abandon().unwrap();
        assert_eq!(seq.phase(), FramePhase::Idle);
        seq.wait_fence().unwrap();
    }

    #[test]
    fn sequence_errors_convert_into_render_errors() {
        let err: RenderError = FrameSequencer::new().present().unwrap_err().into();
        assert!(matches!(err, RenderError::FrameSequence(_)));
        assert!(err.to_string().contains("present"));
    }
}
