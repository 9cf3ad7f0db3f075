//! Frame pacing as an explicit state machine
//!
//! The event loop calls [`FramePacer::poll`] once per iteration. While the previous frame is
//! still on the GPU the pacer waits only for the configured timeout and reports
//! [`PacerStep::Pending`], so window events keep flowing; once the fence signals it hands the
//! returned submission to the caller's record closure and submits the result.

use std::time::Duration;

use super::submit::{FrameSynchronizer, SubmissionInfo};
use super::vulkan::{GpuDevice, VulkanResult};

/// Where the pacer is in the frame cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
    /// A frame is on the GPU
    AwaitingFence,
    /// The command buffer is free to record
    RecordAndSubmit,
}

/// Result of one [`FramePacer::poll`]
#[derive(Debug, PartialEq, Eq)]
pub enum PacerStep<T> {
    /// The previous frame is still executing
    Pending,
    /// The record closure declined to produce a frame
    Skipped,
    /// A frame was recorded and submitted
    Submitted(T),
}

/// Drives one [`FrameSynchronizer`] through await and record/submit
pub struct FramePacer<D: GpuDevice> {
    synchronizer: FrameSynchronizer<D>,
    state: PacerState,
    idle: Option<SubmissionInfo>,
}

impl<D: GpuDevice> FramePacer<D> {
    /// Start ready to record `initial`
    pub fn new(synchronizer: FrameSynchronizer<D>, initial: SubmissionInfo) -> Self {
        Self {
            synchronizer,
            state: PacerState::RecordAndSubmit,
            idle: Some(initial),
        }
    }

    /// Current state
    pub const fn state(&self) -> PacerState {
        self.state
    }

    /// Advance the frame cycle
    ///
    /// `record` receives the submission whose command buffer is free to re-record and returns
    /// `Some` when a frame should be submitted.
    pub fn poll<T>(
        &mut self,
        timeout: Duration,
        record: impl FnOnce(&SubmissionInfo) -> VulkanResult<Option<T>>,
    ) -> VulkanResult<PacerStep<T>> {
        if self.state == PacerState::AwaitingFence {
            match self.synchronizer.wait_timeout(timeout)? {
                Some(info) => {
                    self.idle = Some(info);
                    self.state = PacerState::RecordAndSubmit;
                }
                None => return Ok(PacerStep::Pending),
            }
        }

        let Some(info) = self.idle.take() else {
            unreachable!("record state without an idle submission");
        };
        match record(&info) {
            Ok(Some(output)) => {
                self.synchronizer.submit(info)?;
                self.state = PacerState::AwaitingFence;
                Ok(PacerStep::Submitted(output))
            }
            Ok(None) => {
                self.idle = Some(info);
                Ok(PacerStep::Skipped)
            }
            Err(e) => {
                self.idle = Some(info);
                Err(e)
            }
        }
    }

    /// Block until the GPU is done with the current frame
    pub fn drain(&mut self) -> VulkanResult<()> {
        if self.state == PacerState::AwaitingFence {
            self.idle = Some(self.synchronizer.wait()?);
            self.state = PacerState::RecordAndSubmit;
        }
        Ok(())
    }
}
