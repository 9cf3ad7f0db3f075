//! One-submission-in-flight synchronization
//!
//! A [`FrameSynchronizer`] owns a single fence and tracks at most one [`SubmissionInfo`]
//! between `submit` and `wait`. Submitting again while work is outstanding drains the
//! previous submission first, so a command buffer handed back by `wait` is never still
//! executing.

use ash::vk;
use std::sync::Arc;
use std::time::Duration;

use super::vulkan::{GpuDevice, VulkanResult};

/// Semaphore the submission waits on, and the stage that waits
#[derive(Debug, PartialEq, Eq)]
pub struct WaitSemaphore {
    /// Semaphore signaled by earlier queue work
    pub semaphore: vk::Semaphore,
    /// Stage blocked until the semaphore signals
    pub stage: vk::PipelineStageFlags,
}

/// One queue submission
///
/// Moving a `SubmissionInfo` into [`FrameSynchronizer::submit`] hands it to the GPU; `wait`
/// hands it back.
#[derive(Debug, PartialEq, Eq)]
pub struct SubmissionInfo {
    /// Optional wait dependency
    pub wait: Option<WaitSemaphore>,
    /// Optional semaphore signaled on completion
    pub signal: Option<vk::Semaphore>,
    /// Command buffer executed by this submission
    pub command_buffer: vk::CommandBuffer,
}

impl SubmissionInfo {
    /// Submission with no semaphore dependencies
    pub const fn new(command_buffer: vk::CommandBuffer) -> Self {
        Self {
            wait: None,
            signal: None,
            command_buffer,
        }
    }
}

/// Fence-backed tracker for a single in-flight submission
pub struct FrameSynchronizer<D: GpuDevice> {
    device: Arc<D>,
    fence: vk::Fence,
    in_flight: Option<SubmissionInfo>,
}

impl<D: GpuDevice> FrameSynchronizer<D> {
    /// Create a synchronizer with an already signaled fence
    pub fn new(device: Arc<D>) -> VulkanResult<Self> {
        let fence = device.create_fence(true)?;
        Ok(Self {
            device,
            fence,
            in_flight: None,
        })
    }

    /// Submit `info`, draining any outstanding submission first
    pub fn submit(&mut self, info: SubmissionInfo) -> VulkanResult<()> {
        if self.in_flight.is_some() {
            log::debug!("Draining previous submission before resubmitting");
            self.wait()?;
        }

        self.device.reset_fence(self.fence)?;
        self.device.submit(&info, self.fence)?;
        self.in_flight = Some(info);
        Ok(())
    }

    /// Something has been submitted and not yet waited on
    pub const fn is_submitted(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The outstanding submission is still running on the GPU
    pub fn is_executing(&self) -> VulkanResult<bool> {
        if self.in_flight.is_none() {
            return Ok(false);
        }
        Ok(!self.device.wait_for_fence(self.fence, 0)?)
    }

    /// Block until the outstanding submission completes and take it back
    ///
    /// # Panics
    /// When nothing is submitted.
    pub fn wait(&mut self) -> VulkanResult<SubmissionInfo> {
        assert!(self.in_flight.is_some(), "wait called with nothing submitted");
        match self.wait_for(u64::MAX)? {
            Some(info) => Ok(info),
            None => unreachable!("an unbounded fence wait cannot time out"),
        }
    }

    /// Bounded [`Self::wait`]; `None` when `timeout` elapses with the submission still running
    ///
    /// # Panics
    /// When nothing is submitted.
    pub fn wait_timeout(&mut self, timeout: Duration) -> VulkanResult<Option<SubmissionInfo>> {
        assert!(self.in_flight.is_some(), "wait called with nothing submitted");
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        self.wait_for(timeout_ns)
    }

    fn wait_for(&mut self, timeout_ns: u64) -> VulkanResult<Option<SubmissionInfo>> {
        if self.device.wait_for_fence(self.fence, timeout_ns)? {
            Ok(self.in_flight.take())
        } else {
            Ok(None)
        }
    }

    /// Device the synchronizer submits to
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }
}

impl<D: GpuDevice> Drop for FrameSynchronizer<D> {
    fn drop(&mut self) {
        if self.in_flight.is_some() {
            if let Err(e) = self.wait() {
                log::error!("Failed to wait for in-flight submission on drop: {}", e);
            }
        }
        self.device.destroy_fence(self.fence);
    }
}
