//! Frame slot bookkeeping
//!
//! [`FrameScheduler`] tracks, without touching the GPU, which state every frame
//! slot is in, which slot last rendered into each swapchain image, and the
//! submission values the renderer uses to recycle per-frame command pools.
//!
//! A slot moves `Idle → Recording → Submitted → Presenting` and back to
//! `Idle`/`Recording` once its fence has been observed signaled.

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Lifecycle state of a frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Never used, or its last recording was abandoned
    Idle,
    /// Command buffer is being recorded
    Recording,
    /// Work submitted to the graphics queue
    Submitted,
    /// Presentation queued for the acquired image
    Presenting,
}

/// Next step of the frame loop after an image acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireAction {
    /// Render into `image_index`
    Proceed {
        /// Acquired swapchain image
        image_index: u32,
        /// Swapchain still works but no longer matches the surface
        suboptimal: bool,
    },
    /// Cancel the recording, rebuild the swapchain and acquire again
    Recreate,
}

impl AcquireAction {
    /// Classify the result of `Swapchain::acquire_next_image`
    ///
    /// Only an out-of-date swapchain is retried; every other error is returned.
    pub fn from_result(result: VulkanResult<(u32, bool)>) -> VulkanResult<Self> {
        match result {
            Ok((image_index, suboptimal)) => Ok(Self::Proceed { image_index, suboptimal }),
            Err(VulkanError::SwapchainOutOfDate) => Ok(Self::Recreate),
            Err(e) => Err(e),
        }
    }
}

/// Whether the swapchain must be rebuilt once the frame has been presented
pub fn recreate_after_present(acquired_suboptimal: bool, present_suboptimal: bool, resize_pending: bool) -> bool {
    acquired_suboptimal || present_suboptimal || resize_pending
}

/// Pure frame-slot state machine plus the images-in-flight map
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    slots: Vec<SlotState>,
    submission_values: Vec<u64>,
    images_in_flight: Vec<Option<usize>>,
    current: usize,
    next_value: u64,
    completed_value: u64,
}

impl FrameScheduler {
    /// Create a scheduler for `frames_in_flight` slots and `image_count` swapchain images
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        let frames_in_flight = frames_in_flight.max(1);
        Self {
            slots: vec![SlotState::Idle; frames_in_flight],
            submission_values: vec![0; frames_in_flight],
            images_in_flight: vec![None; image_count],
            current: 0,
            next_value: 1,
            completed_value: 0,
        }
    }

    /// Slot the next frame will use
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Number of frame slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// State of `slot`
    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).copied()
    }

    /// Highest submission value known to have finished on the GPU
    pub fn completed_value(&self) -> u64 {
        self.completed_value
    }

    /// Slot that last claimed swapchain image `image`, if any
    pub fn image_owner(&self, image: usize) -> Option<usize> {
        self.images_in_flight.get(image).copied().flatten()
    }

    /// Start recording into `slot`
    ///
    /// `fence_signaled` must report the slot's fence state after the CPU wait;
    /// recording is refused while the GPU may still be using the slot. Observing
    /// the fence also marks the slot's last submission as completed.
    pub fn begin_recording(&mut self, slot: usize, fence_signaled: bool) -> VulkanResult<()> {
        let state = self.state(slot)?;
        if !fence_signaled {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Frame slot {slot} reused before its fence signaled"),
            });
        }
        if state == SlotState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Frame slot {slot} is already recording"),
            });
        }

        // Submissions share one queue, so they complete in order.
        self.completed_value = self.completed_value.max(self.submission_values[slot]);
        self.slots[slot] = SlotState::Recording;
        Ok(())
    }

    /// Abandon a recording that never reached submission (e.g. out-of-date acquire)
    pub fn cancel_recording(&mut self, slot: usize) -> VulkanResult<()> {
        self.expect_state(slot, SlotState::Recording)?;
        self.slots[slot] = SlotState::Idle;
        Ok(())
    }

    /// Record that `slot` will render into swapchain image `image`
    ///
    /// Returns the other slot whose fence must be waited on first when that slot
    /// still has the image checked out.
    pub fn claim_image(&mut self, image: usize, slot: usize) -> VulkanResult<Option<usize>> {
        self.state(slot)?;
        let entry = self
            .images_in_flight
            .get_mut(image)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("Swapchain image index {image} out of range"),
            })?;

        let previous = entry.replace(slot);
        Ok(previous.filter(|&owner| owner != slot))
    }

    /// Record the queue submission for `slot`, returning its submission value
    pub fn mark_submitted(&mut self, slot: usize) -> VulkanResult<u64> {
        self.expect_state(slot, SlotState::Recording)?;
        let value = self.next_value;
        self.next_value += 1;
        self.submission_values[slot] = value;
        self.slots[slot] = SlotState::Submitted;
        Ok(value)
    }

    /// Record that presentation was queued for `slot`
    pub fn mark_presented(&mut self, slot: usize) -> VulkanResult<()> {
        self.expect_state(slot, SlotState::Submitted)?;
        self.slots[slot] = SlotState::Presenting;
        Ok(())
    }

    /// Move on to the next slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    /// Forget image ownership after the swapchain was recreated with `image_count` images
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight = vec![None; image_count];
    }

    fn state(&self, slot: usize) -> VulkanResult<SlotState> {
        self.slot_state(slot).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Frame slot {slot} out of range"),
        })
    }

    fn expect_state(&self, slot: usize, expected: SlotState) -> VulkanResult<()> {
        let state = self.state(slot)?;
        if state == expected {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: format!("Frame slot {slot} is {state:?}, expected {expected:?}"),
            })
        }
    }
}
