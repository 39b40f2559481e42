//! Per-frame render bookkeeping.
//!
//! A [`RenderSchedule`] remembers, for every consuming camera, the last frame
//! in which the mirror was serviced for it and the command attachment the
//! mirror holds on that camera. Slots live in an arena indexed by camera, so
//! "already serviced this frame" is a single counter comparison and no
//! per-frame clearing is needed.

use std::collections::HashMap;

use crate::camera::{CameraId, FrameIndex};

#[derive(Debug)]
struct CameraSlot<A> {
    camera: CameraId,
    serviced: Option<FrameIndex>,
    attachment: Option<A>,
}

/// Arena of camera slots plus the current frame counter.
///
/// `A` is the owned attachment handle type. The schedule never duplicates
/// attachments: each one is moved in with [`RenderSchedule::attach`] and moved
/// out with [`RenderSchedule::take_attachment`], [`RenderSchedule::forget_camera`]
/// or [`RenderSchedule::drain_attachments`].
#[derive(Debug)]
pub struct RenderSchedule<A> {
    frame: FrameIndex,
    slots: Vec<CameraSlot<A>>,
    index: HashMap<CameraId, usize>,
}

impl<A> Default for RenderSchedule<A> {
    fn default() -> Self {
        Self {
            frame: FrameIndex::default(),
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<A> RenderSchedule<A> {
    /// Creates an empty schedule at frame zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current frame.
    pub fn frame(&self) -> FrameIndex {
        self.frame
    }

    /// Starts a new frame. Every camera becomes unserviced.
    pub fn begin_frame(&mut self, frame: FrameIndex) {
        if frame < self.frame {
            log::warn!(
                "render schedule frame moved backwards ({} -> {})",
                self.frame.0,
                frame.0
            );
        }
        self.frame = frame;
    }

    fn slot_mut(&mut self, camera: CameraId) -> &mut CameraSlot<A> {
        let slots = &mut self.slots;
        let index = *self.index.entry(camera).or_insert_with(|| {
            slots.push(CameraSlot {
                camera,
                serviced: None,
                attachment: None,
            });
            slots.len() - 1
        });
        &mut self.slots[index]
    }

    /// Returns whether `camera` has been serviced in the current frame.
    pub fn is_serviced(&self, camera: CameraId) -> bool {
        self.index
            .get(&camera)
            .is_some_and(|&i| self.slots[i].serviced == Some(self.frame))
    }

    /// Marks `camera` as serviced for the current frame.
    ///
    /// Returns `false` if it already was.
    pub fn mark_serviced(&mut self, camera: CameraId) -> bool {
        let frame = self.frame;
        let slot = self.slot_mut(camera);
        if slot.serviced == Some(frame) {
            return false;
        }
        slot.serviced = Some(frame);
        true
    }

    /// Returns the attachment held on `camera`, if any.
    pub fn attachment(&self, camera: CameraId) -> Option<&A> {
        self.index
            .get(&camera)
            .and_then(|&i| self.slots[i].attachment.as_ref())
    }

    /// Stores an attachment for `camera`, returning the one it replaces.
    ///
    /// The caller must release a returned attachment.
    #[must_use]
    pub fn attach(&mut self, camera: CameraId, attachment: A) -> Option<A> {
        self.slot_mut(camera).attachment.replace(attachment)
    }

    /// Removes and returns the attachment held on `camera`.
    pub fn take_attachment(&mut self, camera: CameraId) -> Option<A> {
        let index = *self.index.get(&camera)?;
        self.slots[index].attachment.take()
    }

    /// Drops the slot of a camera that no longer exists and returns its attachment.
    pub fn forget_camera(&mut self, camera: CameraId) -> Option<A> {
        let index = self.index.remove(&camera)?;
        let slot = self.slots.swap_remove(index);
        if let Some(moved) = self.slots.get(index) {
            self.index.insert(moved.camera, index);
        }
        slot.attachment
    }

    /// Removes and returns the attachments matching `stale`.
    ///
    /// Slots and their serviced marks are kept.
    pub fn take_attachments_if<F>(&mut self, mut stale: F) -> Vec<(CameraId, A)>
    where
        F: FnMut(CameraId, &A) -> bool,
    {
        let mut taken = Vec::new();
        for slot in &mut self.slots {
            if slot.attachment.as_ref().is_some_and(|a| stale(slot.camera, a)) {
                if let Some(attachment) = slot.attachment.take() {
                    taken.push((slot.camera, attachment));
                }
            }
        }
        taken
    }

    /// Empties the schedule, returning every attachment it held.
    pub fn drain_attachments(&mut self) -> Vec<(CameraId, A)> {
        self.index.clear();
        self.slots
            .drain(..)
            .filter_map(|slot| slot.attachment.map(|a| (slot.camera, a)))
            .collect()
    }

    /// Returns the number of attachments currently held.
    pub fn attached_count(&self) -> usize {
        self.slots.iter().filter(|s| s.attachment.is_some()).count()
    }

    /// Returns the number of cameras with a slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no camera has a slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over the cameras with a slot.
    pub fn cameras(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.slots.iter().map(|s| s.camera)
    }
}
