//! Capacity pipeline.
//!
//! Stage order per frame:
//! grayscale + blur -> mask (segmentation, contour fallback) -> outline ->
//! rotate to vertical -> crop -> pixel integration -> scale chain ->
//! metric integration when a scale resolved.
//!
//! Stage primitives live in `crate::mask`, `crate::geometry` and
//! `crate::scale`; this module only fixes the call order and the result
//! record. [`crate::CapacityPipeline`] is the public entry point.

mod result;
mod run;

pub use result::{Units, VolumeResult, NOTE_INNER_CAPACITY, NOTE_OUTER_VOLUME, NOTE_PIXEL_UNITS};
pub use run::{crop_to_mask, run, StageSet, NOTE_META_PIXEL_UNITS};
