//! Side effect free layout state
pub(crate) mod bsp;
pub mod diff;
pub mod geometry;
pub mod layout;

#[doc(inline)]
pub use diff::Diff;
#[doc(inline)]
pub use layout::{DeviceLayout, Extent, Layout, NotPlaced, NotPlacedStatus, PlacedComponent};
