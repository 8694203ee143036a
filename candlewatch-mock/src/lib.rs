//! Test doubles for the candlewatch collaborator traits.
//!
//! - [`MemoryStore`] and [`MemoryConfigStore`]: in-memory stores with failure injection.
//! - [`SyntheticSource`]: a deterministic exchange with a fixed listing date.
//! - [`DynamicMockSource`]: a source whose answers are scripted through a controller.
//! - [`ManualClock`]: a clock tests move by hand.

mod clock;
mod dynamic;
mod source;
mod store;

pub use clock::ManualClock;
pub use dynamic::{DynamicMockController, DynamicMockSource, MockBehavior};
pub use source::SyntheticSource;
pub use store::{MemoryConfigStore, MemoryStore, StoreOp};
