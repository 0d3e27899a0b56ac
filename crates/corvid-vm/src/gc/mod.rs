//! Memory management.
//!
//! ## Structure
//!
//! - `slab` - fixed-capacity per-class storage and typed handles
//! - `object` - heap object layouts and reference tracing
//! - `heap` - the owned heap and its allocation entry points
//! - `roots` - the explicit root stack
//! - `collector` - stop-the-world mark and sweep

pub mod collector;
pub mod heap;
pub mod object;
pub mod roots;
pub mod slab;

pub use collector::{CycleReport, GcStats};
pub use heap::{Heap, SlabUsage};
pub use object::GcTrace;
pub use roots::{Root, RootMark, RootScope, RootStack};
pub use slab::{Ref, SlabClass};
