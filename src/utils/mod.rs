//! Various utilities functions and types

mod alive_tracker;
mod clock;
mod geometry;
pub(crate) mod ids;
pub mod region;

pub use self::alive_tracker::{AliveTracker, IsAlive};
pub use self::clock::{Clock, ClockSource, Monotonic, Time};
pub use self::geometry::{Buffer, Coordinate, Logical, Physical, Point, Rectangle, Size, Transform};
pub use self::region::Region;
