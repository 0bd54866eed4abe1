mod assignment;
mod location;
mod ride;

pub use assignment::{AssignmentOutcome, Outcome};
pub use location::{Coordinates, DriverLocation};
pub use ride::RideRequestEvent;
