pub mod booking;
pub mod duplicate;

pub use booking::BookingCoordinator;
pub use duplicate::DuplicationAdapter;
