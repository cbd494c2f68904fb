pub mod resolver;

pub use resolver::AvailabilityResolver;
