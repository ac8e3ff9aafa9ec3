//! Domain layer: value objects, aggregates, events and the services that feed them
pub mod aggregates;
pub mod events;
pub mod services;
pub mod value_objects;
