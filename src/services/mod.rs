pub mod allocation;
pub mod availability;
pub mod booking;
pub mod cancellation;
pub mod clock;
pub mod conflict;
pub mod events;
pub mod messaging;
pub mod payments;
pub mod saga;
pub mod settings;
pub mod sweeper;
pub mod workflow;
