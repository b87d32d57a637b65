pub mod booking;
pub mod catalog;
pub mod history;
pub mod schedule;
pub mod settings;

pub use booking::{Booking, BookingRequest, BookingStatus, PaymentStatus, VehicleSize};
pub use catalog::{Service, WashBay};
pub use history::{Actor, ActorRole, BookingStatusHistory};
pub use schedule::{BusinessHours, Holiday, TimeSlot};
pub use settings::{BookingConfiguration, SlotCapacityPolicy};
