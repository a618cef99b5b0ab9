pub mod members;
pub mod reservations;

pub use members::MemberStore;
pub use reservations::ReservationStore;
