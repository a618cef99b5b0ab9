//! Data service seam used by the stores.
//!
//! The stores are the only components that talk to a backend. `postgres` is the
//! durable implementation; `memory` keeps rows in process and backs the tests.
use async_trait::async_trait;
use shared::{Member, MemberUpdate, NewReservation, Reservation, StoreResult};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait ReservationBackend: Send + Sync {
    async fn fetch_reservations(&self) -> StoreResult<Vec<Reservation>>;
    /// Fails with `StoreError::Conflict` when the slot is already taken in the backend.
    async fn insert_reservation(&self, new: NewReservation) -> StoreResult<Reservation>;
    async fn delete_reservation(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait MemberBackend: Send + Sync {
    /// All members ordered by name.
    async fn fetch_members(&self) -> StoreResult<Vec<Member>>;
    async fn insert_member(&self, name: &str, access_code: &str) -> StoreResult<Member>;
    async fn delete_member(&self, id: Uuid) -> StoreResult<()>;
    async fn update_member(&self, id: Uuid, update: MemberUpdate) -> StoreResult<Member>;
    async fn find_member_by_code(&self, code: &str) -> StoreResult<Option<Member>>;
    async fn health_check(&self) -> StoreResult<()>;
}
