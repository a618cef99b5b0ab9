use crate::messaging::{compose_confirmation, Confirmation};
use crate::stores::reservations::{parse_date, ReservationStore};
use chrono::{Local, NaiveDate, Timelike};
use serde::Serialize;
use shared::*;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookingStep {
    SelectSlot,
    /// Identity form kept for flows that do not take identity from the session.
    Details,
    Summary,
    Submitted,
}

/// Local date and hour used to disable slots that have already started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingClock {
    pub today: NaiveDate,
    pub hour: u32,
}

impl BookingClock {
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            today: now.date_naive(),
            hour: now.hour(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotOption {
    pub label: &'static str,
    pub occupied: bool,
    pub past: bool,
    pub disabled: bool,
}

/// Slot list for one table and day. Occupancy comes from the store's loaded list.
pub async fn slot_options(
    store: &ReservationStore,
    table_id: i32,
    date: Option<NaiveDate>,
    clock: BookingClock,
) -> Vec<SlotOption> {
    let mut options = Vec::with_capacity(SLOT_LABELS.len());
    for label in SLOT_LABELS {
        let (occupied, past) = match date {
            Some(date) => {
                let hour = slot_hour(label).unwrap_or_default();
                let past = date < clock.today || (date == clock.today && hour <= clock.hour);
                (store.is_occupied(table_id, date, label).await, past)
            }
            None => (false, false),
        };
        options.push(SlotOption {
            label,
            occupied,
            past,
            disabled: occupied || past,
        });
    }
    options
}

#[derive(Debug, Clone)]
pub struct BookingFlow {
    table: &'static Table,
    step: BookingStep,
    legacy_details: bool,
    date: String,
    time: String,
    name: String,
    member_id: String,
    mobile: String,
    error: Option<String>,
    created: Option<Reservation>,
}

impl BookingFlow {
    /// Opens the flow on `table_id` with the date preset to today.
    pub fn open(table_id: i32, clock: BookingClock) -> StoreResult<Self> {
        let table = find_table(table_id)
            .ok_or_else(|| StoreError::NotFound(format!("Mesa desconocida: {table_id}")))?;
        Ok(Self {
            table,
            step: BookingStep::SelectSlot,
            legacy_details: false,
            date: clock.today.format("%Y-%m-%d").to_string(),
            time: String::new(),
            name: String::new(),
            member_id: String::new(),
            mobile: String::new(),
            error: None,
            created: None,
        })
    }

    /// Routes the flow through the `Details` identity form.
    pub fn with_details_step(mut self) -> Self {
        self.legacy_details = true;
        self
    }

    pub fn table(&self) -> &'static Table {
        self.table
    }

    pub fn step(&self) -> BookingStep {
        self.step
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created(&self) -> Option<&Reservation> {
        self.created.as_ref()
    }

    pub fn set_date(&mut self, date: &str) {
        self.date = date.trim().to_string();
        self.time.clear();
    }

    pub fn set_identity(&mut self, name: &str, member_id: &str, mobile: &str) {
        self.name = name.trim().to_string();
        self.member_id = member_id.trim().to_string();
        self.mobile = mobile.trim().to_string();
    }

    pub async fn options(&self, store: &ReservationStore, clock: BookingClock) -> Vec<SlotOption> {
        let date = parse_date(&self.date).ok();
        slot_options(store, self.table.id, date, clock).await
    }

    /// Selects `label` if it is offered and enabled for the current date.
    pub async fn select_slot(
        &mut self,
        label: &str,
        store: &ReservationStore,
        clock: BookingClock,
    ) -> StoreResult<()> {
        if self.step != BookingStep::SelectSlot {
            return Err(StoreError::Validation("La hora ya está elegida".to_string()));
        }
        let option = self
            .options(store, clock)
            .await
            .into_iter()
            .find(|o| o.label == label)
            .ok_or_else(|| StoreError::Validation(format!("Hora no válida: {label}")))?;
        if option.occupied {
            return Err(StoreError::Conflict(MSG_SLOT_TAKEN.to_string()));
        }
        if option.past {
            return Err(StoreError::Validation(format!("La hora {label} ya ha pasado")));
        }
        self.time = option.label.to_string();
        Ok(())
    }

    pub fn advance(&mut self) -> StoreResult<BookingStep> {
        let next = match self.step {
            BookingStep::SelectSlot => {
                if self.date.is_empty() || self.time.is_empty() {
                    return Err(StoreError::Validation(MSG_MISSING_FIELDS.to_string()));
                }
                // Summary needs a number to send the confirmation to.
                if !self.legacy_details && self.mobile.is_empty() {
                    return Err(StoreError::Validation(MSG_MISSING_FIELDS.to_string()));
                }
                if self.legacy_details {
                    BookingStep::Details
                } else {
                    BookingStep::Summary
                }
            }
            BookingStep::Details => {
                if self.name.is_empty() || self.member_id.is_empty() || self.mobile.is_empty() {
                    return Err(StoreError::Validation(MSG_MISSING_FIELDS.to_string()));
                }
                BookingStep::Summary
            }
            BookingStep::Summary | BookingStep::Submitted => return Ok(self.step),
        };
        self.step = next;
        Ok(next)
    }

    pub fn back(&mut self) {
        self.step = match self.step {
            BookingStep::Summary if self.legacy_details => BookingStep::Details,
            BookingStep::Summary | BookingStep::Details => BookingStep::SelectSlot,
            other => other,
        };
    }

    pub fn request(&self) -> ReservationRequest {
        ReservationRequest {
            table_id: self.table.id,
            date: self.date.clone(),
            time: self.time.clone(),
            name: self.name.clone(),
            member_id: self.member_id.clone(),
            mobile: self.mobile.clone(),
        }
    }

    /// Books the slot. On failure the flow stays at `Summary` so the member can retry.
    pub async fn submit(
        &mut self,
        store: &ReservationStore,
        public_base_url: &str,
    ) -> StoreResult<Confirmation> {
        if self.step != BookingStep::Summary {
            return Err(StoreError::Validation(MSG_MISSING_FIELDS.to_string()));
        }
        match store.add(&self.request()).await {
            Ok(reservation) => {
                let confirmation = compose_confirmation(&reservation, public_base_url);
                info!("Booking flow submitted reservation {}", reservation.id);
                self.created = Some(reservation);
                self.error = None;
                self.step = BookingStep::Submitted;
                Ok(confirmation)
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use std::sync::Arc;
    use uuid::Uuid;

    fn clock(day: &str, hour: u32) -> BookingClock {
        BookingClock {
            today: parse_date(day).expect("date"),
            hour,
        }
    }

    async fn store_with(reservations: Vec<(i32, &str, &str)>) -> (Arc<InMemoryBackend>, ReservationStore) {
        let rows = reservations
            .into_iter()
            .map(|(table_id, day, time)| Reservation {
                id: Uuid::new_v4(),
                table_id,
                date: parse_date(day).expect("date"),
                time: time.to_string(),
                customer_name: "Pepe".to_string(),
                member_id: String::new(),
                mobile: None,
            })
            .collect();
        let backend = Arc::new(InMemoryBackend::with_reservations(rows));
        let store = ReservationStore::new(backend.clone());
        store.list().await.expect("load");
        (backend, store)
    }

    #[tokio::test]
    async fn occupied_and_started_slots_are_disabled() {
        let (_, store) = store_with(vec![(1, "2024-06-01", "15:00")]).await;
        let now = clock("2024-06-01", 10);

        let options = slot_options(&store, 1, parse_date("2024-06-01").ok(), now).await;
        let disabled: Vec<&str> = options.iter().filter(|o| o.disabled).map(|o| o.label).collect();
        assert_eq!(disabled, vec!["09:00", "10:00", "15:00"]);

        let tomorrow = slot_options(&store, 1, parse_date("2024-06-02").ok(), now).await;
        assert!(tomorrow.iter().all(|o| !o.disabled));

        let other_table = slot_options(&store, 2, parse_date("2024-06-01").ok(), now).await;
        assert!(!other_table.iter().any(|o| o.occupied));

        let yesterday = slot_options(&store, 1, parse_date("2024-05-31").ok(), now).await;
        assert!(yesterday.iter().all(|o| o.disabled));
    }

    #[tokio::test]
    async fn advancing_requires_date_and_enabled_slot() {
        let (_, store) = store_with(vec![(1, "2024-06-02", "12:00")]).await;
        let now = clock("2024-06-01", 8);
        let mut flow = BookingFlow::open(1, now).expect("open");
        flow.set_identity("Ana", "7", "600111222");

        assert!(flow.advance().is_err());
        flow.set_date("2024-06-02");

        let err = flow.select_slot("12:00", &store, now).await.expect_err("taken");
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(flow.select_slot("12:30", &store, now).await.is_err());

        flow.select_slot("13:00", &store, now).await.expect("free");
        flow.set_date("");
        assert!(flow.advance().is_err());

        flow.set_date("2024-06-02");
        flow.select_slot("13:00", &store, now).await.expect("free");
        assert_eq!(flow.advance().expect("advance"), BookingStep::Summary);
    }

    #[tokio::test]
    async fn submit_books_and_returns_confirmation() {
        let (backend, store) = store_with(vec![]).await;
        let now = clock("2024-06-01", 8);
        let mut flow = BookingFlow::open(3, now).expect("open");
        flow.set_identity("Ana", "7", "600 111 222");
        flow.select_slot("11:00", &store, now).await.expect("slot");
        flow.advance().expect("advance");

        let confirmation = flow.submit(&store, "https://club.example").await.expect("submit");
        assert_eq!(flow.step(), BookingStep::Submitted);
        let created = flow.created().expect("created");
        assert!(confirmation.cancel_url.ends_with(&created.id.to_string()));
        assert!(confirmation
            .link
            .expect("link")
            .starts_with("https://wa.me/34600111222?text="));
        assert_eq!(backend.reservation_count().await, 1);
    }

    #[tokio::test]
    async fn failed_submit_stays_open_for_retry() {
        let (backend, store) = store_with(vec![]).await;
        let now = clock("2024-06-01", 8);
        let mut flow = BookingFlow::open(1, now).expect("open");
        flow.set_identity("Ana", "7", "600111222");
        flow.select_slot("10:00", &store, now).await.expect("slot");
        flow.advance().expect("advance");

        backend.fail_next("network down").await;
        let err = flow.submit(&store, "https://club.example").await.expect_err("remote");
        assert_eq!(err, StoreError::Remote("network down".to_string()));
        assert_eq!(flow.step(), BookingStep::Summary);
        assert_eq!(flow.error(), Some("network down"));

        flow.submit(&store, "https://club.example").await.expect("retry");
        assert_eq!(flow.step(), BookingStep::Submitted);
    }

    #[tokio::test]
    async fn summary_requires_a_mobile_number() {
        let (_, store) = store_with(vec![]).await;
        let now = clock("2024-06-01", 8);
        let mut flow = BookingFlow::open(1, now).expect("open");
        flow.set_identity("Ana", "7", "   ");
        flow.select_slot("10:00", &store, now).await.expect("slot");

        let err = flow.advance().expect_err("no mobile");
        assert_eq!(err, StoreError::Validation(MSG_MISSING_FIELDS.to_string()));
        assert_eq!(flow.step(), BookingStep::SelectSlot);

        flow.set_identity("Ana", "7", "600111222");
        assert_eq!(flow.advance().expect("advance"), BookingStep::Summary);
    }

    #[tokio::test]
    async fn details_step_requires_full_identity() {
        let (_, store) = store_with(vec![]).await;
        let now = clock("2024-06-01", 8);
        let mut flow = BookingFlow::open(2, now).expect("open").with_details_step();
        flow.select_slot("18:00", &store, now).await.expect("slot");

        assert_eq!(flow.advance().expect("to details"), BookingStep::Details);
        flow.set_identity("Ana", "", "600111222");
        assert!(flow.advance().is_err());
        flow.set_identity("Ana", "7", "600111222");
        assert_eq!(flow.advance().expect("to summary"), BookingStep::Summary);

        flow.back();
        assert_eq!(flow.step(), BookingStep::Details);
        flow.back();
        assert_eq!(flow.step(), BookingStep::SelectSlot);
    }

    #[test]
    fn unknown_table_cannot_be_opened() {
        let err = BookingFlow::open(42, clock("2024-06-01", 8)).expect_err("unknown");
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
