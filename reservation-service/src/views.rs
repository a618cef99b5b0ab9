use chrono::NaiveDate;
use serde::Serialize;
use shared::Reservation;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateGroup {
    pub date: NaiveDate,
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calendar {
    pub total: usize,
    pub days: Vec<DateGroup>,
}

/// Groups reservations by day, days ascending and each day ordered by slot.
pub fn calendar(reservations: Vec<Reservation>) -> Calendar {
    let total = reservations.len();
    let mut by_date: BTreeMap<NaiveDate, Vec<Reservation>> = BTreeMap::new();
    for reservation in reservations {
        by_date.entry(reservation.date).or_default().push(reservation);
    }

    let days = by_date
        .into_iter()
        .map(|(date, mut reservations)| {
            reservations.sort_by(|a, b| a.time.cmp(&b.time));
            DateGroup { date, reservations }
        })
        .collect();

    Calendar { total, days }
}

/// Reservations owned by one member, grouped the same way.
pub fn member_calendar(reservations: Vec<Reservation>, member_id: &str) -> Calendar {
    calendar(
        reservations
            .into_iter()
            .filter(|r| r.member_id == member_id)
            .collect(),
    )
}
