use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CLUB_NAME: &str = "Club de billar Paterna";

pub const MSG_MISSING_FIELDS: &str = "Faltan datos obligatorios";
pub const MSG_SLOT_TAKEN: &str = "Este horario ya está reservado";
pub const MSG_NAME_REQUIRED: &str = "El nombre es obligatorio";
pub const MSG_INVALID_CODE: &str = "Código incorrecto";

/// Bookable hourly slots, in display order.
pub const SLOT_LABELS: [&str; 12] = [
    "09:00", "10:00", "11:00", "12:00", "13:00", "14:00", "15:00", "16:00", "17:00", "18:00",
    "19:00", "20:00",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Table {
    pub id: i32,
    pub name: &'static str,
    pub color_class: &'static str,
}

pub const TABLES: [Table; 3] = [
    Table { id: 1, name: "Mesa 1 - Sagredo", color_class: "icon-blue" },
    Table { id: 2, name: "Mesa 2 - Liern", color_class: "icon-red" },
    Table { id: 3, name: "Mesa 3 - Bailen", color_class: "icon-green" },
];

pub fn find_table(id: i32) -> Option<&'static Table> {
    TABLES.iter().find(|table| table.id == id)
}

/// Hour of a slot label such as `"14:00"`.
pub fn slot_hour(label: &str) -> Option<u32> {
    let (hour, minutes) = label.split_once(':')?;
    if minutes != "00" {
        return None;
    }
    hour.parse().ok().filter(|h| *h < 24)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub table_id: i32,
    pub date: NaiveDate,
    pub time: String,
    pub customer_name: String,
    pub member_id: String,
    pub mobile: Option<String>,
}

impl Reservation {
    pub fn occupies(&self, table_id: i32, date: NaiveDate, time: &str) -> bool {
        self.table_id == table_id && self.date == date && self.time == time
    }
}

/// Validated reservation data handed to a backend for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub table_id: i32,
    pub date: NaiveDate,
    pub time: String,
    pub customer_name: String,
    pub member_id: String,
    pub mobile: Option<String>,
}

/// Raw booking input as submitted by a member, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub table_id: i32,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub member_id: String,
    #[serde(default)]
    pub mobile: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub access_code: String,
    pub is_admin: bool,
    pub photo_url: Option<String>,
}

impl Member {
    pub fn apply(&mut self, update: &MemberUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(photo_url) = &update.photo_url {
            self.photo_url = Some(photo_url.clone());
        }
        if let Some(is_admin) = update.is_admin {
            self.is_admin = is_admin;
        }
    }

    pub fn profile(&self) -> MemberProfile {
        MemberProfile {
            id: self.id,
            name: self.name.clone(),
            code: self.access_code.clone(),
            is_admin: self.is_admin,
            photo_url: self.photo_url.clone(),
        }
    }
}

/// Public fields returned once an access code has been accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub is_admin: bool,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

impl MemberUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.photo_url.is_none() && self.is_admin.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Remote(String),
    #[error("{0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result envelope returned to callers: a success flag plus either data or a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, error: None, data: Some(data) }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_hours_parse_only_whole_hours() {
        assert_eq!(slot_hour("09:00"), Some(9));
        assert_eq!(slot_hour("20:00"), Some(20));
        assert_eq!(slot_hour("20:30"), None);
        assert_eq!(slot_hour("late"), None);
        assert!(SLOT_LABELS.iter().all(|label| slot_hour(label).is_some()));
    }

    #[test]
    fn member_update_only_touches_given_fields() {
        let mut member = Member {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            access_code: "1234".to_string(),
            is_admin: false,
            photo_url: None,
        };
        member.apply(&MemberUpdate {
            photo_url: Some("http://x/a.png".to_string()),
            ..Default::default()
        });
        assert_eq!(member.name, "Ana");
        assert_eq!(member.photo_url.as_deref(), Some("http://x/a.png"));
        assert!(!member.is_admin);
    }
}
