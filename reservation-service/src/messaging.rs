use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use shared::{find_table, Reservation, CLUB_NAME};
use uuid::Uuid;

pub const DEFAULT_COUNTRY_PREFIX: &str = "+34";

/// Characters left unescaped in a URI component.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    pub message: String,
    pub cancel_url: String,
    /// `None` when the reservation carries no phone number to message.
    pub link: Option<String>,
}

/// Strips whitespace and applies the default country prefix, returning digits without `+`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut phone: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if phone.trim_start_matches('+').is_empty() {
        return None;
    }
    if !phone.starts_with('+') {
        phone = format!("{DEFAULT_COUNTRY_PREFIX}{phone}");
    }
    Some(phone.replacen('+', "", 1))
}

pub fn cancel_url(public_base_url: &str, reservation_id: Uuid) -> String {
    format!(
        "{}/?cancel={}",
        public_base_url.trim_end_matches('/'),
        reservation_id
    )
}

pub fn confirmation_message(reservation: &Reservation, cancel_url: &str) -> String {
    let table_name = find_table(reservation.table_id)
        .map(|t| t.name.to_string())
        .unwrap_or_else(|| format!("Mesa {}", reservation.table_id));
    let cancel_text = if cancel_url.is_empty() {
        String::new()
    } else {
        format!("\n\nSi necesitas cancelar tu reserva, puedes hacerlo pulsando aquí:\n{cancel_url}")
    };

    format!(
        "*Confirmación de Reserva*\n\nHola {},\n\nTe confirmamos tu reserva en *{}*:\n\n📍 Mesa: {}\n📅 Fecha: {}\n⏰ Hora: {}h{}\n\n¡Te esperamos! 🎱",
        reservation.customer_name,
        CLUB_NAME,
        table_name,
        reservation.date.format("%Y-%m-%d"),
        reservation.time,
        cancel_text
    )
}

pub fn messaging_link(phone: &str, message: &str) -> Option<String> {
    let phone = normalize_phone(phone)?;
    Some(format!(
        "https://wa.me/{}?text={}",
        phone,
        utf8_percent_encode(message, COMPONENT)
    ))
}

/// Builds the outbound confirmation for a freshly created reservation.
pub fn compose_confirmation(reservation: &Reservation, public_base_url: &str) -> Confirmation {
    let cancel_url = cancel_url(public_base_url, reservation.id);
    let message = confirmation_message(reservation, &cancel_url);
    let link = reservation
        .mobile
        .as_deref()
        .and_then(|mobile| messaging_link(mobile, &message));
    Confirmation {
        message,
        cancel_url,
        link,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reservation() -> Reservation {
        Reservation {
            id: Uuid::nil(),
            table_id: 2,
            date: NaiveDate::from_ymd_opt(2024, 6, 1).expect("date"),
            time: "10:00".to_string(),
            customer_name: "Ana".to_string(),
            member_id: "7".to_string(),
            mobile: Some("600 111 222".to_string()),
        }
    }

    #[test]
    fn phone_gets_default_prefix_only_when_missing() {
        assert_eq!(normalize_phone("600 111 222").as_deref(), Some("34600111222"));
        assert_eq!(normalize_phone("+44 7700 900123").as_deref(), Some("447700900123"));
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone(" + "), None);
    }

    #[test]
    fn message_names_table_slot_and_cancel_link() {
        let confirmation = compose_confirmation(&reservation(), "https://club.example/");
        assert_eq!(
            confirmation.cancel_url,
            "https://club.example/?cancel=00000000-0000-0000-0000-000000000000"
        );
        assert!(confirmation.message.contains("Hola Ana,"));
        assert!(confirmation.message.contains("Mesa: Mesa 2 - Liern"));
        assert!(confirmation.message.contains("Fecha: 2024-06-01"));
        assert!(confirmation.message.contains("Hora: 10:00h"));
        assert!(confirmation.message.contains(&confirmation.cancel_url));
        assert!(confirmation
            .link
            .expect("link")
            .starts_with("https://wa.me/34600111222?text="));
    }

    #[test]
    fn no_link_without_a_phone_number() {
        let reservation = Reservation {
            mobile: None,
            ..reservation()
        };
        let confirmation = compose_confirmation(&reservation, "https://club.example");
        assert_eq!(confirmation.link, None);
        assert!(confirmation.message.contains("Hola Ana,"));
    }

    #[test]
    fn link_is_percent_encoded() {
        let link = messaging_link("600111222", "Hola Ana,\n¿ok?");
        assert_eq!(
            link.as_deref(),
            Some("https://wa.me/34600111222?text=Hola%20Ana%2C%0A%C2%BFok%3F")
        );
        assert_eq!(messaging_link("", "Hola"), None);
    }
}
