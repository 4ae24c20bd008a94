use std::collections::HashMap;

use crate::models::appointment::Appointment;

const KNOWN_KEYS: &[&str] = &[
    "email",
    "client_email",
    "clientEmail",
    "customer_email",
    "customer[email]",
    "appointment[email]",
];

/// Finds the client's email for an appointment.
///
/// Strategies run in order and the first valid address wins:
/// known payload keys, any payload key ending in "email", the appointment's
/// own field, intake form answers labelled as email, and finally the first
/// address-shaped token in the notes.
pub fn extract_email(
    fields: &HashMap<String, String>,
    appointment: Option<&Appointment>,
) -> Option<String> {
    let known = KNOWN_KEYS.iter().filter_map(|k| fields.get(*k)).cloned();

    let mut suffixed: Vec<(&String, &String)> = fields
        .iter()
        .filter(|(k, _)| {
            let key = k.trim_end_matches(']').to_ascii_lowercase();
            key.ends_with("email") && !KNOWN_KEYS.contains(&k.as_str())
        })
        .collect();
    // HashMap order is arbitrary; keep the pick stable across runs.
    suffixed.sort_by(|a, b| a.0.cmp(b.0));
    let suffixed = suffixed.into_iter().map(|(_, v)| v.clone());

    let from_appointment = appointment.and_then(|a| a.email.clone());

    let from_forms: Vec<String> = appointment
        .map(|a| {
            a.form_values()
                .filter(|(name, _)| name.to_ascii_lowercase().contains("email"))
                .map(|(_, value)| value.to_string())
                .collect()
        })
        .unwrap_or_default();

    let from_notes = appointment
        .and_then(|a| a.notes.as_deref())
        .and_then(find_email_in_text);

    known
        .chain(suffixed)
        .chain(from_appointment)
        .chain(from_forms)
        .chain(from_notes)
        .map(|candidate| normalize_email(&candidate))
        .find(|candidate| is_valid_email(candidate))
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("mailto:")
        .trim_matches(|c| c == '<' || c == '>' || c == '"')
        .to_ascii_lowercase()
}

pub fn is_valid_email(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = candidate.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }
    domain.contains('.') && !domain.contains("..")
}

fn find_email_in_text(text: &str) -> Option<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')'))
        .map(|token| token.trim_end_matches(['.', ':', '!', '?']))
        .map(normalize_email)
        .find(|token| is_valid_email(token))
}
