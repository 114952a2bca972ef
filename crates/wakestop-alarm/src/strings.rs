//! User-facing text. Language only changes wording, never behavior.

use wakestop_nav::gnss::PositionError;
use wakestop_proto::Language;

pub fn arrival_title(lang: Language) -> &'static str {
    match lang {
        Language::En => "Wake up! Your stop is near",
        Language::Es => "¡Despierta! Tu parada está cerca",
    }
}

pub fn arrival_body(lang: Language, destination: &str, distance_m: f64, eta_min: u32) -> String {
    let d = format_distance(distance_m);
    match lang {
        Language::En => format!("{destination} is {d} away (about {eta_min} min)"),
        Language::Es => format!("{destination} está a {d} (unos {eta_min} min)"),
    }
}

pub fn snoozed(lang: Language, remaining_s: u64) -> String {
    let (m, s) = (remaining_s / 60, remaining_s % 60);
    match lang {
        Language::En => format!("Snoozed, resuming in {m}:{s:02}"),
        Language::Es => format!("En pausa, se reanuda en {m}:{s:02}"),
    }
}

pub fn position_error(lang: Language, err: PositionError) -> &'static str {
    match (lang, err) {
        (Language::En, PositionError::PermissionDenied) => "Location permission denied. The alarm cannot fire without it.",
        (Language::En, PositionError::Timeout) => "Still waiting for a GPS fix…",
        (Language::En, PositionError::PositionUnavailable) => "Position unavailable. Check the GPS receiver.",
        (Language::Es, PositionError::PermissionDenied) => "Permiso de ubicación denegado. La alarma no puede sonar sin él.",
        (Language::Es, PositionError::Timeout) => "Esperando señal GPS…",
        (Language::Es, PositionError::PositionUnavailable) => "Ubicación no disponible. Revisa el receptor GPS.",
    }
}

pub fn format_distance(m: f64) -> String {
    if m < 1000.0 {
        format!("{:.0} m", m)
    } else {
        format!("{:.1} km", m / 1000.0)
    }
}
