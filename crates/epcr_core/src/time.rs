//! Clock time fields.

use crate::error::{PacketError, PacketResult};
use crate::packet::PacketKind;
use chrono::format::ParseErrorKind;
use chrono::NaiveTime;

/// Checks that `value` is a 24-hour `HH:MM` time with two-digit fields.
pub fn validate_clock_time(kind: PacketKind, field: &'static str, value: &str) -> PacketResult<()> {
    // chrono accepts single-digit hours, so the shape is checked first.
    let padded = value.len() == 5 && value.bytes().all(|b| b.is_ascii_digit() || b == b':');
    if !padded {
        return Err(PacketError::validation(
            kind,
            field,
            format!("expected HH:MM, got {value:?}"),
        ));
    }

    match NaiveTime::parse_from_str(value, "%H:%M") {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ParseErrorKind::OutOfRange => Err(PacketError::validation(
            kind,
            field,
            format!("{value} is not a time of day"),
        )),
        Err(e) => Err(PacketError::validation(
            kind,
            field,
            format!("expected HH:MM, got {value:?}: {e}"),
        )),
    }
}

pub(crate) fn validate_optional_time(
    kind: PacketKind,
    field: &'static str,
    value: Option<&str>,
) -> PacketResult<()> {
    match value {
        Some(v) => validate_clock_time(kind, field, v),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_times() {
        for t in ["00:00", "09:41", "23:59"] {
            assert!(validate_clock_time(PacketKind::Action, "time", t).is_ok(), "{t}");
        }
    }

    #[test]
    fn rejects_malformed_times() {
        for t in ["", "9:41", " 9:41", "24:00", "12:60", "12-30", "ab:cd", "12:300", "1:2:3"] {
            let err = validate_clock_time(PacketKind::Action, "time", t).unwrap_err();
            assert!(err.is_validation(), "{t}");
        }
    }

    #[test]
    fn out_of_range_is_reported_as_such() {
        let err = validate_clock_time(PacketKind::Medicine, "time", "25:10").unwrap_err();
        assert!(err.to_string().ends_with("25:10 is not a time of day"));
        let err = validate_clock_time(PacketKind::Medicine, "time", "9:41").unwrap_err();
        assert!(err.to_string().contains("expected HH:MM"));
    }
}
