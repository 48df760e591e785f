//! Mission statistics packet.

use super::{PacketIo, PacketKind, WriteContext};
use crate::error::{PacketError, PacketResult};
use crate::time::validate_optional_time;
use epcr_storage::{Statement, Store};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Dispatch urgency class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    /// Immediate threat to life.
    A,
    /// Possible threat to life.
    B,
    /// Urgent, stable.
    C,
    /// Non-urgent.
    D,
}

impl Urgency {
    /// Returns the single-letter code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::A => "A",
            Urgency::B => "B",
            Urgency::C => "C",
            Urgency::D => "D",
        }
    }
}

impl FromStr for Urgency {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Urgency::A),
            "B" => Ok(Urgency::B),
            "C" => Ok(Urgency::C),
            "D" => Ok(Urgency::D),
            other => Err(PacketError::validation(
                PacketKind::Statistics,
                "urgency",
                format!("unknown urgency class {other:?}"),
            )),
        }
    }
}

/// Dispatch and timing data for the mission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatisticsPacket {
    /// Dispatch reason code.
    pub dispatch_code: Option<String>,
    /// Urgency class given by dispatch.
    pub urgency: Option<Urgency>,
    /// Time the unit was alarmed (`HH:MM`).
    pub alarm_time: Option<String>,
    /// Time the unit reached the patient (`HH:MM`).
    pub arrival_time: Option<String>,
    /// Time the unit left the scene (`HH:MM`).
    pub departure_time: Option<String>,
    /// Where the patient was taken.
    pub destination: Option<String>,
    /// Distance driven, kilometres.
    pub distance_km: Option<i32>,
}

impl PacketIo for StatisticsPacket {
    fn load(store: &mut dyn Store, record_id: i64) -> PacketResult<Option<Self>> {
        let rows = store.query(
            &Statement::new(
                "SELECT dispatch_code, urgency, alarm_time, arrival_time, departure_time, \
                 destination, distance_km FROM statistics WHERE record_id = ?1",
            )
            .bind(record_id),
        )?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let urgency = row
            .get_opt_text(1)?
            .map(|code| code.parse::<Urgency>())
            .transpose()?;

        Ok(Some(StatisticsPacket {
            dispatch_code: row.get_opt_text(0)?,
            urgency,
            alarm_time: row.get_opt_text(2)?,
            arrival_time: row.get_opt_text(3)?,
            departure_time: row.get_opt_text(4)?,
            destination: row.get_opt_text(5)?,
            distance_km: row.get_opt_i32(6)?,
        }))
    }

    fn write(
        &self,
        store: &mut dyn Store,
        record_id: i64,
        _ctx: &WriteContext<'_>,
    ) -> PacketResult<usize> {
        let kind = PacketKind::Statistics;
        validate_optional_time(kind, "alarm time", self.alarm_time.as_deref())?;
        validate_optional_time(kind, "arrival time", self.arrival_time.as_deref())?;
        validate_optional_time(kind, "departure time", self.departure_time.as_deref())?;
        if matches!(self.distance_km, Some(km) if km < 0) {
            return Err(PacketError::validation(kind, "distance", "must not be negative"));
        }

        store.update(
            &Statement::new("DELETE FROM statistics WHERE record_id = ?1").bind(record_id),
        )?;
        Ok(store.update(
            &Statement::new(
                "INSERT INTO statistics (record_id, dispatch_code, urgency, alarm_time, \
                 arrival_time, departure_time, destination, distance_km) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(record_id)
            .bind(self.dispatch_code.as_deref())
            .bind(self.urgency.map(|u| u.as_str()))
            .bind(self.alarm_time.as_deref())
            .bind(self.arrival_time.as_deref())
            .bind(self.departure_time.as_deref())
            .bind(self.destination.as_deref())
            .bind(self.distance_km),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_codes() {
        for u in [Urgency::A, Urgency::B, Urgency::C, Urgency::D] {
            assert_eq!(u.as_str().parse::<Urgency>().unwrap(), u);
        }
        assert!("E".parse::<Urgency>().unwrap_err().is_validation());
    }
}
