//! Examination packet: vital sign rows plus a free-text description.

use super::{PacketIo, PacketKind, WriteContext};
use crate::error::PacketResult;
use crate::time::validate_clock_time;
use epcr_storage::{Statement, Store};
use serde::{Deserialize, Serialize};

/// One set of vital sign measurements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurement {
    /// Clock time of the measurement (`HH:MM`).
    pub time: String,
    /// Heart rate, beats per minute.
    pub pulse: Option<i32>,
    /// Systolic blood pressure, mmHg.
    pub systolic: Option<i32>,
    /// Diastolic blood pressure, mmHg.
    pub diastolic: Option<i32>,
    /// Breaths per minute.
    pub respiratory_rate: Option<i32>,
    /// Oxygen saturation, percent.
    pub spo2: Option<i32>,
    /// Glasgow coma scale, 3..=15.
    pub gcs: Option<i32>,
    /// Body temperature, degrees Celsius.
    pub temperature: Option<f64>,
}

/// Vital sign measurements and the examiner's description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExaminationPacket {
    /// Measurements in the order they were taken.
    pub measurements: Vec<Measurement>,
    /// Free-text findings.
    pub description: Option<String>,
}

impl ExaminationPacket {
    /// Returns true if there is nothing to store.
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty() && self.description.is_none()
    }
}

impl PacketIo for ExaminationPacket {
    fn load(store: &mut dyn Store, record_id: i64) -> PacketResult<Option<Self>> {
        let rows = store.query(
            &Statement::new(
                "SELECT time, pulse, systolic, diastolic, respiratory_rate, spo2, gcs, temperature \
                 FROM examination WHERE record_id = ?1 ORDER BY id",
            )
            .bind(record_id),
        )?;

        let mut measurements = Vec::with_capacity(rows.len());
        for row in &rows {
            measurements.push(Measurement {
                time: row.get_text(0)?,
                pulse: row.get_opt_i32(1)?,
                systolic: row.get_opt_i32(2)?,
                diastolic: row.get_opt_i32(3)?,
                respiratory_rate: row.get_opt_i32(4)?,
                spo2: row.get_opt_i32(5)?,
                gcs: row.get_opt_i32(6)?,
                temperature: row.get_opt_f64(7)?,
            });
        }

        let description = store
            .query(
                &Statement::new(
                    "SELECT description FROM examination_description WHERE record_id = ?1",
                )
                .bind(record_id),
            )?
            .first()
            .map(|row| row.get_text(0))
            .transpose()?;

        let packet = ExaminationPacket {
            measurements,
            description,
        };
        Ok((!packet.is_empty()).then_some(packet))
    }

    fn write(
        &self,
        store: &mut dyn Store,
        record_id: i64,
        _ctx: &WriteContext<'_>,
    ) -> PacketResult<usize> {
        for m in &self.measurements {
            validate_clock_time(PacketKind::Examination, "time", &m.time)?;
        }

        store.update(
            &Statement::new("DELETE FROM examination WHERE record_id = ?1").bind(record_id),
        )?;
        store.update(
            &Statement::new("DELETE FROM examination_description WHERE record_id = ?1")
                .bind(record_id),
        )?;

        let mut written = 0;
        for m in &self.measurements {
            written += store.update(
                &Statement::new(
                    "INSERT INTO examination (record_id, time, pulse, systolic, diastolic, \
                     respiratory_rate, spo2, gcs, temperature) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .bind(record_id)
                .bind(m.time.as_str())
                .bind(m.pulse)
                .bind(m.systolic)
                .bind(m.diastolic)
                .bind(m.respiratory_rate)
                .bind(m.spo2)
                .bind(m.gcs)
                .bind(m.temperature),
            )?;
        }

        if let Some(description) = &self.description {
            written += store.update(
                &Statement::new(
                    "INSERT INTO examination_description (record_id, description) VALUES (?1, ?2)",
                )
                .bind(record_id)
                .bind(description),
            )?;
        }
        Ok(written)
    }
}
