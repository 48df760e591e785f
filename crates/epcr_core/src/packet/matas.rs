//! Body diagram packet.

use super::{PacketIo, PacketKind, WriteContext};
use crate::error::{PacketError, PacketResult};
use epcr_storage::{Statement, Store};
use serde::{Deserialize, Serialize};

/// Diagram coordinates are percentages of the figure's width and height.
const COORD_RANGE: std::ops::RangeInclusive<i32> = 0..=100;

/// One mark on the body diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyMark {
    /// Anatomical region code (e.g. `head`, `left-forearm`).
    pub region: String,
    /// Horizontal position on the diagram.
    pub x: i32,
    /// Vertical position on the diagram.
    pub y: i32,
    /// What was found at the mark.
    pub finding: Option<String>,
}

/// Injury and finding locations marked on the body diagram.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatasPacket {
    /// Marks in the order they were placed.
    pub marks: Vec<BodyMark>,
}

impl PacketIo for MatasPacket {
    fn load(store: &mut dyn Store, record_id: i64) -> PacketResult<Option<Self>> {
        let rows = store.query(
            &Statement::new(
                "SELECT region, x, y, finding FROM matas WHERE record_id = ?1 ORDER BY id",
            )
            .bind(record_id),
        )?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut marks = Vec::with_capacity(rows.len());
        for row in &rows {
            marks.push(BodyMark {
                region: row.get_text(0)?,
                x: row.get_i32(1)?,
                y: row.get_i32(2)?,
                finding: row.get_opt_text(3)?,
            });
        }
        Ok(Some(MatasPacket { marks }))
    }

    fn write(
        &self,
        store: &mut dyn Store,
        record_id: i64,
        _ctx: &WriteContext<'_>,
    ) -> PacketResult<usize> {
        for mark in &self.marks {
            if !COORD_RANGE.contains(&mark.x) || !COORD_RANGE.contains(&mark.y) {
                return Err(PacketError::validation(
                    PacketKind::Matas,
                    "position",
                    format!("({}, {}) is outside the diagram", mark.x, mark.y),
                ));
            }
        }

        store.update(&Statement::new("DELETE FROM matas WHERE record_id = ?1").bind(record_id))?;
        let mut written = 0;
        for mark in &self.marks {
            written += store.update(
                &Statement::new(
                    "INSERT INTO matas (record_id, region, x, y, finding) VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .bind(record_id)
                .bind(mark.region.as_str())
                .bind(mark.x)
                .bind(mark.y)
                .bind(mark.finding.as_deref()),
            )?;
        }
        Ok(written)
    }
}
