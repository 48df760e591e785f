//! Treatment action packet.

use super::{PacketIo, PacketKind, WriteContext};
use crate::error::{PacketError, PacketResult};
use crate::time::validate_clock_time;
use epcr_storage::{Statement, Store};
use serde::{Deserialize, Serialize};

/// One treatment action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareAction {
    /// Clock time (`HH:MM`).
    pub time: String,
    /// Procedure code.
    pub code: String,
    /// Free-text detail.
    pub description: Option<String>,
}

/// Treatment actions performed during the encounter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionPacket {
    /// Actions in the order performed.
    pub actions: Vec<CareAction>,
}

impl PacketIo for ActionPacket {
    fn load(store: &mut dyn Store, record_id: i64) -> PacketResult<Option<Self>> {
        let rows = store.query(
            &Statement::new(
                "SELECT time, code, description FROM action WHERE record_id = ?1 ORDER BY id",
            )
            .bind(record_id),
        )?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut actions = Vec::with_capacity(rows.len());
        for row in &rows {
            actions.push(CareAction {
                time: row.get_text(0)?,
                code: row.get_text(1)?,
                description: row.get_opt_text(2)?,
            });
        }
        Ok(Some(ActionPacket { actions }))
    }

    fn write(
        &self,
        store: &mut dyn Store,
        record_id: i64,
        _ctx: &WriteContext<'_>,
    ) -> PacketResult<usize> {
        for action in &self.actions {
            validate_clock_time(PacketKind::Action, "time", &action.time)?;
            if action.code.trim().is_empty() {
                return Err(PacketError::validation(
                    PacketKind::Action,
                    "code",
                    "procedure code is required",
                ));
            }
        }

        store.update(&Statement::new("DELETE FROM action WHERE record_id = ?1").bind(record_id))?;
        let mut written = 0;
        for action in &self.actions {
            written += store.update(
                &Statement::new(
                    "INSERT INTO action (record_id, time, code, description) VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(record_id)
                .bind(action.time.as_str())
                .bind(action.code.as_str())
                .bind(action.description.as_deref()),
            )?;
        }
        Ok(written)
    }
}
