//! Medicine packet: doses, their effects, and who gave them.
//!
//! Effect rows and unregistered-caregiver rows key off the dose row's
//! generated id, which only exists after the dose insert. Writing a dose is
//! therefore two-phase: insert the dose and take the generated key, then
//! insert the dependent rows under that key. Both phases run on the same
//! connection, so the key cannot belong to another writer's dose.

use super::{PacketIo, PacketKind, WriteContext};
use crate::error::{PacketError, PacketResult};
use crate::time::validate_clock_time;
use epcr_storage::{Statement, Store};
use serde::{Deserialize, Serialize};

/// Who administered a dose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Caregiver {
    /// A caregiver present in the staff registry.
    Registered(i64),
    /// Someone outside the registry, identified by name only.
    Unregistered(String),
}

/// An observed effect of a dose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    /// Clock time of the observation (`HH:MM`).
    pub time: String,
    /// What was observed.
    pub description: String,
}

/// One administered dose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dose {
    /// Clock time of administration (`HH:MM`).
    pub time: String,
    /// Medicine name.
    pub medicine: String,
    /// Amount with unit, as entered.
    pub amount: String,
    /// Route of administration.
    pub route: Option<String>,
    /// Who gave the dose, if recorded.
    pub caregiver: Option<Caregiver>,
    /// Observed effects, in order.
    pub effects: Vec<Effect>,
}

/// Medication given during the encounter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MedicinePacket {
    /// Doses in administration order.
    pub doses: Vec<Dose>,
}

impl MedicinePacket {
    fn validate(&self) -> PacketResult<()> {
        for dose in &self.doses {
            validate_clock_time(PacketKind::Medicine, "time", &dose.time)?;
            if dose.medicine.trim().is_empty() {
                return Err(PacketError::validation(
                    PacketKind::Medicine,
                    "medicine",
                    "medicine name is required",
                ));
            }
            if let Some(Caregiver::Unregistered(name)) = &dose.caregiver {
                if name.trim().is_empty() {
                    return Err(PacketError::validation(
                        PacketKind::Medicine,
                        "caregiver",
                        "unregistered caregiver needs a name",
                    ));
                }
            }
            for effect in &dose.effects {
                validate_clock_time(PacketKind::Medicine, "effect time", &effect.time)?;
            }
        }
        Ok(())
    }

    /// Inserts one dose and its dependent rows. Returns rows written.
    fn write_dose(store: &mut dyn Store, record_id: i64, dose: &Dose) -> PacketResult<usize> {
        let registered = match &dose.caregiver {
            Some(Caregiver::Registered(id)) => Some(*id),
            _ => None,
        };

        let dose_id = store.insert(
            &Statement::new(
                "INSERT INTO dose (record_id, time, medicine, amount, route, caregiver_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(record_id)
            .bind(dose.time.as_str())
            .bind(dose.medicine.as_str())
            .bind(dose.amount.as_str())
            .bind(dose.route.as_deref())
            .bind(registered),
        )?;
        let mut written = 1;

        if let Some(Caregiver::Unregistered(name)) = &dose.caregiver {
            written += store.update(
                &Statement::new(
                    "INSERT INTO dose_unregistered_caregiver (dose_id, name) VALUES (?1, ?2)",
                )
                .bind(dose_id)
                .bind(name),
            )?;
        }

        for effect in &dose.effects {
            written += store.update(
                &Statement::new(
                    "INSERT INTO dose_effect (dose_id, time, description) VALUES (?1, ?2, ?3)",
                )
                .bind(dose_id)
                .bind(effect.time.as_str())
                .bind(effect.description.as_str()),
            )?;
        }
        Ok(written)
    }
}

impl PacketIo for MedicinePacket {
    fn load(store: &mut dyn Store, record_id: i64) -> PacketResult<Option<Self>> {
        let rows = store.query(
            &Statement::new(
                "SELECT id, time, medicine, amount, route, caregiver_id \
                 FROM dose WHERE record_id = ?1 ORDER BY id",
            )
            .bind(record_id),
        )?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut doses = Vec::with_capacity(rows.len());
        for row in &rows {
            let dose_id = row.get_i64(0)?;

            let caregiver = match row.get_opt_i64(5)? {
                Some(id) => Some(Caregiver::Registered(id)),
                None => store
                    .query(
                        &Statement::new(
                            "SELECT name FROM dose_unregistered_caregiver WHERE dose_id = ?1",
                        )
                        .bind(dose_id),
                    )?
                    .first()
                    .map(|r| r.get_text(0))
                    .transpose()?
                    .map(Caregiver::Unregistered),
            };

            let effect_rows = store.query(
                &Statement::new(
                    "SELECT time, description FROM dose_effect WHERE dose_id = ?1 ORDER BY id",
                )
                .bind(dose_id),
            )?;
            let mut effects = Vec::with_capacity(effect_rows.len());
            for effect in &effect_rows {
                effects.push(Effect {
                    time: effect.get_text(0)?,
                    description: effect.get_text(1)?,
                });
            }

            doses.push(Dose {
                time: row.get_text(1)?,
                medicine: row.get_text(2)?,
                amount: row.get_text(3)?,
                route: row.get_opt_text(4)?,
                caregiver,
                effects,
            });
        }
        Ok(Some(MedicinePacket { doses }))
    }

    fn write(
        &self,
        store: &mut dyn Store,
        record_id: i64,
        _ctx: &WriteContext<'_>,
    ) -> PacketResult<usize> {
        self.validate()?;

        // Effects and caregiver names cascade with their dose.
        store.update(&Statement::new("DELETE FROM dose WHERE record_id = ?1").bind(record_id))?;

        let mut written = 0;
        for dose in &self.doses {
            written += Self::write_dose(store, record_id, dose)?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::create_record;
    use crate::schema;
    use epcr_storage::SqliteStore;

    fn store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        schema::install(&mut store).unwrap();
        store
    }

    fn dose_with_effects() -> Dose {
        Dose {
            time: "10:05".into(),
            medicine: "Fentanyl".into(),
            amount: "50 ug".into(),
            route: Some("iv".into()),
            caregiver: Some(Caregiver::Registered(7)),
            effects: vec![
                Effect {
                    time: "10:10".into(),
                    description: "pain 8 -> 5".into(),
                },
                Effect {
                    time: "10:20".into(),
                    description: "pain 5 -> 2".into(),
                },
            ],
        }
    }

    fn count(store: &mut SqliteStore, sql: &str) -> i64 {
        store
            .query(&Statement::new(sql))
            .unwrap()
            .first()
            .unwrap()
            .get_i64(0)
            .unwrap()
    }

    #[test]
    fn effects_reference_target_dose_id() {
        let mut source = store();
        let local_id = create_record(&mut source).unwrap();
        let packet = MedicinePacket {
            doses: vec![dose_with_effects()],
        };
        packet.write(&mut source, local_id, &WriteContext::plain()).unwrap();

        // Push the target's dose sequence past the source's.
        let mut target = store();
        let filler = create_record(&mut target).unwrap();
        let mut filler_doses = Vec::new();
        for _ in 0..3 {
            let mut d = dose_with_effects();
            d.effects.clear();
            filler_doses.push(d);
        }
        MedicinePacket { doses: filler_doses }
            .write(&mut target, filler, &WriteContext::plain())
            .unwrap();

        let loaded = MedicinePacket::load(&mut source, local_id).unwrap().unwrap();
        let server_id = create_record(&mut target).unwrap();
        loaded.write(&mut target, server_id, &WriteContext::plain()).unwrap();

        let doses = target
            .query(&Statement::new("SELECT id FROM dose WHERE record_id = ?1").bind(server_id))
            .unwrap();
        assert_eq!(doses.len(), 1);
        let target_dose_id = doses.first().unwrap().get_i64(0).unwrap();

        let source_dose_id = source
            .query(&Statement::new("SELECT id FROM dose WHERE record_id = ?1").bind(local_id))
            .unwrap()
            .first()
            .unwrap()
            .get_i64(0)
            .unwrap();
        assert_ne!(target_dose_id, source_dose_id);

        let effects = target
            .query(
                &Statement::new(
                    "SELECT e.dose_id FROM dose_effect e JOIN dose d ON d.id = e.dose_id \
                     WHERE d.record_id = ?1",
                )
                .bind(server_id),
            )
            .unwrap();
        assert_eq!(effects.len(), 2);
        for row in &effects {
            assert_eq!(row.get_i64(0).unwrap(), target_dose_id);
        }
    }

    #[test]
    fn unregistered_caregiver_round_trip() {
        let mut store = store();
        let id = create_record(&mut store).unwrap();
        let mut dose = dose_with_effects();
        dose.caregiver = Some(Caregiver::Unregistered("Off-duty nurse".into()));
        let packet = MedicinePacket { doses: vec![dose] };

        packet.write(&mut store, id, &WriteContext::plain()).unwrap();
        assert_eq!(MedicinePacket::load(&mut store, id).unwrap(), Some(packet));

        let caregiver_id = store
            .query(&Statement::new("SELECT caregiver_id FROM dose"))
            .unwrap()
            .first()
            .unwrap()
            .get_opt_i64(0)
            .unwrap();
        assert_eq!(caregiver_id, None);
    }

    #[test]
    fn rewrite_replaces_previous_doses() {
        let mut store = store();
        let id = create_record(&mut store).unwrap();
        let packet = MedicinePacket {
            doses: vec![dose_with_effects()],
        };
        packet.write(&mut store, id, &WriteContext::plain()).unwrap();
        packet.write(&mut store, id, &WriteContext::plain()).unwrap();

        assert_eq!(count(&mut store, "SELECT COUNT(*) FROM dose"), 1);
        assert_eq!(count(&mut store, "SELECT COUNT(*) FROM dose_effect"), 2);
    }

    #[test]
    fn empty_caregiver_name_rejected() {
        let mut store = store();
        let id = create_record(&mut store).unwrap();
        let mut dose = dose_with_effects();
        dose.caregiver = Some(Caregiver::Unregistered("  ".into()));
        let err = MedicinePacket { doses: vec![dose] }
            .write(&mut store, id, &WriteContext::plain())
            .unwrap_err();
        assert!(err.is_validation());
    }
}
