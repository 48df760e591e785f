//! Patient identity packet.

use super::{PacketIo, PacketKind, WriteContext};
use crate::error::PacketResult;
use crate::identity::{is_well_formed_personal_id, IdentityRecord};
use epcr_storage::{Statement, Store};
use serde::{Deserialize, Serialize};

/// Patient identity and demographics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatientPacket {
    /// Personal identity code, if known.
    pub personal_id: Option<String>,
    /// Given names.
    pub first_names: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Street address.
    pub street_address: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Municipality of residence.
    pub municipality: Option<String>,
    /// Set when the identity could not be confirmed against the registry.
    pub incomplete: bool,
}

impl PatientPacket {
    /// Returns the packet as it should be written, after registry enrichment.
    ///
    /// Enrichment only happens when a lookup is configured and the personal
    /// id is well-formed. A hit replaces the derived demographic fields and
    /// clears `incomplete`; a miss keeps the local fields and sets it.
    pub fn enriched(&self, ctx: &WriteContext<'_>) -> PatientPacket {
        let (Some(lookup), Some(personal_id)) = (ctx.lookup, self.personal_id.as_deref()) else {
            return self.clone();
        };
        if !is_well_formed_personal_id(personal_id) {
            return self.clone();
        }

        match lookup.lookup(personal_id) {
            Some(identity) => self.merged_with(identity),
            None => {
                tracing::debug!("personal id not found in registry, writing local fields");
                PatientPacket {
                    incomplete: true,
                    ..self.clone()
                }
            }
        }
    }

    fn merged_with(&self, identity: IdentityRecord) -> PatientPacket {
        PatientPacket {
            personal_id: self.personal_id.clone(),
            first_names: identity.first_names.or_else(|| self.first_names.clone()),
            last_name: identity.last_name.or_else(|| self.last_name.clone()),
            street_address: identity.street_address.or_else(|| self.street_address.clone()),
            postal_code: identity.postal_code.or_else(|| self.postal_code.clone()),
            municipality: identity.municipality.or_else(|| self.municipality.clone()),
            incomplete: false,
        }
    }
}

impl PacketIo for PatientPacket {
    fn load(store: &mut dyn Store, record_id: i64) -> PacketResult<Option<Self>> {
        let rows = store.query(
            &Statement::new(
                "SELECT personal_id, first_names, last_name, street_address, postal_code, \
                 municipality, incomplete FROM patient WHERE record_id = ?1",
            )
            .bind(record_id),
        )?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        Ok(Some(PatientPacket {
            personal_id: row.get_opt_text(0)?,
            first_names: row.get_opt_text(1)?,
            last_name: row.get_opt_text(2)?,
            street_address: row.get_opt_text(3)?,
            postal_code: row.get_opt_text(4)?,
            municipality: row.get_opt_text(5)?,
            incomplete: row.get_bool(6)?,
        }))
    }

    fn write(
        &self,
        store: &mut dyn Store,
        record_id: i64,
        ctx: &WriteContext<'_>,
    ) -> PacketResult<usize> {
        let patient = self.enriched(ctx);
        store.update(&Statement::new("DELETE FROM patient WHERE record_id = ?1").bind(record_id))?;
        let written = store.update(
            &Statement::new(
                "INSERT INTO patient (record_id, personal_id, first_names, last_name, \
                 street_address, postal_code, municipality, incomplete) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(record_id)
            .bind(patient.personal_id.as_deref())
            .bind(patient.first_names.as_deref())
            .bind(patient.last_name.as_deref())
            .bind(patient.street_address.as_deref())
            .bind(patient.postal_code.as_deref())
            .bind(patient.municipality.as_deref())
            .bind(patient.incomplete),
        )?;
        tracing::trace!(record_id, kind = %PacketKind::Patient, "packet written");
        Ok(written)
    }
}
