//! Clinical packets.
//!
//! [`Packet`] is a closed sum over the six clinical areas. Each variant's
//! struct knows how to load itself from a store by record id and how to
//! write itself to a store under a record id; [`Packet`] dispatches to them.

mod action;
mod examination;
mod matas;
mod medicine;
mod patient;
mod statistics;

pub use action::{ActionPacket, CareAction};
pub use examination::{ExaminationPacket, Measurement};
pub use matas::{BodyMark, MatasPacket};
pub use medicine::{Caregiver, Dose, Effect, MedicinePacket};
pub use patient::PatientPacket;
pub use statistics::{StatisticsPacket, Urgency};

use crate::error::PacketResult;
use crate::identity::IdentityLookup;
use epcr_storage::Store;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The clinical area a packet covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PacketKind {
    /// Patient identity and demographics.
    Patient,
    /// Vital sign measurements and free-text findings.
    Examination,
    /// Administered doses and their observed effects.
    Medicine,
    /// Injury locations marked on the body diagram.
    Matas,
    /// Mission statistics (dispatch, timestamps, destination).
    Statistics,
    /// Treatment actions performed.
    Action,
}

impl PacketKind {
    /// Every kind, in load order.
    pub const ALL: [PacketKind; 6] = [
        PacketKind::Patient,
        PacketKind::Examination,
        PacketKind::Medicine,
        PacketKind::Matas,
        PacketKind::Statistics,
        PacketKind::Action,
    ];

    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketKind::Patient => "patient",
            PacketKind::Examination => "examination",
            PacketKind::Medicine => "medicine",
            PacketKind::Matas => "matas",
            PacketKind::Statistics => "statistics",
            PacketKind::Action => "action",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators available while writing packets.
#[derive(Clone, Copy, Default)]
pub struct WriteContext<'a> {
    /// Identity registry for patient enrichment. `None` disables enrichment.
    pub lookup: Option<&'a dyn IdentityLookup>,
}

impl<'a> WriteContext<'a> {
    /// A context without collaborators.
    pub fn plain() -> Self {
        Self::default()
    }

    /// A context that enriches patients from `lookup`.
    pub fn with_lookup(lookup: &'a dyn IdentityLookup) -> Self {
        Self {
            lookup: Some(lookup),
        }
    }
}

impl fmt::Debug for WriteContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteContext")
            .field("lookup", &self.lookup.is_some())
            .finish()
    }
}

/// Load/write capability implemented by every packet struct.
pub(crate) trait PacketIo: Sized {
    /// Loads the packet for `record_id`; `None` when the store has no rows.
    fn load(store: &mut dyn Store, record_id: i64) -> PacketResult<Option<Self>>;

    /// Replaces the packet's rows for `record_id`. Returns rows written.
    fn write(
        &self,
        store: &mut dyn Store,
        record_id: i64,
        ctx: &WriteContext<'_>,
    ) -> PacketResult<usize>;
}

/// One clinical packet of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// Patient packet.
    Patient(PatientPacket),
    /// Examination packet.
    Examination(ExaminationPacket),
    /// Medicine packet.
    Medicine(MedicinePacket),
    /// Body diagram packet.
    Matas(MatasPacket),
    /// Statistics packet.
    Statistics(StatisticsPacket),
    /// Action packet.
    Action(ActionPacket),
}

impl Packet {
    /// Returns the packet's clinical area.
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Patient(_) => PacketKind::Patient,
            Packet::Examination(_) => PacketKind::Examination,
            Packet::Medicine(_) => PacketKind::Medicine,
            Packet::Matas(_) => PacketKind::Matas,
            Packet::Statistics(_) => PacketKind::Statistics,
            Packet::Action(_) => PacketKind::Action,
        }
    }

    /// Loads the `kind` packet of `record_id`. Absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or holds unreadable values.
    pub fn load(kind: PacketKind, store: &mut dyn Store, record_id: i64) -> PacketResult<Option<Packet>> {
        Ok(match kind {
            PacketKind::Patient => PatientPacket::load(store, record_id)?.map(Packet::Patient),
            PacketKind::Examination => {
                ExaminationPacket::load(store, record_id)?.map(Packet::Examination)
            }
            PacketKind::Medicine => MedicinePacket::load(store, record_id)?.map(Packet::Medicine),
            PacketKind::Matas => MatasPacket::load(store, record_id)?.map(Packet::Matas),
            PacketKind::Statistics => {
                StatisticsPacket::load(store, record_id)?.map(Packet::Statistics)
            }
            PacketKind::Action => ActionPacket::load(store, record_id)?.map(Packet::Action),
        })
    }

    /// Writes the packet under `record_id`, replacing existing rows.
    ///
    /// Multi-statement variants should run inside a transaction held by the
    /// caller so that a failure leaves no partial packet behind.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields, or a store error.
    pub fn write(
        &self,
        store: &mut dyn Store,
        record_id: i64,
        ctx: &WriteContext<'_>,
    ) -> PacketResult<usize> {
        match self {
            Packet::Patient(p) => p.write(store, record_id, ctx),
            Packet::Examination(p) => p.write(store, record_id, ctx),
            Packet::Medicine(p) => p.write(store, record_id, ctx),
            Packet::Matas(p) => p.write(store, record_id, ctx),
            Packet::Statistics(p) => p.write(store, record_id, ctx),
            Packet::Action(p) => p.write(store, record_id, ctx),
        }
    }
}
