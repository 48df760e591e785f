//! # EPCR Core
//!
//! The patient care record model shared by the field unit and the center.
//!
//! A [`LocalRecord`] is one prehospital encounter. Its clinical content is
//! split into [`Packet`]s, one per clinical area:
//!
//! | Packet | Tables |
//! |---|---|
//! | Patient | `patient` |
//! | Examination | `examination`, `examination_description` |
//! | Medicine | `dose`, `dose_effect`, `dose_unregistered_caregiver` |
//! | Matas | `matas` |
//! | Statistics | `statistics` |
//! | Action | `action` |
//!
//! Every packet can be loaded from a store by record id and written to a
//! store under another record id. The field unit loads by its local id; the
//! center writes by the id it assigned. All text goes through bound
//! parameters.
//!
//! ## Key Invariants
//!
//! - A packet belongs to exactly one record
//! - A packet with no rows is absent, not an error
//! - Writing a packet replaces whatever that record already had for it

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod identity;
pub mod packet;
mod record;
pub mod schema;
mod time;

pub use error::{PacketError, PacketResult};
pub use identity::{
    is_well_formed_personal_id, IdentityLookup, IdentityRecord, MapLookup, PERSONAL_ID_LEN,
};
pub use packet::{
    ActionPacket, BodyMark, CareAction, Caregiver, Dose, Effect, ExaminationPacket, MatasPacket,
    Measurement, MedicinePacket, Packet, PacketKind, PatientPacket, StatisticsPacket, Urgency,
    WriteContext,
};
pub use record::{
    create_record, insert_received_record, mark_completed, mark_transferred, pending_records,
    server_id_of, LocalRecord,
};
pub use time::validate_clock_time;
