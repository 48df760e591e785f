//! Property-based test generators using proptest.
//!
//! Every strategy produces packets that the store accepts and that load
//! back non-empty, so a write followed by a load must reproduce them.

use epcr_core::{
    ActionPacket, BodyMark, CareAction, Caregiver, Dose, Effect, ExaminationPacket, MatasPacket,
    Measurement, MedicinePacket, Packet, PatientPacket, StatisticsPacket, Urgency,
};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;

/// Strategy for `HH:MM` clock times.
pub fn clock_time_strategy() -> impl Strategy<Value = String> {
    (0u32..24, 0u32..60).prop_map(|(h, m)| format!("{h:02}:{m:02}"))
}

/// Strategy for free text, including quotes and SQL metacharacters.
pub fn free_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[A-Za-zÅÄÖåäö0-9 ,.'\";()%-]{0,40}").expect("Invalid regex"),
        Just("Robert'); DROP TABLE records;--".to_string()),
    ]
}

/// Strategy for text that must not be blank.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 '-]{0,20}").expect("Invalid regex")
}

/// Strategy for patient packets.
pub fn patient_strategy() -> impl Strategy<Value = PatientPacket> {
    (
        option::of(prop::string::string_regex("[0-9]{6}[-+A][0-9]{3}[0-9A-Y]").expect("Invalid regex")),
        option::of(free_text_strategy()),
        option::of(free_text_strategy()),
        option::of(free_text_strategy()),
        option::of(prop::string::string_regex("[0-9]{5}").expect("Invalid regex")),
        option::of(free_text_strategy()),
        any::<bool>(),
    )
        .prop_map(
            |(personal_id, first_names, last_name, street_address, postal_code, municipality, incomplete)| {
                PatientPacket {
                    personal_id,
                    first_names,
                    last_name,
                    street_address,
                    postal_code,
                    municipality,
                    incomplete,
                }
            },
        )
}

fn measurement_strategy() -> impl Strategy<Value = Measurement> {
    (
        clock_time_strategy(),
        option::of(20i32..250),
        option::of(50i32..260),
        option::of(20i32..160),
        option::of(4i32..60),
        option::of(50i32..=100),
        option::of(3i32..=15),
        option::of((300i32..=440).prop_map(|tenths| f64::from(tenths) / 10.0)),
    )
        .prop_map(
            |(time, pulse, systolic, diastolic, respiratory_rate, spo2, gcs, temperature)| {
                Measurement {
                    time,
                    pulse,
                    systolic,
                    diastolic,
                    respiratory_rate,
                    spo2,
                    gcs,
                    temperature,
                }
            },
        )
}

/// Strategy for non-empty examination packets.
pub fn examination_strategy() -> impl Strategy<Value = ExaminationPacket> {
    (vec(measurement_strategy(), 0..4), option::of(free_text_strategy()))
        .prop_map(|(measurements, description)| ExaminationPacket {
            measurements,
            description,
        })
        .prop_filter("examination must not be empty", |p| !p.is_empty())
}

fn caregiver_strategy() -> impl Strategy<Value = Caregiver> {
    prop_oneof![
        (1i64..10_000).prop_map(Caregiver::Registered),
        name_strategy().prop_map(Caregiver::Unregistered),
    ]
}

fn dose_strategy() -> impl Strategy<Value = Dose> {
    (
        clock_time_strategy(),
        name_strategy(),
        free_text_strategy(),
        option::of(prop_oneof![Just("IV".to_string()), Just("PO".to_string()), Just("IM".to_string())]),
        option::of(caregiver_strategy()),
        vec(
            (clock_time_strategy(), free_text_strategy())
                .prop_map(|(time, description)| Effect { time, description }),
            0..3,
        ),
    )
        .prop_map(|(time, medicine, amount, route, caregiver, effects)| Dose {
            time,
            medicine,
            amount,
            route,
            caregiver,
            effects,
        })
}

/// Strategy for non-empty medicine packets.
pub fn medicine_strategy() -> impl Strategy<Value = MedicinePacket> {
    vec(dose_strategy(), 1..4).prop_map(|doses| MedicinePacket { doses })
}

/// Strategy for non-empty body diagram packets.
pub fn matas_strategy() -> impl Strategy<Value = MatasPacket> {
    vec(
        (name_strategy(), 0i32..=100, 0i32..=100, option::of(free_text_strategy())).prop_map(
            |(region, x, y, finding)| BodyMark {
                region,
                x,
                y,
                finding,
            },
        ),
        1..5,
    )
    .prop_map(|marks| MatasPacket { marks })
}

fn urgency_strategy() -> impl Strategy<Value = Urgency> {
    prop_oneof![
        Just(Urgency::A),
        Just(Urgency::B),
        Just(Urgency::C),
        Just(Urgency::D)
    ]
}

/// Strategy for statistics packets.
pub fn statistics_strategy() -> impl Strategy<Value = StatisticsPacket> {
    (
        option::of(prop::string::string_regex("[0-9]{3}[A-D]?").expect("Invalid regex")),
        option::of(urgency_strategy()),
        option::of(clock_time_strategy()),
        option::of(clock_time_strategy()),
        option::of(clock_time_strategy()),
        option::of(free_text_strategy()),
        option::of(0i32..500),
    )
        .prop_map(
            |(dispatch_code, urgency, alarm_time, arrival_time, departure_time, destination, distance_km)| {
                StatisticsPacket {
                    dispatch_code,
                    urgency,
                    alarm_time,
                    arrival_time,
                    departure_time,
                    destination,
                    distance_km,
                }
            },
        )
}

/// Strategy for non-empty action packets.
pub fn action_strategy() -> impl Strategy<Value = ActionPacket> {
    vec(
        (
            clock_time_strategy(),
            prop::string::string_regex("[A-Z]{2,6}").expect("Invalid regex"),
            option::of(free_text_strategy()),
        )
            .prop_map(|(time, code, description)| CareAction {
                time,
                code,
                description,
            }),
        1..5,
    )
    .prop_map(|actions| ActionPacket { actions })
}

/// Strategy for a packet of any variant.
pub fn packet_strategy() -> impl Strategy<Value = Packet> {
    prop_oneof![
        patient_strategy().prop_map(Packet::Patient),
        examination_strategy().prop_map(Packet::Examination),
        medicine_strategy().prop_map(Packet::Medicine),
        matas_strategy().prop_map(Packet::Matas),
        statistics_strategy().prop_map(Packet::Statistics),
        action_strategy().prop_map(Packet::Action),
    ]
}

/// Strategy for a record's packets: at most one per variant, in load order.
pub fn record_packets_strategy() -> impl Strategy<Value = Vec<Packet>> {
    (
        option::of(patient_strategy()),
        option::of(examination_strategy()),
        option::of(medicine_strategy()),
        option::of(matas_strategy()),
        option::of(statistics_strategy()),
        option::of(action_strategy()),
    )
        .prop_map(|(patient, examination, medicine, matas, statistics, action)| {
            let mut packets = Vec::new();
            packets.extend(patient.map(Packet::Patient));
            packets.extend(examination.map(Packet::Examination));
            packets.extend(medicine.map(Packet::Medicine));
            packets.extend(matas.map(Packet::Matas));
            packets.extend(statistics.map(Packet::Statistics));
            packets.extend(action.map(Packet::Action));
            packets
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcr_core::validate_clock_time;
    use epcr_core::PacketKind;

    proptest! {
        #[test]
        fn generated_times_are_valid(time in clock_time_strategy()) {
            prop_assert!(validate_clock_time(PacketKind::Action, "time", &time).is_ok());
        }

        #[test]
        fn record_packets_are_in_load_order(packets in record_packets_strategy()) {
            let kinds: Vec<PacketKind> = packets.iter().map(Packet::kind).collect();
            let mut sorted = kinds.clone();
            sorted.sort();
            prop_assert_eq!(kinds, sorted);
        }
    }
}
