//! Chart aggregation and current-reading snapshots.
//!
//! Pure functions over measurement slices; the caller does the windowed
//! database selection and passes rows ordered by timestamp ascending.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use common::req::{
    ChartData, FootSeries, TimelineSeries, VitalsReading, VitalsSeries, VitalsStatus, VptReading,
    VptSnapshot, VptStatus, VitalsSnapshot,
};

use crate::models::Measurement;
use crate::points::{parse_point_name, Foot, MeasurementPoint, ParsedPoint, PointSlot};
use crate::utils::datetime_from_ms;

const HOUR_LABEL_FORMAT: &str = "%m/%d %H:%M";
const DAY_LABEL_FORMAT: &str = "%m/%d";
const SNAPSHOT_TIME_FORMAT: &str = "%I:%M %p";

const TEMPERATURE_NORMAL_C: (f64, f64) = (36.0, 37.5);
const SPO2_NORMAL_PCT: (i32, i32) = (95, 100);

struct Bucket {
    first_seen: i64,
    vpt: HashMap<MeasurementPoint, f64>,
    temperature: Vec<f64>,
    spo2: Vec<f64>,
}

/// Bucket measurements by time label and foot location into the three
/// chart groups. Label granularity is one global decision per call: any
/// activity in the last 24 hours switches the whole chart to
/// minute-resolution labels.
pub fn aggregate(measurements: &[Measurement], now: DateTime<Utc>) -> ChartData {
    let format = label_format(measurements, now);

    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Bucket> = HashMap::new();

    for m in measurements {
        let point = match parse_point_name(&m.point_name) {
            ParsedPoint::Known(point) => point,
            ParsedPoint::Unrecognized(name) => {
                log::debug!("skipping unrecognized point name {name:?}");
                continue;
            }
        };

        let label = datetime_from_ms(m.timestamp).format(format).to_string();
        let bucket = buckets.entry(label.clone()).or_insert_with(|| {
            order.push(label.clone());
            Bucket {
                first_seen: m.timestamp,
                vpt: HashMap::new(),
                temperature: Vec::new(),
                spo2: Vec::new(),
            }
        });

        // latest VPT wins within a bucket; vitals are averaged
        if let Some(v) = m.vpt_voltage {
            bucket.vpt.insert(point, v);
        }
        if let Some(t) = m.temperature {
            bucket.temperature.push(t);
        }
        if let Some(s) = m.spo2 {
            bucket.spo2.push(s as f64);
        }
    }

    // order by the timestamp that established each bucket, not by label
    // string (labels misorder across month and midnight boundaries)
    order.sort_by_key(|label| buckets[label].first_seen);

    let mut chart = ChartData::default();
    for label in &order {
        let bucket = &buckets[label];
        chart.right_foot.labels.push(label.clone());
        chart.left_foot.labels.push(label.clone());
        chart.vitals.labels.push(label.clone());

        for slot in PointSlot::ALL {
            let right = bucket.vpt.get(&MeasurementPoint { foot: Foot::Right, slot }).copied();
            let left = bucket.vpt.get(&MeasurementPoint { foot: Foot::Left, slot }).copied();
            push_slot(&mut chart.right_foot, slot, right);
            push_slot(&mut chart.left_foot, slot, left);
        }

        chart.vitals.temperature.push(mean(&bucket.temperature));
        chart.vitals.spo2.push(mean(&bucket.spo2));
    }

    chart
}

fn label_format(measurements: &[Measurement], now: DateTime<Utc>) -> &'static str {
    match measurements.iter().map(|m| m.timestamp).max() {
        Some(latest) if now.timestamp_millis() - latest < 24 * 3600 * 1000 => HOUR_LABEL_FORMAT,
        _ => DAY_LABEL_FORMAT,
    }
}

fn push_slot(series: &mut FootSeries, slot: PointSlot, value: Option<f64>) {
    match slot {
        PointSlot::Heel => series.heel.push(value),
        PointSlot::Instep => series.instep.push(value),
        PointSlot::FifthMt => series.fifth_mt.push(value),
        PointSlot::ThirdMt => series.third_mt.push(value),
        PointSlot::FirstMt => series.first_mt.push(value),
        PointSlot::BigToe => series.big_toe.push(value),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// VPT status against the slot's threshold; both boundaries inclusive.
pub fn classify_vpt(value: f64, slot: PointSlot) -> VptStatus {
    let threshold = slot.vpt_threshold();
    if value <= threshold {
        VptStatus::Normal
    } else if value <= threshold * 1.5 {
        VptStatus::Elevated
    } else {
        VptStatus::High
    }
}

pub fn classify_vitals(temperature: f64, spo2: i32) -> VitalsStatus {
    let temp_normal =
        (TEMPERATURE_NORMAL_C.0..=TEMPERATURE_NORMAL_C.1).contains(&temperature);
    let spo2_normal = (SPO2_NORMAL_PCT.0..=SPO2_NORMAL_PCT.1).contains(&spo2);
    match (temp_normal, spo2_normal) {
        (true, true) => VitalsStatus::Normal,
        (false, true) => VitalsStatus::TempAbnormal,
        (true, false) => VitalsStatus::Spo2Abnormal,
        (false, false) => VitalsStatus::BothAbnormal,
    }
}

/// Latest non-null VPT per canonical point, classified. Points without
/// data report a zeroed "No Data" entry so the dashboard grid is always
/// fully populated.
pub fn current_vpt_readings(measurements: &[Measurement]) -> VptSnapshot {
    let mut latest: HashMap<MeasurementPoint, (f64, i64)> = HashMap::new();
    for m in measurements {
        if let (Some(point), Some(v)) = (parse_point_name(&m.point_name).known(), m.vpt_voltage) {
            latest.insert(point, (v, m.timestamp));
        }
    }

    let mut snapshot = VptSnapshot::default();
    for foot in Foot::BOTH {
        for slot in PointSlot::ALL {
            let reading = match latest.get(&MeasurementPoint { foot, slot }) {
                Some((value, timestamp)) => VptReading {
                    value: *value,
                    status: classify_vpt(*value, slot),
                    time: snapshot_time(*timestamp),
                },
                None => VptReading {
                    value: 0.0,
                    status: VptStatus::NoData,
                    time: "--".to_owned(),
                },
            };
            side_mut(&mut snapshot.right, &mut snapshot.left, foot)
                .insert(slot.snapshot_key().to_owned(), reading);
        }
    }
    snapshot
}

/// Latest reading carrying both temperature and SpO₂ per canonical point.
pub fn current_vitals_readings(measurements: &[Measurement]) -> VitalsSnapshot {
    let mut latest: HashMap<MeasurementPoint, (f64, i32, i64)> = HashMap::new();
    for m in measurements {
        if let (Some(point), Some(t), Some(s)) =
            (parse_point_name(&m.point_name).known(), m.temperature, m.spo2)
        {
            latest.insert(point, (t, s, m.timestamp));
        }
    }

    let mut snapshot = VitalsSnapshot::default();
    for foot in Foot::BOTH {
        for slot in PointSlot::ALL {
            let reading = match latest.get(&MeasurementPoint { foot, slot }) {
                Some((temperature, spo2, timestamp)) => VitalsReading {
                    temperature: *temperature,
                    spo2: *spo2,
                    status: classify_vitals(*temperature, *spo2),
                    time: snapshot_time(*timestamp),
                },
                None => VitalsReading {
                    temperature: 0.0,
                    spo2: 0,
                    status: VitalsStatus::NoData,
                    time: "--".to_owned(),
                },
            };
            side_mut(&mut snapshot.right, &mut snapshot.left, foot)
                .insert(slot.snapshot_key().to_owned(), reading);
        }
    }
    snapshot
}

fn side_mut<'a, T>(
    right: &'a mut BTreeMap<String, T>,
    left: &'a mut BTreeMap<String, T>,
    foot: Foot,
) -> &'a mut BTreeMap<String, T> {
    match foot {
        Foot::Right => right,
        Foot::Left => left,
    }
}

fn snapshot_time(timestamp: i64) -> String {
    datetime_from_ms(timestamp).format(SNAPSHOT_TIME_FORMAT).to_string()
}

/// Raw per-point timeline: parallel minute-labelled vectors per point
/// name, nulls preserved. Unlike the chart groups this keys on the
/// stored point string, so even unrecognized names are inspectable.
pub fn measurement_timeline(
    measurements: &[Measurement],
    point_name: Option<&str>,
) -> BTreeMap<String, TimelineSeries> {
    let mut timeline: BTreeMap<String, TimelineSeries> = BTreeMap::new();
    for m in measurements {
        if let Some(filter) = point_name {
            if m.point_name != filter {
                continue;
            }
        }
        let series = timeline.entry(m.point_name.clone()).or_default();
        series
            .timestamps
            .push(datetime_from_ms(m.timestamp).format(HOUR_LABEL_FORMAT).to_string());
        series.vpt_values.push(m.vpt_voltage);
        series.temp_values.push(m.temperature);
        series.spo2_values.push(m.spo2);
    }
    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meas(
        point_name: &str,
        timestamp: i64,
        vpt: Option<f64>,
        temp: Option<f64>,
        spo2: Option<i32>,
    ) -> Measurement {
        Measurement {
            id: 0,
            session_id: 1,
            point_name: point_name.to_owned(),
            vpt_voltage: vpt,
            temperature: temp,
            spo2,
            timestamp,
            notes: None,
            is_valid: true,
            retry_count: 0,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_daily_labels_for_old_data() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let ms = vec![
            meas("Right Heel", at(2025, 3, 7, 9, 30), Some(4.0), None, None),
            meas("Right Heel", at(2025, 3, 8, 10, 15), Some(5.0), None, None),
        ];
        let chart = aggregate(&ms, now);
        assert_eq!(chart.right_foot.labels, vec!["03/07", "03/08"]);
        assert_eq!(chart.right_foot.heel, vec![Some(4.0), Some(5.0)]);
        assert_eq!(chart.left_foot.heel, vec![None, None]);
    }

    #[test]
    fn test_minute_labels_when_recent() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let ms = vec![
            meas("Right Heel", at(2025, 3, 9, 9, 30), Some(4.0), None, None),
            meas("Right Heel", at(2025, 3, 10, 11, 45), Some(5.0), None, None),
        ];
        let chart = aggregate(&ms, now);
        // one recent measurement widens resolution for the whole chart
        assert_eq!(chart.right_foot.labels, vec!["03/09 09:30", "03/10 11:45"]);
    }

    #[test]
    fn test_vpt_last_write_wins_in_bucket() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let ms = vec![
            meas("Right Heel", at(2025, 3, 7, 9, 0), Some(4.0), None, None),
            meas("Right Heel", at(2025, 3, 7, 15, 0), Some(6.5), None, None),
        ];
        let chart = aggregate(&ms, now);
        assert_eq!(chart.right_foot.labels, vec!["03/07"]);
        assert_eq!(chart.right_foot.heel, vec![Some(6.5)]);
    }

    #[test]
    fn test_vitals_averaged_and_null_when_absent() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let ms = vec![
            meas("Right Heel", at(2025, 3, 7, 9, 0), None, Some(30.0), Some(96)),
            meas("Left Heel", at(2025, 3, 7, 10, 0), None, Some(32.0), Some(98)),
            meas("Right Big Toe", at(2025, 3, 8, 9, 0), Some(4.0), None, None),
        ];
        let chart = aggregate(&ms, now);
        assert_eq!(chart.vitals.labels, vec!["03/07", "03/08"]);
        assert_eq!(chart.vitals.temperature, vec![Some(31.0), None]);
        assert_eq!(chart.vitals.spo2, vec![Some(97.0), None]);
    }

    #[test]
    fn test_unrecognized_points_are_skipped_everywhere() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let ms = vec![
            meas("Forehead", at(2025, 3, 7, 9, 0), Some(4.0), Some(36.5), Some(97)),
            meas("Right Heel", at(2025, 3, 8, 9, 0), Some(5.0), None, None),
        ];
        let chart = aggregate(&ms, now);
        assert_eq!(chart.right_foot.labels, vec!["03/08"]);
        assert_eq!(chart.vitals.temperature, vec![None]);
        assert_eq!(chart.vitals.spo2, vec![None]);

        let only_bad = vec![meas("Forehead", at(2025, 3, 7, 9, 0), Some(4.0), None, None)];
        assert_eq!(aggregate(&only_bad, now), ChartData::default());
    }

    #[test]
    fn test_buckets_ordered_by_timestamp_not_label() {
        let now = Utc.with_ymd_and_hms(2025, 1, 3, 12, 0, 0).unwrap();
        let ms = vec![
            meas("Right Heel", at(2024, 12, 31, 9, 0), Some(4.0), None, None),
            meas("Right Heel", at(2025, 1, 1, 9, 0), Some(5.0), None, None),
        ];
        let chart = aggregate(&ms, now);
        // lexical order would flip these across the year boundary
        assert_eq!(chart.right_foot.labels, vec!["12/31", "01/01"]);
        assert_eq!(chart.right_foot.heel, vec![Some(4.0), Some(5.0)]);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let ms = vec![
            meas("Right Heel", at(2025, 3, 7, 9, 0), Some(4.0), Some(31.0), Some(97)),
            meas("Left 5th MT", at(2025, 3, 8, 9, 0), Some(11.0), None, None),
        ];
        assert_eq!(aggregate(&ms, now), aggregate(&ms, now));
    }

    #[test]
    fn test_group_vectors_stay_parallel() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let ms = vec![
            meas("Right Heel", at(2025, 3, 6, 9, 0), Some(4.0), Some(31.0), None),
            meas("Left Big Toe", at(2025, 3, 7, 9, 0), None, None, Some(96)),
            meas("Right 1st MT", at(2025, 3, 8, 9, 0), Some(9.0), None, None),
        ];
        let chart = aggregate(&ms, now);
        let n = chart.right_foot.labels.len();
        assert_eq!(n, 3);
        for series in [
            &chart.right_foot.heel,
            &chart.right_foot.big_toe,
            &chart.left_foot.first_mt,
            &chart.left_foot.big_toe,
        ] {
            assert_eq!(series.len(), n);
        }
        assert_eq!(chart.vitals.temperature.len(), n);
        assert_eq!(chart.vitals.spo2.len(), n);
    }

    #[test]
    fn test_vpt_classification_boundaries() {
        assert_eq!(classify_vpt(10.0, PointSlot::FifthMt), VptStatus::Normal);
        assert_eq!(classify_vpt(15.0, PointSlot::FifthMt), VptStatus::Elevated);
        assert_eq!(classify_vpt(15.01, PointSlot::FifthMt), VptStatus::High);
        assert_eq!(classify_vpt(5.0, PointSlot::Heel), VptStatus::Normal);
        assert_eq!(classify_vpt(7.5, PointSlot::Heel), VptStatus::Elevated);
        assert_eq!(classify_vpt(7.51, PointSlot::Heel), VptStatus::High);
    }

    #[test]
    fn test_vpt_snapshot_latest_wins() {
        let ms = vec![
            meas("Right 5th MT", at(2025, 3, 7, 9, 0), Some(10.0), None, None),
            meas("Right 5th MT", at(2025, 3, 8, 14, 30), Some(15.0), None, None),
        ];
        let snapshot = current_vpt_readings(&ms);
        let reading = &snapshot.right["5th_mt"];
        assert_eq!(reading.value, 15.0);
        assert_eq!(reading.status, VptStatus::Elevated);
        assert_eq!(reading.time, "02:30 PM");

        let empty = &snapshot.left["heel"];
        assert_eq!(empty.status, VptStatus::NoData);
        assert_eq!(empty.value, 0.0);
        assert_eq!(empty.time, "--");
        assert_eq!(snapshot.right.len(), 6);
        assert_eq!(snapshot.left.len(), 6);
    }

    #[test]
    fn test_vitals_snapshot_requires_both_readings() {
        let ms = vec![
            // temperature only, must not qualify
            meas("Right Heel", at(2025, 3, 8, 9, 0), None, Some(36.5), None),
            meas("Right Heel", at(2025, 3, 7, 9, 0), None, Some(38.0), Some(93)),
        ];
        let snapshot = current_vitals_readings(&ms);
        let reading = &snapshot.right["heel"];
        assert_eq!(reading.temperature, 38.0);
        assert_eq!(reading.spo2, 93);
        assert_eq!(reading.status, VitalsStatus::BothAbnormal);
    }

    #[test]
    fn test_vitals_classification() {
        assert_eq!(classify_vitals(36.5, 97), VitalsStatus::Normal);
        assert_eq!(classify_vitals(38.0, 97), VitalsStatus::TempAbnormal);
        assert_eq!(classify_vitals(36.5, 93), VitalsStatus::Spo2Abnormal);
        assert_eq!(classify_vitals(35.0, 93), VitalsStatus::BothAbnormal);
        // boundaries are inclusive-normal
        assert_eq!(classify_vitals(36.0, 95), VitalsStatus::Normal);
        assert_eq!(classify_vitals(37.5, 100), VitalsStatus::Normal);
    }

    #[test]
    fn test_timeline_groups_by_point() {
        let ms = vec![
            meas("Right Heel", at(2025, 3, 7, 9, 0), Some(4.0), Some(31.0), None),
            meas("Left Heel", at(2025, 3, 7, 10, 0), Some(5.0), None, Some(97)),
            meas("Right Heel", at(2025, 3, 8, 9, 0), None, Some(32.0), None),
        ];
        let all = measurement_timeline(&ms, None);
        assert_eq!(all.len(), 2);
        let right_heel = &all["Right Heel"];
        assert_eq!(right_heel.timestamps, vec!["03/07 09:00", "03/08 09:00"]);
        assert_eq!(right_heel.vpt_values, vec![Some(4.0), None]);
        assert_eq!(right_heel.temp_values, vec![Some(31.0), Some(32.0)]);

        let filtered = measurement_timeline(&ms, Some("Left Heel"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered["Left Heel"].spo2_values, vec![Some(97)]);
    }
}
