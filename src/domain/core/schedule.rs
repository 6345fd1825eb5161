use std::collections::HashSet;

use chrono::NaiveTime;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// 08:00 から 22:00 まで1時間刻みの標準スケジュール
pub static DEFAULT_SCHEDULE: Lazy<DailySchedule> = Lazy::new(|| DailySchedule::hourly(8, 22));

/// 1日の予約候補時刻（昇順）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DailySchedule {
    times: Vec<NaiveTime>,
}

impl DailySchedule {
    /// `open` 時から `close` 時まで（両端を含む）毎正時の候補を作る
    pub fn hourly(open: u32, close: u32) -> Self {
        let times = (open..=close.min(23))
            .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
            .collect();
        Self { times }
    }

    pub fn from_times(mut times: Vec<NaiveTime>) -> Self {
        times.sort();
        times.dedup();
        Self { times }
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    pub fn contains(&self, time: &NaiveTime) -> bool {
        self.times.binary_search(time).is_ok()
    }

    /// 予約済み時刻を除いた空き状況を候補順に返す。
    ///
    /// 予約の所要時間は考慮しない。60分を超える予約があっても後続の枠は空きのまま。
    pub fn availability<'a, I>(&self, booked: I) -> Vec<TimeSlot>
    where
        I: IntoIterator<Item = &'a NaiveTime>,
    {
        let booked: HashSet<&NaiveTime> = booked.into_iter().collect();
        self.times
            .iter()
            .map(|time| TimeSlot {
                time: *time,
                available: !booked.contains(time),
            })
            .collect()
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        DEFAULT_SCHEDULE.clone()
    }
}

/// 予約枠
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub available: bool,
}

impl TimeSlot {
    pub fn label(&self) -> String {
        format_time(&self.time)
    }
}

pub fn format_time(time: &NaiveTime) -> String {
    time.format(hhmm::FORMAT).to_string()
}

/// `HH:MM` または `HH:MM:SS` を受け付ける
pub fn parse_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, hhmm::FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
}

/// 時刻を `HH:MM` 形式でシリアライズする
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_time(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_time(s).unwrap()
    }

    #[test]
    fn test_default_schedule() {
        let times = DEFAULT_SCHEDULE.times();
        assert_eq!(times.len(), 15);
        assert_eq!(format_time(&times[0]), "08:00");
        assert_eq!(format_time(&times[14]), "22:00");
    }

    #[test]
    fn test_availability_marks_booked_times() {
        let booked = vec![t("10:00"), t("14:00")];
        let slots = DEFAULT_SCHEDULE.availability(&booked);
        assert_eq!(slots.len(), 15);
        let unavailable: Vec<String> = slots
            .iter()
            .filter(|s| !s.available)
            .map(TimeSlot::label)
            .collect();
        assert_eq!(unavailable, vec!["10:00", "14:00"]);
        assert_eq!(slots.iter().filter(|s| s.available).count(), 13);
    }

    #[test]
    fn test_availability_ignores_duration_and_off_grid_times() {
        // 10:30 は候補に無いので影響しない
        let booked = vec![t("10:30"), t("09:00:00")];
        let slots = DailySchedule::hourly(8, 11).availability(&booked);
        let flags: Vec<bool> = slots.iter().map(|s| s.available).collect();
        assert_eq!(flags, vec![true, false, true, true]);
    }

    #[test]
    fn test_time_slot_serialization() {
        let slot = TimeSlot {
            time: t("08:00"),
            available: false,
        };
        assert_eq!(
            serde_json::to_value(slot).unwrap(),
            serde_json::json!({ "time": "08:00", "available": false })
        );
    }
}
