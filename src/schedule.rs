//! Publish-time schedules for a batch of videos.
//!
//! Everything here is pure: callers pass "today" in explicitly so the
//! generated timestamps are deterministic.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;

use crate::error::{PublishError, PublishResult};

pub const DEFAULT_DAILY_HOURS: [u32; 6] = [6, 9, 12, 15, 18, 21];
pub const LITERAL_FORMAT: &str = "%Y-%m-%d %H:%M";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Day/slot policy: fill `slots_used_per_day` of `daily_hours` per day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPolicy {
    pub start_date: NaiveDate,
    pub daily_hours: Vec<u32>,
    pub slots_used_per_day: usize,
}

impl SlotPolicy {
    /// Builds a validated policy. `start_date` defaults to the day after `today`.
    pub fn new(
        start_date: Option<NaiveDate>,
        mut daily_hours: Vec<u32>,
        slots_used_per_day: Option<usize>,
        today: NaiveDate,
    ) -> PublishResult<Self> {
        daily_hours.sort_unstable();
        daily_hours.dedup();
        let slots_used_per_day = slots_used_per_day.unwrap_or(daily_hours.len());
        validate_slots(&daily_hours, slots_used_per_day)?;
        Ok(Self {
            start_date: start_date.unwrap_or(today + Duration::days(1)),
            daily_hours,
            slots_used_per_day,
        })
    }

    pub fn generate(&self, count: usize) -> PublishResult<Vec<NaiveDateTime>> {
        generate(
            self.start_date,
            &self.daily_hours,
            self.slots_used_per_day,
            count,
        )
    }
}

/// How a batch gets its publish times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulePolicy {
    Slots(SlotPolicy),
    /// Explicit timestamps. Short lists are padded with the last entry
    /// unless `strict` is set.
    Literal {
        datetimes: Vec<NaiveDateTime>,
        strict: bool,
    },
    /// Each unit publishes on its folder date at `hour`.
    FolderDated { hour: u32 },
    /// No times assigned; the platform default applies.
    Unscheduled,
}

impl SchedulePolicy {
    /// Computes the whole batch at once. `folder_dates[i]` is the folder date
    /// of unit `i` (only consulted by `FolderDated`); its length is the batch size.
    pub fn plan(&self, folder_dates: &[Option<NaiveDate>]) -> PublishResult<Vec<Option<NaiveDateTime>>> {
        let count = folder_dates.len();
        match self {
            Self::Slots(policy) => Ok(policy.generate(count)?.into_iter().map(Some).collect()),
            Self::Literal { datetimes, strict } => {
                Ok(from_literals(datetimes, count, *strict)?.into_iter().map(Some).collect())
            }
            Self::FolderDated { hour } => {
                let time = hour_of_day(*hour)?;
                folder_dates
                    .iter()
                    .enumerate()
                    .map(|(index, date)| {
                        date.map(|d| Some(d.and_time(time))).ok_or_else(|| {
                            PublishError::InvalidPolicy(format!(
                                "unit #{} has no folder date for dated scheduling",
                                index + 1
                            ))
                        })
                    })
                    .collect()
            }
            Self::Unscheduled => Ok(vec![None; count]),
        }
    }
}

/// Emits `count` timestamps from `start_date`, using the first
/// `slots_used_per_day` entries of `daily_hours` per day, day by day.
pub fn generate(
    start_date: NaiveDate,
    daily_hours: &[u32],
    slots_used_per_day: usize,
    count: usize,
) -> PublishResult<Vec<NaiveDateTime>> {
    let mut hours = daily_hours.to_vec();
    hours.sort_unstable();
    validate_slots(&hours, slots_used_per_day)?;

    let day_times = hours[..slots_used_per_day]
        .iter()
        .map(|h| hour_of_day(*h))
        .collect::<PublishResult<Vec<_>>>()?;

    let mut schedule = Vec::with_capacity(count);
    let mut day = start_date;
    while schedule.len() < count {
        for time in &day_times {
            if schedule.len() == count {
                break;
            }
            schedule.push(day.and_time(*time));
        }
        day += Duration::days(1);
    }
    Ok(schedule)
}

/// Resolves `count` publish times from an explicit list.
pub fn from_literals(
    datetimes: &[NaiveDateTime],
    count: usize,
    strict: bool,
) -> PublishResult<Vec<NaiveDateTime>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let Some(last) = datetimes.last().copied() else {
        return Err(PublishError::InvalidPolicy(
            "publish_datetimes is empty".to_string(),
        ));
    };

    let mut schedule: Vec<NaiveDateTime> = datetimes.iter().copied().take(count).collect();
    if schedule.len() < count {
        if strict {
            return Err(PublishError::InvalidPolicy(format!(
                "{} publish time(s) configured for {} video(s)",
                datetimes.len(),
                count
            )));
        }
        warn!(
            "[schedule] only {} publish time(s) for {} video(s); repeating {}",
            datetimes.len(),
            count,
            last.format(LITERAL_FORMAT)
        );
        schedule.resize(count, last);
    }
    Ok(schedule)
}

/// Parses `YYMMDD` at the start of a folder name (years are 20YY).
pub fn folder_date(name: &str) -> Option<NaiveDate> {
    let prefix = name.get(..6)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = prefix[..2].parse().ok()?;
    let month: u32 = prefix[2..4].parse().ok()?;
    let day: u32 = prefix[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

/// Folder date, if any, that is not older than `cutoff`.
pub fn folder_date_on_or_after(name: &str, cutoff: Option<NaiveDate>) -> Option<NaiveDate> {
    let date = folder_date(name)?;
    match cutoff {
        Some(cutoff) if date < cutoff => None,
        _ => Some(date),
    }
}

/// `hour:00` on the day after `now`.
pub fn next_day_at(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    (now.date() + Duration::days(1)).and_time(time)
}

pub fn parse_literal(raw: &str) -> PublishResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), LITERAL_FORMAT).map_err(|e| {
        PublishError::InvalidPolicy(format!(
            "`{}` is not a `YYYY-MM-DD HH:MM` time: {}",
            raw, e
        ))
    })
}

pub fn parse_date(raw: &str) -> PublishResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|e| {
        PublishError::InvalidPolicy(format!("`{}` is not a `YYYY-MM-DD` date: {}", raw, e))
    })
}

fn validate_slots(sorted_hours: &[u32], slots_used_per_day: usize) -> PublishResult<()> {
    if sorted_hours.is_empty() {
        return Err(PublishError::InvalidPolicy(
            "no daily publish hours configured".to_string(),
        ));
    }
    if slots_used_per_day == 0 {
        return Err(PublishError::InvalidPolicy(
            "videos per day must be positive".to_string(),
        ));
    }
    if slots_used_per_day > sorted_hours.len() {
        return Err(PublishError::InvalidPolicy(format!(
            "videos per day ({}) exceeds the {} configured publish hour(s)",
            slots_used_per_day,
            sorted_hours.len()
        )));
    }
    Ok(())
}

fn hour_of_day(hour: u32) -> PublishResult<NaiveTime> {
    NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| PublishError::InvalidPolicy(format!("hour {} is outside 0-23", hour)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, h: u32) -> NaiveDateTime {
        d.and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn single_slot_one_per_day_from_tomorrow() {
        let today = date(2025, 8, 14);
        let policy = SlotPolicy::new(None, vec![9], Some(1), today).unwrap();
        let schedule = policy.generate(3).unwrap();
        assert_eq!(
            schedule,
            vec![
                at(date(2025, 8, 15), 9),
                at(date(2025, 8, 16), 9),
                at(date(2025, 8, 17), 9),
            ]
        );
    }

    #[test]
    fn fills_each_day_left_to_right() {
        let start = date(2025, 1, 1);
        let schedule = generate(start, &[6, 12, 18], 2, 5).unwrap();
        assert_eq!(
            schedule,
            vec![
                at(date(2025, 1, 1), 6),
                at(date(2025, 1, 1), 12),
                at(date(2025, 1, 2), 6),
                at(date(2025, 1, 2), 12),
                at(date(2025, 1, 3), 6),
            ]
        );
    }

    #[test]
    fn unsorted_hours_are_sorted_before_slicing() {
        let schedule = generate(date(2025, 1, 1), &[18, 6, 12], 2, 2).unwrap();
        assert_eq!(
            schedule,
            vec![at(date(2025, 1, 1), 6), at(date(2025, 1, 1), 12)]
        );
    }

    #[test]
    fn length_and_ordering_hold_across_counts() {
        let start = date(2024, 12, 30);
        for used in 1..=DEFAULT_DAILY_HOURS.len() {
            for count in 0..20 {
                let schedule = generate(start, &DEFAULT_DAILY_HOURS, used, count).unwrap();
                assert_eq!(schedule.len(), count);
                assert!(schedule.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }

    #[test]
    fn rejects_bad_slot_counts() {
        let start = date(2025, 1, 1);
        assert!(matches!(
            generate(start, &[9, 12], 0, 1),
            Err(PublishError::InvalidPolicy(_))
        ));
        assert!(matches!(
            generate(start, &[9, 12], 3, 1),
            Err(PublishError::InvalidPolicy(_))
        ));
        assert!(matches!(
            generate(start, &[], 1, 1),
            Err(PublishError::InvalidPolicy(_))
        ));
        assert!(matches!(
            generate(start, &[24], 1, 1),
            Err(PublishError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn literal_list_is_padded_with_last_entry() {
        let a = at(date(2025, 3, 1), 8);
        let b = at(date(2025, 3, 2), 20);
        assert_eq!(from_literals(&[a, b], 4, false).unwrap(), vec![a, b, b, b]);
        assert_eq!(from_literals(&[a, b], 1, false).unwrap(), vec![a]);
    }

    #[test]
    fn strict_literal_list_rejects_short_input() {
        let a = at(date(2025, 3, 1), 8);
        assert!(matches!(
            from_literals(&[a], 2, true),
            Err(PublishError::InvalidPolicy(_))
        ));
        assert!(matches!(
            from_literals(&[], 1, false),
            Err(PublishError::InvalidPolicy(_))
        ));
        assert!(from_literals(&[], 0, true).unwrap().is_empty());
    }

    #[test]
    fn folder_names_carry_dates() {
        assert_eq!(folder_date("250815_myvideo"), Some(date(2025, 8, 15)));
        assert_eq!(folder_date("abc_video"), None);
        assert_eq!(folder_date("251399_bad_month"), None);
        assert_eq!(folder_date("2508"), None);
    }

    #[test]
    fn cutoff_excludes_older_folders() {
        let cutoff = Some(date(2025, 8, 1));
        assert_eq!(folder_date_on_or_after("250731_old", cutoff), None);
        assert_eq!(
            folder_date_on_or_after("250801_new", cutoff),
            Some(date(2025, 8, 1))
        );
        assert_eq!(
            folder_date_on_or_after("240101_any", None),
            Some(date(2024, 1, 1))
        );
    }

    #[test]
    fn folder_dated_policy_uses_fixed_hour() {
        let policy = SchedulePolicy::FolderDated { hour: 7 };
        let plan = policy
            .plan(&[Some(date(2025, 8, 15)), Some(date(2025, 8, 16))])
            .unwrap();
        assert_eq!(
            plan,
            vec![Some(at(date(2025, 8, 15), 7)), Some(at(date(2025, 8, 16), 7))]
        );
        assert!(policy.plan(&[None]).is_err());
    }

    #[test]
    fn unscheduled_policy_leaves_times_empty() {
        let plan = SchedulePolicy::Unscheduled.plan(&[None, None]).unwrap();
        assert_eq!(plan, vec![None, None]);
    }

    #[test]
    fn next_day_default_is_nine_tomorrow() {
        let now = date(2025, 12, 31).and_hms_opt(22, 15, 0).unwrap();
        assert_eq!(next_day_at(now, 9), at(date(2026, 1, 1), 9));
    }

    #[test]
    fn parses_literal_times() {
        assert_eq!(
            parse_literal("2025-08-15 07:30").unwrap(),
            date(2025, 8, 15).and_hms_opt(7, 30, 0).unwrap()
        );
        assert!(parse_literal("15/08/2025").is_err());
    }
}
