//! 日付の切り替わり判定。
//!
//! カウンターは「暦日が変わった最初の実行」でだけ進む。暦日をどのタイムゾーンで
//! 数えるかは [`ReferenceZone`] で明示する。

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::counter::{CounterRecord, Result, StateError};

/// 暦日の判定に使うタイムゾーン。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferenceZone {
    /// ホストのローカルタイムゾーン
    #[default]
    Local,
    /// IANA タイムゾーン名で指定したゾーン
    Named(Tz),
}

impl ReferenceZone {
    /// `t` をこのゾーンに変換したときの日付を返す。
    pub fn date_of(&self, t: &DateTime<FixedOffset>) -> NaiveDate {
        match self {
            Self::Local => t.with_timezone(&Local).date_naive(),
            Self::Named(tz) => t.with_timezone(tz).date_naive(),
        }
    }

    /// 2 つの時刻が同じ暦日に属するかどうか。
    pub fn same_day(&self, t1: &DateTime<FixedOffset>, t2: &DateTime<FixedOffset>) -> bool {
        self.date_of(t1) == self.date_of(t2)
    }

    /// 現在時刻をこのゾーンのオフセットで返す。カウンターファイルにはこの値が書かれる。
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.at(Utc::now())
    }

    fn at(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Self::Local => instant.with_timezone(&Local).fixed_offset(),
            Self::Named(tz) => instant.with_timezone(tz).fixed_offset(),
        }
    }
}

impl std::fmt::Display for ReferenceZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

/// 日付が変わっていればカウンターを 1 進めて `last_updated` を `now` にする。
///
/// 進めた場合に `true` を返す。同じ日であれば `record` には触れない。
/// カウンターが `u64::MAX` に達している場合は `record` を変えずにエラーを返す。
pub fn apply_rollover(
    record: &mut CounterRecord,
    now: DateTime<FixedOffset>,
    zone: &ReferenceZone,
) -> Result<bool> {
    if zone.same_day(&now, &record.last_updated) {
        return Ok(false);
    }
    record.counter = record
        .counter
        .checked_add(1)
        .ok_or(StateError::CounterOverflow {
            counter: record.counter,
        })?;
    record.last_updated = now;
    Ok(true)
}
