use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::{Decode, DecodeError, Encode, Value};

/// Julian day of `1970-01-01`.
const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

fn date_from_days(days: i32) -> Result<Date, DecodeError> {
    days.checked_add(UNIX_EPOCH_JULIAN_DAY)
        .and_then(|day| Date::from_julian_day(day).ok())
        .ok_or(DecodeError::OutOfRange("Date"))
}

impl Decode for Date {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Date(days) => date_from_days(days.into()),
            Value::Date32(days) => date_from_days(days),
            value => Err(DecodeError::mismatch("Date", &value)),
        }
    }
}

impl Encode for Date {
    fn encode(self) -> Value {
        let days = self.to_julian_day() - UNIX_EPOCH_JULIAN_DAY;
        match u16::try_from(days) {
            Ok(days) => Value::Date(days),
            Err(_) => Value::Date32(days),
        }
    }
}

impl Decode for OffsetDateTime {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let nanos = match value {
            Value::DateTime(secs) => i128::from(secs) * 1_000_000_000,
            Value::DateTime64(ticks, precision) if precision <= 9 => {
                i128::from(ticks) * 10i128.pow(9 - precision as u32)
            },
            Value::DateTime64(ticks, precision) => {
                i128::from(ticks) / 10i128.pow(precision as u32 - 9)
            },
            value => return Err(DecodeError::mismatch("OffsetDateTime", &value)),
        };
        OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|_| DecodeError::OutOfRange("OffsetDateTime"))
    }
}

impl Encode for OffsetDateTime {
    /// Whole seconds within `DateTime` range are sent as `DateTime`,
    /// anything else as nanosecond `DateTime64`.
    fn encode(self) -> Value {
        let secs = self.unix_timestamp();
        if self.nanosecond() == 0 {
            if let Ok(secs) = u32::try_from(secs) {
                return Value::DateTime(secs);
            }
        }
        match i64::try_from(self.unix_timestamp_nanos()) {
            Ok(nanos) => Value::DateTime64(nanos, 9),
            Err(_) => Value::DateTime64(secs, 0),
        }
    }
}

/// Values are unix based, thus assumed UTC.
impl Decode for PrimitiveDateTime {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let datetime = OffsetDateTime::decode(value)?;
        Ok(PrimitiveDateTime::new(datetime.date(), datetime.time()))
    }
}

impl Encode for PrimitiveDateTime {
    fn encode(self) -> Value {
        self.assume_utc().encode()
    }
}

#[cfg(test)]
mod test {
    use time::{Month, Time};

    use super::*;

    #[test]
    fn date() {
        let date = Date::from_calendar_date(2024, Month::February, 29).unwrap();
        let value = date.encode();
        assert_eq!(value, Value::Date(19782));
        assert_eq!(Date::decode(value).unwrap(), date);

        let old = Date::from_calendar_date(1900, Month::January, 1).unwrap();
        assert!(matches!(old.encode(), Value::Date32(days) if days < 0));
        assert_eq!(Date::decode(old.encode()).unwrap(), old);
    }

    #[test]
    fn datetime() {
        let epoch = OffsetDateTime::UNIX_EPOCH;
        assert_eq!(epoch.encode(), Value::DateTime(0));
        assert_eq!(OffsetDateTime::decode(Value::DateTime(0)).unwrap(), epoch);

        let precise = epoch + time::Duration::milliseconds(1500);
        assert_eq!(precise.encode(), Value::DateTime64(1_500_000_000, 9));
        assert_eq!(OffsetDateTime::decode(Value::DateTime64(1500, 3)).unwrap(), precise);

        let primitive = PrimitiveDateTime::new(epoch.date(), Time::MIDNIGHT);
        assert_eq!(primitive.encode(), Value::DateTime(0));
    }
}
