//! Windows `SYSTEMTIME` codec. Always JST (UTC+9) regardless
//! of host timezone.

use super::codec::ByteReader;
use crate::error::{RpcError, RpcResult};
use chrono::{DateTime, FixedOffset, TimeZone};

/// Year, Month, DayOfWeek, Day, Hour, Minute, Second, Millisecond — each
/// `u16`, little-endian, in that wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemTime {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub millisecond: u16,
}

impl SystemTime {
    pub const WIRE_SIZE: usize = 16;

    pub fn from_jst(dt: DateTime<FixedOffset>) -> SystemTime {
        use chrono::Datelike;
        use chrono::Timelike;
        SystemTime {
            year: dt.year() as u16,
            month: dt.month() as u16,
            day_of_week: dt.weekday().num_days_from_sunday() as u16,
            day: dt.day() as u16,
            hour: dt.hour() as u16,
            minute: dt.minute() as u16,
            second: dt.second() as u16,
            millisecond: (dt.nanosecond() / 1_000_000) as u16,
        }
    }

    pub fn to_jst(self) -> RpcResult<DateTime<FixedOffset>> {
        let jst = crate::model::program::jst();
        jst.with_ymd_and_hms(
            self.year as i32,
            self.month as u32,
            self.day as u32,
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
        )
        .single()
        .and_then(|dt| dt.checked_add_signed(chrono::Duration::milliseconds(self.millisecond as i64)))
        .ok_or_else(|| RpcError::Malformed(format!("invalid SYSTEMTIME {:?}", self)))
    }

    pub fn write_le(&self, buf: &mut Vec<u8>) {
        for v in [
            self.year,
            self.month,
            self.day_of_week,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.millisecond,
        ] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    pub fn read_le(r: &mut ByteReader<'_>) -> RpcResult<SystemTime> {
        Ok(SystemTime {
            year: r.read_u16()?,
            month: r.read_u16()?,
            day_of_week: r.read_u16()?,
            day: r.read_u16()?,
            hour: r.read_u16()?,
            minute: r.read_u16()?,
            second: r.read_u16()?,
            millisecond: r.read_u16()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::program::jst;

    #[test]
    fn encode_decode_roundtrip_on_valid_jst_datetimes() {
        let dt = jst().with_ymd_and_hms(2026, 7, 28, 21, 5, 3).unwrap();
        let st = SystemTime::from_jst(dt);
        let mut buf = Vec::new();
        st.write_le(&mut buf);
        assert_eq!(buf.len(), SystemTime::WIRE_SIZE);
        let mut r = ByteReader::new(&buf);
        let decoded = SystemTime::read_le(&mut r).unwrap();
        assert_eq!(decoded, st);
        assert_eq!(decoded.to_jst().unwrap(), dt);
    }

    #[test]
    fn truncated_buffer_is_a_recoverable_error() {
        let buf = [0u8; 4];
        let mut r = ByteReader::new(&buf);
        assert!(SystemTime::read_le(&mut r).is_err());
    }
}
