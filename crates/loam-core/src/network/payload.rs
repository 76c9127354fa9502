//! JSON document published for each statistics record
//!
//! ```json
//! {"device":"loam-logger","start":1760616000,"end":1760616059,"samples":60,
//!  "ds18b20":{"avg":18.75,"min":18.00,"max":19.50},...}
//! ```
//!
//! Written by hand into a fixed buffer because every channel has its own
//! number of decimals, matching the CSV rows.

use core::fmt::Write;

use super::NetworkError;
use crate::records::{ChannelStats, Measurement, StatisticsRecord};

pub const PAYLOAD_LEN: usize = 448;

pub type Payload = heapless::String<PAYLOAD_LEN>;

/// Formats `record` as one JSON object tagged with `device_id`.
///
/// A channel without data has `null` for all three statistics.
pub fn format_payload(device_id: &str, record: &StatisticsRecord) -> Result<Payload, NetworkError> {
    let mut json = Payload::new();
    write_payload(&mut json, device_id, record).map_err(|_| NetworkError::PayloadOverflow)?;
    Ok(json)
}

fn write_payload(
    json: &mut Payload,
    device_id: &str,
    record: &StatisticsRecord,
) -> core::fmt::Result {
    json.write_str("{\"device\":\"")?;
    write_escaped(json, device_id)?;
    write!(
        json,
        "\",\"start\":{},\"end\":{},\"samples\":{}",
        record.window_start, record.window_end, record.sample_count
    )?;

    for channel in Measurement::ALL {
        write!(json, ",\"{}\":", channel.payload_key())?;
        write_channel(json, channel.decimals(), record.channel(channel))?;
    }

    json.write_char('}')
}

fn write_channel(json: &mut Payload, decimals: usize, stats: &ChannelStats) -> core::fmt::Result {
    if !stats.has_data() {
        return json.write_str("{\"avg\":null,\"min\":null,\"max\":null}");
    }

    write!(
        json,
        "{{\"avg\":{:.*},\"min\":{:.*},\"max\":{:.*}}}",
        decimals, stats.mean, decimals, stats.min, decimals, stats.max
    )
}

fn write_escaped(json: &mut Payload, text: &str) -> core::fmt::Result {
    for c in text.chars() {
        match c {
            '"' | '\\' => {
                json.write_char('\\')?;
                json.write_char(c)?;
            }
            c if c.is_control() => {}
            c => json.write_char(c)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StatisticsRecord {
        StatisticsRecord {
            window_start: 1_760_616_000,
            window_end: 1_760_616_059,
            sample_count: 60,
            channels: [
                ChannelStats {
                    min: 18.0,
                    max: 19.5,
                    mean: 18.754,
                },
                ChannelStats::EMPTY,
                ChannelStats {
                    min: 40.04,
                    max: 61.96,
                    mean: 55.55,
                },
                ChannelStats {
                    min: 1790.0,
                    max: 1810.0,
                    mean: 1800.4,
                },
            ],
        }
    }

    #[test]
    fn test_payload_layout() {
        let json = format_payload("bed-3", &record()).unwrap();
        assert_eq!(
            json.as_str(),
            "{\"device\":\"bed-3\",\"start\":1760616000,\"end\":1760616059,\"samples\":60,\
\"ds18b20\":{\"avg\":18.75,\"min\":18.00,\"max\":19.50},\
\"sht40_temp\":{\"avg\":null,\"min\":null,\"max\":null},\
\"sht40_humidity\":{\"avg\":55.5,\"min\":40.0,\"max\":62.0},\
\"soil_moisture\":{\"avg\":1800,\"min\":1790,\"max\":1810}}"
        );
    }

    #[test]
    fn test_device_id_is_escaped() {
        let json = format_payload("a\"b\\c", &record()).unwrap();
        assert!(json.starts_with("{\"device\":\"a\\\"b\\\\c\","));
    }

    #[test]
    fn test_worst_case_record_fits() {
        let wide = ChannelStats {
            min: -99999.99,
            max: 99999.99,
            mean: -99999.99,
        };
        let record = StatisticsRecord {
            window_start: u32::MAX,
            window_end: u32::MAX,
            sample_count: u32::MAX,
            channels: [wide; 4],
        };
        let device = "x".repeat(64);
        assert!(format_payload(&device, &record).is_ok());
    }
}
