//! CSV row layout of the daily files

use core::fmt::Write;

use super::StorageError;
use crate::records::{ChannelStats, Measurement, StatisticsRecord};

/// First line of every daily file
pub const HEADER: &str = "timestamp_start,timestamp_end,samples,\
ds18b20_avg,ds18b20_min,ds18b20_max,\
sht40_temp_avg,sht40_temp_min,sht40_temp_max,\
sht40_hum_avg,sht40_hum_min,sht40_hum_max,\
soil_avg,soil_min,soil_max";

/// Fields per row: three window fields plus avg/min/max per channel
pub const FIELD_COUNT: usize = 3 + 3 * Measurement::ALL.len();

/// Capacity of one formatted row
pub const ROW_LEN: usize = 256;

pub type Row = heapless::String<ROW_LEN>;

/// Formats `record` as one CSV row, without line terminator.
///
/// Each channel uses its fixed precision. A channel without data becomes
/// three empty fields, so every row has the same number of commas.
pub fn format_row(record: &StatisticsRecord) -> Result<Row, StorageError> {
    let mut row = Row::new();
    write!(
        row,
        "{},{},{}",
        record.window_start, record.window_end, record.sample_count
    )
    .map_err(|_| StorageError::RowOverflow)?;

    for channel in Measurement::ALL {
        write_channel(&mut row, channel, record.channel(channel))
            .map_err(|_| StorageError::RowOverflow)?;
    }

    Ok(row)
}

fn write_channel(row: &mut Row, channel: Measurement, stats: &ChannelStats) -> core::fmt::Result {
    if !stats.has_data() {
        return row.write_str(",,,");
    }

    let precision = channel.decimals();
    write!(
        row,
        ",{:.*},{:.*},{:.*}",
        precision, stats.mean, precision, stats.min, precision, stats.max
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CHANNEL_COUNT;

    fn record(channels: [ChannelStats; CHANNEL_COUNT]) -> StatisticsRecord {
        StatisticsRecord {
            window_start: 1_760_616_000,
            window_end: 1_760_616_059,
            sample_count: 60,
            channels,
        }
    }

    fn stats(min: f32, max: f32, mean: f32) -> ChannelStats {
        ChannelStats { min, max, mean }
    }

    #[test]
    fn test_header_lists_channels_in_order() {
        let mut expected = heapless::String::<256>::new();
        expected.push_str("timestamp_start,timestamp_end,samples").unwrap();
        for channel in Measurement::ALL {
            for suffix in ["avg", "min", "max"] {
                write!(expected, ",{}_{}", channel.column_prefix(), suffix).unwrap();
            }
        }
        assert_eq!(HEADER, expected.as_str());
        assert_eq!(HEADER.split(',').count(), FIELD_COUNT);
    }

    #[test]
    fn test_row_uses_per_channel_precision() {
        let row = format_row(&record([
            stats(18.0, 19.5, 18.754),
            stats(21.13, 23.0, 22.25),
            stats(40.04, 61.96, 55.55),
            stats(1790.0, 1810.0, 1800.4),
        ]))
        .unwrap();

        assert_eq!(
            row.as_str(),
            "1760616000,1760616059,60,18.75,18.00,19.50,22.25,21.13,23.00,55.5,40.0,62.0,1800,1790,1810"
        );
    }

    #[test]
    fn test_missing_channel_keeps_comma_count() {
        let row = format_row(&record([
            ChannelStats::EMPTY,
            stats(20.0, 22.0, 21.0),
            ChannelStats::EMPTY,
            ChannelStats::EMPTY,
        ]))
        .unwrap();

        assert_eq!(
            row.as_str(),
            "1760616000,1760616059,60,,,,21.00,20.00,22.00,,,,,,"
        );
        assert_eq!(row.split(',').count(), FIELD_COUNT);
        assert!(!row.contains("NaN"), "NaN must never be written as text");
    }
}
