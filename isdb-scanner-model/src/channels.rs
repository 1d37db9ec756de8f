//! Scan plan definitions.
//!
//! Terrestrial channels are scanned exhaustively; satellite networks are
//! scanned through one representative physical channel each, because one
//! satellite capture carries the NIT entries of every transport stream in
//! its network.

use std::time::Duration;

/// Capture length for one terrestrial channel.
///
/// Terrestrial SI repetition interval is at most 2 seconds.
pub const TERRESTRIAL_CAPTURE_DURATION: Duration = Duration::from_millis(2250);

/// Capture length for one satellite channel.
///
/// BS/CS SI repetition interval is at most 10 seconds.
pub const SATELLITE_CAPTURE_DURATION: Duration = Duration::from_secs(11);

/// Default limit for how long a tuner may stay silent after tuning starts.
pub const DEFAULT_TUNE_TIMEOUT: Duration = Duration::from_secs(7);

/// Physical channels for a full terrestrial scan (T13 - T62).
///
/// 53ch - 62ch are no longer assigned to broadcasters but are still used
/// by some cable TV community channels (自主放送).
pub fn terrestrial_scan_channels() -> Vec<String> {
    (13..=62).map(|ch| format!("T{}", ch)).collect()
}

/// Physical channels for a satellite scan, one per network.
///
/// The default TS mandated for BS bootstrap is 0x40F1 (BS15/TS0), but its
/// NIT repetition interval is unstable enough to require captures of
/// around 20 seconds, so BS01/TS0 is scanned instead. ND02 covers CS1 and
/// ND04 covers CS2; both carry pay TV only and are dropped when
/// `exclude_pay_tv` is set.
pub fn satellite_scan_channels(exclude_pay_tv: bool) -> Vec<String> {
    let mut channels = vec!["BS01/TS0".to_string()];
    if !exclude_pay_tv {
        channels.push("ND02".to_string());
        channels.push("ND04".to_string());
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrestrial_plan_covers_13_to_62() {
        let channels = terrestrial_scan_channels();
        assert_eq!(channels.len(), 50);
        assert_eq!(channels.first().map(String::as_str), Some("T13"));
        assert_eq!(channels.last().map(String::as_str), Some("T62"));
    }

    #[test]
    fn test_satellite_plan_honors_pay_tv_exclusion() {
        assert_eq!(
            satellite_scan_channels(false),
            vec!["BS01/TS0", "ND02", "ND04"]
        );
        assert_eq!(satellite_scan_channels(true), vec!["BS01/TS0"]);
    }
}
