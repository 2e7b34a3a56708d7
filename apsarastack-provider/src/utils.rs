//! Helpers shared by resources: tokens, zones, periods, IP lists

use chrono::{DateTime, NaiveDateTime, Utc};

pub const LOCAL_HOST_IP: &str = "127.0.0.1";
pub const COMMA_SEPARATED: &str = ",";
/// Marks a multi-zone id such as `cn-qingdao-MAZ1(b,c)`
pub const MULTI_IZ_SYMBOL: &str = "MAZ";

const CLIENT_TOKEN_MAX_LEN: usize = 64;

/// The 24 one-hour backup windows, `00:00Z-01:00Z` through `23:00Z-24:00Z`
pub fn backup_time_windows() -> Vec<String> {
    (0..24)
        .map(|h| format!("{:02}:00Z-{:02}:00Z", h, h + 1))
        .collect()
}

/// Idempotency token for create-style calls, at most 64 characters
pub fn build_client_token(action: &str) -> String {
    let token = format!(
        "TF-{}-{}-{}",
        action,
        Utc::now().timestamp(),
        uuid::Uuid::new_v4().simple()
    );
    let token = token.trim();
    match token.char_indices().nth(CLIENT_TOKEN_MAX_LEN) {
        Some((end, _)) => token[..end].to_string(),
        None => token.to_string(),
    }
}

pub fn trim(s: &str) -> String {
    s.trim().to_string()
}

/// Join IPs for the API, falling back to localhost when the list is empty
pub fn join_security_ips(ips: &[String]) -> String {
    if ips.is_empty() {
        LOCAL_HOST_IP.to_string()
    } else {
        ips.join(COMMA_SEPARATED)
    }
}

/// Check that a vswitch sits in the requested zone and return the zone to use.
///
/// An empty zone takes the vswitch's zone. A multi-zone id must list the
/// vswitch zone's last letter inside its parentheses.
pub fn resolve_zone_for_vswitch(
    zone_id: &str,
    vswitch_id: &str,
    vswitch_zone: &str,
) -> Result<String, String> {
    if zone_id.is_empty() {
        return Ok(vswitch_zone.to_string());
    }

    if zone_id.contains(MULTI_IZ_SYMBOL) {
        let letters = zone_id
            .split_once('(')
            .and_then(|(_, rest)| rest.split_once(')'))
            .map(|(inside, _)| inside)
            .unwrap_or_default();
        let last = vswitch_zone.chars().last();
        if last.is_some_and(|c| letters.contains(c)) {
            return Ok(zone_id.to_string());
        }
        return Err(format!(
            "The specified vswitch {} isn't in multi the zone {}",
            vswitch_id, zone_id
        ));
    }

    if zone_id != vswitch_zone {
        return Err(format!(
            "The specified vswitch {} isn't in the zone {}",
            vswitch_id, zone_id
        ));
    }
    Ok(zone_id.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodUnit {
    Week,
    Month,
    Year,
}

impl PeriodUnit {
    fn days(&self) -> f64 {
        match self {
            PeriodUnit::Week => 7.0,
            PeriodUnit::Month => 30.0,
            PeriodUnit::Year => 365.0,
        }
    }
}

fn parse_api_time(s: &str) -> Result<DateTime<Utc>, String> {
    ["%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%SZ"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|t| t.and_utc())
        .ok_or_else(|| format!("unexpected time format: {:?}", s))
}

/// Subscription length between creation and expiry, in whole units.
///
/// Never less than one. A positive configured period smaller than the
/// computed one is kept.
pub fn compute_period_by_unit(
    create_time: &str,
    expire_time: &str,
    current_period: i64,
    unit: PeriodUnit,
) -> Result<i64, String> {
    let create = parse_api_time(create_time)?;
    let expire = parse_api_time(expire_time)?;
    let hours = (expire - create).num_minutes() as f64 / 60.0;
    let mut period = (hours / 24.0 / unit.days()).floor() as i64;

    if period < 1 {
        period = 1;
    }
    if current_period > 0 && current_period < period {
        period = current_period;
    }
    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_windows_cover_the_day() {
        let windows = backup_time_windows();
        assert_eq!(windows.len(), 24);
        assert_eq!(windows[0], "00:00Z-01:00Z");
        assert_eq!(windows[23], "23:00Z-24:00Z");
    }

    #[test]
    fn client_token_is_bounded() {
        let token = build_client_token("CreateShardingDBInstance");
        assert!(token.starts_with("TF-CreateShardingDBInstance-"));
        assert_eq!(token.len(), 64);

        let short = build_client_token("X");
        assert!(short.len() < 64);
        assert_ne!(short, build_client_token("X"));
    }

    #[test]
    fn security_ips_default_to_localhost() {
        assert_eq!(join_security_ips(&[]), "127.0.0.1");
        assert_eq!(
            join_security_ips(&["10.0.0.1".to_string(), "10.0.0.2".to_string()]),
            "10.0.0.1,10.0.0.2"
        );
    }

    #[test]
    fn zone_resolution() {
        assert_eq!(
            resolve_zone_for_vswitch("", "vsw-1", "cn-qingdao-b").unwrap(),
            "cn-qingdao-b"
        );
        assert_eq!(
            resolve_zone_for_vswitch("cn-qingdao-MAZ1(b,c)", "vsw-1", "cn-qingdao-c").unwrap(),
            "cn-qingdao-MAZ1(b,c)"
        );
        assert_eq!(
            resolve_zone_for_vswitch("cn-qingdao-MAZ1(b,c)", "vsw-1", "cn-qingdao-d").unwrap_err(),
            "The specified vswitch vsw-1 isn't in multi the zone cn-qingdao-MAZ1(b,c)"
        );
        assert_eq!(
            resolve_zone_for_vswitch("cn-qingdao-a", "vsw-1", "cn-qingdao-b").unwrap_err(),
            "The specified vswitch vsw-1 isn't in the zone cn-qingdao-a"
        );
    }

    #[test]
    fn period_from_subscription_window() {
        let month = PeriodUnit::Month;
        assert_eq!(
            compute_period_by_unit("2020-01-01T00:00Z", "2020-04-01T00:00Z", 0, month).unwrap(),
            3
        );
        assert_eq!(
            compute_period_by_unit("2020-01-01T00:00Z", "2020-01-10T00:00Z", 0, month).unwrap(),
            1
        );
        assert_eq!(
            compute_period_by_unit("2020-01-01T00:00Z", "2020-04-01T00:00Z", 2, month).unwrap(),
            2
        );
        assert_eq!(
            compute_period_by_unit("2020-01-01T00:00:00Z", "2021-01-01T00:00:00Z", 0, PeriodUnit::Year)
                .unwrap(),
            1
        );
        assert!(compute_period_by_unit("yesterday", "2020-01-01T00:00Z", 0, month).is_err());
    }
}
