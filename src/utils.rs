use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use serde::de::DeserializeOwned;

/// Local midnight at the start of the day containing `now`, as UTC.
///
/// "Today" for mood entries follows the server's wall clock, the same way
/// staff read it.
pub(crate) fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let local_midnight = now
        .with_timezone(&Local)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());

    match local_midnight {
        Some(midnight) => midnight.with_timezone(&Utc),
        // no midnight on DST-skipping days in some zones
        None => now - Duration::hours(24),
    }
}

/// Decode a JSON payload from an external service, naming the offending
/// field on failure.
pub(crate) fn decode_json<T: DeserializeOwned>(what: &str, body: &[u8]) -> Result<T, String> {
    let de = &mut serde_json::Deserializer::from_slice(body);
    serde_path_to_error::deserialize(de)
        .map_err(|e| format!("unexpected {} payload at `{}`: {}", what, e.path(), e.inner()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Claims {
        sub: String,
        #[allow(dead_code)]
        exp: i64,
    }

    #[test]
    fn start_of_day_is_not_after_now() {
        let now = Utc::now();
        let midnight = start_of_day(now);
        assert!(midnight <= now);
        assert!(now - midnight <= Duration::hours(25));
    }

    #[test]
    fn decode_error_names_the_field() {
        let err = decode_json::<Claims>("id token", br#"{"sub": "x", "exp": "soon"}"#).unwrap_err();
        assert!(err.contains("exp"), "{}", err);
        assert!(err.starts_with("unexpected id token payload"));

        let ok = decode_json::<Claims>("id token", br#"{"sub": "x", "exp": 1}"#).unwrap();
        assert_eq!(ok.sub, "x");
    }
}
