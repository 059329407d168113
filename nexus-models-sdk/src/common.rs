//! Shared serde helpers.

/// Serialize `Duration` as a humanized string (`"30s"`, `"500ms"`) and
/// accept strings, bare integer seconds, or the struct form on the way in.
pub mod duration_serde {
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        use serde::Deserialize;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Secs(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => parse_duration_string(&s).map_err(Error::custom),
            Repr::Secs(secs) => Ok(Duration::from_secs(secs)),
        }
    }

    fn parse_duration_string(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }
        if let Some(stripped) = s.strip_suffix("ms") {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_millis(num));
        }
        if let Some(stripped) = s.strip_suffix('s') {
            let num: f64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            let secs = num.trunc() as u64;
            let nanos = ((num.fract() * 1_000_000_000.0).round()) as u32;
            return Ok(Duration::new(secs, nanos));
        }
        if let Some(stripped) = s.strip_suffix('m') {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_secs(num * 60));
        }
        Err(format!("unknown duration unit: {s}"))
    }

}
