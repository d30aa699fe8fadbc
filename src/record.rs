use serde_json::{Map, Value};

/// Field mapping handed to a [`Formatter`](crate::formatter::Formatter).
///
/// Keys are kept sorted, so two records with the same entries always
/// serialize to the same text.
pub type Record = Map<String, Value>;

/// Event name. Present in every emitted record.
pub const TITLE: &str = "title";
/// Lowercase name of the record's [`Level`](crate::level::Level).
pub const LEVEL: &str = "level";
/// Identity of the emitting logger.
pub const SOURCE: &str = "source";
/// `"counter"` or `"gauge"` for metric records.
pub const TYPE: &str = "type";
/// Numeric payload of a metric record.
pub const VALUE: &str = "value";
/// Tracking identifier returned by the error collector.
pub const SENTRY_EVENT_ID: &str = "sentry_event_id";

/// Build a [`Record`] from `key => value` pairs.
///
/// Values go through `serde_json::json!`, so anything serializable works.
/// Non-finite floats have no JSON form and become `null` here; report such
/// measurements with [`Logger::gauge_float`](crate::logger::Logger::gauge_float),
/// which rejects them.
///
/// ```
/// let data = kayvee_log::kv! { "port" => 8080, "tls" => false };
/// assert_eq!(data["port"], 8080);
/// ```
#[macro_export]
macro_rules! kv {
    () => {
        $crate::record::Record::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::record::Record::new();
        $(
            record.insert(
                ::std::string::ToString::to_string(&$key),
                $crate::__private::serde_json::json!($value),
            );
        )+
        record
    }};
}

/// Copy `globals` into `record` for every key the record does not already
/// carry.
pub(crate) fn merge_globals(record: &mut Record, globals: &Record) {
    for (key, value) in globals {
        if !record.contains_key(key) {
            record.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn caller_fields_win_over_globals() {
        let mut record = crate::kv! { "source" => "caller", "k" => 1 };
        let globals = crate::kv! { "source" => "svc", "region" => "us-west-1" };

        merge_globals(&mut record, &globals);

        assert_eq!(record["source"], json!("caller"));
        assert_eq!(record["region"], json!("us-west-1"));
        assert_eq!(record["k"], json!(1));
    }

    #[test]
    fn kv_macro_accepts_nested_values() {
        let record = crate::kv! { "nested" => json!({ "a": [1, 2] }), "pi" => 3.5 };
        assert_eq!(record["nested"]["a"][1], json!(2));
        assert_eq!(record["pi"], json!(3.5));
        assert!(crate::kv! {}.is_empty());
    }
}
