//! Query-string building.

use url::form_urlencoded;

/// A single query parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// Left out of the query string.
    Absent,
    One(String),
    /// Emitted as the key repeated once per item.
    Many(Vec<String>),
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::One(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::One(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::One(value.to_string())
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::One(value.to_string())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::One(value.to_string())
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::Many(values)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(QueryValue::Absent, Into::into)
    }
}

/// Ordered list of query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: Vec<(String, QueryValue)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<QueryValue>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    /// Renders `?k=v&...`, or an empty string when nothing remains after
    /// dropping absent and empty values.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let mut any = false;
        for (key, value) in &self.params {
            match value {
                QueryValue::Absent => {}
                QueryValue::One(v) if v.is_empty() => {}
                QueryValue::One(v) => {
                    serializer.append_pair(key, v);
                    any = true;
                }
                QueryValue::Many(values) => {
                    for v in values {
                        serializer.append_pair(key, v);
                        any = true;
                    }
                }
            }
        }

        if any {
            format!("?{}", serializer.finish())
        } else {
            String::new()
        }
    }
}
