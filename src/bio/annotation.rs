use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::fmt;

/// Ordered annotation map attached to every record.
pub type Annotations = IndexMap<String, AnnotationValue>;

/// Polymorphic annotation value.
///
/// Coercion follows a small promotion lattice: int → float → string. Getters
/// return `None` rather than failing when no widening conversion exists.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    IntVec(Vec<i64>),
    FloatVec(Vec<f64>),
    StrVec(Vec<String>),
    AnyVec(Vec<AnnotationValue>),
    IntMap(IndexMap<String, i64>),
    StrMap(IndexMap<String, String>),
    AnyMap(IndexMap<String, AnnotationValue>),
    Histogram(ValueHistogram),
}

impl AnnotationValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::IntVec(_) => "int_vec",
            Self::FloatVec(_) => "float_vec",
            Self::StrVec(_) => "string_vec",
            Self::AnyVec(_) => "vec",
            Self::IntMap(_) => "int_map",
            Self::StrMap(_) => "string_map",
            Self::AnyMap(_) => "map",
            Self::Histogram(_) => "histogram",
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::Str(_)
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.is_finite() => Some(*v as i64),
            Self::Bool(v) => Some(i64::from(*v)),
            Self::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
            }
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            Self::Float(v) => Some(*v != 0.0),
            Self::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Some(true),
                "false" | "f" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// String rendering: scalars as text, containers as compact JSON.
    pub fn as_string(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format_float(*v),
            Self::Bool(v) => v.to_string(),
            other => other.to_json().to_string(),
        }
    }

    pub fn as_int_map(&self) -> Option<IndexMap<String, i64>> {
        match self {
            Self::IntMap(m) => Some(m.clone()),
            Self::Histogram(h) => Some(
                h.snapshot()
                    .into_iter()
                    .map(|(k, v)| (k, v as i64))
                    .collect(),
            ),
            Self::StrMap(m) => m
                .iter()
                .map(|(k, v)| v.trim().parse::<i64>().ok().map(|v| (k.clone(), v)))
                .collect(),
            Self::AnyMap(m) => m
                .iter()
                .map(|(k, v)| v.as_int().map(|v| (k.clone(), v)))
                .collect(),
            _ => None,
        }
    }

    pub fn as_string_map(&self) -> Option<IndexMap<String, String>> {
        match self {
            Self::StrMap(m) => Some(m.clone()),
            Self::IntMap(m) => Some(m.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()),
            Self::Histogram(h) => Some(
                h.snapshot()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_string()))
                    .collect(),
            ),
            Self::AnyMap(m) => Some(m.iter().map(|(k, v)| (k.clone(), v.as_string())).collect()),
            _ => None,
        }
    }

    pub fn as_int_slice(&self) -> Option<Vec<i64>> {
        match self {
            Self::IntVec(v) => Some(v.clone()),
            Self::FloatVec(v) => v
                .iter()
                .map(|f| if f.fract() == 0.0 { Some(*f as i64) } else { None })
                .collect(),
            Self::StrVec(v) => v.iter().map(|s| s.trim().parse::<i64>().ok()).collect(),
            Self::AnyVec(v) => v.iter().map(|x| x.as_int()).collect(),
            _ => None,
        }
    }

    /// Converts a JSON value, picking the narrowest annotation kind that holds it.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Str(String::new()),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => json_number(&n),
            Value::String(s) => Self::Str(s),
            Value::Array(items) => {
                if !items.is_empty() && items.iter().all(|v| v.is_i64()) {
                    Self::IntVec(items.iter().filter_map(Value::as_i64).collect())
                } else if !items.is_empty() && items.iter().all(Value::is_number) {
                    Self::FloatVec(items.iter().filter_map(Value::as_f64).collect())
                } else if !items.is_empty() && items.iter().all(Value::is_string) {
                    Self::StrVec(
                        items
                            .into_iter()
                            .filter_map(|v| match v {
                                Value::String(s) => Some(s),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Self::AnyVec(items.into_iter().map(Self::from_json).collect())
                }
            }
            Value::Object(map) => {
                if !map.is_empty() && map.values().all(|v| v.is_i64()) {
                    Self::IntMap(
                        map.iter()
                            .filter_map(|(k, v)| v.as_i64().map(|v| (k.clone(), v)))
                            .collect(),
                    )
                } else if !map.is_empty() && map.values().all(Value::is_string) {
                    Self::StrMap(
                        map.into_iter()
                            .filter_map(|(k, v)| match v {
                                Value::String(s) => Some((k, s)),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Self::AnyMap(
                        map.into_iter()
                            .map(|(k, v)| (k, Self::from_json(v)))
                            .collect(),
                    )
                }
            }
        }
    }

    /// Like [`from_json`](Self::from_json) but restores histograms for `merged_*` keys.
    pub fn from_json_for_key(key: &str, value: Value) -> Self {
        let converted = Self::from_json(value);
        if key.starts_with("merged_") {
            if let Self::IntMap(map) = &converted {
                if map.values().all(|v| *v >= 0) {
                    return Self::Histogram(ValueHistogram::from_counts(
                        map.iter().map(|(k, v)| (k.clone(), *v as u64)),
                    ));
                }
            }
        }
        converted
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(v) => Value::from(*v),
            Self::Float(v) => Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
            Self::Bool(v) => Value::Bool(*v),
            Self::Str(s) => Value::String(s.clone()),
            Self::IntVec(v) => Value::Array(v.iter().map(|x| Value::from(*x)).collect()),
            Self::FloatVec(v) => Value::Array(
                v.iter()
                    .map(|x| Number::from_f64(*x).map(Value::Number).unwrap_or(Value::Null))
                    .collect(),
            ),
            Self::StrVec(v) => Value::Array(v.iter().map(|x| Value::String(x.clone())).collect()),
            Self::AnyVec(v) => Value::Array(v.iter().map(Self::to_json).collect()),
            Self::IntMap(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), Value::from(*v)))
                    .collect::<Map<_, _>>(),
            ),
            Self::StrMap(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect::<Map<_, _>>(),
            ),
            Self::AnyMap(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Self::Histogram(h) => Value::Object(
                h.snapshot()
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

fn json_number(n: &Number) -> AnnotationValue {
    if let Some(i) = n.as_i64() {
        AnnotationValue::Int(i)
    } else if let Some(u) = n.as_u64() {
        AnnotationValue::Float(u as f64)
    } else {
        AnnotationValue::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Renders a float so that it always reads back as a float.
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<i64> for AnnotationValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for AnnotationValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for AnnotationValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for AnnotationValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for AnnotationValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for AnnotationValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<Vec<String>> for AnnotationValue {
    fn from(v: Vec<String>) -> Self {
        Self::StrVec(v)
    }
}

impl From<ValueHistogram> for AnnotationValue {
    fn from(v: ValueHistogram) -> Self {
        Self::Histogram(v)
    }
}

/// Thread-safe map from a discriminant string to an observation count.
///
/// Used for the `merged_*` annotations produced when records are merged.
/// Cloning copies the counts; two clones never share state.
#[derive(Debug, Default)]
pub struct ValueHistogram {
    counts: RwLock<IndexMap<String, u64>>,
}

impl ValueHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let histogram = Self::new();
        {
            let mut map = histogram.counts.write();
            for (key, count) in counts {
                *map.entry(key).or_insert(0) += count;
            }
        }
        histogram
    }

    pub fn increment(&self, key: &str, by: u64) {
        let mut map = self.counts.write();
        *map.entry(key.to_string()).or_insert(0) += by;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts.read().get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.read().is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.read().values().sum()
    }

    pub fn snapshot(&self) -> IndexMap<String, u64> {
        self.counts.read().clone()
    }

    /// Adds every count of `other` into `self`.
    pub fn merge_from(&self, other: &ValueHistogram) {
        if std::ptr::eq(self, other) {
            let doubled: Vec<(String, u64)> = self.snapshot().into_iter().collect();
            let mut map = self.counts.write();
            for (key, count) in doubled {
                *map.entry(key).or_insert(0) += count;
            }
            return;
        }
        let theirs = other.snapshot();
        let mut map = self.counts.write();
        for (key, count) in theirs {
            *map.entry(key).or_insert(0) += count;
        }
    }
}

impl Clone for ValueHistogram {
    fn clone(&self) -> Self {
        Self {
            counts: RwLock::new(self.snapshot()),
        }
    }
}

impl PartialEq for ValueHistogram {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let mine = self.snapshot();
        let theirs = other.snapshot();
        mine.len() == theirs.len() && mine.iter().all(|(k, v)| theirs.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_scalar_coercions() {
        assert_eq!(AnnotationValue::Str(" 12 ".into()).as_int(), Some(12));
        assert_eq!(AnnotationValue::Float(3.7).as_int(), Some(3));
        assert_eq!(AnnotationValue::Int(3).as_float(), Some(3.0));
        assert_eq!(AnnotationValue::Str("T".into()).as_bool(), Some(true));
        assert_eq!(AnnotationValue::Str("maybe".into()).as_bool(), None);
        assert_eq!(AnnotationValue::StrVec(vec![]).as_int(), None);
    }

    #[test]
    fn test_container_coercions() {
        let value = AnnotationValue::from_json(json!({"a": "1", "b": "2"}));
        assert_eq!(value.kind(), "string_map");
        let ints = value.as_int_map().unwrap();
        assert_eq!(ints["b"], 2);

        let value = AnnotationValue::from_json(json!([1.0, 2.0]));
        assert_eq!(value.as_int_slice(), Some(vec![1, 2]));
        let value = AnnotationValue::from_json(json!([1.5, 2.0]));
        assert_eq!(value.as_int_slice(), None);
    }

    #[test]
    fn test_json_kind_detection() {
        assert_eq!(AnnotationValue::from_json(json!(3)).kind(), "int");
        assert_eq!(AnnotationValue::from_json(json!(3.0)).kind(), "float");
        assert_eq!(AnnotationValue::from_json(json!([1, 2])).kind(), "int_vec");
        assert_eq!(AnnotationValue::from_json(json!([1, 2.5])).kind(), "float_vec");
        assert_eq!(AnnotationValue::from_json(json!(["a"])).kind(), "string_vec");
        assert_eq!(AnnotationValue::from_json(json!([1, "a"])).kind(), "vec");
        assert_eq!(AnnotationValue::from_json(json!({"a": 1, "b": "x"})).kind(), "map");
        assert_eq!(
            AnnotationValue::from_json_for_key("merged_sample", json!({"s1": 2})).kind(),
            "histogram"
        );
        assert_eq!(
            AnnotationValue::from_json_for_key("counts", json!({"s1": 2})).kind(),
            "int_map"
        );
    }

    #[test]
    fn test_float_rendering_keeps_kind() {
        let value = AnnotationValue::Float(2.0);
        let text = value.to_json().to_string();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(AnnotationValue::from_json(back), value);
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(0.25), "0.25");
    }

    #[test]
    fn test_histogram_concurrent_increments() {
        let histogram = Arc::new(ValueHistogram::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let h = Arc::clone(&histogram);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        h.increment("x", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(histogram.get("x"), 4000);
    }

    #[test]
    fn test_histogram_merge_and_clone() {
        let a = ValueHistogram::from_counts(vec![("x".to_string(), 2)]);
        let b = ValueHistogram::from_counts(vec![("x".to_string(), 1), ("y".to_string(), 5)]);
        a.merge_from(&b);
        assert_eq!(a.get("x"), 3);
        assert_eq!(a.get("y"), 5);

        let c = a.clone();
        c.increment("x", 10);
        assert_eq!(a.get("x"), 3);
        assert_eq!(a.total(), 8);

        a.merge_from(&a);
        assert_eq!(a.get("y"), 10);
    }
}
