//! Dense typed column buffers.

use tracesql_core::SqlValue;

/// The raw values of a column, immutable for the life of a query. Nulls are
/// never stored here; they live in a `NullOverlay` above.
pub enum Storage {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl Storage {
    pub fn len(&self) -> u32 {
        match self {
            Storage::Int(v) => v.len() as u32,
            Storage::Float(v) => v.len() as u32,
            Storage::Text(v) => v.len() as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: u32) -> SqlValue {
        match self {
            Storage::Int(v) => SqlValue::Integer(v[idx as usize]),
            Storage::Float(v) => SqlValue::Float(v[idx as usize]),
            Storage::Text(v) => SqlValue::Text(v[idx as usize].clone()),
        }
    }

    /// Whether the buffer is non-decreasing, which is what the bounds
    /// strategy needs for binary narrowing.
    pub fn is_sorted(&self) -> bool {
        match self {
            Storage::Int(v) => v.windows(2).all(|w| w[0] <= w[1]),
            Storage::Float(v) => v.windows(2).all(|w| w[0] <= w[1]),
            Storage::Text(v) => v.windows(2).all(|w| w[0] <= w[1]),
        }
    }

    /// First index whose value is >= `value`, or `None` if `value` is not
    /// comparable with this storage's type. Requires sorted storage.
    pub fn lower_bound(&self, value: &SqlValue) -> Option<u32> {
        match self {
            Storage::Int(v) => {
                let needle = value.as_f64()?;
                Some(v.partition_point(|&x| (x as f64) < needle) as u32)
            }
            Storage::Float(v) => {
                let needle = value.as_f64()?;
                Some(v.partition_point(|&x| x < needle) as u32)
            }
            Storage::Text(v) => {
                let needle = value.as_str()?;
                Some(v.partition_point(|x| x.as_str() < needle) as u32)
            }
        }
    }

    /// First index whose value is > `value`; see `lower_bound`.
    pub fn upper_bound(&self, value: &SqlValue) -> Option<u32> {
        match self {
            Storage::Int(v) => {
                let needle = value.as_f64()?;
                Some(v.partition_point(|&x| (x as f64) <= needle) as u32)
            }
            Storage::Float(v) => {
                let needle = value.as_f64()?;
                Some(v.partition_point(|&x| x <= needle) as u32)
            }
            Storage::Text(v) => {
                let needle = value.as_str()?;
                Some(v.partition_point(|x| x.as_str() <= needle) as u32)
            }
        }
    }
}
