use crate::eval::Attributes;
use crate::model::{Condition, Operator, Rule};

impl Rule {
    pub(crate) fn matches(&self, attributes: &Attributes) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.matches(attributes))
    }
}

impl Condition {
    /// Whether the condition holds for the given attributes.
    ///
    /// An absent variable fails the condition for every operator. Misconfigured conditions (wrong
    /// arity, unparsable threshold, unknown operator) fail rather than raise.
    fn matches(&self, attributes: &Attributes) -> bool {
        let Some(val) = attributes.get(&self.variable) else {
            return false;
        };

        match &self.operator {
            Operator::Equals => self
                .values
                .first()
                .is_some_and(|expected| val == expected),
            Operator::NotEquals => self
                .values
                .first()
                .is_some_and(|expected| val != expected),
            Operator::In => self.values.iter().any(|v| v == val),
            Operator::NotIn => !self.values.iter().any(|v| v == val),
            Operator::Contains => self
                .values
                .first()
                .is_some_and(|needle| val.contains(needle.as_str())),
            Operator::GreaterThan => {
                self.values.len() == 1 && compare(val, &self.values[0]).is_gt()
            }
            Operator::LessThan => {
                self.values.len() == 1 && compare(val, &self.values[0]).is_lt()
            }
            Operator::Split => {
                let Some(threshold) = self.values.first().and_then(|v| v.parse::<i64>().ok())
                else {
                    return false;
                };
                i64::from(bucket(val)) < threshold
            }
            Operator::Unknown(_) => false,
        }
    }
}

/// Compare two attribute values: numerically when both parse as IEEE-754 doubles, byte-wise
/// lexicographically otherwise.
fn compare(a: &str, b: &str) -> std::cmp::Ordering {
    if let (Ok(x), Ok(y)) = (a.parse::<f64>(), b.parse::<f64>()) {
        if let Some(ordering) = x.partial_cmp(&y) {
            return ordering;
        }
    }
    a.cmp(b)
}

/// Traffic-split bucket assignment: FNV-1a 32-bit over the UTF-8 bytes of `key`, reduced modulo
/// 100. Byte-stable across releases; changing it reshuffles every SPLIT rollout.
pub(crate) fn bucket(key: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x01000193;

    let mut hash = OFFSET_BASIS;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash % 100
}
