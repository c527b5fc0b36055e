use std::cmp::Ordering;

use crate::tuple::{compare_encoded, AttrType};

/// Comparison operator of a single-attribute scan predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    /// Matches every record, nulls included.
    NoOp,
}

impl CompOp {
    /// Evaluates `field op value`. A null field only satisfies `NoOp`.
    pub fn evaluate(&self, attr_type: AttrType, field: Option<&[u8]>, value: &[u8]) -> bool {
        if *self == CompOp::NoOp {
            return true;
        }
        let Some(field) = field else {
            return false;
        };
        let Some(ordering) = compare_encoded(attr_type, field, value) else {
            return false;
        };

        match self {
            CompOp::Eq => ordering == Ordering::Equal,
            CompOp::Lt => ordering == Ordering::Less,
            CompOp::Le => ordering != Ordering::Greater,
            CompOp::Gt => ordering == Ordering::Greater,
            CompOp::Ge => ordering != Ordering::Less,
            CompOp::Ne => ordering != Ordering::Equal,
            CompOp::NoOp => true,
        }
    }
}

/// A single-attribute comparison applied during a record scan.
/// `value` uses the same encoding as a stored field of that attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCondition {
    pub attribute: String,
    pub op: CompOp,
    pub value: Vec<u8>,
}

impl ScanCondition {
    pub fn new(attribute: impl Into<String>, op: CompOp, value: Vec<u8>) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    #[test]
    fn test_int_comparisons() {
        let five = int(5);
        let cases = [
            (CompOp::Eq, 5, true),
            (CompOp::Eq, 4, false),
            (CompOp::Lt, 4, true),
            (CompOp::Lt, 5, false),
            (CompOp::Le, 5, true),
            (CompOp::Gt, 6, true),
            (CompOp::Ge, 4, false),
            (CompOp::Ne, 4, true),
        ];

        for (op, field, expected) in cases {
            assert_eq!(
                op.evaluate(AttrType::Int, Some(&int(field)[..]), &five),
                expected,
                "{} {:?} 5",
                field,
                op
            );
        }
    }

    #[test]
    fn test_null_field() {
        assert!(!CompOp::Eq.evaluate(AttrType::Int, None, &int(0)));
        assert!(!CompOp::Ne.evaluate(AttrType::Int, None, &int(0)));
        assert!(CompOp::NoOp.evaluate(AttrType::Int, None, &[]));
    }

    #[test]
    fn test_varchar_comparison() {
        let enc = |s: &str| {
            let mut v = (s.len() as u32).to_le_bytes().to_vec();
            v.extend_from_slice(s.as_bytes());
            v
        };
        assert!(CompOp::Lt.evaluate(AttrType::VarChar, Some(&enc("apple")[..]), &enc("banana")));
        assert!(CompOp::Eq.evaluate(AttrType::VarChar, Some(&enc("kiwi")[..]), &enc("kiwi")));
    }
}
