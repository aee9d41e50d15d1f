//! Predicates over posture snapshot fields.
//!
//! Predicates are data: they are deserialized from the rule table and
//! evaluated generically. Evaluation is three-valued. A leaf over a field that
//! is missing or `null` is unknown, unknown propagates through `not`, and the
//! combinators follow Kleene logic. Only a definite `true` counts as a pass,
//! so absent configuration always resolves to a gap.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evidence::PostureSnapshot;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Predicate {
    /// Field is not an empty object or array.
    Present { field: String },
    /// Field equals `value` exactly.
    Equals { field: String, value: Value },
    /// Field is the boolean `true`.
    IsTrue { field: String },
    /// Every sub-predicate holds. An empty list holds.
    All { of: Vec<Predicate> },
    /// At least one sub-predicate holds. An empty list does not hold.
    Any { of: Vec<Predicate> },
    /// Negation. The negation of unknown is unknown.
    Not { predicate: Box<Predicate> },
}

impl Predicate {
    /// `None` when the outcome depends on a missing or `null` field.
    pub fn eval(&self, snapshot: &PostureSnapshot) -> Option<bool> {
        match self {
            Self::Present { field } => match snapshot.lookup(field)? {
                Value::Object(map) => Some(!map.is_empty()),
                Value::Array(items) => Some(!items.is_empty()),
                _ => Some(true),
            },
            Self::Equals { field, value } => Some(snapshot.lookup(field)? == value),
            Self::IsTrue { field } => Some(matches!(snapshot.lookup(field)?, Value::Bool(true))),
            Self::All { of } => {
                let mut unknown = false;
                for p in of {
                    match p.eval(snapshot) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                (!unknown).then_some(true)
            }
            Self::Any { of } => {
                let mut unknown = false;
                for p in of {
                    match p.eval(snapshot) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                (!unknown).then_some(false)
            }
            Self::Not { predicate } => predicate.eval(snapshot).map(|v| !v),
        }
    }

    /// True only when the predicate definitely holds.
    pub fn holds(&self, snapshot: &PostureSnapshot) -> bool {
        self.eval(snapshot) == Some(true)
    }

    /// Every field path referenced by this predicate.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Present { field } | Self::Equals { field, .. } | Self::IsTrue { field } => {
                vec![field.as_str()]
            }
            Self::All { of } | Self::Any { of } => of.iter().flat_map(|p| p.fields()).collect(),
            Self::Not { predicate } => predicate.fields(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use serde_json::json;

    fn snapshot(facts: Value) -> PostureSnapshot {
        let facts: BTreeMap<String, Value> = serde_json::from_value(facts).unwrap();
        PostureSnapshot {
            resource_type: "aws.s3.bucket.posture".to_string(),
            account: "1".to_string(),
            region: "r".to_string(),
            resource: "b".to_string(),
            captured_at: "2026-02-17T00:00:00Z".to_string(),
            facts,
        }
    }

    #[test]
    fn test_parse_from_json() {
        let p: Predicate = serde_json::from_value(json!({
            "op": "all",
            "of": [
                {"op": "isTrue", "field": "pab.BlockPublicAcls"},
                {"op": "not", "predicate": {"op": "equals", "field": "x", "value": 1}}
            ]
        }))
        .unwrap();
        assert_eq!(p.fields(), vec!["pab.BlockPublicAcls", "x"]);
    }

    fn equals(field: &str, value: Value) -> Predicate {
        Predicate::Equals {
            field: field.to_string(),
            value,
        }
    }

    #[test]
    fn test_present_on_absent_group_is_unknown() {
        let snap = snapshot(json!({"encryption": null}));
        let p = Predicate::Present {
            field: "encryption.ServerSideEncryptionConfiguration".to_string(),
        };
        assert_eq!(p.eval(&snap), None);
        assert!(!p.holds(&snap));
    }

    #[test]
    fn test_present_on_empty_object_is_false() {
        let snap = snapshot(json!({"encryption": {}}));
        let p = Predicate::Present {
            field: "encryption".to_string(),
        };
        assert_eq!(p.eval(&snap), Some(false));
    }

    #[test]
    fn test_is_true_requires_boolean() {
        let snap = snapshot(json!({"pab": {"a": true, "b": "true", "c": false}}));
        let t = |f: &str| Predicate::IsTrue {
            field: format!("pab.{}", f),
        };
        assert_eq!(t("a").eval(&snap), Some(true));
        assert_eq!(t("b").eval(&snap), Some(false));
        assert_eq!(t("c").eval(&snap), Some(false));
        assert_eq!(t("missing").eval(&snap), None);
    }

    #[test]
    fn test_combinators() {
        let snap = snapshot(json!({"x": 1}));
        let yes = equals("x", json!(1));
        let no = equals("x", json!(2));
        assert_eq!(Predicate::All { of: vec![] }.eval(&snap), Some(true));
        assert_eq!(Predicate::Any { of: vec![] }.eval(&snap), Some(false));
        assert_eq!(
            Predicate::Any {
                of: vec![no.clone(), yes.clone()]
            }
            .eval(&snap),
            Some(true)
        );
        assert_eq!(
            Predicate::All {
                of: vec![no.clone(), yes]
            }
            .eval(&snap),
            Some(false)
        );
        assert_eq!(
            Predicate::Not {
                predicate: Box::new(no)
            }
            .eval(&snap),
            Some(true)
        );
    }

    #[test]
    fn test_negated_equals_over_null_group_never_holds() {
        let p = Predicate::Not {
            predicate: Box::new(equals("acl.Grant", json!("public-read"))),
        };
        for facts in [json!({"acl": null}), json!({}), json!({"acl": {}})] {
            let snap = snapshot(facts);
            assert_eq!(p.eval(&snap), None);
            assert!(!p.holds(&snap));
        }

        let private = snapshot(json!({"acl": {"Grant": "private"}}));
        assert!(p.holds(&private));
        let public = snapshot(json!({"acl": {"Grant": "public-read"}}));
        assert!(!p.holds(&public));
    }

    #[test]
    fn test_unknown_propagates_through_combinators() {
        let snap = snapshot(json!({"x": 1}));
        let yes = equals("x", json!(1));
        let no = equals("x", json!(2));
        let unknown = equals("missing", json!(1));

        let all = |of: Vec<Predicate>| Predicate::All { of }.eval(&snap);
        let any = |of: Vec<Predicate>| Predicate::Any { of }.eval(&snap);

        assert_eq!(all(vec![yes.clone(), unknown.clone()]), None);
        assert_eq!(all(vec![unknown.clone(), no.clone()]), Some(false));
        assert_eq!(any(vec![no.clone(), unknown.clone()]), None);
        assert_eq!(any(vec![unknown.clone(), yes]), Some(true));

        let negated_all = Predicate::Not {
            predicate: Box::new(Predicate::All {
                of: vec![no, unknown],
            }),
        };
        assert_eq!(negated_all.eval(&snap), Some(true));
    }
}
