//! Data-driven control mapping for regulatory frameworks.
//!
//! A [`RuleTable`] maps resource type tags to rules. Each rule binds a
//! [`Predicate`] to a (framework, control) pair with a fixed pass outcome and a
//! fixed gap outcome, so evaluating a rule always yields exactly one mapping.

pub mod predicate;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ComplianceError, ComplianceResult};
use crate::evidence::{ControlMapping, MappingStatus, PostureSnapshot};
pub use predicate::Predicate;

/// Rule table compiled into the binary, used when no rules file is configured.
const BUILTIN_RULES: &str = include_str!("../../rules/default_rules.json");

/// Fixed mapping text emitted for one outcome of a rule.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Outcome {
    pub evidence: String,
}

/// One control rule.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlRule {
    /// Rule identifier, unique within its resource type.
    pub id: String,
    pub framework: String,
    pub control: String,
    /// Condition under which the control passes.
    pub when: Predicate,
    pub pass: Outcome,
    pub gap: Outcome,
}

impl ControlRule {
    /// Evaluate this rule. Total: returns exactly one mapping, and a
    /// condition that cannot be decided is a gap.
    pub fn evaluate(&self, snapshot: &PostureSnapshot) -> ControlMapping {
        let (status, outcome) = if self.when.holds(snapshot) {
            (MappingStatus::Pass, &self.pass)
        } else {
            (MappingStatus::Gap, &self.gap)
        };
        ControlMapping {
            framework: self.framework.clone(),
            control: self.control.clone(),
            evidence: outcome.evidence.clone(),
            status,
        }
    }
}

/// Rules grouped by resource type tag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct RuleTable {
    rules: BTreeMap<String, Vec<ControlRule>>,
}

impl RuleTable {
    pub fn new(rules: BTreeMap<String, Vec<ControlRule>>) -> ComplianceResult<Self> {
        let table = Self { rules };
        table.validate()?;
        Ok(table)
    }

    /// The builtin rule table.
    pub fn builtin() -> ComplianceResult<Self> {
        Self::from_json(BUILTIN_RULES)
    }

    pub fn from_json(json: &str) -> ComplianceResult<Self> {
        let rules = serde_json::from_str(json)
            .map_err(|e| ComplianceError::config(format!("invalid rule table: {}", e)))?;
        Self::new(rules)
    }

    pub fn from_path(path: &Path) -> ComplianceResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ComplianceError::config(format!(
                "cannot read rule table '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Rules applicable to `resource_type`; empty when the type is unknown.
    pub fn rules_for(&self, resource_type: &str) -> &[ControlRule] {
        self.rules
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn validate(&self) -> ComplianceResult<()> {
        for (resource_type, rules) in &self.rules {
            let mut seen = HashSet::new();
            for rule in rules {
                if rule.id.is_empty() {
                    return Err(ComplianceError::config(format!(
                        "rule with empty id under '{}'",
                        resource_type
                    )));
                }
                if !seen.insert(rule.id.as_str()) {
                    return Err(ComplianceError::config(format!(
                        "duplicate rule id '{}' under '{}'",
                        rule.id, resource_type
                    )));
                }
                if rule.framework.is_empty() || rule.control.is_empty() {
                    return Err(ComplianceError::config(format!(
                        "rule '{}' must name a framework and a control",
                        rule.id
                    )));
                }
                if rule.when.fields().iter().any(|f| f.is_empty()) {
                    return Err(ComplianceError::config(format!(
                        "rule '{}' references an empty field path",
                        rule.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Evaluates snapshots against a rule table.
#[derive(Debug, Clone)]
pub struct MappingEngine {
    table: RuleTable,
}

impl MappingEngine {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    /// One mapping per applicable rule, in canonical order. Rules are
    /// independent, so evaluation order does not affect the result.
    pub fn evaluate(&self, snapshot: &PostureSnapshot) -> Vec<ControlMapping> {
        let mut mappings: Vec<ControlMapping> = self
            .table
            .rules_for(&snapshot.resource_type)
            .iter()
            .map(|rule| rule.evaluate(snapshot))
            .collect();
        mappings.sort();
        mappings
    }
}
