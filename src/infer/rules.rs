//! Data-driven two-hop composition rules.
//!
//! Rules are structs, not code: they can be loaded from JSON or TOML, or
//! constructed programmatically via [`RuleSet::builtin()`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InferError;

use super::InferResult;

// ---------------------------------------------------------------------------
// Inference rule
// ---------------------------------------------------------------------------

/// A composition rule: a `T1` edge followed by a `T2` edge implies a
/// `conclusion` edge between the outer endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Relation types of the first and second hop, in path order.
    pub premises: [String; 2],
    pub conclusion: String,
    /// Multiplied into the product of the two hop confidences. In (0, 1].
    pub confidence_factor: f64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl InferenceRule {
    /// Create an active rule stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        premises: [&str; 2],
        conclusion: impl Into<String>,
        confidence_factor: f64,
    ) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            premises: premises.map(str::to_string),
            conclusion: conclusion.into(),
            confidence_factor,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> InferResult<()> {
        let invalid = |message: &str| InferError::InvalidRule {
            rule_id: self.id.clone(),
            message: message.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id is empty"));
        }
        if self.premises.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("premise types must be non-empty"));
        }
        if self.conclusion.trim().is_empty() {
            return Err(invalid("conclusion type is empty"));
        }
        if !(self.confidence_factor > 0.0 && self.confidence_factor <= 1.0) {
            return Err(invalid(&format!(
                "confidence factor {} is outside (0, 1]",
                self.confidence_factor
            )));
        }
        Ok(())
    }

    /// `T1 ∘ T2 ⟹ conclusion (×factor)`
    pub fn summary(&self) -> String {
        format!(
            "{} ∘ {} ⟹ {} (×{})",
            self.premises[0], self.premises[1], self.conclusion, self.confidence_factor
        )
    }
}

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

/// An ordered collection of rules with unique ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<InferenceRule>,
}

/// Shape of a TOML rule file: `[[rules]]` tables.
#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<InferenceRule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// The default composition rules (6 rules).
    pub fn builtin() -> Self {
        let rules = vec![
            InferenceRule::new("transitive-is-a", ["is_a", "is_a"], "is_a", 0.9)
                .with_name("Transitive is-a")
                .with_description("A is a B and B is a C, so A is a C"),
            InferenceRule::new("transitive-part-of", ["part_of", "part_of"], "part_of", 0.9)
                .with_name("Transitive part-of")
                .with_description("A is part of B and B is part of C, so A is part of C"),
            InferenceRule::new("cause-effect-chain", ["causes", "causes"], "causes", 0.8)
                .with_name("Cause-effect chain")
                .with_description("A causes B and B causes C, so A causes C"),
            InferenceRule::new("dependency-chain", ["depends_on", "depends_on"], "depends_on", 0.8)
                .with_name("Dependency chain")
                .with_description("A depends on B and B depends on C, so A depends on C"),
            InferenceRule::new("location-containment", ["located_in", "contains"], "located_in", 0.85)
                .with_name("Location containment")
                .with_description("A is located in B and B contains C, so A is located in C"),
            InferenceRule::new(
                "temporal-sequence",
                ["happens_before", "happens_before"],
                "happens_before",
                0.9,
            )
            .with_name("Temporal sequence")
            .with_description("A happens before B and B before C, so A happens before C"),
        ];
        Self {
            name: "builtin".into(),
            rules,
        }
    }

    /// Parse a JSON array of rules. Every rule is validated and ids must be unique.
    pub fn from_json(json: &str, source: &str) -> InferResult<Self> {
        let rules: Vec<InferenceRule> =
            serde_json::from_str(json).map_err(|e| InferError::RuleParse {
                source_name: source.to_string(),
                message: format!("JSON parse error: {e}"),
            })?;
        Self::from_rules(source, rules)
    }

    /// Parse a TOML document with a `[[rules]]` table array.
    pub fn from_toml(text: &str, source: &str) -> InferResult<Self> {
        let file: RuleFile = toml::from_str(text).map_err(|e| InferError::RuleParse {
            source_name: source.to_string(),
            message: format!("TOML parse error: {e}"),
        })?;
        Self::from_rules(source, file.rules)
    }

    fn from_rules(source: &str, rules: Vec<InferenceRule>) -> InferResult<Self> {
        let mut set = Self::new(source);
        for rule in rules {
            set.add_rule(rule)?;
        }
        Ok(set)
    }

    /// Register a rule after validation. Duplicate ids are rejected.
    pub fn add_rule(&mut self, rule: InferenceRule) -> InferResult<()> {
        rule.validate()?;
        if self.rule(&rule.id).is_some() {
            return Err(InferError::DuplicateRule { rule_id: rule.id });
        }
        tracing::debug!(rule_id = %rule.id, rule = %rule.summary(), "rule registered");
        self.rules.push(rule);
        Ok(())
    }

    /// Remove a rule by id, returning it.
    pub fn remove_rule(&mut self, rule_id: &str) -> InferResult<InferenceRule> {
        let pos = self
            .rules
            .iter()
            .position(|r| r.id == rule_id)
            .ok_or_else(|| InferError::UnknownRule { rule_id: rule_id.to_string() })?;
        Ok(self.rules.remove(pos))
    }

    /// Enable or disable a rule, bumping its `updated_at`.
    pub fn set_active(&mut self, rule_id: &str, active: bool) -> InferResult<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| InferError::UnknownRule { rule_id: rule_id.to_string() })?;
        rule.active = active;
        rule.updated_at = Utc::now();
        Ok(())
    }

    pub fn rule(&self, rule_id: &str) -> Option<&InferenceRule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }

    pub fn rules(&self) -> &[InferenceRule] {
        &self.rules
    }

    /// Active rules in registration order.
    pub fn active(&self) -> impl Iterator<Item = &InferenceRule> {
        self.rules.iter().filter(|r| r.active)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_six_valid_rules() {
        let set = RuleSet::builtin();
        assert_eq!(set.len(), 6);
        for rule in set.rules() {
            rule.validate().unwrap();
        }
        let loc = set.rule("location-containment").unwrap();
        assert_eq!(loc.premises, ["located_in".to_string(), "contains".to_string()]);
        assert!((loc.confidence_factor - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn add_rule_rejects_bad_factor_and_duplicates() {
        let mut set = RuleSet::builtin();
        let err = set
            .add_rule(InferenceRule::new("zero", ["a", "b"], "c", 0.0))
            .unwrap_err();
        assert!(matches!(err, InferError::InvalidRule { .. }));
        let err = set
            .add_rule(InferenceRule::new("big", ["a", "b"], "c", 1.01))
            .unwrap_err();
        assert!(matches!(err, InferError::InvalidRule { .. }));
        let err = set
            .add_rule(InferenceRule::new("transitive-is-a", ["a", "b"], "c", 0.5))
            .unwrap_err();
        assert!(matches!(err, InferError::DuplicateRule { .. }));
        let err = set
            .add_rule(InferenceRule::new("empty", ["a", ""], "c", 0.5))
            .unwrap_err();
        assert!(matches!(err, InferError::InvalidRule { .. }));
    }

    #[test]
    fn remove_and_toggle() {
        let mut set = RuleSet::builtin();
        set.set_active("cause-effect-chain", false).unwrap();
        assert_eq!(set.active().count(), 5);
        let removed = set.remove_rule("cause-effect-chain").unwrap();
        assert_eq!(removed.conclusion, "causes");
        assert_eq!(set.len(), 5);
        assert!(matches!(
            set.remove_rule("cause-effect-chain"),
            Err(InferError::UnknownRule { .. })
        ));
    }

    #[test]
    fn json_rules_parse_with_defaults() {
        let json = r#"[
            {"id": "works-in", "name": "Works in", "premises": ["works_at", "located_in"],
             "conclusion": "works_in", "confidence_factor": 0.7}
        ]"#;
        let set = RuleSet::from_json(json, "custom.json").unwrap();
        assert_eq!(set.name, "custom.json");
        let rule = set.rule("works-in").unwrap();
        assert!(rule.active);
        assert_eq!(rule.premises[1], "located_in");
    }

    #[test]
    fn json_with_three_premises_is_rejected() {
        let json = r#"[{"id": "x", "name": "x", "premises": ["a", "b", "c"],
                        "conclusion": "d", "confidence_factor": 0.5}]"#;
        assert!(matches!(
            RuleSet::from_json(json, "bad.json"),
            Err(InferError::RuleParse { .. })
        ));
    }

    #[test]
    fn toml_rules_parse_and_validate() {
        let text = r#"
            [[rules]]
            id = "owns-part"
            name = "Owns part"
            premises = ["owns", "has_part"]
            conclusion = "owns"
            confidence_factor = 0.6
            active = false
        "#;
        let set = RuleSet::from_toml(text, "rules.toml").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.active().count(), 0);

        let bad = text.replace("0.6", "1.5");
        assert!(matches!(
            RuleSet::from_toml(&bad, "rules.toml"),
            Err(InferError::InvalidRule { .. })
        ));
    }
}
