// 🏷️ Classification Rules - Rules as Data
// Marker rules deciding which kind of transaction an SMS describes

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::record::TransactionCategory;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Category assigned when every marker is present
    pub category: TransactionCategory,

    /// Substrings that must all appear in the body (case-sensitive)
    pub markers: Vec<String>,

    /// Priority (higher = tested first)
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    0
}

impl ClassificationRule {
    pub fn new(category: TransactionCategory, markers: &[&str], priority: i32) -> Self {
        ClassificationRule {
            category,
            markers: markers.iter().map(|m| m.to_string()).collect(),
            priority,
        }
    }

    /// Check if every marker occurs in the text
    pub fn matches(&self, text: &str) -> bool {
        !self.markers.is_empty() && self.markers.iter().all(|m| text.contains(m.as_str()))
    }
}

/// Built-in rules. "received" must win over "withdrawn" since both
/// categories share the "RWF from" marker.
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(TransactionCategory::Incoming, &["received", "RWF from"], 50),
        ClassificationRule::new(TransactionCategory::Payment, &["Your payment of", "RWF to"], 40),
        ClassificationRule::new(TransactionCategory::Transfer, &["RWF transferred to"], 30),
        ClassificationRule::new(
            TransactionCategory::BankDeposit,
            &["bank deposit of", "RWF has been added"],
            20,
        ),
        ClassificationRule::new(TransactionCategory::Withdrawal, &["withdrawn", "RWF from"], 10),
    ]
}

// ============================================================================
// CLASSIFIER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Classifier {
    /// Classifier with no rules: everything is Other
    pub fn empty() -> Self {
        Classifier { rules: Vec::new() }
    }

    /// Built-in rules plus the extra rules stored in a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let extra: Vec<ClassificationRule> =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        let mut classifier = Classifier::default();
        for rule in extra {
            classifier.add_rule(rule);
        }
        Ok(classifier)
    }

    /// Create classifier from a list of rules
    pub fn from_rules(mut rules: Vec<ClassificationRule>) -> Self {
        // Stable sort: equal priorities keep their order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Classifier { rules }
    }

    pub fn add_rule(&mut self, rule: ClassificationRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// First matching rule wins
    pub fn classify(&self, body: &str) -> TransactionCategory {
        self.rules
            .iter()
            .find(|rule| rule.matches(body))
            .map(|rule| rule.category)
            .unwrap_or(TransactionCategory::Other)
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_rules(default_rules())
    }
}

/// Classify with the built-in rules
pub fn classify(body: &str) -> TransactionCategory {
    Classifier::default().classify(body)
}

// ============================================================================
// TESTS
// ============================================================================
