//! History-derived escalation heuristics
//!
//! Analyzes a user's recent ticket history (escalation rate, recurring issue
//! categories) and turns it into a threshold adjustment for the routing
//! policy. Users whose recent tickets repeatedly needed a human get a
//! stricter confidence bar for automatic resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::policy::PolicyConfig;
use crate::memory::HistoryEntry;
use crate::state::{Category, ResolutionStatus};

/// Pattern analysis over the entries fetched for one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryInsight {
    /// Entries analyzed
    pub total_tickets: usize,
    /// Escalated entries among them
    pub escalations: usize,
    /// Escalated entries within the most recent window
    pub recent_escalations: usize,
    /// escalations / total_tickets (0 when there is no history)
    pub escalation_rate: f64,
    /// Categories seen more than once, in category order
    pub recurring_categories: Vec<Category>,
    pub most_common_category: Option<Category>,
}

impl HistoryInsight {
    /// Analyze entries ordered newest first.
    ///
    /// `window` bounds how many of the newest entries count towards
    /// `recent_escalations`.
    pub fn analyze<'a, I>(entries: I, window: usize) -> Self
    where
        I: IntoIterator<Item = &'a HistoryEntry>,
    {
        let mut total = 0usize;
        let mut escalations = 0usize;
        let mut recent_escalations = 0usize;
        let mut counts: BTreeMap<Category, usize> = BTreeMap::new();

        for (i, entry) in entries.into_iter().enumerate() {
            total += 1;
            if entry.status == ResolutionStatus::Escalated {
                escalations += 1;
                if i < window {
                    recent_escalations += 1;
                }
            }
            if let Some(category) = entry.category {
                *counts.entry(category).or_insert(0) += 1;
            }
        }

        let recurring_categories = counts
            .iter()
            .filter(|(_, n)| **n > 1)
            .map(|(c, _)| *c)
            .collect();
        // Ties resolve to the first category in declaration order
        let most_common_category = counts
            .iter()
            .fold(None::<(Category, usize)>, |best, (c, n)| match best {
                Some((_, best_n)) if best_n >= *n => best,
                _ => Some((*c, *n)),
            })
            .map(|(c, _)| c);

        Self {
            total_tickets: total,
            escalations,
            recent_escalations,
            escalation_rate: if total == 0 {
                0.0
            } else {
                escalations as f64 / total as f64
            },
            recurring_categories,
            most_common_category,
        }
    }

    pub fn has_history(&self) -> bool {
        self.total_tickets > 0
    }

    pub fn has_recurring_issue(&self) -> bool {
        !self.recurring_categories.is_empty()
    }

    /// Amount added to the confidence threshold for this user
    pub fn threshold_penalty(&self, config: &PolicyConfig) -> f64 {
        if self.recent_escalations >= config.repeat_escalation_min {
            config.repeat_escalation_penalty
        } else {
            0.0
        }
    }

    /// Effective confidence threshold, capped at 1.0
    pub fn effective_threshold(&self, config: &PolicyConfig) -> f64 {
        (config.confidence_threshold + self.threshold_penalty(config)).min(1.0)
    }

    /// System note summarizing the history for the message log
    pub fn context_note(&self) -> Option<String> {
        if !self.has_history() {
            return None;
        }
        let mut parts = vec![format!(
            "User history: {} previous ticket(s), {} escalated",
            self.total_tickets, self.escalations
        )];
        if let Some(category) = self.most_common_category {
            parts.push(format!("most common issue: {}", category));
        }
        if self.has_recurring_issue() {
            let names: Vec<String> = self
                .recurring_categories
                .iter()
                .map(|c| c.to_string())
                .collect();
            parts.push(format!("recurring issue: {}", names.join(", ")));
        }
        Some(parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, status: ResolutionStatus, category: Option<Category>) -> HistoryEntry {
        HistoryEntry {
            ticket_id: id.to_string(),
            session_id: format!("s-{}", id),
            status,
            category,
            escalation_reason: None,
            summary: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_empty_history() {
        let insight = HistoryInsight::analyze(std::iter::empty(), 5);
        assert!(!insight.has_history());
        assert_eq!(insight.escalation_rate, 0.0);
        assert!(insight.context_note().is_none());
        assert_eq!(insight.effective_threshold(&PolicyConfig::default()), 0.5);
    }

    #[test]
    fn test_recurring_issue_and_rate() {
        let entries = vec![
            entry("3", ResolutionStatus::Escalated, Some(Category::Billing)),
            entry("2", ResolutionStatus::Resolved, Some(Category::Technical)),
            entry("1", ResolutionStatus::Escalated, Some(Category::Billing)),
            entry("0", ResolutionStatus::Resolved, None),
        ];
        let insight = HistoryInsight::analyze(&entries, 5);
        assert_eq!(insight.total_tickets, 4);
        assert_eq!(insight.escalations, 2);
        assert_eq!(insight.escalation_rate, 0.5);
        assert_eq!(insight.recurring_categories, vec![Category::Billing]);
        assert_eq!(insight.most_common_category, Some(Category::Billing));
        let note = insight.context_note().unwrap();
        assert!(note.contains("recurring issue: billing"), "{note}");
    }

    #[test]
    fn test_repeat_escalations_raise_threshold() {
        let config = PolicyConfig::default();
        let entries = vec![
            entry("2", ResolutionStatus::Escalated, None),
            entry("1", ResolutionStatus::Escalated, None),
        ];
        let insight = HistoryInsight::analyze(&entries, 5);
        assert!((insight.effective_threshold(&config) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_old_escalations_outside_window_ignored() {
        let config = PolicyConfig::default();
        let entries = vec![
            entry("3", ResolutionStatus::Resolved, None),
            entry("2", ResolutionStatus::Escalated, None),
            entry("1", ResolutionStatus::Escalated, None),
        ];
        let insight = HistoryInsight::analyze(&entries, 2);
        assert_eq!(insight.recent_escalations, 1);
        assert_eq!(insight.threshold_penalty(&config), 0.0);
    }

    #[test]
    fn test_threshold_capped() {
        let config = PolicyConfig {
            confidence_threshold: 0.95,
            ..PolicyConfig::default()
        };
        let entries = vec![
            entry("2", ResolutionStatus::Escalated, None),
            entry("1", ResolutionStatus::Escalated, None),
        ];
        let insight = HistoryInsight::analyze(&entries, 5);
        assert_eq!(insight.effective_threshold(&config), 1.0);
    }
}
