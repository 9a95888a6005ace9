//! Reward rule table
//!
//! Each rule line reads `hours:type:value`. The line's position in the
//! configured list is its identity: grants are recorded against that index,
//! so malformed lines still occupy their slot and never shift later rules.

use playtime_api::{RewardKind, UnknownRewardKind};
use std::fmt;
use thiserror::Error;

/// A well-formed reward rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardRule {
    /// Position in the configured rule list
    pub index: usize,
    /// Whole hours of playtime required
    pub threshold_hours: u64,
    /// Reward type as written; resolved at grant time
    pub kind: String,
    /// Group name, permission node or console command
    pub payload: String,
}

impl RewardRule {
    /// Resolve the written type against the known reward kinds
    pub fn reward_kind(&self) -> Result<RewardKind, UnknownRewardKind> {
        self.kind.parse()
    }

    /// Whether a total of `hours` whole hours reaches this rule
    pub fn is_reached(&self, hours: u64) -> bool {
        hours >= self.threshold_hours
    }
}

impl fmt::Display for RewardRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.threshold_hours, self.kind, self.payload)
    }
}

/// Why a rule line cannot be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleProblem {
    #[error("expected 'hours:type:value'")]
    TooFewParts,

    #[error("invalid hours '{0}'")]
    InvalidThreshold(String),

    #[error("unknown reward type '{0}'")]
    UnknownKind(String),
}

/// A problem found in a rule line, keyed by its position
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Reward rule #{index} '{line}': {problem}")]
pub struct RuleIssue {
    pub index: usize,
    pub line: String,
    pub problem: RuleProblem,
}

/// Parse one rule line. The type is kept verbatim; only the structure and
/// threshold are checked here.
pub fn parse_rule(index: usize, line: &str) -> Result<RewardRule, RuleProblem> {
    let mut parts = line.splitn(3, ':');
    let (Some(hours), Some(kind), Some(payload)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(RuleProblem::TooFewParts);
    };

    let threshold_hours = hours
        .parse::<u64>()
        .map_err(|_| RuleProblem::InvalidThreshold(hours.to_string()))?;

    Ok(RewardRule {
        index,
        threshold_hours,
        kind: kind.to_string(),
        payload: payload.to_string(),
    })
}

/// Ordered rule slots. Unusable lines are `None` but keep their position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    slots: Vec<Option<RewardRule>>,
}

impl RuleTable {
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let slots = lines
            .iter()
            .enumerate()
            .map(|(index, line)| parse_rule(index, line.as_ref()).ok())
            .collect();
        Self { slots }
    }

    /// Number of configured lines, usable or not
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of lines that parsed into a rule
    pub fn rule_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn get(&self, index: usize) -> Option<&RewardRule> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Usable rules in configured order
    pub fn rules(&self) -> impl Iterator<Item = &RewardRule> {
        self.slots.iter().flatten()
    }

    /// Rules reached at `hours` whole hours, in configured order
    pub fn reached(&self, hours: u64) -> impl Iterator<Item = &RewardRule> {
        self.rules().filter(move |rule| rule.is_reached(hours))
    }
}

/// Report every rule line that will be skipped or ignored at grant time
pub fn lint_rules<S: AsRef<str>>(lines: &[S]) -> Vec<RuleIssue> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.as_ref();
            let problem = match parse_rule(index, line) {
                Err(problem) => problem,
                Ok(rule) => match rule.reward_kind() {
                    Ok(_) => return None,
                    Err(UnknownRewardKind(kind)) => RuleProblem::UnknownKind(kind),
                },
            };
            Some(RuleIssue {
                index,
                line: line.to_string(),
                problem,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_rule() {
        let rule = parse_rule(0, "24:group:apprentice").unwrap();
        assert_eq!(rule.threshold_hours, 24);
        assert_eq!(rule.kind, "group");
        assert_eq!(rule.payload, "apprentice");
        assert_eq!(rule.reward_kind().unwrap(), RewardKind::Group);
    }

    #[test]
    fn test_payload_keeps_extra_colons() {
        let rule = parse_rule(3, "1:command:say hi: %player%").unwrap();
        assert_eq!(rule.payload, "say hi: %player%");
        assert_eq!(rule.to_string(), "1:command:say hi: %player%");
    }

    #[test]
    fn test_rejects_malformed_lines() {
        assert_eq!(parse_rule(0, "24:group"), Err(RuleProblem::TooFewParts));
        assert_eq!(parse_rule(0, ""), Err(RuleProblem::TooFewParts));
        assert_eq!(
            parse_rule(0, "abc:group:x"),
            Err(RuleProblem::InvalidThreshold("abc".into()))
        );
        assert_eq!(
            parse_rule(0, "-1:group:x"),
            Err(RuleProblem::InvalidThreshold("-1".into()))
        );
    }

    #[test]
    fn test_unknown_kind_parses_but_does_not_resolve() {
        let rule = parse_rule(0, "5:title:champion").unwrap();
        assert!(rule.reward_kind().is_err());
    }

    #[test]
    fn test_skipped_lines_keep_positions() {
        let table = RuleTable::parse(&["bogus", "2:group:a", "x:group:b", "4:permission:p"]);
        assert_eq!(table.len(), 4);
        assert_eq!(table.rule_count(), 2);
        assert!(table.get(0).is_none());
        assert_eq!(table.get(1).unwrap().payload, "a");
        assert!(table.get(2).is_none());
        assert_eq!(table.get(3).unwrap().index, 3);
    }

    #[test]
    fn test_reached_filters_by_whole_hours() {
        let table = RuleTable::parse(&["1:command:c", "24:group:a", "168:group:b"]);
        let reached: Vec<usize> = table.reached(24).map(|r| r.index).collect();
        assert_eq!(reached, vec![0, 1]);
        assert_eq!(table.reached(0).count(), 0);
    }

    #[test]
    fn test_zero_hour_rule_is_reached_immediately() {
        let table = RuleTable::parse(&["0:group:newcomer"]);
        assert_eq!(table.reached(0).count(), 1);
    }

    #[test]
    fn test_lint_reports_each_problem() {
        let issues = lint_rules(&["1:group:a", "nope", "x:group:b", "2:title:c"]);
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].index, 1);
        assert_eq!(issues[0].problem, RuleProblem::TooFewParts);
        assert_eq!(issues[1].problem, RuleProblem::InvalidThreshold("x".into()));
        assert_eq!(issues[2].problem, RuleProblem::UnknownKind("title".into()));
    }
}
