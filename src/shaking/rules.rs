//! Structured keep/retention rules.
//!
//! Rule parsing is an external collaborator; the pipeline consumes rules in
//! structured form. A rule pairs a class pattern (exact descriptor, or a
//! `*`/`**` glob) with an optional member pattern and an action: keep with a
//! set of constraints, or demand removal (`CheckDiscard`). Rules whose keep
//! constraints include presence are the tree shaker's roots; the closed
//! program assumption means these are the only entry points.

use bitflags::bitflags;

bitflags! {
    /// Retention constraints a keep rule can demand for a symbol.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeepConstraints: u8 {
        /// The symbol keeps its name.
        const IDENTITY = 0x01;
        /// The symbol is retained in the output.
        const PRESENCE = 0x02;
        /// The symbol keeps its signature shape.
        const PROTOTYPE = 0x04;
        /// The symbol must not be merged with others.
        const NO_MERGE = 0x08;
        /// The symbol must not be inlined away.
        const NO_INLINE = 0x10;
    }
}

impl KeepConstraints {
    /// The full pin: identity, presence, and prototype.
    #[must_use]
    pub fn pinned() -> Self {
        KeepConstraints::IDENTITY | KeepConstraints::PRESENCE | KeepConstraints::PROTOTYPE
    }

    /// Returns `true` when identity, presence, and prototype are all pinned.
    #[must_use]
    pub fn is_pinned(self) -> bool {
        self.contains(KeepConstraints::pinned())
    }
}

/// Action a rule demands for matched symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Retain with the given constraints.
    Keep(KeepConstraints),
    /// Demand the symbol be absent from the output.
    CheckDiscard,
}

/// Pattern over member names within a matched class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPattern {
    /// Member name, or `*` for all members.
    pub name: String,
}

impl MemberPattern {
    /// Matches a member name against the pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.name == "*" || self.name == name
    }
}

/// One keep-rule statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepRule {
    /// Class descriptor pattern: exact, trailing `*` (single package level),
    /// or trailing `**` (any suffix). The bare `**` matches everything.
    pub class_pattern: String,
    /// Member pattern; absent means the rule binds the class itself.
    pub member: Option<MemberPattern>,
    /// What the rule demands.
    pub action: RuleAction,
}

/// The active rule set: keep rules plus `dontWarn` suppression patterns.
#[derive(Debug, Clone, Default)]
pub struct KeepRules {
    rules: Vec<KeepRule>,
    dont_warn: Vec<String>,
}

impl KeepRules {
    /// An empty rule set: no roots, nothing suppressed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A rule set pinning every class and member.
    ///
    /// Used for pass-through compilations: no renames, no merges, no removal.
    #[must_use]
    pub fn keep_all() -> Self {
        let mut rules = Self::new();
        rules.add_rule(KeepRule {
            class_pattern: "**".to_string(),
            member: None,
            action: RuleAction::Keep(KeepConstraints::pinned()),
        });
        rules.add_rule(KeepRule {
            class_pattern: "**".to_string(),
            member: Some(MemberPattern {
                name: "*".to_string(),
            }),
            action: RuleAction::Keep(KeepConstraints::pinned()),
        });
        rules
    }

    /// Appends a rule.
    pub fn add_rule(&mut self, rule: KeepRule) {
        self.rules.push(rule);
    }

    /// Pins a class and all of its members.
    pub fn pin_class_with_members(&mut self, descriptor: &str) {
        self.add_rule(KeepRule {
            class_pattern: descriptor.to_string(),
            member: None,
            action: RuleAction::Keep(KeepConstraints::pinned()),
        });
        self.add_rule(KeepRule {
            class_pattern: descriptor.to_string(),
            member: Some(MemberPattern {
                name: "*".to_string(),
            }),
            action: RuleAction::Keep(KeepConstraints::pinned()),
        });
    }

    /// Pins a class without binding its members.
    pub fn pin_class(&mut self, descriptor: &str) {
        self.add_rule(KeepRule {
            class_pattern: descriptor.to_string(),
            member: None,
            action: RuleAction::Keep(KeepConstraints::pinned()),
        });
    }

    /// Adds a `dontWarn` suppression pattern.
    pub fn add_dont_warn(&mut self, pattern: &str) {
        self.dont_warn.push(pattern.to_string());
    }

    /// Iterates the rules in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &KeepRule> {
        self.rules.iter()
    }

    /// Returns `true` when no rules are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns `true` when a missing reference to `descriptor` is suppressed.
    #[must_use]
    pub fn dont_warn_matches(&self, descriptor: &str) -> bool {
        self.dont_warn
            .iter()
            .any(|pattern| pattern_matches(pattern, descriptor))
    }
}

/// Matches a class descriptor against a rule pattern.
///
/// Supported shapes: exact descriptor, bare `**` (everything), a trailing
/// `**` (any suffix), and a trailing `*` (suffix without further package
/// separators).
#[must_use]
pub fn pattern_matches(pattern: &str, descriptor: &str) -> bool {
    if pattern == "**" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("**") {
        return descriptor.starts_with(prefix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return descriptor
            .strip_prefix(prefix)
            .is_some_and(|rest| !rest.contains('/'));
    }
    pattern == descriptor
}
