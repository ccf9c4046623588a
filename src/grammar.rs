use std::collections::HashMap;

use cranelift_entity::{entity_impl, EntitySet, PrimaryMap};

use crate::ast::{Expr, RcString};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleHandle(u32);

entity_impl!(RuleHandle);

impl RuleHandle {
    pub fn name(self, cx: &Grammar) -> &RcString {
        &cx.rule(self).name
    }
}

pub struct Rule {
    pub name: RcString,
    /// Human-readable alias reported as the expected alternative when the
    /// whole rule fails.
    pub display_name: Option<RcString>,
    pub expr: Expr,
    // filled in by the stack-depth pass
    pub result_depth: u32,
    pub pos_depth: u32,
}

/// Rule storage for one grammar.
///
/// Rules live in a [`PrimaryMap`] so handle order is insertion order and
/// iteration is deterministic. Removal tombstones the handle instead of
/// shifting the map; tombstoned rules are skipped by iteration and absent
/// from the name index.
pub struct Grammar {
    rules: PrimaryMap<RuleHandle, Rule>,
    name_to_rule: HashMap<RcString, RuleHandle>,
    removed: EntitySet<RuleHandle>,
    start_rule: Option<RcString>,
    initializer: Option<RcString>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar {
    pub fn new() -> Grammar {
        Grammar {
            rules: PrimaryMap::new(),
            name_to_rule: HashMap::new(),
            removed: EntitySet::new(),
            start_rule: None,
            initializer: None,
        }
    }

    /// The first rule added becomes the start rule unless
    /// [`Grammar::set_start_rule`] overrides it.
    pub fn add_rule(&mut self, name: &str, display_name: Option<&str>, expr: Expr) -> RuleHandle {
        assert!(
            !self.name_to_rule.contains_key(name),
            "duplicate rule definition: {name}"
        );

        let name: RcString = name.into();
        let handle = self.rules.push(Rule {
            name: name.clone(),
            display_name: display_name.map(Into::into),
            expr,
            result_depth: 0,
            pos_depth: 0,
        });
        self.name_to_rule.insert(name.clone(), handle);

        if self.start_rule.is_none() {
            self.start_rule = Some(name);
        }
        handle
    }

    pub fn set_start_rule(&mut self, name: &str) {
        self.start_rule = Some(name.into());
    }

    pub fn set_initializer(&mut self, code: &str) {
        self.initializer = Some(code.into());
    }

    pub fn start_rule(&self) -> &RcString {
        self.start_rule.as_ref().expect("grammar has no rules")
    }

    pub fn initializer(&self) -> Option<&RcString> {
        self.initializer.as_ref()
    }

    pub fn lookup(&self, name: &str) -> Option<RuleHandle> {
        self.name_to_rule.get(name).copied()
    }

    pub fn rule(&self, handle: RuleHandle) -> &Rule {
        &self.rules[handle]
    }

    pub fn rule_mut(&mut self, handle: RuleHandle) -> &mut Rule {
        &mut self.rules[handle]
    }

    pub fn is_removed(&self, handle: RuleHandle) -> bool {
        self.removed.contains(handle)
    }

    /// Tombstones the rule. Callers are responsible for rewriting any
    /// references to it first.
    pub fn remove_rule(&mut self, handle: RuleHandle) {
        let name = self.rules[handle].name.clone();
        self.name_to_rule.remove(&name);
        self.removed.insert(handle);
    }

    /// Live rules in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (RuleHandle, &Rule)> + '_ {
        let removed = &self.removed;
        self.rules
            .iter()
            .filter(move |(handle, _)| !removed.contains(*handle))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RuleHandle, &mut Rule)> + '_ {
        let removed = &self.removed;
        self.rules
            .iter_mut()
            .filter(move |(handle, _)| !removed.contains(*handle))
    }

    pub fn live_len(&self) -> usize {
        self.iter().count()
    }
}
