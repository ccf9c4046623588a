use cranelift_entity::{EntitySet, SecondaryMap};
use thiserror::Error;

use crate::{
    ast::{Expr, ExprKind},
    grammar::{Grammar, RuleHandle},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("rule `{in_rule}` references undefined rule `{name}`")]
    UndefinedRule { name: String, in_rule: String },
    #[error("start rule `{0}` is not defined")]
    UndefinedStartRule(String),
    #[error("left recursion detected: {}", .path.join(" -> "))]
    LeftRecursion { path: Vec<String> },
}

/// Validates the reference graph before any pass mutates it. All errors are
/// collected so the caller can report them at once.
pub fn check(grammar: &Grammar) -> Vec<CheckError> {
    let mut errors = Vec::new();

    for (_, rule) in grammar.iter() {
        rule.expr.visit(|expr| {
            if let ExprKind::RuleRef(name) = &expr.kind {
                if grammar.lookup(name).is_none() {
                    errors.push(CheckError::UndefinedRule {
                        name: name.to_string(),
                        in_rule: rule.name.to_string(),
                    });
                }
            }
        });
    }
    if grammar.lookup(grammar.start_rule()).is_none() {
        errors.push(CheckError::UndefinedStartRule(grammar.start_rule().to_string()));
    }

    // the prefix graph below resolves every reference
    if !errors.is_empty() {
        return errors;
    }

    check_left_recursion(grammar, &mut errors);
    errors
}

fn check_left_recursion(grammar: &Grammar, errors: &mut Vec<CheckError>) {
    let mut prefix_rules = SecondaryMap::new();

    for (handle, rule) in grammar.iter() {
        let mut set = Vec::new();
        collect_prefix_rules(&rule.expr, grammar, &mut set);
        prefix_rules[handle] = set;
    }

    let mut visited = EntitySet::new();
    let mut stack = Vec::new();
    for (handle, _) in grammar.iter() {
        find_prefix_cycles(handle, &prefix_rules, &mut visited, &mut stack, grammar, errors);
    }
}

/// Records the rules reachable from `expr` while no input has been consumed.
/// Returns whether the expression always consumes input when it matches.
///
/// A rule reference is treated as always-consuming, so reachability through
/// an empty-matching rule is not followed; the check under-approximates
/// rather than rejecting valid grammars.
fn collect_prefix_rules(expr: &Expr, grammar: &Grammar, rules: &mut Vec<RuleHandle>) -> bool {
    match &expr.kind {
        ExprKind::Sequence(elements) => {
            for element in elements {
                if collect_prefix_rules(element, grammar, rules) {
                    return true;
                }
            }
            false
        }
        ExprKind::Choice(alternatives) => {
            let mut all_consume = true;
            for alternative in alternatives {
                all_consume &= collect_prefix_rules(alternative, grammar, rules);
            }
            all_consume
        }
        ExprKind::Optional(a) | ExprKind::ZeroOrMore(a) => {
            collect_prefix_rules(a, grammar, rules);
            false
        }
        ExprKind::OneOrMore(a) => collect_prefix_rules(a, grammar, rules),
        ExprKind::SimpleAnd(a) | ExprKind::SimpleNot(a) => {
            collect_prefix_rules(a, grammar, rules);
            false
        }
        ExprKind::Labeled { expr: a, .. } | ExprKind::Action { expr: a, .. } => {
            collect_prefix_rules(a, grammar, rules)
        }
        ExprKind::RuleRef(name) => {
            let handle = grammar.lookup(name).unwrap();
            if !rules.contains(&handle) {
                rules.push(handle);
            }
            true
        }
        ExprKind::Literal(value) => !value.is_empty(),
        ExprKind::Any | ExprKind::Class(_) => true,
        ExprKind::SemanticAnd(_) | ExprKind::SemanticNot(_) => false,
    }
}

fn find_prefix_cycles(
    handle: RuleHandle,

    prefix_rules: &SecondaryMap<RuleHandle, Vec<RuleHandle>>,
    visited: &mut EntitySet<RuleHandle>,
    stack: &mut Vec<RuleHandle>,

    grammar: &Grammar,
    errors: &mut Vec<CheckError>,
) {
    if let Some(position) = stack.iter().position(|rule| *rule == handle) {
        let path = stack[position..]
            .iter()
            .chain(std::iter::once(&handle))
            .map(|rule| rule.name(grammar).to_string())
            .collect();
        errors.push(CheckError::LeftRecursion { path });
        return;
    }

    if visited.contains(handle) {
        return;
    }
    visited.insert(handle);

    stack.push(handle);
    for &prefix in &prefix_rules[handle] {
        find_prefix_cycles(prefix, prefix_rules, visited, stack, grammar, errors);
    }
    stack.pop();
}
