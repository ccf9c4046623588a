use crate::{
    ast::{Depths, Expr, ExprKind, RcString},
    grammar::Grammar,
};

/// Removes rules whose body is a bare rule reference, retargeting every
/// reference to them.
///
/// Runs once over a snapshot of the live handles. A proxy chain may keep one
/// indirection step after the traversal; that is fine, the emitted parser
/// still dispatches through an existing rule. A self-referential proxy is
/// left alone (the check pass has already rejected it as left recursion).
pub fn remove_proxy_rules(grammar: &mut Grammar) {
    let handles: Vec<_> = grammar.iter().map(|(handle, _)| handle).collect();

    for handle in handles {
        if grammar.is_removed(handle) {
            continue;
        }

        let rule = grammar.rule(handle);
        let ExprKind::RuleRef(target) = &rule.expr.kind else {
            continue;
        };
        if *target == rule.name {
            continue;
        }

        let proxy: RcString = rule.name.clone();
        let target: RcString = target.clone();
        log::trace!("removing proxy rule {proxy} -> {target}");

        for (_, rule) in grammar.iter_mut() {
            rule.expr.visit_mut(|expr| {
                if let ExprKind::RuleRef(name) = &mut expr.kind {
                    if *name == proxy {
                        *name = target.clone();
                    }
                }
            });
        }
        if *grammar.start_rule() == proxy {
            grammar.set_start_rule(&target);
        }

        grammar.remove_rule(handle);
    }
}

/// Annotates every node with the number of result and position slots its
/// snippet needs, and every rule with the counts its body declares.
pub fn compute_stack_depths(grammar: &mut Grammar) {
    for (_, rule) in grammar.iter_mut() {
        let depths = annotate(&mut rule.expr);
        rule.result_depth = depths.result + 1;
        rule.pos_depth = depths.pos + 1;
        log::trace!(
            "rule {}: {} result slots, {} pos slots",
            rule.name,
            rule.result_depth,
            rule.pos_depth
        );
    }
}

fn annotate(expr: &mut Expr) -> Depths {
    let depths = match &mut expr.kind {
        ExprKind::RuleRef(_)
        | ExprKind::Literal(_)
        | ExprKind::Any
        | ExprKind::Class(_)
        | ExprKind::SemanticAnd(_)
        | ExprKind::SemanticNot(_) => Depths::default(),

        ExprKind::Labeled { expr: a, .. } | ExprKind::Optional(a) => annotate(a),

        // lookaheads and actions save the position before their child runs
        ExprKind::SimpleAnd(a) | ExprKind::SimpleNot(a) | ExprKind::Action { expr: a, .. } => {
            let child = annotate(a);
            Depths {
                result: child.result,
                pos: child.pos + 1,
            }
        }

        // repetitions accumulate into their own slot while the child
        // matches one below
        ExprKind::ZeroOrMore(a) | ExprKind::OneOrMore(a) => {
            let child = annotate(a);
            Depths {
                result: child.result + 1,
                pos: child.pos,
            }
        }

        ExprKind::Choice(alternatives) => {
            let mut max = Depths::default();
            for alternative in alternatives {
                let child = annotate(alternative);
                max.result = max.result.max(child.result);
                max.pos = max.pos.max(child.pos);
            }
            max
        }

        // element i matches into slot base + i, the collected array lands
        // in the base slot, and one saved position covers the backtrack
        ExprKind::Sequence(elements) => {
            let mut result = 0;
            let mut pos = 0;
            for (i, element) in elements.iter_mut().enumerate() {
                let child = annotate(element);
                result = result.max(i as u32 + child.result);
                pos = pos.max(child.pos);
            }
            Depths {
                result: result + 1,
                pos: pos + 1,
            }
        }
    };

    expr.depths = depths;
    depths
}
