use std::rc::Rc;

use crate::grammar::Grammar;

pub type RcString = Rc<str>;

/// Slot requirements of an expression, filled in by the stack-depth pass.
///
/// The emitted code for a rule body addresses two parallel banks of local
/// variables, `resultN` and `posN`; these counts bound the indices the
/// expression's snippet may touch relative to its own base index.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Depths {
    pub result: u32,
    pub pos: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClassPart {
    Single(char),
    Range(char, char),
}

/// A character set `[...]`, kept together with the text the grammar author
/// wrote so failure reports can echo it back.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CharClass {
    pub parts: Vec<ClassPart>,
    pub inverted: bool,
    pub raw_text: RcString,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    // structuring nodes
    Choice(Vec<Expr>),
    Sequence(Vec<Expr>),
    Labeled { label: RcString, expr: Box<Expr> },
    // lookahead
    SimpleAnd(Box<Expr>),
    SimpleNot(Box<Expr>),
    SemanticAnd(RcString),
    SemanticNot(RcString),
    // repetition
    Optional(Box<Expr>),
    ZeroOrMore(Box<Expr>),
    OneOrMore(Box<Expr>),
    // semantic values
    Action { expr: Box<Expr>, code: RcString },
    // matching leaves
    RuleRef(RcString),
    Literal(RcString),
    Any,
    Class(CharClass),
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub depths: Depths,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Expr {
        Expr {
            kind,
            depths: Depths::default(),
        }
    }

    pub fn choice(alternatives: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Choice(alternatives))
    }
    pub fn sequence(elements: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Sequence(elements))
    }
    pub fn labeled(label: &str, expr: Expr) -> Expr {
        Expr::new(ExprKind::Labeled {
            label: label.into(),
            expr: Box::new(expr),
        })
    }
    pub fn simple_and(expr: Expr) -> Expr {
        Expr::new(ExprKind::SimpleAnd(Box::new(expr)))
    }
    pub fn simple_not(expr: Expr) -> Expr {
        Expr::new(ExprKind::SimpleNot(Box::new(expr)))
    }
    pub fn semantic_and(code: &str) -> Expr {
        Expr::new(ExprKind::SemanticAnd(code.into()))
    }
    pub fn semantic_not(code: &str) -> Expr {
        Expr::new(ExprKind::SemanticNot(code.into()))
    }
    pub fn optional(expr: Expr) -> Expr {
        Expr::new(ExprKind::Optional(Box::new(expr)))
    }
    pub fn zero_or_more(expr: Expr) -> Expr {
        Expr::new(ExprKind::ZeroOrMore(Box::new(expr)))
    }
    pub fn one_or_more(expr: Expr) -> Expr {
        Expr::new(ExprKind::OneOrMore(Box::new(expr)))
    }
    pub fn action(expr: Expr, code: &str) -> Expr {
        Expr::new(ExprKind::Action {
            expr: Box::new(expr),
            code: code.into(),
        })
    }
    pub fn rule_ref(name: &str) -> Expr {
        Expr::new(ExprKind::RuleRef(name.into()))
    }
    pub fn literal(value: &str) -> Expr {
        Expr::new(ExprKind::Literal(value.into()))
    }
    pub fn any() -> Expr {
        Expr::new(ExprKind::Any)
    }
    pub fn class(parts: Vec<ClassPart>, inverted: bool, raw_text: &str) -> Expr {
        Expr::new(ExprKind::Class(CharClass {
            parts,
            inverted,
            raw_text: raw_text.into(),
        }))
    }

    pub fn is_rule_ref(&self) -> bool {
        matches!(self.kind, ExprKind::RuleRef(_))
    }

    /// Visits the tree bottom-up, children before their parent.
    pub fn visit(&self, mut fun: impl FnMut(&Expr)) {
        self.visit_impl(&mut fun)
    }
    fn visit_impl(&self, fun: &mut dyn FnMut(&Expr)) {
        match &self.kind {
            ExprKind::Choice(vec) | ExprKind::Sequence(vec) => {
                for a in vec {
                    a.visit_impl(fun);
                }
            }
            ExprKind::Labeled { expr: a, .. }
            | ExprKind::SimpleAnd(a)
            | ExprKind::SimpleNot(a)
            | ExprKind::Optional(a)
            | ExprKind::ZeroOrMore(a)
            | ExprKind::OneOrMore(a)
            | ExprKind::Action { expr: a, .. } => {
                a.visit_impl(fun);
            }
            ExprKind::SemanticAnd(_)
            | ExprKind::SemanticNot(_)
            | ExprKind::RuleRef(_)
            | ExprKind::Literal(_)
            | ExprKind::Any
            | ExprKind::Class(_) => {}
        }
        fun(self)
    }

    pub fn visit_mut(&mut self, mut fun: impl FnMut(&mut Expr)) {
        self.visit_mut_impl(&mut fun)
    }
    fn visit_mut_impl(&mut self, fun: &mut dyn FnMut(&mut Expr)) {
        match &mut self.kind {
            ExprKind::Choice(vec) | ExprKind::Sequence(vec) => {
                for a in vec {
                    a.visit_mut_impl(fun);
                }
            }
            ExprKind::Labeled { expr: a, .. }
            | ExprKind::SimpleAnd(a)
            | ExprKind::SimpleNot(a)
            | ExprKind::Optional(a)
            | ExprKind::ZeroOrMore(a)
            | ExprKind::OneOrMore(a)
            | ExprKind::Action { expr: a, .. } => {
                a.visit_mut_impl(fun);
            }
            ExprKind::SemanticAnd(_)
            | ExprKind::SemanticNot(_)
            | ExprKind::RuleRef(_)
            | ExprKind::Literal(_)
            | ExprKind::Any
            | ExprKind::Class(_) => {}
        }
        fun(self)
    }

    pub fn display_into_indent(
        &self,
        buf: &mut dyn std::fmt::Write,
        cx: &Grammar,
        indent: u32,
    ) -> std::fmt::Result {
        for _ in 0..indent {
            write!(buf, "  ")?;
        }
        let children: &[Expr] = match &self.kind {
            ExprKind::Choice(vec) => {
                write!(buf, "Choice")?;
                vec
            }
            ExprKind::Sequence(vec) => {
                write!(buf, "Sequence")?;
                vec
            }
            ExprKind::Labeled { label, expr } => {
                write!(buf, "Labeled({label})")?;
                std::slice::from_ref(&**expr)
            }
            ExprKind::SimpleAnd(a) => {
                write!(buf, "SimpleAnd")?;
                std::slice::from_ref(&**a)
            }
            ExprKind::SimpleNot(a) => {
                write!(buf, "SimpleNot")?;
                std::slice::from_ref(&**a)
            }
            ExprKind::SemanticAnd(_) => {
                write!(buf, "SemanticAnd")?;
                &[]
            }
            ExprKind::SemanticNot(_) => {
                write!(buf, "SemanticNot")?;
                &[]
            }
            ExprKind::Optional(a) => {
                write!(buf, "Optional")?;
                std::slice::from_ref(&**a)
            }
            ExprKind::ZeroOrMore(a) => {
                write!(buf, "ZeroOrMore")?;
                std::slice::from_ref(&**a)
            }
            ExprKind::OneOrMore(a) => {
                write!(buf, "OneOrMore")?;
                std::slice::from_ref(&**a)
            }
            ExprKind::Action { expr, .. } => {
                write!(buf, "Action")?;
                std::slice::from_ref(&**expr)
            }
            ExprKind::RuleRef(name) => {
                let marker = match cx.lookup(name) {
                    Some(_) => "",
                    None => "?",
                };
                write!(buf, "RuleRef({name}{marker})")?;
                &[]
            }
            ExprKind::Literal(value) => {
                write!(buf, "Literal({value:?})")?;
                &[]
            }
            ExprKind::Any => {
                write!(buf, "Any")?;
                &[]
            }
            ExprKind::Class(class) => {
                write!(buf, "Class({})", class.raw_text)?;
                &[]
            }
        };
        write!(buf, "\n")?;
        for child in children {
            child.display_into_indent(buf, cx, indent + 1)?;
        }
        Ok(())
    }

    pub fn display_into(&self, buf: &mut dyn std::fmt::Write, cx: &Grammar) -> std::fmt::Result {
        self.display_into_indent(buf, cx, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    #[test]
    fn visit_is_bottom_up() {
        let expr = Expr::sequence(vec![
            Expr::literal("a"),
            Expr::optional(Expr::rule_ref("b")),
        ]);

        let mut order = Vec::new();
        expr.visit(|e| {
            order.push(match &e.kind {
                ExprKind::Sequence(_) => "sequence",
                ExprKind::Optional(_) => "optional",
                ExprKind::Literal(_) => "literal",
                ExprKind::RuleRef(_) => "rule_ref",
                _ => "other",
            });
        });

        assert_eq!(order, ["literal", "rule_ref", "optional", "sequence"]);
    }

    #[test]
    fn visit_mut_rewrites_leaves() {
        let mut expr = Expr::choice(vec![Expr::rule_ref("old"), Expr::rule_ref("kept")]);
        expr.visit_mut(|e| {
            if let ExprKind::RuleRef(name) = &mut e.kind {
                if &**name == "old" {
                    *name = "new".into();
                }
            }
        });

        let ExprKind::Choice(alternatives) = &expr.kind else {
            unreachable!()
        };
        let ExprKind::RuleRef(first) = &alternatives[0].kind else {
            unreachable!()
        };
        assert_eq!(&**first, "new");
    }

    #[test]
    fn display_marks_unresolved_refs() {
        let mut grammar = Grammar::new();
        grammar.add_rule("a", None, Expr::literal("x"));

        let expr = Expr::sequence(vec![Expr::rule_ref("a"), Expr::rule_ref("ghost")]);
        let mut buf = String::new();
        expr.display_into(&mut buf, &grammar).unwrap();

        assert!(buf.contains("RuleRef(a)"));
        assert!(buf.contains("RuleRef(ghost?)"));
    }
}
