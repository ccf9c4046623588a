//! Compiles a Parsing Expression Grammar AST into the source text of a
//! packrat-memoized recursive-descent parser in JavaScript.
//!
//! The grammar front end is an external collaborator: it builds a
//! [`Grammar`] through the [`ast`] and [`grammar`] APIs and hands it to
//! [`compile`], which validates it, normalizes it and emits the parser
//! source. The emitted text evaluates to an object exposing
//! `parse(input, startRule?)` and `toSource()`.

pub mod ast;
pub mod check;
pub mod generate;
pub mod grammar;
pub mod literal;
pub mod lower;
pub mod template;

use thiserror::Error;

pub use crate::{
    ast::{CharClass, ClassPart, Expr, ExprKind},
    check::CheckError,
    grammar::{Grammar, Rule, RuleHandle},
    template::TemplateError,
};

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Rule names the generated parser accepts as `startRule`; empty means
    /// every rule is accepted.
    pub start_rules: Vec<String>,
    /// Leave out the `padLeft`/`escape`/`quote` helpers; the embedder
    /// guarantees they are already in scope.
    pub self_parsing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("none of the requested start rules exists in the grammar")]
    NoStartRule,
    #[error("invalid grammar: {}", join_errors(.0))]
    Check(Vec<CheckError>),
}

fn join_errors(errors: &[CheckError]) -> String {
    let messages: Vec<String> = errors.iter().map(|error| error.to_string()).collect();
    messages.join("; ")
}

/// Runs the full pipeline: validation, proxy-rule elimination, stack-depth
/// annotation, emission.
pub fn compile(mut grammar: Grammar, options: &CompileOptions) -> Result<String, CompileError> {
    log::debug!("compiling grammar with {} rules", grammar.live_len());

    let errors = check::check(&grammar);
    if !errors.is_empty() {
        return Err(CompileError::Check(errors));
    }

    lower::remove_proxy_rules(&mut grammar);
    lower::compute_stack_depths(&mut grammar);

    generate::generate(&grammar, options)
}
