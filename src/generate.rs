use crate::{
    ast::{CharClass, Expr, ExprKind},
    grammar::{Grammar, Rule},
    literal,
    template::format,
    CompileError, CompileOptions,
};

/// Base indices into the two slot banks of the enclosing rule function.
///
/// A snippet emitted at `slots` owns `result<slots.result>` and may scratch
/// in higher indices only; same for positions. On match it leaves `pos`
/// advanced and its result slot non-null, on miss it restores `pos` and
/// leaves null.
#[derive(Clone, Copy)]
struct Slots {
    result: u32,
    pos: u32,
}

fn result_var(index: u32) -> String {
    format!("result{index}")
}

fn pos_var(index: u32) -> String {
    format!("pos{index}")
}

pub fn generate(grammar: &Grammar, options: &CompileOptions) -> Result<String, CompileError> {
    let generator = Generator { grammar, options };
    let source = generator.grammar_wrapper()?;
    log::debug!(
        "emitted {} bytes of parser source for {} rules",
        source.len(),
        grammar.live_len()
    );
    Ok(source)
}

struct Generator<'a> {
    grammar: &'a Grammar,
    options: &'a CompileOptions,
}

impl Generator<'_> {
    fn expression(&self, expr: &Expr, slots: Slots) -> Result<String, CompileError> {
        match &expr.kind {
            ExprKind::Choice(alternatives) => self.choice(alternatives, slots),
            ExprKind::Sequence(elements) => self.sequence(elements, slots),
            // the label itself only matters to an enclosing action
            ExprKind::Labeled { expr, .. } => self.expression(expr, slots),
            ExprKind::SimpleAnd(a) => self.simple_and(a, slots),
            ExprKind::SimpleNot(a) => self.simple_not(a, slots),
            ExprKind::SemanticAnd(code) => self.semantic_and(code, slots),
            ExprKind::SemanticNot(code) => self.semantic_not(code, slots),
            ExprKind::Optional(a) => self.optional(a, slots),
            ExprKind::ZeroOrMore(a) => self.zero_or_more(a, slots),
            ExprKind::OneOrMore(a) => self.one_or_more(a, slots),
            ExprKind::Action { expr, code } => self.action(expr, code, slots),
            ExprKind::RuleRef(name) => self.rule_ref(name, slots),
            ExprKind::Literal(value) => self.literal(value, slots),
            ExprKind::Any => self.any(slots),
            ExprKind::Class(class) => self.class(class, slots),
        }
    }

    fn literal(&self, value: &str, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        let length = literal::utf16_len(value);

        if length == 0 {
            // matches without consuming anything, cannot fail
            return Ok(format(&["${r} = \"\";"], &[("r", &r)])?);
        }

        let expected = literal::quote(value);
        let length = length.to_string();
        let vars: [(&str, &str); 4] = [
            ("r", &r),
            ("value", value),
            ("expected", &expected),
            ("length", &length),
        ];

        let code = if length == "1" {
            format(
                &[
                    "if (input.charAt(pos) === ${value|string}) {",
                    "  ${r} = ${value|string};",
                    "  pos++;",
                    "} else {",
                    "  ${r} = null;",
                    "  if (reportFailures === 0) {",
                    "    matchFailed(${expected|string});",
                    "  }",
                    "}",
                ],
                &vars,
            )?
        } else {
            format(
                &[
                    "if (input.substr(pos, ${length}) === ${value|string}) {",
                    "  ${r} = ${value|string};",
                    "  pos += ${length};",
                    "} else {",
                    "  ${r} = null;",
                    "  if (reportFailures === 0) {",
                    "    matchFailed(${expected|string});",
                    "  }",
                    "}",
                ],
                &vars,
            )?
        };
        Ok(code)
    }

    fn any(&self, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        Ok(format(
            &[
                "if (input.length > pos) {",
                "  ${r} = input.charAt(pos);",
                "  pos++;",
                "} else {",
                "  ${r} = null;",
                "  if (reportFailures === 0) {",
                "    matchFailed(\"any character\");",
                "  }",
                "}",
            ],
            &[("r", &r)],
        )?)
    }

    fn class(&self, class: &CharClass, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        let regex = literal::class_regex(class);
        Ok(format(
            &[
                "if (${regex}.test(input.charAt(pos))) {",
                "  ${r} = input.charAt(pos);",
                "  pos++;",
                "} else {",
                "  ${r} = null;",
                "  if (reportFailures === 0) {",
                "    matchFailed(${raw|string});",
                "  }",
                "}",
            ],
            &[("r", &r), ("regex", &regex), ("raw", &class.raw_text)],
        )?)
    }

    fn rule_ref(&self, name: &str, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        Ok(format(
            &["${r} = parse_${name}();"],
            &[("r", &r), ("name", name)],
        )?)
    }

    fn sequence(&self, elements: &[Expr], slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        let p = pos_var(slots.pos);

        let element_results: Vec<String> = (0..elements.len() as u32)
            .map(|i| result_var(slots.result + i))
            .collect();

        // built inside out, element i wraps the continuation for i+1..
        let collected = element_results.join(", ");
        let mut code = format(
            &["${r} = [${elements}];"],
            &[("r", &r), ("elements", &collected)],
        )?;

        for (i, element) in elements.iter().enumerate().rev() {
            let element_slots = Slots {
                result: slots.result + i as u32,
                pos: slots.pos + 1,
            };
            let element_code = self.expression(element, element_slots)?;
            code = format(
                &[
                    "${element}",
                    "if (${ri} !== null) {",
                    "  ${inner}",
                    "} else {",
                    "  ${r} = null;",
                    "  pos = ${p};",
                    "}",
                ],
                &[
                    ("element", &element_code),
                    ("ri", &element_results[i]),
                    ("inner", &code),
                    ("r", &r),
                    ("p", &p),
                ],
            )?;
        }

        Ok(format(
            &["${p} = pos;", "${code}"],
            &[("p", &p), ("code", &code)],
        )?)
    }

    fn choice(&self, alternatives: &[Expr], slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);

        let Some((last, rest)) = alternatives.split_last() else {
            return Ok(format(&["${r} = null;"], &[("r", &r)])?);
        };

        let mut code = self.expression(last, slots)?;
        for alternative in rest.iter().rev() {
            let alternative_code = self.expression(alternative, slots)?;
            code = format(
                &[
                    "${alternative}",
                    "if (${r} === null) {",
                    "  ${inner}",
                    "}",
                ],
                &[
                    ("alternative", &alternative_code),
                    ("r", &r),
                    ("inner", &code),
                ],
            )?;
        }
        Ok(code)
    }

    fn optional(&self, expr: &Expr, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        let child = self.expression(expr, slots)?;
        Ok(format(
            &["${child}", "${r} = ${r} !== null ? ${r} : \"\";"],
            &[("child", &child), ("r", &r)],
        )?)
    }

    fn zero_or_more(&self, expr: &Expr, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        let r1 = result_var(slots.result + 1);
        let child = self.expression(
            expr,
            Slots {
                result: slots.result + 1,
                pos: slots.pos,
            },
        )?;
        Ok(format(
            &[
                "${r} = [];",
                "${child}",
                "while (${r1} !== null) {",
                "  ${r}.push(${r1});",
                "  ${child}",
                "}",
            ],
            &[("r", &r), ("r1", &r1), ("child", &child)],
        )?)
    }

    fn one_or_more(&self, expr: &Expr, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        let r1 = result_var(slots.result + 1);
        let child = self.expression(
            expr,
            Slots {
                result: slots.result + 1,
                pos: slots.pos,
            },
        )?;
        Ok(format(
            &[
                "${child}",
                "if (${r1} !== null) {",
                "  ${r} = [];",
                "  while (${r1} !== null) {",
                "    ${r}.push(${r1});",
                "    ${child}",
                "  }",
                "} else {",
                "  ${r} = null;",
                "}",
            ],
            &[("r", &r), ("r1", &r1), ("child", &child)],
        )?)
    }

    fn simple_and(&self, expr: &Expr, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        let p = pos_var(slots.pos);
        let child = self.expression(
            expr,
            Slots {
                result: slots.result,
                pos: slots.pos + 1,
            },
        )?;
        Ok(format(
            &[
                "${p} = pos;",
                "reportFailures++;",
                "${child}",
                "reportFailures--;",
                "if (${r} !== null) {",
                "  ${r} = \"\";",
                "  pos = ${p};",
                "} else {",
                "  ${r} = null;",
                "}",
            ],
            &[("p", &p), ("child", &child), ("r", &r)],
        )?)
    }

    fn simple_not(&self, expr: &Expr, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        let p = pos_var(slots.pos);
        let child = self.expression(
            expr,
            Slots {
                result: slots.result,
                pos: slots.pos + 1,
            },
        )?;
        Ok(format(
            &[
                "${p} = pos;",
                "reportFailures++;",
                "${child}",
                "reportFailures--;",
                "if (${r} === null) {",
                "  ${r} = \"\";",
                "} else {",
                "  ${r} = null;",
                "  pos = ${p};",
                "}",
            ],
            &[("p", &p), ("child", &child), ("r", &r)],
        )?)
    }

    fn semantic_and(&self, code: &str, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        Ok(format(
            &["${r} = (function() { ${code} })() ? \"\" : null;"],
            &[("r", &r), ("code", code)],
        )?)
    }

    fn semantic_not(&self, code: &str, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        Ok(format(
            &["${r} = (function() { ${code} })() ? null : \"\";"],
            &[("r", &r), ("code", code)],
        )?)
    }

    fn action(&self, expr: &Expr, code: &str, slots: Slots) -> Result<String, CompileError> {
        let r = result_var(slots.result);
        let p = pos_var(slots.pos);
        let child = self.expression(
            expr,
            Slots {
                result: slots.result,
                pos: slots.pos + 1,
            },
        )?;

        let (params, args) = action_parameters(expr, &r);

        Ok(format(
            &[
                "${p} = pos;",
                "${child}",
                "if (${r} !== null) {",
                "  ${r} = (function(${params}) { ${code} })(${args});",
                "}",
                "if (${r} === null) {",
                "  pos = ${p};",
                "}",
            ],
            &[
                ("p", &p),
                ("child", &child),
                ("r", &r),
                ("params", &params),
                ("args", &args),
                ("code", code),
            ],
        )?)
    }

    fn rule(&self, rule: &Rule) -> Result<String, CompileError> {
        let mut body = self.expression(&rule.expr, Slots { result: 0, pos: 0 })?;

        if let Some(display_name) = &rule.display_name {
            body = format(
                &[
                    "reportFailures++;",
                    "${body}",
                    "reportFailures--;",
                    "if (reportFailures === 0 && result0 === null) {",
                    "  matchFailed(${display_name|string});",
                    "}",
                ],
                &[("body", &body), ("display_name", display_name)],
            )?;
        }

        let result_vars = var_declaration("result", rule.result_depth);
        let pos_vars = var_declaration("pos", rule.pos_depth);
        let key_prefix = format!("{}@", rule.name);

        Ok(format(
            &[
                "function parse_${name}() {",
                "  var cacheKey = ${key_prefix|string} + pos;",
                "  var cachedResult = cache[cacheKey];",
                "  if (cachedResult) {",
                "    pos = cachedResult.nextPos;",
                "    return cachedResult.result;",
                "  }",
                "",
                "  ${result_vars}",
                "  ${pos_vars}",
                "",
                "  ${body}",
                "",
                "  cache[cacheKey] = {",
                "    nextPos: pos,",
                "    result:  result0",
                "  };",
                "  return result0;",
                "}",
            ],
            &[
                ("name", &rule.name),
                ("key_prefix", &key_prefix),
                ("result_vars", &result_vars),
                ("pos_vars", &pos_vars),
                ("body", &body),
            ],
        )?)
    }

    fn grammar_wrapper(&self) -> Result<String, CompileError> {
        let grammar = self.grammar;

        let exposed: Vec<&str> = if self.options.start_rules.is_empty() {
            grammar.iter().map(|(_, rule)| &*rule.name).collect()
        } else {
            self.options
                .start_rules
                .iter()
                .map(|name| name.as_str())
                .filter(|name| grammar.lookup(name).is_some())
                .collect()
        };
        if exposed.is_empty() {
            return Err(CompileError::NoStartRule);
        }

        let start: &str = grammar.start_rule();
        let default_start = if exposed.contains(&start) {
            start
        } else {
            exposed[0]
        };

        let dispatch = if exposed.len() == 1 {
            format(
                &[
                    "if (startRule !== undefined) {",
                    "  if (startRule !== ${name|string}) {",
                    "    throw new Error(\"Can't start parsing from rule \" + quote(startRule) + \".\");",
                    "  }",
                    "} else {",
                    "  startRule = ${name|string};",
                    "}",
                ],
                &[("name", exposed[0])],
            )?
        } else {
            let entries = exposed
                .iter()
                .map(|&name| format(&["  ${name|string}: parse_${name}"], &[("name", name)]))
                .collect::<Result<Vec<_>, _>>()?
                .join(",\n");
            format(
                &[
                    "var parseFunctions = {",
                    "${entries}",
                    "};",
                    "",
                    "if (startRule !== undefined) {",
                    "  if (parseFunctions[startRule] === undefined) {",
                    "    throw new Error(\"Invalid rule name: \" + quote(startRule) + \".\");",
                    "  }",
                    "} else {",
                    "  startRule = ${default|string};",
                    "}",
                ],
                &[("entries", &entries), ("default", default_start)],
            )?
        };

        let start_call = if exposed.len() == 1 {
            format!("parse_{}()", exposed[0])
        } else {
            "parseFunctions[startRule]()".to_owned()
        };

        let rules = grammar
            .iter()
            .map(|(_, rule)| self.rule(rule))
            .collect::<Result<Vec<_>, _>>()?
            .join("\n\n");

        let mut parts = vec!["${dispatch}", "", RESET_STATE, ""];
        if !self.options.self_parsing {
            parts.push(HELPERS);
            parts.push("");
        }
        parts.extend([
            MATCH_FAILED,
            "",
            "${rules}",
            "",
            CLEANUP_EXPECTED,
            "",
            COMPUTE_ERROR_POSITION,
            "",
            BUILD_ERROR_MESSAGE,
            "",
        ]);
        if grammar.initializer().is_some() {
            parts.push("${initializer}");
            parts.push("");
        }
        parts.extend([
            "var result = ${start_call};",
            "",
            ENTRY_CHECK,
            "",
            "return result;",
        ]);

        let initializer: &str = grammar.initializer().map(|code| &**code).unwrap_or("");
        let parse_body = format(
            &parts,
            &[
                ("dispatch", &dispatch),
                ("rules", &rules),
                ("initializer", initializer),
                ("start_call", &start_call),
            ],
        )?;

        Ok(format(
            &[
                "(function(){",
                "  var result = {",
                "    parse: function(input, startRule) {",
                "      ${parse_body}",
                "    },",
                "",
                "    toSource: function() { return this._source; }",
                "  };",
                "",
                "  ${syntax_error}",
                "",
                "  return result;",
                "})()",
            ],
            &[("parse_body", &parse_body), ("syntax_error", SYNTAX_ERROR)],
        )?)
    }
}

/// Formal parameters and actual arguments for an action block, derived from
/// the labels of its body: one per labeled element of a sequence (argument
/// picked out of the collected array by position), or a single one when the
/// body itself is labeled.
fn action_parameters(expr: &Expr, r: &str) -> (String, String) {
    match &expr.kind {
        ExprKind::Sequence(elements) => {
            let mut params = Vec::new();
            let mut args = Vec::new();
            for (i, element) in elements.iter().enumerate() {
                if let ExprKind::Labeled { label, .. } = &element.kind {
                    params.push(label.to_string());
                    args.push(format!("{r}[{i}]"));
                }
            }
            (params.join(", "), args.join(", "))
        }
        ExprKind::Labeled { label, .. } => (label.to_string(), r.to_owned()),
        _ => (String::new(), String::new()),
    }
}

fn var_declaration(prefix: &str, count: u32) -> String {
    assert!(count > 0, "stack depths were not computed");
    let names: Vec<String> = (0..count).map(|i| format!("{prefix}{i}")).collect();
    format!("var {};", names.join(", "))
}

const RESET_STATE: &str = r#"var pos = 0;
var reportFailures = 0;
var rightmostFailuresPos = 0;
var rightmostFailuresExpected = [];
var cache = {};"#;

const MATCH_FAILED: &str = r#"function matchFailed(failure) {
  if (pos < rightmostFailuresPos) {
    return;
  }

  if (pos > rightmostFailuresPos) {
    rightmostFailuresPos = pos;
    rightmostFailuresExpected = [];
  }

  rightmostFailuresExpected.push(failure);
}"#;

const CLEANUP_EXPECTED: &str = r#"function cleanupExpected(expected) {
  expected.sort();

  var lastExpected = null;
  var cleanExpected = [];
  for (var i = 0; i < expected.length; i++) {
    if (expected[i] !== lastExpected) {
      cleanExpected.push(expected[i]);
      lastExpected = expected[i];
    }
  }
  return cleanExpected;
}"#;

const COMPUTE_ERROR_POSITION: &str = r#"function computeErrorPosition() {
  var line = 1;
  var column = 1;
  var seenCR = false;

  for (var i = 0; i < rightmostFailuresPos; i++) {
    var ch = input.charAt(i);
    if (ch === "\n") {
      if (!seenCR) { line++; }
      column = 1;
      seenCR = false;
    } else if (ch === "\r" || ch === "\u2028" || ch === "\u2029") {
      line++;
      column = 1;
      seenCR = true;
    } else {
      column++;
      seenCR = false;
    }
  }

  return { line: line, column: column };
}"#;

const BUILD_ERROR_MESSAGE: &str = r#"function buildErrorMessage() {
  function expectedDescription(expected) {
    switch (expected.length) {
      case 0:
        return "end of input";
      case 1:
        return expected[0];
      default:
        return expected.slice(0, expected.length - 1).join(", ")
          + " or "
          + expected[expected.length - 1];
    }
  }

  var expected = expectedDescription(cleanupExpected(rightmostFailuresExpected));
  var found = rightmostFailuresPos < input.length
    ? quote(input.charAt(rightmostFailuresPos))
    : "end of input";

  return "Expected " + expected + " but " + found + " found.";
}"#;

const ENTRY_CHECK: &str = r#"if (result === null || pos !== input.length) {
  var errorPosition = computeErrorPosition();
  throw new this.SyntaxError(
    buildErrorMessage(),
    errorPosition.line,
    errorPosition.column
  );
}"#;

const SYNTAX_ERROR: &str = r#"result.SyntaxError = function(message, line, column) {
  this.name = "SyntaxError";
  this.message = message;
  this.line = line;
  this.column = column;
};

result.SyntaxError.prototype = Error.prototype;"#;

const HELPERS: &str = r#"function padLeft(input, padding, length) {
  var result = input;

  var padLength = length - input.length;
  for (var i = 0; i < padLength; i++) {
    result = padding + result;
  }

  return result;
}

function escape(ch) {
  var charCode = ch.charCodeAt(0);
  var escapeChar;
  var length;

  if (charCode <= 0xFF) {
    escapeChar = 'x';
    length = 2;
  } else {
    escapeChar = 'u';
    length = 4;
  }

  return '\\' + escapeChar + padLeft(charCode.toString(16).toUpperCase(), '0', length);
}

function quote(s) {
  return '"' + s
    .replace(/\\/g, '\\\\')
    .replace(/"/g, '\\"')
    .replace(/\t/g, '\\t')
    .replace(/\n/g, '\\n')
    .replace(/\f/g, '\\f')
    .replace(/\r/g, '\\r')
    .replace(/[\x00-\x08\x0B\x0E-\x1F\x80-\uFFFF]/g, escape)
    + '"';
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ClassPart;
    use crate::{compile, lower};

    fn emit(grammar: Grammar) -> String {
        compile(grammar, &CompileOptions::default()).unwrap()
    }

    fn single_rule(expr: Expr) -> Grammar {
        let mut grammar = Grammar::new();
        grammar.add_rule("start", None, expr);
        grammar
    }

    fn snippet(expr: Expr, slots: Slots) -> String {
        let mut grammar = single_rule(expr);
        lower::compute_stack_depths(&mut grammar);

        let options = CompileOptions::default();
        let generator = Generator {
            grammar: &grammar,
            options: &options,
        };
        let handle = grammar.lookup("start").unwrap();
        generator
            .expression(&grammar.rule(handle).expr, slots)
            .unwrap()
    }

    #[test]
    fn literal_single_character() {
        let code = snippet(Expr::literal("a"), Slots { result: 0, pos: 0 });
        assert_eq!(
            code,
            "\
if (input.charAt(pos) === \"a\") {
  result0 = \"a\";
  pos++;
} else {
  result0 = null;
  if (reportFailures === 0) {
    matchFailed(\"\\\"a\\\"\");
  }
}"
        );
    }

    #[test]
    fn literal_multi_character_uses_utf16_length() {
        let code = snippet(Expr::literal("héllo"), Slots { result: 0, pos: 0 });
        assert!(code.contains("input.substr(pos, 5) === \"h\\xE9llo\""));
        assert!(code.contains("pos += 5;"));

        // astral characters count as two units
        let code = snippet(Expr::literal("😀!"), Slots { result: 0, pos: 0 });
        assert!(code.contains("input.substr(pos, 3)"));
    }

    #[test]
    fn empty_literal_always_matches() {
        let code = snippet(Expr::literal(""), Slots { result: 2, pos: 0 });
        assert_eq!(code, "result2 = \"\";");
    }

    #[test]
    fn any_character() {
        let code = snippet(Expr::any(), Slots { result: 0, pos: 0 });
        assert!(code.starts_with("if (input.length > pos) {"));
        assert!(code.contains("matchFailed(\"any character\");"));
    }

    #[test]
    fn class_tests_a_regex() {
        let expr = Expr::class(vec![ClassPart::Range('0', '9')], false, "[0-9]");
        let code = snippet(expr, Slots { result: 0, pos: 0 });
        assert!(code.contains("if (/^[0-9]/.test(input.charAt(pos))) {"));
        assert!(code.contains("matchFailed(\"[0-9]\");"));
    }

    #[test]
    fn rule_ref_calls_the_rule_function() {
        let code = snippet(Expr::rule_ref("start"), Slots { result: 3, pos: 1 });
        assert_eq!(code, "result3 = parse_start();");
    }

    #[test]
    fn sequence_saves_and_restores_position() {
        let expr = Expr::sequence(vec![Expr::literal("a"), Expr::literal("b")]);
        let code = snippet(expr, Slots { result: 0, pos: 0 });

        assert!(code.starts_with("pos0 = pos;"));
        assert!(code.contains("result0 = [result0, result1];"));
        assert!(code.contains("pos = pos0;"));
        // children write consecutive slots
        assert!(code.contains("result1 = \"b\";"));
    }

    #[test]
    fn choice_tries_alternatives_in_order() {
        let expr = Expr::choice(vec![Expr::literal("a"), Expr::literal("b")]);
        let code = snippet(expr, Slots { result: 0, pos: 0 });

        let first = code.find("=== \"a\"").unwrap();
        let fallthrough = code.find("if (result0 === null) {").unwrap();
        let second = code.find("=== \"b\"").unwrap();
        assert!(first < fallthrough && fallthrough < second);
    }

    #[test]
    fn optional_substitutes_the_empty_string() {
        let code = snippet(
            Expr::optional(Expr::literal("a")),
            Slots { result: 0, pos: 0 },
        );
        assert!(code.ends_with("result0 = result0 !== null ? result0 : \"\";"));
    }

    #[test]
    fn zero_or_more_collects_into_an_array() {
        let code = snippet(
            Expr::zero_or_more(Expr::literal("a")),
            Slots { result: 0, pos: 0 },
        );
        assert!(code.starts_with("result0 = [];"));
        assert!(code.contains("while (result1 !== null) {"));
        assert!(code.contains("result0.push(result1);"));
    }

    #[test]
    fn one_or_more_requires_a_first_match() {
        let code = snippet(
            Expr::one_or_more(Expr::literal("a")),
            Slots { result: 0, pos: 0 },
        );
        assert!(code.contains("if (result1 !== null) {"));
        assert!(code.contains("} else {\n  result0 = null;\n}"));
    }

    #[test]
    fn lookaheads_toggle_failure_reporting() {
        let and = snippet(
            Expr::simple_and(Expr::literal("x")),
            Slots { result: 0, pos: 0 },
        );
        assert!(and.starts_with("pos0 = pos;\nreportFailures++;"));
        assert!(and.contains("reportFailures--;"));
        assert!(and.contains("result0 = \"\";\n  pos = pos0;"));

        let not = snippet(
            Expr::simple_not(Expr::literal("x")),
            Slots { result: 0, pos: 0 },
        );
        assert!(not.contains("if (result0 === null) {\n  result0 = \"\";"));
        assert!(not.contains("result0 = null;\n  pos = pos0;"));
    }

    #[test]
    fn semantic_predicates_run_user_code() {
        let and = snippet(Expr::semantic_and("return ok;"), Slots { result: 1, pos: 0 });
        assert_eq!(and, "result1 = (function() { return ok; })() ? \"\" : null;");

        let not = snippet(Expr::semantic_not("return ok;"), Slots { result: 0, pos: 0 });
        assert_eq!(not, "result0 = (function() { return ok; })() ? null : \"\";");
    }

    #[test]
    fn action_with_labeled_body_binds_one_parameter() {
        let expr = Expr::action(
            Expr::labeled("digits", Expr::literal("4")),
            "return digits;",
        );
        let code = snippet(expr, Slots { result: 0, pos: 0 });
        assert!(code.contains("result0 = (function(digits) { return digits; })(result0);"));
        assert!(code.contains("if (result0 === null) {\n  pos = pos0;\n}"));
    }

    #[test]
    fn action_with_sequence_body_binds_labeled_elements() {
        let expr = Expr::action(
            Expr::sequence(vec![
                Expr::labeled("head", Expr::literal("a")),
                Expr::literal("-"),
                Expr::labeled("tail", Expr::literal("b")),
            ]),
            "return [head, tail];",
        );
        let code = snippet(expr, Slots { result: 0, pos: 0 });
        assert!(code
            .contains("(function(head, tail) { return [head, tail]; })(result0[0], result0[2])"));
    }

    #[test]
    fn action_without_labels_binds_nothing() {
        let expr = Expr::action(Expr::literal("a"), "return 1;");
        let code = snippet(expr, Slots { result: 0, pos: 0 });
        assert!(code.contains("result0 = (function() { return 1; })();"));
    }

    #[test]
    fn rule_wrapper_memoizes() {
        let source = emit(single_rule(Expr::literal("a")));
        assert!(source.contains("function parse_start() {"));
        assert!(source.contains("var cacheKey = \"start@\" + pos;"));
        assert!(source.contains("pos = cachedResult.nextPos;"));
        assert!(source.contains("cache[cacheKey] = {"));
    }

    #[test]
    fn rule_wrapper_declares_the_annotated_slots() {
        let expr = Expr::sequence(vec![Expr::literal("a"), Expr::literal("b")]);
        let source = emit(single_rule(expr));
        // body depths (2, 1) plus one each
        assert!(source.contains("var result0, result1, result2;"));
        assert!(source.contains("var pos0, pos1;"));
    }

    #[test]
    fn display_name_reports_the_whole_rule() {
        let mut grammar = Grammar::new();
        grammar.add_rule("ident", Some("identifier"), Expr::literal("a"));
        let source = emit(grammar);

        assert!(source.contains("reportFailures++;"));
        assert!(source.contains("if (reportFailures === 0 && result0 === null) {"));
        assert!(source.contains("matchFailed(\"identifier\");"));
    }

    #[test]
    fn single_start_rule_is_validated_inline() {
        let source = emit(single_rule(Expr::literal("a")));
        assert!(source.contains("if (startRule !== \"start\") {"));
        assert!(source.contains("var result = parse_start();"));
        assert!(!source.contains("parseFunctions"));
    }

    #[test]
    fn multiple_rules_dispatch_through_a_table() {
        let mut grammar = Grammar::new();
        grammar.add_rule("a", None, Expr::literal("x"));
        grammar.add_rule("b", None, Expr::literal("y"));
        let source = emit(grammar);

        assert!(source.contains("var parseFunctions = {"));
        assert!(source.contains("\"a\": parse_a,"));
        assert!(source.contains("\"b\": parse_b"));
        assert!(source.contains("startRule = \"a\";"));
        assert!(source.contains("var result = parseFunctions[startRule]();"));
    }

    #[test]
    fn start_rules_option_restricts_the_table() {
        let mut grammar = Grammar::new();
        grammar.add_rule("a", None, Expr::literal("x"));
        grammar.add_rule("b", None, Expr::literal("y"));
        grammar.add_rule("c", None, Expr::literal("z"));

        let options = CompileOptions {
            start_rules: vec!["b".to_owned(), "c".to_owned()],
            ..CompileOptions::default()
        };
        let source = compile(grammar, &options).unwrap();

        assert!(source.contains("\"b\": parse_b"));
        assert!(!source.contains("\"a\": parse_a"));
        // the grammar start rule is not exposed, fall back to option order
        assert!(source.contains("startRule = \"b\";"));
        // parse_a is still emitted, only dispatch is restricted
        assert!(source.contains("function parse_a() {"));
    }

    #[test]
    fn unknown_start_rules_fail() {
        let mut grammar = Grammar::new();
        grammar.add_rule("a", None, Expr::literal("x"));

        let options = CompileOptions {
            start_rules: vec!["ghost".to_owned()],
            ..CompileOptions::default()
        };
        assert!(matches!(
            compile(grammar, &options),
            Err(CompileError::NoStartRule)
        ));
    }

    #[test]
    fn self_parsing_omits_the_helpers() {
        let grammar = single_rule(Expr::literal("a"));
        let options = CompileOptions {
            self_parsing: true,
            ..CompileOptions::default()
        };
        let source = compile(grammar, &options).unwrap();

        assert!(!source.contains("function quote(s)"));
        assert!(!source.contains("function padLeft("));
        assert!(!source.contains("function escape("));
        // failure machinery is still emitted
        assert!(source.contains("function matchFailed(failure)"));
    }

    #[test]
    fn initializer_runs_before_the_start_rule() {
        let mut grammar = single_rule(Expr::literal("a"));
        grammar.set_initializer("var depth = 0;");
        let source = emit(grammar);

        let initializer = source.find("var depth = 0;").unwrap();
        let invocation = source.find("var result = parse_start();").unwrap();
        let definitions = source.find("function parse_start() {").unwrap();
        assert!(definitions < initializer && initializer < invocation);
    }

    #[test]
    fn wrapper_exposes_parse_and_to_source() {
        let source = emit(single_rule(Expr::literal("a")));
        assert!(source.starts_with("(function(){"));
        assert!(source.ends_with("})()"));
        assert!(source.contains("parse: function(input, startRule) {"));
        assert!(source.contains("toSource: function() { return this._source; }"));
        assert!(source.contains("result.SyntaxError.prototype = Error.prototype;"));
    }

    #[test]
    fn error_synthesis_machinery_is_emitted() {
        let source = emit(single_rule(Expr::literal("a")));
        assert!(source.contains("function cleanupExpected(expected) {"));
        assert!(source.contains("function computeErrorPosition() {"));
        assert!(source.contains("\"Expected \" + expected + \" but \" + found + \" found.\""));
        assert!(source.contains("throw new this.SyntaxError("));
    }
}
