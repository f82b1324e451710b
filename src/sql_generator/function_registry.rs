/// Query function registry
///
/// Maps model-level function names to relational AST constructions with a
/// result type rule. Lookup is case-insensitive.
use std::collections::HashMap;

use super::sql_ast::{CaseBranch, SqlExpr, SqlLiteral, SqlOperator};
use crate::mapping_catalog::data_types::SemanticType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionKind {
    Operator(SqlOperator),
    /// `+`: string concatenation when the first argument is a string
    Plus,
    And,
    Or,
    Not,
    IsNull,
    IsNotNull,
    /// `if(cond, then, else)` -> `case when`
    Conditional,
    /// Plain SQL function call
    Sql(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultType {
    Boolean,
    String,
    Integer,
    Float,
    /// Same as the argument at the given position
    Argument(usize),
}

/// Function mapping entry
#[derive(Debug, Clone)]
pub struct FunctionMapping {
    #[allow(dead_code)]
    pub name: &'static str,
    pub kind: FunctionKind,
    pub min_args: usize,
    /// `None` means variadic
    pub max_args: Option<usize>,
    pub result: ResultType,
}

impl FunctionMapping {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map(|m| count <= m).unwrap_or(true)
    }

    pub fn result_type(&self, arg_types: &[SemanticType]) -> SemanticType {
        match self.result {
            ResultType::Boolean => SemanticType::Boolean,
            ResultType::String => SemanticType::String,
            ResultType::Integer => SemanticType::Integer,
            ResultType::Float => SemanticType::Float,
            ResultType::Argument(i) => arg_types.get(i).cloned().unwrap_or(SemanticType::String),
        }
    }

    /// Build the expression; `args` has already been checked with [`accepts`].
    ///
    /// [`accepts`]: FunctionMapping::accepts
    pub fn build(&self, mut args: Vec<SqlExpr>, arg_types: &[SemanticType]) -> SqlExpr {
        match self.kind {
            FunctionKind::Operator(op) => {
                let right = args.pop().unwrap_or(SqlExpr::Literal(SqlLiteral::Null));
                let left = args.pop().unwrap_or(SqlExpr::Literal(SqlLiteral::Null));
                SqlExpr::binary(op, left, right)
            }
            FunctionKind::Plus => {
                if matches!(arg_types.first(), Some(SemanticType::String)) {
                    SqlExpr::Function {
                        name: "concat".to_string(),
                        args,
                    }
                } else {
                    let mut iter = args.into_iter();
                    let first = iter.next().unwrap_or(SqlExpr::Literal(SqlLiteral::Null));
                    iter.fold(first, |acc, next| SqlExpr::binary(SqlOperator::Add, acc, next))
                }
            }
            FunctionKind::And => {
                SqlExpr::and_all(args).unwrap_or(SqlExpr::Literal(SqlLiteral::Boolean(true)))
            }
            FunctionKind::Or => {
                if args.len() == 1 {
                    args.pop().unwrap_or(SqlExpr::Literal(SqlLiteral::Boolean(false)))
                } else {
                    SqlExpr::Or(args)
                }
            }
            FunctionKind::Not => SqlExpr::Not(Box::new(
                args.pop().unwrap_or(SqlExpr::Literal(SqlLiteral::Null)),
            )),
            FunctionKind::IsNull => SqlExpr::IsNull(Box::new(
                args.pop().unwrap_or(SqlExpr::Literal(SqlLiteral::Null)),
            )),
            FunctionKind::IsNotNull => SqlExpr::IsNotNull(Box::new(
                args.pop().unwrap_or(SqlExpr::Literal(SqlLiteral::Null)),
            )),
            FunctionKind::Conditional => {
                let mut iter = args.into_iter();
                let when = iter.next().unwrap_or(SqlExpr::Literal(SqlLiteral::Null));
                let then = iter.next().unwrap_or(SqlExpr::Literal(SqlLiteral::Null));
                let else_expr = iter.next().map(Box::new);
                SqlExpr::Case {
                    branches: vec![CaseBranch { when, then }],
                    else_expr,
                }
            }
            FunctionKind::Sql(name) => SqlExpr::Function {
                name: name.to_string(),
                args,
            },
        }
    }
}

/// Get function mapping for a query function name
pub fn get_function_mapping(name: &str) -> Option<FunctionMapping> {
    let lower = name.to_lowercase();
    FUNCTION_MAPPINGS.get(lower.as_str()).cloned()
}

fn entry(
    name: &'static str,
    kind: FunctionKind,
    min_args: usize,
    max_args: Option<usize>,
    result: ResultType,
) -> FunctionMapping {
    FunctionMapping {
        name,
        kind,
        min_args,
        max_args,
        result,
    }
}

// Static function mapping table
lazy_static::lazy_static! {
    static ref FUNCTION_MAPPINGS: HashMap<&'static str, FunctionMapping> = {
        let mut m = HashMap::new();

        // ===== COMPARISONS =====
        let comparisons = [
            ("equal", SqlOperator::Eq),
            ("notequal", SqlOperator::NotEq),
            ("lessthan", SqlOperator::Lt),
            ("lessthanequal", SqlOperator::LtEq),
            ("greaterthan", SqlOperator::Gt),
            ("greaterthanequal", SqlOperator::GtEq),
        ];
        for (name, op) in comparisons {
            m.insert(name, entry(name, FunctionKind::Operator(op), 2, Some(2), ResultType::Boolean));
        }

        // ===== BOOLEAN =====
        m.insert("and", entry("and", FunctionKind::And, 1, None, ResultType::Boolean));
        m.insert("or", entry("or", FunctionKind::Or, 1, None, ResultType::Boolean));
        m.insert("not", entry("not", FunctionKind::Not, 1, Some(1), ResultType::Boolean));
        m.insert("isempty", entry("isEmpty", FunctionKind::IsNull, 1, Some(1), ResultType::Boolean));
        m.insert("isnotempty", entry("isNotEmpty", FunctionKind::IsNotNull, 1, Some(1), ResultType::Boolean));
        m.insert("if", entry("if", FunctionKind::Conditional, 3, Some(3), ResultType::Argument(1)));

        // ===== ARITHMETIC =====
        m.insert("plus", entry("plus", FunctionKind::Plus, 1, None, ResultType::Argument(0)));
        m.insert("minus", entry("minus", FunctionKind::Operator(SqlOperator::Sub), 2, Some(2), ResultType::Argument(0)));
        m.insert("times", entry("times", FunctionKind::Operator(SqlOperator::Mul), 2, Some(2), ResultType::Argument(0)));
        // Division always yields a float
        m.insert("divide", entry("divide", FunctionKind::Operator(SqlOperator::Div), 2, Some(2), ResultType::Float));
        m.insert("abs", entry("abs", FunctionKind::Sql("abs"), 1, Some(1), ResultType::Argument(0)));
        m.insert("round", entry("round", FunctionKind::Sql("round"), 1, Some(2), ResultType::Argument(0)));

        // ===== STRINGS =====
        m.insert("concat", entry("concat", FunctionKind::Sql("concat"), 1, None, ResultType::String));
        m.insert("toupper", entry("toUpper", FunctionKind::Sql("upper"), 1, Some(1), ResultType::String));
        m.insert("tolower", entry("toLower", FunctionKind::Sql("lower"), 1, Some(1), ResultType::String));
        m.insert("trim", entry("trim", FunctionKind::Sql("trim"), 1, Some(1), ResultType::String));
        m.insert("length", entry("length", FunctionKind::Sql("length"), 1, Some(1), ResultType::Integer));
        m.insert("startswith", entry("startsWith", FunctionKind::Sql("startswith"), 2, Some(2), ResultType::Boolean));
        m.insert("contains", entry("contains", FunctionKind::Sql("contains"), 2, Some(2), ResultType::Boolean));

        m
    };
}
