/// Binding text parser for mapping documents
///
/// Parses the compact binding strings used in mapping YAML:
/// - JSON paths: `FIRM_DETAILS['address']['lines'][2]`, `['legalName']`
/// - Join predicates: `source.MANAGERID = target.ID and target.ACTIVE = 1`
/// - Semi-structured join operands with casts: `source['id']::number = target.ID`
/// - Derived properties: `concat(firstName, ' ', lastName)`, `upper(firm.legalName)`
///
/// Parsed once when the mapping is loaded; the compiler never sees raw text.
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, none_of},
    combinator::{map, map_res, opt, recognize, value},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
    IResult, Parser,
};
use serde::Serialize;

use super::data_types::CastType;

/// One step of a JSON path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSegment {
    Key(String),
    Index(i64),
}

/// Where a JSON path starts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonRoot {
    /// A semi-structured column of the mapped row
    Column(String),
    /// The enclosing document (embedded classes)
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JsonPathBinding {
    pub root: JsonRoot,
    pub segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingLiteral {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl ComparisonOp {
    pub fn to_str(&self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::Less => "<",
            ComparisonOp::LessOrEqual => "<=",
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterOrEqual => ">=",
        }
    }
}

/// Column (optional) plus JSON segments plus optional cast, relative to one
/// side of a join
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperandPath {
    pub column: Option<String>,
    pub segments: Vec<PathSegment>,
    pub cast: Option<CastType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOperand {
    Source(OperandPath),
    Target(OperandPath),
    Literal(BindingLiteral),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub left: PredicateOperand,
    pub op: ComparisonOp,
    pub right: PredicateOperand,
}

/// Conjunction of comparisons
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinPredicate {
    pub conjuncts: Vec<Comparison>,
}

impl JoinPredicate {
    /// Target-side columns referenced by the predicate, in order of appearance
    pub fn target_columns(&self) -> Vec<&str> {
        let mut cols = Vec::new();
        for cmp in &self.conjuncts {
            for operand in [&cmp.left, &cmp.right] {
                if let PredicateOperand::Target(OperandPath {
                    column: Some(c), ..
                }) = operand
                {
                    if !cols.contains(&c.as_str()) {
                        cols.push(c.as_str());
                    }
                }
            }
        }
        cols
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedArg {
    /// Property chain relative to the owning class: `firm.legalName`
    Property(Vec<String>),
    Literal(BindingLiteral),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedExpression {
    pub function: String,
    pub args: Vec<DerivedArg>,
}

fn ws<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn parse_bare_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
    ))
    .parse(input)
}

fn parse_quoted_identifier(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while1(|c: char| c != '"'), char('"')).parse(input)
}

fn parse_identifier(input: &str) -> IResult<&str, String> {
    map(
        alt((parse_quoted_identifier, parse_bare_identifier)),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

fn parse_string_literal(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('\''),
            many0(alt((value('\'', tag("''")), none_of("'")))),
            char('\''),
        ),
        |chars: Vec<char>| chars.into_iter().collect(),
    )
    .parse(input)
}

fn parse_integer(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
        s.parse::<i64>()
    })
    .parse(input)
}

fn parse_float(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize((opt(char('-')), digit1, char('.'), digit1)),
        |s: &str| s.parse::<f64>(),
    )
    .parse(input)
}

fn parse_literal(input: &str) -> IResult<&str, BindingLiteral> {
    alt((
        map(parse_string_literal, BindingLiteral::String),
        map(parse_float, BindingLiteral::Float),
        map(parse_integer, BindingLiteral::Integer),
        value(BindingLiteral::Boolean(true), tag_no_case("true")),
        value(BindingLiteral::Boolean(false), tag_no_case("false")),
    ))
    .parse(input)
}

fn parse_segment(input: &str) -> IResult<&str, PathSegment> {
    delimited(
        char('['),
        ws(alt((
            map(parse_string_literal, PathSegment::Key),
            map(parse_integer, PathSegment::Index),
        ))),
        char(']'),
    )
    .parse(input)
}

fn parse_cast(input: &str) -> IResult<&str, CastType> {
    map_res(preceded(tag("::"), parse_bare_identifier), |s: &str| {
        s.parse::<CastType>()
    })
    .parse(input)
}

fn parse_json_path_inner(input: &str) -> IResult<&str, JsonPathBinding> {
    let (input, column) = opt(parse_identifier).parse(input)?;
    let (input, segments) = many0(parse_segment).parse(input)?;
    let root = match column {
        Some(c) => JsonRoot::Column(c),
        None => JsonRoot::Context,
    };
    Ok((input, JsonPathBinding { root, segments }))
}

fn parse_side_operand(input: &str) -> IResult<&str, PredicateOperand> {
    let (rest, side) = parse_bare_identifier(input)?;
    let is_source = match side {
        "source" => true,
        "target" => false,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    };
    let (rest, column) = opt(preceded(char('.'), parse_identifier)).parse(rest)?;
    let (rest, segments) = many0(parse_segment).parse(rest)?;
    let (rest, cast) = opt(parse_cast).parse(rest)?;
    let path = OperandPath {
        column,
        segments,
        cast,
    };
    Ok((
        rest,
        if is_source {
            PredicateOperand::Source(path)
        } else {
            PredicateOperand::Target(path)
        },
    ))
}

fn parse_operand(input: &str) -> IResult<&str, PredicateOperand> {
    alt((
        parse_side_operand,
        map(parse_literal, PredicateOperand::Literal),
    ))
    .parse(input)
}

fn parse_comparison_op(input: &str) -> IResult<&str, ComparisonOp> {
    // Two-character operators first
    alt((
        value(ComparisonOp::LessOrEqual, tag("<=")),
        value(ComparisonOp::GreaterOrEqual, tag(">=")),
        value(ComparisonOp::NotEqual, tag("!=")),
        value(ComparisonOp::NotEqual, tag("<>")),
        value(ComparisonOp::Less, tag("<")),
        value(ComparisonOp::Greater, tag(">")),
        value(ComparisonOp::Equal, tag("=")),
    ))
    .parse(input)
}

fn parse_bare_comparison(input: &str) -> IResult<&str, Comparison> {
    let (input, left) = ws(parse_operand).parse(input)?;
    let (input, op) = ws(parse_comparison_op).parse(input)?;
    let (input, right) = ws(parse_operand).parse(input)?;
    Ok((input, Comparison { left, op, right }))
}

fn parse_comparison(input: &str) -> IResult<&str, Comparison> {
    alt((
        delimited(ws(char('(')), parse_bare_comparison, ws(char(')'))),
        parse_bare_comparison,
    ))
    .parse(input)
}

fn parse_and_keyword(input: &str) -> IResult<&str, &str> {
    delimited(multispace0, tag_no_case("and"), multispace1).parse(input)
}

fn parse_predicate_inner(input: &str) -> IResult<&str, JoinPredicate> {
    map(
        separated_list1(parse_and_keyword, parse_comparison),
        |conjuncts| JoinPredicate { conjuncts },
    )
    .parse(input)
}

fn parse_derived_arg(input: &str) -> IResult<&str, DerivedArg> {
    alt((
        map(parse_literal, DerivedArg::Literal),
        map(
            separated_list1(char('.'), parse_bare_identifier),
            |parts: Vec<&str>| DerivedArg::Property(parts.into_iter().map(String::from).collect()),
        ),
    ))
    .parse(input)
}

fn parse_derived_inner(input: &str) -> IResult<&str, DerivedExpression> {
    let (input, function) = ws(parse_bare_identifier).parse(input)?;
    let (input, args) = delimited(
        char('('),
        separated_list0(char(','), ws(parse_derived_arg)),
        terminated(char(')'), multispace0),
    )
    .parse(input)?;
    Ok((
        input,
        DerivedExpression {
            function: function.to_string(),
            args,
        },
    ))
}

fn finish<T>(text: &str, result: IResult<&str, T>) -> Result<T, String> {
    match result {
        Ok((rest, parsed)) => {
            let rest = rest.trim();
            if rest.is_empty() {
                Ok(parsed)
            } else {
                Err(format!("Unexpected trailing content: '{}'", rest))
            }
        }
        Err(e) => Err(format!("Parse error in '{}': {:?}", text, e)),
    }
}

/// Parse a JSON path binding (`COL['a'][0]` or context-rooted `['a']`).
pub fn parse_json_path(text: &str) -> Result<JsonPathBinding, String> {
    let path = finish(text, ws(parse_json_path_inner).parse(text))?;
    if path.root == JsonRoot::Context && path.segments.is_empty() {
        return Err(format!("Empty JSON path '{}'", text));
    }
    Ok(path)
}

/// Parse a join predicate template.
pub fn parse_join_predicate(text: &str) -> Result<JoinPredicate, String> {
    let predicate = finish(text, parse_predicate_inner(text))?;
    let has_target = predicate.conjuncts.iter().any(|c| {
        matches!(c.left, PredicateOperand::Target(_)) || matches!(c.right, PredicateOperand::Target(_))
    });
    if !has_target {
        return Err(format!(
            "Join predicate '{}' never references the target side",
            text
        ));
    }
    Ok(predicate)
}

/// Parse a derived property expression.
pub fn parse_derived_expression(text: &str) -> Result<DerivedExpression, String> {
    finish(text, parse_derived_inner(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_rooted_path() {
        let path = parse_json_path("FIRM_DETAILS['address']['lines'][2]").unwrap();
        assert_eq!(path.root, JsonRoot::Column("FIRM_DETAILS".into()));
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Key("address".into()),
                PathSegment::Key("lines".into()),
                PathSegment::Index(2),
            ]
        );
    }

    #[test]
    fn test_context_rooted_path() {
        let path = parse_json_path(" ['legalName'] ").unwrap();
        assert_eq!(path.root, JsonRoot::Context);
        assert_eq!(path.segments, vec![PathSegment::Key("legalName".into())]);
    }

    #[test]
    fn test_escaped_key() {
        let path = parse_json_path("DOC['o''brien']").unwrap();
        assert_eq!(path.segments, vec![PathSegment::Key("o'brien".into())]);
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(parse_json_path("").is_err());
        assert!(parse_json_path("DOC['a'] junk").is_err());
    }

    #[test]
    fn test_simple_join_predicate() {
        let pred = parse_join_predicate("source.MANAGERID = target.ID").unwrap();
        assert_eq!(pred.conjuncts.len(), 1);
        assert_eq!(
            pred.conjuncts[0].left,
            PredicateOperand::Source(OperandPath {
                column: Some("MANAGERID".into()),
                segments: vec![],
                cast: None,
            })
        );
        assert_eq!(pred.target_columns(), vec!["ID"]);
    }

    #[test]
    fn test_conjunction_with_literal_and_cast() {
        let pred = parse_join_predicate(
            "source['id']::number = target.ID AND (source['tag']::varchar = 'FIRM')",
        )
        .unwrap();
        assert_eq!(pred.conjuncts.len(), 2);
        match &pred.conjuncts[0].left {
            PredicateOperand::Source(op) => {
                assert_eq!(op.column, None);
                assert_eq!(op.cast, Some(CastType::Number));
            }
            other => panic!("unexpected operand {:?}", other),
        }
        assert_eq!(
            pred.conjuncts[1].right,
            PredicateOperand::Literal(BindingLiteral::String("FIRM".into()))
        );
    }

    #[test]
    fn test_predicate_requires_target() {
        assert!(parse_join_predicate("source.A = 1").is_err());
    }

    #[test]
    fn test_predicate_rejects_unknown_side() {
        assert!(parse_join_predicate("sources.A = target.B").is_err());
    }

    #[test]
    fn test_comparison_operators() {
        let pred = parse_join_predicate("target.FROM_Z <= source.D and target.X <> 2").unwrap();
        assert_eq!(pred.conjuncts[0].op, ComparisonOp::LessOrEqual);
        assert_eq!(pred.conjuncts[1].op, ComparisonOp::NotEqual);
    }

    #[test]
    fn test_derived_expression() {
        let derived = parse_derived_expression("concat(firstName, ' ', firm.legalName)").unwrap();
        assert_eq!(derived.function, "concat");
        assert_eq!(
            derived.args,
            vec![
                DerivedArg::Property(vec!["firstName".into()]),
                DerivedArg::Literal(BindingLiteral::String(" ".into())),
                DerivedArg::Property(vec!["firm".into(), "legalName".into()]),
            ]
        );
    }
}
