//! Parser for the search box mini-language.
//!
//! A query is a sequence of clauses. Each clause may name a group, a return spec
//! and a column, followed by an operator and a value, and may chain sub-terms on
//! the same group:
//!
//! ```text
//! user[first_name;notes]{last_name}:mül & {gender}=Female | case:'Case 7'
//! ```
//!
//! The whole input must be consumed; anything else is "no match" and [`parse`]
//! returns `None`. Grammar details live in `search.pest`.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use tracing::debug;

#[derive(Parser)]
#[grammar = "search.pest"]
struct SearchParser;

/// `:` tests with the `REGEXP` predicate, `=` compares exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOp {
    Regex,
    Exact,
}

impl MatchOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            ":" => Some(MatchOp::Regex),
            "=" => Some(MatchOp::Exact),
            _ => None,
        }
    }
    pub fn sql(self) -> &'static str {
        match self {
            MatchOp::Regex => "REGEXP",
            MatchOp::Exact => "=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "&" => Some(Combinator::And),
            "|" => Some(Combinator::Or),
            _ => None,
        }
    }
    pub fn sql(self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}

/// A search value as typed, trimmed. Quotes are kept because the regex
/// predicate gives single-quoted patterns full-match semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal(String);

impl Literal {
    pub fn new(text: &str) -> Self {
        Self(text.trim().to_string())
    }
    pub fn raw(&self) -> &str {
        &self.0
    }
    pub fn is_quoted(&self) -> bool {
        self.0.len() >= 2 && self.0.starts_with('\'') && self.0.ends_with('\'')
    }
    /// The value without its surrounding single quotes, used for exact matches.
    pub fn unquoted(&self) -> &str {
        if self.is_quoted() {
            &self.0[1..self.0.len() - 1]
        } else {
            &self.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTerm {
    pub combinator: Combinator,
    pub column: String,
    pub op: MatchOp,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub group: Option<String>,
    /// Attribute names between `[` and `]`, empty items dropped.
    pub returns: Option<Vec<String>>,
    pub column: Option<String>,
    pub op: Option<MatchOp>,
    pub value: Literal,
    pub subterms: Vec<SubTerm>,
    /// A bare `&` or `|` ending the clause; `&` chains the next clause onto this one.
    pub trailing: Option<Combinator>,
}

/// Parses `input` into clauses, or `None` when the grammar does not consume all of it.
pub fn parse(input: &str) -> Option<Vec<Clause>> {
    let mut pairs = match SearchParser::parse(Rule::query, input) {
        Ok(pairs) => pairs,
        Err(e) => {
            debug!(input, error = %e, "query does not parse");
            return None;
        }
    };
    pairs
        .next()?
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::clause)
        .map(clause)
        .collect()
}

fn clause(pair: Pair<Rule>) -> Option<Clause> {
    let mut group = None;
    let mut returns = None;
    let mut column = None;
    let mut op = None;
    let mut value = None;
    let mut subterms = Vec::new();
    let mut trailing = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::prefix => {
                for piece in part.into_inner() {
                    match piece.as_rule() {
                        Rule::group => group = Some(piece.as_str().to_string()),
                        Rule::returns => {
                            returns = Some(
                                piece
                                    .into_inner()
                                    .filter(|item| item.as_rule() == Rule::item)
                                    .map(|item| item.as_str().to_string())
                                    .collect(),
                            )
                        }
                        Rule::column => column = Some(piece.as_str().to_string()),
                        Rule::op => op = MatchOp::from_symbol(piece.as_str()),
                        _ => (),
                    }
                }
            }
            Rule::value => value = Some(Literal::new(part.as_str())),
            Rule::subterm => subterms.push(subterm(part)?),
            Rule::tail => {
                trailing = part
                    .into_inner()
                    .find(|piece| piece.as_rule() == Rule::combinator)
                    .and_then(|piece| Combinator::from_symbol(piece.as_str()));
            }
            _ => (),
        }
    }
    Some(Clause {
        group,
        returns,
        column,
        op,
        value: value?,
        subterms,
        trailing,
    })
}

fn subterm(pair: Pair<Rule>) -> Option<SubTerm> {
    let mut combinator = None;
    let mut column = None;
    let mut op = None;
    let mut value = None;
    for piece in pair.into_inner() {
        match piece.as_rule() {
            Rule::combinator => combinator = Combinator::from_symbol(piece.as_str()),
            Rule::column => column = Some(piece.as_str().to_string()),
            Rule::op => op = MatchOp::from_symbol(piece.as_str()),
            Rule::sub_value => value = Some(Literal::new(piece.as_str())),
            _ => (),
        }
    }
    Some(SubTerm {
        combinator: combinator?,
        column: column?,
        op: op?,
        value: value?,
    })
}
