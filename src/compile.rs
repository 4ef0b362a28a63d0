//! Compiles parsed search clauses into query plans and SQL.
//!
//! A clause naming a `{column}` compiles to a single-column match. A clause
//! without one is a vague search: every searchable column of the group is
//! tested with the regex predicate and hits are ranked by relevance. A clause
//! without a group fans out into one vague search per group. A grouped clause
//! ending in a bare `&` has the following grouped clause joined onto it.

use tracing::debug;

use crate::error::{CasefileError, Result};
use crate::parse::{Clause, Combinator, Literal, MatchOp, parse};
use crate::plan::{ColumnRef, CompiledQuery, Predicate, QueryPlan, Ranking};
use crate::schema::Group;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPlan {
    /// The empty query: every record of every group, unranked.
    Everything(CompiledQuery),
    /// The input did not parse; no group has any hit.
    NoMatch,
    Queries(Vec<CompiledQuery>),
}

pub fn compile(input: &str) -> Result<SearchPlan> {
    if input.is_empty() {
        return Ok(SearchPlan::Everything(CompiledQuery::everything()));
    }
    match parse(input) {
        Some(clauses) => Ok(SearchPlan::Queries(compile_clauses(&clauses)?)),
        None => Ok(SearchPlan::NoMatch),
    }
}

pub fn compile_clauses(clauses: &[Clause]) -> Result<Vec<CompiledQuery>> {
    let mut plans: Vec<QueryPlan> = Vec::new();
    let mut chain_open = false;
    for clause in clauses {
        match &clause.group {
            Some(name) => {
                let plan = plan_clause(name.parse()?, clause)?;
                let plan = match plans.pop() {
                    Some(previous) if chain_open => previous.join(plan)?,
                    previous => {
                        plans.extend(previous);
                        plan
                    }
                };
                plans.push(plan);
                chain_open = clause.trailing == Some(Combinator::And);
            }
            None => {
                plans.extend(fan_out(clause)?);
                chain_open = false;
            }
        }
    }
    debug!(clauses = clauses.len(), queries = plans.len(), "compiled search");
    Ok(plans.iter().map(QueryPlan::render).collect())
}

/// Compiles input for a selection list bound to one group. Empty input lists
/// the whole group, unparseable input gives `None`.
pub fn compile_restricted(input: &str, group: Group) -> Result<Option<CompiledQuery>> {
    if input.is_empty() {
        return Ok(Some(CompiledQuery::all_of(group)));
    }
    let Some(clauses) = parse(input) else {
        return Ok(None);
    };
    let [clause] = clauses.as_slice() else {
        return Err(CasefileError::Restricted(format!(
            "expected a single clause, found {}",
            clauses.len()
        )));
    };
    if let Some(name) = &clause.group {
        let named: Group = name.parse()?;
        if named != group {
            return Err(CasefileError::Restricted(format!(
                "search is bound to {group}, not {named}"
            )));
        }
    }
    Ok(Some(plan_clause(group, clause)?.render()))
}

// Groups lacking a column some subterm names are left out.
fn fan_out(clause: &Clause) -> Result<Vec<QueryPlan>> {
    let mut plans = Vec::new();
    let mut skipped = None;
    for group in Group::ALL {
        match plan_clause(group, clause) {
            Ok(plan) => plans.push(plan),
            Err(e @ CasefileError::UnknownColumn { .. }) => {
                debug!(%group, error = %e, "group left out of fan-out");
                skipped.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    match skipped {
        Some(e) if plans.is_empty() => Err(e),
        _ => Ok(plans),
    }
}

fn plan_clause(group: Group, clause: &Clause) -> Result<QueryPlan> {
    let returns = resolve_returns(group, clause.returns.as_deref())?;
    let subterms = clause
        .subterms
        .iter()
        .map(|term| {
            Ok((
                term.combinator,
                match_column(group, &term.column, term.op, &term.value)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    if let Some(column) = &clause.column {
        let op = clause.op.unwrap_or(MatchOp::Regex);
        let head = match_column(group, column, op, &clause.value)?;
        return Ok(QueryPlan::new(
            group,
            Predicate::Chain(Box::new(head), subterms),
            returns,
        ));
    }
    let pattern = format!(".*{}.*", clause.value.raw());
    let columns = ColumnRef::all_of(group);
    let any = Predicate::Any(
        columns
            .iter()
            .map(|column| Predicate::Match {
                column: *column,
                op: MatchOp::Regex,
                value: pattern.clone(),
            })
            .collect(),
    );
    let predicate = if subterms.is_empty() {
        any
    } else {
        Predicate::Chain(Box::new(Predicate::Group(Box::new(any))), subterms)
    };
    Ok(QueryPlan::new(group, predicate, returns).ranked(Ranking { columns, pattern }))
}

fn match_column(group: Group, column: &str, op: MatchOp, value: &Literal) -> Result<Predicate> {
    let value = match op {
        MatchOp::Exact => value.unquoted(),
        MatchOp::Regex => value.raw(),
    };
    Ok(Predicate::Match {
        column: ColumnRef::resolve(group, column)?,
        op,
        value: value.to_string(),
    })
}

fn resolve_returns(group: Group, spec: Option<&[String]>) -> Result<Vec<String>> {
    let named: Vec<String> = spec
        .unwrap_or_default()
        .iter()
        .filter(|name| !name.is_empty())
        .cloned()
        .collect();
    if named.is_empty() {
        return Ok(group.default_returns().iter().map(|s| s.to_string()).collect());
    }
    for name in &named {
        group.validate_return(name)?;
    }
    Ok(named)
}
