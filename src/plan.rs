//! Typed query plans and their rendering to SQL.
//!
//! A [`QueryPlan`] keeps the root group, the groups joined onto it, an optional
//! relevance ranking and a predicate tree. SQL text is produced only by
//! [`QueryPlan::render`], which walks the plan in placeholder order so the
//! parameter list always lines up with the `?` markers.

use std::fmt;

use crate::error::{CasefileError, Result};
use crate::parse::{Combinator, MatchOp};
use crate::schema::{Group, Table, join_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Table,
    pub column: &'static str,
}

impl ColumnRef {
    pub fn resolve(group: Group, name: &str) -> Result<Self> {
        let (table, column) = group.resolve_column(name)?;
        Ok(Self { table, column })
    }
    /// Every searchable column of the group, in ranking order.
    pub fn all_of(group: Group) -> Vec<Self> {
        group
            .columns()
            .iter()
            .flat_map(|(table, columns)| {
                columns.iter().map(move |column| ColumnRef {
                    table: *table,
                    column: *column,
                })
            })
            .collect()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Match {
        column: ColumnRef,
        op: MatchOp,
        value: String,
    },
    /// Alternatives joined by `OR`, without parentheses.
    Any(Vec<Predicate>),
    /// A parenthesized predicate.
    Group(Box<Predicate>),
    /// A head followed by terms combined left to right.
    Chain(Box<Predicate>, Vec<(Combinator, Predicate)>),
}

impl Predicate {
    fn render(&self, sql: &mut String, params: &mut Vec<String>) {
        match self {
            Predicate::Match { column, op, value } => {
                sql.push_str(&format!("{} {} ?", column, op.sql()));
                params.push(value.clone());
            }
            Predicate::Any(alternatives) => {
                for (i, alternative) in alternatives.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" OR ");
                    }
                    alternative.render(sql, params);
                }
            }
            Predicate::Group(inner) => {
                sql.push('(');
                inner.render(sql, params);
                sql.push(')');
            }
            Predicate::Chain(head, terms) => {
                head.render(sql, params);
                for (combinator, term) in terms {
                    sql.push_str(&format!(" {} ", combinator.sql()));
                    term.render(sql, params);
                }
            }
        }
    }
    // Splits a predicate so its first part can follow an `AND` without
    // changing how the rest binds.
    fn into_parts(self) -> (Predicate, Vec<(Combinator, Predicate)>) {
        match self {
            Predicate::Chain(head, terms) => (*head, terms),
            any @ Predicate::Any(_) => (Predicate::Group(Box::new(any)), Vec::new()),
            other => (other, Vec::new()),
        }
    }
}

/// Relevance ranking of a vague search: exact matches score above pattern
/// matches, and earlier columns above later ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    pub columns: Vec<ColumnRef>,
    pub pattern: String,
}

impl Ranking {
    fn render(&self, sql: &mut String, params: &mut Vec<String>) {
        let n = self.columns.len();
        sql.push_str("CASE");
        for (i, column) in self.columns.iter().enumerate() {
            sql.push_str(&format!(
                " WHEN {column} = ? THEN {} WHEN {column} REGEXP ? THEN {}",
                2 * n + 2 - i,
                n - i
            ));
            params.push(self.pattern.clone());
            params.push(self.pattern.clone());
        }
        sql.push_str(" ELSE 0 END AS relevance");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    root: Group,
    joins: Vec<(Group, &'static str)>,
    ranking: Option<Ranking>,
    predicate: Predicate,
    returns: Vec<Vec<String>>,
}

impl QueryPlan {
    pub fn new(root: Group, predicate: Predicate, returns: Vec<String>) -> Self {
        Self {
            root,
            joins: Vec::new(),
            ranking: None,
            predicate,
            returns: vec![returns],
        }
    }
    pub fn ranked(mut self, ranking: Ranking) -> Self {
        self.ranking = Some(ranking);
        self
    }
    pub fn groups(&self) -> Vec<Group> {
        std::iter::once(self.root)
            .chain(self.joins.iter().map(|(group, _)| *group))
            .collect()
    }
    /// Merges `next` into this plan: its group is joined onto the root, its id
    /// selected and its conditions appended with `AND`. Only one join per plan
    /// is supported. The merged plan keeps this plan's ranking.
    pub fn join(mut self, next: QueryPlan) -> Result<QueryPlan> {
        let unsupported = || CasefileError::UnsupportedJoin {
            from: self.root.name().to_string(),
            to: next.root.name().to_string(),
        };
        if !self.joins.is_empty() || !next.joins.is_empty() {
            return Err(unsupported());
        }
        let path = join_path(self.root, next.root).ok_or_else(unsupported)?;
        let (head, tail) = next.predicate.into_parts();
        let mut terms = vec![(Combinator::And, head)];
        terms.extend(tail);
        self.predicate = Predicate::Chain(Box::new(Predicate::Group(Box::new(self.predicate))), terms);
        self.joins.push((next.root, path));
        self.returns.extend(next.returns);
        Ok(self)
    }
    pub fn render(&self) -> CompiledQuery {
        let mut sql = String::from("SELECT ");
        let mut params = Vec::new();
        let groups = self.groups();
        let ids: Vec<String> = groups
            .iter()
            .map(|group| format!("{}.nb", group.root()))
            .collect();
        sql.push_str(&ids.join(", "));
        if let Some(ranking) = &self.ranking {
            sql.push_str(", ");
            ranking.render(&mut sql, &mut params);
        }
        let root = self.root.root();
        sql.push_str(&format!(" FROM {root}"));
        for secondary in self.root.tables().iter().filter(|t| **t != root) {
            sql.push_str(&format!(
                " LEFT JOIN {secondary} ON {root}.nb = {secondary}.{}",
                root.key_column()
            ));
        }
        for (_, path) in &self.joins {
            sql.push(' ');
            sql.push_str(path);
        }
        sql.push_str(" WHERE ");
        self.predicate.render(&mut sql, &mut params);
        if self.ranking.is_some() {
            sql.push_str(" ORDER BY relevance DESC");
        }
        CompiledQuery {
            groups,
            sql,
            params,
            returns: self.returns.clone(),
        }
    }
}

/// SQL ready to run: one selected id column per entry in `groups`, and one
/// return spec per group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub groups: Vec<Group>,
    pub sql: String,
    pub params: Vec<String>,
    pub returns: Vec<Vec<String>>,
}

fn default_returns(group: Group) -> Vec<String> {
    group.default_returns().iter().map(|s| s.to_string()).collect()
}

impl CompiledQuery {
    /// Every id of every group, unranked.
    pub fn everything() -> Self {
        let selects: Vec<String> = Group::ALL
            .iter()
            .map(|group| {
                let columns: Vec<String> = Group::ALL
                    .iter()
                    .map(|other| {
                        if other == group {
                            format!("{}.nb", group.root())
                        } else {
                            "NULL".to_string()
                        }
                    })
                    .collect();
                format!("SELECT {} FROM {}", columns.join(", "), group.root())
            })
            .collect();
        Self {
            groups: Group::ALL.to_vec(),
            sql: selects.join(" UNION ALL "),
            params: Vec::new(),
            returns: Group::ALL.into_iter().map(default_returns).collect(),
        }
    }
    /// Every id of one group.
    pub fn all_of(group: Group) -> Self {
        Self {
            groups: vec![group],
            sql: format!("SELECT nb FROM {}", group.root()),
            params: Vec::new(),
            returns: vec![default_returns(group)],
        }
    }
}
