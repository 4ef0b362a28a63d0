//! The access facade: every read, write and search a caller performs.
//!
//! Writes take the cross-process write marker, run inside one transaction and
//! append the change markers of every statement before the marker is released.
//! Reads and searches wait out a writer and mark the read marker. The SQLite
//! connection is shared behind a mutex that is only taken after the marker
//! files have been dealt with.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::hash::BuildHasherDefault;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, Error, OptionalExtension, Params, params, params_from_iter};
use seahash::SeaHasher;
use serde::Serialize;
use tracing::{debug, info};

use crate::changes::{ChangeLog, ChangeNotifier, RecordGroup, classify};
use crate::compile::{SearchPlan, compile, compile_restricted};
use crate::config::Settings;
use crate::edit::EditLockManager;
use crate::error::{CasefileError, Result};
use crate::lock::LockCoordinator;
use crate::regexp;
use crate::schema::{CaseField, DocumentField, Field, Group, PersonField, SCHEMA, Table};

// hit ids are deduplicated per column while keeping rank order
pub type RowHasher = BuildHasherDefault<SeaHasher>;

// ------------- Values -------------
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Ids(Vec<i64>),
    Participants(Vec<Participant>),
}

impl FieldValue {
    fn to_sql(&self, attribute: &str) -> Result<Value> {
        match self {
            FieldValue::Null => Ok(Value::Null),
            FieldValue::Integer(i) => Ok(Value::Integer(*i)),
            FieldValue::Real(r) => Ok(Value::Real(*r)),
            FieldValue::Text(t) => Ok(Value::Text(t.clone())),
            FieldValue::Ids(_) | FieldValue::Participants(_) => Err(CasefileError::InvalidValue {
                attribute: attribute.to_string(),
                message: "expected a single value, not a list".into(),
            }),
        }
    }
    fn as_ids(&self, attribute: &str) -> Result<&[i64]> {
        match self {
            FieldValue::Ids(ids) => Ok(ids),
            _ => Err(CasefileError::InvalidValue {
                attribute: attribute.to_string(),
                message: "expected a list of record numbers".into(),
            }),
        }
    }
    fn as_participants(&self, attribute: &str) -> Result<&[Participant]> {
        match self {
            FieldValue::Participants(participants) => Ok(participants),
            _ => Err(CasefileError::InvalidValue {
                attribute: attribute.to_string(),
                message: "expected a list of participants".into(),
            }),
        }
    }
}

impl From<ValueRef<'_>> for FieldValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(i) => FieldValue::Integer(i),
            ValueRef::Real(r) => FieldValue::Real(r),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                FieldValue::Text(String::from_utf8_lossy(t).into_owned())
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}
impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}
impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Integer(value as i64)
    }
}
impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}
impl From<Vec<i64>> for FieldValue {
    fn from(value: Vec<i64>) -> Self {
        FieldValue::Ids(value)
    }
}
impl From<Vec<Participant>> for FieldValue {
    fn from(value: Vec<Participant>) -> Self {
        FieldValue::Participants(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Real(r) => write!(f, "{r}"),
            FieldValue::Text(t) => f.write_str(t),
            FieldValue::Ids(ids) => {
                let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
                f.write_str(&ids.join(", "))
            }
            FieldValue::Participants(participants) => {
                let participants: Vec<String> =
                    participants.iter().map(Participant::to_string).collect();
                f.write_str(&participants.join(", "))
            }
        }
    }
}

/// A person taking part in a case, with their lawyer and side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub person_nb: i64,
    pub lawyer_nb: Option<i64>,
    pub side: bool,
}

impl Participant {
    pub fn new(person_nb: i64, lawyer_nb: Option<i64>, side: bool) -> Self {
        Self {
            person_nb,
            lawyer_nb,
            side,
        }
    }
    pub fn self_represented(&self) -> bool {
        self.lawyer_nb == Some(self.person_nb)
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lawyer_nb {
            Some(lawyer) => write!(f, "{} (lawyer {}, side {})", self.person_nb, lawyer, self.side as u8),
            None => write!(f, "{} (side {})", self.person_nb, self.side as u8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub last_name: String,
    pub first_name: String,
    pub address: String,
    pub birth_date: String,
    pub contact_info: String,
    pub gender: Gender,
    pub description: String,
    pub notes: String,
    pub can_be_lawyer: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewCase {
    pub name: String,
    pub description: String,
    pub notes: String,
    pub persons: Vec<Participant>,
    pub documents: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub name: String,
    pub description: String,
    pub notes: String,
    /// Stored as given; copying the file into the archive is up to the caller.
    pub path: String,
}

/// Ids of one group found by a search, best match first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupHits {
    pub group: Group,
    pub ids: Vec<i64>,
    pub returns: Vec<String>,
}

/// One statement of a batch.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Mutation {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

// ------------- Write scope -------------
/// Statements run inside one write: the transaction plus the record groups
/// touched so far.
pub struct WriteScope<'c> {
    conn: &'c Connection,
    touched: Vec<RecordGroup>,
}

impl WriteScope<'_> {
    pub fn execute<P: Params>(&mut self, sql: &str, params: P) -> Result<usize> {
        let changed = self.conn.execute(sql, params)?;
        self.touched.extend(classify(sql));
        Ok(changed)
    }
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        self.touched.extend(classify(sql));
        Ok(())
    }
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
    fn require(&self, table: Table, nb: i64) -> Result<()> {
        let found: Option<i64> = self
            .conn
            .query_row(&format!("SELECT nb FROM {table} WHERE nb = ?"), [nb], |r| r.get(0))
            .optional()?;
        found.map(|_| ()).ok_or_else(|| CasefileError::NotFound {
            table: table.to_string(),
            nb,
        })
    }
    // One UPDATE for every column-backed change; relations are left to the caller.
    fn assign<F: Field>(&mut self, nb: i64, changes: &[(F, FieldValue)]) -> Result<()> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (field, value) in changes {
            if let Some(column) = field.column() {
                assignments.push(format!("{column} = ?"));
                values.push(value.to_sql(field.name())?);
            }
        }
        if assignments.is_empty() {
            return Ok(());
        }
        values.push(Value::Integer(nb));
        let sql = format!("UPDATE {} SET {} WHERE nb = ?", F::TABLE, assignments.join(", "));
        self.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
    fn link_participants(&mut self, case_nb: i64, persons: &[Participant]) -> Result<()> {
        for participant in persons {
            self.execute(
                "INSERT INTO CasePeople (case_nb, person_nb, lawyer_nb, side, has_external_lawyer, self_represented) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    case_nb,
                    participant.person_nb,
                    participant.lawyer_nb,
                    participant.side,
                    false,
                    participant.self_represented()
                ],
            )?;
        }
        Ok(())
    }
    fn link_documents(&mut self, case_nb: i64, documents: &[i64]) -> Result<()> {
        for document_nb in documents {
            self.execute(
                "INSERT INTO CaseDocuments (case_nb, document_nb) VALUES (?, ?)",
                params![case_nb, document_nb],
            )?;
        }
        Ok(())
    }
}

fn not_found(e: Error, table: Table, nb: i64) -> CasefileError {
    match e {
        Error::QueryReturnedNoRows => CasefileError::NotFound {
            table: table.to_string(),
            nb,
        },
        e => e.into(),
    }
}

fn ids<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<i64>> {
    let mut statement = conn.prepare(sql)?;
    let ids = statement
        .query_map(params, |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

// ------------- DatabaseAccess -------------
pub struct DatabaseAccess {
    conn: Mutex<Connection>,
    locks: LockCoordinator,
    edit_locks: EditLockManager,
    change_log: ChangeLog,
    settings: Settings,
}

impl DatabaseAccess {
    /// Opens (and if needed creates) the store described by `settings`.
    pub fn open(settings: &Settings) -> Result<Self> {
        fs::create_dir_all(settings.data_dir())?;
        fs::create_dir_all(settings.edit_lock_path())?;
        let conn = Connection::open(settings.database_path())?;
        conn.busy_timeout(Duration::from_secs(5))?;
        regexp::register(&conn)?;
        let access = Self {
            conn: Mutex::new(conn),
            locks: LockCoordinator::from_settings(settings),
            edit_locks: EditLockManager::from_settings(settings),
            change_log: ChangeLog::new(settings.changes_log_path(), settings.changelog_retry_limit),
            settings: settings.clone(),
        };
        access.write(|scope| scope.execute_batch(SCHEMA))?;
        info!(path = %settings.database_path().display(), "store opened");
        Ok(access)
    }

    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }
    pub fn edit_locks(&self) -> &EditLockManager {
        &self.edit_locks
    }
    pub fn change_log(&self) -> &ChangeLog {
        &self.change_log
    }
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
    /// A notifier positioned at the current end of the change log.
    pub fn notifier(&self) -> ChangeNotifier {
        ChangeNotifier::new(self.settings.changes_log_path())
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CasefileError::Lock(e.to_string()))
    }

    /// Runs `f` in one transaction while holding the write marker. The markers
    /// of everything `f` executed are appended after the commit.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteScope<'_>) -> Result<T>,
    {
        let _guard = self.locks.acquire_write()?;
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let mut scope = WriteScope {
            conn: &tx,
            touched: Vec::new(),
        };
        let value = f(&mut scope)?;
        let touched = scope.touched;
        tx.commit()?;
        self.change_log.append(&touched)?;
        Ok(value)
    }

    /// Runs `f` behind the read gate.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let _guard = self.locks.acquire_read()?;
        let conn = self.connection()?;
        f(&conn)
    }

    /// Executes one mutating statement and returns the last inserted row id.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<i64> {
        self.write(|scope| {
            scope.execute(sql, params)?;
            Ok(scope.last_insert_rowid())
        })
    }

    /// Executes a batch in one write scope and one transaction; returns the
    /// number of changed rows per statement.
    pub fn execute_many(&self, mutations: &[Mutation]) -> Result<Vec<usize>> {
        self.write(|scope| {
            mutations
                .iter()
                .map(|m| scope.execute(&m.sql, params_from_iter(m.params.iter())))
                .collect()
        })
    }

    fn read_fields<F, R>(&self, nb: i64, fields: &[F], relation: R) -> Result<Vec<FieldValue>>
    where
        F: Field,
        R: Fn(&Connection, F) -> Result<FieldValue>,
    {
        self.read(|conn| {
            let columns: Vec<&str> = fields.iter().filter_map(|f| f.column()).collect();
            let stored: Vec<FieldValue> = if columns.is_empty() {
                Vec::new()
            } else {
                let sql = format!("SELECT {} FROM {} WHERE nb = ?", columns.join(", "), F::TABLE);
                conn.query_row(&sql, [nb], |row| {
                    (0..columns.len())
                        .map(|i| row.get_ref(i).map(FieldValue::from))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })
                .map_err(|e| not_found(e, F::TABLE, nb))?
            };
            let mut values = stored.into_iter();
            fields
                .iter()
                .map(|field| match field.column() {
                    Some(_) => Ok(values.next().unwrap_or(FieldValue::Null)),
                    None => relation(conn, *field),
                })
                .collect()
        })
    }

    fn all_ids(&self, table: Table) -> Result<Vec<i64>> {
        self.read(|conn| ids(conn, &format!("SELECT nb FROM {table} ORDER BY nb"), []))
    }

    // ------------- Persons -------------
    pub fn add_person(&self, person: &NewPerson) -> Result<i64> {
        self.execute(
            "INSERT INTO Persons (last_name, first_name, address, birth_date, contact_info, gender, description, notes, can_be_lawyer) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                person.last_name,
                person.first_name,
                person.address,
                person.birth_date,
                person.contact_info,
                person.gender.as_str(),
                person.description,
                person.notes,
                person.can_be_lawyer
            ],
        )
    }

    /// Values of `fields` in the order asked for.
    pub fn person(&self, nb: i64, fields: &[PersonField]) -> Result<Vec<FieldValue>> {
        self.read_fields(nb, fields, |conn, field| match field {
            PersonField::Cases => Ok(FieldValue::Ids(ids(
                conn,
                "SELECT case_nb FROM CasePeople WHERE person_nb = ? ORDER BY case_nb",
                [nb],
            )?)),
            _ => Ok(FieldValue::Null),
        })
    }

    /// Applies `changes`. Setting `cases` keeps the existing participation rows
    /// of cases still listed and adds the new ones without a lawyer.
    pub fn update_person(&self, nb: i64, changes: &[(PersonField, FieldValue)]) -> Result<()> {
        self.write(|scope| {
            scope.require(Table::Persons, nb)?;
            scope.assign(nb, changes)?;
            for (field, value) in changes {
                if *field != PersonField::Cases {
                    continue;
                }
                let cases = value.as_ids(field.name())?;
                let placeholders = vec!["?"; cases.len()].join(", ");
                let mut kept = vec![Value::Integer(nb)];
                kept.extend(cases.iter().map(|c| Value::Integer(*c)));
                scope.execute(
                    &format!("DELETE FROM CasePeople WHERE person_nb = ? AND case_nb NOT IN ({placeholders})"),
                    params_from_iter(kept),
                )?;
                for case_nb in cases {
                    scope.execute(
                        "INSERT INTO CasePeople (case_nb, person_nb, lawyer_nb, side) SELECT ?1, ?2, NULL, 0 WHERE NOT EXISTS (SELECT 1 FROM CasePeople WHERE case_nb = ?1 AND person_nb = ?2)",
                        params![case_nb, nb],
                    )?;
                }
            }
            Ok(())
        })
    }

    /// Deletes the person and their participation in cases.
    pub fn delete_person(&self, nb: i64) -> Result<()> {
        self.write(|scope| {
            scope.require(Table::Persons, nb)?;
            scope.execute("DELETE FROM CasePeople WHERE person_nb = ?", [nb])?;
            scope.execute("UPDATE CasePeople SET lawyer_nb = NULL WHERE lawyer_nb = ?", [nb])?;
            scope.execute("DELETE FROM Persons WHERE nb = ?", [nb])?;
            Ok(())
        })
    }

    pub fn person_ids(&self) -> Result<Vec<i64>> {
        self.all_ids(Table::Persons)
    }

    // ------------- Cases -------------
    pub fn add_case(&self, case: &NewCase) -> Result<i64> {
        self.write(|scope| {
            scope.execute(
                "INSERT INTO Cases (name, description, notes) VALUES (?, ?, ?)",
                params![case.name, case.description, case.notes],
            )?;
            let case_nb = scope.last_insert_rowid();
            scope.link_participants(case_nb, &case.persons)?;
            scope.link_documents(case_nb, &case.documents)?;
            Ok(case_nb)
        })
    }

    pub fn case(&self, nb: i64, fields: &[CaseField]) -> Result<Vec<FieldValue>> {
        self.read_fields(nb, fields, |conn, field| match field {
            CaseField::Persons => {
                let mut statement = conn.prepare(
                    "SELECT person_nb, lawyer_nb, side FROM CasePeople WHERE case_nb = ? ORDER BY person_nb",
                )?;
                let participants = statement
                    .query_map([nb], |r| Ok(Participant::new(r.get(0)?, r.get(1)?, r.get(2)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(FieldValue::Participants(participants))
            }
            CaseField::Documents => Ok(FieldValue::Ids(ids(
                conn,
                "SELECT document_nb FROM CaseDocuments WHERE case_nb = ? ORDER BY document_nb",
                [nb],
            )?)),
            _ => Ok(FieldValue::Null),
        })
    }

    /// Applies `changes`; `persons` and `documents` replace the case's links.
    pub fn update_case(&self, nb: i64, changes: &[(CaseField, FieldValue)]) -> Result<()> {
        self.write(|scope| {
            scope.require(Table::Cases, nb)?;
            scope.assign(nb, changes)?;
            for (field, value) in changes {
                match field {
                    CaseField::Persons => {
                        let persons = value.as_participants(field.name())?;
                        scope.execute("DELETE FROM CasePeople WHERE case_nb = ?", [nb])?;
                        scope.link_participants(nb, persons)?;
                    }
                    CaseField::Documents => {
                        let documents = value.as_ids(field.name())?;
                        scope.execute("DELETE FROM CaseDocuments WHERE case_nb = ?", [nb])?;
                        scope.link_documents(nb, documents)?;
                    }
                    _ => (),
                }
            }
            Ok(())
        })
    }

    pub fn delete_case(&self, nb: i64) -> Result<()> {
        self.write(|scope| {
            scope.require(Table::Cases, nb)?;
            scope.execute("DELETE FROM CasePeople WHERE case_nb = ?", [nb])?;
            scope.execute("DELETE FROM CaseDocuments WHERE case_nb = ?", [nb])?;
            scope.execute("DELETE FROM Cases WHERE nb = ?", [nb])?;
            Ok(())
        })
    }

    pub fn case_ids(&self) -> Result<Vec<i64>> {
        self.all_ids(Table::Cases)
    }

    // ------------- Documents -------------
    pub fn add_document(&self, document: &NewDocument) -> Result<i64> {
        self.execute(
            "INSERT INTO Documents (name, description, notes, path, archived) VALUES (?, ?, ?, ?, ?)",
            params![document.name, document.description, document.notes, document.path, 1],
        )
    }

    pub fn document(&self, nb: i64, fields: &[DocumentField]) -> Result<Vec<FieldValue>> {
        self.read_fields(nb, fields, |conn, field| match field {
            DocumentField::Cases => Ok(FieldValue::Ids(ids(
                conn,
                "SELECT case_nb FROM CaseDocuments WHERE document_nb = ? ORDER BY case_nb",
                [nb],
            )?)),
            _ => Ok(FieldValue::Null),
        })
    }

    /// Applies `changes`; `cases` replaces the cases the document is attached to.
    pub fn update_document(&self, nb: i64, changes: &[(DocumentField, FieldValue)]) -> Result<()> {
        self.write(|scope| {
            scope.require(Table::Documents, nb)?;
            scope.assign(nb, changes)?;
            for (field, value) in changes {
                if *field != DocumentField::Cases {
                    continue;
                }
                let cases = value.as_ids(field.name())?;
                scope.execute("DELETE FROM CaseDocuments WHERE document_nb = ?", [nb])?;
                for case_nb in cases {
                    scope.execute(
                        "INSERT INTO CaseDocuments (case_nb, document_nb) VALUES (?, ?)",
                        params![case_nb, nb],
                    )?;
                }
            }
            Ok(())
        })
    }

    pub fn delete_document(&self, nb: i64) -> Result<()> {
        self.write(|scope| {
            scope.require(Table::Documents, nb)?;
            scope.execute("DELETE FROM CaseDocuments WHERE document_nb = ?", [nb])?;
            scope.execute("DELETE FROM Documents WHERE nb = ?", [nb])?;
            Ok(())
        })
    }

    pub fn document_ids(&self) -> Result<Vec<i64>> {
        self.all_ids(Table::Documents)
    }

    /// Reads attributes named by a return spec.
    pub fn read_attributes(&self, group: Group, nb: i64, names: &[String]) -> Result<Vec<FieldValue>> {
        match group {
            Group::User => self.person(nb, &parse_fields(names)?),
            Group::Case => self.case(nb, &parse_fields(names)?),
            Group::Docu => self.document(nb, &parse_fields(names)?),
        }
    }

    // ------------- Search -------------
    /// Runs a search box query. Every group with hits is listed once per
    /// compiled query, its ids distinct and best match first. Input that does
    /// not parse has no hits.
    pub fn search(&self, input: &str) -> Result<Vec<GroupHits>> {
        let started = Instant::now();
        let queries = match compile(input)? {
            SearchPlan::NoMatch => {
                debug!(input, "no match");
                return Ok(Vec::new());
            }
            SearchPlan::Everything(query) => vec![query],
            SearchPlan::Queries(queries) => queries,
        };
        let hits = self.read(|conn| {
            let mut hits = Vec::new();
            for query in &queries {
                let mut statement = conn.prepare(&query.sql)?;
                let mut rows = statement.query(params_from_iter(query.params.iter()))?;
                let width = query.groups.len();
                let mut found: Vec<Vec<i64>> = vec![Vec::new(); width];
                let mut seen: Vec<HashSet<i64, RowHasher>> = vec![HashSet::default(); width];
                while let Some(row) = rows.next()? {
                    for i in 0..width {
                        if let Some(id) = row.get::<_, Option<i64>>(i)? {
                            if seen[i].insert(id) {
                                found[i].push(id);
                            }
                        }
                    }
                }
                for ((group, returns), ids) in query.groups.iter().zip(&query.returns).zip(found) {
                    if !ids.is_empty() {
                        hits.push(GroupHits {
                            group: *group,
                            ids,
                            returns: returns.clone(),
                        });
                    }
                }
            }
            Ok(hits)
        })?;
        info!(
            input,
            queries = queries.len(),
            groups = hits.len(),
            ms = started.elapsed().as_secs_f64() * 1000.0,
            "search complete"
        );
        Ok(hits)
    }

    /// Searches within one group, for pick lists bound to that group.
    pub fn restricted_search(&self, input: &str, group: Group) -> Result<(Vec<i64>, Vec<String>)> {
        let Some(query) = compile_restricted(input, group)? else {
            return Ok((Vec::new(), Vec::new()));
        };
        let ids = self.read(|conn| {
            let mut found = Vec::new();
            let mut seen: HashSet<i64, RowHasher> = HashSet::default();
            let mut statement = conn.prepare(&query.sql)?;
            let mut rows = statement.query(params_from_iter(query.params.iter()))?;
            while let Some(row) = rows.next()? {
                let id: i64 = row.get(0)?;
                if seen.insert(id) {
                    found.push(id);
                }
            }
            Ok(found)
        })?;
        let returns = query.returns.into_iter().next().unwrap_or_default();
        Ok((ids, returns))
    }
}

fn parse_fields<F: Field>(names: &[String]) -> Result<Vec<F>> {
    names.iter().map(|name| name.parse()).collect()
}
