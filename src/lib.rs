//! Casefile – the data-access core of a small law-office register.
//!
//! Persons, cases and documents live in one SQLite file that several processes
//! share over a common filesystem. The crate provides two things on top of it:
//! * a search box mini-language compiled into parameterized, ranked SQL, and
//! * cooperative concurrency control through marker files: a global write
//!   lock, an advisory read marker, per-row edit locks and a change log that
//!   clients poll to learn which record groups another process touched.
//!
//! ## Modules
//! * [`parse`] – The pest grammar for the search box (`search.pest`).
//! * [`plan`] – Typed query plans (groups, join edges, predicate tree, ranking) rendered to SQL.
//! * [`compile`] – Turns parsed clauses into plans: column matches, vague ranked
//!   searches, fan-out over all groups and two-group chains.
//! * [`schema`] – Tables, searchable groups, join paths and per-entity field enums.
//! * [`regexp`] – The `REGEXP` function registered on every connection.
//! * [`lock`] – The write marker and read marker.
//! * [`edit`] – Per-row edit locks with cancellable waiting.
//! * [`changes`] – The append-only change log and its polling notifier.
//! * [`access`] – [`access::DatabaseAccess`], the facade callers use.
//! * [`config`] – Layered settings.
//! * [`server`] – A JSON search endpoint and a server-sent change stream.
//!
//! ## Search Box
//! ```text
//! user[first_name;notes]{last_name}:mül & {gender}=Female
//! case:'Case 7' &
//! docu:contract
//! Jane
//! ```
//! A group followed by `:` or `=` scopes the search; `{column}` selects a single
//! column, otherwise every column of the group is searched and hits are ranked
//! by relevance. Without a group the term is searched in every group. A
//! trailing `&` joins the next group's clause onto the previous one. The empty
//! query lists everything; input that does not parse finds nothing.
//!
//! ## Quick Start
//! ```
//! use casefile::access::{DatabaseAccess, NewPerson};
//! use casefile::config::Settings;
//! use casefile::schema::Group;
//! let dir = tempfile::tempdir().unwrap();
//! let access = DatabaseAccess::open(&Settings::in_dir(dir.path())).unwrap();
//! let jane = access
//!     .add_person(&NewPerson { first_name: "Jane".into(), last_name: "Doe".into(), ..Default::default() })
//!     .unwrap();
//! let hits = access.search("user{first_name}=Jane").unwrap();
//! assert_eq!(hits[0].group, Group::User);
//! assert_eq!(hits[0].ids, vec![jane]);
//! ```

pub mod access;
pub mod changes;
pub mod compile;
pub mod config;
pub mod edit;
pub mod error;
pub mod lock;
pub mod parse;
pub mod plan;
pub mod regexp;
pub mod schema;
pub mod server;
