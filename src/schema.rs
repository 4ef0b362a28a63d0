//! The fixed relational schema the search box and the facade work against.
//!
//! Users search in *groups* (`user`, `case`, `docu`). Each group is backed by one
//! root table, optionally left-joined with a secondary table, and declares which
//! columns a vague search ranks over and which attributes are shown by default.
//! Reads and updates address attributes through the per-entity field enums, so an
//! unknown attribute name is rejected when it is parsed instead of reaching SQL.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CasefileError, Result};

pub const SCHEMA: &str = "
    create table if not exists Persons (
        nb integer not null primary key autoincrement,
        last_name text not null,
        first_name text not null,
        address text not null,
        birth_date text not null,
        contact_info text not null,
        gender text check(gender in ('Male', 'Female', 'Other')) not null,
        description text not null,
        notes text not null,
        can_be_lawyer integer not null
    );
    create table if not exists Cases (
        nb integer not null primary key autoincrement,
        name text not null unique,
        description text not null,
        notes text not null
    );
    create table if not exists CasePeople (
        case_nb integer not null,
        person_nb integer not null,
        lawyer_nb integer,
        side integer check(side in (0, 1)) not null,
        has_external_lawyer integer not null default 0,
        self_represented integer not null default 0,
        foreign key (case_nb) references Cases(nb),
        foreign key (person_nb) references Persons(nb),
        foreign key (lawyer_nb) references Persons(nb),
        primary key (case_nb, person_nb, lawyer_nb)
    );
    create table if not exists Documents (
        nb integer not null primary key autoincrement,
        name text not null,
        description text not null,
        notes text not null,
        path text not null,
        archived integer not null
    );
    create table if not exists CaseDocuments (
        case_nb integer not null,
        document_nb integer not null,
        foreign key (case_nb) references Cases(nb),
        foreign key (document_nb) references Documents(nb),
        primary key (case_nb, document_nb)
    );
";

// ------------- Table -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Persons,
    Cases,
    CasePeople,
    Documents,
    CaseDocuments,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Persons,
        Table::Cases,
        Table::CasePeople,
        Table::Documents,
        Table::CaseDocuments,
    ];
    pub fn name(self) -> &'static str {
        match self {
            Table::Persons => "Persons",
            Table::Cases => "Cases",
            Table::CasePeople => "CasePeople",
            Table::Documents => "Documents",
            Table::CaseDocuments => "CaseDocuments",
        }
    }
    /// Table names are matched exactly, the way they appear in statements.
    pub fn from_name(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.name() == name)
    }
    /// The foreign key column a secondary table uses to point at this table,
    /// e.g. `person_nb` for `Persons`.
    pub fn key_column(self) -> String {
        let lower = self.name().to_lowercase();
        format!("{}_nb", lower.strip_suffix('s').unwrap_or(&lower))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ------------- Group -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    User,
    Case,
    Docu,
}

const USER_COLUMNS: &[(Table, &[&str])] = &[
    (
        Table::Persons,
        &[
            "last_name",
            "first_name",
            "address",
            "birth_date",
            "contact_info",
            "gender",
            "description",
            "notes",
            "can_be_lawyer",
        ],
    ),
    (Table::CasePeople, &["self_represented", "has_external_lawyer", "side"]),
];
const CASE_COLUMNS: &[(Table, &[&str])] = &[(Table::Cases, &["name", "description", "notes"])];
const DOCU_COLUMNS: &[(Table, &[&str])] =
    &[(Table::Documents, &["name", "description", "notes", "path"])];

impl Group {
    pub const ALL: [Group; 3] = [Group::User, Group::Case, Group::Docu];

    pub fn name(self) -> &'static str {
        match self {
            Group::User => "user",
            Group::Case => "case",
            Group::Docu => "docu",
        }
    }
    /// The table whose `nb` identifies a hit in this group.
    pub fn root(self) -> Table {
        match self {
            Group::User => Table::Persons,
            Group::Case => Table::Cases,
            Group::Docu => Table::Documents,
        }
    }
    pub fn tables(self) -> &'static [Table] {
        match self {
            Group::User => &[Table::Persons, Table::CasePeople],
            Group::Case => &[Table::Cases],
            Group::Docu => &[Table::Documents],
        }
    }
    /// Searchable columns, per physical table, in ranking order.
    pub fn columns(self) -> &'static [(Table, &'static [&'static str])] {
        match self {
            Group::User => USER_COLUMNS,
            Group::Case => CASE_COLUMNS,
            Group::Docu => DOCU_COLUMNS,
        }
    }
    pub fn column_count(self) -> usize {
        self.columns().iter().map(|(_, columns)| columns.len()).sum()
    }
    /// Finds the table declaring `column`; the last declaring table wins.
    pub fn resolve_column(self, column: &str) -> Result<(Table, &'static str)> {
        self.columns()
            .iter()
            .filter_map(|(table, columns)| {
                columns.iter().find(|c| **c == column).map(|c| (*table, *c))
            })
            .last()
            .ok_or_else(|| CasefileError::UnknownColumn {
                group: self.name().to_string(),
                column: column.to_string(),
            })
    }
    pub fn default_returns(self) -> &'static [&'static str] {
        match self {
            Group::User => &["first_name", "last_name", "can_be_lawyer"],
            Group::Case => &["name"],
            Group::Docu => &["name"],
        }
    }
    /// Checks that a return spec only names attributes the group's entity can read.
    pub fn validate_return(self, attribute: &str) -> Result<()> {
        match self {
            Group::User => attribute.parse::<PersonField>().map(|_| ()),
            Group::Case => attribute.parse::<CaseField>().map(|_| ()),
            Group::Docu => attribute.parse::<DocumentField>().map(|_| ()),
        }
    }
}

impl FromStr for Group {
    type Err = CasefileError;
    fn from_str(s: &str) -> Result<Self> {
        Group::ALL
            .into_iter()
            .find(|g| g.name() == s)
            .ok_or_else(|| CasefileError::UnknownGroup(s.to_string()))
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Join clause appended to a query rooted at `from` so that `to`'s tables become
/// reachable. Queries rooted at `Persons` already left-join `CasePeople`.
pub fn join_path(from: Group, to: Group) -> Option<&'static str> {
    use Group::*;
    match (from, to) {
        (Case, User) => Some(
            "INNER JOIN CasePeople ON Cases.nb = CasePeople.case_nb \
             INNER JOIN Persons ON CasePeople.person_nb = Persons.nb",
        ),
        (Case, Docu) => Some(
            "INNER JOIN CaseDocuments ON Cases.nb = CaseDocuments.case_nb \
             INNER JOIN Documents ON CaseDocuments.document_nb = Documents.nb",
        ),
        (User, Case) => Some("INNER JOIN Cases ON CasePeople.case_nb = Cases.nb"),
        (User, Docu) => Some(
            "INNER JOIN CaseDocuments ON CasePeople.case_nb = CaseDocuments.case_nb \
             JOIN Documents ON CaseDocuments.document_nb = Documents.nb",
        ),
        (Docu, Case) => Some(
            "INNER JOIN CaseDocuments ON Documents.nb = CaseDocuments.document_nb \
             INNER JOIN Cases ON CaseDocuments.case_nb = Cases.nb",
        ),
        (Docu, User) => Some(
            "INNER JOIN CaseDocuments ON Documents.nb = CaseDocuments.document_nb \
             INNER JOIN CasePeople ON CaseDocuments.case_nb = CasePeople.case_nb \
             JOIN Persons ON CasePeople.person_nb = Persons.nb",
        ),
        _ => None,
    }
}

// ------------- Fields -------------
/// An attribute of one entity kind, stored in a column of `TABLE` or, when
/// `column` is `None`, in a link table.
pub trait Field: Copy + fmt::Debug + fmt::Display + FromStr<Err = CasefileError> {
    const TABLE: Table;
    fn name(self) -> &'static str;
    fn column(self) -> Option<&'static str>;
}

// Every entity gets an enum of its readable attributes. Columns map onto the
// entity's own table, relations are resolved through the link tables.
macro_rules! fields {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($table:ident) {
            columns { $($column:ident = $column_text:literal),+ $(,)? }
            relations { $($relation:ident = $relation_text:literal),* $(,)? }
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($column,)+
            $($relation,)*
        }
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$column,)+ $($name::$relation,)*];
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$column => $column_text,)+
                    $($name::$relation => $relation_text,)*
                }
            }
            /// `None` for relations, which live in a link table.
            pub fn column(self) -> Option<&'static str> {
                match self {
                    $($name::$column => Some($column_text),)+
                    $($name::$relation => None,)*
                }
            }
        }
        impl FromStr for $name {
            type Err = CasefileError;
            fn from_str(s: &str) -> Result<Self> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|field| field.name() == s)
                    .ok_or_else(|| CasefileError::UnknownAttribute {
                        entity: Table::$table.name().to_string(),
                        attribute: s.to_string(),
                    })
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
        impl Field for $name {
            const TABLE: Table = Table::$table;
            fn name(self) -> &'static str {
                $name::name(self)
            }
            fn column(self) -> Option<&'static str> {
                $name::column(self)
            }
        }
    };
}

fields! {
    /// Attributes of a person; `cases` lists the cases the person takes part in.
    pub enum PersonField (Persons) {
        columns {
            LastName = "last_name",
            FirstName = "first_name",
            Address = "address",
            BirthDate = "birth_date",
            ContactInfo = "contact_info",
            Gender = "gender",
            Description = "description",
            Notes = "notes",
            CanBeLawyer = "can_be_lawyer",
        }
        relations {
            Cases = "cases",
        }
    }
}

fields! {
    /// Attributes of a case; `persons` are participants, `documents` attached files.
    pub enum CaseField (Cases) {
        columns {
            Name = "name",
            Description = "description",
            Notes = "notes",
        }
        relations {
            Persons = "persons",
            Documents = "documents",
        }
    }
}

fields! {
    pub enum DocumentField (Documents) {
        columns {
            Name = "name",
            Description = "description",
            Notes = "notes",
            Path = "path",
        }
        relations {
            Cases = "cases",
        }
    }
}
