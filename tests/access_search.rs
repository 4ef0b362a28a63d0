use casefile::access::{
    DatabaseAccess, FieldValue, Gender, GroupHits, NewCase, NewDocument, NewPerson, Participant,
};
use casefile::config::Settings;
use casefile::error::CasefileError;
use casefile::schema::{CaseField, DocumentField, Group, PersonField};
use tempfile::TempDir;

struct Store {
    _dir: TempDir,
    access: DatabaseAccess,
    jane: i64,
    john: i64,
    anna: i64,
    case: i64,
    contract: i64,
}

fn person(first: &str, last: &str, gender: Gender, lawyer: bool) -> NewPerson {
    NewPerson {
        first_name: first.into(),
        last_name: last.into(),
        gender,
        can_be_lawyer: lawyer,
        ..Default::default()
    }
}

fn seeded() -> Store {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        lock_poll_ms: 5,
        ..Settings::in_dir(dir.path())
    };
    let access = DatabaseAccess::open(&settings).unwrap();
    let jane = access.add_person(&person("Jane", "Doe", Gender::Female, false)).unwrap();
    let john = access.add_person(&person("John", "Smith", Gender::Male, true)).unwrap();
    let anna = access.add_person(&person("Anna", "Janssen", Gender::Female, false)).unwrap();
    let contract = access
        .add_document(&NewDocument {
            name: "contract.pdf".into(),
            path: "archive/contract.pdf".into(),
            ..Default::default()
        })
        .unwrap();
    let case = access
        .add_case(&NewCase {
            name: "Case 7".into(),
            description: "Breach of contract".into(),
            persons: vec![
                Participant::new(jane, Some(john), false),
                Participant::new(john, Some(john), true),
            ],
            documents: vec![contract],
            ..Default::default()
        })
        .unwrap();
    Store {
        _dir: dir,
        access,
        jane,
        john,
        anna,
        case,
        contract,
    }
}

fn hits(found: &[GroupHits]) -> Vec<(Group, Vec<i64>)> {
    found.iter().map(|h| (h.group, h.ids.clone())).collect()
}

#[test]
fn vague_group_search_ranks_hits() {
    let s = seeded();
    let found = s.access.search("user:jan").unwrap();
    // a last name hit outranks a first name hit
    assert_eq!(hits(&found), vec![(Group::User, vec![s.anna, s.jane])]);
    assert_eq!(found[0].returns, vec!["first_name", "last_name", "can_be_lawyer"]);
}

#[test]
fn fan_out_lists_groups_with_hits() {
    let s = seeded();
    let found = s.access.search("contract").unwrap();
    assert_eq!(
        hits(&found),
        vec![(Group::Case, vec![s.case]), (Group::Docu, vec![s.contract])]
    );
}

#[test]
fn joined_groups_report_both_sides() {
    let s = seeded();
    let found = s.access.search("case:contract & user{last_name}=Doe").unwrap();
    assert_eq!(
        hits(&found),
        vec![(Group::Case, vec![s.case]), (Group::User, vec![s.jane])]
    );
    let found = s.access.search("case:contract & user{last_name}=Janssen").unwrap();
    assert!(found.is_empty());
}

#[test]
fn participation_columns_are_searchable() {
    let s = seeded();
    let found = s.access.search("user{self_represented}=1").unwrap();
    assert_eq!(hits(&found), vec![(Group::User, vec![s.john])]);
    let found = s.access.search("user{can_be_lawyer}=1").unwrap();
    assert_eq!(hits(&found), vec![(Group::User, vec![s.john])]);
    let found = s.access.search("user{gender}=Female & {side}=0").unwrap();
    assert_eq!(hits(&found), vec![(Group::User, vec![s.jane])]);
}

#[test]
fn empty_and_malformed_queries() {
    let s = seeded();
    let found = s.access.search("").unwrap();
    assert_eq!(
        hits(&found),
        vec![
            (Group::User, vec![s.jane, s.john, s.anna]),
            (Group::Case, vec![s.case]),
            (Group::Docu, vec![s.contract]),
        ]
    );
    assert!(s.access.search("user{first_name").unwrap().is_empty());
    assert!(s.access.search("   ").unwrap().is_empty());
    assert!(matches!(
        s.access.search("client:x"),
        Err(CasefileError::UnknownGroup(_))
    ));
}

#[test]
fn restricted_search_stays_in_group() {
    let s = seeded();
    let (ids, returns) = s.access.restricted_search("jan", Group::User).unwrap();
    assert_eq!(ids, vec![s.anna, s.jane]);
    assert_eq!(returns, vec!["first_name", "last_name", "can_be_lawyer"]);
    let (ids, _) = s.access.restricted_search("", Group::Case).unwrap();
    assert_eq!(ids, vec![s.case]);
    let (ids, returns) = s.access.restricted_search("docu{name", Group::Docu).unwrap();
    assert!(ids.is_empty() && returns.is_empty());
    assert!(matches!(
        s.access.restricted_search("docu:x", Group::User),
        Err(CasefileError::Restricted(_))
    ));
}

#[test]
fn records_read_back() {
    let s = seeded();
    let jane = s
        .access
        .person(s.jane, &[PersonField::FirstName, PersonField::Cases, PersonField::CanBeLawyer])
        .unwrap();
    assert_eq!(
        jane,
        vec![
            FieldValue::from("Jane"),
            FieldValue::Ids(vec![s.case]),
            FieldValue::Integer(0)
        ]
    );
    let case = s
        .access
        .case(s.case, &[CaseField::Persons, CaseField::Name, CaseField::Documents])
        .unwrap();
    assert_eq!(
        case,
        vec![
            FieldValue::Participants(vec![
                Participant::new(s.jane, Some(s.john), false),
                Participant::new(s.john, Some(s.john), true),
            ]),
            FieldValue::from("Case 7"),
            FieldValue::Ids(vec![s.contract]),
        ]
    );
    let document = s
        .access
        .document(s.contract, &[DocumentField::Path, DocumentField::Cases])
        .unwrap();
    assert_eq!(
        document,
        vec![FieldValue::from("archive/contract.pdf"), FieldValue::Ids(vec![s.case])]
    );
    let names = vec!["name".to_string(), "persons".to_string()];
    assert_eq!(s.access.read_attributes(Group::Case, s.case, &names).unwrap()[0], FieldValue::from("Case 7"));
    assert!(matches!(
        s.access.read_attributes(Group::User, s.jane, &["shoe_size".to_string()]),
        Err(CasefileError::UnknownAttribute { .. })
    ));
    assert_eq!(s.access.person_ids().unwrap(), vec![s.jane, s.john, s.anna]);
}

#[test]
fn updates_apply_columns_and_links() {
    let s = seeded();
    let second = s
        .access
        .add_case(&NewCase {
            name: "Case 8".into(),
            ..Default::default()
        })
        .unwrap();
    s.access
        .update_person(
            s.jane,
            &[
                (PersonField::Notes, FieldValue::from("prefers email")),
                (PersonField::Cases, FieldValue::Ids(vec![s.case, second])),
            ],
        )
        .unwrap();
    let jane = s.access.person(s.jane, &[PersonField::Notes, PersonField::Cases]).unwrap();
    assert_eq!(
        jane,
        vec![FieldValue::from("prefers email"), FieldValue::Ids(vec![s.case, second])]
    );
    // the existing participation keeps its lawyer
    let persons = s.access.case(s.case, &[CaseField::Persons]).unwrap();
    assert_eq!(
        persons[0],
        FieldValue::Participants(vec![
            Participant::new(s.jane, Some(s.john), false),
            Participant::new(s.john, Some(s.john), true),
        ])
    );
    let persons = s.access.case(second, &[CaseField::Persons]).unwrap();
    assert_eq!(persons[0], FieldValue::Participants(vec![Participant::new(s.jane, None, false)]));

    s.access
        .update_case(s.case, &[(CaseField::Documents, FieldValue::Ids(Vec::new()))])
        .unwrap();
    assert_eq!(
        s.access.document(s.contract, &[DocumentField::Cases]).unwrap(),
        vec![FieldValue::Ids(Vec::new())]
    );
    s.access
        .update_document(s.contract, &[(DocumentField::Cases, FieldValue::Ids(vec![second]))])
        .unwrap();
    assert_eq!(
        s.access.case(second, &[CaseField::Documents]).unwrap(),
        vec![FieldValue::Ids(vec![s.contract])]
    );
}

#[test]
fn invalid_updates_change_nothing() {
    let s = seeded();
    let result = s.access.update_person(
        s.jane,
        &[
            (PersonField::Notes, FieldValue::from("lost")),
            (PersonField::Cases, FieldValue::from("Case 7")),
        ],
    );
    assert!(matches!(result, Err(CasefileError::InvalidValue { .. })));
    assert_eq!(
        s.access.person(s.jane, &[PersonField::Notes]).unwrap(),
        vec![FieldValue::from("")]
    );
    assert!(matches!(
        s.access.update_case(s.case, &[(CaseField::Name, FieldValue::Ids(vec![1]))]),
        Err(CasefileError::InvalidValue { .. })
    ));
    assert!(matches!(
        s.access.update_document(404, &[(DocumentField::Notes, FieldValue::from("x"))]),
        Err(CasefileError::NotFound { nb: 404, .. })
    ));
}

#[test]
fn deletes_remove_links() {
    let s = seeded();
    s.access.delete_person(s.john).unwrap();
    assert!(matches!(
        s.access.person(s.john, &[PersonField::LastName]),
        Err(CasefileError::NotFound { .. })
    ));
    assert_eq!(
        s.access.case(s.case, &[CaseField::Persons]).unwrap(),
        vec![FieldValue::Participants(vec![Participant::new(s.jane, None, false)])]
    );
    s.access.delete_case(s.case).unwrap();
    assert!(s.access.case_ids().unwrap().is_empty());
    assert_eq!(
        s.access.person(s.jane, &[PersonField::Cases]).unwrap(),
        vec![FieldValue::Ids(Vec::new())]
    );
    s.access.delete_document(s.contract).unwrap();
    assert!(s.access.document_ids().unwrap().is_empty());
    assert!(s.access.search("contract").unwrap().is_empty());
}
