//! Discriminator dispatch over the polymorphic pet documents.

use super::fixtures::*;
use crate::mapping_catalog::SemanticType;
use crate::query_compiler::CompileError;
use crate::query_tree::{MatchBranch, PathRoot, PropertyPath, QueryExpr, Step};

const PET: &str = "\"root\".DETAILS['favouritePet']";

fn branch(subtype: &str, property: &str) -> MatchBranch {
    MatchBranch {
        subtype: subtype.to_string(),
        body: current(vec![prop(property)]),
    }
}

fn discriminator(doc: &str) -> String {
    format!("{}['_type']::varchar", doc)
}

#[test]
fn test_match_over_document() {
    let query = person().project(
        "Noise",
        root(vec![
            prop("favouritePet"),
            Step::Match {
                branches: vec![branch("model::Dog", "barkVolume"), branch("model::Cat", "lives")],
            },
        ]),
    );
    let plan = compile_plan(&query);

    assert_eq!(
        plan.sql(),
        format!(
            "select case when {disc} in ('Dog') then {pet}['barkVolume']::number \
             when {disc} in ('Cat', 'KITTEN') then {pet}['lives']::number \
             else null end as \"Noise\" from PERSON_SCHEMA.PERSON_TABLE as \"root\"",
            disc = discriminator(PET),
            pet = PET
        )
    );
    assert_eq!(
        plan.relational().result_schema[0].semantic_type,
        SemanticType::Integer
    );
}

#[test]
fn test_abstract_branch_matches_every_concrete_descendant() {
    let query = person().project(
        "Pet Name",
        root(vec![
            prop("favouritePet"),
            Step::Match {
                branches: vec![branch("model::Animal", "name")],
            },
        ]),
    );
    let sql = compile_sql(&query);
    assert!(sql.contains(&format!(
        "case when {} in ('Dog', 'Cat', 'KITTEN') then {}['name']::varchar else null end",
        discriminator(PET),
        PET
    )));
}

#[test]
fn test_earlier_branch_claims_shared_literals() {
    let query = person().project(
        "Lives",
        root(vec![
            prop("favouritePet"),
            Step::Match {
                branches: vec![branch("model::Kitten", "lives"), branch("model::Cat", "lives")],
            },
        ]),
    );
    assert!(compile_sql(&query).starts_with(&format!(
        "select case when {disc} in ('KITTEN') then {pet}['lives']::number \
         when {disc} in ('Cat') then {pet}['lives']::number else null end",
        disc = discriminator(PET),
        pet = PET
    )));
}

#[test]
fn test_branch_shadowed_by_supertype_is_rejected() {
    let query = person().project(
        "Lives",
        root(vec![
            prop("favouritePet"),
            Step::Match {
                branches: vec![branch("model::Cat", "lives"), branch("model::Kitten", "lives")],
            },
        ]),
    );
    match compile_err(&query) {
        CompileError::TypeDispatch(message) => {
            assert!(message.contains("model::Kitten"), "{}", message)
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_match_branches_must_agree_on_type() {
    let query = person().project(
        "Mixed",
        root(vec![
            prop("favouritePet"),
            Step::Match {
                branches: vec![branch("model::Dog", "barkVolume"), branch("model::Cat", "name")],
            },
        ]),
    );
    assert!(matches!(compile_err(&query), CompileError::TypeDispatch(_)));
}

#[test]
fn test_match_branch_outside_hierarchy() {
    let query = person().project(
        "Firm",
        root(vec![
            prop("favouritePet"),
            Step::Match {
                branches: vec![branch("model::Firm", "legalName")],
            },
        ]),
    );
    assert!(matches!(compile_err(&query), CompileError::TypeDispatch(_)));
}

#[test]
fn test_match_over_table_rows_is_unsupported() {
    let query = person().project(
        "Manager",
        root(vec![
            prop("manager"),
            Step::Match {
                branches: vec![branch("model::Person", "firstName")],
            },
        ]),
    );
    assert!(matches!(
        compile_err(&query),
        CompileError::UnsupportedConstruct(_)
    ));
}

#[test]
fn test_type_name_over_flattened_documents() {
    let query = person().project("Kind", root(vec![prop("pets"), Step::TypeName]));
    let sql = compile_sql(&query);
    let disc = discriminator("\"ss_flatten_0\".VALUE");

    assert!(sql.starts_with(&format!(
        "select case when {d} in ('Dog') then 'model::Dog' \
         when {d} in ('Cat') then 'model::Cat' \
         when {d} in ('KITTEN') then 'model::Kitten' else null end as \"Kind\"",
        d = disc
    )));
    assert!(sql.ends_with(&flatten_join("\"root\".DETAILS['pets']", "ss_flatten_0")));
}

#[test]
fn test_type_name_and_type_path_agree() {
    let kind = |step: Step| {
        compile_sql(&person().project("Kind", root(vec![prop("favouritePet"), step])))
    };
    let name = kind(Step::TypeName);
    assert!(name.contains("then 'model::Cat'"));
    assert_eq!(name, kind(Step::TypePath));
}

#[test]
fn test_type_path_of_narrowed_leaf_is_constant() {
    let query = person().project(
        "Kind",
        root(vec![
            prop("favouritePet"),
            Step::SubType {
                class: "model::Dog".into(),
            },
            Step::TypePath,
        ]),
    );
    assert!(compile_sql(&query).starts_with("select 'model::Dog' as \"Kind\""));
}

#[test]
fn test_navigation_after_type_name_is_unsupported() {
    let query = person().project(
        "Bad",
        root(vec![prop("favouritePet"), Step::TypeName, prop("name")]),
    );
    assert!(matches!(
        compile_err(&query),
        CompileError::UnsupportedConstruct(_)
    ));
}

#[test]
fn test_instance_of_document() {
    let query = person()
        .with_filter(QueryExpr::InstanceOf {
            path: PropertyPath {
                root: PathRoot::Root,
                steps: vec![prop("favouritePet")],
            },
            class: "model::Cat".into(),
        })
        .project("First Name", root(vec![prop("firstName")]));

    assert!(compile_sql(&query).ends_with(&format!(
        "where {} in ('Cat', 'KITTEN')",
        discriminator(PET)
    )));
}

#[test]
fn test_instance_of_row_is_static() {
    let query = person()
        .with_filter(QueryExpr::InstanceOf {
            path: PropertyPath {
                root: PathRoot::Root,
                steps: vec![],
            },
            class: PERSON.into(),
        })
        .project("First Name", root(vec![prop("firstName")]));
    assert!(compile_sql(&query).ends_with("where true"));
}
