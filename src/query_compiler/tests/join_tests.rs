//! Associations, explosions, milestoned and versioned stores, and the
//! deduplication of joins by join path.

use super::fixtures::*;
use crate::query_compiler::CompileError;
use crate::query_tree::{QueryExpr, ResolvedQuery};

const MANAGER_JOIN: &str = "left outer join PERSON_SCHEMA.PERSON_TABLE as \"person_table_1\" \
                            on (\"root\".MANAGERID = \"person_table_1\".ID)";

#[test]
fn test_association_join() {
    let query = person().project("Manager", root(vec![prop("manager"), prop("firstName")]));
    assert_eq!(
        compile_sql(&query),
        format!(
            "select \"person_table_1\".FIRSTNAME as \"Manager\" \
             from PERSON_SCHEMA.PERSON_TABLE as \"root\" {}",
            MANAGER_JOIN
        )
    );
}

#[test]
fn test_same_path_joins_once() {
    let query = person()
        .project("Manager First", root(vec![prop("manager"), prop("firstName")]))
        .project("Manager Last", root(vec![prop("manager"), prop("lastName")]))
        .with_filter(QueryExpr::call(
            "greaterThan",
            vec![root(vec![prop("manager"), prop("age")]), QueryExpr::integer(40)],
        ));
    let sql = compile_sql(&query);

    assert_eq!(sql.matches("left outer join").count(), 1);
    assert!(sql.contains(MANAGER_JOIN));
    assert!(sql.ends_with("where \"person_table_1\".AGE > 40"));
}

#[test]
fn test_distinct_paths_get_numbered_aliases() {
    let query = person()
        .project("Manager", root(vec![prop("manager"), prop("firstName")]))
        .project("Mentor", root(vec![prop("mentor"), prop("firstName")]))
        .project(
            "Grand Manager",
            root(vec![prop("manager"), prop("manager"), prop("firstName")]),
        );
    let sql = compile_sql(&query);

    assert!(sql.contains(
        "left outer join PERSON_SCHEMA.PERSON_TABLE as \"person_table_2\" \
         on (\"root\".MENTORID = \"person_table_2\".ID)"
    ));
    assert!(sql.contains(
        "left outer join PERSON_SCHEMA.PERSON_TABLE as \"person_table_3\" \
         on (\"person_table_1\".MANAGERID = \"person_table_3\".ID)"
    ));
    assert!(sql.starts_with(
        "select \"person_table_1\".FIRSTNAME as \"Manager\", \
         \"person_table_2\".FIRSTNAME as \"Mentor\", \
         \"person_table_3\".FIRSTNAME as \"Grand Manager\""
    ));
    // Joins in first-allocation order
    let manager = sql.find("as \"person_table_1\"").unwrap();
    let mentor = sql.find("as \"person_table_2\"").unwrap();
    let grand = sql.find("as \"person_table_3\"").unwrap();
    assert!(manager < mentor && mentor < grand);
}

#[test]
fn test_association_filter_joins_on_condition() {
    let older = QueryExpr::call(
        "greaterThan",
        vec![current(vec![prop("age")]), QueryExpr::integer(50)],
    );
    let query = person().project(
        "Senior Manager",
        root(vec![prop("manager"), filter(older), prop("firstName")]),
    );

    assert_eq!(
        compile_sql(&query),
        "select \"person_table_1\".FIRSTNAME as \"Senior Manager\" \
         from PERSON_SCHEMA.PERSON_TABLE as \"root\" \
         left outer join PERSON_SCHEMA.PERSON_TABLE as \"person_table_1\" \
         on (\"root\".MANAGERID = \"person_table_1\".ID and \"person_table_1\".AGE > 50)"
    );
}

#[test]
fn test_filtered_and_plain_association_are_separate_joins() {
    let older = QueryExpr::call(
        "greaterThan",
        vec![current(vec![prop("age")]), QueryExpr::integer(50)],
    );
    let query = person()
        .project("Manager", root(vec![prop("manager"), prop("firstName")]))
        .project(
            "Senior Manager",
            root(vec![prop("manager"), filter(older), prop("firstName")]),
        );
    let sql = compile_sql(&query);

    assert_eq!(sql.matches("left outer join").count(), 2);
    assert!(sql.contains("\"person_table_2\".AGE > 50"));
}

#[test]
fn test_join_filter_cannot_navigate_further() {
    let employed_at_acme = QueryExpr::eq(
        current(vec![prop("employer"), prop("name")]),
        QueryExpr::string("Acme"),
    );
    let query = person().project(
        "Manager",
        root(vec![prop("manager"), filter(employed_at_acme), prop("firstName")]),
    );
    assert!(matches!(
        compile_err(&query),
        CompileError::UnsupportedConstruct(_)
    ));
}

#[test]
fn test_explosion_join() {
    let query = person()
        .with_filter(QueryExpr::eq(
            root(vec![prop("organizations"), prop("name")]),
            QueryExpr::string("Acme"),
        ))
        .project("Organization", root(vec![prop("organizations"), prop("name")]));

    assert_eq!(
        compile_sql(&query),
        format!(
            "select \"organization_table\".NAME as \"Organization\" \
             from PERSON_SCHEMA.PERSON_TABLE as \"root\" \
             left outer join (select \"organization_table_1\".*, \
             \"ss_flatten_0\".VALUE['id']::number as \"leftJoinKey\" \
             from ORG_SCHEMA.ORGANIZATION_TABLE as \"organization_table_1\" {} \
             where \"ss_flatten_0\".VALUE['kind']::varchar = 'PERSON') as \"organization_table\" \
             on (\"root\".ID = \"organization_table\".\"leftJoinKey\") \
             where \"organization_table\".NAME = 'Acme'",
            flatten_join("\"organization_table_1\".DETAILS['members']", "ss_flatten_0")
        )
    );
}

#[test]
fn test_explosion_is_not_a_filter_only_flatten() {
    let query = person()
        .with_filter(QueryExpr::eq(
            root(vec![prop("organizations"), prop("name")]),
            QueryExpr::string("Acme"),
        ))
        .project("First Name", root(vec![prop("firstName")]));
    assert!(compile_sql(&query).starts_with("select \"root\".FIRSTNAME"));
}

#[test]
fn test_milestoned_association() {
    let query = person().project(
        "Employer",
        root(vec![prop_on("employer", 2020, 1, 1), prop("name")]),
    );
    assert!(compile_sql(&query).ends_with(
        "left outer join EMPLOYER_SCHEMA.EMPLOYER_TABLE as \"employer_table\" \
         on (\"root\".EMPLOYERID = \"employer_table\".ID \
         and \"employer_table\".FROM_Z <= '2020-01-01' \
         and \"employer_table\".THRU_Z > '2020-01-01')"
    ));
}

#[test]
fn test_different_dates_are_different_joins() {
    let query = person()
        .project(
            "Employer 2020",
            root(vec![prop_on("employer", 2020, 1, 1), prop("name")]),
        )
        .project(
            "Employer 2021",
            root(vec![prop_on("employer", 2021, 1, 1), prop("name")]),
        );
    let sql = compile_sql(&query);

    assert!(sql.contains("\"employer_table_1\".FROM_Z <= '2021-01-01'"));
    assert!(sql.starts_with(
        "select \"employer_table\".NAME as \"Employer 2020\", \
         \"employer_table_1\".NAME as \"Employer 2021\""
    ));
}

#[test]
fn test_milestoned_root() {
    let mut query = ResolvedQuery::new(EMPLOYER).project("Name", root(vec![prop("name")]));
    query.root_dates = Some(business(2020, 1, 1));

    assert_eq!(
        compile_sql(&query),
        "select \"root\".NAME as \"Name\" from EMPLOYER_SCHEMA.EMPLOYER_TABLE as \"root\" \
         where (\"root\".FROM_Z <= '2020-01-01' and \"root\".THRU_Z > '2020-01-01')"
    );
}

#[test]
fn test_versioned_view_association() {
    let query = person().project("Car", root(vec![prop("car"), prop("model")]));
    assert_eq!(
        compile_sql(&query),
        "select \"car_table\".MODEL as \"Car\" from PERSON_SCHEMA.PERSON_TABLE as \"root\" \
         left outer join (select \"vt\".* from CAR_SCHEMA.CAR_TABLE as \"vt\" \
         inner join (select \"vk\".ID as ID, max(\"vk\".VERSION) as maxVersion \
         from CAR_SCHEMA.CAR_TABLE as \"vk\" group by \"vk\".ID) as \"vm\" \
         on (\"vt\".ID = \"vm\".ID and \"vt\".VERSION = \"vm\".maxVersion)) as \"car_table\" \
         on (\"root\".CARID = \"car_table\".ID)"
    );
}

#[test]
fn test_empty_association_tests_the_joined_key() {
    let query = person()
        .with_filter(QueryExpr::call("isEmpty", vec![root(vec![prop("manager")])]))
        .project("First Name", root(vec![prop("firstName")]));

    assert_eq!(
        compile_sql(&query),
        format!(
            "select \"root\".FIRSTNAME as \"First Name\" \
             from PERSON_SCHEMA.PERSON_TABLE as \"root\" {} \
             where \"person_table_1\".ID is null",
            MANAGER_JOIN
        )
    );
}
