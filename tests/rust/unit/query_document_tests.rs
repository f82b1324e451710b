//! Parsing resolved query documents.

#[cfg(test)]
mod query_document_tests {
    use relplan::query_tree::{
        AggregateFunction, OrderTarget, QueryExpr, ResolvedQuery, SortDirection,
    };

    const QUERY: &str = include_str!("../../fixtures/person_query.yaml");

    #[test]
    fn test_query_fixture_parses() {
        let query = ResolvedQuery::from_yaml_str(QUERY).unwrap();

        assert_eq!(query.root_class, "model::Person");
        assert_eq!(query.projections.len(), 4);
        assert_eq!(query.limit, Some(5));
        assert_eq!(
            query.order_by[0].target,
            OrderTarget::Column("First Name".into())
        );
        assert_eq!(query.order_by[0].direction, SortDirection::Asc);
        match &query.projections[3].expr {
            QueryExpr::Aggregate {
                function,
                separator,
                ..
            } => {
                assert_eq!(*function, AggregateFunction::JoinStrings);
                assert_eq!(separator.as_deref(), Some(";"));
            }
            other => panic!("expected an aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_json_round_trip_keeps_query() {
        let query = ResolvedQuery::from_yaml_str(QUERY).unwrap();
        let json = serde_json::to_string(&query).unwrap();
        assert_eq!(ResolvedQuery::from_json_str(&json).unwrap(), query);
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        let yaml = r#"
root_class: model::Person
projections:
  - name: X
    expr:
      kind: path
      steps:
        - { step: teleport, property: firstName }
"#;
        assert!(ResolvedQuery::from_yaml_str(yaml).is_err());
    }
}
