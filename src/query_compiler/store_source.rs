//! Table references and temporal conditions for mapped stores.

use crate::mapping_catalog::mapping_schema::{MilestoningDimension, StoreRef, VersionedView};
use crate::query_tree::TemporalArgument;
use crate::sql_generator::sql_ast::{
    JoinClause, JoinKind, SelectItem, SelectStatement, SqlExpr, SqlLiteral, SqlOperator,
    TableRef, TableSource,
};

use super::errors::CompileError;

const VIEW_ROWS: &str = "vt";
const VIEW_KEYS: &str = "vk";
const VIEW_MAX: &str = "vm";
const MAX_VERSION: &str = "maxVersion";

/// `FROM`/`JOIN` target for a store under `alias`.
pub fn table_ref(store: &StoreRef, alias: &str) -> Result<TableRef, CompileError> {
    let source = match store {
        StoreRef::Table(table) => TableSource::Table(table.name.clone()),
        StoreRef::VersionedView(view) => TableSource::Subquery(Box::new(latest_versions(view))),
        StoreRef::Embedded => {
            return Err(CompileError::unsupported(
                "embedded classes have no table to select from",
            ))
        }
    };
    Ok(TableRef {
        source,
        alias: alias.to_string(),
    })
}

/// Rows holding the maximum version per key:
///
/// ```sql
/// select "vt".* from T as "vt"
/// inner join (select "vk".K as K, max("vk".V) as maxVersion from T as "vk" group by "vk".K) as "vm"
///   on ("vt".K = "vm".K and "vt".V = "vm".maxVersion)
/// ```
fn latest_versions(view: &VersionedView) -> SelectStatement {
    let mut keys = SelectStatement::new(TableRef {
        source: TableSource::Table(view.table.clone()),
        alias: VIEW_KEYS.to_string(),
    });
    for key in &view.key_columns {
        keys.items
            .push(SelectItem::bare(SqlExpr::column(VIEW_KEYS, key), key.clone()));
        keys.group_by.push(SqlExpr::column(VIEW_KEYS, key));
    }
    keys.items.push(SelectItem::bare(
        SqlExpr::Function {
            name: "max".to_string(),
            args: vec![SqlExpr::column(VIEW_KEYS, &view.version_column)],
        },
        MAX_VERSION,
    ));

    let mut on: Vec<SqlExpr> = view
        .key_columns
        .iter()
        .map(|k| SqlExpr::eq(SqlExpr::column(VIEW_ROWS, k), SqlExpr::column(VIEW_MAX, k)))
        .collect();
    on.push(SqlExpr::eq(
        SqlExpr::column(VIEW_ROWS, &view.version_column),
        SqlExpr::column(VIEW_MAX, MAX_VERSION),
    ));

    let mut select = SelectStatement::new(TableRef {
        source: TableSource::Table(view.table.clone()),
        alias: VIEW_ROWS.to_string(),
    });
    select.items.push(SelectItem::unnamed(SqlExpr::AllColumns {
        table_alias: VIEW_ROWS.to_string(),
    }));
    select.joins.push(JoinClause::Table {
        kind: JoinKind::Inner,
        table: TableRef {
            source: TableSource::Subquery(Box::new(keys)),
            alias: VIEW_MAX.to_string(),
        },
        on: SqlExpr::And(on),
    });
    select
}

/// `alias.FROM <= 'd' and alias.THRU > 'd'` for each milestoned dimension
/// with an applied date.
pub fn milestoning_conditions(
    store: &StoreRef,
    alias: &str,
    dates: Option<&TemporalArgument>,
) -> Vec<SqlExpr> {
    let Some(dates) = dates else {
        return Vec::new();
    };
    let mut conditions = Vec::new();
    for milestoning in store.milestoning() {
        let date = match milestoning.dimension {
            MilestoningDimension::Business => dates.business_date,
            MilestoningDimension::Processing => dates.processing_date,
        };
        if let Some(date) = date {
            conditions.push(SqlExpr::binary(
                SqlOperator::LtEq,
                SqlExpr::column(alias, &milestoning.from_column),
                SqlExpr::Literal(SqlLiteral::Date(date)),
            ));
            conditions.push(SqlExpr::binary(
                SqlOperator::Gt,
                SqlExpr::column(alias, &milestoning.thru_column),
                SqlExpr::Literal(SqlLiteral::Date(date)),
            ));
        }
    }
    if conditions.is_empty() && !dates.is_empty() {
        log::warn!(
            "Dates applied to '{}' but its store declares no matching milestoning",
            alias
        );
    }
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_catalog::mapping_schema::{Milestoning, TableStore};
    use crate::sql_generator::{SnowflakeDialect, ToSql};
    use chrono::NaiveDate;

    #[test]
    fn test_versioned_view_subquery() {
        let store = StoreRef::VersionedView(VersionedView {
            table: "S.PRODUCT".into(),
            key_columns: vec!["ID".into()],
            version_column: "VERSION".into(),
        });
        let table = table_ref(&store, "product").unwrap();
        assert_eq!(
            table.to_sql(&SnowflakeDialect),
            "(select \"vt\".* from S.PRODUCT as \"vt\" inner join (select \"vk\".ID as ID, max(\"vk\".VERSION) as maxVersion from S.PRODUCT as \"vk\" group by \"vk\".ID) as \"vm\" on (\"vt\".ID = \"vm\".ID and \"vt\".VERSION = \"vm\".maxVersion)) as \"product\""
        );
    }

    #[test]
    fn test_business_milestoning() {
        let store = StoreRef::Table(TableStore {
            name: "S.FIRM".into(),
            primary_key: vec!["ID".into()],
            milestoning: vec![Milestoning {
                dimension: MilestoningDimension::Business,
                from_column: "FROM_Z".into(),
                thru_column: "THRU_Z".into(),
            }],
        });
        let dates = TemporalArgument {
            business_date: NaiveDate::from_ymd_opt(2020, 1, 1),
            processing_date: None,
        };
        let conds = milestoning_conditions(&store, "firm", Some(&dates));
        let rendered: Vec<String> = conds.iter().map(|c| c.to_sql(&SnowflakeDialect)).collect();
        assert_eq!(
            rendered,
            vec![
                "\"firm\".FROM_Z <= '2020-01-01'",
                "\"firm\".THRU_Z > '2020-01-01'"
            ]
        );
        assert!(milestoning_conditions(&store, "firm", None).is_empty());
    }
}
