//! Catalog queries behind the schema RPCs.
//!
//! All of these are plain reads over `pg_catalog` / `information_schema`,
//! scoped to what the SQL editor needs for browsing and autocompletion.

use crate::client::PgClient;
use crate::error::AdapterError;
use serde::Serialize;
use std::collections::HashMap;
use tokio_postgres::types::Oid;

#[derive(Debug, Clone, Serialize)]
pub struct SchemaRow {
    pub name: String,
    pub owner: String,
}

pub async fn get_schemas(client: &PgClient) -> Result<Vec<SchemaRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT nspname, pg_get_userbyid(nspowner) \
             FROM pg_namespace \
             WHERE nspname NOT LIKE 'pg\\_%' AND nspname <> 'information_schema' \
             ORDER BY nspname",
            &[],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| SchemaRow {
            name: row.get(0),
            owner: row.get(1),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub name: String,
    pub kind: String,
    pub owner: String,
    pub estimated_rows: i64,
}

pub async fn get_tables(client: &PgClient, schema: &str) -> Result<Vec<TableRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT c.relname, c.relkind::text, pg_get_userbyid(c.relowner), \
                    c.reltuples::bigint \
             FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relkind IN ('r', 'v', 'm', 'f', 'p') \
             ORDER BY c.relname",
            &[&schema],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let relkind: String = row.get(1);
            TableRow {
                name: row.get(0),
                kind: table_kind(&relkind).to_string(),
                owner: row.get(2),
                estimated_rows: row.get::<_, i64>(3).max(0),
            }
        })
        .collect())
}

fn table_kind(relkind: &str) -> &'static str {
    match relkind {
        "r" => "table",
        "v" => "view",
        "m" => "materialized_view",
        "f" => "foreign_table",
        "p" => "partitioned_table",
        _ => "relation",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnRow {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
    pub ordinal: i32,
}

pub async fn get_columns(
    client: &PgClient,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT c.column_name::text, c.data_type::text, c.is_nullable = 'YES', \
                    c.column_default::text, \
                    EXISTS (\
                        SELECT 1 \
                        FROM information_schema.table_constraints tc \
                        JOIN information_schema.key_column_usage kcu \
                          ON tc.constraint_name = kcu.constraint_name \
                         AND tc.table_schema = kcu.table_schema \
                        WHERE tc.constraint_type = 'PRIMARY KEY' \
                          AND tc.table_schema = c.table_schema \
                          AND tc.table_name = c.table_name \
                          AND kcu.column_name = c.column_name\
                    ), \
                    c.ordinal_position::int \
             FROM information_schema.columns c \
             WHERE c.table_schema = $1 AND c.table_name = $2 \
             ORDER BY c.ordinal_position",
            &[&schema, &table],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| ColumnRow {
            name: row.get(0),
            data_type: row.get(1),
            nullable: row.get(2),
            default: row.get(3),
            is_primary_key: row.get(4),
            ordinal: row.get(5),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub owner: String,
    pub estimated_rows: i64,
    pub total_size: String,
    pub table_size: String,
    pub indexes_size: String,
    pub comment: Option<String>,
}

pub async fn get_table_info(
    client: &PgClient,
    schema: &str,
    table: &str,
) -> Result<Option<TableInfo>, AdapterError> {
    let row = client
        .query_opt(
            "SELECT n.nspname, c.relname, pg_get_userbyid(c.relowner), \
                    c.reltuples::bigint, \
                    pg_size_pretty(pg_total_relation_size(c.oid)), \
                    pg_size_pretty(pg_table_size(c.oid)), \
                    pg_size_pretty(pg_indexes_size(c.oid)), \
                    obj_description(c.oid, 'pg_class') \
             FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relname = $2",
            &[&schema, &table],
        )
        .await?;
    Ok(row.map(|row| TableInfo {
        schema: row.get(0),
        name: row.get(1),
        owner: row.get(2),
        estimated_rows: row.get::<_, i64>(3).max(0),
        total_size: row.get(4),
        table_size: row.get(5),
        indexes_size: row.get(6),
        comment: row.get(7),
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexRow {
    pub name: String,
    pub definition: String,
    pub is_unique: bool,
    pub is_primary: bool,
}

pub async fn get_indexes(
    client: &PgClient,
    schema: &str,
    table: &str,
) -> Result<Vec<IndexRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT i.relname, pg_get_indexdef(ix.indexrelid), ix.indisunique, ix.indisprimary \
             FROM pg_index ix \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             WHERE n.nspname = $1 AND t.relname = $2 \
             ORDER BY i.relname",
            &[&schema, &table],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| IndexRow {
            name: row.get(0),
            definition: row.get(1),
            is_unique: row.get(2),
            is_primary: row.get(3),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstraintRow {
    pub name: String,
    pub kind: String,
    pub definition: String,
}

pub async fn get_constraints(
    client: &PgClient,
    schema: &str,
    table: &str,
) -> Result<Vec<ConstraintRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT con.conname, con.contype::text, pg_get_constraintdef(con.oid) \
             FROM pg_constraint con \
             JOIN pg_class c ON c.oid = con.conrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relname = $2 \
             ORDER BY con.conname",
            &[&schema, &table],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let contype: String = row.get(1);
            ConstraintRow {
                name: row.get(0),
                kind: constraint_kind(&contype).to_string(),
                definition: row.get(2),
            }
        })
        .collect())
}

fn constraint_kind(contype: &str) -> &'static str {
    match contype {
        "p" => "primary_key",
        "f" => "foreign_key",
        "u" => "unique",
        "c" => "check",
        "x" => "exclusion",
        _ => "constraint",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerRow {
    pub name: String,
    pub definition: String,
    pub enabled: bool,
}

pub async fn get_triggers(
    client: &PgClient,
    schema: &str,
    table: &str,
) -> Result<Vec<TriggerRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT t.tgname, pg_get_triggerdef(t.oid), t.tgenabled::text <> 'D' \
             FROM pg_trigger t \
             JOIN pg_class c ON c.oid = t.tgrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relname = $2 AND NOT t.tgisinternal \
             ORDER BY t.tgname",
            &[&schema, &table],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| TriggerRow {
            name: row.get(0),
            definition: row.get(1),
            enabled: row.get(2),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyRow {
    pub name: String,
    pub permissive: String,
    pub roles: Vec<String>,
    pub command: String,
    pub using_expr: Option<String>,
    pub with_check: Option<String>,
}

pub async fn get_policies(
    client: &PgClient,
    schema: &str,
    table: &str,
) -> Result<Vec<PolicyRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT policyname, permissive, roles::text[], cmd, qual, with_check \
             FROM pg_policies \
             WHERE schemaname = $1 AND tablename = $2 \
             ORDER BY policyname",
            &[&schema, &table],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| PolicyRow {
            name: row.get(0),
            permissive: row.get(1),
            roles: row.get(2),
            command: row.get(3),
            using_expr: row.get(4),
            with_check: row.get(5),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct GrantRow {
    pub grantee: String,
    pub privilege: String,
    pub grantable: bool,
}

pub async fn get_grants(
    client: &PgClient,
    schema: &str,
    table: &str,
) -> Result<Vec<GrantRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT grantee::text, privilege_type::text, is_grantable::text = 'YES' \
             FROM information_schema.role_table_grants \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY grantee, privilege_type",
            &[&schema, &table],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| GrantRow {
            grantee: row.get(0),
            privilege: row.get(1),
            grantable: row.get(2),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializedViewRow {
    pub name: String,
    pub definition: String,
    pub populated: bool,
}

pub async fn get_materialized_views(
    client: &PgClient,
    schema: &str,
) -> Result<Vec<MaterializedViewRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT matviewname, definition, ispopulated \
             FROM pg_matviews \
             WHERE schemaname = $1 \
             ORDER BY matviewname",
            &[&schema],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| MaterializedViewRow {
            name: row.get(0),
            definition: row.get(1),
            populated: row.get(2),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionRow {
    pub name: String,
    pub arguments: String,
    pub returns: Option<String>,
    pub language: String,
}

async fn routines(
    client: &PgClient,
    schema: &str,
    prokind: &str,
) -> Result<Vec<FunctionRow>, AdapterError> {
    let rows = client
        .query(
            "SELECT p.proname, pg_get_function_arguments(p.oid), \
                    pg_get_function_result(p.oid), l.lanname \
             FROM pg_proc p \
             JOIN pg_namespace n ON n.oid = p.pronamespace \
             JOIN pg_language l ON l.oid = p.prolang \
             WHERE n.nspname = $1 AND p.prokind::text = $2 \
             ORDER BY p.proname",
            &[&schema, &prokind],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| FunctionRow {
            name: row.get(0),
            arguments: row.get(1),
            returns: row.get(2),
            language: row.get(3),
        })
        .collect())
}

pub async fn get_functions(
    client: &PgClient,
    schema: &str,
) -> Result<Vec<FunctionRow>, AdapterError> {
    routines(client, schema, "f").await
}

pub async fn get_procedures(
    client: &PgClient,
    schema: &str,
) -> Result<Vec<FunctionRow>, AdapterError> {
    routines(client, schema, "p").await
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    pub arguments: String,
    pub returns: Option<String>,
    pub language: String,
    pub owner: String,
    pub definition: String,
}

/// Every overload of `name` in `schema`, with full definitions.
pub async fn get_function_info(
    client: &PgClient,
    schema: &str,
    name: &str,
) -> Result<Vec<FunctionInfo>, AdapterError> {
    let rows = client
        .query(
            "SELECT p.proname, pg_get_function_arguments(p.oid), \
                    pg_get_function_result(p.oid), l.lanname, \
                    pg_get_userbyid(p.proowner), pg_get_functiondef(p.oid) \
             FROM pg_proc p \
             JOIN pg_namespace n ON n.oid = p.pronamespace \
             JOIN pg_language l ON l.oid = p.prolang \
             WHERE n.nspname = $1 AND p.proname = $2 AND p.prokind IN ('f', 'p') \
             ORDER BY p.oid",
            &[&schema, &name],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| FunctionInfo {
            name: row.get(0),
            arguments: row.get(1),
            returns: row.get(2),
            language: row.get(3),
            owner: row.get(4),
            definition: row.get(5),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDependency {
    pub schema: String,
    pub name: String,
    pub kind: String,
}

/// Relations a function depends on, per `pg_depend`.
pub async fn get_function_dependencies(
    client: &PgClient,
    schema: &str,
    name: &str,
) -> Result<Vec<FunctionDependency>, AdapterError> {
    let rows = client
        .query(
            "SELECT DISTINCT depn.nspname, dep.relname, dep.relkind::text \
             FROM pg_proc p \
             JOIN pg_namespace n ON n.oid = p.pronamespace \
             JOIN pg_depend d ON d.objid = p.oid \
             JOIN pg_class dep ON dep.oid = d.refobjid \
             JOIN pg_namespace depn ON depn.oid = dep.relnamespace \
             WHERE n.nspname = $1 AND p.proname = $2 \
             ORDER BY depn.nspname, dep.relname",
            &[&schema, &name],
        )
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let relkind: String = row.get(2);
            FunctionDependency {
                schema: row.get(0),
                name: row.get(1),
                kind: table_kind(&relkind).to_string(),
            }
        })
        .collect())
}

/// Attributes of a result column resolved from its table oid and attnum.
#[derive(Debug, Clone)]
pub struct ColumnAttributes {
    pub table: String,
    pub schema: String,
    pub not_null: bool,
    pub has_default: bool,
    pub is_primary_key: bool,
}

/// Resolve table/schema/PK/nullability facts for `(table_oid, attnum)`
/// pairs in one round trip.
pub async fn column_attributes(
    client: &PgClient,
    keys: &[(Oid, i16)],
) -> Result<HashMap<(Oid, i16), ColumnAttributes>, AdapterError> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let oids: Vec<Oid> = keys.iter().map(|(oid, _)| *oid).collect();
    let rows = client
        .query(
            "SELECT a.attrelid, a.attnum, c.relname, n.nspname, a.attnotnull, a.atthasdef, \
                    EXISTS (\
                        SELECT 1 FROM pg_index i \
                        WHERE i.indrelid = a.attrelid AND i.indisprimary \
                          AND a.attnum = ANY(i.indkey::int2[])\
                    ) \
             FROM pg_attribute a \
             JOIN pg_class c ON c.oid = a.attrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE a.attrelid = ANY($1) AND a.attnum > 0",
            &[&oids],
        )
        .await?;

    let mut map = HashMap::new();
    for row in rows {
        let key: (Oid, i16) = (row.get(0), row.get(1));
        map.insert(
            key,
            ColumnAttributes {
                table: row.get(2),
                schema: row.get(3),
                not_null: row.get(4),
                has_default: row.get(5),
                is_primary_key: row.get(6),
            },
        );
    }
    Ok(map)
}
