use sqlx::{Row, SqlitePool};

use modsmith_core::{Error, Result};

fn db_error(err: sqlx::Error) -> Error {
    Error::Db(err.to_string())
}

/// Quote an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        select name
        from sqlite_master
        where type = 'table'
          and name not like 'sqlite_%'
        order by name
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(db_error)
}

pub struct RawColumn {
    pub cid: i64,
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub pk: i64,
}

pub async fn list_columns(pool: &SqlitePool, table: &str) -> Result<Vec<RawColumn>> {
    let rows = sqlx::query(
        r#"
        select cid, name, type, "notnull", dflt_value, pk
        from pragma_table_info(?1)
        order by cid
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(db_error)?;

    rows.into_iter()
        .map(|row| {
            Ok(RawColumn {
                cid: row.try_get("cid").map_err(db_error)?,
                name: row.try_get("name").map_err(db_error)?,
                declared_type: row.try_get("type").map_err(db_error)?,
                not_null: row.try_get::<i64, _>("notnull").map_err(db_error)? != 0,
                default: row.try_get("dflt_value").map_err(db_error)?,
                pk: row.try_get("pk").map_err(db_error)?,
            })
        })
        .collect()
}

pub struct RawForeignKey {
    pub id: i64,
    pub seq: i64,
    pub table: String,
    pub from: String,
    /// `None` when the constraint names only the parent table, which means
    /// its primary key.
    pub to: Option<String>,
}

pub async fn list_foreign_keys(pool: &SqlitePool, table: &str) -> Result<Vec<RawForeignKey>> {
    let rows = sqlx::query(
        r#"
        select id, seq, "table", "from", "to"
        from pragma_foreign_key_list(?1)
        order by id, seq
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(db_error)?;

    rows.into_iter()
        .map(|row| {
            Ok(RawForeignKey {
                id: row.try_get("id").map_err(db_error)?,
                seq: row.try_get("seq").map_err(db_error)?,
                table: row.try_get("table").map_err(db_error)?,
                from: row.try_get("from").map_err(db_error)?,
                to: row.try_get("to").map_err(db_error)?,
            })
        })
        .collect()
}

/// Distinct non-null textual values of `column`, sorted.
pub async fn distinct_text_values(
    pool: &SqlitePool,
    table: &str,
    column: &str,
) -> Result<Vec<String>> {
    let column = quote_ident(column);
    let sql = format!(
        "select distinct {column} from {} where {column} is not null and typeof({column}) = 'text' order by 1",
        quote_ident(table)
    );
    sqlx::query_scalar::<_, String>(&sql)
        .fetch_all(pool)
        .await
        .map_err(db_error)
}

/// Distinct non-null values of a key column, rendered as text.
pub async fn distinct_key_values(pool: &SqlitePool, table: &str, column: &str) -> Result<Vec<String>> {
    let column = quote_ident(column);
    let sql = format!(
        "select distinct cast({column} as text) from {} where {column} is not null order by 1",
        quote_ident(table)
    );
    sqlx::query_scalar::<_, String>(&sql)
        .fetch_all(pool)
        .await
        .map_err(db_error)
}

/// Observed value profile of an integer-typed column.
pub struct BooleanProfile {
    pub rows: i64,
    pub nulls: i64,
    pub binary: i64,
}

pub async fn boolean_profile(pool: &SqlitePool, table: &str, column: &str) -> Result<BooleanProfile> {
    let column = quote_ident(column);
    let sql = format!(
        r#"
        select
          count(*) as row_count,
          coalesce(sum(case when {column} is null then 1 else 0 end), 0) as null_count,
          coalesce(sum(case when {column} in (0, 1) then 1 else 0 end), 0) as binary_count
        from {}
        "#,
        quote_ident(table)
    );
    let row = sqlx::query(&sql)
        .fetch_one(pool)
        .await
        .map_err(db_error)?;
    Ok(BooleanProfile {
        rows: row.try_get("row_count").map_err(db_error)?,
        nulls: row.try_get("null_count").map_err(db_error)?,
        binary: row.try_get("binary_count").map_err(db_error)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted_and_escaped() {
        assert_eq!(quote_ident("Units"), "\"Units\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
