//! PostgreSQL inventory battery.
//!
//! The role listing runs on the primary pool. The permission and content
//! sections open a short-lived secondary pool per non-template database,
//! since table privileges and relation sizes are only visible from inside
//! each database.

use crate::adapters::postgres::connection::{self, DEFAULT_DATABASE};
use crate::adapters::report_section;
use crate::error::InventoryError;
use crate::report::{Report, yes_no};
use crate::security::{ConnectionParams, PasswordCache, PasswordReader};
use crate::ServerTarget;
use sqlx::{PgPool, Row};
use std::cmp::Ordering;
use std::io::Write;

/// Section title for the role listing.
pub const USER_ACCOUNTS: &str = "USER ACCOUNTS";
/// Section title for per-database role access.
pub const DATA_ACCESS: &str = "DATA ACCESS PERMISSIONS";
/// Section title for database sizes and sampled tables.
pub const CONTENT_INVENTORY: &str = "INSTANCE CONTENT INVENTORY";

/// Section titles in the order they are printed.
pub const SECTIONS: [&str; 3] = [USER_ACCOUNTS, DATA_ACCESS, CONTENT_INVENTORY];

/// Tables sampled per database in the content inventory.
pub const TABLE_SAMPLE_LIMIT: i64 = 5;

/// SQLSTATE `insufficient_privilege`.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// One role from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAccount {
    /// Role name
    pub name: String,
    /// `rolsuper`
    pub superuser: bool,
    /// Whether a password is stored; `None` when `pg_authid` was not readable
    pub password_set: Option<bool>,
    /// `rolcanlogin`
    pub can_login: bool,
}

impl RoleAccount {
    /// Login-capable roles first, then by name.
    pub fn login_first(a: &Self, b: &Self) -> Ordering {
        b.can_login
            .cmp(&a.can_login)
            .then_with(|| a.name.cmp(&b.name))
    }
}

/// What a login role can do inside one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAccess {
    /// Role name
    pub role: String,
    /// `CONNECT` privilege on the database
    pub connect: bool,
    /// `SELECT` on at least one table
    pub read: bool,
    /// `INSERT`, `UPDATE`, or `DELETE` on at least one table
    pub write: bool,
}

impl RoleAccess {
    /// Combines raw privilege checks. Superusers bypass table privileges,
    /// so they always read and write.
    pub fn from_grants(
        role: impl Into<String>,
        superuser: bool,
        connect: bool,
        read: bool,
        write: bool,
    ) -> Self {
        Self {
            role: role.into(),
            connect,
            read: read || superuser,
            write: write || superuser,
        }
    }

    /// Only roles that can connect or read are worth listing.
    pub fn is_reportable(&self) -> bool {
        self.connect || self.read
    }
}

/// Formats one role row.
pub fn role_row(role: &RoleAccount) -> String {
    let password = role.password_set.map_or("?", yes_no);
    format!(
        "  |-- {:<30} | Super: {:<3} | Password: {:<3} | Login: {}",
        role.name,
        yes_no(role.superuser),
        password,
        yes_no(role.can_login)
    )
}

/// Formats one access row.
pub fn access_row(access: &RoleAccess) -> String {
    format!(
        "        |-- User: {:<15} | Conn: {:<3} | Read: {:<3} | Write: {}",
        access.role,
        yes_no(access.connect),
        yes_no(access.read),
        yes_no(access.write)
    )
}

/// Formats one sampled table row.
pub fn table_row(name: &str, size: &str) -> String {
    format!("    |-- {name:<30} | Size: {size}")
}

/// Runs the full PostgreSQL inventory battery against `target`.
///
/// # Errors
/// - [`InventoryError::Credential`] if the password prompt fails
/// - [`InventoryError::Connect`] if the primary connection fails
/// - [`InventoryError::Output`] if the console cannot be written
pub async fn run_inventory<R, W>(
    target: &ServerTarget,
    passwords: &mut PasswordCache<R>,
    out: &mut Report<W>,
) -> Result<(), InventoryError>
where
    R: PasswordReader,
    W: Write,
{
    let params = target.with_password(passwords.get()?);

    out.line(format_args!(
        "Connecting to database '{DEFAULT_DATABASE}' at {}...",
        target.endpoint()
    ))?;
    let pool = connection::connect(&params).await?;

    out.header(USER_ACCOUNTS)?;
    let outcome = user_accounts(&pool, out).await;
    report_section(out, USER_ACCOUNTS, outcome)?;

    out.header(DATA_ACCESS)?;
    let outcome = data_access(&pool, &params, out).await;
    report_section(out, DATA_ACCESS, outcome)?;

    out.header(CONTENT_INVENTORY)?;
    let outcome = content_inventory(&pool, &params, out).await;
    report_section(out, CONTENT_INVENTORY, outcome)?;

    pool.close().await;
    Ok(())
}

async fn fetch_roles(pool: &PgPool) -> Result<Vec<RoleAccount>, InventoryError> {
    const AUTHID: &str = "SELECT rolname::text, rolsuper, rolpassword IS NOT NULL, rolcanlogin
                          FROM pg_authid";
    // pg_roles masks rolpassword, so the flag is unknown there.
    const ROLES: &str = "SELECT rolname::text, rolsuper, NULL::bool, rolcanlogin
                         FROM pg_roles";

    let rows = match sqlx::query(AUTHID).fetch_all(pool).await {
        Ok(rows) => rows,
        Err(e) if is_insufficient_privilege(&e) => {
            tracing::debug!("pg_authid not readable, falling back to pg_roles: {}", e);
            sqlx::query(ROLES)
                .fetch_all(pool)
                .await
                .map_err(|e| InventoryError::query("Error querying database", e))?
        }
        Err(e) => return Err(InventoryError::query("Error querying database", e)),
    };

    let mut roles = rows
        .iter()
        .map(|row| {
            Ok(RoleAccount {
                name: row.try_get(0)?,
                superuser: row.try_get(1)?,
                password_set: row.try_get(2)?,
                can_login: row.try_get(3)?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(|e| InventoryError::query("Error reading user", e))?;

    roles.sort_by(RoleAccount::login_first);
    Ok(roles)
}

fn is_insufficient_privilege(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == INSUFFICIENT_PRIVILEGE)
}

async fn user_accounts<W: Write>(pool: &PgPool, out: &mut Report<W>) -> Result<(), InventoryError> {
    let roles = fetch_roles(pool).await?;
    for role in &roles {
        out.line(role_row(role))?;
    }
    tracing::debug!("Listed {} PostgreSQL roles", roles.len());
    Ok(())
}

async fn list_databases(pool: &PgPool) -> Result<Vec<String>, InventoryError> {
    sqlx::query_scalar("SELECT datname::text FROM pg_database WHERE NOT datistemplate ORDER BY datname")
        .fetch_all(pool)
        .await
        .map_err(|e| InventoryError::query("Error querying database", e))
}

/// Opens a secondary pool on `database`, printing a notice when it fails.
async fn open_database<W: Write>(
    params: &ConnectionParams,
    database: &str,
    out: &mut Report<W>,
) -> Result<Option<PgPool>, InventoryError> {
    match connection::connect(&params.for_database(database)).await {
        Ok(pool) => Ok(Some(pool)),
        Err(e) => {
            tracing::debug!("Secondary connection to {} failed: {}", database, e);
            out.line(format_args!("  |-- Unable to connect to {database}"))?;
            Ok(None)
        }
    }
}

async fn role_access(pool: &PgPool) -> Result<Vec<RoleAccess>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT r.rolname::text,
                r.rolsuper,
                has_database_privilege(r.oid, current_database(), 'CONNECT'),
                EXISTS (SELECT 1 FROM information_schema.table_privileges
                        WHERE grantee = r.rolname AND privilege_type = 'SELECT'),
                EXISTS (SELECT 1 FROM information_schema.table_privileges
                        WHERE grantee = r.rolname
                          AND privilege_type IN ('INSERT', 'UPDATE', 'DELETE'))
         FROM pg_roles r
         WHERE r.rolcanlogin
         ORDER BY r.rolname",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(RoleAccess::from_grants(
                row.try_get::<String, _>(0)?,
                row.try_get(1)?,
                row.try_get(2)?,
                row.try_get(3)?,
                row.try_get(4)?,
            ))
        })
        .collect()
}

async fn data_access<W: Write>(
    pool: &PgPool,
    params: &ConnectionParams,
    out: &mut Report<W>,
) -> Result<(), InventoryError> {
    for database in list_databases(pool).await? {
        let Some(db_pool) = open_database(params, &database, out).await? else {
            continue;
        };

        match role_access(&db_pool).await {
            Ok(access) => {
                out.line(format_args!("  |-- Database: {database}"))?;
                for entry in access.iter().filter(|a| a.is_reportable()) {
                    out.line(access_row(entry))?;
                }
            }
            Err(e) => {
                tracing::debug!("Access query failed in {}: {}", database, e);
                out.line(format_args!("  |-- [!] Error reading privileges in {database}: {e}"))?;
            }
        }
        db_pool.close().await;
    }
    Ok(())
}

async fn database_size(pool: &PgPool, database: &str) -> Result<String, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT CASE WHEN has_database_privilege($1::text, 'CONNECT')
                     THEN pg_size_pretty(pg_database_size($1::name))
                     ELSE 'No Access' END",
    )
    .bind(database)
    .fetch_one(pool)
    .await
}

async fn sample_tables(pool: &PgPool) -> Result<Vec<(String, String)>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT c.relname::text, pg_size_pretty(pg_total_relation_size(c.oid))
         FROM pg_class c
         JOIN pg_namespace n ON n.oid = c.relnamespace
         WHERE c.relkind = 'r' AND n.nspname = 'public'
         ORDER BY c.relname
         LIMIT $1",
    )
    .bind(TABLE_SAMPLE_LIMIT)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Ok((row.try_get(0)?, row.try_get(1)?)))
        .collect()
}

async fn content_inventory<W: Write>(
    pool: &PgPool,
    params: &ConnectionParams,
    out: &mut Report<W>,
) -> Result<(), InventoryError> {
    for database in list_databases(pool).await? {
        match database_size(pool, &database).await {
            Ok(size) => out.line(format_args!("  |-- DATABASE: {database} (SIZE: {size})"))?,
            Err(e) => {
                out.line(format_args!("  |-- Error querying {database}: {e}"))?;
                continue;
            }
        }

        let Some(db_pool) = open_database(params, &database, out).await? else {
            continue;
        };
        match sample_tables(&db_pool).await {
            Ok(tables) => {
                for (name, size) in &tables {
                    out.line(table_row(name, size))?;
                }
            }
            Err(e) => tracing::debug!("Table sample failed in {}: {}", database, e),
        }
        db_pool.close().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, can_login: bool) -> RoleAccount {
        RoleAccount {
            name: name.to_string(),
            superuser: false,
            password_set: Some(true),
            can_login,
        }
    }

    #[test]
    fn test_roles_order_login_first() {
        let mut roles = vec![
            role("pg_monitor", false),
            role("webapp", true),
            role("analyst", true),
            role("pg_read_all_data", false),
        ];
        roles.sort_by(RoleAccount::login_first);

        let names: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["analyst", "webapp", "pg_monitor", "pg_read_all_data"]
        );
    }

    #[test]
    fn test_superuser_implies_read_write() {
        let access = RoleAccess::from_grants("postgres", true, false, false, false);
        assert!(access.read);
        assert!(access.write);
        assert!(!access.connect);
        assert!(access.is_reportable());
    }

    #[test]
    fn test_reportable_iff_connect_or_read() {
        let cases = [
            (false, false, false, false),
            (false, false, true, false),
            (true, false, false, true),
            (false, true, false, true),
            (true, true, true, true),
        ];
        for (connect, read, write, expected) in cases {
            let access = RoleAccess::from_grants("app", false, connect, read, write);
            assert_eq!(
                access.is_reportable(),
                expected,
                "connect={connect} read={read} write={write}"
            );
        }
    }

    #[test]
    fn test_role_row_marks_unknown_password() {
        let mut account = role("webapp", true);
        assert!(role_row(&account).contains("| Password: YES |"));

        account.password_set = None;
        let row = role_row(&account);
        assert!(row.contains("| Password: ?   |"));
        assert!(row.ends_with("Login: YES"));
    }

    #[test]
    fn test_access_row_layout() {
        let access = RoleAccess::from_grants("webapp", false, true, true, false);
        assert_eq!(
            access_row(&access),
            "        |-- User: webapp          | Conn: YES | Read: YES | Write: NO"
        );
    }

    #[test]
    fn test_table_row_layout() {
        let row = table_row("orders", "16 kB");
        assert!(row.starts_with("    |-- orders "));
        assert!(row.ends_with("| Size: 16 kB"));
    }

    #[test]
    fn test_section_order() {
        assert_eq!(SECTIONS, [USER_ACCOUNTS, DATA_ACCESS, CONTENT_INVENTORY]);
        assert_eq!(TABLE_SAMPLE_LIMIT, 5);
    }
}
