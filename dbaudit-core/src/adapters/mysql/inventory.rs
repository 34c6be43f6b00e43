//! MySQL/MariaDB inventory battery.
//!
//! Sections run in a fixed order and each prints its own banner. A failing
//! section is reported inline and the next one still runs; only a failed
//! connection or a dead console stops the run.

use super::text_column;
use crate::adapters::mysql::connection::{self, AnonymousLogin};
use crate::adapters::report_section;
use crate::error::InventoryError;
use crate::report::{Report, yes_no};
use crate::security::{PasswordCache, PasswordReader};
use crate::ServerTarget;
use chrono::NaiveDateTime;
use sqlx::{MySqlPool, Row};
use std::io::Write;

/// Section title for the anonymous-login probe.
pub const ANONYMOUS_LOGIN: &str = "ANONYMOUS LOGIN TEST";
/// Section title for accounts and auth plugins.
pub const USER_ACCOUNTS: &str = "USER ACCOUNTS & AUTHENTICATION PLUGINS";
/// Section title for role grants.
pub const ROLE_MAPPINGS: &str = "ROLE MAPPINGS";
/// Section title for the per-account `SHOW GRANTS` dump.
pub const USER_PRIVILEGES: &str = "DETAILED USER PRIVILEGES (GRANTS)";
/// Section title for schemas and tables.
pub const TABLE_INVENTORY: &str = "DATABASE AND TABLE INVENTORY";
/// Section title for security-relevant server variables.
pub const SECURITY_VARIABLES: &str = "CRITICAL SECURITY VARIABLES";

/// Section titles in the order they are printed.
pub const SECTIONS: [&str; 6] = [
    ANONYMOUS_LOGIN,
    USER_ACCOUNTS,
    ROLE_MAPPINGS,
    USER_PRIVILEGES,
    TABLE_INVENTORY,
    SECURITY_VARIABLES,
];

/// Schemas that belong to the server itself.
pub const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "performance_schema", "sys", "mysql"];

/// Server variables worth checking during an audit.
pub const AUDITED_VARIABLES: [&str; 4] = ["local_infile", "skip_networking", "have_ssl", "version"];

/// MySQL error for a missing table (`ER_NO_SUCH_TABLE`).
const ER_NO_SUCH_TABLE: u16 = 1146;

/// One row of `mysql.user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    /// Account user name
    pub user: String,
    /// Host pattern the account may connect from
    pub host: String,
    /// Authentication plugin
    pub plugin: String,
    /// Whether an authentication string is set
    pub password_set: bool,
}

impl UserAccount {
    /// `user@host` label.
    pub fn account(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// One role granted to an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMapping {
    /// Grantee user name
    pub user: String,
    /// Grantee host pattern
    pub host: String,
    /// Granted role name
    pub role: String,
    /// Host part of the role; MySQL 8 roles are accounts, MariaDB roles are not
    pub role_host: Option<String>,
}

/// One table inside a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    /// Table name
    pub name: String,
    /// Storage engine, `N/A` for views
    pub engine: String,
    /// Row-count estimate from the data dictionary
    pub rows: u64,
    /// Creation time, when the engine records one
    pub created: Option<NaiveDateTime>,
}

/// Formats the account table header row.
pub fn user_account_header() -> String {
    format!("  {:<25} | {:<15} | {:<15}", "User@Host", "Plugin", "Password Set")
}

/// Formats one account row.
pub fn user_account_row(account: &UserAccount) -> String {
    format!(
        "  {:<25} | {:<15} | {:<15}",
        account.account(),
        account.plugin,
        yes_no(account.password_set)
    )
}

/// Formats one role mapping line.
pub fn role_mapping_row(mapping: &RoleMapping) -> String {
    let role = match &mapping.role_host {
        Some(host) => format!("'{}'@'{}'", mapping.role, host),
        None => mapping.role.clone(),
    };
    format!(
        "  - User '{}'@'{}' has role: {}",
        mapping.user, mapping.host, role
    )
}

/// Formats one table row.
pub fn table_row(table: &TableEntry) -> String {
    let created = table
        .created
        .map_or_else(|| "N/A".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
    format!(
        "    |-- {:<25} | {:<10} | Rows: {:<8} | Created: {}",
        table.name, table.engine, table.rows, created
    )
}

/// Converts a byte count to megabytes.
#[allow(clippy::cast_precision_loss)]
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}

/// Quotes a value as a MySQL string literal.
///
/// Used only where the server refuses placeholders (`SHOW GRANTS FOR`).
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len().saturating_add(2));
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Runs the full MySQL inventory battery against `target`.
///
/// # Errors
/// - [`InventoryError::Credential`] if the password prompt fails
/// - [`InventoryError::Connect`] if the server is not listening or rejects
///   the credentials
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
        "Connecting to MySQL at {}...",
        target.endpoint()
    ))?;
    out.header(ANONYMOUS_LOGIN)?;
    match connection::anonymous_login_probe(&target.anonymous()).await {
        Ok(AnonymousLogin::Allowed) => {
            tracing::debug!("Anonymous login accepted by {}", target.endpoint());
            out.line(format_args!(
                "Server at {} allows ANONYMOUS login.",
                target.host
            ))?;
        }
        Ok(AnonymousLogin::Disabled) => out.line("Anonymous login disabled")?,
        Err(e) if e.is_not_listening() => return Err(e.into()),
        Err(e) => {
            tracing::debug!("Anonymous probe inconclusive: {:?}", e);
            out.line(format_args!("Anonymous login check inconclusive: {e}"))?;
        }
    }

    let pool = connection::connect(&params, 1).await?;

    out.header(USER_ACCOUNTS)?;
    let outcome = user_accounts(&pool, out).await;
    report_section(out, USER_ACCOUNTS, outcome)?;

    out.header(ROLE_MAPPINGS)?;
    let outcome = role_mappings(&pool, out).await;
    report_section(out, ROLE_MAPPINGS, outcome)?;

    out.header(USER_PRIVILEGES)?;
    let outcome = user_privileges(&pool, out).await;
    report_section(out, USER_PRIVILEGES, outcome)?;

    out.header(TABLE_INVENTORY)?;
    let outcome = table_inventory(&pool, out).await;
    report_section(out, TABLE_INVENTORY, outcome)?;

    out.header(SECURITY_VARIABLES)?;
    let outcome = security_variables(&pool, out).await;
    report_section(out, SECURITY_VARIABLES, outcome)?;

    pool.close().await;
    Ok(())
}

async fn fetch_accounts(pool: &MySqlPool) -> Result<Vec<UserAccount>, InventoryError> {
    let rows = sqlx::query(
        "SELECT CAST(User AS CHAR), CAST(Host AS CHAR),
                COALESCE(CAST(plugin AS CHAR), ''),
                CAST(IF(authentication_string IS NULL OR authentication_string = '', 0, 1) AS SIGNED)
         FROM mysql.user
         ORDER BY User, Host",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| InventoryError::query("Query Failed", e))?;

    rows.iter()
        .map(|row| {
            Ok(UserAccount {
                user: text_column(row, 0)?,
                host: text_column(row, 1)?,
                plugin: text_column(row, 2)?,
                password_set: row.try_get::<i64, _>(3)? != 0,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(|e| InventoryError::query("Error Reading Rows", e))
}

async fn user_accounts<W: Write>(
    pool: &MySqlPool,
    out: &mut Report<W>,
) -> Result<(), InventoryError> {
    let accounts = fetch_accounts(pool).await?;

    out.line(user_account_header())?;
    for account in &accounts {
        out.line(user_account_row(account))?;
    }
    tracing::debug!("Listed {} MySQL accounts", accounts.len());
    Ok(())
}

/// Fetches role grants, or `None` when the server has no role table at all.
async fn fetch_role_mappings(
    pool: &MySqlPool,
) -> Result<Option<Vec<RoleMapping>>, InventoryError> {
    // MariaDB keeps roles in mysql.roles_mapping; MySQL 8 in mysql.role_edges.
    const QUERIES: [&str; 2] = [
        "SELECT CAST(User AS CHAR), CAST(Host AS CHAR), CAST(Role AS CHAR), CAST(NULL AS CHAR)
         FROM mysql.roles_mapping",
        "SELECT CAST(TO_USER AS CHAR), CAST(TO_HOST AS CHAR), CAST(FROM_USER AS CHAR),
                CAST(FROM_HOST AS CHAR)
         FROM mysql.role_edges",
    ];

    for query in QUERIES {
        match sqlx::query(query).fetch_all(pool).await {
            Ok(rows) => {
                let mappings = rows
                    .iter()
                    .map(|row| {
                        Ok(RoleMapping {
                            user: text_column(row, 0)?,
                            host: text_column(row, 1)?,
                            role: text_column(row, 2)?,
                            role_host: row.try_get::<Option<String>, _>(3)?,
                        })
                    })
                    .collect::<Result<Vec<_>, sqlx::Error>>()
                    .map_err(|e| InventoryError::query("Error Scanning Row", e))?;
                return Ok(Some(mappings));
            }
            Err(e) if is_missing_table(&e) => {
                tracing::debug!("Role table not present: {}", e);
            }
            Err(e) => return Err(InventoryError::query("Reading role mappings", e)),
        }
    }

    Ok(None)
}

fn is_missing_table(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>())
        .is_some_and(|mysql| mysql.number() == ER_NO_SUCH_TABLE)
}

async fn role_mappings<W: Write>(
    pool: &MySqlPool,
    out: &mut Report<W>,
) -> Result<(), InventoryError> {
    match fetch_role_mappings(pool).await? {
        None => out.line("No role mappings configured")?,
        Some(mappings) if mappings.is_empty() => out.line("No Specific Roles Mapped")?,
        Some(mappings) => {
            for mapping in &mappings {
                out.line(role_mapping_row(mapping))?;
            }
        }
    }
    Ok(())
}

async fn user_privileges<W: Write>(
    pool: &MySqlPool,
    out: &mut Report<W>,
) -> Result<(), InventoryError> {
    let rows = sqlx::query("SELECT CAST(User AS CHAR), CAST(Host AS CHAR) FROM mysql.user ORDER BY User, Host")
        .fetch_all(pool)
        .await
        .map_err(|e| InventoryError::query("Error reading users from db", e))?;

    for row in &rows {
        let (Ok(user), Ok(host)) = (text_column(row, 0), text_column(row, 1)) else {
            continue;
        };

        out.line(format_args!("  GRANT for '{user}'@'{host}':"))?;
        let statement = format!(
            "SHOW GRANTS FOR {}@{}",
            quote_literal(&user),
            quote_literal(&host)
        );
        match sqlx::query(&statement).fetch_all(pool).await {
            Ok(grants) => {
                for grant in &grants {
                    if let Ok(text) = text_column(grant, 0) {
                        out.line(format_args!("    |-- {text}"))?;
                    }
                }
            }
            Err(e) => {
                tracing::debug!("SHOW GRANTS failed for '{}'@'{}': {}", user, host, e);
                out.line("    |-- [!] Could not retrieve")?;
            }
        }
        out.blank()?;
    }
    Ok(())
}

async fn table_inventory<W: Write>(
    pool: &MySqlPool,
    out: &mut Report<W>,
) -> Result<(), InventoryError> {
    let schemas: Vec<String> = sqlx::query(
        "SELECT CAST(schema_name AS CHAR)
         FROM information_schema.schemata
         WHERE schema_name NOT IN (?, ?, ?, ?)
         ORDER BY schema_name",
    )
    .bind(SYSTEM_SCHEMAS[0])
    .bind(SYSTEM_SCHEMAS[1])
    .bind(SYSTEM_SCHEMAS[2])
    .bind(SYSTEM_SCHEMAS[3])
    .fetch_all(pool)
    .await
    .map_err(|e| InventoryError::query("Error fetching databases", e))?
    .iter()
    .filter_map(|row| text_column(row, 0).ok())
    .collect();

    for schema in &schemas {
        match schema_size(pool, schema).await {
            Ok(bytes) => out.line(format_args!(
                "  DATABASE: {schema} (Size: {:.2} MB)",
                bytes_to_mb(bytes)
            ))?,
            Err(e) => {
                tracing::debug!("Size lookup failed for {}: {}", schema, e);
                out.line(format_args!("  DATABASE: {schema} (Size: unknown)"))?;
            }
        }

        match schema_tables(pool, schema).await {
            Ok(tables) => {
                for table in &tables {
                    out.line(table_row(table))?;
                }
            }
            Err(e) => {
                tracing::debug!("Table listing failed for {}: {}", schema, e);
                out.line(format_args!("    |-- [!] Could not retrieve tables for {schema}"))?;
            }
        }
        out.blank()?;
    }
    Ok(())
}

async fn schema_size(pool: &MySqlPool, schema: &str) -> Result<u64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT CAST(COALESCE(SUM(data_length + index_length), 0) AS UNSIGNED)
         FROM information_schema.tables
         WHERE table_schema = ?",
    )
    .bind(schema)
    .fetch_one(pool)
    .await
}

async fn schema_tables(pool: &MySqlPool, schema: &str) -> Result<Vec<TableEntry>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT CAST(table_name AS CHAR),
                CAST(COALESCE(engine, 'N/A') AS CHAR),
                CAST(COALESCE(table_rows, 0) AS UNSIGNED),
                CAST(create_time AS DATETIME)
         FROM information_schema.tables
         WHERE table_schema = ?
         ORDER BY table_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(TableEntry {
                name: text_column(row, 0)?,
                engine: text_column(row, 1)?,
                rows: row.try_get(2)?,
                created: row.try_get(3)?,
            })
        })
        .collect()
}

async fn security_variables<W: Write>(
    pool: &MySqlPool,
    out: &mut Report<W>,
) -> Result<(), InventoryError> {
    let statement = format!(
        "SHOW VARIABLES WHERE Variable_name IN ({})",
        AUDITED_VARIABLES
            .iter()
            .map(|name| quote_literal(name))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let rows = sqlx::query(&statement)
        .fetch_all(pool)
        .await
        .map_err(|e| InventoryError::query("Error retrieving security variables", e))?;

    out.line(format_args!("  {:<25} | {:<10}", "Variable Name", "Value"))?;
    for row in &rows {
        if let (Ok(name), Ok(value)) = (text_column(row, 0), text_column(row, 1)) {
            out.line(format_args!("  {name:<25} | {value:<10}"))?;
        }
    }
    Ok(())
}
