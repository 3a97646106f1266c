use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use ipnet::IpNet;
use sqlx::{FromRow, PgPool};

use portwarden_application::GrantStore;
use portwarden_core::{AppError, AppResult};
use portwarden_domain::{FirewallGroup, IngressPermission, IngressProtocol, IngressRule};

/// PostgreSQL-backed firewall rule set.
#[derive(Clone)]
pub struct PostgresGrantStore {
    pool: PgPool,
}

impl PostgresGrantStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct IngressRuleRow {
    protocol: String,
    from_port: Option<i32>,
    to_port: Option<i32>,
    cidr: String,
}

fn port_from_row(value: Option<i32>) -> AppResult<Option<u16>> {
    value
        .map(|port| {
            u16::try_from(port).map_err(|error| {
                AppError::Internal(format!("stored ingress port '{port}' is invalid: {error}"))
            })
        })
        .transpose()
}

/// Folds per-range rows back into permissions grouped by protocol and port range.
fn permissions_from_rows(rows: Vec<IngressRuleRow>) -> AppResult<Vec<IngressPermission>> {
    let mut grouped: BTreeMap<(String, Option<i32>, Option<i32>), Vec<IpNet>> = BTreeMap::new();

    for row in rows {
        let range = IpNet::from_str(row.cidr.as_str()).map_err(|error| {
            AppError::Internal(format!("stored ingress cidr '{}' is invalid: {error}", row.cidr))
        })?;
        grouped
            .entry((row.protocol, row.from_port, row.to_port))
            .or_default()
            .push(range);
    }

    grouped
        .into_iter()
        .map(|((protocol, from_port, to_port), ranges)| {
            Ok(IngressPermission {
                protocol: IngressProtocol::from_str(protocol.as_str())?,
                from_port: port_from_row(from_port)?,
                to_port: port_from_row(to_port)?,
                ranges,
            })
        })
        .collect()
}

#[async_trait]
impl GrantStore for PostgresGrantStore {
    async fn list_permissions(&self, group: &FirewallGroup) -> AppResult<Vec<IngressPermission>> {
        let rows = sqlx::query_as::<_, IngressRuleRow>(
            r#"
            SELECT protocol, from_port, to_port, cidr
            FROM firewall_ingress_rules
            WHERE region = $1 AND group_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(group.region())
        .bind(group.group_id())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list ingress rules for group '{}': {error}",
                group.group_id()
            ))
        })?;

        permissions_from_rows(rows)
    }

    async fn add(&self, rule: &IngressRule) -> AppResult<()> {
        let port = i32::from(rule.port().value());

        sqlx::query(
            r#"
            INSERT INTO firewall_ingress_rules (region, group_id, protocol, from_port, to_port, cidr)
            VALUES ($1, $2, $3, $4, $4, $5)
            "#,
        )
        .bind(rule.group().region())
        .bind(rule.group().group_id())
        .bind(rule.protocol().as_str())
        .bind(port)
        .bind(rule.origin().host_network().to_string())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if let sqlx::Error::Database(database_error) = &error
                && database_error.code().as_deref() == Some("23505")
            {
                return AppError::Conflict(format!(
                    "ingress rule '{}' already exists",
                    rule.tuple_key()
                ));
            }

            AppError::Internal(format!(
                "failed to add ingress rule '{}': {error}",
                rule.tuple_key()
            ))
        })?;

        Ok(())
    }

    async fn remove(&self, rule: &IngressRule) -> AppResult<()> {
        let port = i32::from(rule.port().value());

        let result = sqlx::query(
            r#"
            DELETE FROM firewall_ingress_rules
            WHERE region = $1
              AND group_id = $2
              AND protocol = $3
              AND from_port = $4
              AND to_port = $4
              AND cidr = $5
            "#,
        )
        .bind(rule.group().region())
        .bind(rule.group().group_id())
        .bind(rule.protocol().as_str())
        .bind(port)
        .bind(rule.origin().host_network().to_string())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to remove ingress rule '{}': {error}",
                rule.tuple_key()
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "ingress rule '{}' does not exist",
                rule.tuple_key()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
