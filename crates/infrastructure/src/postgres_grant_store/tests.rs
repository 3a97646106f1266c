use std::str::FromStr;

use portwarden_application::GrantStore;
use portwarden_core::AppError;
use portwarden_domain::{FirewallGroup, GrantOrigin, GrantPort, IngressRule};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::{IngressRuleRow, PostgresGrantStore, permissions_from_rows};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres grant store tests: {error}");
    }

    Some(pool)
}

fn unique_rule(port: u16) -> IngressRule {
    let group_id = format!("sg-{}", uuid::Uuid::new_v4().simple());

    IngressRule::new(
        FirewallGroup::new(group_id, "us-east-1").unwrap_or_else(|_| unreachable!()),
        GrantOrigin::from_str("203.0.113.7").unwrap_or_else(|_| unreachable!()),
        GrantPort::new(port).unwrap_or_else(|_| unreachable!()),
    )
}

#[test]
fn rows_with_the_same_port_range_fold_into_one_permission() {
    let permissions = permissions_from_rows(vec![
        IngressRuleRow {
            protocol: "tcp".to_owned(),
            from_port: Some(22),
            to_port: Some(22),
            cidr: "1.2.3.4/32".to_owned(),
        },
        IngressRuleRow {
            protocol: "tcp".to_owned(),
            from_port: Some(22),
            to_port: Some(22),
            cidr: "5.6.7.8/32".to_owned(),
        },
        IngressRuleRow {
            protocol: "-1".to_owned(),
            from_port: None,
            to_port: None,
            cidr: "10.0.0.0/8".to_owned(),
        },
    ])
    .unwrap_or_default();

    assert_eq!(permissions.len(), 2);
    assert!(permissions.iter().any(|permission| permission.ranges.len() == 2));
}

#[test]
fn malformed_stored_cidr_is_internal_error() {
    let result = permissions_from_rows(vec![IngressRuleRow {
        protocol: "tcp".to_owned(),
        from_port: Some(22),
        to_port: Some(22),
        cidr: "not-a-cidr".to_owned(),
    }]);

    assert!(matches!(result, Err(AppError::Internal(_))));
}

#[tokio::test]
async fn add_exists_remove_against_postgres() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = PostgresGrantStore::new(pool);
    let rule = unique_rule(22);

    assert!(matches!(store.exists(&rule).await, Ok(false)));
    assert!(store.add(&rule).await.is_ok());
    assert!(matches!(store.exists(&rule).await, Ok(true)));
    assert!(matches!(store.add(&rule).await, Err(AppError::Conflict(_))));
    assert!(store.remove(&rule).await.is_ok());
    assert!(matches!(store.remove(&rule).await, Err(AppError::NotFound(_))));
    assert!(matches!(store.exists(&rule).await, Ok(false)));
}
