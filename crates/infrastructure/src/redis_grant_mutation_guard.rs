//! Redis-backed compare-and-set guarding concurrent grants of one tuple.
//!
//! A tuple is held by a single `SET key token NX EX ttl`, which always
//! carries an expiry. Release deletes the key only while it still carries
//! the holder's token.

use async_trait::async_trait;
use portwarden_application::{GrantMutationGuard, GrantMutationLease};
use portwarden_core::{AppError, AppResult};
use portwarden_domain::IngressRule;
use redis::Script;
use redis::aio::MultiplexedConnection;
use tracing::debug;

const RELEASE_IF_OWNED_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Holds grant tuples in Redis while one request runs the grant sequence.
#[derive(Clone)]
pub struct RedisGrantMutationGuard {
    client: redis::Client,
    key_prefix: String,
}

impl RedisGrantMutationGuard {
    /// Creates a guard whose keys live under `key_prefix`.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, rule: &IngressRule) -> String {
        format!("{}:{}", self.key_prefix, rule.tuple_key())
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

/// `SET key token NX EX ttl`: claim and expiry in one round trip.
fn hold_tuple_command(key: &str, token: &str, ttl_seconds: u32) -> redis::Cmd {
    let mut command = redis::cmd("SET");
    command
        .arg(key)
        .arg(token)
        .arg("NX")
        .arg("EX")
        .arg(ttl_seconds);
    command
}

#[async_trait]
impl GrantMutationGuard for RedisGrantMutationGuard {
    async fn try_acquire(
        &self,
        rule: &IngressRule,
        lease_seconds: u32,
    ) -> AppResult<Option<GrantMutationLease>> {
        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "grant tuple hold must last at least one second".to_owned(),
            ));
        }

        let key = self.key_for(rule);
        let token = uuid::Uuid::new_v4().to_string();
        let mut connection = self.connection().await?;

        // Nil reply means another request holds the tuple.
        let reply: Option<String> = hold_tuple_command(key.as_str(), token.as_str(), lease_seconds)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to hold grant tuple '{key}': {error}"))
            })?;

        Ok(reply.map(|_| GrantMutationLease { key, token }))
    }

    async fn release(&self, lease: &GrantMutationLease) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let deleted: i64 = Script::new(RELEASE_IF_OWNED_SCRIPT)
            .key(lease.key.as_str())
            .arg(lease.token.as_str())
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to release grant tuple '{}': {error}",
                    lease.key
                ))
            })?;

        if deleted == 0 {
            debug!(key = %lease.key, "grant tuple hold had already expired");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use portwarden_application::GrantMutationGuard;
    use portwarden_domain::{FirewallGroup, GrantOrigin, GrantPort, IngressRule};

    use super::{RedisGrantMutationGuard, hold_tuple_command};

    fn guard() -> Option<RedisGrantMutationGuard> {
        let redis_url = std::env::var("REDIS_URL").ok()?;
        let client = redis::Client::open(redis_url).ok()?;
        Some(RedisGrantMutationGuard::new(
            client,
            format!("portwarden-test-{}", uuid::Uuid::new_v4().simple()),
        ))
    }

    fn rule() -> IngressRule {
        IngressRule::new(
            FirewallGroup::new("sg-0123", "us-east-1").unwrap_or_else(|_| unreachable!()),
            GrantOrigin::from_str("1.2.3.4").unwrap_or_else(|_| unreachable!()),
            GrantPort::new(22).unwrap_or_else(|_| unreachable!()),
        )
    }

    #[test]
    fn key_is_scoped_by_prefix_and_tuple() {
        let guard = RedisGrantMutationGuard::new(
            redis::Client::open("redis://127.0.0.1/").unwrap_or_else(|_| unreachable!()),
            "portwarden:grant",
        );

        assert_eq!(
            guard.key_for(&rule()),
            "portwarden:grant:us-east-1:sg-0123:1.2.3.4/32:22"
        );
    }

    #[test]
    fn hold_sets_value_and_expiry_in_one_command() {
        let packed = hold_tuple_command("portwarden:grant:tuple", "token-1", 30).get_packed_command();
        let packed = String::from_utf8_lossy(packed.as_slice()).into_owned();

        assert_eq!(
            packed,
            "*6\r\n$3\r\nSET\r\n$22\r\nportwarden:grant:tuple\r\n$7\r\ntoken-1\r\n$2\r\nNX\r\n$2\r\nEX\r\n$2\r\n30\r\n"
        );
    }

    #[tokio::test]
    async fn second_acquire_is_refused_until_release() {
        let Some(guard) = guard() else {
            return;
        };

        let first = guard.try_acquire(&rule(), 30).await.unwrap_or_default();
        assert!(first.is_some());
        assert!(matches!(guard.try_acquire(&rule(), 30).await, Ok(None)));

        if let Some(lease) = first {
            assert!(guard.release(&lease).await.is_ok());
        }
        assert!(matches!(guard.try_acquire(&rule(), 30).await, Ok(Some(_))));
    }

    #[tokio::test]
    async fn held_tuple_always_carries_an_expiry() {
        let Some(guard) = guard() else {
            return;
        };

        let lease = guard.try_acquire(&rule(), 30).await.unwrap_or_default();
        let Some(lease) = lease else {
            unreachable!();
        };
        let Ok(mut connection) = guard.connection().await else {
            unreachable!();
        };
        let ttl: i64 = redis::cmd("TTL")
            .arg(lease.key.as_str())
            .query_async(&mut connection)
            .await
            .unwrap_or(-1);

        assert!((1..=30).contains(&ttl));
        assert!(guard.release(&lease).await.is_ok());
    }
}
