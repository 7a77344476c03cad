use bon::bon;
use chrono::{DateTime, Utc};
use sqlx::{
    migrate::MigrateDatabase,
    postgres::{PgPool, PgPoolOptions},
};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    error::{DbError, DbResult},
    types::{CustomerMapping, EntitlementAccount, NewSubscription, SubscriptionRecord},
};

#[derive(Debug)]
pub struct DatabaseManager {
    pub pool: PgPool,
}

#[bon]
impl DatabaseManager {
    pub async fn new(database_url: &str) -> DbResult<Self> {
        if !sqlx::Postgres::database_exists(database_url).await? {
            sqlx::Postgres::create_database(database_url).await?;
        }

        let pool = PgPoolOptions::new()
            .max_connections(50)
            .min_connections(3)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        let db_manager = DatabaseManager { pool };

        Self::run_migrations(&db_manager.pool).await?;

        Ok(db_manager)
    }

    async fn run_migrations(pool: &PgPool) -> DbResult<()> {
        let migrator = sqlx::migrate!("./src/migrations");
        migrator.run(pool).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Entitlement accounts
    // -----------------------------------------------------------------------

    /// Returns the user's ledger row, or a zero-balance account when no
    /// grant has created one yet.
    pub async fn get_account(&self, user_id: Uuid) -> DbResult<EntitlementAccount> {
        let account = sqlx::query_as::<_, EntitlementAccount>(
            r#"
            SELECT user_id, credits, unlimited, updated_at
            FROM entitlement_accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account.unwrap_or_else(|| EntitlementAccount::empty(user_id)))
    }

    /// Atomic credit increment. Creates the account lazily; the increment is
    /// a single database-side add, so concurrent grants for the same user
    /// both apply.
    pub async fn add_credits(&self, user_id: Uuid, delta: i32) -> DbResult<EntitlementAccount> {
        if delta <= 0 {
            return Err(DbError::invalid_input("credit delta must be positive"));
        }

        let account = add_credits_on(&self.pool, user_id, delta).await?;
        Ok(account)
    }

    pub async fn grant_unlimited(&self, user_id: Uuid) -> DbResult<EntitlementAccount> {
        let account = grant_unlimited_on(&self.pool, user_id).await?;
        Ok(account)
    }

    /// Atomic single-credit debit. Returns `None` when the user has neither
    /// an unlimited plan nor a positive balance; the balance never goes
    /// negative because the predicate and the decrement run in one statement.
    pub async fn consume_credit(&self, user_id: Uuid) -> DbResult<Option<EntitlementAccount>> {
        let account = sqlx::query_as::<_, EntitlementAccount>(
            r#"
            UPDATE entitlement_accounts
            SET credits = CASE WHEN unlimited THEN credits ELSE credits - 1 END,
                updated_at = NOW()
            WHERE user_id = $1 AND (unlimited OR credits > 0)
            RETURNING user_id, credits, unlimited, updated_at
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    // -----------------------------------------------------------------------
    // Customer mappings
    // -----------------------------------------------------------------------

    pub async fn get_customer_mapping(
        &self,
        provider: &str,
        user_id: Uuid,
    ) -> DbResult<Option<CustomerMapping>> {
        let mapping = sqlx::query_as::<_, CustomerMapping>(
            r#"
            SELECT user_id, provider, provider_customer_id, created_at
            FROM customer_mappings
            WHERE provider = $1 AND user_id = $2
            "#,
        )
        .bind(provider)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    pub async fn save_customer_mapping(
        &self,
        provider: &str,
        user_id: Uuid,
        provider_customer_id: &str,
    ) -> DbResult<CustomerMapping> {
        let mapping = sqlx::query_as::<_, CustomerMapping>(
            r#"
            INSERT INTO customer_mappings (user_id, provider, provider_customer_id, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (provider, user_id)
            DO UPDATE SET provider_customer_id = EXCLUDED.provider_customer_id
            RETURNING user_id, provider, provider_customer_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(mapping)
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    #[builder]
    pub async fn upsert_subscription(
        &self,
        user_id: Uuid,
        provider: String,
        provider_subscription_id: String,
        provider_customer_id: String,
        status: String,
        price_id: Option<String>,
        current_period_end: Option<DateTime<Utc>>,
    ) -> DbResult<SubscriptionRecord> {
        let subscription = NewSubscription {
            user_id,
            provider,
            provider_subscription_id,
            provider_customer_id,
            status,
            price_id,
            current_period_end,
        };
        upsert_subscription_on(&self.pool, &subscription).await
    }

    pub async fn find_subscription(
        &self,
        provider: &str,
        provider_subscription_id: &str,
    ) -> DbResult<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT id, user_id, provider, provider_subscription_id, provider_customer_id,
                   status, price_id, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE provider = $1 AND provider_subscription_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn latest_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> DbResult<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT id, user_id, provider, provider_subscription_id, provider_customer_id,
                   status, price_id, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Webhook dedup + entitlement mutations
    // -----------------------------------------------------------------------

    pub async fn was_event_processed(
        &self,
        provider: &str,
        resource_id: &str,
        resulting_state: &str,
    ) -> DbResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM processed_webhook_events
            WHERE provider = $1 AND resource_id = $2 AND resulting_state = $3
            "#,
        )
        .bind(provider)
        .bind(resource_id)
        .bind(resulting_state)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Credit grant guarded by the dedup marker. Marker insert and credit
    /// increment commit in one transaction; returns `false` when the event
    /// was already processed (nothing applied).
    pub async fn apply_credit_grant(
        &self,
        provider: &str,
        payment_id: &str,
        user_id: Uuid,
        credits: i32,
    ) -> DbResult<bool> {
        if credits <= 0 {
            return Err(DbError::invalid_input("credit delta must be positive"));
        }

        let mut tx = self.pool.begin().await?;

        if !mark_processed_on(&mut *tx, provider, payment_id, "paid").await? {
            tracing::debug!(provider, payment_id, "Credit grant already applied, skipping");
            tx.rollback().await?;
            return Ok(false);
        }

        add_credits_on(&mut *tx, user_id, credits).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// First-payment subscription activation: dedup marker, subscription
    /// upsert and unlimited grant in one transaction.
    pub async fn apply_subscription_activation(
        &self,
        payment_id: &str,
        subscription: &NewSubscription,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        if !mark_processed_on(&mut *tx, &subscription.provider, payment_id, "paid").await? {
            tx.rollback().await?;
            return Ok(false);
        }

        upsert_subscription_on(&mut *tx, subscription).await?;
        grant_unlimited_on(&mut *tx, subscription.user_id).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Subscription status sync driven by a subscription-id webhook. Upserts
    /// the record and, when `grant_unlimited` is set (provider reports the
    /// subscription active, e.g. a monthly renewal), re-grants the unlimited
    /// entitlement. Deduped on `(provider, subscription_id, resulting_state)`.
    pub async fn apply_subscription_sync(
        &self,
        resulting_state: &str,
        subscription: &NewSubscription,
        grant_unlimited: bool,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        if !mark_processed_on(
            &mut *tx,
            &subscription.provider,
            &subscription.provider_subscription_id,
            resulting_state,
        )
        .await?
        {
            tx.rollback().await?;
            return Ok(false);
        }

        upsert_subscription_on(&mut *tx, subscription).await?;
        if grant_unlimited {
            grant_unlimited_on(&mut *tx, subscription.user_id).await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Executor-generic statements, shared between pool-level calls and the
// transactional webhook mutations.
// ---------------------------------------------------------------------------

async fn add_credits_on<'e, E>(executor: E, user_id: Uuid, delta: i32) -> DbResult<EntitlementAccount>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let account = sqlx::query_as::<_, EntitlementAccount>(
        r#"
        INSERT INTO entitlement_accounts (user_id, credits, unlimited, updated_at)
        VALUES ($1, $2, FALSE, NOW())
        ON CONFLICT (user_id)
        DO UPDATE SET credits = entitlement_accounts.credits + EXCLUDED.credits,
                      updated_at = NOW()
        RETURNING user_id, credits, unlimited, updated_at
        "#,
    )
    .bind(user_id)
    .bind(delta)
    .fetch_one(executor)
    .await?;

    Ok(account)
}

async fn grant_unlimited_on<'e, E>(executor: E, user_id: Uuid) -> DbResult<EntitlementAccount>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let account = sqlx::query_as::<_, EntitlementAccount>(
        r#"
        INSERT INTO entitlement_accounts (user_id, credits, unlimited, updated_at)
        VALUES ($1, 0, TRUE, NOW())
        ON CONFLICT (user_id)
        DO UPDATE SET unlimited = TRUE, updated_at = NOW()
        RETURNING user_id, credits, unlimited, updated_at
        "#,
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(account)
}

async fn upsert_subscription_on<'e, E>(
    executor: E,
    subscription: &NewSubscription,
) -> DbResult<SubscriptionRecord>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let record = sqlx::query_as::<_, SubscriptionRecord>(
        r#"
        INSERT INTO subscriptions
            (id, user_id, provider, provider_subscription_id, provider_customer_id,
             status, price_id, current_period_end, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
        ON CONFLICT (provider, provider_subscription_id)
        DO UPDATE SET status = EXCLUDED.status,
                      price_id = COALESCE(EXCLUDED.price_id, subscriptions.price_id),
                      current_period_end = EXCLUDED.current_period_end,
                      updated_at = NOW()
        RETURNING id, user_id, provider, provider_subscription_id, provider_customer_id,
                  status, price_id, current_period_end, created_at, updated_at
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(subscription.user_id)
    .bind(&subscription.provider)
    .bind(&subscription.provider_subscription_id)
    .bind(&subscription.provider_customer_id)
    .bind(&subscription.status)
    .bind(&subscription.price_id)
    .bind(subscription.current_period_end)
    .fetch_one(executor)
    .await?;

    Ok(record)
}

/// Inserts the dedup marker. Returns `false` when another delivery of the
/// same event already claimed it.
async fn mark_processed_on<'e, E>(
    executor: E,
    provider: &str,
    resource_id: &str,
    resulting_state: &str,
) -> DbResult<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO processed_webhook_events (provider, resource_id, resulting_state, processed_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (provider, resource_id, resulting_state) DO NOTHING
        "#,
    )
    .bind(provider)
    .bind(resource_id)
    .bind(resulting_state)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
