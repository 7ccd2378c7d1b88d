//! pari-db
//!
//! Postgres binding of [`pari_ledger::LedgerStore`].
//!
//! Every mutating method runs inside one `sqlx` transaction. Rows that feed
//! a decision are re-read under `FOR UPDATE` (user row first, then market
//! row) and the decision itself is delegated to `pari-ledger`, so a
//! concurrent wager, resolve or claim can never act on a stale read. A
//! transaction dropped before `commit()` rolls back, which is how every
//! rejected precondition leaves the store untouched.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pari_ledger::{
    claims::{claim_description, plan_claim},
    pool::{check_wager, wager_description},
    settlement::check_resolvable,
    ClaimReceipt, DepositCredit, DepositOutcome, LedgerError, LedgerStore, WagerReceipt,
    WagerRequest,
};
use pari_schemas::{
    ClaimRow, LedgerEntryRow, LedgerKind, LedgerStatus, MarketRow, Side, UserRow, WagerRow,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

pub const ENV_DB_URL: &str = "PARI_DATABASE_URL";

const USER_COLS: &str = "user_id, email, name, balance, created_at_utc";
const MARKET_COLS: &str = "market_id, question, created_by, total_yes, total_no, resolved, \
                           outcome_yes, resolved_at_utc, created_at_utc";

/// Connect to Postgres using PARI_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_ledger_tables: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'ledger_entries'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_ledger_tables: exists,
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Detect a Postgres unique constraint violation by name.
fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23503"),
        _ => false,
    }
}

/// Serialization failures, deadlocks and unique violations are lost races:
/// the transaction rolled back and the caller may retry. Everything else is
/// a storage failure.
fn store_err(op: &'static str) -> impl FnOnce(sqlx::Error) -> LedgerError {
    move |err| {
        let race = match &err {
            sqlx::Error::Database(db_err) => matches!(
                db_err.code().as_deref(),
                Some("40001") | Some("40P01") | Some("23505")
            ),
            _ => false,
        };
        if race {
            LedgerError::Conflict(format!("{op}: {err}"))
        } else {
            LedgerError::Storage(format!("{op}: {err}"))
        }
    }
}

fn decode_err(op: &'static str) -> impl FnOnce(sqlx::Error) -> LedgerError {
    move |err| LedgerError::Storage(format!("{op} decode: {err}"))
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn user_from_row(row: &PgRow) -> Result<UserRow, sqlx::Error> {
    Ok(UserRow {
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        balance: row.try_get("balance")?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

fn market_from_row(row: &PgRow) -> Result<MarketRow, sqlx::Error> {
    let outcome_yes: Option<bool> = row.try_get("outcome_yes")?;
    Ok(MarketRow {
        market_id: row.try_get("market_id")?,
        question: row.try_get("question")?,
        created_by: row.try_get("created_by")?,
        total_yes: row.try_get("total_yes")?,
        total_no: row.try_get("total_no")?,
        resolved: row.try_get("resolved")?,
        outcome: outcome_yes.map(Side::from_outcome_yes),
        resolved_at_utc: row.try_get("resolved_at_utc")?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

fn parse_column<T>(parsed: anyhow::Result<T>, column: &str) -> Result<T, sqlx::Error> {
    parsed.map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

fn wager_from_row(row: &PgRow) -> Result<WagerRow, sqlx::Error> {
    let side: String = row.try_get("side")?;
    Ok(WagerRow {
        wager_id: row.try_get("wager_id")?,
        market_id: row.try_get("market_id")?,
        user_id: row.try_get("user_id")?,
        side: parse_column(Side::parse(&side), "side")?,
        amount: row.try_get("amount")?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

fn claim_from_row(row: &PgRow) -> Result<ClaimRow, sqlx::Error> {
    Ok(ClaimRow {
        claim_id: row.try_get("claim_id")?,
        market_id: row.try_get("market_id")?,
        user_id: row.try_get("user_id")?,
        amount_claimed: row.try_get("amount_claimed")?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntryRow, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(LedgerEntryRow {
        entry_id: row.try_get("entry_id")?,
        user_id: row.try_get("user_id")?,
        kind: parse_column(LedgerKind::parse(&kind), "kind")?,
        amount: row.try_get("amount")?,
        status: parse_column(LedgerStatus::parse(&status), "status")?,
        reference_id: row.try_get("reference_id")?,
        external_ref: row.try_get("external_ref")?,
        description: row.try_get("description")?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

// ---------------------------------------------------------------------------
// Ledger entry insert (shared by wager / claim)
// ---------------------------------------------------------------------------

struct NewEntry<'a> {
    user_id: Uuid,
    kind: LedgerKind,
    amount: i64,
    reference_id: Option<String>,
    external_ref: Option<&'a str>,
    description: &'a str,
}

async fn insert_entry(
    conn: &mut sqlx::PgConnection,
    entry: &NewEntry<'_>,
    now: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    let entry_id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into ledger_entries (
          entry_id, user_id, kind, amount, status, reference_id, external_ref,
          description, created_at_utc
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        "#,
    )
    .bind(entry_id)
    .bind(entry.user_id)
    .bind(entry.kind.as_str())
    .bind(entry.amount)
    .bind(LedgerStatus::Completed.as_str())
    .bind(&entry.reference_id)
    .bind(entry.external_ref)
    .bind(entry.description)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(entry_id)
}

// ---------------------------------------------------------------------------
// PgLedgerStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl LedgerStore for PgLedgerStore {
    async fn fetch_user(&self, user_id: Uuid) -> Result<Option<UserRow>, LedgerError> {
        let row = sqlx::query(&format!("select {USER_COLS} from users where user_id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err("fetch_user"))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(decode_err("fetch_user"))
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<UserRow>, LedgerError> {
        let row = sqlx::query(&format!("select {USER_COLS} from users where email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err("fetch_user_by_email"))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(decode_err("fetch_user_by_email"))
    }

    async fn ensure_user(
        &self,
        email: &str,
        name: &str,
        starter_balance: i64,
    ) -> Result<UserRow, LedgerError> {
        sqlx::query(
            r#"
            insert into users (user_id, email, name, balance)
            values ($1, $2, $3, $4)
            on conflict (email) do nothing
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(name)
        .bind(starter_balance)
        .execute(&self.pool)
        .await
        .map_err(store_err("ensure_user insert"))?;

        self.fetch_user_by_email(email)
            .await?
            .ok_or(LedgerError::UserNotFound { user_id: None })
    }

    async fn create_market(
        &self,
        question: &str,
        created_by: Uuid,
    ) -> Result<MarketRow, LedgerError> {
        let row = sqlx::query(&format!(
            "insert into markets (market_id, question, created_by) values ($1, $2, $3) \
             returning {MARKET_COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(question)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                LedgerError::UserNotFound {
                    user_id: Some(created_by),
                }
            } else {
                store_err("create_market")(e)
            }
        })?;
        market_from_row(&row).map_err(decode_err("create_market"))
    }

    async fn fetch_market(&self, market_id: Uuid) -> Result<Option<MarketRow>, LedgerError> {
        let row = sqlx::query(&format!(
            "select {MARKET_COLS} from markets where market_id = $1"
        ))
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("fetch_market"))?;
        row.as_ref()
            .map(market_from_row)
            .transpose()
            .map_err(decode_err("fetch_market"))
    }

    async fn list_markets(&self) -> Result<Vec<MarketRow>, LedgerError> {
        let rows = sqlx::query(&format!(
            "select {MARKET_COLS} from markets order by created_at_utc desc, market_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("list_markets"))?;
        rows.iter()
            .map(market_from_row)
            .collect::<Result<_, _>>()
            .map_err(decode_err("list_markets"))
    }

    async fn fetch_markets(&self, market_ids: &[Uuid]) -> Result<Vec<MarketRow>, LedgerError> {
        if market_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "select {MARKET_COLS} from markets where market_id = any($1)"
        ))
        .bind(market_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("fetch_markets"))?;
        rows.iter()
            .map(market_from_row)
            .collect::<Result<_, _>>()
            .map_err(decode_err("fetch_markets"))
    }

    async fn place_wager(&self, req: &WagerRequest) -> Result<WagerReceipt, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(store_err("place_wager begin"))?;

        let user = sqlx::query(&format!(
            "select {USER_COLS} from users where user_id = $1 for update"
        ))
        .bind(req.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err("place_wager lock user"))?
        .as_ref()
        .map(user_from_row)
        .transpose()
        .map_err(decode_err("place_wager user"))?;

        let market = sqlx::query(&format!(
            "select {MARKET_COLS} from markets where market_id = $1 for update"
        ))
        .bind(req.market_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err("place_wager lock market"))?
        .as_ref()
        .map(market_from_row)
        .transpose()
        .map_err(decode_err("place_wager market"))?;

        check_wager(user.as_ref(), market.as_ref(), req)?;
        let question = market.map(|m| m.question).unwrap_or_default();

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            update users
            set balance = balance - $2
            where user_id = $1 and balance >= $2
            returning balance
            "#,
        )
        .bind(req.user_id)
        .bind(req.amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err("place_wager debit"))?;
        let balance = balance.ok_or_else(|| {
            LedgerError::Conflict("balance changed under lock during wager".to_string())
        })?;

        let pool_sql = match req.side {
            Side::Yes => {
                "update markets set total_yes = total_yes + $2 where market_id = $1 and resolved = false"
            }
            Side::No => {
                "update markets set total_no = total_no + $2 where market_id = $1 and resolved = false"
            }
        };
        let updated = sqlx::query(pool_sql)
            .bind(req.market_id)
            .bind(req.amount)
            .execute(&mut *tx)
            .await
            .map_err(store_err("place_wager pool increment"))?
            .rows_affected();
        if updated != 1 {
            return Err(LedgerError::MarketResolved {
                market_id: req.market_id,
            });
        }

        let now = Utc::now();
        let wager_id = Uuid::new_v4();
        sqlx::query(
            r#"
            insert into wagers (wager_id, market_id, user_id, side, amount, created_at_utc)
            values ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(wager_id)
        .bind(req.market_id)
        .bind(req.user_id)
        .bind(req.side.as_str())
        .bind(req.amount)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(store_err("place_wager insert wager"))?;

        let description = wager_description(&question);
        insert_entry(
            &mut *tx,
            &NewEntry {
                user_id: req.user_id,
                kind: LedgerKind::Wager,
                amount: -req.amount,
                reference_id: Some(wager_id.to_string()),
                external_ref: None,
                description: &description,
            },
            now,
        )
        .await
        .map_err(store_err("place_wager insert entry"))?;

        tx.commit().await.map_err(store_err("place_wager commit"))?;

        Ok(WagerReceipt {
            wager_id,
            side: req.side,
            amount: req.amount,
            balance,
        })
    }

    async fn resolve_market(
        &self,
        market_id: Uuid,
        outcome: Side,
    ) -> Result<MarketRow, LedgerError> {
        // Single conditional statement: of two concurrent resolves exactly one
        // matches `resolved = false`.
        let row = sqlx::query(&format!(
            r#"
            update markets
            set resolved = true,
                outcome_yes = $2,
                resolved_at_utc = now()
            where market_id = $1 and resolved = false
            returning {MARKET_COLS}
            "#
        ))
        .bind(market_id)
        .bind(outcome.is_yes())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("resolve_market update"))?;

        if let Some(row) = row {
            return market_from_row(&row).map_err(decode_err("resolve_market"));
        }

        let current = self.fetch_market(market_id).await?;
        check_resolvable(current.as_ref(), market_id)?;
        // Row existed and was open yet did not match: lost a race that has
        // since been rolled back. Report it as retryable.
        Err(LedgerError::Conflict(format!(
            "resolve of market {market_id} did not apply"
        )))
    }

    async fn claim_payout(
        &self,
        user_id: Uuid,
        market_id: Uuid,
    ) -> Result<ClaimReceipt, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(store_err("claim begin"))?;

        let user_exists: Option<Uuid> =
            sqlx::query_scalar("select user_id from users where user_id = $1 for update")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err("claim lock user"))?;
        if user_exists.is_none() {
            return Err(LedgerError::UserNotFound {
                user_id: Some(user_id),
            });
        }

        let market = sqlx::query(&format!(
            "select {MARKET_COLS} from markets where market_id = $1"
        ))
        .bind(market_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err("claim fetch market"))?
        .as_ref()
        .map(market_from_row)
        .transpose()
        .map_err(decode_err("claim market"))?;

        let already_claimed: bool = sqlx::query_scalar(
            "select exists (select 1 from claims where market_id = $1 and user_id = $2)",
        )
        .bind(market_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err("claim check existing"))?;

        let stake: i64 = match market.as_ref().and_then(|m| m.outcome) {
            Some(outcome) => sqlx::query_scalar(
                r#"
                select coalesce(sum(amount), 0)::bigint
                from wagers
                where market_id = $1 and user_id = $2 and side = $3
                "#,
            )
            .bind(market_id)
            .bind(user_id)
            .bind(outcome.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(store_err("claim winning stake"))?,
            None => 0,
        };

        let amount = plan_claim(market.as_ref(), market_id, already_claimed, stake)?;
        let question = market.map(|m| m.question).unwrap_or_default();

        let now = Utc::now();
        // The unique constraint is the authority; `already_claimed` above is
        // only the friendly early answer.
        let claim_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            insert into claims (claim_id, market_id, user_id, amount_claimed, created_at_utc)
            values ($1, $2, $3, $4, $5)
            on conflict (market_id, user_id) do nothing
            returning claim_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(market_id)
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_constraint_violation(&e, "uq_claims_market_user") {
                LedgerError::AlreadyClaimed { market_id }
            } else {
                store_err("claim insert")(e)
            }
        })?;
        let claim_id = claim_id.ok_or(LedgerError::AlreadyClaimed { market_id })?;

        let balance: i64 = sqlx::query_scalar(
            "update users set balance = balance + $2 where user_id = $1 returning balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err("claim credit"))?;

        let description = claim_description(&question);
        insert_entry(
            &mut *tx,
            &NewEntry {
                user_id,
                kind: LedgerKind::Claim,
                amount,
                reference_id: Some(claim_id.to_string()),
                external_ref: None,
                description: &description,
            },
            now,
        )
        .await
        .map_err(store_err("claim insert entry"))?;

        tx.commit().await.map_err(store_err("claim commit"))?;

        Ok(ClaimReceipt {
            claim_id,
            amount_claimed: amount,
            balance,
        })
    }

    async fn deposit_exists(&self, payment_id: &str) -> Result<bool, LedgerError> {
        sqlx::query_scalar(
            "select exists (select 1 from ledger_entries where kind = 'DEPOSIT' and external_ref = $1)",
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err("deposit_exists"))
    }

    async fn credit_deposit(&self, credit: &DepositCredit) -> Result<DepositOutcome, LedgerError> {
        if credit.amount <= 0 {
            return Err(LedgerError::InvalidAmount {
                amount: credit.amount,
            });
        }

        let mut tx = self.pool.begin().await.map_err(store_err("deposit begin"))?;

        // The partial unique index serialises concurrent deliveries of the
        // same payment: the loser waits on the winner's commit, then
        // conflicts and inserts nothing.
        let entry_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            insert into ledger_entries (
              entry_id, user_id, kind, amount, status, reference_id, external_ref, description
            ) values (
              $1, $2, 'DEPOSIT', $3, 'COMPLETED', $4, $5, $6
            )
            on conflict (external_ref) where kind = 'DEPOSIT' do nothing
            returning entry_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(credit.user_id)
        .bind(credit.amount)
        .bind(&credit.order_id)
        .bind(&credit.payment_id)
        .bind(&credit.description)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                LedgerError::UserNotFound {
                    user_id: Some(credit.user_id),
                }
            } else {
                store_err("deposit insert entry")(e)
            }
        })?;

        let Some(entry_id) = entry_id else {
            debug!(payment_id = %credit.payment_id, "deposit already recorded");
            return Ok(DepositOutcome::Duplicate);
        };

        let balance: Option<i64> = sqlx::query_scalar(
            "update users set balance = balance + $2 where user_id = $1 returning balance",
        )
        .bind(credit.user_id)
        .bind(credit.amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err("deposit credit"))?;
        let balance = balance.ok_or(LedgerError::UserNotFound {
            user_id: Some(credit.user_id),
        })?;

        tx.commit().await.map_err(store_err("deposit commit"))?;

        Ok(DepositOutcome::Credited { entry_id, balance })
    }

    async fn wagers_for_user(&self, user_id: Uuid) -> Result<Vec<WagerRow>, LedgerError> {
        let rows = sqlx::query(
            r#"
            select wager_id, market_id, user_id, side, amount, created_at_utc
            from wagers
            where user_id = $1
            order by created_at_utc desc, wager_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("wagers_for_user"))?;
        rows.iter()
            .map(wager_from_row)
            .collect::<Result<_, _>>()
            .map_err(decode_err("wagers_for_user"))
    }

    async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<ClaimRow>, LedgerError> {
        let rows = sqlx::query(
            r#"
            select claim_id, market_id, user_id, amount_claimed, created_at_utc
            from claims
            where user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("claims_for_user"))?;
        rows.iter()
            .map(claim_from_row)
            .collect::<Result<_, _>>()
            .map_err(decode_err("claims_for_user"))
    }

    async fn recent_entries(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntryRow>, LedgerError> {
        let rows = sqlx::query(
            r#"
            select entry_id, user_id, kind, amount, status, reference_id, external_ref,
                   description, created_at_utc
            from ledger_entries
            where user_id = $1
            order by created_at_utc desc, entry_id
            limit $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("recent_entries"))?;
        rows.iter()
            .map(entry_from_row)
            .collect::<Result<_, _>>()
            .map_err(decode_err("recent_entries"))
    }
}
