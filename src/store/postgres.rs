use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};

use super::{DeleteSummary, HierarchyStore, LicenseGrant, StoreError, StoreResult, UserChanges};
use crate::hierarchy::catalog::{Level, UserTypeLevel};
use crate::hierarchy::chain::LevelAssignment;
use crate::hierarchy::ledger::{Debit, LicenseKind};
use crate::models::{
    DivisionId, Entity, EntityDivision, EntityId, LicenseAllotment, NewDivision, NewEntity, NewUser, User, UserId,
};

// Legacy root rows point at themselves; NULLIF turns that loop into an absent parent
const ENTITY_COLUMNS: &str = r#"
    id, name, entity_type, level, NULLIF(parent_entity_id, id) AS parent_id, status,
    contact_name, contact_email, contact_mobile, logo_path, created_at, updated_at
"#;

const DIVISION_COLUMNS: &str = r#"
    id, name, division_type, level, entity_id, NULLIF(parent_division_id, id) AS parent_division_id, status,
    contact_name, contact_email, contact_mobile, created_at, updated_at
"#;

const USER_COLUMNS: &str = r#"
    id, name, email, mobile, user_type, status, renewal_date,
    level_1, level_2, level_3, level_4, level_5, level_6, level_7, created_at, updated_at
"#;

const ALLOTMENT_COLUMNS: &str = "entity_id, kind, granted, consumed, purchased_at, valid_till";

// Fixed-shape slot match: the level is a bound parameter, never spliced into the SQL
const USERS_UNDER_NODE: &str = r#"
    (CASE $1::smallint
        WHEN 1 THEN level_1 WHEN 2 THEN level_2 WHEN 3 THEN level_3 WHEN 4 THEN level_4
        WHEN 5 THEN level_5 WHEN 6 THEN level_6 WHEN 7 THEN level_7
    END) = $2
"#;

/// PostgreSQL-backed store; every multi-row write runs in one transaction
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema in `migrations/`
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Conditional increments; the first one that matches no row aborts the batch
async fn debit_all(conn: &mut PgConnection, debits: &[Debit]) -> StoreResult<()> {
    for debit in debits {
        let result = sqlx::query(
            r#"
            UPDATE entity_licence
            SET consumed = consumed + $3
            WHERE entity_id = $1 AND kind = $2 AND consumed + $3 <= granted
            "#,
        )
        .bind(debit.entity_id)
        .bind(debit.kind.as_str())
        .bind(debit.quantity)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::CapacityExceeded {
                entity_id: debit.entity_id,
                kind: debit.kind,
            });
        }
    }
    Ok(())
}

async fn grant_in(conn: &mut PgConnection, grant: &LicenseGrant) -> StoreResult<LicenseAllotment> {
    let query = format!(
        r#"
        INSERT INTO entity_licence (entity_id, kind, granted, consumed, purchased_at, valid_till)
        VALUES ($1, $2, $3, 0, now(), $4)
        ON CONFLICT (entity_id, kind) DO UPDATE
        SET granted = entity_licence.granted + EXCLUDED.granted,
            valid_till = COALESCE(EXCLUDED.valid_till, entity_licence.valid_till)
        RETURNING {}
        "#,
        ALLOTMENT_COLUMNS
    );
    let row = sqlx::query_as::<_, LicenseAllotment>(&query)
        .bind(grant.entity_id)
        .bind(grant.kind.as_str())
        .bind(grant.quantity)
        .bind(grant.valid_till)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row)
}

fn unique_violation(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what()),
        _ => StoreError::Database(err),
    }
}

fn expect_one(rows: u64, what: impl FnOnce() -> String) -> StoreResult<()> {
    if rows == 0 {
        Err(StoreError::NotFound(what()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl HierarchyStore for PgStore {
    async fn entity(&self, id: EntityId) -> StoreResult<Option<Entity>> {
        let query = format!("SELECT {} FROM entity WHERE id = $1", ENTITY_COLUMNS);
        Ok(sqlx::query_as::<_, Entity>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn division(&self, id: DivisionId) -> StoreResult<Option<EntityDivision>> {
        let query = format!("SELECT {} FROM entity_division WHERE id = $1", DIVISION_COLUMNS);
        Ok(sqlx::query_as::<_, EntityDivision>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        let query = format!("SELECT {} FROM app_user WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let query = format!(
            "SELECT {} FROM app_user WHERE email = $1 AND status <> 'Deleted'",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_by_mobile(&self, mobile: &str) -> StoreResult<Option<User>> {
        let query = format!(
            "SELECT {} FROM app_user WHERE mobile = $1 AND status <> 'Deleted'",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(mobile)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_types(&self) -> StoreResult<Vec<UserTypeLevel>> {
        let rows = sqlx::query("SELECT code, name, level, is_admin FROM user_type ORDER BY code")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let level: i16 = row.try_get("level")?;
                let level = Level::try_from(level)
                    .map_err(|e| StoreError::Corrupt(format!("user_type level: {}", e)))?;
                Ok(UserTypeLevel {
                    code: row.try_get("code")?,
                    name: row.try_get("name")?,
                    level,
                    is_admin: row.try_get("is_admin")?,
                })
            })
            .collect()
    }

    async fn allotment(&self, entity_id: EntityId, kind: LicenseKind) -> StoreResult<Option<LicenseAllotment>> {
        let query = format!(
            "SELECT {} FROM entity_licence WHERE entity_id = $1 AND kind = $2",
            ALLOTMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, LicenseAllotment>(&query)
            .bind(entity_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn allotments(&self, entity_id: EntityId) -> StoreResult<Vec<LicenseAllotment>> {
        let query = format!(
            "SELECT {} FROM entity_licence WHERE entity_id = $1 ORDER BY kind",
            ALLOTMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, LicenseAllotment>(&query)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn entity_name_taken(&self, parent_id: Option<EntityId>, name: &str) -> StoreResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM entity
                WHERE NULLIF(parent_entity_id, id) IS NOT DISTINCT FROM $1
                  AND lower(name) = lower($2)
                  AND status <> 'Deleted'
            )
            "#,
        )
        .bind(parent_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn division_name_taken(
        &self,
        entity_id: EntityId,
        parent_division_id: Option<DivisionId>,
        name: &str,
    ) -> StoreResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM entity_division
                WHERE entity_id = $1
                  AND NULLIF(parent_division_id, id) IS NOT DISTINCT FROM $2
                  AND lower(name) = lower($3)
                  AND status <> 'Deleted'
            )
            "#,
        )
        .bind(entity_id)
        .bind(parent_division_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn apply_debits(&self, debits: &[Debit]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        debit_all(&mut tx, debits).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_user(&self, user: NewUser, assignment: &LevelAssignment, debits: &[Debit]) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;
        debit_all(&mut tx, debits).await?;

        let query = format!(
            r#"
            INSERT INTO app_user (
                name, email, mobile, password_hash, user_type, status, renewal_date,
                level_1, level_2, level_3, level_4, level_5, level_6, level_7
            )
            VALUES ($1, $2, $3, $4, $5, 'Active', $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let mut insert = sqlx::query_as::<_, User>(&query)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.mobile)
            .bind(&user.password_hash)
            .bind(user.user_type)
            .bind(user.renewal_date);
        for slot in assignment.slots() {
            insert = insert.bind(*slot);
        }
        let email = user.email.clone();
        let row = insert
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| unique_violation(e, || format!("email or mobile of '{}' already in use", email)))?;

        tx.commit().await?;
        Ok(row)
    }

    async fn reassign_user(&self, id: UserId, assignment: &LevelAssignment) -> StoreResult<()> {
        let mut update = sqlx::query(
            r#"
            UPDATE app_user
            SET level_1 = $2, level_2 = $3, level_3 = $4, level_4 = $5,
                level_5 = $6, level_6 = $7, level_7 = $8, updated_at = now()
            WHERE id = $1 AND status <> 'Deleted'
            "#,
        )
        .bind(id);
        for slot in assignment.slots() {
            update = update.bind(*slot);
        }
        let result = update.execute(&self.pool).await?;
        expect_one(result.rows_affected(), || format!("user {}", id))
    }

    async fn insert_entity(&self, entity: NewEntity, grants: &[LicenseGrant], debits: &[Debit]) -> StoreResult<Entity> {
        let mut tx = self.pool.begin().await?;
        debit_all(&mut tx, debits).await?;

        let query = format!(
            r#"
            INSERT INTO entity (
                name, entity_type, level, parent_entity_id, status,
                contact_name, contact_email, contact_mobile, logo_path
            )
            VALUES ($1, $2, $3, $4, 'Active', $5, $6, $7, $8)
            RETURNING {}
            "#,
            ENTITY_COLUMNS
        );
        let row = sqlx::query_as::<_, Entity>(&query)
            .bind(&entity.name)
            .bind(&entity.entity_type)
            .bind(i16::from(entity.level))
            .bind(entity.parent_id)
            .bind(&entity.contact_name)
            .bind(&entity.contact_email)
            .bind(&entity.contact_mobile)
            .bind(&entity.logo_path)
            .fetch_one(&mut *tx)
            .await?;

        for grant in grants {
            let grant = LicenseGrant {
                entity_id: row.id,
                ..*grant
            };
            grant_in(&mut tx, &grant).await?;
        }

        tx.commit().await?;
        Ok(row)
    }

    async fn insert_division(&self, division: NewDivision) -> StoreResult<EntityDivision> {
        let query = format!(
            r#"
            INSERT INTO entity_division (
                name, division_type, level, entity_id, parent_division_id, status,
                contact_name, contact_email, contact_mobile
            )
            VALUES ($1, $2, $3, $4, $5, 'Active', $6, $7, $8)
            RETURNING {}
            "#,
            DIVISION_COLUMNS
        );
        Ok(sqlx::query_as::<_, EntityDivision>(&query)
            .bind(&division.name)
            .bind(&division.division_type)
            .bind(i16::from(division.level))
            .bind(division.entity_id)
            .bind(division.parent_division_id)
            .bind(&division.contact_name)
            .bind(&division.contact_email)
            .bind(&division.contact_mobile)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn rename_entity(&self, id: EntityId, name: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE entity SET name = $2, updated_at = now() WHERE id = $1 AND status <> 'Deleted'",
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), || format!("entity {}", id))
    }

    async fn rename_division(&self, id: DivisionId, name: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE entity_division SET name = $2, updated_at = now() WHERE id = $1 AND status <> 'Deleted'",
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), || format!("division {}", id))
    }

    async fn set_entity_logo(&self, id: EntityId, logo_path: Option<&str>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE entity SET logo_path = $2, updated_at = now() WHERE id = $1 AND status <> 'Deleted'",
        )
        .bind(id)
        .bind(logo_path)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), || format!("entity {}", id))
    }

    async fn soft_delete_entity(&self, id: EntityId, level: Level, suffix: &str) -> StoreResult<DeleteSummary> {
        let mut tx = self.pool.begin().await?;

        let subtree: Vec<i64> = sqlx::query_scalar(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT id FROM entity WHERE id = $1 AND status <> 'Deleted'
                UNION
                SELECT e.id FROM entity e
                JOIN subtree s ON e.parent_entity_id = s.id AND e.id <> s.id
            )
            SELECT id FROM subtree
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        if subtree.is_empty() {
            return Err(StoreError::NotFound(format!("entity {}", id)));
        }

        let entities = sqlx::query(
            r#"
            UPDATE entity SET status = 'Deleted', name = name || $2, updated_at = now()
            WHERE id = ANY($1) AND status <> 'Deleted'
            "#,
        )
        .bind(&subtree)
        .bind(suffix)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let divisions = sqlx::query(
            r#"
            UPDATE entity_division SET status = 'Deleted', name = name || $2, updated_at = now()
            WHERE entity_id = ANY($1) AND status <> 'Deleted'
            "#,
        )
        .bind(&subtree)
        .bind(suffix)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let users = delete_users_under(&mut tx, level, id, suffix).await?;

        tx.commit().await?;
        Ok(DeleteSummary {
            entities,
            divisions,
            users,
        })
    }

    async fn soft_delete_division(&self, id: DivisionId, level: Level, suffix: &str) -> StoreResult<DeleteSummary> {
        let mut tx = self.pool.begin().await?;

        let divisions = sqlx::query(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT id FROM entity_division WHERE id = $1 AND status <> 'Deleted'
                UNION
                SELECT d.id FROM entity_division d
                JOIN subtree s ON d.parent_division_id = s.id AND d.id <> s.id
            )
            UPDATE entity_division SET status = 'Deleted', name = name || $2, updated_at = now()
            WHERE id IN (SELECT id FROM subtree) AND status <> 'Deleted'
            "#,
        )
        .bind(id)
        .bind(suffix)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if divisions == 0 {
            return Err(StoreError::NotFound(format!("division {}", id)));
        }

        let users = delete_users_under(&mut tx, level, id, suffix).await?;

        tx.commit().await?;
        Ok(DeleteSummary {
            entities: 0,
            divisions,
            users,
        })
    }

    async fn update_user(&self, id: UserId, changes: &UserChanges) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE app_user
            SET name = COALESCE($2, name), email = COALESCE($3, email),
                user_type = COALESCE($4, user_type), updated_at = now()
            WHERE id = $1 AND status <> 'Deleted'
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(changes.user_type)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("email of user {} already in use", id)))?;
        expect_one(result.rows_affected(), || format!("user {}", id))
    }

    async fn set_user_renewal(&self, id: UserId, renewal_date: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE app_user SET renewal_date = $2, updated_at = now() WHERE id = $1 AND status <> 'Deleted'",
        )
        .bind(id)
        .bind(renewal_date)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), || format!("user {}", id))
    }

    async fn set_entity_expiry(&self, id: EntityId, level: Level, expires_at: DateTime<Utc>) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let found = sqlx::query("SELECT 1 FROM entity WHERE id = $1 AND status <> 'Deleted' FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if found.is_none() {
            return Err(StoreError::NotFound(format!("entity {}", id)));
        }

        let query = format!(
            "UPDATE app_user SET renewal_date = $3, updated_at = now() WHERE status <> 'Deleted' AND {}",
            USERS_UNDER_NODE
        );
        let users = sqlx::query(&query)
            .bind(i16::from(level))
            .bind(id)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("UPDATE entity_licence SET valid_till = $2 WHERE entity_id = $1")
            .bind(id)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(users)
    }

    async fn soft_delete_user(&self, id: UserId, suffix: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE app_user SET status = 'Deleted', email = email || $2, updated_at = now()
            WHERE id = $1 AND status <> 'Deleted'
            "#,
        )
        .bind(id)
        .bind(suffix)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected(), || format!("user {}", id))
    }

    async fn grant_licences(&self, grant: LicenseGrant) -> StoreResult<LicenseAllotment> {
        let mut conn = self.pool.acquire().await?;
        grant_in(&mut conn, &grant).await
    }
}

async fn delete_users_under(conn: &mut PgConnection, level: Level, id: i64, suffix: &str) -> StoreResult<u64> {
    let query = format!(
        r#"
        UPDATE app_user SET status = 'Deleted', email = email || $3, updated_at = now()
        WHERE status <> 'Deleted' AND {}
        "#,
        USERS_UNDER_NODE
    );
    let result = sqlx::query(&query)
        .bind(i16::from(level))
        .bind(id)
        .bind(suffix)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
