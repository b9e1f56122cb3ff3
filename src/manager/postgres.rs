//! PostgreSQL implementation of [`Storage`].
//!
//! Each aggregate is stored whole as JSONB in `body`, with the fields that
//! listings filter on mirrored into indexed columns. Conditional writes run in a
//! transaction that locks the row with `SELECT ... FOR UPDATE`, applies the
//! modification closure and writes back; a closure error rolls the transaction
//! back.
//!
//! # Example
//! ```ignore
//! use lifeline::{LifecycleCoordinator, PostgresStorage};
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgresql://localhost/lifeline").await?;
//! lifeline::migrator().run(&pool).await?;
//! let storage = Arc::new(PostgresStorage::new(pool));
//! let coordinator = LifecycleCoordinator::new(storage, blobs, geocoder, directory);
//! ```

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};

use super::{Audience, Page, PageRequest, RequestFilter, RequestStats, Storage, VolunteerFilter};
use crate::auth::normalize_district;
use crate::domain::actor::AccountId;
use crate::domain::request::{AdminStatus, HelpRequest, RequestId};
use crate::domain::volunteer::{Volunteer, VolunteerId};
use crate::error::{LifelineError, Result};

pub mod pool_provider;

pub use pool_provider::{PoolProvider, ReplicaPools};

/// PostgreSQL storage for requests and volunteers.
#[derive(Debug, Clone)]
pub struct PostgresStorage<P: PoolProvider = sqlx::PgPool> {
    pools: P,
}

impl<P: PoolProvider> PostgresStorage<P> {
    pub fn new(pools: P) -> Self {
        Self { pools }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pools
            .write()
            .begin()
            .await
            .map_err(|e| LifelineError::Other(anyhow!("Failed to begin transaction: {}", e)))
    }

    async fn write_request(
        tx: &mut Transaction<'static, Postgres>,
        request: &HelpRequest,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE help_requests
            SET district = $2, category = $3, urgency = $4, status = $5, admin_status = $6,
                is_public = $7, assigned_volunteer = $8, body = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(request.id.0)
        .bind(&request.district)
        .bind(request.category.as_str())
        .bind(request.urgency.as_str())
        .bind(request.status.as_str())
        .bind(request.admin_status.as_str())
        .bind(request.is_public)
        .bind(request.assigned_volunteer.map(|v| v.0))
        .bind(Json(request))
        .bind(request.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to update request: {}", e)))?;
        Ok(())
    }

    async fn write_volunteer(
        tx: &mut Transaction<'static, Postgres>,
        volunteer: &Volunteer,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE volunteers
            SET district = $2, status = $3, is_active = $4, points = $5, body = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(volunteer.id.0)
        .bind(&volunteer.district)
        .bind(volunteer.status.as_str())
        .bind(volunteer.is_active)
        .bind(points_column(volunteer.points))
        .bind(Json(volunteer))
        .bind(volunteer.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to update volunteer: {}", e)))?;
        Ok(())
    }
}

fn points_column(points: u64) -> i64 {
    i64::try_from(points).unwrap_or(i64::MAX)
}

fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// `WHERE` clause shared by request listings and their count. Mirrors
/// [`RequestFilter::matches`] on the indexed columns; districts are compared
/// normalized, as a substring.
const REQUEST_PREDICATES: &str = r#"
    WHERE ($1::TEXT IS NULL OR category = $1)
      AND ($2::TEXT IS NULL OR urgency = $2)
      AND ($3::TEXT IS NULL OR status = $3)
      AND ($4::TEXT IS NULL OR lower(btrim(district)) LIKE '%' || $4 || '%')
      AND ($5::TEXT IS NULL OR lower(btrim(district)) LIKE '%' || $5 || '%')
      AND (NOT $6::BOOLEAN OR (is_public AND admin_status = 'approved'))
      AND ($7::UUID IS NULL OR submitter_account = $7)
      AND (NOT $8::BOOLEAN OR (status = 'open' AND admin_status = 'approved' AND assigned_volunteer IS NULL))
      AND ($9::UUID IS NULL OR assigned_volunteer = $9)
      AND ($10::UUID IS NULL OR assigned_volunteer = $10
           OR (status = 'open' AND admin_status = 'approved' AND assigned_volunteer IS NULL))
"#;

/// Bind values for [`REQUEST_PREDICATES`].
#[derive(Debug, Default)]
struct ListPredicates {
    category: Option<&'static str>,
    urgency: Option<&'static str>,
    status: Option<&'static str>,
    district: Option<String>,
    audience_district: Option<String>,
    public_only: bool,
    submitter: Option<uuid::Uuid>,
    open_pool: bool,
    assigned_to: Option<uuid::Uuid>,
    volunteer: Option<uuid::Uuid>,
}

impl ListPredicates {
    /// `None` when the filter cannot match anything (a blank district).
    fn from_filter(filter: &RequestFilter) -> Option<Self> {
        let district = match filter.district.as_deref() {
            Some(district) => Some(district_pattern(district)?),
            None => None,
        };
        let mut predicates = ListPredicates {
            category: filter.category.map(|c| c.as_str()),
            urgency: filter.urgency.map(|u| u.as_str()),
            status: filter.status.map(|s| s.as_str()),
            district,
            ..Default::default()
        };
        match &filter.audience {
            Audience::Everyone => {}
            Audience::PublicOnly => predicates.public_only = true,
            Audience::District(district) => {
                predicates.audience_district = Some(district_pattern(district)?);
            }
            Audience::Submitter(account) => predicates.submitter = Some(account.0),
            Audience::OpenPool => predicates.open_pool = true,
            Audience::AssignedTo(volunteer) => predicates.assigned_to = Some(volunteer.0),
            Audience::Volunteer(volunteer) => predicates.volunteer = Some(volunteer.0),
        }
        Some(predicates)
    }

    fn bind<'q, O>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, O, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, O, sqlx::postgres::PgArguments> {
        query
            .bind(self.category)
            .bind(self.urgency)
            .bind(self.status)
            .bind(self.district.clone())
            .bind(self.audience_district.clone())
            .bind(self.public_only)
            .bind(self.submitter)
            .bind(self.open_pool)
            .bind(self.assigned_to)
            .bind(self.volunteer)
    }
}

/// Normalized district as a `LIKE` fragment. `None` for a blank district,
/// which matches nothing.
fn district_pattern(district: &str) -> Option<String> {
    let normalized = normalize_district(district);
    if normalized.is_empty() {
        return None;
    }
    Some(
        normalized
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_"),
    )
}

#[async_trait]
impl<P: PoolProvider> Storage for PostgresStorage<P> {
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id))]
    async fn insert_request(&self, request: HelpRequest) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO help_requests (
                id, reference, district, category, urgency, status, admin_status, is_public,
                assigned_volunteer, submitter_account, body, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(request.id.0)
        .bind(&request.reference)
        .bind(&request.district)
        .bind(request.category.as_str())
        .bind(request.urgency.as_str())
        .bind(request.status.as_str())
        .bind(request.admin_status.as_str())
        .bind(request.is_public)
        .bind(request.assigned_volunteer.map(|v| v.0))
        .bind(request.submitter.account_id.map(|a| a.0))
        .bind(Json(&request))
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(self.pools.write())
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to insert request: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(LifelineError::Conflict(format!(
                "request {} already exists",
                request.id
            )));
        }
        Ok(())
    }

    async fn get_request(&self, id: RequestId) -> Result<HelpRequest> {
        sqlx::query_scalar::<_, Json<HelpRequest>>("SELECT body FROM help_requests WHERE id = $1")
            .bind(id.0)
            .fetch_optional(self.pools.read())
            .await
            .map_err(|e| LifelineError::Other(anyhow!("Failed to fetch request: {}", e)))?
            .map(|Json(request)| request)
            .ok_or_else(|| LifelineError::not_found("request", id))
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<Page<HelpRequest>> {
        let Some(predicates) = ListPredicates::from_filter(filter) else {
            return Ok(Page::new(Vec::new(), page, 0));
        };

        let rows = predicates
            .bind(sqlx::query_as::<_, (Json<HelpRequest>, i64)>(&format!(
                "SELECT body, COUNT(*) OVER() FROM help_requests {REQUEST_PREDICATES} \
                 ORDER BY created_at DESC, id LIMIT $11 OFFSET $12"
            )))
            .bind(sql_count(page.limit))
            .bind(sql_count(page.offset()))
            .fetch_all(self.pools.read())
            .await
            .map_err(|e| LifelineError::Other(anyhow!("Failed to list requests: {}", e)))?;

        let total = match rows.first() {
            Some((_, total)) => *total,
            // Past the last page the window count has no row to ride on
            None if page.offset() > 0 => predicates
                .bind(sqlx::query_as::<_, (i64,)>(&format!(
                    "SELECT COUNT(*) FROM help_requests {REQUEST_PREDICATES}"
                )))
                .fetch_one(self.pools.read())
                .await
                .map_err(|e| LifelineError::Other(anyhow!("Failed to count requests: {}", e)))?
                .0,
            None => 0,
        };
        let items = rows.into_iter().map(|(Json(request), _)| request).collect();
        Ok(Page::new(items, page, usize::try_from(total).unwrap_or(0)))
    }

    #[tracing::instrument(skip(self, f), fields(request_id = %id))]
    async fn modify_request<T, F>(&self, id: RequestId, f: F) -> Result<(HelpRequest, T)>
    where
        F: FnOnce(&mut HelpRequest) -> Result<T> + Send,
        T: Send,
    {
        let mut tx = self.begin().await?;

        let Json(mut request) = sqlx::query_scalar::<_, Json<HelpRequest>>(
            "SELECT body FROM help_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to lock request: {}", e)))?
        .ok_or_else(|| LifelineError::not_found("request", id))?;

        let out = f(&mut request)?;
        Self::write_request(&mut tx, &request).await?;

        tx.commit()
            .await
            .map_err(|e| LifelineError::Other(anyhow!("Failed to commit request update: {}", e)))?;
        Ok((request, out))
    }

    #[tracing::instrument(skip(self, guard), fields(request_id = %id))]
    async fn remove_request<F>(&self, id: RequestId, guard: F) -> Result<HelpRequest>
    where
        F: FnOnce(&HelpRequest) -> Result<()> + Send,
    {
        let mut tx = self.begin().await?;

        let Json(request) = sqlx::query_scalar::<_, Json<HelpRequest>>(
            "SELECT body FROM help_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to lock request: {}", e)))?
        .ok_or_else(|| LifelineError::not_found("request", id))?;

        guard(&request)?;

        sqlx::query("DELETE FROM help_requests WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| LifelineError::Other(anyhow!("Failed to delete request: {}", e)))?;
        tx.commit()
            .await
            .map_err(|e| LifelineError::Other(anyhow!("Failed to commit deletion: {}", e)))?;
        Ok(request)
    }

    async fn request_stats(&self) -> Result<RequestStats> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT status, category, admin_status, COUNT(*)
            FROM help_requests
            GROUP BY status, category, admin_status
            "#,
        )
        .fetch_all(self.pools.read())
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to compute request stats: {}", e)))?;

        let mut stats = RequestStats::default();
        for (status, category, admin_status, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            stats.total += count;
            *stats.by_status.entry(status).or_default() += count;
            *stats.by_category.entry(category).or_default() += count;
            if admin_status == AdminStatus::Pending.as_str() {
                stats.awaiting_moderation += count;
            }
        }
        Ok(stats)
    }

    #[tracing::instrument(skip(self, volunteer), fields(volunteer_id = %volunteer.id))]
    async fn insert_volunteer(&self, volunteer: Volunteer) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO volunteers (
                id, account_id, district, status, is_active, points, body, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(volunteer.id.0)
        .bind(volunteer.account_id.0)
        .bind(&volunteer.district)
        .bind(volunteer.status.as_str())
        .bind(volunteer.is_active)
        .bind(points_column(volunteer.points))
        .bind(Json(&volunteer))
        .bind(volunteer.created_at)
        .bind(volunteer.updated_at)
        .execute(self.pools.write())
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to insert volunteer: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(LifelineError::Conflict(format!(
                "account {} already has a volunteer profile",
                volunteer.account_id
            )));
        }
        Ok(())
    }

    async fn get_volunteer(&self, id: VolunteerId) -> Result<Volunteer> {
        sqlx::query_scalar::<_, Json<Volunteer>>("SELECT body FROM volunteers WHERE id = $1")
            .bind(id.0)
            .fetch_optional(self.pools.read())
            .await
            .map_err(|e| LifelineError::Other(anyhow!("Failed to fetch volunteer: {}", e)))?
            .map(|Json(volunteer)| volunteer)
            .ok_or_else(|| LifelineError::not_found("volunteer", id))
    }

    async fn find_volunteer_by_account(&self, account: AccountId) -> Result<Option<Volunteer>> {
        let row = sqlx::query_scalar::<_, Json<Volunteer>>(
            "SELECT body FROM volunteers WHERE account_id = $1",
        )
        .bind(account.0)
        .fetch_optional(self.pools.read())
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to fetch volunteer: {}", e)))?;
        Ok(row.map(|Json(volunteer)| volunteer))
    }

    async fn list_volunteers(&self, filter: &VolunteerFilter) -> Result<Vec<Volunteer>> {
        let rows = sqlx::query_scalar::<_, Json<Volunteer>>(
            r#"
            SELECT body FROM volunteers
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND (NOT $2 OR is_active)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.active_only)
        .fetch_all(self.pools.read())
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to list volunteers: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|Json(volunteer)| volunteer)
            .filter(|volunteer| filter.matches(volunteer))
            .collect())
    }

    #[tracing::instrument(skip(self, f), fields(volunteer_id = %id))]
    async fn modify_volunteer<T, F>(&self, id: VolunteerId, f: F) -> Result<(Volunteer, T)>
    where
        F: FnOnce(&mut Volunteer) -> Result<T> + Send,
        T: Send,
    {
        let mut tx = self.begin().await?;

        let Json(mut volunteer) = sqlx::query_scalar::<_, Json<Volunteer>>(
            "SELECT body FROM volunteers WHERE id = $1 FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to lock volunteer: {}", e)))?
        .ok_or_else(|| LifelineError::not_found("volunteer", id))?;

        let out = f(&mut volunteer)?;
        Self::write_volunteer(&mut tx, &volunteer).await?;

        tx.commit().await.map_err(|e| {
            LifelineError::Other(anyhow!("Failed to commit volunteer update: {}", e))
        })?;
        Ok((volunteer, out))
    }

    async fn top_volunteers(&self, limit: usize) -> Result<Vec<Volunteer>> {
        let rows = sqlx::query_scalar::<_, Json<Volunteer>>(
            r#"
            SELECT body FROM volunteers
            WHERE status = 'approved' AND is_active
            ORDER BY points DESC, created_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pools.read())
        .await
        .map_err(|e| LifelineError::Other(anyhow!("Failed to rank volunteers: {}", e)))?;

        Ok(rows.into_iter().map(|Json(volunteer)| volunteer).collect())
    }
}
