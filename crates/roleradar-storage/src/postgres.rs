use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roleradar_core::{JobSections, NewJob, NormalizedJob, SkillSet, SourceRunLog};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::{fold_key, JobFilter, JobStore, StoreError};

const JOB_COLUMNS: &str = "id, source, external_id, title, company, location, job_url, apply_url, \
     employment_type, remote_status, salary_range, experience_level, date_posted, date_scraped, \
     raw_description, responsibilities, qualifications, nice_to_have, about_role, about_company, \
     required_skills, bonus_skills, technologies, ai_ml_keywords, relevance_score, is_active";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Postgres-backed job store. Uniqueness of `(source, external_id)` is enforced by the schema.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn row_to_job(row: &PgRow) -> Result<NormalizedJob, sqlx::Error> {
    Ok(NormalizedJob::new(
        row.try_get("id")?,
        NewJob {
            source: row.try_get("source")?,
            external_id: row.try_get("external_id")?,
            title: row.try_get("title")?,
            company: row.try_get("company")?,
            location: row.try_get("location")?,
            job_url: row.try_get("job_url")?,
            apply_url: row.try_get("apply_url")?,
            employment_type: row.try_get("employment_type")?,
            remote_status: row.try_get("remote_status")?,
            salary_range: row.try_get("salary_range")?,
            experience_level: row.try_get("experience_level")?,
            date_posted: row.try_get("date_posted")?,
            date_scraped: row.try_get("date_scraped")?,
            raw_description: row.try_get("raw_description")?,
            sections: JobSections {
                responsibilities: row.try_get("responsibilities")?,
                qualifications: row.try_get("qualifications")?,
                nice_to_have: row.try_get("nice_to_have")?,
                about_role: row.try_get("about_role")?,
                about_company: row.try_get("about_company")?,
            },
            skills: SkillSet {
                required_skills: row.try_get("required_skills")?,
                bonus_skills: row.try_get("bonus_skills")?,
                technologies: row.try_get("technologies")?,
                ai_ml_keywords: row.try_get("ai_ml_keywords")?,
            },
            relevance_score: row.try_get("relevance_score")?,
            is_active: row.try_get("is_active")?,
        },
    ))
}

fn rows_to_jobs(rows: &[PgRow]) -> Result<Vec<NormalizedJob>, StoreError> {
    rows.iter()
        .map(|row| row_to_job(row).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: NewJob) -> Result<i64, StoreError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (
                source, external_id, title, company, location, job_url, apply_url,
                employment_type, remote_status, salary_range, experience_level,
                date_posted, date_scraped, raw_description,
                responsibilities, qualifications, nice_to_have, about_role, about_company,
                required_skills, bonus_skills, technologies, ai_ml_keywords,
                relevance_score, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
            ON CONFLICT (source, external_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&job.source)
        .bind(&job.external_id)
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.location)
        .bind(&job.job_url)
        .bind(&job.apply_url)
        .bind(&job.employment_type)
        .bind(&job.remote_status)
        .bind(&job.salary_range)
        .bind(&job.experience_level)
        .bind(job.date_posted)
        .bind(job.date_scraped)
        .bind(&job.raw_description)
        .bind(&job.sections.responsibilities)
        .bind(&job.sections.qualifications)
        .bind(&job.sections.nice_to_have)
        .bind(&job.sections.about_role)
        .bind(&job.sections.about_company)
        .bind(&job.skills.required_skills)
        .bind(&job.skills.bonus_skills)
        .bind(&job.skills.technologies)
        .bind(&job.skills.ai_ml_keywords)
        .bind(job.relevance_score)
        .bind(job.is_active)
        .fetch_optional(&self.pool)
        .await?;

        inserted.ok_or(StoreError::Conflict {
            source_tag: job.source,
            external_id: job.external_id,
        })
    }

    async fn find_by_external_id(
        &self,
        source: &str,
        external_id: &str,
    ) -> Result<Option<NormalizedJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE source = $1 AND external_id = $2"
        ))
        .bind(source)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_job).transpose()?)
    }

    async fn find_recent_by_company_title(
        &self,
        company: &str,
        title: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NormalizedJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE LOWER(TRIM(company)) = $1 AND LOWER(TRIM(title)) = $2 AND date_scraped >= $3 \
             ORDER BY id"
        ))
        .bind(fold_key(company))
        .bind(fold_key(title))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows_to_jobs(&rows)
    }

    async fn get(&self, id: i64) -> Result<Option<NormalizedJob>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_job).transpose()?)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<NormalizedJob>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE TRUE"));
        if let Some(source) = &filter.source {
            qb.push(" AND source = ").push_bind(source.clone());
        }
        if let Some(company) = &filter.company {
            qb.push(" AND LOWER(TRIM(company)) = ").push_bind(fold_key(company));
        }
        if let Some(min_score) = filter.min_score {
            qb.push(" AND relevance_score >= ").push_bind(min_score);
        }
        if let Some(since) = filter.posted_since {
            qb.push(" AND date_posted >= ").push_bind(since);
        }
        if let Some(since) = filter.scraped_since {
            qb.push(" AND date_scraped >= ").push_bind(since);
        }
        if filter.active_only {
            qb.push(" AND is_active");
        }
        qb.push(" ORDER BY relevance_score DESC, id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows_to_jobs(&rows)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn record_run(&self, log: &SourceRunLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scraper_runs (
                run_id, source, jobs_found, jobs_added, jobs_skipped, error, run_time_ms, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.run_id)
        .bind(&log.source)
        .bind(log.jobs_found as i32)
        .bind(log.jobs_added as i32)
        .bind(log.jobs_skipped as i32)
        .bind(&log.error)
        .bind(log.run_time_ms as i64)
        .bind(log.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
