use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use motorpool::auth::jwt::JwtService;
use motorpool::config::AppConfig;
use motorpool::db::{self, PgPool};
use motorpool::mailer::{Mailer, OutboundEmail};
use motorpool::models::{Job, NewUser};
use motorpool::routes;
use motorpool::state::AppState;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Records outbound messages instead of delivering them.
#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let mut guard = self.sent.lock().await;
        guard.push(email.clone());
        Ok(())
    }
}

impl FakeMailer {
    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<OutboundEmail> {
        let guard = self.sent.lock().await;
        guard.clone()
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    mailer: Arc<FakeMailer>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            portal_base_url: "http://portal.test".to_string(),
            mail_from: "transportation@portal.test".to_string(),
            moderator_email: Some("fleet@portal.test".to_string()),
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let mailer = Arc::new(FakeMailer::default());
        let mailer_for_state: Arc<dyn Mailer> = mailer.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, mailer_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            mailer,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn mailer(&self) -> Arc<FakeMailer> {
        self.mailer.clone()
    }

    pub async fn insert_user(&self, username: &str, password: &str, role: &str) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let password_hash = hash_password(&password)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                email: format!("{username}@portal.test"),
                first_name: username.clone(),
                last_name: "Tester".to_string(),
                username,
                password_hash,
                role,
            };
            diesel::insert_into(motorpool::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    #[allow(dead_code)]
    pub async fn clear_jobs(&self) -> Result<()> {
        self.with_conn(|conn| {
            use motorpool::schema::jobs::dsl::jobs as jobs_table;
            diesel::delete(jobs_table)
                .execute(conn)
                .context("failed to clear jobs")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use motorpool::schema::jobs::dsl::{job_type as job_type_col, jobs as jobs_table};
            let rows = jobs_table
                .filter(job_type_col.eq(&ty))
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::PATCH)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

#[allow(dead_code)]
#[derive(Clone, Copy)]
pub struct FleetIds {
    pub org_id: Uuid,
    pub department_id: Uuid,
    pub budget_id: Uuid,
}

#[allow(dead_code)]
impl TestApp {
    /// Inserts an organization with one department and one budget.
    pub async fn seed_fleet(&self) -> Result<FleetIds> {
        self.with_conn(|conn| {
            use motorpool::models::{NewBudget, NewDepartment, NewOrganization};
            use motorpool::schema::{budgets, departments, organizations};

            let org = NewOrganization {
                id: Uuid::new_v4(),
                name: format!("Org {}", Uuid::new_v4()),
            };
            diesel::insert_into(organizations::table)
                .values(&org)
                .execute(conn)?;

            let department = NewDepartment {
                id: Uuid::new_v4(),
                org_id: org.id,
                num: "100".to_string(),
                name: "Outdoor Ministries".to_string(),
            };
            diesel::insert_into(departments::table)
                .values(&department)
                .execute(conn)?;

            let budget = NewBudget {
                id: Uuid::new_v4(),
                org_id: org.id,
                num: "8100".to_string(),
                name: "Travel".to_string(),
            };
            diesel::insert_into(budgets::table)
                .values(&budget)
                .execute(conn)?;

            Ok(FleetIds {
                org_id: org.id,
                department_id: department.id,
                budget_id: budget.id,
            })
        })
        .await
    }

    pub async fn seed_driver(&self, first_name: &str, last_name: &str) -> Result<Uuid> {
        let first_name = first_name.to_string();
        let last_name = last_name.to_string();
        self.with_conn(move |conn| {
            use motorpool::models::NewDriver;
            use motorpool::schema::drivers;

            let driver = NewDriver {
                id: Uuid::new_v4(),
                status: "active".to_string(),
                first_name,
                last_name,
                license_num: None,
                license_expires: None,
                birth_date: None,
                state: None,
                phone: None,
                email: None,
                restrictions: None,
                has_cdl: false,
                notes: String::new(),
            };
            diesel::insert_into(drivers::table)
                .values(&driver)
                .execute(conn)?;
            Ok(driver.id)
        })
        .await
    }

    pub async fn seed_vehicle(&self, org_id: Uuid, num: i32, mileage: i32) -> Result<Uuid> {
        self.with_conn(move |conn| {
            use motorpool::models::NewVehicle;
            use motorpool::schema::vehicles;

            let vehicle = NewVehicle {
                id: Uuid::new_v4(),
                org_id,
                num,
                vehicle_type: "passenger_van".to_string(),
                status: "active".to_string(),
                year: 2019,
                make: "Ford".to_string(),
                model: "Transit".to_string(),
                title_num: String::new(),
                vin: String::new(),
                license_plate: String::new(),
                reg_expire_date: chrono::NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
                mileage,
                purchase_date: None,
                purchase_cost: None,
                storage_location: None,
                notes: String::new(),
            };
            diesel::insert_into(vehicles::table)
                .values(&vehicle)
                .execute(conn)?;
            Ok(vehicle.id)
        })
        .await
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_to_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE jobs, trip_request_activity, trip_requests, vehicle_activity, \
         vehicle_maintenance, vehicles, driver_organizations, drivers, budgets, departments, \
         organizations, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::Argon2;

    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?
        .to_string())
}
