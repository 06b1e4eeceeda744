use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;

use crate::attachments::AttachmentStore;
use crate::audit::AuditLog;
use crate::config::AppConfig;
use crate::console::Console;
use crate::db::health::DbHealthReport;
use crate::model::{
    Belonging, BehaviorReport, Case, FavoriteItem, Inmate, InspectionRecord, InvestigationMinute,
    Movement, User, Visit, WantedPerson, Ward,
};
use crate::repo::{Record, Repository};
use crate::store::CollectionStore;
use crate::{db, AppError, AppResult};

pub const MAINTENANCE_ACTIVE: &str = "STORE/MAINTENANCE_ACTIVE";

/// Everything a caller needs, built once per process and shared by `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<CollectionStore>,
    pub audit: AuditLog,
    pub attachments: AttachmentStore,
    pub db_health: Arc<Mutex<Option<DbHealthReport>>>,
    maintenance: Arc<AtomicBool>,

    pub users: Repository<User>,
    pub inmates: Repository<Inmate>,
    pub inspections: Repository<InspectionRecord>,
    pub belongings: Repository<Belonging>,
    pub wards: Repository<Ward>,
    pub cases: Repository<Case>,
    pub minutes: Repository<InvestigationMinute>,
    pub wanted: Repository<WantedPerson>,
    pub movements: Repository<Movement>,
    pub visits: Repository<Visit>,
    pub reports: Repository<BehaviorReport>,
    pub favorites: Repository<FavoriteItem>,
}

impl AppState {
    /// Open the store under `config.data_dir`. No connection is made until first use.
    pub fn open(config: AppConfig) -> AppResult<Self> {
        let pool = db::open_sqlite_pool(&config.db_path())?;
        Ok(Self::from_pool(config, pool))
    }

    /// Private in-memory database; attachments still go to `config.attachments_dir()`.
    pub fn in_memory(config: AppConfig) -> AppResult<Self> {
        let pool = db::open_memory_pool()?;
        Ok(Self::from_pool(config, pool))
    }

    fn from_pool(config: AppConfig, pool: SqlitePool) -> Self {
        let store = Arc::new(CollectionStore::new(pool.clone()));
        let audit = AuditLog::new(Arc::clone(&store));
        let attachments = AttachmentStore::new(pool, config.attachments_dir());

        Self {
            users: repo(&store, &audit),
            inmates: repo(&store, &audit),
            inspections: repo(&store, &audit),
            belongings: repo(&store, &audit),
            wards: repo(&store, &audit),
            cases: repo(&store, &audit),
            minutes: repo(&store, &audit),
            wanted: repo(&store, &audit),
            movements: repo(&store, &audit),
            visits: repo(&store, &audit),
            reports: repo(&store, &audit),
            favorites: repo(&store, &audit),
            config: Arc::new(config),
            store,
            audit,
            attachments,
            db_health: Arc::new(Mutex::new(None)),
            maintenance: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }

    pub fn console(&self, passphrase: &str) -> AppResult<Console> {
        Console::unlock(
            passphrase,
            &self.config,
            Arc::clone(&self.store),
            self.audit.clone(),
        )
    }

    /// Guard for restore, reset and hard reset; only one may run at a time.
    pub fn begin_maintenance(&self) -> AppResult<MaintenanceGuard> {
        MaintenanceGuard::begin(Arc::clone(&self.maintenance))
    }

    pub fn maintenance_active(&self) -> bool {
        self.maintenance.load(Ordering::SeqCst)
    }

    pub fn last_health(&self) -> Option<DbHealthReport> {
        self.db_health
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn remember_health(&self, report: &DbHealthReport) {
        *self.db_health.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
    }

    pub async fn close(&self) {
        self.store.pool().close().await;
    }
}

fn repo<T: Record>(store: &Arc<CollectionStore>, audit: &AuditLog) -> Repository<T> {
    Repository::new(Arc::clone(store), audit.clone())
}

pub struct MaintenanceGuard {
    flag: Arc<AtomicBool>,
}

impl MaintenanceGuard {
    fn begin(flag: Arc<AtomicBool>) -> AppResult<Self> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::new(
                MAINTENANCE_ACTIVE,
                "A restore or reset is already running.",
            ));
        }
        Ok(Self { flag })
    }
}

impl Drop for MaintenanceGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
