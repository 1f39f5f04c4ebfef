use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::SessionManager;
use crate::config::Config;
use crate::content::ContentStore;
use crate::reactions::ReactionLedger;
use crate::users::UserStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub sessions: SessionManager,
    pub users: UserStore,
    pub ledger: ReactionLedger,
    pub content: ContentStore,
}

impl AppState {
    /// Wire every component to the one shared pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        let sessions = SessionManager::new(db.clone(), config.auth.session_ttl())
            .with_policy(config.auth.session_policy);
        let users = UserStore::new(db.clone(), config.auth.bcrypt_cost);
        let ledger = ReactionLedger::new(db.clone());
        let content = ContentStore::new(db.clone());

        Self {
            db,
            config,
            sessions,
            users,
            ledger,
            content,
        }
    }
}
