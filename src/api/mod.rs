mod account;
mod error;
mod session;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::email::Mailer;
use crate::identity::Identity;
use crate::otp::Passcodes;
use crate::session::SessionService;

pub use account::AccountState;
pub use session::SessionState;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    sessions: SessionService,
    mailer: Arc<dyn Mailer>,
) -> Router {
    let identity = Identity::new(db.users());
    let passcodes = Passcodes::new(db.otp_codes(), db.users());

    let account_state = AccountState {
        identity,
        users: db.users(),
        temps: db.temp_registrations(),
        passcodes,
        sessions: sessions.clone(),
        mailer,
    };

    let session_state = SessionState { sessions };

    Router::new()
        .nest("/account", account::router(account_state))
        .nest("/session", session::router(session_state))
}
