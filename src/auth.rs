use crate::error::{AUTH_INVALID_CREDENTIALS, VALIDATION_DUPLICATE};
use crate::model::{Actor, AuditAction, User};
use crate::repo::{fold_name, Saved};
use crate::state::AppState;
use crate::{AppError, AppResult};

const LOGIN_TARGET: &str = "System";

/// Check `name`/`password` against the `users` collection and audit the login.
pub async fn login(state: &AppState, name: &str, password: &str) -> AppResult<User> {
    let user = state
        .users
        .find_by_name(name)
        .await?
        .filter(|user| user.password.as_deref() == Some(password));

    let Some(user) = user else {
        tracing::warn!(target: "ironward", event = "login_failed", user = %name.trim());
        return Err(AppError::new(
            AUTH_INVALID_CREDENTIALS,
            "Username or password is incorrect",
        ));
    };

    state
        .audit
        .record(AuditAction::Login, LOGIN_TARGET, &Actor::from(&user))
        .await;
    Ok(user)
}

pub async fn logout(state: &AppState, user: &User) {
    state
        .audit
        .record(AuditAction::Logout, LOGIN_TARGET, &Actor::from(user))
        .await;
}

/// Add an account; names are unique ignoring case and width.
pub async fn add_user(state: &AppState, draft: User, actor: &Actor) -> AppResult<Saved<User>> {
    let wanted = fold_name(&draft.name);
    let taken = state
        .users
        .get_all()
        .await?
        .iter()
        .any(|user| fold_name(&user.name) == wanted);
    if taken {
        return Err(
            AppError::new(VALIDATION_DUPLICATE, "A user with this name already exists")
                .with_context("field", "name")
                .with_context("name", draft.name.clone()),
        );
    }
    state.users.add(draft, actor).await
}
