//! Users, roles and session tokens.
//!
//! The first user to sign up becomes `admin`; later sign-ups start out
//! `disabled` until an administrator assigns a role. Session requests are
//! authorized against the caller's *current* stored role, so a role change
//! takes effect on the next request without re-issuing tokens, and deleting
//! an account ends its sessions. API tokens carry their own role.

use chrono::{Duration, Utc};
use grendel_auth::{
    hash_password, is_allowed, verify_password, AuthError, HmacValidator, IssuedToken, TokenKind,
};
use grendel_store::{Permission, Role, Store, User, ROLE_ADMIN, ROLE_DISABLED};

use crate::error::{ControlError, Result};
use crate::events;
use crate::inventory::validate_name;
use crate::types::{AuthContext, MutationResult, TokenResponse, UserView};

/// Lifetime used for `expire = "infinite"` API tokens (100 years).
const INFINITE_TTL_DAYS: i64 = 365 * 100;

const MIN_PASSWORD_LEN: usize = 8;

fn token_response(issued: IssuedToken, username: &str, role: &str) -> TokenResponse {
    TokenResponse {
        token: issued.token,
        username: username.to_string(),
        role: role.to_string(),
        expires_at: issued.expires_at,
    }
}

fn issue(validator: &HmacValidator, username: &str, role: &str) -> Result<TokenResponse> {
    let issued = validator.issue(username, role, None)?;
    Ok(token_response(issued, username, role))
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ControlError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Check credentials and issue a session token.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` for an unknown user or a wrong
/// password.
pub fn signin<S: Store + ?Sized>(
    store: &S,
    validator: &HmacValidator,
    username: &str,
    password: &str,
) -> Result<TokenResponse> {
    let Some(user) = store.get_user(username)? else {
        tracing::info!(username, "Sign-in for unknown user");
        return Err(AuthError::InvalidCredentials.into());
    };
    if let Err(e) = verify_password(password, &user.hash) {
        tracing::info!(username, "Sign-in with wrong password");
        return Err(e.into());
    }

    tracing::info!(username, role = %user.role, "User signed in");
    issue(validator, &user.username, &user.role)
}

/// Create a user and issue a session token for it.
///
/// # Errors
///
/// Returns `ControlError::Validation` for a bad name or short password and
/// `ControlError::Conflict` if the user already exists.
pub fn signup<S: Store + ?Sized>(
    store: &S,
    validator: &HmacValidator,
    username: &str,
    password: &str,
) -> Result<TokenResponse> {
    validate_name(username).map_err(ControlError::Validation)?;
    validate_password(password)?;
    if store.get_user(username)?.is_some() {
        return Err(ControlError::Conflict(format!("user {username} already exists")));
    }

    let role = if store.count_users()? == 0 {
        ROLE_ADMIN
    } else {
        ROLE_DISABLED
    };
    let now = Utc::now();
    store.put_user(&User {
        username: username.to_string(),
        hash: hash_password(password)?,
        role: role.to_string(),
        created_at: now,
        modified_at: now,
    })?;

    tracing::info!(username, role, "User signed up");
    events::info(
        store,
        &AuthContext::new(username, role),
        format!("User {username} signed up with role {role}"),
    );
    issue(validator, username, role)
}

/// Change a user's password. Only the user itself or an admin may do this.
///
/// # Errors
///
/// Returns `ControlError::Forbidden`, `ControlError::NotFound` or a
/// validation error.
pub fn reset_password<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    username: &str,
    password: &str,
) -> Result<MutationResult> {
    if actor.username != username && actor.role != ROLE_ADMIN {
        return Err(ControlError::Forbidden(format!(
            "{} may not reset the password of {username}",
            actor.username
        )));
    }
    validate_password(password)?;

    let mut user = store
        .get_user(username)?
        .ok_or_else(|| ControlError::not_found("user", username))?;
    user.hash = hash_password(password)?;
    user.modified_at = Utc::now();
    store.put_user(&user)?;

    tracing::info!(username, actor = %actor.username, "Password reset");
    events::info(store, actor, format!("Reset password of {username}"));
    Ok(MutationResult::new("Password reset", format!("password of {username} changed"), 1))
}

/// Parse a token lifetime: plain seconds, a number with an `s`, `m`, `h` or
/// `d` suffix, or `infinite`.
///
/// # Errors
///
/// Returns `ControlError::Validation` for anything else, or a zero lifetime.
pub fn parse_expire(expire: &str) -> Result<Duration> {
    let expire = expire.trim();
    if expire.eq_ignore_ascii_case("infinite") {
        return Ok(Duration::days(INFINITE_TTL_DAYS));
    }

    let invalid = || ControlError::Validation(format!("invalid token expiry {expire:?}"));
    let (digits, unit) = match expire.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&expire[..i], c),
        _ => (expire, 's'),
    };
    let value: i64 = digits.parse().map_err(|_| invalid())?;
    if value <= 0 {
        return Err(invalid());
    }

    let duration = match unit.to_ascii_lowercase() {
        's' => Duration::try_seconds(value),
        'm' => Duration::try_minutes(value),
        'h' => Duration::try_hours(value),
        'd' => Duration::try_days(value),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

/// Issue an API token for an arbitrary username and role.
///
/// # Errors
///
/// Returns `ControlError::NotFound` if the role does not exist, or a
/// validation error for a bad name or expiry.
pub fn issue_api_token<S: Store + ?Sized>(
    store: &S,
    validator: &HmacValidator,
    actor: &AuthContext,
    username: &str,
    role: &str,
    expire: &str,
) -> Result<TokenResponse> {
    validate_name(username).map_err(ControlError::Validation)?;
    let ttl = parse_expire(expire)?;
    if store.get_role(role)?.is_none() {
        return Err(ControlError::not_found("role", role));
    }

    let token = token_response(validator.issue_api(username, role, ttl)?, username, role);
    tracing::info!(username, role, expires_at = %token.expires_at, "Issued API token");
    events::info(
        store,
        actor,
        format!("Issued API token for {username} with role {role}"),
    );
    Ok(token)
}

/// Check that the caller's role allows `method` on `path`.
///
/// Sessions use the role stored on the account now; API tokens use the role
/// they were issued with. Returns the caller with the effective role.
///
/// # Errors
///
/// Returns `ControlError::Unauthorized` if a session's account or the role
/// no longer exists and `ControlError::Forbidden` if no grant covers the
/// request.
pub fn authorize<S: Store + ?Sized>(
    store: &S,
    caller: &AuthContext,
    method: &str,
    path: &str,
) -> Result<AuthContext> {
    let role_name = match caller.kind {
        TokenKind::Session => {
            let Some(user) = store.get_user(&caller.username)? else {
                tracing::info!(user = %caller.username, "Session of a deleted user");
                return Err(ControlError::Unauthorized(format!(
                    "user {} no longer exists",
                    caller.username
                )));
            };
            user.role
        }
        TokenKind::Api => caller.role.clone(),
    };
    let Some(role) = store.get_role(&role_name)? else {
        return Err(ControlError::Unauthorized(format!(
            "role {role_name} no longer exists"
        )));
    };

    let grants = role
        .permissions
        .iter()
        .map(|p| (p.method.as_str(), p.path.as_str()));
    if !is_allowed(grants, method, path) {
        tracing::info!(
            user = %caller.username,
            role = %role_name,
            method,
            path,
            "Request denied"
        );
        return Err(ControlError::Forbidden(format!(
            "role {role_name} may not {method} {path}"
        )));
    }
    Ok(AuthContext::new(caller.username.clone(), role_name).with_kind(caller.kind))
}

/// All roles, in name order.
///
/// # Errors
///
/// Returns a storage error.
pub fn list_roles<S: Store + ?Sized>(store: &S) -> Result<Vec<Role>> {
    Ok(store.list_roles()?)
}

/// Create a role, copying the permissions of `inherited` if given.
///
/// # Errors
///
/// Returns `ControlError::Conflict` if the role exists and
/// `ControlError::NotFound` if the inherited role does not.
pub fn add_role<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    name: &str,
    inherited: Option<&str>,
) -> Result<MutationResult> {
    validate_name(name).map_err(ControlError::Validation)?;
    if store.get_role(name)?.is_some() {
        return Err(ControlError::Conflict(format!("role {name} already exists")));
    }
    let permissions = match inherited.filter(|r| !r.is_empty()) {
        Some(parent) => {
            store
                .get_role(parent)?
                .ok_or_else(|| ControlError::not_found("role", parent))?
                .permissions
        }
        None => Vec::new(),
    };

    store.put_role(&Role {
        name: name.to_string(),
        permissions,
    })?;
    tracing::info!(role = name, inherited, "Added role");
    events::info(store, actor, format!("Added role {name}"));
    Ok(MutationResult::new("Role added", format!("role {name} added"), 1))
}

fn validate_permission(permission: &Permission) -> std::result::Result<(), String> {
    let method = permission.method.as_str();
    if method != "*" && (method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic())) {
        return Err(format!("invalid method {method:?}"));
    }
    let path = permission.path.as_str();
    if path != "*" && !path.starts_with('/') {
        return Err(format!("invalid path {path:?}, expected a leading /"));
    }
    Ok(())
}

/// Replace the permissions of a custom role.
///
/// # Errors
///
/// Returns `ControlError::Conflict` for built-in roles,
/// `ControlError::NotFound` for unknown roles and a validation error for
/// malformed permissions.
pub fn edit_role<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    name: &str,
    mut permissions: Vec<Permission>,
) -> Result<MutationResult> {
    if Role::is_builtin(name) {
        return Err(ControlError::Conflict(format!("built-in role {name} cannot be edited")));
    }
    let mut role = store
        .get_role(name)?
        .ok_or_else(|| ControlError::not_found("role", name))?;
    for permission in &mut permissions {
        validate_permission(permission).map_err(ControlError::Validation)?;
        permission.method = permission.method.to_ascii_uppercase();
    }
    permissions.dedup();

    let changed = usize::from(role.permissions != permissions);
    role.permissions = permissions;
    store.put_role(&role)?;

    tracing::info!(role = name, grants = role.permissions.len(), "Edited role");
    events::info(store, actor, format!("Edited permissions of role {name}"));
    Ok(MutationResult::new(
        "Role updated",
        format!("role {name} has {} permission(s)", role.permissions.len()),
        changed,
    ))
}

/// Delete custom roles that no user holds.
///
/// # Errors
///
/// Returns `ControlError::Conflict` if a name is a built-in role or is still
/// assigned to a user. Nothing is deleted in that case.
pub fn delete_roles<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    names: &[String],
) -> Result<MutationResult> {
    let users = store.list_users()?;
    for name in names {
        if Role::is_builtin(name) {
            return Err(ControlError::Conflict(format!("built-in role {name} cannot be deleted")));
        }
        if let Some(user) = users.iter().find(|u| &u.role == name) {
            return Err(ControlError::Conflict(format!(
                "role {name} is assigned to user {}",
                user.username
            )));
        }
    }

    let mut changed = 0;
    for name in names {
        if store.delete_role(name)? {
            changed += 1;
        }
    }
    tracing::info!(changed, "Deleted roles");
    events::info(store, actor, format!("Deleted {changed} role(s)"));
    Ok(MutationResult::new("Roles deleted", format!("{changed} role(s) deleted"), changed))
}

/// All users, in name order, without password hashes.
///
/// # Errors
///
/// Returns a storage error.
pub fn list_users<S: Store + ?Sized>(store: &S) -> Result<Vec<UserView>> {
    Ok(store.list_users()?.into_iter().map(UserView::from).collect())
}

/// Reject a change that would leave no user with the admin role.
fn ensure_admin_remains(users: &[User], affected: &[String], new_role: Option<&str>) -> Result<()> {
    if new_role == Some(ROLE_ADMIN) {
        return Ok(());
    }
    let had_admin = users.iter().any(|u| u.role == ROLE_ADMIN);
    let admin_remains = users
        .iter()
        .any(|u| u.role == ROLE_ADMIN && !affected.contains(&u.username));
    if had_admin && !admin_remains {
        return Err(ControlError::Conflict(
            "at least one user must keep the admin role".to_string(),
        ));
    }
    Ok(())
}

/// Assign `role` to the named users. Unknown users are ignored.
///
/// # Errors
///
/// Returns `ControlError::NotFound` if the role does not exist and
/// `ControlError::Conflict` if no admin would remain.
pub fn set_user_role<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    names: &[String],
    role: &str,
) -> Result<MutationResult> {
    if store.get_role(role)?.is_none() {
        return Err(ControlError::not_found("role", role));
    }
    let users = store.list_users()?;
    ensure_admin_remains(&users, names, Some(role))?;

    let now = Utc::now();
    let mut changed = 0;
    for mut user in users.into_iter().filter(|u| names.contains(&u.username)) {
        if user.role == role {
            continue;
        }
        user.role = role.to_string();
        user.modified_at = now;
        store.put_user(&user)?;
        changed += 1;
    }

    tracing::info!(role, changed, "Changed user roles");
    events::info(store, actor, format!("Set role {role} on {changed} user(s)"));
    Ok(MutationResult::new(
        "Users updated",
        format!("role {role} set on {changed} user(s)"),
        changed,
    ))
}

/// Delete the named users. Unknown users are ignored.
///
/// # Errors
///
/// Returns `ControlError::Conflict` if no admin would remain.
pub fn delete_users<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    names: &[String],
) -> Result<MutationResult> {
    ensure_admin_remains(&store.list_users()?, names, None)?;

    let mut changed = 0;
    for name in names {
        if store.delete_user(name)? {
            changed += 1;
        }
    }
    tracing::info!(changed, "Deleted users");
    events::info(store, actor, format!("Deleted {changed} user(s)"));
    Ok(MutationResult::new("Users deleted", format!("{changed} user(s) deleted"), changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grendel_auth::{AuthConfig, JwtValidator};
    use grendel_store::{RocksStore, ROLE_USER};
    use tempfile::TempDir;

    fn setup() -> (RocksStore, TempDir, HmacValidator) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let validator = HmacValidator::new(&AuthConfig::with_secret(
            b"session-secret-0123456789".to_vec(),
        ));
        (store, dir, validator)
    }

    fn admin() -> AuthContext {
        AuthContext::new("root", ROLE_ADMIN)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn first_signup_is_admin_then_disabled() {
        let (store, _dir, validator) = setup();

        let first = signup(&store, &validator, "root", "correct horse").unwrap();
        assert_eq!(first.role, ROLE_ADMIN);
        let claims = validator.validate(&first.token).await.unwrap();
        assert_eq!(claims.username, "root");

        let second = signup(&store, &validator, "alice", "battery staple").unwrap();
        assert_eq!(second.role, ROLE_DISABLED);

        assert!(matches!(
            signup(&store, &validator, "alice", "another password"),
            Err(ControlError::Conflict(_))
        ));
        assert!(matches!(
            signup(&store, &validator, "bob", "short"),
            Err(ControlError::Validation(_))
        ));
    }

    #[test]
    fn signin_checks_password() {
        let (store, _dir, validator) = setup();
        signup(&store, &validator, "root", "correct horse").unwrap();

        let token = signin(&store, &validator, "root", "correct horse").unwrap();
        assert_eq!(token.role, ROLE_ADMIN);
        assert!(matches!(
            signin(&store, &validator, "root", "wrong horse"),
            Err(ControlError::Auth(AuthError::InvalidCredentials))
        ));
        assert!(matches!(
            signin(&store, &validator, "nobody", "correct horse"),
            Err(ControlError::Auth(AuthError::InvalidCredentials))
        ));
    }

    #[test]
    fn reset_is_self_or_admin() {
        let (store, _dir, validator) = setup();
        signup(&store, &validator, "root", "correct horse").unwrap();
        signup(&store, &validator, "alice", "battery staple").unwrap();
        let alice = AuthContext::new("alice", ROLE_USER);

        reset_password(&store, &alice, "alice", "new password 1").unwrap();
        signin(&store, &validator, "alice", "new password 1").unwrap();

        assert!(matches!(
            reset_password(&store, &alice, "root", "hijacked!!"),
            Err(ControlError::Forbidden(_))
        ));
        reset_password(&store, &admin(), "alice", "admin chose this").unwrap();
        signin(&store, &validator, "alice", "admin chose this").unwrap();
    }

    #[test]
    fn expire_formats() {
        assert_eq!(parse_expire("90").unwrap(), Duration::seconds(90));
        assert_eq!(parse_expire("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_expire("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_expire("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_expire("infinite").unwrap(), Duration::days(INFINITE_TTL_DAYS));
        for bad in ["", "0", "-5m", "1w", "soon", "h"] {
            assert!(parse_expire(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn api_token_requires_existing_role() {
        let (store, _dir, validator) = setup();
        let token =
            issue_api_token(&store, &validator, &admin(), "ci-runner", ROLE_USER, "1h").unwrap();
        let claims = validator.validate(&token.token).await.unwrap();
        assert_eq!(claims.role, ROLE_USER);
        assert_eq!(claims.kind, TokenKind::Api);

        assert!(matches!(
            issue_api_token(&store, &validator, &admin(), "ci-runner", "ghost", "1h"),
            Err(ControlError::NotFound { kind: "role", .. })
        ));
    }

    #[test]
    fn authorize_uses_current_role() {
        let (store, _dir, validator) = setup();
        signup(&store, &validator, "root", "correct horse").unwrap();
        signup(&store, &validator, "alice", "battery staple").unwrap();

        // Token says admin, store says disabled.
        let stale = AuthContext::new("alice", ROLE_ADMIN);
        assert!(matches!(
            authorize(&store, &stale, "GET", "/v1/nodes"),
            Err(ControlError::Forbidden(_))
        ));
        authorize(&store, &stale, "POST", "/v1/auth/signout").unwrap();

        set_user_role(&store, &admin(), &names(&["alice"]), ROLE_USER).unwrap();
        let ctx = authorize(&store, &stale, "GET", "/v1/nodes/find").unwrap();
        assert_eq!(ctx.role, ROLE_USER);
        assert!(authorize(&store, &stale, "DELETE", "/v1/nodes").is_err());

        let root = AuthContext::new("root", ROLE_ADMIN);
        authorize(&store, &root, "DELETE", "/v1/nodes").unwrap();
    }

    #[test]
    fn deleted_account_ends_its_sessions() {
        let (store, _dir, validator) = setup();
        signup(&store, &validator, "root", "correct horse").unwrap();
        signup(&store, &validator, "bob", "battery staple").unwrap();
        set_user_role(&store, &admin(), &names(&["bob"]), ROLE_ADMIN).unwrap();
        let bob = AuthContext::new("bob", ROLE_ADMIN);
        authorize(&store, &bob, "DELETE", "/v1/nodes").unwrap();

        delete_users(&store, &admin(), &names(&["bob"])).unwrap();
        assert!(matches!(
            authorize(&store, &bob, "GET", "/v1/nodes"),
            Err(ControlError::Unauthorized(_))
        ));
    }

    #[test]
    fn api_token_keeps_its_own_role() {
        let (store, _dir, validator) = setup();
        signup(&store, &validator, "root", "correct horse").unwrap();

        // Named after an admin account, but issued with the user role.
        let narrow = AuthContext::new("root", ROLE_USER).with_kind(TokenKind::Api);
        let ctx = authorize(&store, &narrow, "GET", "/v1/nodes").unwrap();
        assert_eq!(ctx.role, ROLE_USER);
        assert_eq!(ctx.kind, TokenKind::Api);
        assert!(matches!(
            authorize(&store, &narrow, "DELETE", "/v1/nodes"),
            Err(ControlError::Forbidden(_))
        ));

        let ghost = AuthContext::new("ci", "ghost").with_kind(TokenKind::Api);
        assert!(matches!(
            authorize(&store, &ghost, "GET", "/v1/nodes"),
            Err(ControlError::Unauthorized(_))
        ));
    }

    #[test]
    fn roles_inherit_edit_and_delete() {
        let (store, _dir, validator) = setup();
        signup(&store, &validator, "root", "correct horse").unwrap();
        signup(&store, &validator, "alice", "battery staple").unwrap();

        add_role(&store, &admin(), "operator", Some(ROLE_USER)).unwrap();
        let operator = store.get_role("operator").unwrap().unwrap();
        assert_eq!(operator.permissions.len(), 3);
        assert!(matches!(
            add_role(&store, &admin(), "operator", None),
            Err(ControlError::Conflict(_))
        ));
        assert!(matches!(
            add_role(&store, &admin(), "other", Some("ghost")),
            Err(ControlError::NotFound { .. })
        ));

        let result = edit_role(
            &store,
            &admin(),
            "operator",
            vec![Permission::new("get", "/v1/*"), Permission::new("POST", "/v1/bmc/*")],
        )
        .unwrap();
        assert_eq!(result.changed, 1);
        let operator = store.get_role("operator").unwrap().unwrap();
        assert_eq!(operator.permissions[0].method, "GET");

        assert!(matches!(
            edit_role(&store, &admin(), ROLE_USER, Vec::new()),
            Err(ControlError::Conflict(_))
        ));
        assert!(matches!(
            edit_role(&store, &admin(), "operator", vec![Permission::new("GET", "v1")]),
            Err(ControlError::Validation(_))
        ));

        set_user_role(&store, &admin(), &names(&["alice"]), "operator").unwrap();
        assert!(matches!(
            delete_roles(&store, &admin(), &names(&["operator"])),
            Err(ControlError::Conflict(_))
        ));
        assert!(matches!(
            delete_roles(&store, &admin(), &names(&[ROLE_ADMIN])),
            Err(ControlError::Conflict(_))
        ));

        set_user_role(&store, &admin(), &names(&["alice"]), ROLE_USER).unwrap();
        let result = delete_roles(&store, &admin(), &names(&["operator", "ghost"])).unwrap();
        assert_eq!(result.changed, 1);
        assert!(store.get_role("operator").unwrap().is_none());
    }

    #[test]
    fn last_admin_is_protected() {
        let (store, _dir, validator) = setup();
        signup(&store, &validator, "root", "correct horse").unwrap();
        signup(&store, &validator, "alice", "battery staple").unwrap();

        assert!(matches!(
            set_user_role(&store, &admin(), &names(&["root"]), ROLE_USER),
            Err(ControlError::Conflict(_))
        ));
        assert!(matches!(
            delete_users(&store, &admin(), &names(&["root"])),
            Err(ControlError::Conflict(_))
        ));

        set_user_role(&store, &admin(), &names(&["alice"]), ROLE_ADMIN).unwrap();
        let result = delete_users(&store, &admin(), &names(&["root", "ghost"])).unwrap();
        assert_eq!(result.changed, 1);

        let users = list_users(&store).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");
    }
}
