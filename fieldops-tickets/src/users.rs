use fieldops_core::storage::{load_json, save_json, USERS_KEY};
use fieldops_core::types::{UserProfile, UserRole};
use fieldops_core::{AppContext, CoreError, CoreResult};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing;

/// Stored form of a user; password material never leaves this module.
/// `password_hash` is an argon2 PHC string, salt included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    #[serde(flatten)]
    profile: UserProfile,
    password_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CoreError::Storage(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub struct UserDirectory {
    ctx: AppContext,
    users: RwLock<Vec<UserRecord>>,
}

impl UserDirectory {
    pub async fn load(ctx: AppContext) -> CoreResult<Self> {
        let users: Vec<UserRecord> = load_json(ctx.store.as_ref(), USERS_KEY)
            .await?
            .unwrap_or_default();
        tracing::info!("Loaded {} users", users.len());
        Ok(Self {
            ctx,
            users: RwLock::new(users),
        })
    }

    pub async fn create_user(&self, new: NewUser) -> CoreResult<UserProfile> {
        let role = new.role.unwrap_or(UserRole::FieldEngineer);
        self.insert(new, |_| role).await
    }

    /// Self-service registration. The first account becomes an admin and
    /// everyone after that a field engineer, decided under the write lock
    /// so concurrent first sign-ups cannot both win.
    pub async fn register(&self, new: NewUser) -> CoreResult<UserProfile> {
        self.insert(new, |existing| {
            if existing.is_empty() {
                UserRole::Admin
            } else {
                UserRole::FieldEngineer
            }
        })
        .await
    }

    async fn insert<F>(&self, new: NewUser, role_for: F) -> CoreResult<UserProfile>
    where
        F: FnOnce(&[UserRecord]) -> UserRole,
    {
        let email = normalize_email(&new.email);
        if !email.contains('@') {
            return Err(CoreError::Validation("A valid email is required".to_string()));
        }
        if new.full_name.trim().is_empty() {
            return Err(CoreError::Validation("Full name is required".to_string()));
        }
        if new.password.len() < 6 {
            return Err(CoreError::Validation(
                "Password must be at least 6 characters".to_string(),
            ));
        }
        let password_hash = hash_password(&new.password)?;

        let mut users = self.users.write().await;
        if users.iter().any(|u| u.profile.email == email) {
            return Err(CoreError::Conflict("Email already registered".to_string()));
        }

        let record = UserRecord {
            profile: UserProfile {
                id: uuid::Uuid::new_v4().to_string(),
                email,
                full_name: new.full_name.trim().to_string(),
                role: role_for(users.as_slice()),
                department: new.department,
                phone: new.phone,
                is_active: true,
                created_at: self.ctx.now(),
            },
            password_hash,
        };
        let profile = record.profile.clone();

        users.push(record);
        if let Err(e) = self.persist(&users).await {
            users.pop();
            return Err(e);
        }

        tracing::info!(user_id = %profile.id, role = ?profile.role, "Created user");
        Ok(profile)
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    pub async fn list_users(&self) -> Vec<UserProfile> {
        self.users
            .read()
            .await
            .iter()
            .map(|u| u.profile.clone())
            .collect()
    }

    pub async fn get_user(&self, id: &str) -> CoreResult<UserProfile> {
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.profile.id == id)
            .map(|u| u.profile.clone())
            .ok_or_else(|| CoreError::not_found("User", id))
    }

    pub async fn get_user_by_email(&self, email: &str) -> CoreResult<UserProfile> {
        let email = normalize_email(email);
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.profile.email == email)
            .map(|u| u.profile.clone())
            .ok_or_else(|| CoreError::not_found("User", email))
    }

    /// Batch lookup; unknown ids are skipped.
    pub async fn get_users_by_ids(&self, ids: &[String]) -> HashMap<String, UserProfile> {
        self.users
            .read()
            .await
            .iter()
            .filter(|u| ids.contains(&u.profile.id))
            .map(|u| (u.profile.id.clone(), u.profile.clone()))
            .collect()
    }

    /// Active users holding any of `roles`.
    pub async fn users_with_roles(&self, roles: &[UserRole]) -> Vec<UserProfile> {
        self.users
            .read()
            .await
            .iter()
            .filter(|u| u.profile.is_active && roles.contains(&u.profile.role))
            .map(|u| u.profile.clone())
            .collect()
    }

    pub async fn update_user(&self, id: &str, update: UserUpdate) -> CoreResult<UserProfile> {
        let mut users = self.users.write().await;
        let pos = users
            .iter()
            .position(|u| u.profile.id == id)
            .ok_or_else(|| CoreError::not_found("User", id))?;

        let previous = users[pos].clone();
        let profile = &mut users[pos].profile;
        if let Some(name) = update.full_name {
            if name.trim().is_empty() {
                return Err(CoreError::Validation("Full name is required".to_string()));
            }
            profile.full_name = name.trim().to_string();
        }
        if let Some(role) = update.role {
            profile.role = role;
        }
        if update.department.is_some() {
            profile.department = update.department;
        }
        if update.phone.is_some() {
            profile.phone = update.phone;
        }
        if let Some(active) = update.is_active {
            profile.is_active = active;
        }
        let updated = profile.clone();

        if let Err(e) = self.persist(&users).await {
            users[pos] = previous;
            return Err(e);
        }
        Ok(updated)
    }

    pub async fn delete_user_by_id(&self, id: &str) -> CoreResult<UserProfile> {
        self.delete_where(|u| u.profile.id == id)
            .await?
            .ok_or_else(|| CoreError::not_found("User", id))
    }

    pub async fn delete_user_by_email(&self, email: &str) -> CoreResult<UserProfile> {
        let email = normalize_email(email);
        self.delete_where(|u| u.profile.email == email)
            .await?
            .ok_or_else(|| CoreError::not_found("User", email.clone()))
    }

    async fn delete_where<F>(&self, pred: F) -> CoreResult<Option<UserProfile>>
    where
        F: Fn(&UserRecord) -> bool,
    {
        let mut users = self.users.write().await;
        let Some(pos) = users.iter().position(|u| pred(u)) else {
            return Ok(None);
        };
        let removed = users.remove(pos);
        if let Err(e) = self.persist(&users).await {
            users.insert(pos, removed);
            return Err(e);
        }
        tracing::info!(user_id = %removed.profile.id, "Deleted user");
        Ok(Some(removed.profile))
    }

    /// `Unauthorized` for unknown email, wrong password or inactive account.
    pub async fn authenticate(&self, email: &str, password: &str) -> CoreResult<UserProfile> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        let record = users
            .iter()
            .find(|u| u.profile.email == email)
            .ok_or(CoreError::Unauthorized)?;

        if !verify_password(password, &record.password_hash) {
            tracing::debug!("Password mismatch for {}", email);
            return Err(CoreError::Unauthorized);
        }
        if !record.profile.is_active {
            return Err(CoreError::Unauthorized);
        }
        Ok(record.profile.clone())
    }

    async fn persist(&self, users: &[UserRecord]) -> CoreResult<()> {
        save_json(self.ctx.store.as_ref(), USERS_KEY, users).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, new_user};

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let dir = UserDirectory::load(context().0).await.unwrap();
        dir.create_user(new_user("ana@example.com", UserRole::Admin))
            .await
            .unwrap();
        let err = dir
            .create_user(new_user(" ANA@example.com ", UserRole::Supervisor))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn authenticate_checks_password_and_active_flag() {
        let dir = UserDirectory::load(context().0).await.unwrap();
        let user = dir
            .create_user(new_user("eng@example.com", UserRole::FieldEngineer))
            .await
            .unwrap();

        assert_eq!(
            dir.authenticate("eng@example.com", "secret-pass").await.unwrap().id,
            user.id
        );
        assert!(matches!(
            dir.authenticate("eng@example.com", "wrong").await,
            Err(CoreError::Unauthorized)
        ));
        assert!(matches!(
            dir.authenticate("nobody@example.com", "secret-pass").await,
            Err(CoreError::Unauthorized)
        ));

        dir.update_user(
            &user.id,
            UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(dir.authenticate("eng@example.com", "secret-pass").await.is_err());
    }

    #[tokio::test]
    async fn password_material_is_not_in_profiles() {
        let (ctx, _) = context();
        let dir = UserDirectory::load(ctx.clone()).await.unwrap();
        let user = dir
            .create_user(new_user("x@example.com", UserRole::Supervisor))
            .await
            .unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());

        let stored = dir.users.read().await[0].password_hash.clone();
        assert!(stored.starts_with("$argon2"));
        assert!(!stored.contains("secret-pass"));

        // but it is persisted, so a reload can still authenticate
        let reloaded = UserDirectory::load(ctx).await.unwrap();
        assert!(reloaded.authenticate("x@example.com", "secret-pass").await.is_ok());
    }

    #[tokio::test]
    async fn lookups_and_deletes() {
        let dir = UserDirectory::load(context().0).await.unwrap();
        let a = dir
            .create_user(new_user("a@example.com", UserRole::Admin))
            .await
            .unwrap();
        let b = dir
            .create_user(new_user("b@example.com", UserRole::FieldEngineer))
            .await
            .unwrap();

        let found = dir
            .get_users_by_ids(&[a.id.clone(), "ghost".to_string()])
            .await;
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&a.id));

        let managers = dir
            .users_with_roles(&[UserRole::Admin, UserRole::Supervisor])
            .await;
        assert_eq!(managers.len(), 1);

        assert_eq!(dir.get_user_by_email("B@example.com").await.unwrap().id, b.id);
        dir.delete_user_by_email("b@example.com").await.unwrap();
        assert!(matches!(
            dir.get_user(&b.id).await,
            Err(CoreError::NotFound { .. })
        ));
        dir.delete_user_by_id(&a.id).await.unwrap();
        assert!(dir.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_first_registrations_make_one_admin() {
        let dir = UserDirectory::load(context().0).await.unwrap();
        let (a, b) = tokio::join!(
            dir.register(new_user("first@example.com", UserRole::Admin)),
            dir.register(new_user("second@example.com", UserRole::Admin)),
        );
        let roles = [a.unwrap().role, b.unwrap().role];
        assert_eq!(roles.iter().filter(|r| **r == UserRole::Admin).count(), 1);
        assert!(roles.contains(&UserRole::FieldEngineer));
    }

    #[tokio::test]
    async fn rejects_weak_input() {
        let dir = UserDirectory::load(context().0).await.unwrap();
        let mut bad = new_user("no-at-sign", UserRole::Admin);
        assert!(matches!(
            dir.create_user(bad.clone()).await,
            Err(CoreError::Validation(_))
        ));
        bad.email = "ok@example.com".to_string();
        bad.password = "123".to_string();
        assert!(matches!(
            dir.create_user(bad).await,
            Err(CoreError::Validation(_))
        ));
    }
}
