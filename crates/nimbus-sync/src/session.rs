//! # Session
//!
//! App credentials plus the active user's auth token. One per [`Client`],
//! shared by `Arc` with every collection it hands out.
//!
//! [`Client`]: crate::client::Client

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::AppConfig;

/// The active user, as far as request signing cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUser {
    pub id: String,
    pub authtoken: String,
}

#[derive(Debug)]
pub struct Session {
    app_key: String,
    app_secret: String,
    master_secret: Option<String>,
    active_user: RwLock<Option<ActiveUser>>,
}

impl Session {
    pub fn new(app: &AppConfig) -> Self {
        Session {
            app_key: app.key.clone(),
            app_secret: app.secret.clone(),
            master_secret: app.master_secret.clone(),
            active_user: RwLock::new(None),
        }
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    pub fn app_secret(&self) -> &str {
        &self.app_secret
    }

    pub fn master_secret(&self) -> Option<&str> {
        self.master_secret.as_deref()
    }

    pub async fn active_user(&self) -> Option<ActiveUser> {
        self.active_user.read().await.clone()
    }

    /// Auth token of the active user, if one is signed in.
    pub async fn authtoken(&self) -> Option<String> {
        self.active_user
            .read()
            .await
            .as_ref()
            .map(|user| user.authtoken.clone())
    }

    /// Replaces the active user. `None` signs out.
    pub async fn set_active_user(&self, user: Option<ActiveUser>) {
        debug!(user_id = ?user.as_ref().map(|u| u.id.as_str()), "Active user changed");
        *self.active_user.write().await = user;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_active_user_lifecycle() {
        let session = Session::new(&AppConfig {
            key: "kid_app".into(),
            secret: "s".into(),
            master_secret: None,
        });
        assert!(session.authtoken().await.is_none());

        session
            .set_active_user(Some(ActiveUser {
                id: "u1".into(),
                authtoken: "tok".into(),
            }))
            .await;
        assert_eq!(session.authtoken().await.as_deref(), Some("tok"));

        session.set_active_user(None).await;
        assert!(session.active_user().await.is_none());
        assert_eq!(session.app_key(), "kid_app");
    }
}
