//! Fixtures shared by the service and router tests.

use std::sync::Arc;

use palaver_shared::clients::storage::FileStorage;
use palaver_shared::middleware::detached_metrics_handle;
use palaver_shared::types::auth::Identity;
use uuid::Uuid;

use crate::config::{AppConfig, StoreBackend};
use crate::models::NewUser;
use crate::services::auth_service;
use crate::store::MemoryStore;
use crate::AppState;

pub const PASSWORD: &str = "hunter2hunter2";

pub async fn test_state() -> Arc<AppState> {
    let upload_dir = std::env::temp_dir().join(format!("palaver-chat-{}", Uuid::new_v4()));
    let config = AppConfig {
        store_backend: StoreBackend::Memory,
        upload_dir: upload_dir.to_string_lossy().into_owned(),
        ..AppConfig::default()
    };
    let storage = FileStorage::new(upload_dir).await.unwrap();

    Arc::new(AppState {
        store: Arc::new(MemoryStore::new()),
        storage,
        config,
        metrics: detached_metrics_handle(),
    })
}

/// Inserts a user straight into the store with [`PASSWORD`].
pub fn seed_user(state: &AppState, username: &str) {
    state
        .store
        .insert_user(NewUser {
            id: Uuid::now_v7(),
            username: username.into(),
            email: format!("{username}@example.com"),
            password_hash: auth_service::hash_password(PASSWORD).unwrap(),
            profile_image: None,
        })
        .unwrap();
}

/// An identity that is not backed by a session record; services never look it up.
pub fn identity(username: &str) -> Identity {
    Identity::new(username, Uuid::now_v7())
}

/// Number of regular files under the upload root.
pub fn stored_files(state: &AppState) -> usize {
    fn count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|entry| {
                        let path = entry.path();
                        if path.is_dir() {
                            count(&path)
                        } else {
                            1
                        }
                    })
                    .sum()
            })
            .unwrap_or(0)
    }
    count(state.storage.root())
}
