use crate::{
    db::{push_id_list, Database, QueryCounter, Tx},
    error::{Result, StoreContext},
};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use uuid::Uuid;
use super::user_models::UserProfile;

/// Read-only access to the platform's user profiles.
#[derive(Clone)]
pub struct UserRepository {
    queries: QueryCounter,
}

impl UserRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            queries: db.queries().clone(),
        }
    }

    pub async fn create(
        &self,
        tx: &mut Tx,
        name: &str,
        username: &str,
        email: &str,
        photo_url: Option<&str>,
    ) -> Result<UserProfile> {
        self.queries.record("users.create");
        let user = sqlx::query_as::<_, UserProfile>(
            "INSERT INTO users (id, name, username, email, photo_url)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, name, username, email, photo_url",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(username)
        .bind(email)
        .bind(photo_url)
        .fetch_one(&mut **tx)
        .await
        .context("users.create")?;

        Ok(user)
    }

    pub async fn find_by_id(&self, tx: &mut Tx, user_id: Uuid) -> Result<Option<UserProfile>> {
        self.queries.record("users.find_by_id");
        let user = sqlx::query_as::<_, UserProfile>(
            "SELECT id, name, username, email, photo_url FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .context("users.find_by_id")?;

        Ok(user)
    }

    /// Profiles for every id that exists, keyed by id. Missing ids are simply absent.
    pub async fn find_many(
        &self,
        tx: &mut Tx,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, UserProfile>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.queries.record("users.find_many");
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, username, email, photo_url FROM users WHERE id IN ",
        );
        push_id_list(&mut qb, user_ids);

        let users = qb
            .build_query_as::<UserProfile>()
            .fetch_all(&mut **tx)
            .await
            .context("users.find_many")?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }
}
