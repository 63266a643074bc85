use super::{
    Movie, MovieFilter, MovieStore, PermissionStore, Permissions, Scope, StoreError, Token,
    TokenRecord, TokenStore, User, UserStore,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::SystemTime;

#[derive(Default)]
pub struct MemoryTokens {
    by_hash: DashMap<[u8; 32], (Scope, TokenRecord)>,
}

impl MemoryTokens {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokens {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        self.by_hash.insert(
            token.hash,
            (
                token.scope,
                TokenRecord {
                    owner: token.owner,
                    expiry: token.expiry,
                },
            ),
        );
        Ok(())
    }

    async fn lookup(&self, hash: &[u8; 32], scope: Scope) -> Result<TokenRecord, StoreError> {
        let now = SystemTime::now();
        match self.by_hash.get(hash) {
            Some(entry) if entry.0 == scope && entry.1.expiry > now => Ok(entry.1),
            _ => Err(StoreError::RecordNotFound),
        }
    }

    async fn delete_all_for_owner(&self, scope: Scope, owner: i64) -> Result<(), StoreError> {
        self.by_hash
            .retain(|_, (s, rec)| !(*s == scope && rec.owner == owner));
        Ok(())
    }
}

pub struct MemoryUsers {
    next_id: AtomicI64,
    users: DashMap<i64, User>,
    by_email: DashMap<String, i64>,
}

impl Default for MemoryUsers {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            users: DashMap::new(),
            by_email: DashMap::new(),
        }
    }
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn insert(&self, mut user: User) -> Result<User, StoreError> {
        match self.by_email.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                user.id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }

    async fn get(&self, id: i64) -> Result<User, StoreError> {
        self.users
            .get(&id)
            .map(|u| u.value().clone())
            .ok_or(StoreError::RecordNotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let id = *self.by_email.get(email).ok_or(StoreError::RecordNotFound)?;
        self.get(id).await
    }
}

#[derive(Default)]
pub struct MemoryPermissions {
    grants: DashMap<i64, Vec<String>>,
}

impl MemoryPermissions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissions {
    async fn permissions_for(&self, user_id: i64) -> Result<Permissions, StoreError> {
        Ok(self
            .grants
            .get(&user_id)
            .map(|codes| Permissions::new(codes.iter().cloned()))
            .unwrap_or_default())
    }

    async fn grant(&self, user_id: i64, codes: &[String]) -> Result<(), StoreError> {
        let mut held = self.grants.entry(user_id).or_default();
        for code in codes {
            if !held.contains(code) {
                held.push(code.clone());
            }
        }
        Ok(())
    }
}

pub struct MemoryMovies {
    next_id: AtomicI64,
    movies: DashMap<i64, Movie>,
}

impl Default for MemoryMovies {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            movies: DashMap::new(),
        }
    }
}

impl MemoryMovies {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MovieStore for MemoryMovies {
    async fn insert(&self, mut movie: Movie) -> Result<Movie, StoreError> {
        movie.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        movie.version = 1;
        movie.created_at = SystemTime::now();
        self.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        if id < 1 {
            return Err(StoreError::RecordNotFound);
        }
        self.movies
            .get(&id)
            .map(|m| m.value().clone())
            .ok_or(StoreError::RecordNotFound)
    }

    async fn update(&self, mut movie: Movie) -> Result<Movie, StoreError> {
        // A row deleted since it was read is reported the same as a version race.
        let Some(mut stored) = self.movies.get_mut(&movie.id) else {
            return Err(StoreError::EditConflict);
        };
        if stored.version != movie.version {
            return Err(StoreError::EditConflict);
        }
        movie.version += 1;
        movie.created_at = stored.created_at;
        *stored = movie.clone();
        Ok(movie)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::RecordNotFound);
        }
        self.movies
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::RecordNotFound)
    }

    async fn list(&self, filter: &MovieFilter) -> Result<Vec<Movie>, StoreError> {
        let title = filter.title.to_lowercase();
        let mut found: Vec<Movie> = self
            .movies
            .iter()
            .filter(|m| title.is_empty() || m.title.to_lowercase().contains(&title))
            .filter(|m| filter.genres.iter().all(|g| m.genres.contains(g)))
            .map(|m| m.value().clone())
            .collect();
        found.sort_unstable_by_key(|m| m.id);

        let offset = (filter.page.saturating_sub(1)).saturating_mul(filter.page_size);
        Ok(found
            .into_iter()
            .skip(offset)
            .take(filter.page_size)
            .collect())
    }
}
