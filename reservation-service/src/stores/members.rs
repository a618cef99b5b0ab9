use crate::backend::MemberBackend;
use crate::storage::PhotoStorage;
use rand::Rng;
use shared::*;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Local mirror of the `members` table, kept ordered by name.
pub struct MemberStore {
    backend: Arc<dyn MemberBackend>,
    photos: Arc<dyn PhotoStorage>,
    members: RwLock<Option<Vec<Member>>>,
}

/// Random 4-digit code in `1000..=9999`. Not checked against existing codes.
pub fn generate_access_code() -> String {
    rand::thread_rng().gen_range(1000..10000).to_string()
}

fn by_name(a: &Member, b: &Member) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

impl MemberStore {
    pub fn new(backend: Arc<dyn MemberBackend>, photos: Arc<dyn PhotoStorage>) -> Self {
        Self {
            backend,
            photos,
            members: RwLock::new(None),
        }
    }

    pub async fn list(&self) -> StoreResult<Vec<Member>> {
        self.ensure_loaded().await?;
        Ok(self.members.read().await.clone().unwrap_or_default())
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Member> {
        self.list()
            .await?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound("Socio no encontrado".to_string()))
    }

    pub async fn add(&self, name: &str) -> StoreResult<Member> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation(MSG_NAME_REQUIRED.to_string()));
        }
        self.ensure_loaded().await?;

        let code = generate_access_code();
        let created = self.backend.insert_member(name, &code).await.map_err(|e| {
            error!("Error adding member: {}", e);
            e
        })?;

        let mut guard = self.members.write().await;
        let members = guard.get_or_insert_with(Vec::new);
        let at = members
            .binary_search_by(|probe| by_name(probe, &created))
            .unwrap_or_else(|pos| pos);
        members.insert(at, created.clone());
        info!("Member {} added", created.id);
        Ok(created)
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.backend.delete_member(id).await.map_err(|e| {
            error!("Error deleting member {}: {}", id, e);
            e
        })?;
        if let Some(members) = self.members.write().await.as_mut() {
            members.retain(|m| m.id != id);
        }
        info!("Member {} deleted", id);
        Ok(())
    }

    pub async fn update(&self, id: Uuid, update: MemberUpdate) -> StoreResult<Member> {
        if update.is_empty() {
            return Err(StoreError::Validation("No hay cambios que guardar".to_string()));
        }
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(StoreError::Validation(MSG_NAME_REQUIRED.to_string()));
        }
        let update = MemberUpdate {
            name: update.name.map(|n| n.trim().to_string()),
            ..update
        };

        let updated = self
            .backend
            .update_member(id, update.clone())
            .await
            .map_err(|e| {
                error!("Error updating member {}: {}", id, e);
                e
            })?;

        if let Some(members) = self.members.write().await.as_mut() {
            if let Some(local) = members.iter_mut().find(|m| m.id == id) {
                local.apply(&update);
            }
            if update.name.is_some() {
                members.sort_by(by_name);
            }
        }
        Ok(updated)
    }

    /// Stores the photo, then points the member's `photo_url` at its public address.
    pub async fn upload_photo(&self, id: Uuid, file_name: &str, bytes: &[u8]) -> StoreResult<Member> {
        if bytes.is_empty() {
            return Err(StoreError::Validation("El archivo está vacío".to_string()));
        }
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin");
        // Nothing is stored for a member that does not exist.
        self.get(id).await?;
        let nonce: u64 = rand::thread_rng().gen();
        let path = format!("avatars/{}-{}.{}", id, nonce, ext);

        self.photos.upload(&path, bytes).await.map_err(|e| {
            error!("Error uploading photo for member {}: {}", id, e);
            e
        })?;
        let public_url = self.photos.public_url(&path);

        let update = MemberUpdate {
            photo_url: Some(public_url),
            ..Default::default()
        };
        match self.update(id, update).await {
            Ok(member) => Ok(member),
            Err(e) => {
                if let Err(cleanup) = self.photos.remove(&path).await {
                    warn!("Could not remove orphaned photo {}: {}", path, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Exact-match lookup. Every failure yields the same generic message.
    pub async fn check_access(&self, code: &str) -> StoreResult<MemberProfile> {
        let invalid = || StoreError::NotFound(MSG_INVALID_CODE.to_string());
        let code = code.trim();
        if code.is_empty() {
            return Err(invalid());
        }
        match self.backend.find_member_by_code(code).await {
            Ok(Some(member)) => Ok(member.profile()),
            Ok(None) => Err(invalid()),
            Err(e) => {
                warn!("Access check failed: {}", e);
                Err(invalid())
            }
        }
    }

    /// Creates every name not already present. Returns how many were created.
    pub async fn seed(&self, names: &[String]) -> StoreResult<usize> {
        let existing: Vec<String> = self
            .list()
            .await?
            .iter()
            .map(|m| m.name.to_lowercase())
            .collect();

        let mut created = 0;
        let mut seen = existing;
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let key = name.to_lowercase();
            if seen.contains(&key) {
                continue;
            }
            self.add(name).await?;
            seen.push(key);
            created += 1;
        }
        info!("Seed import created {} members", created);
        Ok(created)
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        self.backend.health_check().await
    }

    async fn ensure_loaded(&self) -> StoreResult<()> {
        if self.members.read().await.is_some() {
            return Ok(());
        }
        let mut guard = self.members.write().await;
        if guard.is_none() {
            let mut fetched = self.backend.fetch_members().await.map_err(|e| {
                error!("Error fetching members: {}", e);
                e
            })?;
            fetched.sort_by(by_name);
            info!("Loaded {} members", fetched.len());
            *guard = Some(fetched);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::storage::FsPhotoStorage;

    fn member(name: &str, code: &str) -> Member {
        Member {
            id: Uuid::new_v4(),
            name: name.to_string(),
            access_code: code.to_string(),
            is_admin: false,
            photo_url: None,
        }
    }

    fn store_with(members: Vec<Member>) -> (Arc<InMemoryBackend>, MemberStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(InMemoryBackend::with_members(members));
        let photos = Arc::new(FsPhotoStorage::new(dir.path(), "http://club.local"));
        let store = MemberStore::new(backend.clone(), photos);
        (backend, store, dir)
    }

    fn names(members: &[Member]) -> Vec<&str> {
        members.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn generated_codes_are_four_digits() {
        for _ in 0..500 {
            let code = generate_access_code();
            assert_eq!(code.len(), 4);
            let value: u32 = code.parse().expect("numeric");
            assert!((1000..=9999).contains(&value));
        }
    }

    #[tokio::test]
    async fn add_member_returns_code_and_keeps_name_order() {
        let (_, store, _dir) = store_with(vec![member("Luis", "1111"), member("Berta", "2222")]);
        assert_eq!(names(&store.list().await.expect("list")), vec!["Berta", "Luis"]);

        let ana = store.add("Ana").await.expect("add");
        assert_eq!(ana.access_code.len(), 4);
        assert!(ana.access_code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(
            names(&store.list().await.expect("list")),
            vec!["Ana", "Berta", "Luis"]
        );

        let err = store.add("   ").await.expect_err("empty name");
        assert_eq!(err, StoreError::Validation(MSG_NAME_REQUIRED.to_string()));
    }

    #[tokio::test]
    async fn check_access_matches_exact_code_only() {
        let (backend, store, _dir) = store_with(vec![member("Ana", "4321")]);

        let profile = store.check_access("4321").await.expect("granted");
        assert_eq!(profile.name, "Ana");
        assert_eq!(profile.code, "4321");

        for attempt in ["432", "43210", "4322", ""] {
            let err = store.check_access(attempt).await.expect_err("denied");
            assert_eq!(err, StoreError::NotFound(MSG_INVALID_CODE.to_string()));
        }

        backend.fail_next("timeout").await;
        let err = store.check_access("4321").await.expect_err("backend down");
        assert_eq!(err, StoreError::NotFound(MSG_INVALID_CODE.to_string()));
    }

    #[tokio::test]
    async fn duplicated_code_grants_first_member_by_name() {
        let zoe = member("Zoe", "5555");
        let ana = member("Ana", "5555");
        let (_, store, _dir) = store_with(vec![zoe, ana.clone(), member("Marta", "5555")]);

        let profile = store.check_access("5555").await.expect("granted");
        assert_eq!(profile.id, ana.id);
        assert_eq!(profile.name, "Ana");
    }

    #[tokio::test]
    async fn empty_store_rejects_any_code() {
        let (_, store, _dir) = store_with(vec![]);
        let err = store.check_access("7123").await.expect_err("denied");
        assert_eq!(err.to_string(), "Código incorrecto");
    }

    #[tokio::test]
    async fn update_and_delete_are_mirrored_locally() {
        let zoe = member("Zoe", "1000");
        let (_, store, _dir) = store_with(vec![zoe.clone(), member("Marta", "2000")]);
        store.list().await.expect("load");

        store
            .update(
                zoe.id,
                MemberUpdate {
                    name: Some("Alba".to_string()),
                    is_admin: Some(true),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        let listed = store.list().await.expect("list");
        assert_eq!(names(&listed), vec!["Alba", "Marta"]);
        assert!(listed[0].is_admin);

        let err = store
            .update(zoe.id, MemberUpdate::default())
            .await
            .expect_err("empty update");
        assert!(matches!(err, StoreError::Validation(_)));

        store.delete(zoe.id).await.expect("delete");
        assert_eq!(names(&store.list().await.expect("list")), vec!["Marta"]);
    }

    #[tokio::test]
    async fn upload_photo_sets_public_url() {
        let ana = member("Ana", "1234");
        let (_, store, dir) = store_with(vec![ana.clone()]);
        store.list().await.expect("load");

        let updated = store
            .upload_photo(ana.id, "me.jpg", b"jpeg")
            .await
            .expect("upload");
        let url = updated.photo_url.expect("photo url");
        assert!(url.starts_with(&format!("http://club.local/photos/avatars/{}-", ana.id)));
        assert!(url.ends_with(".jpg"));

        let relative = url.trim_start_matches("http://club.local/photos/");
        assert!(dir.path().join(relative).exists());
        assert_eq!(store.get(ana.id).await.expect("get").photo_url.as_deref(), Some(url.as_str()));
    }

    fn stored_avatars(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path().join("avatars"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn upload_photo_for_unknown_member_stores_nothing() {
        let (_, store, dir) = store_with(vec![member("Ana", "1234")]);

        let err = store
            .upload_photo(Uuid::new_v4(), "me.jpg", b"jpeg")
            .await
            .expect_err("unknown member");
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(stored_avatars(&dir), 0);
    }

    #[tokio::test]
    async fn failed_profile_update_removes_uploaded_photo() {
        let ana = member("Ana", "1234");
        let (backend, store, dir) = store_with(vec![ana.clone()]);
        store.list().await.expect("load");

        backend.fail_next("data service down").await;
        let err = store
            .upload_photo(ana.id, "me.jpg", b"jpeg")
            .await
            .expect_err("update fails");
        assert!(matches!(err, StoreError::Remote(_)));
        assert_eq!(stored_avatars(&dir), 0);
        assert_eq!(store.get(ana.id).await.expect("get").photo_url, None);
    }

    #[tokio::test]
    async fn seed_skips_existing_names() {
        let (_, store, _dir) = store_with(vec![member("Ana", "1234")]);
        let created = store
            .seed(&["ana".to_string(), "Pedro".to_string(), "".to_string(), "Pedro".to_string()])
            .await
            .expect("seed");
        assert_eq!(created, 1);
        assert_eq!(names(&store.list().await.expect("list")), vec!["Ana", "Pedro"]);
    }
}
