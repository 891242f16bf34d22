use std::io;
use std::path::PathBuf;

use tokio::fs;
use tracing::{info, warn};

/// Profile pictures on local disk, laid out as `user_profiles/{uid}.jpg`
/// under the storage root.
#[derive(Debug, Clone)]
pub struct ProfileImages {
    root: PathBuf,
}

impl ProfileImages {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `None` for ids that would escape the profile directory.
    pub fn image_path(&self, user_id: &str) -> Option<PathBuf> {
        if user_id.is_empty() || user_id.contains(['/', '\\']) || user_id.starts_with('.') {
            return None;
        }
        Some(self.root.join("user_profiles").join(format!("{}.jpg", user_id)))
    }

    /// Remove the user's profile image. A missing image is not an error;
    /// returns whether a file was actually removed.
    pub async fn delete(&self, user_id: &str) -> io::Result<bool> {
        let Some(path) = self.image_path(user_id) else {
            warn!("Refusing to delete profile image for suspicious id {:?}", user_id);
            return Ok(false);
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted profile image for user {}", user_id);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No profile image for user {}", user_id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deletes_existing_image_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let images = ProfileImages::new(dir.path());
        let path = images.image_path("u1").unwrap();
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"jpeg").await.unwrap();

        assert!(images.delete("u1").await.unwrap());
        assert!(!path.exists());
        assert!(!images.delete("u1").await.unwrap());
        assert!(!images.delete("never-uploaded").await.unwrap());
    }

    #[test]
    fn path_traversal_ids_are_rejected() {
        let images = ProfileImages::new("/srv/storage");
        assert!(images.image_path("../etc/passwd").is_none());
        assert!(images.image_path("a/b").is_none());
        assert!(images.image_path("").is_none());
        assert_eq!(
            images.image_path("u1").unwrap(),
            PathBuf::from("/srv/storage/user_profiles/u1.jpg")
        );
    }
}
