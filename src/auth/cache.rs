use std::path::PathBuf;

use crate::auth::token::TokenPair;
use crate::error::HomelinkError;

pub fn cache_path(profile: &str) -> PathBuf {
    let base = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".homelink")
        .join(profile);
    base.join("tokens.json")
}

pub fn load_cached_pair(profile: &str) -> Option<TokenPair> {
    let path = cache_path(profile);
    let data = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn save_pair(profile: &str, pair: &TokenPair) -> Result<(), HomelinkError> {
    let path = cache_path(profile);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| HomelinkError::Configuration(format!("cannot create token cache: {e}")))?;
    }
    let data = serde_json::to_string_pretty(pair)
        .map_err(|e| HomelinkError::Payload(format!("failed to serialize token pair: {e}")))?;
    std::fs::write(&path, data)
        .map_err(|e| HomelinkError::Configuration(format!("cannot write token cache: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_structure() {
        let path = cache_path("main-home");
        let path_str = path.to_string_lossy();
        assert!(path_str.contains(".homelink"));
        assert!(path_str.contains("main-home"));
        assert!(path_str.ends_with("tokens.json"));
    }

    #[test]
    fn cache_path_different_profiles() {
        assert_ne!(cache_path("profile-a"), cache_path("profile-b"));
    }

    #[test]
    fn load_nonexistent_returns_none() {
        assert!(load_cached_pair("nonexistent-test-profile-xyz").is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let profile = "test-roundtrip-token-cache";
        let pair = TokenPair {
            access_token: "test-access".into(),
            refresh_token: Some("test-refresh".into()),
            expires_at: None,
        };

        save_pair(profile, &pair).unwrap();
        let loaded = load_cached_pair(profile).unwrap();

        assert_eq!(loaded.access_token, "test-access");
        assert_eq!(loaded.refresh_token.as_deref(), Some("test-refresh"));

        // Clean up
        let path = cache_path(profile);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(path.parent().unwrap());
    }
}
