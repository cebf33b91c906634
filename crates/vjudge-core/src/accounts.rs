//! Loads the process-lifetime accounts table from `OJ_CONFIG` (spec §3,
//! §6.4). Read-only after startup (spec §9: "no reload mechanism
//! specified").

use std::path::Path;

use vjudge_common::AccountTable;

use crate::error::{CoreError, CoreResult};

/// Load the accounts table from the JSON document at `path`.
pub async fn load(path: impl AsRef<Path>) -> CoreResult<AccountTable> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::Queue(format!("reading OJ_CONFIG {}: {e}", path.display())))?;

    let table: AccountTable = serde_json::from_str(&contents)
        .map_err(|e| CoreError::Queue(format!("parsing OJ_CONFIG {}: {e}", path.display())))?;

    if table.is_empty() {
        tracing::warn!(path = %path.display(), "OJ_CONFIG has no accounts configured");
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn loads_normal_and_contest_accounts() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("vjudge-oj-config-{}.json", uuid::Uuid::new_v4()));
        let mut f = tokio::fs::File::create(&path).await.unwrap();
        f.write_all(
            br#"{
                "normal_accounts": {"hdu": [{"username": "a", "password": "b"}]},
                "contest_accounts": {"hdu_ct_1": [{"username": "c", "password": "d"}]}
            }"#,
        )
        .await
        .unwrap();

        let table = load(&path).await.unwrap();
        assert!(table.normal_accounts.contains_key("hdu"));
        assert!(table.contest_accounts.contains_key("hdu_ct_1"));

        tokio::fs::remove_file(&path).await.ok();
    }
}
