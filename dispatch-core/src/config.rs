//! Loading a [`ConfigSnapshot`] from disk.
//!
//! Parsing/loading is explicitly out of scope for the core (spec §1): this module is
//! ambient plumbing so the coordinator can be exercised end to end from a file, mirroring
//! the teacher's own `config::parsers` extension-dispatch and `Config::load`.

use std::path::Path;

use anyhow::bail;

use crate::snapshot::ConfigSnapshot;

pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<ConfigSnapshot> {
    let raw = tokio::fs::read(path.as_ref()).await?;
    parse(extension_of(path.as_ref()), &raw)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn parse(extension: String, raw: &[u8]) -> anyhow::Result<ConfigSnapshot> {
    match extension.as_str() {
        "json" => serde_json::from_slice(raw).map_err(Into::into),
        "toml" => {
            let content = std::str::from_utf8(raw)?;
            toml::from_str(content).map_err(Into::into)
        }
        other => bail!("no parser available for config format {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::parse;

    const JSON: &str = r#"
        {
            "version": "v1",
            "listeners": [{"id":"L1","address":"127.0.0.1:8080","endpoint_id":"E1"}],
            "endpoints": [{"id":"E1","routes":[
                {"app_id":"echo","condition":{"kind":"HTTPPath","path":"/"},"static_data":{}}
            ]}],
            "apps": [{"id":"echo","type":"echo","response":"hello"}]
        }
    "#;

    const TOML: &str = r#"
        version = "v1"

        [[listeners]]
        id = "L1"
        address = "127.0.0.1:8080"
        endpoint_id = "E1"

        [[endpoints]]
        id = "E1"
        [[endpoints.routes]]
        app_id = "echo"
        condition = { kind = "HTTPPath", path = "/" }

        [[apps]]
        id = "echo"
        type = "echo"
        response = "hello"
    "#;

    #[test]
    fn parses_json() {
        let snap = parse("json".to_string(), JSON.as_bytes()).unwrap();
        assert_eq!(snap.version, "v1");
        assert_eq!(snap.listeners.len(), 1);
    }

    #[test]
    fn parses_toml() {
        let snap = parse("toml".to_string(), TOML.as_bytes()).unwrap();
        assert_eq!(snap.version, "v1");
        assert_eq!(snap.endpoints[0].routes.len(), 1);
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(parse("yaml".to_string(), b"").is_err());
    }
}
