//! App construction: turns a snapshot's app definitions into a built [`AppRegistry`],
//! always including the built-in `echo` app (spec §6).

pub mod echo;

use std::sync::Arc;

use dispatch_core::{
    app::{AppRegistry, AppRegistryBuilder},
    snapshot::ConfigSnapshot,
};

use self::echo::EchoApp;

/// Constructs the app registry for one snapshot. Unknown app kinds are external
/// collaborators out of scope here (spec §1); they are logged and skipped rather than
/// failing the whole snapshot.
pub fn build(snapshot: &ConfigSnapshot) -> anyhow::Result<AppRegistry> {
    let mut builder = AppRegistryBuilder::new();
    for def in &snapshot.apps {
        match def.kind.as_str() {
            "echo" => {
                builder.register(Arc::new(EchoApp::from_def(def)))?;
            }
            other => {
                tracing::warn!(app_id = %def.id, kind = other, "unknown app type, skipping");
            }
        }
    }
    // Always present; a no-op if the snapshot already defined its own `echo` app.
    builder.register(Arc::new(EchoApp::fallback()))?;
    Ok(builder.build())
}
