// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Minimal demonstration of `durable-wal` backing a toy key-value store.
// The WAL itself knows nothing about keys or values -- this example just
// picks one convenient encoding for the opaque payload bytes.

use std::collections::HashMap;

use durable_wal::{Wal, WalConfig};
use tracing_subscriber::EnvFilter;

enum KvOp {
    Set { key: String, value: String },
    Delete { key: String },
}

impl KvOp {
    fn encode(&self) -> Vec<u8> {
        match self {
            KvOp::Set { key, value } => format!("SET {key} {value}").into_bytes(),
            KvOp::Delete { key } => format!("DEL {key}").into_bytes(),
        }
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        if let Some(rest) = text.strip_prefix("SET ") {
            let (key, value) = rest.split_once(' ')?;
            Some(KvOp::Set {
                key: key.to_string(),
                value: value.to_string(),
            })
        } else if let Some(key) = text.strip_prefix("DEL ") {
            Some(KvOp::Delete {
                key: key.to_string(),
            })
        } else {
            None
        }
    }
}

fn apply(state: &mut HashMap<String, String>, op: &KvOp) {
    match op {
        KvOp::Set { key, value } => {
            state.insert(key.clone(), value.clone());
        }
        KvOp::Delete { key } => {
            state.remove(key);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dir = tempfile::tempdir()?;
    let wal = Wal::open(WalConfig::new(dir.path()))?;

    wal.append_entry(
        KvOp::Set {
            key: "name".into(),
            value: "ferris".into(),
        }
        .encode(),
    )?;
    wal.append_entry(
        KvOp::Set {
            key: "language".into(),
            value: "rust".into(),
        }
        .encode(),
    )?;

    let mut state = HashMap::new();
    let snapshot = format!(
        "{{\"name\":\"{}\",\"language\":\"{}\"}}",
        state.get("name").cloned().unwrap_or_default(),
        state.get("language").cloned().unwrap_or_default()
    );
    wal.create_checkpoint(snapshot.into_bytes())?;

    wal.append_entry(KvOp::Delete { key: "name".into() }.encode())?;
    wal.sync()?;

    for record in wal.read_all(false)? {
        if record.is_checkpoint {
            println!("checkpoint: {}", String::from_utf8_lossy(&record.payload));
            continue;
        }
        if let Some(op) = KvOp::decode(&record.payload) {
            apply(&mut state, &op);
        }
    }

    println!("final state: {state:?}");
    Ok(())
}
