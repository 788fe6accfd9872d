use std::fs;
use std::path::{Path, PathBuf};

const ALLOWED_ENABLE_BOT_TRADING_CALLERS: &[&str] = &[
    "src/adapters/grid_backend.rs",
    "src/strategy/provisioning.rs",
];

const ALLOWED_STORE_KEY_USERS: &[&str] = &[
    "src/storage/mod.rs",
    "src/strategy/ledger.rs",
    "src/strategy/guard.rs",
];

const STORE_KEYS: &[&str] = &[
    "PROCESSED_REQUESTS_KEY",
    "REQUEST_TIMESTAMPS_KEY",
    "SKIP_APIKEY_CREATION_KEY",
];

fn collect_rust_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

/// (relative path, 1-based line number, trimmed line) for every source line
fn source_lines() -> Vec<(String, usize, String)> {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    collect_rust_files(&repo_root.join("src"), &mut files);

    let mut lines = Vec::new();
    for file in files {
        let rel = file
            .strip_prefix(repo_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        let content = fs::read_to_string(&file).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            lines.push((rel.clone(), idx + 1, line.trim().to_string()));
        }
    }
    lines
}

#[test]
fn key_secrets_only_reach_backend_through_provisioning() {
    let offenders: Vec<String> = source_lines()
        .into_iter()
        .filter(|(_, _, line)| line.contains("enable_bot_trading("))
        .filter(|(rel, _, _)| !ALLOWED_ENABLE_BOT_TRADING_CALLERS.contains(&rel.as_str()))
        .map(|(rel, no, line)| format!("{rel}:{no}: {line}"))
        .collect();

    assert!(
        offenders.is_empty(),
        "enable_bot_trading called outside the provisioning flow:\n{}",
        offenders.join("\n")
    );
}

#[test]
fn well_known_store_keys_stay_inside_ledger_and_guard() {
    let offenders: Vec<String> = source_lines()
        .into_iter()
        .filter(|(_, _, line)| STORE_KEYS.iter().any(|key| line.contains(key)))
        .filter(|(rel, _, _)| !ALLOWED_STORE_KEY_USERS.contains(&rel.as_str()))
        .map(|(rel, no, line)| format!("{rel}:{no}: {line}"))
        .collect();

    assert!(
        offenders.is_empty(),
        "session/local store keys used outside their owners:\n{}",
        offenders.join("\n")
    );
}
