use log::{debug, error, warn};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// File name of an on-disk grading policy override
pub const GRADING_POLICY_FILE: &str = "grading_policy.json";

/// Directory holding per-run policy overrides
const POLICIES_DIR: &str = "policies";

/// Candidate locations for a course's grading policy file, most specific
/// first: `policies/{url_name}/grading_policy.json`, then the bare default
/// at the root
pub fn candidate_paths(root: &Path, url_name: Option<&str>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(url_name) = url_name {
        paths.push(root.join(POLICIES_DIR).join(url_name).join(GRADING_POLICY_FILE));
    }
    paths.push(root.join(GRADING_POLICY_FILE));
    paths
}

/// Reads the grading policy from the first candidate path that exists
///
/// An existing file that fails to read logs a warning and the search moves
/// on to the next candidate. When no candidate yields content, the policy
/// is an empty object.
pub fn read_grading_policy(paths: &[PathBuf]) -> String {
    for path in paths {
        if !path.exists() {
            continue;
        }
        debug!("Loading grading policy from {}", path.display());
        match fs::read_to_string(path) {
            // Successfully read; stop looking at backups
            Ok(contents) => return contents,
            Err(e) => {
                warn!(
                    "Unable to load course settings file from '{}': {e}",
                    path.display()
                );
            }
        }
    }

    "{}".to_string()
}

/// Locates, reads and decodes a course's grading policy override
///
/// A decode failure is non-fatal: it is logged and the override is treated
/// as absent, so the caller falls back to the default policy.
pub fn load_grading_policy(root: &Path, url_name: Option<&str>) -> Option<Map<String, Value>> {
    let policy_str = read_grading_policy(&candidate_paths(root, url_name));

    match serde_json::from_str(&policy_str) {
        Ok(Value::Object(policy)) => Some(policy),
        Ok(_) => {
            error!("Grading policy must be a JSON object");
            None
        }
        Err(e) => {
            error!("Unable to decode grading policy as json: {e}");
            None
        }
    }
}
