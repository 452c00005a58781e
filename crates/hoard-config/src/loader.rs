//! Load plans from a directory of YAML files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::{ConfigError, Plan};

/// Load every plan in `dir`.
///
/// Files are read in sorted path order. When two files share a stem
/// (`a.yml` and `a.yaml`) the first one wins and the other is skipped.
pub fn load_plans(dir: &Path) -> Result<Vec<Plan>, ConfigError> {
    load_plans_with_env(dir, |key| std::env::var(key).ok())
}

/// Load the plan called `name` from `dir`.
pub fn load_plan(dir: &Path, name: &str) -> Result<Plan, ConfigError> {
    load_plan_with_env(dir, name, |key| std::env::var(key).ok())
}

pub(crate) fn load_plans_with_env(
    dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Vec<Plan>, ConfigError> {
    let mut plans = Vec::new();
    let mut names = HashSet::new();

    for path in plan_files(dir)? {
        let Some(name) = plan_name(&path) else {
            continue;
        };
        if !names.insert(name.clone()) {
            warn!(plan = %name, path = %path.display(), "skipping duplicate plan");
            continue;
        }

        let plan = read_plan(&path, &name, &env)?;
        debug!(
            plan = %plan.name,
            destinations = ?plan.destinations().iter().map(|d| d.kind()).collect::<Vec<_>>(),
            validation = plan.validation.is_some(),
            "loaded plan"
        );
        plans.push(plan);
    }

    if plans.is_empty() {
        return Err(ConfigError::NoPlans(dir.to_path_buf()));
    }

    info!(count = plans.len(), dir = %dir.display(), "loaded backup plans");
    Ok(plans)
}

pub(crate) fn load_plan_with_env(
    dir: &Path,
    name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Plan, ConfigError> {
    let path = plan_files(dir)?
        .into_iter()
        .find(|path| plan_name(path).as_deref() == Some(name))
        .ok_or_else(|| ConfigError::NotFound {
            name: name.to_string(),
            dir: dir.to_path_buf(),
        })?;

    read_plan(&path, name, &env)
}

/// YAML files in `dir`, sorted by path.
fn plan_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yml" || ext == "yaml");
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn plan_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

fn read_plan(
    path: &Path,
    name: &str,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<Plan, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let parse_error = |source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let mut value: Value = serde_yaml::from_str(&content).map_err(parse_error)?;
    if value.is_null() {
        value = Value::Mapping(Default::default());
    }
    apply_env_overrides(&mut value, &env_prefix(name), env);

    let mut plan: Plan = serde_yaml::from_value(value).map_err(parse_error)?;
    plan.name = name.to_string();
    plan.validate()?;
    Ok(plan)
}

/// Environment prefix for a plan: upper-cased, dashes replaced.
fn env_prefix(name: &str) -> String {
    name.replace(['-', '.'], "_").to_uppercase()
}

/// Replace leaf values that have a matching `<PREFIX>_<PATH>` variable.
///
/// Only keys already present in the file can be overridden. Non-string
/// leaves are re-parsed so numbers and booleans keep their type.
fn apply_env_overrides(value: &mut Value, prefix: &str, env: &impl Fn(&str) -> Option<String>) {
    let Value::Mapping(mapping) = value else {
        return;
    };

    for (key, child) in mapping.iter_mut() {
        let Some(key) = key.as_str() else {
            continue;
        };
        let var = format!("{}_{}", prefix, key.to_uppercase());

        if child.is_mapping() {
            apply_env_overrides(child, &var, env);
            continue;
        }

        let Some(raw) = env(&var) else {
            continue;
        };
        debug!(variable = %var, "applying environment override");
        *child = if child.is_string() {
            Value::String(raw)
        } else {
            serde_yaml::from_str(&raw).unwrap_or(Value::String(raw))
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::tempdir;

    const MONGO_TEST: &str = r#"
target:
  host: "localhost"
  port: 27017
  database: "test"
scheduler:
  cron: "*/1 * * * *"
  retention: 5
  timeout: 60
retry:
  attempts: 3
  backoffFactor: 0.5
azure:
  containerName: "backup"
  connectionString: "from-file"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix("mongo-test"), "MONGO_TEST");
    }

    #[test]
    fn test_load_plan_applies_env_override() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("mongo-test.yml"), MONGO_TEST).unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("MONGO_TEST_AZURE_CONNECTIONSTRING", "test-connection-string"),
            ("MONGO_TEST_SCHEDULER_RETENTION", "2"),
        ]);
        let plan = load_plan_with_env(dir.path(), "mongo-test", |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(plan.name, "mongo-test");
        assert_eq!(plan.scheduler.retention, 2);
        assert_eq!(plan.retry.attempts, 3);
        assert_eq!(plan.retry.backoff_factor, 0.5);
        assert_eq!(
            plan.azure.unwrap().connection_string,
            "test-connection-string"
        );
    }

    #[test]
    fn test_load_plan_not_found() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("mongo-test.yml"), MONGO_TEST).unwrap();

        let err = load_plan_with_env(dir.path(), "missing", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_load_plans_skips_duplicates_deterministically() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), MONGO_TEST).unwrap();
        fs::write(
            dir.path().join("a.yml"),
            MONGO_TEST.replace("retention: 5", "retention: 9"),
        )
        .unwrap();
        fs::write(dir.path().join("b.yml"), MONGO_TEST).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let plans = load_plans_with_env(dir.path(), no_env).unwrap();
        let names: Vec<_> = plans.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        // a.yaml sorts before a.yml
        assert_eq!(plans[0].scheduler.retention, 5);
    }

    #[test]
    fn test_load_plans_empty_dir() {
        let dir = tempdir().unwrap();
        let err = load_plans_with_env(dir.path(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::NoPlans(_)));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.yml"), "target: [unclosed").unwrap();

        let err = load_plans_with_env(dir.path(), no_env).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert!(path.ends_with("broken.yml")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_plan_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("nocron.yml"), "target:\n  host: localhost\n").unwrap();

        let err = load_plans_with_env(dir.path(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
