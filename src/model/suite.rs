use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::data::{DataSet, load_data_file};
use crate::model::extract::{SocketInfo, extract_steps};
use crate::model::step::Step;

/// A suite-shared variable declaration. Variables with a default are bound
/// to it at load time; declarations without one bind to the empty string so
/// hooks and data rows can fill them in later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A declared parameter of a procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureParam {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A named, parameterized, reusable step list. Registered per-file or
/// project-wide; file-level registration shadows the project table.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub description: Option<String>,
    pub params: Vec<ProcedureParam>,
    pub steps: Vec<Step>,
}

/// One authored test case.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub steps: Vec<Step>,
    pub before_each: Vec<Step>,
    pub after_each: Vec<Step>,
    pub datasets: Vec<DataSet>,
    pub disabled: bool,
    pub soft_assertions: bool,
}

/// A loaded test file: shared variables, tests, lifecycle hooks, and the
/// file-local procedure table.
#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    pub variables: Vec<VariableDecl>,
    pub tests: Vec<TestCase>,
    pub before_all: Vec<Step>,
    pub after_all: Vec<Step>,
    pub before_each: Vec<Step>,
    pub after_each: Vec<Step>,
    pub procedures: HashMap<String, Procedure>,
}

/// The four lifecycle hook slots contributed by one filesystem folder.
/// Multiple folders along a path merge outermost-first for before-hooks and
/// innermost-first for after-hooks.
#[derive(Debug, Clone, Default)]
pub struct FolderHooks {
    pub before_all: Vec<Step>,
    pub after_all: Vec<Step>,
    pub before_each: Vec<Step>,
    pub after_each: Vec<Step>,
}

// ── raw file shapes (programs left opaque until extraction) ─────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuiteFile {
    name: String,
    #[serde(default)]
    variables: Vec<VariableDecl>,
    #[serde(default)]
    tests: Vec<TestCaseFile>,
    #[serde(default)]
    before_all: Option<Value>,
    #[serde(default)]
    after_all: Option<Value>,
    #[serde(default)]
    before_each: Option<Value>,
    #[serde(default)]
    after_each: Option<Value>,
    #[serde(default)]
    procedures: Vec<ProcedureFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestCaseFile {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    steps: Option<Value>,
    #[serde(default)]
    before_each: Option<Value>,
    #[serde(default)]
    after_each: Option<Value>,
    #[serde(default)]
    datasets: Vec<DataSet>,
    #[serde(default)]
    data_file: Option<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    soft_assertions: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcedureFile {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    params: Vec<ProcedureParam>,
    #[serde(default)]
    steps: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderHooksFile {
    #[serde(default)]
    before_all: Option<Value>,
    #[serde(default)]
    after_all: Option<Value>,
    #[serde(default)]
    before_each: Option<Value>,
    #[serde(default)]
    after_each: Option<Value>,
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let input = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&input)
            .map_err(|e| format!("invalid JSON in '{}': {e}", path.display())),
        Some("yaml" | "yml") => serde_yaml::from_str(&input)
            .map_err(|e| format!("invalid YAML in '{}': {e}", path.display())),
        other => Err(format!(
            "unsupported suite file extension '{}' (expected: yaml, yml, json)",
            other.unwrap_or("")
        )),
    }
}

fn extract_program(program: Option<&Value>, sockets: &dyn SocketInfo) -> Vec<Step> {
    program.map_or_else(Vec::new, |p| extract_steps(p, sockets))
}

impl Suite {
    /// Load a suite from a YAML or JSON test file, flattening every step
    /// program (hooks, tests, procedures) and loading external data files
    /// referenced by tests (paths relative to the suite file).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, a procedure
    /// name is duplicated, or a referenced data file fails to load.
    pub fn from_file(path: &Path, sockets: &dyn SocketInfo) -> Result<Self, String> {
        let raw: SuiteFile = parse_file(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut procedures = HashMap::new();
        for proc_file in raw.procedures {
            let proc_ = Procedure {
                name: proc_file.name.clone(),
                description: proc_file.description,
                params: proc_file.params,
                steps: extract_program(proc_file.steps.as_ref(), sockets),
            };
            if procedures.insert(proc_file.name.clone(), proc_).is_some() {
                return Err(format!(
                    "duplicate procedure '{}' in '{}'",
                    proc_file.name,
                    path.display()
                ));
            }
        }

        let mut tests = Vec::with_capacity(raw.tests.len());
        for test in raw.tests {
            let mut datasets = test.datasets;
            if let Some(data_file) = &test.data_file {
                datasets.extend(load_data_file(&base_dir.join(data_file))?);
            }
            tests.push(TestCase {
                id: if test.id.is_empty() {
                    test.name.clone()
                } else {
                    test.id
                },
                name: test.name,
                steps: extract_program(test.steps.as_ref(), sockets),
                before_each: extract_program(test.before_each.as_ref(), sockets),
                after_each: extract_program(test.after_each.as_ref(), sockets),
                datasets,
                disabled: test.disabled,
                soft_assertions: test.soft_assertions,
            });
        }

        Ok(Self {
            name: raw.name,
            variables: raw.variables,
            tests,
            before_all: extract_program(raw.before_all.as_ref(), sockets),
            after_all: extract_program(raw.after_all.as_ref(), sockets),
            before_each: extract_program(raw.before_each.as_ref(), sockets),
            after_each: extract_program(raw.after_each.as_ref(), sockets),
            procedures,
        })
    }

    /// Load-time variable bindings: declared defaults, with declarations
    /// lacking a default bound to the empty string.
    pub fn default_variables(&self) -> BTreeMap<String, Value> {
        self.variables
            .iter()
            .map(|v| {
                (
                    v.name.clone(),
                    v.default.clone().unwrap_or(Value::String(String::new())),
                )
            })
            .collect()
    }

    /// Whether every test in the file is disabled (vacuously false for an
    /// empty file). All-disabled files skip suite hooks entirely.
    pub fn all_disabled(&self) -> bool {
        !self.tests.is_empty() && self.tests.iter().all(|t| t.disabled)
    }
}

impl FolderHooks {
    /// Load a `_hooks` file contributing folder-scoped lifecycle hooks.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path, sockets: &dyn SocketInfo) -> Result<Self, String> {
        let raw: FolderHooksFile = parse_file(path)?;
        Ok(Self {
            before_all: extract_program(raw.before_all.as_ref(), sockets),
            after_all: extract_program(raw.after_all.as_ref(), sockets),
            before_each: extract_program(raw.before_each.as_ref(), sockets),
            after_each: extract_program(raw.after_each.as_ref(), sockets),
        })
    }
}

/// Load a standalone procedure file (`procedures: [...]`) for project-wide
/// registration.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_procedure_file(path: &Path, sockets: &dyn SocketInfo) -> Result<Vec<Procedure>, String> {
    #[derive(Debug, Deserialize)]
    struct ProceduresOnly {
        #[serde(default)]
        procedures: Vec<ProcedureFile>,
    }

    let raw: ProceduresOnly = parse_file(path)?;
    Ok(raw
        .procedures
        .into_iter()
        .map(|p| Procedure {
            name: p.name,
            description: p.description,
            params: p.params,
            steps: extract_program(p.steps.as_ref(), sockets),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::extract::NoStatementSockets;
    use serde_json::json;
    use std::io::Write;

    fn write_temp(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    const BASIC_SUITE: &str = r##"
name: login
variables:
  - name: base_url
    default: "https://example.test"
  - name: token
tests:
  - name: valid login
    steps:
      - type: navigate
        params: {url: "${base_url}/login"}
      - type: fill
        params: {selector: "#user", value: "alice"}
  - name: flaky login
    disabled: true
    steps: []
"##;

    #[test]
    fn loads_yaml_suite() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "login.yaml", BASIC_SUITE);
        let suite = Suite::from_file(&path, &NoStatementSockets).unwrap();
        assert_eq!(suite.name, "login");
        assert_eq!(suite.tests.len(), 2);
        assert_eq!(suite.tests[0].steps.len(), 2);
        assert_eq!(suite.tests[0].steps[0].step_type, "navigate");
        assert!(suite.tests[1].disabled);
    }

    #[test]
    fn default_variables_bind_defaults_and_empties() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "login.yaml", BASIC_SUITE);
        let suite = Suite::from_file(&path, &NoStatementSockets).unwrap();
        let vars = suite.default_variables();
        assert_eq!(vars["base_url"], json!("https://example.test"));
        assert_eq!(vars["token"], json!(""));
    }

    #[test]
    fn all_disabled_requires_every_test() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "login.yaml", BASIC_SUITE);
        let mut suite = Suite::from_file(&path, &NoStatementSockets).unwrap();
        assert!(!suite.all_disabled());
        suite.tests[0].disabled = true;
        assert!(suite.all_disabled());
        suite.tests.clear();
        assert!(!suite.all_disabled());
    }

    #[test]
    fn loads_json_suite_with_procedure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "api.json",
            r#"{
                "name": "api",
                "procedures": [{
                    "name": "login_as",
                    "params": [{"name": "user", "default": "guest"}],
                    "steps": [{"type": "http_request", "params": {"method": "POST", "url": "/login"}}]
                }],
                "tests": []
            }"#,
        );
        let suite = Suite::from_file(&path, &NoStatementSockets).unwrap();
        let proc_ = &suite.procedures["login_as"];
        assert_eq!(proc_.params[0].name, "user");
        assert_eq!(proc_.params[0].default, Some(json!("guest")));
        assert_eq!(proc_.steps.len(), 1);
    }

    #[test]
    fn duplicate_procedure_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "dup.yaml",
            "name: dup\nprocedures:\n  - name: p\n  - name: p\n",
        );
        let err = Suite::from_file(&path, &NoStatementSockets).unwrap_err();
        assert!(err.contains("duplicate procedure 'p'"));
    }

    #[test]
    fn test_loads_external_data_file() {
        let dir = tempfile::tempdir().unwrap();
        write_temp(&dir, "users.csv", "user\nalice\nbob\n");
        let path = write_temp(
            &dir,
            "suite.yaml",
            "name: s\ntests:\n  - name: t\n    dataFile: users.csv\n    steps: []\n",
        );
        let suite = Suite::from_file(&path, &NoStatementSockets).unwrap();
        assert_eq!(suite.tests[0].datasets.len(), 2);
        assert_eq!(suite.tests[0].datasets[0].values["user"], json!("alice"));
    }

    #[test]
    fn missing_data_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "suite.yaml",
            "name: s\ntests:\n  - name: t\n    dataFile: gone.csv\n    steps: []\n",
        );
        assert!(Suite::from_file(&path, &NoStatementSockets).is_err());
    }

    #[test]
    fn unsupported_extension_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "suite.toml", "name = 's'");
        let err = Suite::from_file(&path, &NoStatementSockets).unwrap_err();
        assert!(err.contains("unsupported suite file extension"));
    }

    #[test]
    fn folder_hooks_load_with_missing_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "_hooks.yaml",
            "beforeEach:\n  - type: log\n    params: {message: enter}\n",
        );
        let hooks = FolderHooks::from_file(&path, &NoStatementSockets).unwrap();
        assert_eq!(hooks.before_each.len(), 1);
        assert!(hooks.after_each.is_empty());
        assert!(hooks.before_all.is_empty());
    }

    #[test]
    fn test_id_falls_back_to_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "s.yaml",
            "name: s\ntests:\n  - name: named only\n    steps: []\n",
        );
        let suite = Suite::from_file(&path, &NoStatementSockets).unwrap();
        assert_eq!(suite.tests[0].id, "named only");
    }
}
