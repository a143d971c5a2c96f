use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::driver::http::{HttpDriverConfig, HttpDriverFactory};
use crate::engine::interpreter::{Interpreter, RunConfig};
use crate::engine::registry::{BlockRegistry, EngineRuntime};
use crate::engine::report::{FileReport, to_report};
use crate::engine::result::FileResult;
use crate::model::extract::check_acyclic;
use crate::model::suite::{FolderHooks, Suite, load_procedure_file};

/// Project configuration (`blockrun.yaml`): variable overrides, driver
/// defaults, and project-wide procedure files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Driver operation timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Procedure files registered project-wide, relative to the config.
    #[serde(default)]
    pub procedure_files: Vec<PathBuf>,
}

impl ProjectConfig {
    /// Load a config file, or the default config when `path` is `None` and
    /// no `blockrun.yaml` exists in the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing or invalid.
    pub fn load(path: Option<&PathBuf>) -> Result<(Self, PathBuf), String> {
        let (path, required) = match path {
            Some(p) => (p.clone(), true),
            None => (PathBuf::from("blockrun.yaml"), false),
        };
        if !path.exists() {
            if required {
                return Err(format!("config file '{}' not found", path.display()));
            }
            return Ok((Self::default(), PathBuf::from(".")));
        }
        let input = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
        let config: Self = serde_yaml::from_str(&input)
            .map_err(|e| format!("invalid config '{}': {e}", path.display()))?;
        let base_dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok((config, base_dir))
    }

    fn timeout(&self) -> Duration {
        self.timeout_ms
            .map_or(Duration::from_secs(30), Duration::from_millis)
    }
}

/// Options for the `run` command.
pub struct RunOptions {
    pub files: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub output: Option<PathBuf>,
    pub fail_fast: bool,
}

/// Collect `_hooks.yaml` files from every ancestor directory of a suite
/// file, ordered outermost-first.
fn discover_folder_hooks(
    file: &Path,
    sockets: &dyn crate::model::extract::SocketInfo,
) -> Result<Vec<FolderHooks>, String> {
    let mut dirs: Vec<&Path> = file.ancestors().skip(1).collect();
    dirs.reverse();
    let mut hooks = Vec::new();
    for dir in dirs {
        let candidate = dir.join("_hooks.yaml");
        if candidate.is_file() {
            debug!(path = %candidate.display(), "loading folder hooks");
            hooks.push(FolderHooks::from_file(&candidate, sockets)?);
        }
    }
    Ok(hooks)
}

fn render_console(result: &FileResult, out: &mut String) {
    let _ = writeln!(out, "{}", result.suite_name);
    for test in &result.results {
        let label = match &test.dataset {
            Some(ds) => format!("{} [{}]", test.test_name, ds.name),
            None => test.test_name.clone(),
        };
        let _ = writeln!(
            out,
            "  {:<7} {} ({}ms)",
            test.status.to_string(),
            label,
            test.duration.as_millis()
        );
        if let Some(error) = &test.error {
            let _ = writeln!(out, "          {error}");
        }
    }
    let s = &result.summary;
    let _ = writeln!(
        out,
        "  {} passed, {} failed, {} errors, {} skipped ({}ms)",
        s.passed,
        s.failed,
        s.errors,
        s.skipped,
        result.total_duration.as_millis()
    );
}

/// Run the `run` command: load suites (plus folder hooks and project
/// procedures), execute them, print a console summary, and optionally
/// write a JSON report.
///
/// Returns `Ok(true)` if every file loaded and every test passed. A file
/// that fails to load is reported and does not abort its siblings.
///
/// # Errors
///
/// Returns an error string for configuration-level problems (bad config
/// file, unwritable report output).
pub fn run_run(options: RunOptions) -> Result<bool, String> {
    let (config, config_dir) = ProjectConfig::load(options.config.as_ref())?;

    let registry = BlockRegistry::with_builtins();

    // Load everything up front; the registry only informs extraction here.
    let mut project_procedures = Vec::new();
    for proc_path in &config.procedure_files {
        project_procedures.extend(load_procedure_file(&config_dir.join(proc_path), &registry)?);
    }

    let mut loaded = Vec::new();
    let mut load_errors = Vec::new();
    for file in &options.files {
        match Suite::from_file(file, &registry) {
            Ok(suite) => {
                let hooks = discover_folder_hooks(file, &registry)?;
                loaded.push((file.clone(), suite, hooks));
            }
            Err(e) => load_errors.push(e),
        }
    }

    let mut runtime = EngineRuntime::new(registry);
    for procedure in project_procedures {
        runtime.add_procedure(procedure);
    }

    let timeout = options
        .timeout_ms
        .map_or_else(|| config.timeout(), Duration::from_millis);
    let factory = HttpDriverFactory::new(HttpDriverConfig {
        base_url: options.base_url.clone().or_else(|| config.base_url.clone()),
        default_headers: config.headers.clone(),
        timeout,
    });
    let run_config = RunConfig {
        timeout,
        variables: config.variables.clone(),
    };
    let mut interpreter = Interpreter::new(runtime, Box::new(factory), run_config);

    let mut console = String::new();
    let mut reports: Vec<FileReport> = Vec::new();
    let mut all_success = load_errors.is_empty();
    for error in &load_errors {
        eprintln!("error: {error}");
    }

    for (path, suite, hooks) in &loaded {
        debug!(file = %path.display(), suite = %suite.name, "running suite");
        let result = interpreter.run_file(suite, hooks);
        render_console(&result, &mut console);
        if !result.summary.success() {
            all_success = false;
        }
        reports.push(to_report(&result));
        if options.fail_fast && !all_success {
            break;
        }
    }

    print!("{console}");

    if let Some(out_path) = &options.output {
        let json = serde_json::to_string_pretty(&reports)
            .map_err(|e| format!("failed to serialize report: {e}"))?;
        std::fs::write(out_path, json)
            .map_err(|e| format!("failed to write {}: {e}", out_path.display()))?;
        eprintln!("report written to {}", out_path.display());
    }

    Ok(all_success)
}

/// Run the `validate` command: load each suite file, check every step
/// program for cycles and unknown step types, and report validity.
///
/// # Errors
///
/// Returns an error string naming the first invalid file.
pub fn run_validate(files: &[PathBuf]) -> Result<String, String> {
    let registry = BlockRegistry::with_builtins();
    let mut results = Vec::new();

    for file in files {
        let suite = Suite::from_file(file, &registry)?;

        let mut programs: Vec<(String, &[crate::model::step::Step])> = vec![
            ("beforeAll".into(), &suite.before_all),
            ("afterAll".into(), &suite.after_all),
            ("beforeEach".into(), &suite.before_each),
            ("afterEach".into(), &suite.after_each),
        ];
        for test in &suite.tests {
            programs.push((format!("test '{}'", test.name), &test.steps));
            programs.push((format!("test '{}' beforeEach", test.name), &test.before_each));
            programs.push((format!("test '{}' afterEach", test.name), &test.after_each));
        }
        for procedure in suite.procedures.values() {
            programs.push((format!("procedure '{}'", procedure.name), &procedure.steps));
        }

        for (what, steps) in &programs {
            check_acyclic(steps)
                .map_err(|e| format!("{}: {what}: {e}", file.display()))?;
            for step in walk_steps(steps) {
                if !registry.contains(&step.step_type)
                    && !suite.procedures.contains_key(&step.step_type)
                {
                    return Err(format!(
                        "{}: {what}: unknown step type '{}'",
                        file.display(),
                        step.step_type
                    ));
                }
            }
        }

        results.push(format!(
            "{}: {} is valid ({} tests, {} procedures)",
            file.display(),
            suite.name,
            suite.tests.len(),
            suite.procedures.len(),
        ));
    }

    Ok(results.join("\n"))
}

/// Flatten a step tree (params holding nested blocks, statement children)
/// into a preorder list.
fn walk_steps(steps: &[crate::model::step::Step]) -> Vec<&crate::model::step::Step> {
    let mut out = Vec::new();
    let mut stack: Vec<&crate::model::step::Step> = steps.iter().rev().collect();
    while let Some(step) = stack.pop() {
        out.push(step);
        for param in step.params.values() {
            if let crate::model::step::ParamValue::Block(inner) = param {
                stack.push(inner);
            }
        }
        for children in step.children.values() {
            stack.extend(children.iter().rev());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    const VALID_SUITE: &str = r#"
name: smoke
tests:
  - name: logs
    steps:
      - type: log
        params: {message: "hello"}
"#;

    #[test]
    fn validate_accepts_a_well_formed_suite() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "smoke.yaml", VALID_SUITE);
        let out = run_validate(&[path]).unwrap();
        assert!(out.contains("smoke is valid (1 tests, 0 procedures)"));
    }

    #[test]
    fn validate_rejects_unknown_step_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "bad.yaml",
            "name: bad\ntests:\n  - name: t\n    steps:\n      - type: teleport\n",
        );
        let err = run_validate(&[path]).unwrap_err();
        assert!(err.contains("unknown step type 'teleport'"));
    }

    #[test]
    fn validate_accepts_calls_to_declared_procedures() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "procs.yaml",
            r#"
name: procs
procedures:
  - name: greet
    steps:
      - type: log
        params: {message: "hi"}
tests:
  - name: t
    steps:
      - type: greet
"#,
        );
        assert!(run_validate(&[path]).is_ok());
    }

    #[test]
    fn run_executes_a_suite_and_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "smoke.yaml", VALID_SUITE);
        let report_path = dir.path().join("report.json");

        let ok = run_run(RunOptions {
            files: vec![path],
            config: None,
            base_url: None,
            timeout_ms: None,
            output: Some(report_path.clone()),
            fail_fast: false,
        })
        .unwrap();
        assert!(ok);

        let report: Vec<FileReport> =
            serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].suite, "smoke");
        assert!(report[0].summary.success);
    }

    #[test]
    fn run_reports_load_errors_without_aborting_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(dir.path(), "good.yaml", VALID_SUITE);
        let bad = write_file(dir.path(), "bad.yaml", "name: [broken");

        let ok = run_run(RunOptions {
            files: vec![bad, good],
            config: None,
            base_url: None,
            timeout_ms: None,
            output: None,
            fail_fast: false,
        })
        .unwrap();
        // The broken file marks the run failed; the good one still ran.
        assert!(!ok);
    }

    #[test]
    fn folder_hooks_are_discovered_outermost_first() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("inner");
        std::fs::create_dir(&nested).unwrap();
        write_file(
            dir.path(),
            "_hooks.yaml",
            "beforeEach:\n  - type: log\n    params: {message: outer}\n",
        );
        write_file(
            &nested,
            "_hooks.yaml",
            "beforeEach:\n  - type: log\n    params: {message: inner}\n",
        );
        let suite_path = write_file(&nested, "s.yaml", VALID_SUITE);

        let registry = BlockRegistry::with_builtins();
        let hooks = discover_folder_hooks(&suite_path, &registry).unwrap();
        assert_eq!(hooks.len(), 2);
        // Outermost contributes first.
        assert_eq!(hooks[0].before_each[0].params.len(), 1);
        let crate::model::step::ParamValue::Literal(v) =
            &hooks[0].before_each[0].params["message"]
        else {
            panic!("expected a literal param");
        };
        assert_eq!(*v, "outer");
    }

    #[test]
    fn project_config_defaults_when_absent() {
        let (config, _) = ProjectConfig::load(None).unwrap();
        assert!(config.variables.is_empty());
        assert!(config.base_url.is_none());
    }

    #[test]
    fn project_config_parses_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "blockrun.yaml",
            "baseUrl: https://api.test\ntimeoutMs: 5000\nvariables:\n  env: staging\n",
        );
        let (config, base_dir) = ProjectConfig::load(Some(&path)).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://api.test"));
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert_eq!(config.variables["env"], "staging");
        assert_eq!(base_dir, dir.path());
    }
}
