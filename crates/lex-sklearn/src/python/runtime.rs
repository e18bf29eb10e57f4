//! Python runtime initialization.
//!
//! Pipelines are unpickled by `joblib` inside an embedded interpreter. Two
//! deployment layouts are supported:
//!
//! 1. **Bundled runtime** - a `python-build-standalone` tree shipped next to the
//!    binary (or pointed at by `LEX_PYTHON_RUNTIME_DIR`). `PYTHONHOME` and
//!    `PYTHONPATH` are set before the interpreter starts and `sys.executable` is
//!    patched afterwards.
//! 2. **Linked interpreter** - whatever Python PyO3 was built against. Nothing
//!    is configured; the interpreter's own `site-packages` are used.
//!
//! # Runtime Location
//!
//! The bundled runtime is searched for in this order:
//!
//! 1. `LEX_PYTHON_RUNTIME_DIR` environment variable
//! 2. `{exe_dir}/../runtime/python/{platform}/`
//! 3. `{exe_dir}/runtime/python/{platform}/`
//!
//! If none exists the linked interpreter is used.
//!
//! # The sys.executable Fix
//!
//! An embedded interpreter reports the host binary as `sys.executable`.
//! `joblib`/`loky` spawn workers with it, so for a bundled runtime it is
//! pointed back at the bundled `python3` before any ML library is imported.

use crate::error::SklearnError;
use pyo3::types::{PyAnyMethods, PyListMethods};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Result of the one-time initialization, shared by every caller.
static INIT_RESULT: OnceLock<Result<(), String>> = OnceLock::new();

/// Environment variable that overrides runtime discovery.
pub const RUNTIME_DIR_ENV: &str = "LEX_PYTHON_RUNTIME_DIR";

/// Interpreter version of the bundled runtime (`lib/python3.12/`).
const PYTHON_VERSION: &str = "python3.12";

/// Modules a serialized scikit-learn pipeline needs at inference time.
const REQUIRED_MODULES: [&str; 4] = ["joblib", "numpy", "pandas", "pyarrow"];

/// Initializes the Python runtime.
///
/// Must succeed before [`SklearnPipeline::load`](crate::SklearnPipeline::load)
/// or any other call into Python. Safe to call repeatedly and from several
/// threads; only the first call does any work and later calls return the
/// cached outcome.
///
/// # Errors
///
/// Returns [`SklearnError::RuntimeInit`] if the interpreter cannot be started
/// or one of `joblib`, `numpy`, `pandas`, `pyarrow` fails to import.
#[must_use = "initialization may fail; check the Result"]
pub fn initialize() -> Result<(), SklearnError> {
    match INIT_RESULT.get_or_init(do_initialize) {
        Ok(()) => Ok(()),
        Err(msg) => Err(SklearnError::RuntimeInit(msg.clone())),
    }
}

fn do_initialize() -> Result<(), String> {
    match find_runtime_dir() {
        Some(runtime_dir) => {
            info!("Using bundled Python runtime at {}", runtime_dir.display());
            setup_python_environment(&runtime_dir);
            pyo3::Python::initialize();
            fix_sys_executable(&runtime_dir)?;
        }
        None => {
            debug!("No bundled Python runtime found, using the linked interpreter");
            pyo3::Python::initialize();
        }
    }

    verify_python_setup()
}

fn find_runtime_dir() -> Option<PathBuf> {
    resolve_runtime_dir(
        env::var_os(RUNTIME_DIR_ENV).map(PathBuf::from),
        env::current_exe().ok(),
    )
}

/// Applies the search order to an explicit override and executable path.
fn resolve_runtime_dir(env_override: Option<PathBuf>, exe_path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = env_override.filter(|path| path.exists()) {
        return Some(path);
    }

    let platform = get_platform_dir()?;
    let exe_dir = exe_path?.parent()?.to_path_buf();

    [
        exe_dir.join("..").join("runtime").join("python").join(platform),
        exe_dir.join("runtime").join("python").join(platform),
    ]
    .into_iter()
    .find(|candidate| candidate.exists())
    .and_then(|candidate| candidate.canonicalize().ok())
}

/// Points `PYTHONHOME`/`PYTHONPATH` at the bundled runtime.
fn setup_python_environment(runtime_dir: &Path) {
    let python_lib = runtime_dir.join("lib").join(PYTHON_VERSION);
    let site_packages = python_lib.join("site-packages");

    #[cfg(windows)]
    let separator = ";";
    #[cfg(not(windows))]
    let separator = ":";

    let pythonpath = format!(
        "{}{}{}",
        python_lib.display(),
        separator,
        site_packages.display()
    );

    // SAFETY: called once from `do_initialize`, before the interpreter starts
    // and before this crate spawns any thread.
    unsafe {
        env::set_var("PYTHONHOME", runtime_dir);
        env::set_var("PYTHONPATH", &pythonpath);
        env::set_var("PYTHONNOUSERSITE", "1");
        env::set_var("PYTHONDONTWRITEBYTECODE", "1");
    }
}

fn fix_sys_executable(runtime_dir: &Path) -> Result<(), String> {
    #[cfg(windows)]
    let python_exe = runtime_dir.join("python.exe");
    #[cfg(not(windows))]
    let python_exe = runtime_dir.join("bin").join("python3");

    let exe_path = python_exe
        .to_str()
        .ok_or_else(|| "Python executable path is not valid UTF-8".to_string())?
        .to_string();

    pyo3::Python::attach(|py| {
        let sys = py
            .import("sys")
            .map_err(|e| format!("Failed to import sys: {}", e))?;
        sys.setattr("executable", exe_path.as_str())
            .map_err(|e| format!("Failed to set sys.executable: {}", e))?;
        sys.setattr("_base_executable", exe_path.as_str())
            .map_err(|e| format!("Failed to set sys._base_executable: {}", e))?;
        Ok(())
    })
}

fn verify_python_setup() -> Result<(), String> {
    pyo3::Python::attach(|py| {
        for module in REQUIRED_MODULES {
            py.import(module)
                .map_err(|e| format!("Failed to import {}: {}", module, e))?;
        }

        let version: String = py
            .import("sys")
            .and_then(|sys| sys.getattr("version"))
            .and_then(|v| v.extract())
            .unwrap_or_else(|_| "<unknown>".to_string());
        debug!("Python runtime ready: {}", version);

        Ok(())
    })
}

/// Prepends a directory to `sys.path`.
///
/// Pipelines that pickle custom transformer classes can only be loaded when
/// the module defining those classes is importable.
///
/// # Errors
///
/// Returns an error if the runtime is not initialized or the directory does
/// not exist.
pub fn add_sys_path(path: impl AsRef<Path>) -> Result<(), SklearnError> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Err(SklearnError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Python path entry not found: {}", path.display()),
        )));
    }
    initialize()?;

    let entry = path.to_string_lossy().to_string();
    pyo3::Python::attach(|py| {
        let sys_path = py.import("sys")?.getattr("path")?;
        let sys_path = sys_path.cast::<pyo3::types::PyList>().map_err(|e| {
            SklearnError::RuntimeInit(format!("sys.path is not a list: {}", e))
        })?;
        sys_path.insert(0, entry.as_str())?;
        debug!("Added {} to sys.path", entry);
        Ok(())
    })
}

/// Maps the build target to the `python-build-standalone` directory name.
///
/// Returns `None` on targets without a bundled runtime.
fn get_platform_dir() -> Option<&'static str> {
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    {
        Some("linux-x86_64")
    }
    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    {
        Some("linux-aarch64")
    }
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    {
        Some("darwin-x86_64")
    }
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    {
        Some("darwin-aarch64")
    }
    #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
    {
        Some("windows-x86_64")
    }
    #[cfg(not(any(
        all(target_os = "linux", target_arch = "x86_64"),
        all(target_os = "linux", target_arch = "aarch64"),
        all(target_os = "macos", target_arch = "x86_64"),
        all(target_os = "macos", target_arch = "aarch64"),
        all(target_os = "windows", target_arch = "x86_64"),
    )))]
    {
        None
    }
}

/// True once [`initialize()`] has run and succeeded.
#[must_use]
pub fn is_initialized() -> bool {
    INIT_RESULT.get().is_some_and(|r| r.is_ok())
}
