//! Script service layer
//!
//! Turns names into script paths under an application root and runs
//! members of cached scripts, always inside an execution guard:
//!
//! - `dir` + `name` → `root/dir/name.lua` (`dir` may be absolute)
//! - dotted service names → `root/pkg/sub/Name.lua`
//!
//! Every call goes through the cache, so edits on disk are picked up by the
//! next call without restarting anything.

use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, Lookup, ScriptCache};
use crate::error::ScriptError;
use crate::logging::{operations, services, status};
use crate::runtime::ScriptRuntime;

/// Default script file extension
pub const DEFAULT_EXTENSION: &str = "lua";

/// Outcome of dispatching a request to a service script
#[derive(Debug)]
pub enum ExecutionReturn {
    /// The method ran; carries its return value
    Success(Value),
    /// No script exists for the service name
    NotFound,
    /// The script exists but loading, construction, lookup or execution failed
    Error(ScriptError),
}

impl ExecutionReturn {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success(_) => status::SUCCESS,
            Self::NotFound => status::NOT_FOUND,
            Self::Error(_) => status::ERROR,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// A member resolved on a specific compiled unit
///
/// Can be called any number of times. It pins the unit it was resolved
/// from: if the script is edited afterwards, this handle keeps calling the
/// old version, while fresh lookups see the new one.
pub struct BoundMethod<'s, R: ScriptRuntime> {
    cache: &'s ScriptCache<R>,
    entry: Arc<CacheEntry<R::Unit>>,
    member: R::Member,
    name: String,
}

impl<'s, R: ScriptRuntime> BoundMethod<'s, R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &Arc<CacheEntry<R::Unit>> {
        &self.entry
    }

    /// Invoke under an execution guard
    pub fn call(&self, instance: Option<&R::Instance>, args: &[Value]) -> Result<Value, ScriptError> {
        let guard = self.cache.acquire(&self.entry);
        let result = self.cache.runtime().invoke(&self.member, instance, args);
        guard.release();

        result.map_err(|source| ScriptError::Invocation {
            path: self.entry.path().to_path_buf(),
            member: self.name.clone(),
            source,
        })
    }
}

/// Runs members of cached scripts found under an application root
pub struct ScriptService<R: ScriptRuntime> {
    cache: ScriptCache<R>,
    root: PathBuf,
    extension: String,
}

impl<R: ScriptRuntime> ScriptService<R> {
    pub fn new(cache: ScriptCache<R>, root: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            root: root.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn cache(&self) -> &ScriptCache<R> {
        &self.cache
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `root/dir/name.ext`; `dir` is relative to root unless absolute
    pub fn script_path(&self, dir: Option<&str>, name: &str) -> PathBuf {
        let base = match dir {
            Some(dir) if !dir.is_empty() => self.root.join(dir),
            _ => self.root.clone(),
        };
        base.join(format!("{}.{}", name, self.extension))
    }

    /// Resolve a script given as a path relative to root (or absolute)
    ///
    /// The extension is appended when missing.
    pub fn script_file(&self, script: &str) -> PathBuf {
        let path = self.root.join(script);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension(&self.extension)
        }
    }

    /// Map a dotted service name (`billing.Invoice`) to its script path
    ///
    /// Returns `None` for names that are empty, contain empty segments, or
    /// would escape the root.
    pub fn service_path(&self, service: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        let segments: Vec<&str> = service.split('.').collect();
        let (last, dirs) = segments.split_last()?;

        for segment in dirs {
            path.push(checked_segment(segment)?);
        }
        path.push(format!("{}.{}", checked_segment(last)?, self.extension));
        Some(path)
    }

    /// Resolve `member` in the script at `dir/name`
    pub fn method(
        &self,
        dir: Option<&str>,
        name: &str,
        member: &str,
    ) -> Result<BoundMethod<'_, R>, ScriptError> {
        let path = self.script_path(dir, name);
        let entry = self.cache.get_or_load(&path)?;
        self.bind(entry, member)
    }

    /// Like [`method`](Self::method), but a missing script or member is `Ok(None)`
    ///
    /// Load failures are still errors: the file is there and broken.
    pub fn find_method(
        &self,
        dir: Option<&str>,
        name: &str,
        member: &str,
    ) -> Result<Option<BoundMethod<'_, R>>, ScriptError> {
        let path = self.script_path(dir, name);
        let Some(entry) = self.cache.lookup(&path).into_option(&path)? else {
            return Ok(None);
        };

        match self.bind(entry, member) {
            Ok(method) => Ok(Some(method)),
            Err(ScriptError::MethodNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn bind(
        &self,
        entry: Arc<CacheEntry<R::Unit>>,
        member: &str,
    ) -> Result<BoundMethod<'_, R>, ScriptError> {
        let resolved = self
            .cache
            .runtime()
            .resolve_member(entry.unit(), member)
            .map_err(|source| ScriptError::MethodNotFound {
                path: entry.path().to_path_buf(),
                member: member.to_string(),
                source,
            })?;

        Ok(BoundMethod {
            cache: &self.cache,
            entry,
            member: resolved,
            name: member.to_string(),
        })
    }

    /// Resolve and call `member` of the script at `path`
    pub fn run_path(
        &self,
        path: &Path,
        member: &str,
        instance: Option<&R::Instance>,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        let entry = self.cache.get_or_load(path)?;
        self.bind(entry, member)?.call(instance, args)
    }

    /// Resolve and call `member` of the script at `dir/name`
    pub fn run(
        &self,
        dir: Option<&str>,
        name: &str,
        member: &str,
        instance: Option<&R::Instance>,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        self.run_path(&self.script_path(dir, name), member, instance, args)
    }

    /// Like [`run`](Self::run), but a missing script or member is `Ok(None)`
    pub fn try_run(
        &self,
        dir: Option<&str>,
        name: &str,
        member: &str,
        instance: Option<&R::Instance>,
        args: &[Value],
    ) -> Result<Option<Value>, ScriptError> {
        match self.find_method(dir, name, member)? {
            Some(method) => method.call(instance, args).map(Some),
            None => Ok(None),
        }
    }

    /// Construct an instance of the script at `dir/name`
    pub fn construct(
        &self,
        dir: Option<&str>,
        name: &str,
        args: &[Value],
    ) -> Result<R::Instance, ScriptError> {
        self.cache
            .invoke_constructor(&self.script_path(dir, name), args)
    }

    /// Handle one request: construct the service with its default
    /// constructor and call `method(instance, input)`
    ///
    /// Construction, lookup and the call all run under a single execution
    /// guard, so the unit cannot be evicted halfway through.
    pub fn dispatch(&self, service: &str, method: &str, input: Value) -> ExecutionReturn {
        let started = Instant::now();

        let Some(path) = self.service_path(service) else {
            debug!(
                service = services::SCRIPT_SERVICE,
                operation = operations::DISPATCH,
                script_service = service,
                "invalid service name"
            );
            return ExecutionReturn::NotFound;
        };

        let entry = match self.cache.lookup(&path) {
            Lookup::Found(entry) => entry,
            Lookup::NotFound => return ExecutionReturn::NotFound,
            Lookup::LoadFailed(source) => {
                return ExecutionReturn::Error(ScriptError::Load { path, source })
            }
        };

        let runtime = self.cache.runtime();
        let guard = self.cache.acquire(&entry);
        let result = runtime
            .invoke_constructor(guard.unit(), &[])
            .map_err(|source| ScriptError::Construction {
                path: path.clone(),
                source,
            })
            .and_then(|instance| {
                let member = runtime.resolve_member(guard.unit(), method).map_err(|source| {
                    ScriptError::MethodNotFound {
                        path: path.clone(),
                        member: method.to_string(),
                        source,
                    }
                })?;
                debug!(
                    service = services::SCRIPT_SERVICE,
                    operation = operations::INVOKE,
                    path = %path.display(),
                    method,
                    "invoking method"
                );
                runtime
                    .invoke(&member, Some(&instance), &[input])
                    .map_err(|source| ScriptError::Invocation {
                        path: path.clone(),
                        member: method.to_string(),
                        source,
                    })
            });
        guard.release();

        match result {
            Ok(output) => {
                info!(
                    service = services::SCRIPT_SERVICE,
                    operation = operations::DISPATCH,
                    status = status::SUCCESS,
                    script_service = service,
                    method,
                    generation = entry.generation(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "method completed"
                );
                ExecutionReturn::Success(output)
            }
            Err(err) => {
                warn!(
                    service = services::SCRIPT_SERVICE,
                    operation = operations::DISPATCH,
                    status = status::ERROR,
                    script_service = service,
                    method,
                    kind = err.kind(),
                    error = %err,
                    "method failed"
                );
                ExecutionReturn::Error(err)
            }
        }
    }

    /// Call a zero-argument module function (internal entry points)
    pub fn call_static(&self, service: &str, function: &str) -> ExecutionReturn {
        let Some(path) = self.service_path(service) else {
            return ExecutionReturn::NotFound;
        };

        let entry = match self.cache.lookup(&path) {
            Lookup::Found(entry) => entry,
            Lookup::NotFound => return ExecutionReturn::NotFound,
            Lookup::LoadFailed(source) => {
                return ExecutionReturn::Error(ScriptError::Load { path, source })
            }
        };

        match self.bind(entry, function).and_then(|m| m.call(None, &[])) {
            Ok(output) => ExecutionReturn::Success(output),
            Err(err) => {
                warn!(
                    service = services::SCRIPT_SERVICE,
                    operation = operations::INVOKE,
                    status = status::ERROR,
                    script_service = service,
                    function,
                    error = %err,
                    "static call failed"
                );
                ExecutionReturn::Error(err)
            }
        }
    }
}

fn checked_segment(segment: &str) -> Option<&str> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !segment.contains(['/', '\\']) => Some(segment),
        _ => None,
    }
}
